//! Buffer size constants for streaming operations.
//!
//! These constants control memory usage vs I/O throughput tradeoffs.

/// Default output buffer size (2 MB).
pub const DEFAULT_OUTPUT_BUFFER: usize = 2 * 1024 * 1024;

/// Default input buffer size (256 KB).
/// Good balance for reading sorted SAM files.
pub const DEFAULT_INPUT_BUFFER: usize = 256 * 1024;

/// Default line buffer capacity (1 KB).
/// Sufficient for most SAM lines with short tags.
pub const DEFAULT_LINE_BUFFER: usize = 1024;

/// Resolved batches that may wait for the writer thread before workers block.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;
