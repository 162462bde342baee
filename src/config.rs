//! Runtime configuration for duplicate marking.
//!
//! Partition size and read buffer capacity are supplied by the caller; they
//! are never derived from the data.

use crate::error::{DedupError, Result};

/// Default coordinate partition size in bases.
pub const DEFAULT_PARTITION_SIZE: u32 = 1_000_000;

/// Default read position buffer capacity in bases.
///
/// Must exceed the largest soft clip and the largest distance between a
/// fragment's first read and its lower unclipped end.
pub const DEFAULT_BUFFER_SIZE: usize = 1_000;

/// Settings shared by every chromosome worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupConfig {
    /// Width of a coordinate partition.
    pub partition_size: u32,
    /// Ring buffer capacity, in positions.
    pub buffer_size: usize,
    /// Worker threads (None uses all cores).
    pub threads: Option<usize>,
    /// Write a `#` header line before the read records.
    pub write_header: bool,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl DedupConfig {
    pub fn new() -> Self {
        Self {
            partition_size: DEFAULT_PARTITION_SIZE,
            buffer_size: DEFAULT_BUFFER_SIZE,
            threads: None,
            write_header: true,
        }
    }

    /// Set the partition size (builder pattern).
    pub fn with_partition_size(mut self, partition_size: u32) -> Self {
        self.partition_size = partition_size;
        self
    }

    /// Set the ring buffer capacity (builder pattern).
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Set the worker thread count (builder pattern).
    pub fn with_threads(mut self, threads: Option<usize>) -> Self {
        self.threads = threads;
        self
    }

    /// Enable or disable the output header line (builder pattern).
    pub fn with_header(mut self, write_header: bool) -> Self {
        self.write_header = write_header;
        self
    }

    /// Check the sizes are usable.
    pub fn validate(&self) -> Result<()> {
        if self.partition_size == 0 {
            return Err(DedupError::Config(
                "partition size must be greater than zero".to_string(),
            ));
        }
        if self.buffer_size == 0 {
            return Err(DedupError::Config(
                "buffer size must be greater than zero".to_string(),
            ));
        }
        if self.buffer_size > self.partition_size as usize {
            return Err(DedupError::Config(format!(
                "buffer size ({}) cannot exceed partition size ({})",
                self.buffer_size, self.partition_size
            )));
        }
        if self.threads == Some(0) {
            return Err(DedupError::Config(
                "thread count must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = DedupConfig::new();
        assert_eq!(config.partition_size, DEFAULT_PARTITION_SIZE);
        assert_eq!(config.buffer_size, DEFAULT_BUFFER_SIZE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_sizes_rejected() {
        assert!(DedupConfig::new().with_partition_size(0).validate().is_err());
        assert!(DedupConfig::new().with_buffer_size(0).validate().is_err());
        assert!(DedupConfig::new().with_threads(Some(0)).validate().is_err());
    }

    #[test]
    fn test_buffer_larger_than_partition_rejected() {
        let config = DedupConfig::new()
            .with_partition_size(500)
            .with_buffer_size(1000);
        assert!(matches!(config.validate(), Err(DedupError::Config(_))));
    }
}
