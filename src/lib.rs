// Clippy allows for the whole crate
#![allow(clippy::should_implement_trait)]
#![allow(clippy::type_complexity)]

//! markdups: duplicate marking for coordinate-sorted SAM files
//!
//! Reads are grouped into fragments (a read pair and its supplementary
//! alignments) and compared by the unclipped 5' coordinates of both ends.
//! Among fragments with the same coordinate key, the one with the highest
//! average base quality is PRIMARY and the rest are DUPLICATE.
//!
//! # Features
//!
//! - **Bounded memory**: a per-chromosome ring buffer of positions
//! - **Parallel processing**: one worker per chromosome using Rayon
//! - **Cross-partition mates**: fragments spanning partitions or chromosomes
//!   meet in a sharded, thread-safe store
//!
//! # Example
//!
//! ```rust,no_run
//! use markdups::{commands::MarkDupsCommand, config::DedupConfig};
//!
//! let cmd = MarkDupsCommand::new().with_config(DedupConfig::new().with_threads(Some(4)));
//! let stats = cmd.run("sorted.sam", std::io::stdout()).unwrap();
//! eprintln!("{}", stats);
//! ```

pub mod classifier;
pub mod commands;
pub mod config;
pub mod driver;
pub mod error;
pub mod fragment;
pub mod genome;
pub mod parallel;
pub mod partition;
pub mod position_cache;
pub mod read;
pub mod sam;
pub mod streaming;

// Re-export commonly used types
pub use error::{DedupError, Result};
pub use fragment::{Fragment, FragmentStatus, Verdict};
pub use read::{AlignedRead, ReadFlags};
pub use sam::{parse_reads, SamReader};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::commands::MarkDupsCommand;
    pub use crate::config::DedupConfig;
    pub use crate::driver::{ChromosomeDriver, DedupStats};
    pub use crate::fragment::{Fragment, FragmentStatus};
    pub use crate::genome::Genome;
    pub use crate::partition::{CrossPartitionStore, PartitionId};
    pub use crate::read::AlignedRead;
    pub use crate::sam::SamReader;
    pub use crate::streaming::{FragmentSink, FragmentWriter};
}
