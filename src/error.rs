//! Error types shared by the reader, the dedup core and the CLI.

use std::io;
use thiserror::Error;

/// Errors that can occur while reading, deduplicating or writing reads.
///
/// Out-of-order reads and mates on unrecognized references are recovered
/// locally and only counted, so they have no variant here.
#[derive(Error, Debug)]
pub enum DedupError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Invalid SAM format: {0}")]
    InvalidFormat(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(
        "Position {position} on {chromosome} falls outside the read buffer \
         (window starts at {min_position}, capacity {capacity}); increase --buffer-size"
    )]
    IndexOutOfBounds {
        chromosome: String,
        position: i64,
        min_position: i64,
        capacity: usize,
    },

    #[error("Unexpected record {read}: {message}")]
    UnexpectedRecord { read: String, message: String },

    #[error("Worker for {chromosome} failed: {source}")]
    WorkerFailed {
        chromosome: String,
        #[source]
        source: Box<DedupError>,
    },
}

pub type Result<T> = std::result::Result<T, DedupError>;

impl DedupError {
    /// Build an [`DedupError::UnexpectedRecord`] for the named read.
    pub fn unexpected(read: impl Into<String>, message: impl Into<String>) -> Self {
        DedupError::UnexpectedRecord {
            read: read.into(),
            message: message.into(),
        }
    }

    /// Wrap an error raised inside a chromosome worker.
    pub fn in_worker(chromosome: impl Into<String>, error: DedupError) -> Self {
        DedupError::WorkerFailed {
            chromosome: chromosome.into(),
            source: Box::new(error),
        }
    }
}
