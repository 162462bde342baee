//! Command implementations for markdups.

pub mod mark_dups;

pub use crate::streaming::{verify_sorted, verify_sorted_reader};
pub use mark_dups::MarkDupsCommand;
