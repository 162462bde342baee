//! Streaming utilities shared by the dedup commands.
//!
//! This module provides:
//! - Zero-allocation SAM field parsing
//! - Sort validation
//! - Output sinks for resolved fragments

pub mod buffers;
pub mod output;
pub mod parsing;
pub mod validation;

pub use output::{ChannelSink, FragmentSink, FragmentWriter};
pub use parsing::{parse_sam_position_bytes, parse_u64_fast, should_skip_line, split_fields};
pub use validation::{verify_sorted, verify_sorted_reader, SortValidator};
