//! Sort validation for SAM input.
//!
//! Duplicate marking streams reads in coordinate order. This module checks
//! that:
//! 1. All records for a reference are contiguous (no interleaving)
//! 2. Within a reference, positions are non-decreasing
//! 3. With a genome, references appear in genome order
//!
//! Unplaced reads (`*` reference) may only form the final block.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use crate::error::{DedupError, Result};
use crate::genome::Genome;
use crate::streaming::buffers::{DEFAULT_INPUT_BUFFER, DEFAULT_LINE_BUFFER};
use crate::streaming::parsing::{parse_sam_position_bytes, should_skip_line};

/// Inline sort validator for use within streaming loops.
#[derive(Debug, Default)]
pub struct SortValidator<'a> {
    genome: Option<&'a Genome>,
    prev_chrom: Option<String>,
    prev_order: Option<usize>,
    prev_start: u64,
    seen_chroms: HashSet<String>,
    record_count: usize,
}

impl<'a> SortValidator<'a> {
    /// Create a validator accepting any consistent reference order.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a validator that also enforces the genome's reference order.
    pub fn with_genome(genome: &'a Genome) -> Self {
        Self {
            genome: Some(genome),
            ..Self::default()
        }
    }

    /// Validate that the given record maintains sort order.
    #[inline]
    pub fn validate(&mut self, chrom: &str, start: u64) -> Result<()> {
        self.record_count += 1;

        let order = match self.genome {
            Some(genome) if chrom != "*" => match genome.index_of(chrom) {
                Some(order) => Some(order),
                None => {
                    return Err(DedupError::InvalidFormat(format!(
                        "Reference '{}' at record {} not found in genome",
                        chrom, self.record_count
                    )));
                }
            },
            _ => None,
        };

        if let Some(ref pc) = self.prev_chrom {
            if chrom != pc {
                if pc == "*" || self.seen_chroms.contains(chrom) {
                    return Err(DedupError::InvalidFormat(format!(
                        "File not sorted: reference '{}' at record {} was seen earlier (references must be contiguous)",
                        chrom, self.record_count
                    )));
                }
                if let (Some(current), Some(previous)) = (order, self.prev_order) {
                    if current < previous {
                        return Err(DedupError::InvalidFormat(format!(
                            "File not sorted by genome order: reference '{}' at record {} should come before '{}'",
                            chrom, self.record_count, pc
                        )));
                    }
                }
                self.seen_chroms.insert(pc.clone());
            } else if chrom != "*" && start < self.prev_start {
                return Err(DedupError::InvalidFormat(format!(
                    "File not sorted: position {} at record {} comes after {} on {}",
                    start, self.record_count, self.prev_start, chrom
                )));
            }
        }

        self.prev_chrom = Some(chrom.to_string());
        self.prev_order = order;
        self.prev_start = start;

        Ok(())
    }

    /// Get the number of records validated.
    pub fn record_count(&self) -> usize {
        self.record_count
    }
}

/// Verify that SAM text from `reader` is coordinate sorted.
///
/// Returns the number of records checked.
pub fn verify_sorted_reader<R: Read>(reader: R, genome: Option<&Genome>) -> Result<usize> {
    let mut reader = BufReader::with_capacity(DEFAULT_INPUT_BUFFER, reader);
    let mut validator = match genome {
        Some(genome) => SortValidator::with_genome(genome),
        None => SortValidator::new(),
    };
    let mut line = Vec::with_capacity(DEFAULT_LINE_BUFFER);
    let mut line_num = 0;

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        line_num += 1;
        if should_skip_line(&line) {
            continue;
        }

        let (chrom, start) = parse_sam_position_bytes(&line).ok_or_else(|| DedupError::Parse {
            line: line_num,
            message: "Expected RNAME and POS fields".to_string(),
        })?;
        let chrom = std::str::from_utf8(chrom).map_err(|_| DedupError::Parse {
            line: line_num,
            message: "Invalid UTF-8 in RNAME".to_string(),
        })?;
        validator.validate(chrom, start)?;
    }

    Ok(validator.record_count())
}

/// Verify that a SAM file is coordinate sorted.
pub fn verify_sorted<P: AsRef<Path>>(path: P, genome: Option<&Genome>) -> Result<usize> {
    let file = File::open(path.as_ref())?;
    verify_sorted_reader(file, genome)
}
