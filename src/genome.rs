//! Reference genome description: chromosome names, lengths and order.
//!
//! Parses .genome files (tab-delimited: chrom\tsize) or SAM `@SQ` header
//! lines. The order of first appearance defines the reference index used to
//! order the two ends of a fragment that spans chromosomes.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{DedupError, Result};

/// The set of recognized reference sequences.
/// Preserves chromosome order from input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Genome {
    /// Map of chromosome name to (reference index, size)
    entries: HashMap<String, (usize, u64)>,
    /// Chromosome order (preserves input order)
    order: Vec<String>,
}

impl Genome {
    /// Create an empty genome.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Load genome from a file.
    /// Format: tab-delimited with chrom\tsize per line
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut genome = Genome::new();

        for (line_num, line_result) in reader.lines().enumerate() {
            let line = line_result?;
            let line = line.trim();

            // Skip empty lines and comments
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 2 {
                return Err(DedupError::Parse {
                    line: line_num + 1,
                    message: "Genome file requires two columns: chrom and size".to_string(),
                });
            }

            let size: u64 = fields[1].parse().map_err(|_| DedupError::Parse {
                line: line_num + 1,
                message: format!("Invalid chromosome size: {}", fields[1]),
            })?;

            genome.insert(fields[0].to_string(), size);
        }

        Ok(genome)
    }

    /// Add the reference described by a SAM `@SQ` header line.
    ///
    /// Lines of any other header type are ignored.
    pub fn add_header_line(&mut self, line: &str, line_num: usize) -> Result<()> {
        let mut fields = line.trim_end().split('\t');
        if fields.next() != Some("@SQ") {
            return Ok(());
        }

        let mut name = None;
        let mut length = None;
        for field in fields {
            if let Some(value) = field.strip_prefix("SN:") {
                name = Some(value);
            } else if let Some(value) = field.strip_prefix("LN:") {
                length = Some(value.parse::<u64>().map_err(|_| DedupError::Parse {
                    line: line_num,
                    message: format!("Invalid @SQ length: {}", value),
                })?);
            }
        }

        match (name, length) {
            (Some(name), Some(length)) => {
                self.insert(name.to_string(), length);
                Ok(())
            }
            _ => Err(DedupError::Parse {
                line: line_num,
                message: "@SQ line requires SN and LN fields".to_string(),
            }),
        }
    }

    /// Get the size of a chromosome.
    #[inline]
    pub fn chrom_size(&self, chrom: &str) -> Option<u64> {
        self.entries.get(chrom).map(|&(_, size)| size)
    }

    /// Get the reference index of a chromosome.
    #[inline]
    pub fn index_of(&self, chrom: &str) -> Option<usize> {
        self.entries.get(chrom).map(|&(index, _)| index)
    }

    /// Check if a chromosome exists.
    #[inline]
    pub fn has_chrom(&self, chrom: &str) -> bool {
        self.entries.contains_key(chrom)
    }

    /// Get all chromosome names in order.
    pub fn chromosomes(&self) -> impl Iterator<Item = &String> {
        self.order.iter()
    }

    /// Get number of chromosomes.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Insert a chromosome size (appends to order if new).
    pub fn insert(&mut self, chrom: String, size: u64) {
        match self.entries.get_mut(&chrom) {
            Some(entry) => entry.1 = size,
            None => {
                self.entries.insert(chrom.clone(), (self.order.len(), size));
                self.order.push(chrom);
            }
        }
    }
}
