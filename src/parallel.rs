//! Chromosome-parallel processing of in-memory SAM text using Rayon.
//!
//! Coordinate-sorted SAM keeps each reference in one contiguous block of
//! lines, so a single scan yields one byte span per chromosome and workers
//! can parse their span independently.

use std::collections::HashSet;

use memchr::memchr;
use rayon::prelude::*;

use crate::error::{DedupError, Result};
use crate::genome::Genome;
use crate::streaming::parsing::trim_line_end;

/// Contiguous block of record lines for one reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChromosomeSpan {
    pub chrom: String,
    /// Byte offset of the first line.
    pub start: usize,
    /// Byte offset just past the last line.
    pub end: usize,
    /// 1-based line number of the first line.
    pub first_line: usize,
    pub records: usize,
}

impl ChromosomeSpan {
    /// Iterate over (line number, line) within the span.
    pub fn lines<'a>(&self, data: &'a [u8]) -> impl Iterator<Item = (usize, &'a [u8])> {
        let block = &data[self.start..self.end];
        let first_line = self.first_line;
        LineIter { data: block, pos: 0 }
            .enumerate()
            .map(move |(i, line)| (first_line + i, line))
            .filter(|(_, line)| !line.is_empty())
    }
}

struct LineIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for LineIter<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.data.len() {
            return None;
        }
        let rest = &self.data[self.pos..];
        let len = memchr(b'\n', rest).map_or(rest.len(), |i| i + 1);
        self.pos += len;
        Some(trim_line_end(&rest[..len]))
    }
}

/// Read the header genome and split the records into per-chromosome spans.
///
/// A reference whose block reappears later is an error: the input is not
/// coordinate sorted.
pub fn index_chromosome_spans(data: &[u8]) -> Result<(Genome, Vec<ChromosomeSpan>)> {
    let mut genome = Genome::new();
    let mut spans: Vec<ChromosomeSpan> = Vec::new();
    let mut seen: HashSet<&[u8]> = HashSet::new();
    let mut current: Option<(&[u8], ChromosomeSpan)> = None;

    for (i, line) in (LineIter { data, pos: 0 }).enumerate() {
        let line_number = i + 1;
        if line.is_empty() {
            continue;
        }
        if line[0] == b'@' {
            if current.is_some() || !spans.is_empty() {
                return Err(DedupError::Parse {
                    line: line_number,
                    message: "Header line after alignment records".to_string(),
                });
            }
            let text = std::str::from_utf8(line).map_err(|_| DedupError::Parse {
                line: line_number,
                message: "Invalid UTF-8 in header".to_string(),
            })?;
            genome.add_header_line(text, line_number)?;
            continue;
        }

        let offset = line.as_ptr() as usize - data.as_ptr() as usize;
        let chrom = rname(line).ok_or_else(|| DedupError::Parse {
            line: line_number,
            message: "Expected RNAME field".to_string(),
        })?;
        let line_end = offset + line.len();

        match current.as_mut() {
            Some((name, span)) if *name == chrom => {
                span.end = line_end;
                span.records += 1;
            }
            _ => {
                if !seen.insert(chrom) {
                    return Err(DedupError::InvalidFormat(format!(
                        "Input not sorted: reference '{}' at line {} was seen earlier",
                        String::from_utf8_lossy(chrom),
                        line_number
                    )));
                }
                if let Some((_, span)) = current.take() {
                    spans.push(span);
                }
                let name = std::str::from_utf8(chrom).map_err(|_| DedupError::Parse {
                    line: line_number,
                    message: "Invalid UTF-8 in RNAME".to_string(),
                })?;
                current = Some((
                    chrom,
                    ChromosomeSpan {
                        chrom: name.to_string(),
                        start: offset,
                        end: line_end,
                        first_line: line_number,
                        records: 1,
                    },
                ));
            }
        }
    }

    if let Some((_, span)) = current {
        spans.push(span);
    }
    Ok((genome, spans))
}

/// Third tab-separated field.
fn rname(line: &[u8]) -> Option<&[u8]> {
    let tab1 = memchr(b'\t', line)?;
    let rest = &line[tab1 + 1..];
    let tab2 = memchr(b'\t', rest)?;
    let rest = &rest[tab2 + 1..];
    let end = memchr(b'\t', rest).unwrap_or(rest.len());
    Some(&rest[..end])
}

/// Process chromosome spans in parallel, keeping span order in the result.
pub fn process_chromosomes<F, T>(spans: &[ChromosomeSpan], f: F) -> Vec<(String, T)>
where
    F: Fn(&ChromosomeSpan) -> T + Sync + Send,
    T: Send,
{
    spans
        .par_iter()
        .map(|span| (span.chrom.clone(), f(span)))
        .collect()
}
