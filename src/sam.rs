//! Streaming SAM text parser.

use std::io::{BufRead, BufReader, Read};

use crate::error::{DedupError, Result};
use crate::genome::Genome;
use crate::read::{AlignedRead, CigarSummary, ReadFlags, SupplementaryAlignment};
use crate::streaming::buffers::{DEFAULT_INPUT_BUFFER, DEFAULT_LINE_BUFFER};
use crate::streaming::parsing::{parse_u64_fast, split_fields, trim_line_end};

/// Number of mandatory SAM columns.
const MANDATORY_FIELDS: usize = 11;

/// A streaming SAM reader.
///
/// Header lines are collected as they are met; `@SQ` lines define the
/// genome unless one was supplied up front. Secondary alignments are skipped.
pub struct SamReader<R: Read> {
    reader: BufReader<R>,
    line_number: usize,
    buffer: String,
    genome: Genome,
    genome_from_header: bool,
    header: Vec<String>,
}

impl<R: Read> SamReader<R> {
    /// Create a reader that takes its genome from the `@SQ` header lines.
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::with_capacity(DEFAULT_INPUT_BUFFER, reader),
            line_number: 0,
            buffer: String::with_capacity(DEFAULT_LINE_BUFFER),
            genome: Genome::new(),
            genome_from_header: true,
            header: Vec::new(),
        }
    }

    /// Create a reader with a fixed genome; `@SQ` lines are kept but ignored.
    pub fn with_genome(reader: R, genome: Genome) -> Self {
        Self {
            genome,
            genome_from_header: false,
            ..Self::new(reader)
        }
    }

    /// The genome known so far.
    pub fn genome(&self) -> &Genome {
        &self.genome
    }

    /// Header lines read so far.
    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Read the next alignment record.
    pub fn read_record(&mut self) -> Result<Option<AlignedRead>> {
        loop {
            self.buffer.clear();
            let bytes_read = self.reader.read_line(&mut self.buffer)?;
            if bytes_read == 0 {
                return Ok(None);
            }
            self.line_number += 1;

            let line = self.buffer.trim_end_matches(&['\n', '\r'][..]);
            if line.is_empty() {
                continue;
            }
            if line.starts_with('@') {
                if self.genome_from_header {
                    self.genome.add_header_line(line, self.line_number)?;
                }
                self.header.push(line.to_string());
                continue;
            }

            match parse_record(line.as_bytes(), &self.genome, self.line_number)? {
                Some(read) => return Ok(Some(read)),
                None => continue,
            }
        }
    }

    /// Get an iterator over all records.
    pub fn records(self) -> SamRecordIter<R> {
        SamRecordIter { reader: self }
    }
}

/// Iterator over SAM records.
pub struct SamRecordIter<R: Read> {
    reader: SamReader<R>,
}

impl<R: Read> SamRecordIter<R> {
    pub fn genome(&self) -> &Genome {
        self.reader.genome()
    }
}

impl<R: Read> Iterator for SamRecordIter<R> {
    type Item = Result<AlignedRead>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.read_record().transpose()
    }
}

/// Parse one SAM record line against `genome`.
///
/// Returns `Ok(None)` for secondary alignments.
pub fn parse_record(line: &[u8], genome: &Genome, line_number: usize) -> Result<Option<AlignedRead>> {
    let parse_error = |message: String| DedupError::Parse {
        line: line_number,
        message,
    };
    let text = |bytes: &[u8]| -> Result<String> {
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|_| parse_error("Invalid UTF-8".to_string()))
    };

    let fields: Vec<&[u8]> = split_fields(trim_line_end(line)).collect();
    if fields.len() < MANDATORY_FIELDS {
        return Err(parse_error(format!(
            "Expected at least {} fields, got {}",
            MANDATORY_FIELDS,
            fields.len()
        )));
    }

    let flags = parse_u64_fast(fields[1])
        .and_then(|f| u16::try_from(f).ok())
        .map(ReadFlags)
        .ok_or_else(|| parse_error(format!("Invalid flag: {}", String::from_utf8_lossy(fields[1]))))?;
    if flags.is_secondary() {
        return Ok(None);
    }

    let name = text(fields[0])?;
    let chrom = text(fields[2])?;
    let ref_index = if chrom == "*" {
        None
    } else {
        genome.index_of(&chrom)
    };
    let start = parse_position(fields[3], "POS", line_number)?;

    let cigar_text = text(fields[5])?;
    let cigar = if flags.is_unmapped() {
        CigarSummary::default()
    } else {
        CigarSummary::parse(&cigar_text)
            .ok_or_else(|| parse_error(format!("Invalid CIGAR: {}", cigar_text)))?
    };

    let mate_chrom = match fields[6] {
        b"*" => None,
        b"=" => Some(chrom.clone()),
        other => Some(text(other)?),
    };
    let mate_ref_index = mate_chrom.as_deref().and_then(|c| genome.index_of(c));
    let mate_start = parse_position(fields[7], "PNEXT", line_number)?;

    let base_qualities = match fields[10] {
        b"*" => Vec::new(),
        qual => qual.iter().map(|&q| q.saturating_sub(33)).collect(),
    };

    let end = cigar
        .end_from(start)
        .ok_or_else(|| parse_error(format!("Alignment end overflows: {} at {}", cigar_text, start)))?;

    let mut read = AlignedRead {
        name,
        flags,
        chrom,
        ref_index,
        start,
        end,
        left_clip: cigar.left_clip,
        right_clip: cigar.right_clip,
        mate_chrom,
        mate_ref_index,
        mate_start,
        mate_clips: None,
        supplementary: None,
        supplementary_count: 0,
        base_qualities,
    };

    for tag in &fields[MANDATORY_FIELDS..] {
        if let Some(value) = tag.strip_prefix(b"MC:Z:") {
            let value = text(value)?;
            read.mate_clips = Some(
                CigarSummary::parse(&value)
                    .ok_or_else(|| parse_error(format!("Invalid MC tag: {}", value)))?,
            );
        } else if let Some(value) = tag.strip_prefix(b"SA:Z:") {
            let value = text(value)?;
            let entries: Vec<&str> = value.split(';').filter(|e| !e.is_empty()).collect();
            read.supplementary_count = entries.len();
            if let Some(first) = entries.first() {
                read.supplementary = Some(
                    parse_sa_entry(first, genome)
                        .ok_or_else(|| parse_error(format!("Invalid SA tag: {}", value)))?,
                );
            }
        }
    }

    Ok(Some(read))
}

fn parse_position(bytes: &[u8], field_name: &str, line_number: usize) -> Result<u32> {
    parse_u64_fast(bytes)
        .and_then(|p| u32::try_from(p).ok())
        .ok_or_else(|| DedupError::Parse {
            line: line_number,
            message: format!("Invalid {} position: '{}'", field_name, String::from_utf8_lossy(bytes)),
        })
}

/// Parse `chrom,pos,strand,CIGAR,mapQ,NM`.
fn parse_sa_entry(entry: &str, genome: &Genome) -> Option<SupplementaryAlignment> {
    let mut parts = entry.split(',');
    let chrom = parts.next()?.to_string();
    let pos = parts.next()?.parse().ok()?;
    let reverse = match parts.next()? {
        "+" => false,
        "-" => true,
        _ => return None,
    };
    Some(SupplementaryAlignment {
        ref_index: genome.index_of(&chrom),
        chrom,
        pos,
        reverse,
    })
}

/// Parse all reads from SAM text (useful for testing).
pub fn parse_reads(content: &str) -> Result<Vec<AlignedRead>> {
    SamReader::new(content.as_bytes()).records().collect()
}
