//! Aligned read model consumed by the dedup engine.
//!
//! Coordinates are 1-based and inclusive, as in SAM. Only the fields the
//! duplicate marker needs are kept: placement, clipping, mate placement,
//! supplementary links and base qualities.

use std::fmt;

use crate::error::{DedupError, Result};

/// SAM bit flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ReadFlags(pub u16);

impl ReadFlags {
    pub const PAIRED: u16 = 0x1;
    pub const UNMAPPED: u16 = 0x4;
    pub const MATE_UNMAPPED: u16 = 0x8;
    pub const REVERSE: u16 = 0x10;
    pub const MATE_REVERSE: u16 = 0x20;
    pub const SECONDARY: u16 = 0x100;
    pub const DUPLICATE: u16 = 0x400;
    pub const SUPPLEMENTARY: u16 = 0x800;

    #[inline]
    pub fn bits(self) -> u16 {
        self.0
    }

    #[inline]
    fn has(self, flag: u16) -> bool {
        self.0 & flag != 0
    }

    #[inline]
    pub fn is_paired(self) -> bool {
        self.has(Self::PAIRED)
    }

    #[inline]
    pub fn is_unmapped(self) -> bool {
        self.has(Self::UNMAPPED)
    }

    #[inline]
    pub fn is_mate_unmapped(self) -> bool {
        self.has(Self::MATE_UNMAPPED)
    }

    #[inline]
    pub fn is_reverse(self) -> bool {
        self.has(Self::REVERSE)
    }

    #[inline]
    pub fn is_mate_reverse(self) -> bool {
        self.has(Self::MATE_REVERSE)
    }

    #[inline]
    pub fn is_secondary(self) -> bool {
        self.has(Self::SECONDARY)
    }

    #[inline]
    pub fn is_duplicate(self) -> bool {
        self.has(Self::DUPLICATE)
    }

    #[inline]
    pub fn is_supplementary(self) -> bool {
        self.has(Self::SUPPLEMENTARY)
    }

    /// Return a copy with `flag` set or cleared.
    #[inline]
    pub fn with(self, flag: u16, set: bool) -> Self {
        if set {
            ReadFlags(self.0 | flag)
        } else {
            ReadFlags(self.0 & !flag)
        }
    }
}

/// Clip lengths and reference span derived from a CIGAR string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CigarSummary {
    /// Soft clip before the first aligned base.
    pub left_clip: u32,
    /// Soft clip after the last aligned base.
    pub right_clip: u32,
    /// Bases of reference consumed (M, D, N, =, X).
    pub ref_len: u32,
}

impl CigarSummary {
    /// Parse a CIGAR string. `*` yields an empty summary.
    ///
    /// Hard clips are skipped when locating the soft clips at either end.
    pub fn parse(cigar: &str) -> Option<Self> {
        if cigar == "*" {
            return Some(Self::default());
        }

        let mut ops: Vec<(u32, u8)> = Vec::new();
        let mut len: u32 = 0;
        let mut has_digits = false;
        for &b in cigar.as_bytes() {
            if b.is_ascii_digit() {
                len = len.checked_mul(10)?.checked_add((b - b'0') as u32)?;
                has_digits = true;
            } else {
                if !has_digits || !b"MIDNSHP=X".contains(&b) {
                    return None;
                }
                ops.push((len, b));
                len = 0;
                has_digits = false;
            }
        }
        if has_digits || ops.is_empty() {
            return None;
        }

        let ref_len = ops
            .iter()
            .filter(|&&(_, op)| matches!(op, b'M' | b'D' | b'N' | b'=' | b'X'))
            .try_fold(0u32, |acc, &(n, _)| acc.checked_add(n))?;
        let left_clip = ops
            .iter()
            .filter(|&&(_, op)| op != b'H')
            .take_while(|&&(_, op)| op == b'S')
            .try_fold(0u32, |acc, &(n, _)| acc.checked_add(n))?;
        let right_clip = ops
            .iter()
            .rev()
            .filter(|&&(_, op)| op != b'H')
            .take_while(|&&(_, op)| op == b'S')
            .try_fold(0u32, |acc, &(n, _)| acc.checked_add(n))?;

        Some(Self {
            left_clip,
            right_clip,
            ref_len,
        })
    }

    /// Parse or fail with an [`DedupError::InvalidFormat`].
    pub fn parse_or_err(cigar: &str) -> Result<Self> {
        Self::parse(cigar).ok_or_else(|| DedupError::InvalidFormat(format!("Invalid CIGAR: {}", cigar)))
    }

    /// Last reference base covered by an alignment starting at `start`.
    ///
    /// `None` when the end does not fit in a `u32`.
    #[inline]
    pub fn end_from(&self, start: u32) -> Option<u32> {
        if self.ref_len == 0 {
            Some(start)
        } else {
            start.checked_add(self.ref_len - 1)
        }
    }
}

/// Mate clipping taken from the `MC` tag.
pub type MateClips = CigarSummary;

/// First entry of a read's `SA` tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupplementaryAlignment {
    pub chrom: String,
    pub ref_index: Option<usize>,
    pub pos: u32,
    pub reverse: bool,
}

/// One aligned read record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignedRead {
    pub name: String,
    pub flags: ReadFlags,
    pub chrom: String,
    /// Reference index in the genome, None for `*` or unknown references.
    pub ref_index: Option<usize>,
    pub start: u32,
    /// Inclusive alignment end.
    pub end: u32,
    pub left_clip: u32,
    pub right_clip: u32,
    pub mate_chrom: Option<String>,
    pub mate_ref_index: Option<usize>,
    pub mate_start: u32,
    pub mate_clips: Option<MateClips>,
    pub supplementary: Option<SupplementaryAlignment>,
    /// Number of entries in the `SA` tag.
    pub supplementary_count: usize,
    /// Phred base qualities without the ASCII offset.
    pub base_qualities: Vec<u8>,
}

impl AlignedRead {
    /// Create an unpaired forward-strand read.
    pub fn mapped(
        name: impl Into<String>,
        chrom: impl Into<String>,
        ref_index: usize,
        start: u32,
        cigar: &str,
    ) -> Result<Self> {
        let summary = CigarSummary::parse_or_err(cigar)?;
        let end = summary.end_from(start).ok_or_else(|| {
            DedupError::InvalidFormat(format!("Alignment end overflows: {} at {}", cigar, start))
        })?;
        Ok(Self {
            name: name.into(),
            flags: ReadFlags::default(),
            chrom: chrom.into(),
            ref_index: Some(ref_index),
            start,
            end,
            left_clip: summary.left_clip,
            right_clip: summary.right_clip,
            mate_chrom: None,
            mate_ref_index: None,
            mate_start: 0,
            mate_clips: None,
            supplementary: None,
            supplementary_count: 0,
            base_qualities: Vec::new(),
        })
    }

    /// Mark the read as reverse strand (builder pattern).
    pub fn reverse(mut self) -> Self {
        self.flags = self.flags.with(ReadFlags::REVERSE, true);
        self
    }

    /// Attach a mapped mate (builder pattern).
    pub fn with_mate(
        mut self,
        chrom: impl Into<String>,
        ref_index: Option<usize>,
        start: u32,
        cigar: Option<&str>,
        reverse: bool,
    ) -> Result<Self> {
        self.flags = self
            .flags
            .with(ReadFlags::PAIRED, true)
            .with(ReadFlags::MATE_REVERSE, reverse);
        self.mate_chrom = Some(chrom.into());
        self.mate_ref_index = ref_index;
        self.mate_start = start;
        self.mate_clips = cigar.map(CigarSummary::parse_or_err).transpose()?;
        Ok(self)
    }

    /// Set all base qualities to `quality` (builder pattern).
    pub fn with_quality(mut self, quality: u8, len: usize) -> Self {
        self.base_qualities = vec![quality; len];
        self
    }

    /// Replace the flags (builder pattern).
    pub fn with_flags(mut self, flags: ReadFlags) -> Self {
        self.flags = flags;
        self
    }

    #[inline]
    pub fn is_reverse(&self) -> bool {
        self.flags.is_reverse()
    }

    #[inline]
    pub fn is_supplementary(&self) -> bool {
        self.flags.is_supplementary()
    }

    #[inline]
    pub fn is_unmapped(&self) -> bool {
        self.flags.is_unmapped()
    }

    /// Paired with a mate that is itself mapped.
    #[inline]
    pub fn has_mapped_mate(&self) -> bool {
        self.flags.is_paired() && !self.flags.is_mate_unmapped()
    }

    /// Mate placed on the same reference as this read.
    #[inline]
    pub fn mate_on_same_reference(&self) -> bool {
        self.has_mapped_mate() && self.mate_chrom.as_deref() == Some(self.chrom.as_str())
    }

    /// Alignment boundary with soft clipping added back.
    ///
    /// Forward reads use the start minus the left clip, reverse reads the
    /// end plus the right clip.
    #[inline]
    pub fn unclipped_position(&self) -> i64 {
        if self.is_reverse() {
            self.end as i64 + self.right_clip as i64
        } else {
            self.start as i64 - self.left_clip as i64
        }
    }

    /// Unclipped position of the mate, when its `MC` tag was present.
    pub fn mate_unclipped_position(&self) -> Option<i64> {
        let clips = self.mate_clips?;
        if !self.has_mapped_mate() {
            return None;
        }
        let position = if self.flags.is_mate_reverse() {
            clips.end_from(self.mate_start)? as i64 + clips.right_clip as i64
        } else {
            self.mate_start as i64 - clips.left_clip as i64
        };
        Some(position)
    }
}

impl fmt::Display for AlignedRead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}:{}-{}",
            self.name,
            self.flags.bits(),
            self.chrom,
            self.start,
            self.end
        )
    }
}
