//! Fragment model: the reads of one sequenced molecule and its comparison key.
//!
//! A fragment is keyed by read name. Its coordinate key is built once from
//! the first read seen, using the mate's `MC` tag for the far end, so both
//! mates of a pair produce the same key.

use std::cmp::Ordering;
use std::fmt;

use crate::partition::PartitionId;
use crate::read::AlignedRead;

/// Duplicate-marking state of a fragment.
///
/// `None`, `Primary` and `Duplicate` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FragmentStatus {
    #[default]
    Unset,
    None,
    Primary,
    Duplicate,
    Candidate,
    Supplementary,
}

impl FragmentStatus {
    #[inline]
    pub fn is_resolved(self) -> bool {
        matches!(
            self,
            FragmentStatus::None | FragmentStatus::Primary | FragmentStatus::Duplicate
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FragmentStatus::Unset => "UNSET",
            FragmentStatus::None => "NONE",
            FragmentStatus::Primary => "PRIMARY",
            FragmentStatus::Duplicate => "DUPLICATE",
            FragmentStatus::Candidate => "CANDIDATE",
            FragmentStatus::Supplementary => "SUPPLEMENTARY",
        }
    }
}

impl fmt::Display for FragmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal decision for a fragment, copied onto reads that arrive later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub status: FragmentStatus,
    pub duplicate_count: u32,
}

/// Reads seen for one fragment, against what their flags and `SA` tags announce.
///
/// Tallies of separate parts of a fragment add up to the tally of the whole.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadTally {
    pub primaries: usize,
    pub supplementary: usize,
    pub expected_supplementary: usize,
    pub paired: bool,
}

impl ReadTally {
    pub fn of(reads: &[AlignedRead]) -> Self {
        let mut tally = Self::default();
        tally.add(reads);
        tally
    }

    pub fn add(&mut self, reads: &[AlignedRead]) {
        for read in reads {
            if read.is_supplementary() {
                self.supplementary += 1;
            } else {
                self.primaries += 1;
                self.expected_supplementary += read.supplementary_count;
                self.paired |= read.flags.is_paired();
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        let expected_primaries = if self.paired { 2 } else { 1 };
        self.primaries >= expected_primaries && self.supplementary >= self.expected_supplementary
    }
}

/// One end of a fragment: reference, unclipped position and strand.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FragmentEnd<'a> {
    chrom: &'a str,
    ref_index: Option<usize>,
    position: i64,
    reverse: bool,
}

impl FragmentEnd<'_> {
    /// Lower end first: by position then forward strand on one reference,
    /// by reference index across references.
    fn order(&self, other: &Self) -> Ordering {
        if self.chrom == other.chrom {
            self.position
                .cmp(&other.position)
                .then(self.reverse.cmp(&other.reverse))
        } else {
            let index = |end: &Self| end.ref_index.unwrap_or(usize::MAX);
            index(self)
                .cmp(&index(other))
                .then_with(|| self.chrom.cmp(other.chrom))
        }
    }

    fn signed_position(&self) -> i64 {
        let position = self.position.max(1);
        if self.reverse {
            -position
        } else {
            position
        }
    }
}

impl fmt::Display for FragmentEnd<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let strand = if self.reverse { '-' } else { '+' };
        write!(f, "{}:{}{}", self.chrom, self.position, strand)
    }
}

/// Comparison key and bucket position of a fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FragmentCoordinates {
    /// `chrom:pos±` per end, lower end first, joined by `_`.
    pub key: String,
    /// Signed bucket position, negative for reverse strand.
    pub initial_position: i64,
}

impl FragmentCoordinates {
    /// Derive coordinates from the first read seen for a fragment.
    pub fn from_read(read: &AlignedRead) -> Self {
        let own = FragmentEnd {
            chrom: &read.chrom,
            ref_index: read.ref_index,
            position: read.unclipped_position(),
            reverse: read.is_reverse(),
        };

        let mate = match (read.mate_unclipped_position(), read.mate_chrom.as_deref()) {
            (Some(position), Some(chrom)) => Some(FragmentEnd {
                chrom,
                ref_index: read.mate_ref_index,
                position,
                reverse: read.flags.is_mate_reverse(),
            }),
            _ => None,
        };

        match mate {
            None => Self {
                key: own.to_string(),
                initial_position: own.signed_position(),
            },
            Some(mate) => {
                let (lower, upper) = if mate.order(&own) == Ordering::Less {
                    (&mate, &own)
                } else {
                    (&own, &mate)
                };
                let initial = if mate.chrom == own.chrom {
                    lower.signed_position()
                } else {
                    own.signed_position()
                };
                Self {
                    key: format!("{}_{}", lower, upper),
                    initial_position: initial,
                }
            }
        }
    }
}

/// The reads of one sequenced molecule.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    /// Read name shared by every read of the fragment.
    pub id: String,
    pub reads: Vec<AlignedRead>,
    pub coordinates: FragmentCoordinates,
    pub status: FragmentStatus,
    /// Fragments sharing this key, this one included.
    pub duplicate_count: u32,
    average_base_quality: Option<u32>,
}

impl Fragment {
    /// Start a fragment from its first read.
    pub fn new(read: AlignedRead) -> Self {
        Self {
            id: read.name.clone(),
            coordinates: FragmentCoordinates::from_read(&read),
            reads: vec![read],
            status: FragmentStatus::Unset,
            duplicate_count: 1,
            average_base_quality: None,
        }
    }

    /// Set the status (builder pattern).
    pub fn with_status(mut self, status: FragmentStatus) -> Self {
        self.status = status;
        self
    }

    pub fn add_read(&mut self, read: AlignedRead) {
        self.reads.push(read);
        self.average_base_quality = None;
    }

    /// Rounded mean base quality over non-supplementary reads, cached.
    pub fn average_base_quality(&mut self) -> u32 {
        if let Some(quality) = self.average_base_quality {
            return quality;
        }

        let (sum, count) = self
            .reads
            .iter()
            .filter(|r| !r.is_supplementary())
            .flat_map(|r| r.base_qualities.iter())
            .fold((0u64, 0u64), |(sum, count), &q| (sum + q as u64, count + 1));
        let quality = if count == 0 {
            0
        } else {
            ((2 * sum + count) / (2 * count)) as u32
        };

        self.average_base_quality = Some(quality);
        quality
    }

    fn primary_reads(&self) -> impl Iterator<Item = &AlignedRead> {
        self.reads.iter().filter(|r| !r.is_supplementary())
    }

    /// True when no primary alignment has been attached yet.
    pub fn is_supplementary_only(&self) -> bool {
        self.primary_reads().next().is_none()
    }

    /// All primary reads present plus every supplementary their `SA` tags announce.
    pub fn is_complete(&self) -> bool {
        ReadTally::of(&self.reads).is_complete()
    }

    /// Fold the reads of another part of the same fragment into this one.
    ///
    /// Coordinates follow a primary read when this part had none.
    pub fn merge(&mut self, other: Fragment) {
        if self.is_supplementary_only() && !other.is_supplementary_only() {
            self.coordinates = other.coordinates;
        }
        if !self.status.is_resolved() && other.status.is_resolved() {
            self.status = other.status;
            self.duplicate_count = other.duplicate_count;
        }
        self.reads.extend(other.reads);
        self.average_base_quality = None;
    }

    /// The terminal decision, if one was reached.
    pub fn verdict(&self) -> Option<Verdict> {
        self.status.is_resolved().then_some(Verdict {
            status: self.status,
            duplicate_count: self.duplicate_count,
        })
    }

    pub fn apply(&mut self, verdict: Verdict) {
        self.status = verdict.status;
        self.duplicate_count = verdict.duplicate_count;
    }

    /// Partition holding the lower of the fragment's two primary locations.
    ///
    /// None when a needed reference is not in the genome.
    pub fn base_partition(&self, partition_size: u32) -> Option<PartitionId> {
        let read = self.primary_reads().next().or_else(|| self.reads.first())?;
        base_partition(read, partition_size)
    }
}

/// Partition of the lower of a read's primary location and its mate's location.
///
/// Supplementary reads take their primary location from the `SA` tag.
pub fn base_partition(read: &AlignedRead, partition_size: u32) -> Option<PartitionId> {
    let own = match (&read.supplementary, read.is_supplementary()) {
        (Some(sa), true) => (sa.ref_index?, sa.pos, sa.chrom.as_str()),
        _ => (read.ref_index?, read.start, read.chrom.as_str()),
    };

    let lower = if read.has_mapped_mate() {
        let mate = (
            read.mate_ref_index?,
            read.mate_start,
            read.mate_chrom.as_deref()?,
        );
        if (mate.0, mate.1) < (own.0, own.1) {
            mate
        } else {
            own
        }
    } else {
        own
    };

    Some(PartitionId::for_position(lower.2, lower.1, partition_size))
}
