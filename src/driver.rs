//! Per-chromosome scan: feeds reads through the position cache, advances
//! partitions and hands resolved fragments to the sink.

use std::fmt;
use std::mem;
use std::ops::AddAssign;

use log::{debug, info};
use rustc_hash::FxHashMap;

use crate::config::DedupConfig;
use crate::error::{DedupError, Result};
use crate::fragment::{Fragment, FragmentStatus};
use crate::partition::{CrossPartitionStore, PartitionId};
use crate::position_cache::{PositionCache, ProcessOutcome};
use crate::read::AlignedRead;
use crate::streaming::FragmentSink;

/// Counters for one chromosome or a whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DedupStats {
    pub reads: u64,
    pub fragments: u64,
    pub reads_written: u64,
    pub primaries: u64,
    pub duplicates: u64,
    pub out_of_order: u64,
    pub unpairable: u64,
    pub unplaced: u64,
    pub partitions: u64,
}

impl DedupStats {
    /// Count a batch about to be written.
    pub fn record(&mut self, fragments: &[Fragment]) {
        for fragment in fragments {
            self.fragments += 1;
            self.reads_written += fragment.reads.len() as u64;
            match fragment.status {
                FragmentStatus::Primary => self.primaries += 1,
                FragmentStatus::Duplicate => self.duplicates += 1,
                _ => {}
            }
        }
    }
}

impl AddAssign for DedupStats {
    fn add_assign(&mut self, other: Self) {
        self.reads += other.reads;
        self.fragments += other.fragments;
        self.reads_written += other.reads_written;
        self.primaries += other.primaries;
        self.duplicates += other.duplicates;
        self.out_of_order += other.out_of_order;
        self.unpairable += other.unpairable;
        self.unplaced += other.unplaced;
        self.partitions += other.partitions;
    }
}

impl fmt::Display for DedupStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Reads: {}, Written: {}, Fragments: {}, Primary: {}, Duplicate: {}, \
             Out-of-order: {}, Unpairable: {}, Unplaced: {}, Partitions: {}",
            self.reads,
            self.reads_written,
            self.fragments,
            self.primaries,
            self.duplicates,
            self.out_of_order,
            self.unpairable,
            self.unplaced,
            self.partitions
        )
    }
}

/// Where the driver is in its chromosome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanState {
    AwaitingFirstRead,
    Scanning(PartitionId),
    Complete,
}

/// Drives one chromosome's coordinate-sorted reads.
pub struct ChromosomeDriver<'a, S: FragmentSink> {
    chromosome: String,
    config: &'a DedupConfig,
    store: &'a CrossPartitionStore,
    cache: PositionCache,
    state: ScanState,
    /// Fragments to hand to other partitions when the current one completes.
    pending_incomplete: FxHashMap<PartitionId, Vec<Fragment>>,
    stats: DedupStats,
    partition_reads: u64,
    sink: S,
}

impl<'a, S: FragmentSink> ChromosomeDriver<'a, S> {
    pub fn new(
        chromosome: impl Into<String>,
        config: &'a DedupConfig,
        store: &'a CrossPartitionStore,
        sink: S,
    ) -> Self {
        let chromosome = chromosome.into();
        info!("Marking duplicates on {}", chromosome);
        Self {
            cache: PositionCache::new(chromosome.clone(), config.buffer_size),
            chromosome,
            config,
            store,
            state: ScanState::AwaitingFirstRead,
            pending_incomplete: FxHashMap::default(),
            stats: DedupStats::default(),
            partition_reads: 0,
            sink,
        }
    }

    pub fn chromosome(&self) -> &str {
        &self.chromosome
    }

    pub fn state(&self) -> &ScanState {
        &self.state
    }

    pub fn stats(&self) -> &DedupStats {
        &self.stats
    }

    /// Process the next read of this chromosome.
    pub fn process_read(&mut self, read: AlignedRead) -> Result<()> {
        self.stats.reads += 1;
        if read.chrom != self.chromosome {
            return Err(DedupError::unexpected(
                read.name,
                format!(
                    "found on {} while scanning {}",
                    read.chrom, self.chromosome
                ),
            ));
        }

        let size = self.config.partition_size;
        let mut current = match &self.state {
            ScanState::AwaitingFirstRead => {
                PartitionId::for_position(self.chromosome.clone(), read.start, size)
            }
            ScanState::Scanning(current) => current.clone(),
            ScanState::Complete => {
                return Err(DedupError::unexpected(
                    read.name,
                    format!("arrived after {} was completed", self.chromosome),
                ));
            }
        };
        while read.start as u64 > current.end(size) {
            self.complete_partition(&current)?;
            current = current.next();
        }
        self.state = ScanState::Scanning(current.clone());
        self.partition_reads += 1;

        if read.is_unmapped() && !read.has_mapped_mate() {
            return self.write(vec![Fragment::new(read).with_status(FragmentStatus::None)]);
        }
        if is_unpairable(&read) {
            return self.write_unpairable(read);
        }

        match self.cache.process_read(read)? {
            ProcessOutcome::Handled => {}
            ProcessOutcome::Rejected(_) => self.stats.out_of_order += 1,
            ProcessOutcome::Unhandled(read) => self.route_unhandled(read, &current)?,
        }

        let resolved = self.cache.take_resolved();
        self.dispatch_resolved(resolved, &current)
    }

    fn write(&mut self, fragments: Vec<Fragment>) -> Result<()> {
        if fragments.is_empty() {
            return Ok(());
        }
        self.stats.record(&fragments);
        self.sink.accept(fragments)
    }

    fn write_unpairable(&mut self, read: AlignedRead) -> Result<()> {
        debug!(
            "Read {} on {}:{} has a mate outside the genome",
            read.name, read.chrom, read.start
        );
        self.stats.unpairable += 1;
        self.write(vec![Fragment::new(read).with_status(FragmentStatus::None)])
    }

    /// New fragment for a read the cache could not place.
    fn route_unhandled(&mut self, read: AlignedRead, current: &PartitionId) -> Result<()> {
        let Some(base) = crate::fragment::base_partition(&read, self.config.partition_size) else {
            return self.write_unpairable(read);
        };

        let mut fragment = Fragment::new(read);
        if fragment.is_supplementary_only() {
            fragment.status = FragmentStatus::Supplementary;
        }

        if &base == current {
            let resolved = self.store.route(&base, vec![fragment]);
            self.write(resolved)
        } else {
            self.pending_incomplete.entry(base).or_default().push(fragment);
            Ok(())
        }
    }

    /// Write complete fragments; route or queue the rest.
    fn dispatch_resolved(&mut self, fragments: Vec<Fragment>, current: &PartitionId) -> Result<()> {
        if fragments.is_empty() {
            return Ok(());
        }

        let mut done = Vec::with_capacity(fragments.len());
        let mut authoritative = Vec::new();
        for mut fragment in fragments {
            if fragment.is_complete() {
                done.push(fragment);
                continue;
            }
            match fragment.base_partition(self.config.partition_size) {
                Some(base) if &base == current => authoritative.push(fragment),
                Some(base) => {
                    fragment.status = FragmentStatus::Candidate;
                    self.pending_incomplete.entry(base).or_default().push(fragment);
                }
                None => {
                    self.stats.unpairable += 1;
                    fragment.status = FragmentStatus::None;
                    done.push(fragment);
                }
            }
        }

        done.extend(self.store.route(current, authoritative));
        self.write(done)
    }

    fn complete_partition(&mut self, partition: &PartitionId) -> Result<()> {
        self.cache.evict_all();
        let resolved = self.cache.take_resolved();
        self.dispatch_resolved(resolved, partition)?;

        let mut queued: Vec<(PartitionId, Vec<Fragment>)> =
            mem::take(&mut self.pending_incomplete).into_iter().collect();
        queued.sort_by(|a, b| a.0.cmp(&b.0));
        for (target, fragments) in queued {
            let resolved = self.store.route(&target, fragments);
            self.write(resolved)?;
        }

        let drained = self.store.drain(partition);
        self.write(drained)?;

        debug!(
            "Partition {} complete ({} reads)",
            partition, self.partition_reads
        );
        self.partition_reads = 0;
        self.stats.partitions += 1;
        Ok(())
    }

    /// Complete the last partition and return the counters and sink.
    pub fn finish(mut self) -> Result<(DedupStats, S)> {
        if let ScanState::Scanning(current) = mem::replace(&mut self.state, ScanState::Complete) {
            self.complete_partition(&current)?;
        }
        info!(
            "Finished {}: {} reads, {} duplicates",
            self.chromosome, self.stats.reads, self.stats.duplicates
        );
        Ok((self.stats, self.sink))
    }
}

/// Mate or primary alignment on a reference outside the genome.
fn is_unpairable(read: &AlignedRead) -> bool {
    if read.has_mapped_mate() && read.mate_ref_index.is_none() {
        return true;
    }
    read.is_supplementary()
        && read
            .supplementary
            .as_ref()
            .is_some_and(|sa| sa.ref_index.is_none())
}
