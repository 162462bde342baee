//! Coordinate partitions and the shared store resolving fragments across them.
//!
//! A fragment whose reads straddle partitions is decided by the partition
//! holding its lower end. That partition's driver routes the decided
//! fragment here as a [`Verdict`]; reads of the same fragment routed from
//! elsewhere adopt it or wait until it arrives or the partition drains.
//! A verdict is dropped once every read its fragment announces has taken it.

use std::collections::hash_map::Entry;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Mutex, MutexGuard, PoisonError};

use rustc_hash::{FxHashMap, FxHasher};

use crate::classifier::check_duplicate;
use crate::fragment::{Fragment, FragmentStatus, ReadTally, Verdict};

/// Number of independently locked shards.
pub const SHARD_COUNT: usize = 64;

/// A fixed-size coordinate window on one chromosome.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionId {
    pub chromosome: String,
    pub index: u32,
}

impl PartitionId {
    pub fn new(chromosome: impl Into<String>, index: u32) -> Self {
        Self {
            chromosome: chromosome.into(),
            index,
        }
    }

    /// Partition containing `position`.
    #[inline]
    pub fn for_position(chromosome: impl Into<String>, position: u32, partition_size: u32) -> Self {
        Self::new(chromosome, position / partition_size)
    }

    /// The following partition on the same chromosome.
    pub fn next(&self) -> Self {
        Self::new(self.chromosome.clone(), self.index + 1)
    }

    /// First position covered.
    #[inline]
    pub fn start(&self, partition_size: u32) -> u64 {
        self.index as u64 * partition_size as u64
    }

    /// Last position covered (inclusive).
    #[inline]
    pub fn end(&self, partition_size: u32) -> u64 {
        self.start(partition_size) + partition_size as u64 - 1
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.chromosome, self.index)
    }
}

/// A decision and the reads that have taken it so far.
#[derive(Debug, Clone, Copy)]
struct Settlement {
    verdict: Verdict,
    tally: ReadTally,
}

#[derive(Debug, Default)]
struct PartitionData {
    /// Undecided fragments, merged by read name.
    pending: FxHashMap<String, Fragment>,
    /// Decisions made for this partition, kept while reads are still expected.
    verdicts: FxHashMap<String, Settlement>,
}

impl PartitionData {
    fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.verdicts.is_empty()
    }

    fn accept(&mut self, mut fragment: Fragment, resolved: &mut Vec<Fragment>) {
        if let Some(verdict) = fragment.verdict() {
            let mut tally = ReadTally::of(&fragment.reads);
            if let Some(mut waiting) = self.pending.remove(&fragment.id) {
                tally.add(&waiting.reads);
                waiting.apply(verdict);
                resolved.push(waiting);
            }
            self.settle(fragment.id.clone(), verdict, tally);
            resolved.push(fragment);
            return;
        }

        if let Some(settlement) = self.verdicts.get_mut(&fragment.id) {
            fragment.apply(settlement.verdict);
            settlement.tally.add(&fragment.reads);
            if settlement.tally.is_complete() {
                self.verdicts.remove(&fragment.id);
            }
            resolved.push(fragment);
            return;
        }

        match self.pending.entry(fragment.id.clone()) {
            Entry::Occupied(mut entry) => entry.get_mut().merge(fragment),
            Entry::Vacant(entry) => {
                entry.insert(fragment);
            }
        }
    }

    /// Classify everything still pending, grouped by initial position.
    fn drain_pending(&mut self) -> Vec<Fragment> {
        let mut pending: Vec<Fragment> = self.pending.drain().map(|(_, f)| f).collect();
        pending.sort_by(|a, b| {
            a.coordinates
                .initial_position
                .cmp(&b.coordinates.initial_position)
                .then_with(|| a.id.cmp(&b.id))
        });

        let mut resolved = Vec::with_capacity(pending.len());
        let mut group: Vec<Fragment> = Vec::new();
        let mut group_position = None;

        for mut fragment in pending {
            let position = fragment.coordinates.initial_position;
            if group_position != Some(position) {
                finish_group(&mut group, &mut resolved);
                group_position = Some(position);
            }

            if fragment.is_supplementary_only() {
                fragment.status = FragmentStatus::None;
                resolved.push(fragment);
            } else if let Some(loser) = check_duplicate(fragment, &mut group) {
                resolved.push(loser);
            }
        }
        finish_group(&mut group, &mut resolved);

        for fragment in &resolved {
            if let Some(verdict) = fragment.verdict() {
                self.settle(fragment.id.clone(), verdict, ReadTally::of(&fragment.reads));
            }
        }
        resolved
    }

    /// Keep a verdict only while reads of its fragment are still to come.
    fn settle(&mut self, id: String, verdict: Verdict, tally: ReadTally) {
        if tally.is_complete() {
            self.verdicts.remove(&id);
        } else {
            self.verdicts.insert(id, Settlement { verdict, tally });
        }
    }
}

fn finish_group(group: &mut Vec<Fragment>, resolved: &mut Vec<Fragment>) {
    for mut fragment in group.drain(..) {
        if !fragment.status.is_resolved() {
            fragment.status = FragmentStatus::None;
        }
        resolved.push(fragment);
    }
}

/// Fragments waiting on, or decided by, another partition.
///
/// Partition ids hash to one of [`SHARD_COUNT`] mutex-guarded maps, so
/// workers touching different partitions rarely contend.
pub struct CrossPartitionStore {
    shards: Vec<Mutex<FxHashMap<PartitionId, PartitionData>>>,
}

impl Default for CrossPartitionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CrossPartitionStore {
    pub fn new() -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| Mutex::default()).collect(),
        }
    }

    fn shard_index(id: &PartitionId) -> usize {
        let mut hasher = FxHasher::default();
        id.hash(&mut hasher);
        (hasher.finish() as usize) % SHARD_COUNT
    }

    fn lock(&self, index: usize) -> MutexGuard<'_, FxHashMap<PartitionId, PartitionData>> {
        self.shards[index]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand fragments to `target`.
    ///
    /// Decided fragments record their verdict and come back together with
    /// any waiting fragment of the same name. Undecided fragments come back
    /// only when a verdict already exists; otherwise they wait.
    pub fn route(&self, target: &PartitionId, fragments: Vec<Fragment>) -> Vec<Fragment> {
        if fragments.is_empty() {
            return Vec::new();
        }

        let mut shard = self.lock(Self::shard_index(target));
        let data = shard.entry(target.clone()).or_default();
        let mut resolved = Vec::new();
        for fragment in fragments {
            data.accept(fragment, &mut resolved);
        }
        if data.is_empty() {
            shard.remove(target);
        }
        resolved
    }

    /// Resolve everything still waiting on `partition`.
    ///
    /// Waiting fragments are compared in (initial position, read name)
    /// order; those holding only supplementary reads come back NONE.
    pub fn drain(&self, partition: &PartitionId) -> Vec<Fragment> {
        let mut shard = self.lock(Self::shard_index(partition));
        let Some(data) = shard.get_mut(partition) else {
            return Vec::new();
        };
        let resolved = data.drain_pending();
        if data.is_empty() {
            shard.remove(partition);
        }
        resolved
    }

    /// Drain every partition in partition-id order and clear the store.
    pub fn drain_all(&self) -> Vec<Fragment> {
        let mut ids: Vec<PartitionId> = (0..SHARD_COUNT)
            .flat_map(|i| self.lock(i).keys().cloned().collect::<Vec<_>>())
            .collect();
        ids.sort();

        let mut resolved = Vec::new();
        for id in &ids {
            resolved.extend(self.drain(id));
        }
        for i in 0..SHARD_COUNT {
            self.lock(i).clear();
        }
        resolved
    }

    /// Fragments currently waiting, across all partitions.
    pub fn pending_count(&self) -> usize {
        (0..SHARD_COUNT)
            .map(|i| self.lock(i).values().map(|d| d.pending.len()).sum::<usize>())
            .sum()
    }

    /// Verdicts held for reads still to arrive, across all partitions.
    pub fn verdict_count(&self) -> usize {
        (0..SHARD_COUNT)
            .map(|i| self.lock(i).values().map(|d| d.verdicts.len()).sum::<usize>())
            .sum()
    }

    /// Nothing waiting and no verdict held.
    pub fn is_empty(&self) -> bool {
        (0..SHARD_COUNT).all(|i| self.lock(i).is_empty())
    }

    /// Fragments waiting on one partition.
    pub fn pending_in(&self, partition: &PartitionId) -> usize {
        self.lock(Self::shard_index(partition))
            .get(partition)
            .map_or(0, |d| d.pending.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read::AlignedRead;

    /// One read of a pair whose mate sits 300 bases further on.
    fn fragment(name: &str, start: u32, quality: u8) -> Fragment {
        Fragment::new(
            AlignedRead::mapped(name, "chr1", 0, start, "10M")
                .unwrap()
                .with_mate("chr1", Some(0), start + 300, Some("10M"), true)
                .unwrap()
                .with_quality(quality, 10),
        )
    }

    #[test]
    fn test_partition_id() {
        let id = PartitionId::for_position("chr1", 2_500_000, 1_000_000);
        assert_eq!(id, PartitionId::new("chr1", 2));
        assert_eq!(id.start(1_000_000), 2_000_000);
        assert_eq!(id.end(1_000_000), 2_999_999);
        assert_eq!(id.next().index, 3);
        assert_eq!(id.to_string(), "chr1_2");
        assert_eq!(PartitionId::for_position("chr1", 999_999, 1_000_000).index, 0);
    }

    #[test]
    fn test_verdict_releases_waiting_fragment() {
        let store = CrossPartitionStore::new();
        let target = PartitionId::new("chr1", 0);

        let waiting = fragment("r1", 100, 30).with_status(FragmentStatus::Candidate);
        assert!(store.route(&target, vec![waiting]).is_empty());
        assert_eq!(store.pending_in(&target), 1);

        let mut decided = fragment("r1", 100, 30).with_status(FragmentStatus::Duplicate);
        decided.duplicate_count = 2;
        let resolved = store.route(&target, vec![decided]);

        assert_eq!(resolved.len(), 2);
        assert!(resolved
            .iter()
            .all(|f| f.status == FragmentStatus::Duplicate && f.duplicate_count == 2));
        assert_eq!(store.pending_count(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_late_arrival_adopts_verdict() {
        let store = CrossPartitionStore::new();
        let target = PartitionId::new("chr1", 0);

        let decided = fragment("r1", 100, 30).with_status(FragmentStatus::Primary);
        assert_eq!(store.route(&target, vec![decided]).len(), 1);

        assert_eq!(store.verdict_count(), 1);

        let late = fragment("r1", 400, 30).with_status(FragmentStatus::Candidate);
        let resolved = store.route(&target, vec![late]);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].status, FragmentStatus::Primary);
        assert!(store.is_empty());
    }

    #[test]
    fn test_verdict_kept_until_supplementary_arrives() {
        let store = CrossPartitionStore::new();
        let target = PartitionId::new("chr1", 0);

        let mut decided = fragment("r1", 100, 30).with_status(FragmentStatus::Duplicate);
        decided.reads[0].supplementary_count = 1;
        store.route(&target, vec![decided]);

        let mate = fragment("r1", 400, 30).with_status(FragmentStatus::Candidate);
        assert_eq!(store.route(&target, vec![mate]).len(), 1);
        assert_eq!(store.verdict_count(), 1);

        let mut read = AlignedRead::mapped("r1", "chr1", 0, 9_000, "10M").unwrap();
        read.flags = read.flags.with(crate::read::ReadFlags::SUPPLEMENTARY, true);
        let supplementary = Fragment::new(read).with_status(FragmentStatus::Supplementary);
        let resolved = store.route(&target, vec![supplementary]);
        assert_eq!(resolved[0].status, FragmentStatus::Duplicate);
        assert!(store.is_empty());
    }

    #[test]
    fn test_drain_classifies_pending() {
        let store = CrossPartitionStore::new();
        let target = PartitionId::new("chr1", 0);

        store.route(
            &target,
            vec![
                fragment("b", 100, 30).with_status(FragmentStatus::Candidate),
                fragment("a", 100, 30).with_status(FragmentStatus::Candidate),
                fragment("c", 200, 30).with_status(FragmentStatus::Candidate),
            ],
        );
        let mut resolved = store.drain(&target);
        resolved.sort_by(|x, y| x.id.cmp(&y.id));

        let statuses: Vec<_> = resolved.iter().map(|f| (f.id.as_str(), f.status)).collect();
        assert_eq!(
            statuses,
            vec![
                ("a", FragmentStatus::Primary),
                ("b", FragmentStatus::Duplicate),
                ("c", FragmentStatus::None),
            ]
        );
        assert!(store.drain(&target).is_empty());

        // Drained decisions stay available to stragglers.
        assert_eq!(store.verdict_count(), 3);
        let late = store.route(
            &target,
            vec![fragment("b", 400, 30).with_status(FragmentStatus::Candidate)],
        );
        assert_eq!(late[0].status, FragmentStatus::Duplicate);
        assert_eq!(store.verdict_count(), 2);
    }

    #[test]
    fn test_merge_by_name_while_pending() {
        let store = CrossPartitionStore::new();
        let target = PartitionId::new("chr1", 0);

        store.route(&target, vec![fragment("r1", 100, 30)]);
        store.route(&target, vec![fragment("r1", 400, 30)]);
        assert_eq!(store.pending_in(&target), 1);

        let resolved = store.drain(&target);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].reads.len(), 2);
        assert_eq!(resolved[0].status, FragmentStatus::None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_drain_all_clears_store() {
        let store = CrossPartitionStore::new();
        for i in 0..10 {
            let target = PartitionId::new(format!("chr{}", i), i);
            store.route(&target, vec![fragment(&format!("r{}", i), 100, 30)]);
        }
        assert_eq!(store.pending_count(), 10);
        assert_eq!(store.drain_all().len(), 10);
        assert_eq!(store.pending_count(), 0);
        assert!(store.is_empty());
    }
}
