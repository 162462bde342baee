//! Bounded position index of live fragments for one chromosome.
//!
//! Forward-strand buckets live in a circular array covering `capacity`
//! consecutive positions starting at `min_position`. Only read starts move
//! the window. A forward bucket past its end (a pair whose lower end is a
//! mate still to come) waits in an ordered side map and enters the ring once
//! the scan reaches it. Reverse-strand buckets are keyed by their negative
//! position in a second side map and swept once the scan has moved past
//! them. Evicted fragments are collected for the caller with
//! [`PositionCache::take_resolved`].

use std::collections::BTreeMap;

use log::warn;
use rustc_hash::FxHashMap;

use crate::classifier::check_duplicate;
use crate::error::{DedupError, Result};
use crate::fragment::{Fragment, FragmentStatus};
use crate::read::AlignedRead;

/// Fragments whose initial position is one bucket.
#[derive(Debug, Clone)]
pub struct PositionFragments {
    pub position: i64,
    /// Live candidates, unique by coordinate key.
    pub candidates: Vec<Fragment>,
    /// Duplicates already decided at insertion.
    pub resolved: Vec<Fragment>,
}

impl PositionFragments {
    pub fn new(position: i64) -> Self {
        Self {
            position,
            candidates: Vec::new(),
            resolved: Vec::new(),
        }
    }

    /// Classify a new fragment against the live candidates.
    pub fn insert(&mut self, fragment: Fragment) {
        if let Some(duplicate) = check_duplicate(fragment, &mut self.candidates) {
            self.resolved.push(duplicate);
        }
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut Fragment> {
        self.candidates
            .iter_mut()
            .chain(self.resolved.iter_mut())
            .find(|f| f.id == id)
    }

    pub fn len(&self) -> usize {
        self.candidates.len() + self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of offering a read to the cache.
#[derive(Debug)]
pub enum ProcessOutcome {
    /// Stored as a new fragment or attached to a cached one.
    Handled,
    /// Not cacheable here; the caller routes it across partitions.
    Unhandled(AlignedRead),
    /// Below the window: out-of-order input, dropped.
    Rejected(AlignedRead),
}

/// Ring buffer of [`PositionFragments`] for one chromosome.
pub struct PositionCache {
    chromosome: String,
    capacity: usize,
    forward: Vec<Option<PositionFragments>>,
    /// Forward buckets at or beyond `min_position + capacity`.
    ahead: BTreeMap<i64, PositionFragments>,
    reverse: FxHashMap<i64, PositionFragments>,
    /// Read name to bucket position.
    fragment_positions: FxHashMap<String, i64>,
    /// First position in the window; 0 when unset.
    min_position: i64,
    min_index: usize,
    resolved: Vec<Fragment>,
}

impl PositionCache {
    pub fn new(chromosome: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            chromosome: chromosome.into(),
            capacity,
            forward: (0..capacity).map(|_| None).collect(),
            ahead: BTreeMap::new(),
            reverse: FxHashMap::default(),
            fragment_positions: FxHashMap::default(),
            min_position: 0,
            min_index: 0,
            resolved: Vec::new(),
        }
    }

    pub fn min_position(&self) -> i64 {
        self.min_position
    }

    /// Number of cached fragments.
    pub fn len(&self) -> usize {
        self.fragment_positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragment_positions.is_empty()
    }

    /// Offer one read, in coordinate order.
    pub fn process_read(&mut self, read: AlignedRead) -> Result<ProcessOutcome> {
        let start = read.start as i64;
        if self.min_position > 0 && start < self.min_position {
            warn!(
                "Dropping out-of-order read {} at {}:{} (window starts at {})",
                read.name, self.chromosome, start, self.min_position
            );
            return Ok(ProcessOutcome::Rejected(read));
        }
        self.check_flush(start);

        if let Some(&position) = self.fragment_positions.get(&read.name) {
            if let Some(fragment) = self.bucket_mut(position).and_then(|b| b.find_mut(&read.name)) {
                fragment.add_read(read);
                return Ok(ProcessOutcome::Handled);
            }
            self.fragment_positions.remove(&read.name);
        }

        if read.is_supplementary() || read.is_unmapped() {
            return Ok(ProcessOutcome::Unhandled(read));
        }

        let starts_fragment = !read.mate_on_same_reference() || read.start <= read.mate_start;
        if !starts_fragment {
            return Ok(ProcessOutcome::Unhandled(read));
        }

        self.store(Fragment::new(read))?;
        Ok(ProcessOutcome::Handled)
    }

    fn store(&mut self, fragment: Fragment) -> Result<()> {
        let position = fragment.coordinates.initial_position;
        let id = fragment.id.clone();

        if position < 0 {
            self.reverse
                .entry(position)
                .or_insert_with(|| PositionFragments::new(position))
                .insert(fragment);
        } else if position - self.min_position >= self.capacity as i64 {
            self.ahead
                .entry(position)
                .or_insert_with(|| PositionFragments::new(position))
                .insert(fragment);
        } else {
            let index = self.index(position)?;
            self.forward[index]
                .get_or_insert_with(|| PositionFragments::new(position))
                .insert(fragment);
        }

        self.fragment_positions.insert(id, position);
        Ok(())
    }

    /// Slot of a forward position inside the window.
    pub fn index(&self, position: i64) -> Result<usize> {
        let offset = position - self.min_position;
        if self.min_position == 0 || offset < 0 || offset >= self.capacity as i64 {
            return Err(DedupError::IndexOutOfBounds {
                chromosome: self.chromosome.clone(),
                position,
                min_position: self.min_position,
                capacity: self.capacity,
            });
        }
        Ok((offset as usize + self.min_index) % self.capacity)
    }

    fn bucket_mut(&mut self, position: i64) -> Option<&mut PositionFragments> {
        if position < 0 {
            return self.reverse.get_mut(&position);
        }
        if self.ahead.contains_key(&position) {
            return self.ahead.get_mut(&position);
        }
        let index = self.index(position).ok()?;
        self.forward[index]
            .as_mut()
            .filter(|bucket| bucket.position == position)
    }

    fn recenter(&mut self, position: i64) {
        let half = (self.capacity as f64 * 0.5).round() as i64;
        self.min_position = (position - half).max(1);
        self.min_index = 0;
    }

    /// Slide the window so `position` fits, evicting what falls out.
    fn check_flush(&mut self, position: i64) {
        if self.min_position == 0 {
            self.recenter(position);
            return;
        }

        let capacity = self.capacity as i64;
        let offset = position - self.min_position;
        if offset < capacity {
            return;
        }

        let steps = (offset - capacity + 1).min(capacity);
        for _ in 0..steps {
            if let Some(bucket) = self.forward[self.min_index].take() {
                self.evict(bucket);
            }
            self.min_index = (self.min_index + 1) % self.capacity;
            self.min_position += 1;
        }
        if steps == capacity {
            self.recenter(position);
        }

        self.admit_ahead();
        self.sweep_reverse(position);
    }

    /// Move waiting forward buckets the window now covers into the ring.
    fn admit_ahead(&mut self) {
        let limit = self.min_position + self.capacity as i64;
        while let Some(entry) = self.ahead.first_entry() {
            let position = *entry.key();
            if position >= limit {
                break;
            }
            let bucket = entry.remove();
            match self.index(position) {
                Ok(index) => self.forward[index] = Some(bucket),
                // The scan already passed it.
                Err(_) => self.evict(bucket),
            }
        }
    }

    /// Evict reverse buckets the scan has passed.
    fn sweep_reverse(&mut self, position: i64) {
        let mut passed: Vec<i64> = self
            .reverse
            .keys()
            .copied()
            .filter(|&key| -key < position)
            .collect();
        passed.sort_unstable_by(|a, b| b.cmp(a));

        for key in passed {
            if let Some(bucket) = self.reverse.remove(&key) {
                self.evict(bucket);
            }
        }
    }

    fn evict(&mut self, bucket: PositionFragments) {
        for mut fragment in bucket.candidates.into_iter().chain(bucket.resolved) {
            self.fragment_positions.remove(&fragment.id);
            if matches!(
                fragment.status,
                FragmentStatus::Unset | FragmentStatus::Candidate
            ) {
                fragment.status = FragmentStatus::None;
            }
            self.resolved.push(fragment);
        }
    }

    /// Evict every bucket and reset the window.
    pub fn evict_all(&mut self) {
        for step in 0..self.capacity {
            let index = (self.min_index + step) % self.capacity;
            if let Some(bucket) = self.forward[index].take() {
                self.evict(bucket);
            }
        }
        while let Some((_, bucket)) = self.ahead.pop_first() {
            self.evict(bucket);
        }

        let mut keys: Vec<i64> = self.reverse.keys().copied().collect();
        keys.sort_unstable_by(|a, b| b.cmp(a));
        for key in keys {
            if let Some(bucket) = self.reverse.remove(&key) {
                self.evict(bucket);
            }
        }

        self.min_position = 0;
        self.min_index = 0;
    }

    /// Take the fragments evicted since the last call.
    pub fn take_resolved(&mut self) -> Vec<Fragment> {
        std::mem::take(&mut self.resolved)
    }
}
