//! Reconciliation of historical, optimistic and live waves into one view.
//!
//! The same logical wave can be observed up to three times: inserted
//! optimistically when it is sent, read back by a historical load, and
//! delivered by the `NewWave` event stream. The contract exposes no row id, so
//! records are identified by their [`SequenceKey`] and a confirmation replaces
//! the pending record it confirms instead of adding a second one.

use crate::{SequenceKey, WaveEntry, WaveOrigin, WaveRecord};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use tracing::debug;

/// How far, in seconds, a local submission clock may run ahead of the chain
/// timestamp that later confirms it.
pub const DEFAULT_PENDING_CLOCK_SKEW_SECS: i64 = 300;

/// Ordered, de-duplicated wave records.
///
/// Records are sorted by timestamp ascending; ties keep insertion order.
#[derive(Debug)]
pub struct WaveStore {
    records: Vec<WaveRecord>,
    keys: HashSet<SequenceKey>,
    /// Confirmed records already matched to a local submission.
    claimed: HashSet<SequenceKey>,
    clock_skew: Duration,
    revision: u64,
}

impl Default for WaveStore {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_PENDING_CLOCK_SKEW_SECS))
    }
}

impl WaveStore {
    pub fn new(clock_skew: Duration) -> Self {
        Self {
            records: Vec::new(),
            keys: HashSet::new(),
            claimed: HashSet::new(),
            clock_skew,
            revision: 0,
        }
    }

    pub fn records(&self) -> &[WaveRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_pending()).count()
    }

    pub fn get(&self, key: &SequenceKey) -> Option<&WaveRecord> {
        self.records.iter().find(|r| r.sequence_key == *key)
    }

    /// Bumped on every change to the view.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Merge entries read from the contract's stored list.
    ///
    /// Entries already present are left untouched; an entry confirming a
    /// pending record promotes it to `Historical`. Loading the same entries
    /// again changes nothing.
    pub fn load_historical(&mut self, entries: impl IntoIterator<Item = WaveEntry>) {
        let mut inserted = 0usize;
        let mut promoted = 0usize;
        for entry in entries {
            match self.confirm(entry, WaveOrigin::Historical) {
                Merge::Inserted => inserted += 1,
                Merge::Promoted => promoted += 1,
                Merge::Unchanged => {}
            }
        }
        debug!(inserted, promoted, total = self.records.len(), "Loaded historical waves");
    }

    /// Merge a wave delivered by the event stream.
    pub fn apply_live_event(&mut self, entry: WaveEntry) -> Merge {
        self.confirm(entry, WaveOrigin::Live)
    }

    /// Insert a wave that was just submitted but is not yet on chain.
    ///
    /// If its confirmation already arrived (fast chains can deliver the event
    /// before the submission returns), nothing is inserted and the key of the
    /// confirmed record is returned.
    pub fn apply_optimistic(&mut self, entry: WaveEntry) -> SequenceKey {
        let key = entry.sequence_key();
        if self.keys.contains(&key) {
            return key;
        }

        if let Some(index) = self.matching_confirmed(&entry) {
            let confirmed = self.records[index].sequence_key;
            self.claimed.insert(confirmed);
            debug!(key = %confirmed, "Submitted wave already confirmed");
            return confirmed;
        }

        self.insert(WaveRecord::from_entry(entry, WaveOrigin::Pending));
        key
    }

    /// Drop a pending record whose transaction failed. Confirmed records are
    /// never removed.
    pub fn discard_pending(&mut self, key: &SequenceKey) -> bool {
        let Some(index) = self
            .records
            .iter()
            .position(|r| r.sequence_key == *key && r.is_pending())
        else {
            return false;
        };
        self.records.remove(index);
        self.keys.remove(key);
        self.revision += 1;
        true
    }

    fn confirm(&mut self, entry: WaveEntry, origin: WaveOrigin) -> Merge {
        let key = entry.sequence_key();

        if let Some(index) = self.records.iter().position(|r| r.sequence_key == key) {
            if !self.records[index].is_pending() {
                return Merge::Unchanged;
            }
            self.records[index].origin = origin;
            self.claimed.insert(key);
            self.revision += 1;
            return Merge::Promoted;
        }

        if let Some(index) = self.matching_pending(&entry) {
            self.promote(index, entry, origin);
            return Merge::Promoted;
        }

        self.insert(WaveRecord::from_entry(entry, origin));
        Merge::Inserted
    }

    /// Oldest pending record from the same sender with the same message whose
    /// local timestamp is not beyond the chain timestamp plus the allowed skew.
    fn matching_pending(&self, entry: &WaveEntry) -> Option<usize> {
        let latest_local: DateTime<Utc> = entry.timestamp + self.clock_skew;
        self.records.iter().position(|r| {
            r.is_pending()
                && r.sender == entry.sender
                && r.message == entry.message
                && r.timestamp <= latest_local
        })
    }

    /// Oldest unclaimed confirmed record that a local submission at
    /// `entry.timestamp` could correspond to, under the same skew rule as
    /// [`Self::matching_pending`].
    fn matching_confirmed(&self, entry: &WaveEntry) -> Option<usize> {
        self.records.iter().position(|r| {
            !r.is_pending()
                && !self.claimed.contains(&r.sequence_key)
                && r.sender == entry.sender
                && r.message == entry.message
                && entry.timestamp <= r.timestamp + self.clock_skew
                && r.timestamp <= entry.timestamp + self.clock_skew
        })
    }

    fn promote(&mut self, index: usize, entry: WaveEntry, origin: WaveOrigin) {
        let mut record = self.records.remove(index);
        self.keys.remove(&record.sequence_key);

        let moved = record.timestamp != entry.timestamp;
        record.timestamp = entry.timestamp;
        record.sequence_key = entry.sequence_key();
        record.origin = origin;
        self.claimed.insert(record.sequence_key);

        if moved {
            self.insert(record);
        } else {
            self.keys.insert(record.sequence_key);
            self.records.insert(index, record);
            self.revision += 1;
        }
    }

    fn insert(&mut self, record: WaveRecord) {
        let at = self
            .records
            .partition_point(|r| r.timestamp <= record.timestamp);
        self.keys.insert(record.sequence_key);
        self.records.insert(at, record);
        self.revision += 1;
    }
}

/// What a confirmation did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merge {
    Inserted,
    Promoted,
    Unchanged,
}
