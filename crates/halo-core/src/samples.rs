//! Bounded per-peer signal histories.
//!
//! Every discovery event appends a raw signal reading to the history of the
//! address it came from. Once per report cycle the whole store is "expired":
//! each history gets one sentinel lost-value appended, so peers that stop
//! advertising fade toward [`Range::Unknown`](crate::range::Range) instead
//! of being dropped outright. A fresh real reading purges the sentinels
//! again.

use std::collections::{btree_map, BTreeMap, VecDeque};

use crate::types::RadioAddress;

/// Out-of-band sample value marking a report cycle where the peer was not
/// heard from.
pub const SAMPLE_LOST: f32 = -205.0;

/// Maximum samples retained per peer, most-recent-last.
pub const HISTORY_CAPACITY: usize = 10;

/// Bounded, most-recent-last history of signal readings for one peer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleHistory {
    samples: VecDeque<f32>,
}

impl SampleHistory {
    /// Append a real reading.
    ///
    /// Sentinel entries accumulated while the peer was quiet are purged
    /// first; the oldest reading is evicted once the window is full.
    pub fn record(&mut self, value: f32) {
        self.samples.retain(|sample| *sample > SAMPLE_LOST);
        self.samples.push_back(value);
        self.truncate();
    }

    /// Append one sentinel lost-value entry.
    pub fn expire(&mut self) {
        self.samples.push_back(SAMPLE_LOST);
        self.truncate();
    }

    fn truncate(&mut self) {
        while self.samples.len() > HISTORY_CAPACITY {
            self.samples.pop_front();
        }
    }

    /// Readings in insertion order, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        self.samples.iter().copied()
    }

    /// Number of readings currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the history holds no readings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Signal histories for every address seen this detection session.
///
/// Histories are created on first discovery and never removed individually;
/// stopping detection clears no data.
#[derive(Debug, Default)]
pub struct SampleStore {
    histories: BTreeMap<RadioAddress, SampleHistory>,
}

impl SampleStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a reading for `address`, creating its history if this is the
    /// first time the address has been seen.
    ///
    /// Returns `true` when the address was first-seen, so the caller can
    /// queue it for validation.
    pub fn record(&mut self, address: &RadioAddress, value: f32) -> bool {
        match self.histories.entry(address.clone()) {
            btree_map::Entry::Vacant(entry) => {
                entry.insert(SampleHistory::default()).record(value);
                true
            }
            btree_map::Entry::Occupied(mut entry) => {
                entry.get_mut().record(value);
                false
            }
        }
    }

    /// Append one sentinel lost-value to every tracked history.
    pub fn expire_all(&mut self) {
        for history in self.histories.values_mut() {
            history.expire();
        }
    }

    /// The history for `address`, if it has been seen.
    #[must_use]
    pub fn history(&self, address: &RadioAddress) -> Option<&SampleHistory> {
        self.histories.get(address)
    }

    /// Whether `address` has been seen this session.
    #[must_use]
    pub fn contains(&self, address: &RadioAddress) -> bool {
        self.histories.contains_key(address)
    }

    /// Number of tracked addresses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.histories.len()
    }

    /// Whether no address has been seen yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.histories.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> RadioAddress {
        RadioAddress::from(s)
    }

    #[test]
    fn history_never_exceeds_capacity_and_keeps_insert_order() {
        let mut history = SampleHistory::default();
        for i in 0..25_u8 {
            history.record(-f32::from(i));
            assert!(history.len() <= HISTORY_CAPACITY);
        }
        let samples: Vec<f32> = history.iter().collect();
        assert_eq!(samples.len(), HISTORY_CAPACITY);
        assert_eq!(samples[0], -15.0);
        assert_eq!(samples[9], -24.0);
    }

    #[test]
    fn expiry_respects_capacity() {
        let mut history = SampleHistory::default();
        for _ in 0..HISTORY_CAPACITY {
            history.record(-60.0);
        }
        for _ in 0..5 {
            history.expire();
        }
        assert_eq!(history.len(), HISTORY_CAPACITY);
        assert_eq!(history.iter().filter(|s| *s <= SAMPLE_LOST).count(), 5);
    }

    #[test]
    fn real_reading_purges_sentinels() {
        let mut history = SampleHistory::default();
        history.record(-60.0);
        history.expire();
        history.expire();
        history.record(-62.0);

        let samples: Vec<f32> = history.iter().collect();
        assert_eq!(samples, vec![-60.0, -62.0]);
    }

    #[test]
    fn first_reading_is_stored_and_reported_as_first_seen() {
        let mut store = SampleStore::new();
        assert!(store.record(&addr("AA"), -50.0));
        assert!(!store.record(&addr("AA"), -51.0));
        assert_eq!(store.history(&addr("AA")).unwrap().len(), 2);
    }

    #[test]
    fn expire_all_touches_every_address_without_removing_any() {
        let mut store = SampleStore::new();
        store.record(&addr("AA"), -50.0);
        store.record(&addr("BB"), -70.0);

        store.expire_all();

        assert_eq!(store.len(), 2);
        for address in ["AA", "BB"] {
            let history = store.history(&addr(address)).unwrap();
            assert_eq!(history.len(), 2);
            assert!(history.iter().last().unwrap() <= SAMPLE_LOST);
        }
    }
}
