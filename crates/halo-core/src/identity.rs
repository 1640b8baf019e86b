//! Identity resolution and per-identity history merging.
//!
//! Once validation has bound a radio address to the identity it announced,
//! the peer is reported under that identity for the rest of the session.
//! Each report cycle re-merges every bound address's current history under
//! its identity, so readings keep flowing to the durable key even though
//! discovery events are keyed by address.

use std::collections::BTreeMap;

use crate::range::{self, PeerEstimate};
use crate::samples::{SampleHistory, SampleStore};
use crate::types::{LogicalIdentity, RadioAddress};

/// Validated address→identity bindings and the merged histories reported
/// under them.
#[derive(Debug, Default)]
pub struct IdentityResolver {
    bindings: BTreeMap<RadioAddress, LogicalIdentity>,
    merged: BTreeMap<LogicalIdentity, SampleHistory>,
}

impl IdentityResolver {
    /// Create an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a validated address to the identity it announced.
    pub fn bind(&mut self, address: RadioAddress, identity: LogicalIdentity) {
        self.bindings.insert(address, identity);
    }

    /// Whether `address` has completed validation.
    #[must_use]
    pub fn is_resolved(&self, address: &RadioAddress) -> bool {
        self.bindings.contains_key(address)
    }

    /// Number of validated addresses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether no address has been validated yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Re-merge every bound address's current history from the
    /// address-keyed store. When two addresses are bound to one identity,
    /// the later address (in key order) wins.
    pub fn refresh_from(&mut self, store: &SampleStore) {
        for (address, identity) in &self.bindings {
            if let Some(history) = store.history(address) {
                self.merged.insert(identity.clone(), history.clone());
            }
        }
    }

    /// Estimate every known identity from its merged history.
    #[must_use]
    pub fn estimates(&self) -> BTreeMap<LogicalIdentity, PeerEstimate> {
        self.merged
            .iter()
            .map(|(identity, history)| (identity.clone(), range::estimate(history)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::Range;

    #[test]
    fn estimates_are_keyed_by_identity_not_address() {
        let mut store = SampleStore::new();
        let address = RadioAddress::from("AA:BB:CC:DD:EE:FF");
        for _ in 0..10 {
            store.record(&address, -60.0);
        }

        let mut resolver = IdentityResolver::new();
        resolver.bind(address.clone(), LogicalIdentity::from("peer-A"));
        resolver.refresh_from(&store);

        let estimates = resolver.estimates();
        assert_eq!(estimates.len(), 1);
        let estimate = &estimates[&LogicalIdentity::from("peer-A")];
        assert!((estimate.value - -60.0).abs() < f32::EPSILON);
        assert_eq!(estimate.range, Range::Immediate);
    }

    #[test]
    fn identities_persist_once_merged() {
        let mut store = SampleStore::new();
        let address = RadioAddress::from("AA");
        store.record(&address, -60.0);

        let mut resolver = IdentityResolver::new();
        resolver.bind(address, LogicalIdentity::from("peer-A"));
        resolver.refresh_from(&store);

        // The peer stops advertising; the history ages out, but the
        // identity stays in every later report.
        for _ in 0..10 {
            store.expire_all();
        }
        resolver.refresh_from(&store);

        let estimates = resolver.estimates();
        assert_eq!(estimates[&LogicalIdentity::from("peer-A")].range, Range::Unknown);
    }

    #[test]
    fn later_address_wins_when_two_bind_one_identity() {
        let mut store = SampleStore::new();
        for _ in 0..10 {
            store.record(&RadioAddress::from("AA"), -60.0);
            store.record(&RadioAddress::from("BB"), -100.0);
        }

        let mut resolver = IdentityResolver::new();
        resolver.bind(RadioAddress::from("AA"), LogicalIdentity::from("peer-A"));
        resolver.bind(RadioAddress::from("BB"), LogicalIdentity::from("peer-A"));
        resolver.refresh_from(&store);

        let estimates = resolver.estimates();
        assert_eq!(estimates.len(), 1);
        assert!((estimates[&LogicalIdentity::from("peer-A")].value - -100.0).abs() < f32::EPSILON);
    }

    #[test]
    fn resolution_status_tracks_bindings() {
        let mut resolver = IdentityResolver::new();
        assert!(resolver.is_empty());
        assert!(!resolver.is_resolved(&RadioAddress::from("AA")));

        resolver.bind(RadioAddress::from("AA"), LogicalIdentity::from("peer-A"));
        assert!(resolver.is_resolved(&RadioAddress::from("AA")));
        assert_eq!(resolver.len(), 1);
    }
}
