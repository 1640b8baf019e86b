//! The pending-address validation pipeline.
//!
//! A freshly discovered address is only a session-scoped radio name. Before
//! its readings may be reported, the engine must connect, walk down to the
//! beacon characteristic, read the peer's identity, and disconnect. This
//! module tracks where every pending address is in that walk as an explicit
//! phase; the engine drives the transitions from transport events and its
//! timers. An address leaves the queue only on a successful read or on a
//! payload it can never decode — transport failures keep it pending so the
//! restart guard retries it on the next batch.

use std::collections::BTreeMap;

use crate::types::RadioAddress;

/// Where a pending address currently is in the validation walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationPhase {
    /// Seen in a scan; waiting for the next connect batch.
    Discovered,
    /// Connect requested.
    Connecting,
    /// Connected; service discovery requested.
    DiscoveringServices,
    /// Characteristic discovery requested.
    DiscoveringCharacteristics,
    /// Characteristic read requested.
    Reading,
}

/// The set of addresses awaiting validation.
///
/// Keyed by address so the batch connect and the stall sweep iterate in a
/// deterministic order.
#[derive(Debug, Default)]
pub struct ValidationQueue {
    pending: BTreeMap<RadioAddress, ValidationPhase>,
}

impl ValidationQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a first-seen address. No-op if the address is already pending.
    pub fn enqueue(&mut self, address: RadioAddress) {
        self.pending
            .entry(address)
            .or_insert(ValidationPhase::Discovered);
    }

    /// Whether `address` is awaiting validation.
    #[must_use]
    pub fn contains(&self, address: &RadioAddress) -> bool {
        self.pending.contains_key(address)
    }

    /// The phase `address` is currently in, if pending.
    #[must_use]
    pub fn phase(&self, address: &RadioAddress) -> Option<ValidationPhase> {
        self.pending.get(address).copied()
    }

    /// Whether no address is awaiting validation.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Number of pending addresses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Move every pending address into `Connecting` and list them for the
    /// batch connect.
    pub fn begin_connect_batch(&mut self) -> Vec<RadioAddress> {
        for phase in self.pending.values_mut() {
            *phase = ValidationPhase::Connecting;
        }
        self.pending.keys().cloned().collect()
    }

    /// Record a successful connect. Returns `true` if the address was
    /// pending, i.e. the walk should continue with service discovery.
    pub fn mark_connected(&mut self, address: &RadioAddress) -> bool {
        self.advance(address, ValidationPhase::DiscoveringServices)
    }

    /// Record a failed connect; the address stays pending for the next batch.
    pub fn mark_connect_failed(&mut self, address: &RadioAddress) {
        self.reset(address);
    }

    /// Record that characteristic discovery was requested.
    pub fn mark_discovering_characteristics(&mut self, address: &RadioAddress) -> bool {
        self.advance(address, ValidationPhase::DiscoveringCharacteristics)
    }

    /// Record that a characteristic read was requested.
    pub fn mark_reading(&mut self, address: &RadioAddress) -> bool {
        self.advance(address, ValidationPhase::Reading)
    }

    /// Record a failure mid-walk; the address stays pending for the next
    /// batch.
    pub fn mark_failed(&mut self, address: &RadioAddress) {
        self.reset(address);
    }

    /// Drop `address` from the queue, on resolution or permanent
    /// abandonment. Returns `true` if it was pending.
    pub fn remove(&mut self, address: &RadioAddress) -> bool {
        self.pending.remove(address).is_some()
    }

    /// Reset every address past `Discovered` back to it, returning them so
    /// the caller can force-disconnect whatever link they may still hold.
    pub fn sweep_stalled(&mut self) -> Vec<RadioAddress> {
        let mut stalled = Vec::new();
        for (address, phase) in &mut self.pending {
            if *phase != ValidationPhase::Discovered {
                *phase = ValidationPhase::Discovered;
                stalled.push(address.clone());
            }
        }
        stalled
    }

    fn advance(&mut self, address: &RadioAddress, phase: ValidationPhase) -> bool {
        match self.pending.get_mut(address) {
            Some(current) => {
                *current = phase;
                true
            }
            None => false,
        }
    }

    fn reset(&mut self, address: &RadioAddress) {
        if let Some(phase) = self.pending.get_mut(address) {
            *phase = ValidationPhase::Discovered;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> RadioAddress {
        RadioAddress::from(s)
    }

    #[test]
    fn enqueue_is_idempotent() {
        let mut queue = ValidationQueue::new();
        queue.enqueue(addr("AA"));
        queue.mark_connected(&addr("AA"));
        queue.enqueue(addr("AA"));

        assert_eq!(queue.len(), 1);
        assert_eq!(
            queue.phase(&addr("AA")),
            Some(ValidationPhase::DiscoveringServices),
            "re-enqueueing must not reset an address mid-walk"
        );
    }

    #[test]
    fn batch_connect_takes_every_pending_address() {
        let mut queue = ValidationQueue::new();
        queue.enqueue(addr("BB"));
        queue.enqueue(addr("AA"));

        let batch = queue.begin_connect_batch();
        assert_eq!(batch, vec![addr("AA"), addr("BB")]);
        assert_eq!(queue.phase(&addr("AA")), Some(ValidationPhase::Connecting));
        assert_eq!(queue.phase(&addr("BB")), Some(ValidationPhase::Connecting));
    }

    #[test]
    fn transitions_ignore_unknown_addresses() {
        let mut queue = ValidationQueue::new();
        assert!(!queue.mark_connected(&addr("AA")));
        assert!(!queue.mark_reading(&addr("AA")));
        queue.mark_failed(&addr("AA"));
        assert!(queue.is_empty());
    }

    #[test]
    fn sweep_resets_only_addresses_past_discovery() {
        let mut queue = ValidationQueue::new();
        queue.enqueue(addr("AA"));
        queue.enqueue(addr("BB"));
        queue.enqueue(addr("CC"));
        queue.begin_connect_batch();
        queue.mark_connected(&addr("AA"));
        queue.mark_reading(&addr("AA"));
        queue.reset(&addr("CC"));

        let swept = queue.sweep_stalled();
        assert_eq!(swept, vec![addr("AA"), addr("BB")]);
        for address in ["AA", "BB", "CC"] {
            assert_eq!(
                queue.phase(&addr(address)),
                Some(ValidationPhase::Discovered)
            );
        }
    }

    #[test]
    fn failures_keep_the_address_pending() {
        let mut queue = ValidationQueue::new();
        queue.enqueue(addr("AA"));
        queue.begin_connect_batch();
        queue.mark_connect_failed(&addr("AA"));

        assert!(queue.contains(&addr("AA")));
        assert_eq!(queue.phase(&addr("AA")), Some(ValidationPhase::Discovered));
    }

    #[test]
    fn removal_ends_the_walk() {
        let mut queue = ValidationQueue::new();
        queue.enqueue(addr("AA"));
        assert!(queue.remove(&addr("AA")));
        assert!(!queue.remove(&addr("AA")));
        assert!(queue.is_empty());
    }
}
