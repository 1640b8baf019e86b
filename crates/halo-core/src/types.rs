//! Shared identifier types.
//!
//! A peer is known by two names: the session-scoped address the platform
//! assigns to its radio, and the stable identity string it publishes in its
//! beacon characteristic. The validation pipeline binds the former to the
//! latter; everything reported to consumers is keyed by identity.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::HaloError;

/// Session-scoped identifier the platform assigns to a discovered peer radio.
///
/// Addresses are not guaranteed stable across discovery sessions, which is
/// why every address goes through validation before its readings are
/// reported under a durable key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RadioAddress(String);

impl RadioAddress {
    /// Wrap a platform-assigned address string.
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// The underlying platform string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RadioAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RadioAddress {
    fn from(address: &str) -> Self {
        Self(address.to_owned())
    }
}

impl From<String> for RadioAddress {
    fn from(address: String) -> Self {
        Self(address)
    }
}

/// Stable, peer-chosen identity string conveyed via the beacon characteristic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogicalIdentity(String);

impl LogicalIdentity {
    /// Wrap an identity string.
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    /// Decode an identity from characteristic bytes.
    ///
    /// # Errors
    ///
    /// Returns [`HaloError::IdentityNotUtf8`] if the payload is not valid
    /// UTF-8. Such a peer is advertising our service with a payload we
    /// cannot bind to, and is abandoned by the caller.
    pub fn from_utf8(bytes: Vec<u8>) -> Result<Self, HaloError> {
        String::from_utf8(bytes)
            .map(Self)
            .map_err(|_| HaloError::IdentityNotUtf8)
    }

    /// The identity string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The identity encoded for the beacon characteristic.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.clone().into_bytes()
    }
}

impl fmt::Display for LogicalIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LogicalIdentity {
    fn from(identity: &str) -> Self {
        Self(identity.to_owned())
    }
}

impl From<String> for LogicalIdentity {
    fn from(identity: String) -> Self {
        Self(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_round_trips_through_characteristic_bytes() {
        let identity = LogicalIdentity::new("peer-A");
        let decoded = LogicalIdentity::from_utf8(identity.to_bytes()).unwrap();
        assert_eq!(decoded, identity);
    }

    #[test]
    fn identity_rejects_invalid_utf8() {
        let result = LogicalIdentity::from_utf8(vec![0xff, 0xfe, 0x00]);
        assert!(matches!(result, Err(HaloError::IdentityNotUtf8)));
    }

    #[test]
    fn addresses_order_deterministically() {
        let mut addresses = vec![
            RadioAddress::from("CC:00:00:00:00:01"),
            RadioAddress::from("AA:00:00:00:00:01"),
            RadioAddress::from("BB:00:00:00:00:01"),
        ];
        addresses.sort();
        assert_eq!(addresses[0].as_str(), "AA:00:00:00:00:01");
        assert_eq!(addresses[2].as_str(), "CC:00:00:00:00:01");
    }

    #[test]
    fn display_matches_inner_string() {
        assert_eq!(
            RadioAddress::from("00:11:22:33:44:55").to_string(),
            "00:11:22:33:44:55"
        );
        assert_eq!(LogicalIdentity::from("peer-A").to_string(), "peer-A");
    }
}
