//! Radio transport abstraction.
//!
//! The engine drives the radio through two role traits mirroring the
//! platform split between scanning/connecting (central) and advertising
//! (peripheral). Every command is fire-and-forget: it returns immediately,
//! and its outcome — if one ever materializes — arrives later as an event on
//! the channel the role was opened with. Nothing here blocks, and nothing
//! here guarantees completion; the engine's timers sweep operations that
//! stall.
//!
//! Two implementations ship with the crate:
//!
//! - [`mock::MockRadioLink`] — records every command and lets tests inject
//!   events.
//! - [`bluez::BluezLink`] — the BlueZ adapter (feature `bluetooth`, Linux).

use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::types::RadioAddress;

#[cfg(feature = "bluetooth")]
pub mod bluez;
pub mod mock;

/// Power state of a radio role, mirroring the platform manager states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    /// State not yet reported by the platform.
    Unknown,
    /// The radio stack is resetting.
    Resetting,
    /// The platform has no usable radio.
    Unsupported,
    /// The application is not allowed to use the radio.
    Unauthorized,
    /// The radio is present but switched off.
    PoweredOff,
    /// The radio is ready.
    PoweredOn,
}

/// Platform authorization for announcing our presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    /// The user has not been asked yet.
    NotDetermined,
    /// The user declined.
    Denied,
    /// Broadcasting is allowed.
    Authorized,
}

impl Authorization {
    /// Whether broadcasting may be attempted (declined is the only hard no).
    #[must_use]
    pub const fn allows_broadcast(self) -> bool {
        matches!(self, Self::Authorized | Self::NotDetermined)
    }
}

/// Failure payload carried inside radio events.
///
/// These are degradation signals, not process errors: the engine reacts by
/// leaving the affected peer unresolved and letting its timers retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The underlying radio operation failed.
    #[error("radio operation failed: {0}")]
    Operation(String),

    /// The peer does not expose the requested service.
    #[error("peer does not expose the requested service")]
    ServiceNotFound,

    /// The service does not expose the requested characteristic.
    #[error("service does not expose the requested characteristic")]
    CharacteristicNotFound,
}

/// Events delivered by the scanner/connector role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CentralEvent {
    /// The role's power state changed.
    StateChanged(PowerState),

    /// A peer advertising the scanned service was sighted. Repeats at high
    /// frequency for the same address while duplicates are allowed.
    Discovered {
        /// The sighted peer.
        address: RadioAddress,
        /// Signal strength of this sighting, in the radio's native unit.
        rssi: i16,
    },

    /// A requested connection is up.
    Connected {
        /// The connected peer.
        address: RadioAddress,
    },

    /// A requested connection could not be established.
    ConnectFailed {
        /// The peer that could not be reached.
        address: RadioAddress,
        /// Why the platform gave up.
        reason: TransportError,
    },

    /// Service discovery on a connected peer finished.
    ServicesDiscovered {
        /// The connected peer.
        address: RadioAddress,
        /// The services found, filtered to those requested.
        services: Result<Vec<Uuid>, TransportError>,
    },

    /// Characteristic discovery under one service finished.
    CharacteristicsDiscovered {
        /// The connected peer.
        address: RadioAddress,
        /// The service the characteristics belong to.
        service: Uuid,
        /// The characteristics found, filtered to those requested.
        characteristics: Result<Vec<Uuid>, TransportError>,
    },

    /// A characteristic read finished.
    ValueRead {
        /// The connected peer.
        address: RadioAddress,
        /// The characteristic that was read.
        characteristic: Uuid,
        /// The payload bytes.
        value: Result<Vec<u8>, TransportError>,
    },
}

/// Events delivered by the advertiser role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeripheralEvent {
    /// The role's power state changed.
    StateChanged(PowerState),

    /// The advertisement either went on air or failed to.
    AdvertisingStarted(Result<(), TransportError>),
}

/// The scanner/connector role.
///
/// Implementations must return from every method immediately and deliver
/// outcomes as [`CentralEvent`]s. `disconnect` is safe to call in any state
/// and is idempotent.
pub trait CentralRole: Send {
    /// Begin asynchronous discovery of peers advertising `service`.
    fn start_scan(&mut self, service: Uuid, allow_duplicates: bool);

    /// Halt discovery event delivery.
    fn stop_scan(&mut self);

    /// Attempt a point-to-point link to `address`.
    fn connect(&mut self, address: &RadioAddress);

    /// Tear down any link to `address`.
    fn disconnect(&mut self, address: &RadioAddress);

    /// Enumerate `services` on a connected peer.
    fn discover_services(&mut self, address: &RadioAddress, services: &[Uuid]);

    /// Enumerate `characteristics` under `service` on a connected peer.
    fn discover_characteristics(
        &mut self,
        address: &RadioAddress,
        service: Uuid,
        characteristics: &[Uuid],
    );

    /// Read the value of `characteristic` on a connected peer.
    fn read_characteristic(&mut self, address: &RadioAddress, characteristic: Uuid);
}

/// The advertiser role.
pub trait PeripheralRole: Send {
    /// Publish a single service containing one readable characteristic
    /// holding `payload`.
    fn publish(&mut self, service: Uuid, characteristic: Uuid, payload: Vec<u8>);

    /// Broadcast availability under `services` with a display name.
    fn start_advertising(&mut self, local_name: &str, services: &[Uuid]);

    /// Withdraw the advertisement. Idempotent.
    fn stop_advertising(&mut self);
}

/// Factory for radio role handles, injected into the engine.
///
/// Role handles are opened lazily — the engine opens the central role when
/// detection starts and the peripheral role when broadcasting starts — and
/// dropped to tear the role down, cancelling whatever was in flight.
pub trait RadioLink: Send + 'static {
    /// Open the scanner/connector role, delivering its events on `events`.
    fn open_central(
        &mut self,
        events: mpsc::UnboundedSender<CentralEvent>,
    ) -> Box<dyn CentralRole>;

    /// Open the advertiser role, delivering its events on `events`.
    fn open_peripheral(
        &mut self,
        events: mpsc::UnboundedSender<PeripheralEvent>,
    ) -> Box<dyn PeripheralRole>;

    /// Current platform authorization for broadcasting.
    fn authorization(&self) -> Authorization;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denied_is_the_only_authorization_that_blocks_broadcast() {
        assert!(Authorization::Authorized.allows_broadcast());
        assert!(Authorization::NotDetermined.allows_broadcast());
        assert!(!Authorization::Denied.allows_broadcast());
    }

    #[test]
    fn transport_errors_describe_themselves() {
        assert!(TransportError::Operation("le-connection-abort".into())
            .to_string()
            .contains("le-connection-abort"));
        assert!(!TransportError::ServiceNotFound.to_string().is_empty());
        assert!(!TransportError::CharacteristicNotFound
            .to_string()
            .is_empty());
    }
}
