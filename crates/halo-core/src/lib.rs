//! # halo-core
//!
//! Core engine for the halo peer proximity beacon.
//!
//! A halo node plays both radio roles at once: it advertises its own
//! identity under a fixed service/characteristic pair and scans for peers
//! advertising the same service. Discovered addresses are validated with a
//! connect-read-disconnect handshake that binds the session-scoped radio
//! address to the peer's stable identity, signal readings are smoothed over
//! a bounded window, and the resulting range classifications are reported
//! to a delegate once per report cycle.
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`engine`] - the beacon engine actor: timers, scanning, validation, reporting
//! - [`transport`] - the radio role abstraction, a scriptable mock link, and the BlueZ adapter
//! - [`samples`] - bounded per-peer signal histories
//! - [`range`] - signal smoothing and range classification
//! - [`validate`] - the pending-address validation pipeline
//! - [`identity`] - address-to-identity bindings and merged histories
//! - [`config`] - beacon configuration loading, saving, and validation
//! - [`error`] - unified error types for the crate

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod config;
pub mod engine;
pub mod error;
pub mod identity;
pub mod range;
pub mod samples;
pub mod transport;
pub mod types;
pub mod validate;

// Re-export primary types for convenience
pub use config::BeaconConfig;
pub use engine::{BeaconDelegate, BeaconEngine, EngineState};
pub use error::{HaloError, Result};
pub use range::{PeerEstimate, Range};
pub use samples::{SampleHistory, SampleStore, HISTORY_CAPACITY, SAMPLE_LOST};
pub use transport::{
    Authorization, CentralEvent, CentralRole, PeripheralEvent, PeripheralRole, PowerState,
    RadioLink, TransportError,
};
pub use types::{LogicalIdentity, RadioAddress};
pub use validate::{ValidationPhase, ValidationQueue};
