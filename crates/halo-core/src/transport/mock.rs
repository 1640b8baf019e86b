//! In-memory radio link for tests and host-side development.
//!
//! [`MockRadioLink`] records every command the engine issues and exposes the
//! event channels the engine listens on, so a test can play the platform:
//! assert a `Connect` was requested, answer with `Connected`, and so on. No
//! radio hardware is involved.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use uuid::Uuid;

use super::{
    Authorization, CentralEvent, CentralRole, PeripheralEvent, PeripheralRole, RadioLink,
};
use crate::types::RadioAddress;

/// Every command a [`MockRadioLink`] can observe, in issue order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCommand {
    /// The engine opened the scanner/connector role.
    OpenCentral,
    /// The engine opened the advertiser role.
    OpenPeripheral,
    /// `start_scan` was called.
    StartScan {
        /// Service scanned for.
        service: Uuid,
        /// Whether duplicate sightings were requested.
        allow_duplicates: bool,
    },
    /// `stop_scan` was called.
    StopScan,
    /// `connect` was called.
    Connect(RadioAddress),
    /// `disconnect` was called.
    Disconnect(RadioAddress),
    /// `discover_services` was called.
    DiscoverServices {
        /// Target peer.
        address: RadioAddress,
        /// Services requested.
        services: Vec<Uuid>,
    },
    /// `discover_characteristics` was called.
    DiscoverCharacteristics {
        /// Target peer.
        address: RadioAddress,
        /// Parent service.
        service: Uuid,
        /// Characteristics requested.
        characteristics: Vec<Uuid>,
    },
    /// `read_characteristic` was called.
    ReadCharacteristic {
        /// Target peer.
        address: RadioAddress,
        /// Characteristic to read.
        characteristic: Uuid,
    },
    /// `publish` was called.
    Publish {
        /// Published service.
        service: Uuid,
        /// Published characteristic.
        characteristic: Uuid,
        /// Characteristic payload.
        payload: Vec<u8>,
    },
    /// `start_advertising` was called.
    StartAdvertising {
        /// Advertised display name.
        local_name: String,
        /// Advertised services.
        services: Vec<Uuid>,
    },
    /// `stop_advertising` was called.
    StopAdvertising,
}

type SharedSender<T> = Arc<Mutex<Option<mpsc::UnboundedSender<T>>>>;

/// Test-side handle to a [`MockRadioLink`].
///
/// Receives the command stream and injects radio events.
#[derive(Debug)]
pub struct MockRadioHandle {
    commands: mpsc::UnboundedReceiver<MockCommand>,
    authorization: Arc<Mutex<Authorization>>,
    central: SharedSender<CentralEvent>,
    peripheral: SharedSender<PeripheralEvent>,
}

impl MockRadioHandle {
    /// Await the next command issued by the engine.
    pub async fn next_command(&mut self) -> Option<MockCommand> {
        self.commands.recv().await
    }

    /// Pop a command without waiting, if one is queued.
    pub fn try_next_command(&mut self) -> Option<MockCommand> {
        self.commands.try_recv().ok()
    }

    /// Drain every queued command.
    pub fn drain_commands(&mut self) -> Vec<MockCommand> {
        let mut drained = Vec::new();
        while let Ok(command) = self.commands.try_recv() {
            drained.push(command);
        }
        drained
    }

    /// Change what the link reports for [`RadioLink::authorization`].
    pub fn set_authorization(&self, authorization: Authorization) {
        *self.authorization.lock().unwrap() = authorization;
    }

    /// Inject a central event. Returns `false` if the engine has not opened
    /// the central role (the event goes nowhere, as on real hardware).
    pub fn emit_central(&self, event: CentralEvent) -> bool {
        self.central
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|sender| sender.send(event).is_ok())
    }

    /// Inject a peripheral event. Returns `false` if the engine has not
    /// opened the advertiser role.
    pub fn emit_peripheral(&self, event: PeripheralEvent) -> bool {
        self.peripheral
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|sender| sender.send(event).is_ok())
    }
}

/// Scriptable [`RadioLink`] backed by channels instead of hardware.
#[derive(Debug)]
pub struct MockRadioLink {
    commands: mpsc::UnboundedSender<MockCommand>,
    authorization: Arc<Mutex<Authorization>>,
    central: SharedSender<CentralEvent>,
    peripheral: SharedSender<PeripheralEvent>,
}

impl MockRadioLink {
    /// Create a link and the test-side handle observing it.
    #[must_use]
    pub fn new() -> (Self, MockRadioHandle) {
        Self::with_authorization(Authorization::Authorized)
    }

    /// Create a link that starts with the given authorization.
    #[must_use]
    pub fn with_authorization(authorization: Authorization) -> (Self, MockRadioHandle) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let authorization = Arc::new(Mutex::new(authorization));
        let central = Arc::new(Mutex::new(None));
        let peripheral = Arc::new(Mutex::new(None));

        let link = Self {
            commands: command_tx,
            authorization: Arc::clone(&authorization),
            central: Arc::clone(&central),
            peripheral: Arc::clone(&peripheral),
        };
        let handle = MockRadioHandle {
            commands: command_rx,
            authorization,
            central,
            peripheral,
        };
        (link, handle)
    }

    fn record(&self, command: MockCommand) {
        let _ = self.commands.send(command);
    }
}

impl RadioLink for MockRadioLink {
    fn open_central(
        &mut self,
        events: mpsc::UnboundedSender<CentralEvent>,
    ) -> Box<dyn CentralRole> {
        *self.central.lock().unwrap() = Some(events);
        self.record(MockCommand::OpenCentral);
        Box::new(MockCentral {
            commands: self.commands.clone(),
        })
    }

    fn open_peripheral(
        &mut self,
        events: mpsc::UnboundedSender<PeripheralEvent>,
    ) -> Box<dyn PeripheralRole> {
        *self.peripheral.lock().unwrap() = Some(events);
        self.record(MockCommand::OpenPeripheral);
        Box::new(MockPeripheral {
            commands: self.commands.clone(),
        })
    }

    fn authorization(&self) -> Authorization {
        *self.authorization.lock().unwrap()
    }
}

struct MockCentral {
    commands: mpsc::UnboundedSender<MockCommand>,
}

impl MockCentral {
    fn record(&self, command: MockCommand) {
        let _ = self.commands.send(command);
    }
}

impl CentralRole for MockCentral {
    fn start_scan(&mut self, service: Uuid, allow_duplicates: bool) {
        self.record(MockCommand::StartScan {
            service,
            allow_duplicates,
        });
    }

    fn stop_scan(&mut self) {
        self.record(MockCommand::StopScan);
    }

    fn connect(&mut self, address: &RadioAddress) {
        self.record(MockCommand::Connect(address.clone()));
    }

    fn disconnect(&mut self, address: &RadioAddress) {
        self.record(MockCommand::Disconnect(address.clone()));
    }

    fn discover_services(&mut self, address: &RadioAddress, services: &[Uuid]) {
        self.record(MockCommand::DiscoverServices {
            address: address.clone(),
            services: services.to_vec(),
        });
    }

    fn discover_characteristics(
        &mut self,
        address: &RadioAddress,
        service: Uuid,
        characteristics: &[Uuid],
    ) {
        self.record(MockCommand::DiscoverCharacteristics {
            address: address.clone(),
            service,
            characteristics: characteristics.to_vec(),
        });
    }

    fn read_characteristic(&mut self, address: &RadioAddress, characteristic: Uuid) {
        self.record(MockCommand::ReadCharacteristic {
            address: address.clone(),
            characteristic,
        });
    }
}

struct MockPeripheral {
    commands: mpsc::UnboundedSender<MockCommand>,
}

impl PeripheralRole for MockPeripheral {
    fn publish(&mut self, service: Uuid, characteristic: Uuid, payload: Vec<u8>) {
        let _ = self.commands.send(MockCommand::Publish {
            service,
            characteristic,
            payload,
        });
    }

    fn start_advertising(&mut self, local_name: &str, services: &[Uuid]) {
        let _ = self.commands.send(MockCommand::StartAdvertising {
            local_name: local_name.to_owned(),
            services: services.to_vec(),
        });
    }

    fn stop_advertising(&mut self) {
        let _ = self.commands.send(MockCommand::StopAdvertising);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_commands_in_issue_order() {
        let (mut link, mut handle) = MockRadioLink::new();
        let (events, _events_rx) = mpsc::unbounded_channel();
        let mut central = link.open_central(events);

        let service = Uuid::new_v4();
        central.start_scan(service, true);
        central.connect(&RadioAddress::from("AA:BB"));
        central.stop_scan();

        assert_eq!(handle.try_next_command(), Some(MockCommand::OpenCentral));
        assert_eq!(
            handle.try_next_command(),
            Some(MockCommand::StartScan {
                service,
                allow_duplicates: true
            })
        );
        assert_eq!(
            handle.try_next_command(),
            Some(MockCommand::Connect(RadioAddress::from("AA:BB")))
        );
        assert_eq!(handle.try_next_command(), Some(MockCommand::StopScan));
        assert_eq!(handle.try_next_command(), None);
    }

    #[test]
    fn events_reach_the_engine_side_channel() {
        let (mut link, handle) = MockRadioLink::new();
        let (events, mut events_rx) = mpsc::unbounded_channel();
        let _central = link.open_central(events);

        assert!(handle.emit_central(CentralEvent::StateChanged(super::super::PowerState::PoweredOn)));
        assert!(events_rx.try_recv().is_ok());
    }

    #[test]
    fn events_go_nowhere_before_the_role_opens() {
        let (_link, handle) = MockRadioLink::new();
        assert!(!handle.emit_central(CentralEvent::StateChanged(
            super::super::PowerState::PoweredOn
        )));
        assert!(!handle.emit_peripheral(PeripheralEvent::StateChanged(
            super::super::PowerState::PoweredOn
        )));
    }

    #[test]
    fn authorization_is_scriptable() {
        let (link, handle) = MockRadioLink::with_authorization(Authorization::NotDetermined);
        assert_eq!(link.authorization(), Authorization::NotDetermined);
        handle.set_authorization(Authorization::Denied);
        assert_eq!(link.authorization(), Authorization::Denied);
    }
}
