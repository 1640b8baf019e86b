//! BlueZ radio link.
//!
//! Each role handle fronts a backend task that owns a `bluer` session and
//! translates between the engine's fire-and-forget commands and BlueZ's
//! async API. Slow operations (connect, service walks, reads) run as
//! spawned sub-tasks so the backend keeps draining commands; every outcome
//! travels back to the engine as a transport event. Dropping a role handle
//! closes its command channel, which tears the backend down and cancels
//! whatever was in flight.
//!
//! BlueZ reports adapter power per-host rather than per-app and has no
//! CoreBluetooth-style authorization prompt, so the link always reports
//! [`Authorization::Authorized`] and power is observed with a short poll.

use std::collections::HashSet;
use std::time::Duration;

use bluer::adv::{Advertisement, AdvertisementHandle, Type as AdvertisementType};
use bluer::gatt::local::{
    Application, ApplicationHandle, Characteristic as LocalCharacteristic, CharacteristicRead,
    Service as LocalService,
};
use bluer::{Adapter, AdapterEvent, DiscoveryFilter, DiscoveryTransport};
use futures::stream::{BoxStream, SelectAll, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    Authorization, CentralEvent, CentralRole, PeripheralEvent, PeripheralRole, PowerState,
    RadioLink, TransportError,
};
use crate::types::RadioAddress;

/// Cadence of the adapter power poll inside each backend.
const POWER_POLL: Duration = Duration::from_secs(1);

/// [`RadioLink`] over the host's default BlueZ adapter.
#[derive(Debug, Default)]
pub struct BluezLink;

impl BluezLink {
    /// Create a link. No D-Bus traffic happens until a role is opened.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl RadioLink for BluezLink {
    fn open_central(
        &mut self,
        events: mpsc::UnboundedSender<CentralEvent>,
    ) -> Box<dyn CentralRole> {
        let (commands, command_rx) = mpsc::unbounded_channel();
        tokio::spawn(central_backend(command_rx, events));
        Box::new(BluezCentral { commands })
    }

    fn open_peripheral(
        &mut self,
        events: mpsc::UnboundedSender<PeripheralEvent>,
    ) -> Box<dyn PeripheralRole> {
        let (commands, command_rx) = mpsc::unbounded_channel();
        tokio::spawn(peripheral_backend(command_rx, events));
        Box::new(BluezPeripheral { commands })
    }

    fn authorization(&self) -> Authorization {
        Authorization::Authorized
    }
}

// =============================================================================
// CENTRAL ROLE
// =============================================================================

#[derive(Debug)]
enum CentralCommand {
    StartScan { service: Uuid, duplicates: bool },
    StopScan,
    Connect(RadioAddress),
    Disconnect(RadioAddress),
    DiscoverServices(RadioAddress, Vec<Uuid>),
    DiscoverCharacteristics(RadioAddress, Uuid, Vec<Uuid>),
    ReadCharacteristic(RadioAddress, Uuid),
}

struct BluezCentral {
    commands: mpsc::UnboundedSender<CentralCommand>,
}

impl CentralRole for BluezCentral {
    fn start_scan(&mut self, service: Uuid, allow_duplicates: bool) {
        let _ = self.commands.send(CentralCommand::StartScan {
            service,
            duplicates: allow_duplicates,
        });
    }

    fn stop_scan(&mut self) {
        let _ = self.commands.send(CentralCommand::StopScan);
    }

    fn connect(&mut self, address: &RadioAddress) {
        let _ = self.commands.send(CentralCommand::Connect(address.clone()));
    }

    fn disconnect(&mut self, address: &RadioAddress) {
        let _ = self
            .commands
            .send(CentralCommand::Disconnect(address.clone()));
    }

    fn discover_services(&mut self, address: &RadioAddress, services: &[Uuid]) {
        let _ = self.commands.send(CentralCommand::DiscoverServices(
            address.clone(),
            services.to_vec(),
        ));
    }

    fn discover_characteristics(
        &mut self,
        address: &RadioAddress,
        service: Uuid,
        characteristics: &[Uuid],
    ) {
        let _ = self.commands.send(CentralCommand::DiscoverCharacteristics(
            address.clone(),
            service,
            characteristics.to_vec(),
        ));
    }

    fn read_characteristic(&mut self, address: &RadioAddress, characteristic: Uuid) {
        let _ = self
            .commands
            .send(CentralCommand::ReadCharacteristic(address.clone(), characteristic));
    }
}

#[allow(clippy::too_many_lines)]
async fn central_backend(
    mut commands: mpsc::UnboundedReceiver<CentralCommand>,
    events: mpsc::UnboundedSender<CentralEvent>,
) {
    let Some(adapter) = open_adapter().await else {
        let _ = events.send(CentralEvent::StateChanged(PowerState::Unsupported));
        return;
    };

    let mut powered = PowerState::Unknown;
    let mut power_poll = tokio::time::interval(POWER_POLL);
    let mut discovery: Option<BoxStream<'static, AdapterEvent>> = None;
    let mut watchers: SelectAll<BoxStream<'static, (bluer::Address, bluer::DeviceEvent)>> =
        SelectAll::new();
    let mut operations: JoinSet<()> = JoinSet::new();

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else { break };
                match command {
                    CentralCommand::StartScan { service, duplicates } => {
                        let filter = DiscoveryFilter {
                            uuids: HashSet::from([service]),
                            transport: DiscoveryTransport::Le,
                            duplicate_data: duplicates,
                            ..Default::default()
                        };
                        if let Err(err) = adapter.set_discovery_filter(filter).await {
                            warn!("failed to set discovery filter: {err}");
                        }
                        watchers = SelectAll::new();
                        match adapter.discover_devices().await {
                            Ok(stream) => discovery = Some(stream.boxed()),
                            Err(err) => {
                                warn!("failed to start discovery: {err}");
                                discovery = None;
                            }
                        }
                    }
                    CentralCommand::StopScan => {
                        discovery = None;
                        watchers = SelectAll::new();
                    }
                    CentralCommand::Connect(address) => {
                        connect_peer(&adapter, &events, &mut operations, address);
                    }
                    CentralCommand::Disconnect(address) => {
                        if let Some(device) = device_for(&adapter, &address) {
                            operations.spawn(async move {
                                let _ = device.disconnect().await;
                            });
                        }
                    }
                    CentralCommand::DiscoverServices(address, requested) => {
                        discover_services(&adapter, &events, &mut operations, address, requested);
                    }
                    CentralCommand::DiscoverCharacteristics(address, service, requested) => {
                        discover_characteristics(
                            &adapter, &events, &mut operations, address, service, requested,
                        );
                    }
                    CentralCommand::ReadCharacteristic(address, characteristic) => {
                        read_characteristic(&adapter, &events, &mut operations, address, characteristic);
                    }
                }
            }
            _ = power_poll.tick() => {
                let current = power_state(&adapter).await;
                if current != powered {
                    powered = current;
                    let _ = events.send(CentralEvent::StateChanged(current));
                }
            }
            event = next_discovery(&mut discovery), if discovery.is_some() => {
                match event {
                    Some(AdapterEvent::DeviceAdded(addr)) => {
                        let Some(device) = device_for_raw(&adapter, addr) else { continue };
                        if let Ok(Some(rssi)) = device.rssi().await {
                            let _ = events.send(CentralEvent::Discovered {
                                address: RadioAddress::new(addr.to_string()),
                                rssi,
                            });
                        }
                        if let Ok(stream) = device.events().await {
                            watchers.push(stream.map(move |event| (addr, event)).boxed());
                        }
                    }
                    Some(AdapterEvent::DeviceRemoved(addr)) => {
                        debug!("device {addr} left discovery range");
                    }
                    Some(_) => {}
                    // The platform ended the stream; treat it like a stop.
                    None => discovery = None,
                }
            }
            Some((addr, event)) = watchers.next(), if !watchers.is_empty() => {
                if let bluer::DeviceEvent::PropertyChanged(bluer::DeviceProperty::Rssi(rssi)) = event {
                    let _ = events.send(CentralEvent::Discovered {
                        address: RadioAddress::new(addr.to_string()),
                        rssi,
                    });
                }
            }
            Some(_) = operations.join_next(), if !operations.is_empty() => {}
        }
    }
}

/// Next discovery event, pending forever while no scan is active.
async fn next_discovery(
    discovery: &mut Option<BoxStream<'static, AdapterEvent>>,
) -> Option<AdapterEvent> {
    match discovery {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

fn connect_peer(
    adapter: &Adapter,
    events: &mpsc::UnboundedSender<CentralEvent>,
    operations: &mut JoinSet<()>,
    address: RadioAddress,
) {
    let events = events.clone();
    match device_for(adapter, &address) {
        Some(device) => {
            operations.spawn(async move {
                match device.connect().await {
                    Ok(()) => {
                        let _ = events.send(CentralEvent::Connected { address });
                    }
                    Err(err) => {
                        let _ = events.send(CentralEvent::ConnectFailed {
                            address,
                            reason: TransportError::Operation(err.to_string()),
                        });
                    }
                }
            });
        }
        None => {
            let _ = events.send(CentralEvent::ConnectFailed {
                address,
                reason: TransportError::Operation("unknown device address".into()),
            });
        }
    }
}

fn discover_services(
    adapter: &Adapter,
    events: &mpsc::UnboundedSender<CentralEvent>,
    operations: &mut JoinSet<()>,
    address: RadioAddress,
    requested: Vec<Uuid>,
) {
    let events = events.clone();
    let Some(device) = device_for(adapter, &address) else {
        let _ = events.send(CentralEvent::ServicesDiscovered {
            address,
            services: Err(TransportError::Operation("unknown device address".into())),
        });
        return;
    };
    operations.spawn(async move {
        let services = walk_services(&device, &requested).await;
        let _ = events.send(CentralEvent::ServicesDiscovered { address, services });
    });
}

async fn walk_services(
    device: &bluer::Device,
    requested: &[Uuid],
) -> Result<Vec<Uuid>, TransportError> {
    let mut found = Vec::new();
    let services = device
        .services()
        .await
        .map_err(|err| TransportError::Operation(err.to_string()))?;
    for service in services {
        let uuid = service
            .uuid()
            .await
            .map_err(|err| TransportError::Operation(err.to_string()))?;
        if requested.contains(&uuid) {
            found.push(uuid);
        }
    }
    Ok(found)
}

fn discover_characteristics(
    adapter: &Adapter,
    events: &mpsc::UnboundedSender<CentralEvent>,
    operations: &mut JoinSet<()>,
    address: RadioAddress,
    service: Uuid,
    requested: Vec<Uuid>,
) {
    let events = events.clone();
    let Some(device) = device_for(adapter, &address) else {
        let _ = events.send(CentralEvent::CharacteristicsDiscovered {
            address,
            service,
            characteristics: Err(TransportError::Operation("unknown device address".into())),
        });
        return;
    };
    operations.spawn(async move {
        let characteristics = walk_characteristics(&device, service, &requested).await;
        let _ = events.send(CentralEvent::CharacteristicsDiscovered {
            address,
            service,
            characteristics,
        });
    });
}

async fn walk_characteristics(
    device: &bluer::Device,
    service: Uuid,
    requested: &[Uuid],
) -> Result<Vec<Uuid>, TransportError> {
    let services = device
        .services()
        .await
        .map_err(|err| TransportError::Operation(err.to_string()))?;
    for candidate in services {
        let uuid = candidate
            .uuid()
            .await
            .map_err(|err| TransportError::Operation(err.to_string()))?;
        if uuid != service {
            continue;
        }
        let mut found = Vec::new();
        let characteristics = candidate
            .characteristics()
            .await
            .map_err(|err| TransportError::Operation(err.to_string()))?;
        for characteristic in characteristics {
            let uuid = characteristic
                .uuid()
                .await
                .map_err(|err| TransportError::Operation(err.to_string()))?;
            if requested.contains(&uuid) {
                found.push(uuid);
            }
        }
        return Ok(found);
    }
    Err(TransportError::ServiceNotFound)
}

fn read_characteristic(
    adapter: &Adapter,
    events: &mpsc::UnboundedSender<CentralEvent>,
    operations: &mut JoinSet<()>,
    address: RadioAddress,
    characteristic: Uuid,
) {
    let events = events.clone();
    let Some(device) = device_for(adapter, &address) else {
        let _ = events.send(CentralEvent::ValueRead {
            address,
            characteristic,
            value: Err(TransportError::Operation("unknown device address".into())),
        });
        return;
    };
    operations.spawn(async move {
        let value = read_value(&device, characteristic).await;
        let _ = events.send(CentralEvent::ValueRead {
            address,
            characteristic,
            value,
        });
    });
}

async fn read_value(
    device: &bluer::Device,
    characteristic: Uuid,
) -> Result<Vec<u8>, TransportError> {
    let services = device
        .services()
        .await
        .map_err(|err| TransportError::Operation(err.to_string()))?;
    for service in services {
        let characteristics = service
            .characteristics()
            .await
            .map_err(|err| TransportError::Operation(err.to_string()))?;
        for candidate in characteristics {
            let uuid = candidate
                .uuid()
                .await
                .map_err(|err| TransportError::Operation(err.to_string()))?;
            if uuid == characteristic {
                return candidate
                    .read()
                    .await
                    .map_err(|err| TransportError::Operation(err.to_string()));
            }
        }
    }
    Err(TransportError::CharacteristicNotFound)
}

// =============================================================================
// PERIPHERAL ROLE
// =============================================================================

#[derive(Debug)]
enum PeripheralCommand {
    Publish {
        service: Uuid,
        characteristic: Uuid,
        payload: Vec<u8>,
    },
    StartAdvertising {
        local_name: String,
        services: Vec<Uuid>,
    },
    StopAdvertising,
}

struct BluezPeripheral {
    commands: mpsc::UnboundedSender<PeripheralCommand>,
}

impl PeripheralRole for BluezPeripheral {
    fn publish(&mut self, service: Uuid, characteristic: Uuid, payload: Vec<u8>) {
        let _ = self.commands.send(PeripheralCommand::Publish {
            service,
            characteristic,
            payload,
        });
    }

    fn start_advertising(&mut self, local_name: &str, services: &[Uuid]) {
        let _ = self.commands.send(PeripheralCommand::StartAdvertising {
            local_name: local_name.to_owned(),
            services: services.to_vec(),
        });
    }

    fn stop_advertising(&mut self) {
        let _ = self.commands.send(PeripheralCommand::StopAdvertising);
    }
}

async fn peripheral_backend(
    mut commands: mpsc::UnboundedReceiver<PeripheralCommand>,
    events: mpsc::UnboundedSender<PeripheralEvent>,
) {
    let Some(adapter) = open_adapter().await else {
        let _ = events.send(PeripheralEvent::StateChanged(PowerState::Unsupported));
        return;
    };

    let mut powered = PowerState::Unknown;
    let mut power_poll = tokio::time::interval(POWER_POLL);
    let mut application: Option<ApplicationHandle> = None;
    let mut advertisement: Option<AdvertisementHandle> = None;

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else { break };
                match command {
                    PeripheralCommand::Publish { service, characteristic, payload } => {
                        match serve_identity(&adapter, service, characteristic, payload).await {
                            Ok(handle) => application = Some(handle),
                            Err(err) => warn!("failed to publish beacon service: {err}"),
                        }
                    }
                    PeripheralCommand::StartAdvertising { local_name, services } => {
                        let advertisement_request = Advertisement {
                            advertisement_type: AdvertisementType::Peripheral,
                            service_uuids: services.into_iter().collect(),
                            discoverable: Some(true),
                            local_name: Some(local_name),
                            ..Default::default()
                        };
                        match adapter.advertise(advertisement_request).await {
                            Ok(handle) => {
                                advertisement = Some(handle);
                                let _ = events.send(PeripheralEvent::AdvertisingStarted(Ok(())));
                            }
                            Err(err) => {
                                let _ = events.send(PeripheralEvent::AdvertisingStarted(Err(
                                    TransportError::Operation(err.to_string()),
                                )));
                            }
                        }
                    }
                    PeripheralCommand::StopAdvertising => {
                        advertisement = None;
                        application = None;
                    }
                }
            }
            _ = power_poll.tick() => {
                let current = power_state(&adapter).await;
                if current != powered {
                    powered = current;
                    let _ = events.send(PeripheralEvent::StateChanged(current));
                }
            }
        }
    }

    drop(advertisement);
    drop(application);
}

async fn serve_identity(
    adapter: &Adapter,
    service: Uuid,
    characteristic: Uuid,
    payload: Vec<u8>,
) -> bluer::Result<ApplicationHandle> {
    let application = Application {
        services: vec![LocalService {
            uuid: service,
            primary: true,
            characteristics: vec![LocalCharacteristic {
                uuid: characteristic,
                read: Some(CharacteristicRead {
                    read: true,
                    fun: Box::new(move |_req| {
                        let value = payload.clone();
                        Box::pin(async move { Ok(value) })
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }],
            ..Default::default()
        }],
        ..Default::default()
    };
    adapter.serve_gatt_application(application).await
}

// =============================================================================
// SHARED HELPERS
// =============================================================================

async fn open_adapter() -> Option<Adapter> {
    let session = match bluer::Session::new().await {
        Ok(session) => session,
        Err(err) => {
            warn!("no BlueZ session available: {err}");
            return None;
        }
    };
    match session.default_adapter().await {
        Ok(adapter) => Some(adapter),
        Err(err) => {
            warn!("no Bluetooth adapter available: {err}");
            None
        }
    }
}

async fn power_state(adapter: &Adapter) -> PowerState {
    match adapter.is_powered().await {
        Ok(true) => PowerState::PoweredOn,
        Ok(false) => PowerState::PoweredOff,
        Err(_) => PowerState::Unknown,
    }
}

fn device_for(adapter: &Adapter, address: &RadioAddress) -> Option<bluer::Device> {
    let addr: bluer::Address = address.as_str().parse().ok()?;
    device_for_raw(adapter, addr)
}

fn device_for_raw(adapter: &Adapter, addr: bluer::Address) -> Option<bluer::Device> {
    adapter.device(addr).ok()
}
