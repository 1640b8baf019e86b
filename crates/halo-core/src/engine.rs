//! The beacon engine.
//!
//! One engine plays both radio roles for one local identity: it advertises
//! the identity under the configured service/characteristic pair while
//! scanning for peers advertising the same service, validates every
//! discovered address down to a stable identity, and reports the smoothed
//! range of each resolved peer to the delegate once per report interval.
//!
//! All mutable state lives inside a single actor task. Commands from the
//! [`BeaconEngine`] handle, transport events, and the four timers are
//! serialized onto that task, so no callback ever races another and no lock
//! is needed. Timer cancellation is a flag flip inside the actor, which
//! makes it immediate: a disarmed timer cannot fire afterwards.
//!
//! The timers:
//!
//! - **authorization poll** (repeating, engine lifetime) — watches radio
//!   authorization and power, reporting each availability transition once.
//! - **report** (repeating, while detecting) — merges resolved histories,
//!   fires the devices-updated callback, then ages every history.
//! - **process** (one-shot, re-armed) — the validation poll: when addresses
//!   are pending it pauses scanning and reporting, connects the whole batch,
//!   and arms the restart guard; otherwise it re-arms itself.
//! - **restart guard** (one-shot) — force-disconnects whatever is still
//!   mid-validation and unconditionally restarts scanning.

use std::collections::BTreeMap;
use std::pin::Pin;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Instant, Interval, MissedTickBehavior, Sleep};
use tracing::{debug, info, warn};

use crate::config::BeaconConfig;
use crate::error::{HaloError, Result};
use crate::identity::IdentityResolver;
use crate::range::PeerEstimate;
use crate::samples::SampleStore;
use crate::transport::{
    CentralEvent, CentralRole, PeripheralEvent, PeripheralRole, PowerState, RadioLink,
};
use crate::types::{LogicalIdentity, RadioAddress};
use crate::validate::ValidationQueue;

/// Callbacks consumed by whoever presents the peer set.
///
/// Both callbacks run on the engine's actor task; implementations should
/// hand the data off rather than do slow work inline.
pub trait BeaconDelegate: Send {
    /// Fired once per report cycle with the full identity→estimate map.
    fn devices_updated(&mut self, devices: &BTreeMap<LogicalIdentity, PeerEstimate>);

    /// Fired once per observed radio availability transition.
    fn radio_availability_changed(&mut self, enabled: bool);
}

/// Observable engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineState {
    /// Whether a scan/report cycle is active.
    pub is_detecting: bool,
    /// Whether our advertisement is on air (or will be at power-on).
    pub is_broadcasting: bool,
    /// Last availability value observed by the authorization poll.
    pub is_radio_enabled: bool,
    /// Addresses currently awaiting validation.
    pub pending_validations: usize,
    /// Addresses validated so far.
    pub resolved_identities: usize,
}

enum Command {
    StartDetecting,
    StopDetecting,
    StartBroadcasting,
    StopBroadcasting,
    SetDelegate(Box<dyn BeaconDelegate>),
    Snapshot(oneshot::Sender<EngineState>),
}

/// Handle to a running beacon engine.
///
/// Engines are independent: each owns its own radio role handles, so
/// multiple instances — one per identity — coexist without interference.
/// Dropping the handle shuts the actor down.
pub struct BeaconEngine {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl BeaconEngine {
    /// Spawn an engine announcing `identity` over `link`.
    ///
    /// The engine is idle until [`start_detecting`](Self::start_detecting)
    /// or [`start_broadcasting`](Self::start_broadcasting) is called; only
    /// the authorization poll runs from the start.
    #[must_use]
    pub fn spawn(identity: LogicalIdentity, config: BeaconConfig, link: impl RadioLink) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (central_sender, central_rx) = mpsc::unbounded_channel();
        let (peripheral_sender, peripheral_rx) = mpsc::unbounded_channel();

        let actor = EngineActor {
            identity,
            config,
            link,
            delegate: None,
            central: None,
            peripheral: None,
            central_sender,
            peripheral_sender,
            store: SampleStore::new(),
            validation: ValidationQueue::new(),
            resolver: IdentityResolver::new(),
            is_detecting: false,
            is_broadcasting: false,
            is_radio_enabled: false,
            peripheral_power: PowerState::Unknown,
        };
        let task = tokio::spawn(actor.run(command_rx, central_rx, peripheral_rx));

        Self { commands, task }
    }

    /// Attach the delegate receiving report and availability callbacks.
    pub fn set_delegate(&self, delegate: impl BeaconDelegate + 'static) {
        let _ = self.commands.send(Command::SetDelegate(Box::new(delegate)));
    }

    /// Begin scanning for peers. Idempotent.
    pub fn start_detecting(&self) {
        let _ = self.commands.send(Command::StartDetecting);
    }

    /// Stop scanning and reporting. Idempotent; clears no data.
    pub fn stop_detecting(&self) {
        let _ = self.commands.send(Command::StopDetecting);
    }

    /// Begin announcing our identity. No-op while unauthorized. Idempotent.
    pub fn start_broadcasting(&self) {
        let _ = self.commands.send(Command::StartBroadcasting);
    }

    /// Withdraw our advertisement. Idempotent.
    pub fn stop_broadcasting(&self) {
        let _ = self.commands.send(Command::StopBroadcasting);
    }

    /// Current engine state.
    ///
    /// # Errors
    ///
    /// Returns [`HaloError::EngineStopped`] if the actor has shut down.
    pub async fn snapshot(&self) -> Result<EngineState> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Snapshot(reply))
            .map_err(|_| HaloError::EngineStopped)?;
        response.await.map_err(|_| HaloError::EngineStopped)
    }

    /// Tear both roles down and wait for the actor to finish.
    pub async fn shutdown(self) {
        drop(self.commands);
        let _ = self.task.await;
    }
}

/// The actor's four timers.
///
/// The repeating timers are intervals gated by an armed flag; the one-shots
/// are re-armed sleeps. A disarmed timer is simply never polled.
struct EngineTimers {
    authorization: Interval,
    report: Interval,
    report_armed: bool,
    process: Pin<Box<Sleep>>,
    process_armed: bool,
    process_interval: Duration,
    restart: Pin<Box<Sleep>>,
    restart_armed: bool,
    restart_delay: Duration,
}

impl EngineTimers {
    fn new(config: &BeaconConfig) -> Self {
        let mut authorization = interval(config.authorization_poll());
        authorization.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut report = interval(config.report_interval());
        report.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            authorization,
            report,
            report_armed: false,
            process: Box::pin(sleep(Duration::ZERO)),
            process_armed: false,
            process_interval: config.process_interval(),
            restart: Box::pin(sleep(Duration::ZERO)),
            restart_armed: false,
            restart_delay: config.restart_delay(),
        }
    }

    fn arm_report(&mut self) {
        self.report.reset();
        self.report_armed = true;
    }

    fn disarm_report(&mut self) {
        self.report_armed = false;
    }

    fn arm_process(&mut self) {
        self.process
            .as_mut()
            .reset(Instant::now() + self.process_interval);
        self.process_armed = true;
    }

    fn arm_restart(&mut self) {
        self.restart
            .as_mut()
            .reset(Instant::now() + self.restart_delay);
        self.restart_armed = true;
    }
}

struct EngineActor<L: RadioLink> {
    identity: LogicalIdentity,
    config: BeaconConfig,
    link: L,
    delegate: Option<Box<dyn BeaconDelegate>>,

    central: Option<Box<dyn CentralRole>>,
    peripheral: Option<Box<dyn PeripheralRole>>,
    central_sender: mpsc::UnboundedSender<CentralEvent>,
    peripheral_sender: mpsc::UnboundedSender<PeripheralEvent>,

    store: SampleStore,
    validation: ValidationQueue,
    resolver: IdentityResolver,

    is_detecting: bool,
    is_broadcasting: bool,
    is_radio_enabled: bool,
    peripheral_power: PowerState,
}

impl<L: RadioLink> EngineActor<L> {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut central_events: mpsc::UnboundedReceiver<CentralEvent>,
        mut peripheral_events: mpsc::UnboundedReceiver<PeripheralEvent>,
    ) {
        let mut timers = EngineTimers::new(&self.config);

        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    self.handle_command(command, &mut timers);
                }
                Some(event) = central_events.recv() => {
                    self.handle_central_event(event, &mut timers);
                }
                Some(event) = peripheral_events.recv() => {
                    self.handle_peripheral_event(event);
                }
                _ = timers.authorization.tick() => {
                    self.poll_radio_availability();
                }
                _ = timers.report.tick(), if timers.report_armed => {
                    self.report_ranges();
                }
                () = &mut timers.process, if timers.process_armed => {
                    timers.process_armed = false;
                    self.process_pending(&mut timers);
                }
                () = &mut timers.restart, if timers.restart_armed => {
                    timers.restart_armed = false;
                    self.sweep_and_restart(&mut timers);
                }
            }
        }

        debug!("beacon engine actor stopped");
    }

    fn handle_command(&mut self, command: Command, timers: &mut EngineTimers) {
        match command {
            Command::StartDetecting => self.start_detecting(),
            Command::StopDetecting => self.stop_detecting(timers),
            Command::StartBroadcasting => self.start_broadcasting(),
            Command::StopBroadcasting => self.stop_broadcasting(),
            Command::SetDelegate(delegate) => self.delegate = Some(delegate),
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    // =========================================================================
    // DETECTING
    // =========================================================================

    fn start_detecting(&mut self) {
        if self.central.is_some() {
            return;
        }
        debug!("opening central role");
        self.central = Some(self.link.open_central(self.central_sender.clone()));
    }

    fn stop_detecting(&mut self, timers: &mut EngineTimers) {
        self.is_detecting = false;
        timers.disarm_report();
        if let Some(central) = self.central.as_mut() {
            central.stop_scan();
        }
        // Dropping the role cancels in-flight connections; histories,
        // pending validations and resolved bindings all survive.
        self.central = None;
    }

    fn start_scanning(&mut self, timers: &mut EngineTimers) {
        let Some(central) = self.central.as_mut() else {
            return;
        };
        central.start_scan(self.config.service_uuid, true);
        timers.arm_report();
        timers.arm_process();
        self.is_detecting = true;
        info!("scanning for peers");
    }

    // =========================================================================
    // BROADCASTING
    // =========================================================================

    fn start_broadcasting(&mut self) {
        if !self.link.authorization().allows_broadcast() {
            warn!("radio not authorized for broadcasting");
            return;
        }
        if self.peripheral.is_some() {
            return;
        }
        debug!("opening peripheral role");
        self.peripheral = Some(self.link.open_peripheral(self.peripheral_sender.clone()));
    }

    fn stop_broadcasting(&mut self) {
        self.is_broadcasting = false;
        if let Some(peripheral) = self.peripheral.as_mut() {
            peripheral.stop_advertising();
        }
        self.peripheral = None;
        self.peripheral_power = PowerState::Unknown;
    }

    fn start_advertising(&mut self) {
        let service = self.config.service_uuid;
        let characteristic = self.config.characteristic_uuid;
        let payload = self.identity.to_bytes();
        let Some(peripheral) = self.peripheral.as_mut() else {
            return;
        };
        peripheral.publish(service, characteristic, payload);
        peripheral.start_advertising(&self.config.local_name, &[service]);
        self.is_broadcasting = true;
        info!(identity = %self.identity, "broadcasting identity");
    }

    // =========================================================================
    // TIMERS
    // =========================================================================

    fn poll_radio_availability(&mut self) {
        let enabled = self.peripheral.is_some()
            && self.link.authorization().allows_broadcast()
            && self.peripheral_power == PowerState::PoweredOn;
        if enabled == self.is_radio_enabled {
            return;
        }
        self.is_radio_enabled = enabled;
        info!(enabled, "radio availability changed");
        if let Some(delegate) = self.delegate.as_mut() {
            delegate.radio_availability_changed(enabled);
        }
    }

    fn report_ranges(&mut self) {
        self.resolver.refresh_from(&self.store);
        let Some(delegate) = self.delegate.as_mut() else {
            return;
        };
        let devices = self.resolver.estimates();
        delegate.devices_updated(&devices);
        self.store.expire_all();
    }

    fn process_pending(&mut self, timers: &mut EngineTimers) {
        let Some(central) = self.central.as_mut() else {
            // Detection stopped since the poll was armed; let it lapse.
            return;
        };
        if self.validation.is_empty() {
            timers.arm_process();
            return;
        }
        // Scanning and reporting pause for the whole batch; the restart
        // guard brings both back whether or not any connect completes.
        timers.disarm_report();
        central.stop_scan();
        for address in self.validation.begin_connect_batch() {
            debug!(%address, "validating peer");
            central.connect(&address);
        }
        timers.arm_restart();
    }

    fn sweep_and_restart(&mut self, timers: &mut EngineTimers) {
        if self.central.is_none() {
            return;
        }
        let stalled = self.validation.sweep_stalled();
        if let Some(central) = self.central.as_mut() {
            for address in &stalled {
                debug!(%address, "sweeping stalled validation");
                central.disconnect(address);
            }
        }
        self.start_scanning(timers);
    }

    // =========================================================================
    // CENTRAL EVENTS
    // =========================================================================

    fn handle_central_event(&mut self, event: CentralEvent, timers: &mut EngineTimers) {
        if self.central.is_none() {
            // Late event from a dropped role; keyed on current state.
            return;
        }
        match event {
            CentralEvent::StateChanged(state) => {
                debug!(?state, "central power state changed");
                if state == PowerState::PoweredOn {
                    self.start_scanning(timers);
                }
            }
            CentralEvent::Discovered { address, rssi } => {
                self.handle_discovery(address, rssi);
            }
            CentralEvent::Connected { address } => {
                if self.validation.mark_connected(&address) {
                    debug!(%address, "connected; discovering services");
                    let service = self.config.service_uuid;
                    if let Some(central) = self.central.as_mut() {
                        central.discover_services(&address, &[service]);
                    }
                }
            }
            CentralEvent::ConnectFailed { address, reason } => {
                debug!(%address, %reason, "connect failed");
                self.validation.mark_connect_failed(&address);
            }
            CentralEvent::ServicesDiscovered { address, services } => match services {
                Ok(services) => {
                    let Some(service) = services.first().copied() else {
                        return;
                    };
                    if self.validation.mark_discovering_characteristics(&address) {
                        debug!(%address, "discovering characteristics");
                        let characteristic = self.config.characteristic_uuid;
                        if let Some(central) = self.central.as_mut() {
                            central.discover_characteristics(&address, service, &[characteristic]);
                        }
                    }
                }
                Err(reason) => {
                    debug!(%address, %reason, "service discovery failed");
                    self.abort_attempt(&address);
                }
            },
            CentralEvent::CharacteristicsDiscovered {
                address,
                characteristics,
                ..
            } => match characteristics {
                Ok(characteristics) => {
                    let Some(characteristic) = characteristics.first().copied() else {
                        return;
                    };
                    if self.validation.mark_reading(&address) {
                        debug!(%address, "reading identity characteristic");
                        if let Some(central) = self.central.as_mut() {
                            central.read_characteristic(&address, characteristic);
                        }
                    }
                }
                Err(reason) => {
                    debug!(%address, %reason, "characteristic discovery failed");
                    self.abort_attempt(&address);
                }
            },
            CentralEvent::ValueRead { address, value, .. } => match value {
                Ok(bytes) => self.finish_validation(address, bytes),
                Err(reason) => {
                    // Still pending; the restart guard disconnects and the
                    // next batch retries.
                    debug!(%address, %reason, "characteristic read failed");
                }
            },
        }
    }

    fn handle_discovery(&mut self, address: RadioAddress, rssi: i16) {
        let first_seen = self.store.record(&address, f32::from(rssi));
        if first_seen && !self.resolver.is_resolved(&address) {
            debug!(%address, rssi, "new peer discovered");
            self.validation.enqueue(address);
        }
    }

    /// A validation walk failed mid-flight: drop the link but keep the
    /// address pending for the next batch.
    fn abort_attempt(&mut self, address: &RadioAddress) {
        self.validation.mark_failed(address);
        if let Some(central) = self.central.as_mut() {
            central.disconnect(address);
        }
    }

    /// The read completed: bind the identity, or abandon the address for
    /// good if its payload can never decode.
    fn finish_validation(&mut self, address: RadioAddress, bytes: Vec<u8>) {
        self.validation.remove(&address);
        match LogicalIdentity::from_utf8(bytes) {
            Ok(identity) => {
                info!(%address, %identity, "peer validated");
                self.resolver.bind(address.clone(), identity);
            }
            Err(_) => {
                warn!(%address, "peer payload is not valid UTF-8; abandoning address");
            }
        }
        if let Some(central) = self.central.as_mut() {
            central.disconnect(&address);
        }
    }

    // =========================================================================
    // PERIPHERAL EVENTS
    // =========================================================================

    fn handle_peripheral_event(&mut self, event: PeripheralEvent) {
        if self.peripheral.is_none() {
            return;
        }
        match event {
            PeripheralEvent::StateChanged(state) => {
                debug!(?state, "peripheral power state changed");
                self.peripheral_power = state;
                if state == PowerState::PoweredOn {
                    self.start_advertising();
                }
            }
            PeripheralEvent::AdvertisingStarted(Ok(())) => {
                info!("advertising started");
            }
            PeripheralEvent::AdvertisingStarted(Err(reason)) => {
                warn!(%reason, "advertising failed to start");
            }
        }
    }

    fn snapshot(&self) -> EngineState {
        EngineState {
            is_detecting: self.is_detecting,
            is_broadcasting: self.is_broadcasting,
            is_radio_enabled: self.is_radio_enabled,
            pending_validations: self.validation.len(),
            resolved_identities: self.resolver.len(),
        }
    }
}
