//! Shared fixtures for the engine integration suites.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::time::Duration;

use halo_core::transport::mock::{MockCommand, MockRadioHandle};
use halo_core::{BeaconDelegate, LogicalIdentity, PeerEstimate};
use tokio::sync::mpsc;

/// One devices-updated callback payload.
pub type Report = BTreeMap<LogicalIdentity, PeerEstimate>;

/// Delegate that forwards every callback onto channels the test can await.
pub struct ChannelDelegate {
    reports: mpsc::UnboundedSender<Report>,
    availability: mpsc::UnboundedSender<bool>,
}

impl ChannelDelegate {
    /// Build the delegate plus the receiving ends for both callbacks.
    pub fn new() -> (
        Self,
        mpsc::UnboundedReceiver<Report>,
        mpsc::UnboundedReceiver<bool>,
    ) {
        let (reports, report_rx) = mpsc::unbounded_channel();
        let (availability, availability_rx) = mpsc::unbounded_channel();
        (
            Self {
                reports,
                availability,
            },
            report_rx,
            availability_rx,
        )
    }
}

impl BeaconDelegate for ChannelDelegate {
    fn devices_updated(&mut self, devices: &Report) {
        let _ = self.reports.send(devices.clone());
    }

    fn radio_availability_changed(&mut self, enabled: bool) {
        let _ = self.availability.send(enabled);
    }
}

/// Await the next command matching `matcher`, skipping everything else.
///
/// Panics (failing the test) if the link closes or nothing matches within a
/// minute of virtual time.
pub async fn expect_command(
    radio: &mut MockRadioHandle,
    description: &str,
    matcher: impl Fn(&MockCommand) -> bool,
) -> MockCommand {
    for _ in 0..200 {
        let command = tokio::time::timeout(Duration::from_secs(60), radio.next_command())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {description}"))
            .unwrap_or_else(|| panic!("radio link closed while waiting for {description}"));
        if matcher(&command) {
            return command;
        }
    }
    panic!("no {description} within 200 commands");
}

/// Await the next report matching `matcher`, skipping earlier cycles.
pub async fn expect_report(
    reports: &mut mpsc::UnboundedReceiver<Report>,
    description: &str,
    matcher: impl Fn(&Report) -> bool,
) -> Report {
    for _ in 0..200 {
        let report = tokio::time::timeout(Duration::from_secs(60), reports.recv())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {description}"))
            .unwrap_or_else(|| panic!("delegate dropped while waiting for {description}"));
        if matcher(&report) {
            return report;
        }
    }
    panic!("no {description} within 200 report cycles");
}
