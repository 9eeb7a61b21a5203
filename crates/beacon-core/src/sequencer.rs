//! Serialized connect-update-disconnect sequencing.
//!
//! The radio stack supports exactly one active connection, so devices are
//! updated strictly one at a time: find, connect, re-read capability
//! values, disconnect, next device. A connection is released on every exit
//! path where one was established. One device's failure marks only that
//! device undetected; the batch always continues.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::BeaconSettings;
use crate::error::Result;
use crate::radio::RadioDiscovery;
use crate::types::{BeaconIdentity, DeviceRecord};

/// Outcome of the update sequence for one device.
#[derive(Debug, Clone)]
pub struct DeviceOutcome {
    /// Identity of the device.
    pub identity: BeaconIdentity,

    /// Display name, carried for logging.
    pub name: String,

    /// Whether the device was successfully reached this batch.
    pub detected: bool,

    /// Whether the detect flag differs from the previously recorded value.
    pub changed: bool,

    /// Whether this was the device's first-ever observation (no prior
    /// recorded detect value). First observations record the flag without
    /// a change event, so startup does not fabricate an arrival.
    pub first_observation: bool,

    /// The step failure that made the device undetected, if any.
    pub error: Option<String>,
}

/// Result of one full batch over the registry's device list.
#[derive(Debug, Clone)]
pub struct BatchResult {
    /// Per-device outcomes, in input order.
    pub outcomes: Vec<DeviceOutcome>,

    /// Total wall-clock duration of the batch.
    pub duration: Duration,
}

impl BatchResult {
    /// Count of devices reached this batch.
    #[must_use]
    pub fn detected_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.detected).count()
    }
}

/// Runs the per-device connect sequence over an ordered device list.
pub struct ConnectSequencer<R> {
    radio: Arc<R>,
    settings: watch::Receiver<BeaconSettings>,
}

impl<R: RadioDiscovery> ConnectSequencer<R> {
    /// Create a sequencer sharing the scheduler's radio.
    pub fn new(radio: Arc<R>, settings: watch::Receiver<BeaconSettings>) -> Self {
        Self { radio, settings }
    }

    /// Update every device in order, one at a time.
    ///
    /// The find/connect window is read from the settings snapshot once per
    /// batch.
    pub async fn run(&self, devices: &[DeviceRecord]) -> BatchResult {
        let started = Instant::now();
        let timeout = self.settings.borrow().timeout();

        let mut outcomes = Vec::with_capacity(devices.len());
        for device in devices {
            outcomes.push(self.update_device(device, timeout).await);
        }

        BatchResult {
            outcomes,
            duration: started.elapsed(),
        }
    }

    async fn update_device(&self, device: &DeviceRecord, timeout: Duration) -> DeviceOutcome {
        // A device never observed before counts as detected from the start;
        // only later cycles may contradict that.
        let first_observation = device.detect.is_none();
        let previous = device.detect.unwrap_or(true);

        let (detected, error) = match self.try_sequence(device, timeout).await {
            Ok(()) => (true, None),
            Err(e) => {
                debug!(identity = %device.identity, error = %e, "device update failed");
                (false, Some(e.to_string()))
            }
        };

        DeviceOutcome {
            identity: device.identity.clone(),
            name: device.name.clone(),
            detected,
            changed: detected != previous,
            first_observation,
            error,
        }
    }

    /// One connect-update-disconnect pass.
    ///
    /// The peripheral is released before returning whenever a connection
    /// was established, whatever the read outcome.
    async fn try_sequence(&self, device: &DeviceRecord, timeout: Duration) -> Result<()> {
        let advertisement = self.radio.find(&device.identity, timeout).await?;
        let peripheral = self.radio.connect(&advertisement).await?;

        let read_result = peripheral.read_services().await;

        if peripheral.is_connected().await {
            if let Err(e) = peripheral.disconnect().await {
                warn!(identity = %device.identity, error = %e, "disconnect failed");
            }
        }

        read_result
    }
}
