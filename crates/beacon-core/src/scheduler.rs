//! Discovery cycle scheduling.
//!
//! The scheduler drives periodic scan-and-classify passes and owns all
//! radio access: the connect batch runs inside the same loop iteration,
//! strictly after the discovery pass, so two cycles can never interleave
//! their updates to the same presence state and the radio never sees two
//! outstanding operations.
//!
//! A cycle body is skipped while pairing holds the radio, but the next
//! cycle is still scheduled; scanning never silently stops. Discovery
//! failure is recorded and logged, never fatal.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::classify::classify;
use crate::config::BeaconSettings;
use crate::presence::{PresenceTracker, TransitionEvent};
use crate::radio::RadioDiscovery;
use crate::registry::{self, DeviceRegistry};
use crate::sequencer::ConnectSequencer;
use crate::trigger::TriggerAdapter;
use crate::types::ScanCycleResult;

/// What one scheduled invocation produced.
#[derive(Debug)]
pub enum CycleOutput {
    /// The cycle body was skipped because pairing holds the radio.
    /// The next cycle is still scheduled.
    Skipped,

    /// A discovery pass ran (successfully or not).
    Completed {
        /// The per-cycle snapshot, including any discovery error.
        result: ScanCycleResult,
        /// Debounced transitions verified this cycle, ready for dispatch.
        events: Vec<TransitionEvent>,
    },
}

/// Drives periodic discovery cycles and the presence tracker.
pub struct ScanScheduler<R> {
    radio: Arc<R>,
    tracker: PresenceTracker,
    settings: watch::Receiver<BeaconSettings>,
    pairing: Arc<AtomicBool>,
}

impl<R: RadioDiscovery> ScanScheduler<R> {
    /// Create a scheduler over the shared radio.
    pub fn new(
        radio: Arc<R>,
        tracker: PresenceTracker,
        settings: watch::Receiver<BeaconSettings>,
    ) -> Self {
        Self {
            radio,
            tracker,
            settings,
            pairing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The shared pairing-in-progress flag. Hand this to the pairing flow;
    /// while it is set, cycle bodies are skipped.
    #[must_use]
    pub fn pairing_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.pairing)
    }

    /// Read access to the presence tracker.
    #[must_use]
    pub fn tracker(&self) -> &PresenceTracker {
        &self.tracker
    }

    /// Mutable access to the presence tracker, for pruning removed devices.
    pub fn tracker_mut(&mut self) -> &mut PresenceTracker {
        &mut self.tracker
    }

    /// Perform one discovery pass.
    ///
    /// Classifies the snapshot, feeds one sighting per classified identity
    /// to the tracker, then counts one absence for every known identity
    /// missing from the classified set. All state updates complete before
    /// this returns; events are returned for dispatch, not dispatched here.
    pub async fn run_cycle(&mut self) -> CycleOutput {
        let snapshot = self.settings.borrow().clone();
        self.tracker.set_thresholds(
            snapshot.verification_amount_inside,
            snapshot.verification_amount_outside,
        );

        if self.pairing.load(Ordering::SeqCst) {
            return CycleOutput::Skipped;
        }

        let started_at = Utc::now();
        let started = Instant::now();

        let (advertisements, error) = match self.radio.discover(snapshot.timeout()).await {
            Ok(advertisements) => (advertisements, None),
            Err(e) => (Vec::new(), Some(e.to_string())),
        };
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let mut events = Vec::new();
        let mut classified = 0;

        if error.is_none() {
            let now = Utc::now();
            let mut sighted = HashSet::new();

            for advertisement in &advertisements {
                let Some(beacon) = classify(advertisement) else {
                    continue;
                };
                classified += 1;
                // One sighting per identity per cycle.
                if !sighted.insert(beacon.identity.clone()) {
                    continue;
                }
                if let Some(event) = self.tracker.observe(&beacon, now) {
                    events.push(event);
                }
            }

            for identity in self.tracker.known_identities() {
                if !sighted.contains(&identity) {
                    if let Some(event) = self.tracker.on_missing_cycle(&identity, now) {
                        events.push(event);
                    }
                }
            }
        }

        CycleOutput::Completed {
            result: ScanCycleResult {
                advertisements,
                classified,
                started_at,
                duration_ms,
                error,
            },
            events,
        }
    }

    /// The delay before the next cycle, read at schedule time.
    ///
    /// `None` when `use_timeout` is disabled: the scheduler never
    /// self-schedules a follow-up cycle.
    #[must_use]
    pub fn next_delay(&self) -> Option<Duration> {
        let snapshot = self.settings.borrow();
        snapshot.use_timeout.then(|| snapshot.update_interval())
    }

    /// Dispatch a cycle's events and log output to the trigger adapter.
    pub fn dispatch(output: &CycleOutput, trigger: &dyn TriggerAdapter) {
        match output {
            CycleOutput::Skipped => {
                debug!("cycle skipped: pairing in progress");
            }
            CycleOutput::Completed { result, events } => {
                if let Some(error) = &result.error {
                    warn!(error, "discovery failed; next cycle still scheduled");
                    trigger.append_log(&format!("discovery failed: {error}"));
                }
                for event in events {
                    trigger.beacon_transition(event);
                }
                debug!(
                    advertisements = result.advertisements.len(),
                    classified = result.classified,
                    duration_ms = result.duration_ms,
                    "cycle complete"
                );
            }
        }
    }

    /// Run the scheduling loop: discovery cycle, connect batch, log flush,
    /// then sleep for the configured interval and go again.
    ///
    /// Returns after one iteration when `use_timeout` is disabled, and
    /// keeps going indefinitely otherwise; no cycle failure ends the loop.
    pub async fn run(
        &mut self,
        sequencer: &ConnectSequencer<R>,
        registry: &dyn DeviceRegistry,
        trigger: &dyn TriggerAdapter,
    ) {
        loop {
            let output = self.run_cycle().await;
            Self::dispatch(&output, trigger);

            if !matches!(output, CycleOutput::Skipped) {
                self.update_devices(sequencer, registry, trigger).await;
            }

            trigger.flush();

            match self.next_delay() {
                Some(delay) => tokio::time::sleep(delay).await,
                None => return,
            }
        }
    }

    /// Run the connect batch over the current device list and record the
    /// outcomes.
    async fn update_devices(
        &self,
        sequencer: &ConnectSequencer<R>,
        registry: &dyn DeviceRegistry,
        trigger: &dyn TriggerAdapter,
    ) {
        let devices = match registry.devices() {
            Ok(devices) => devices,
            Err(e) => {
                warn!(error = %e, "could not enumerate devices");
                return;
            }
        };
        if devices.is_empty() {
            return;
        }

        let batch = sequencer.run(&devices).await;

        for outcome in &batch.outcomes {
            trigger.append_log(&format!(
                "{} [{}]",
                outcome.name,
                if outcome.detected { "✓" } else { "x" }
            ));
            if outcome.changed {
                trigger.device_detect_changed(&outcome.identity, outcome.detected);
            }
        }

        if let Err(e) = registry::apply_batch(registry, &batch) {
            warn!(error = %e, "failed to record detect flags");
        }

        trigger.append_log(&format!(
            "all devices synced in {:.1} seconds",
            batch.duration.as_secs_f64()
        ));
    }
}
