//! Trigger adapter seam.
//!
//! The state machines return events; this is the distinct dispatch step.
//! Downstream delivery (flow triggers, notification fan-out) is owned by
//! external collaborators behind [`TriggerAdapter`]; the core only hands
//! events over and batches free-form log lines for delivery once per cycle.

use std::fmt::Write as _;
use std::sync::Mutex;

use chrono::Utc;
use tracing::info;

use crate::presence::TransitionEvent;
use crate::types::BeaconIdentity;

/// Consumer of transition events and batched log lines.
pub trait TriggerAdapter: Send + Sync {
    /// A beacon crossed a debounced threshold.
    fn beacon_transition(&self, event: &TransitionEvent);

    /// A paired device's detect flag changed through a tracked outcome.
    fn device_detect_changed(&self, identity: &BeaconIdentity, detected: bool);

    /// Append a free-form log line to the current batch.
    fn append_log(&self, line: &str);

    /// Deliver the accumulated log batch, if any.
    fn flush(&self);
}

/// Trigger adapter that forwards everything to `tracing`.
///
/// Log lines are timestamped and batched; the whole batch goes out as one
/// event at the end of a cycle.
#[derive(Debug, Default)]
pub struct TracingTrigger {
    buffer: Mutex<String>,
}

impl TracingTrigger {
    /// Create an adapter with an empty log batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TriggerAdapter for TracingTrigger {
    fn beacon_transition(&self, event: &TransitionEvent) {
        info!(
            identity = %event.identity,
            family = %event.family,
            from = %event.previous,
            to = %event.current,
            event_id = %event.event_id,
            "beacon {} range",
            if event.entered() { "entered" } else { "exited" }
        );
    }

    fn device_detect_changed(&self, identity: &BeaconIdentity, detected: bool) {
        info!(%identity, detected, "device detect changed");
    }

    fn append_log(&self, line: &str) {
        let mut buffer = self.buffer.lock().expect("log buffer lock");
        let _ = writeln!(
            buffer,
            "{} {line}",
            Utc::now().format("%d-%m-%Y %H:%M:%S")
        );
    }

    fn flush(&self) {
        let batch = std::mem::take(&mut *self.buffer.lock().expect("log buffer lock"));
        if !batch.is_empty() {
            info!(target: "beacon::log", "{}", batch.trim_end());
        }
    }
}

/// Trigger adapter that records everything for assertions.
#[cfg(any(test, feature = "mock-radio"))]
#[derive(Debug, Default)]
pub struct RecordingTrigger {
    /// Transition events received, in order.
    pub transitions: Mutex<Vec<TransitionEvent>>,
    /// Detect-flag changes received, in order.
    pub detect_changes: Mutex<Vec<(BeaconIdentity, bool)>>,
    /// Log lines appended since the last flush.
    pub pending_lines: Mutex<Vec<String>>,
    /// Batches delivered by flushes (empty flushes excluded).
    pub flushed_batches: Mutex<Vec<Vec<String>>>,
}

#[cfg(any(test, feature = "mock-radio"))]
impl RecordingTrigger {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(any(test, feature = "mock-radio"))]
impl TriggerAdapter for RecordingTrigger {
    fn beacon_transition(&self, event: &TransitionEvent) {
        self.transitions
            .lock()
            .expect("recorder lock")
            .push(event.clone());
    }

    fn device_detect_changed(&self, identity: &BeaconIdentity, detected: bool) {
        self.detect_changes
            .lock()
            .expect("recorder lock")
            .push((identity.clone(), detected));
    }

    fn append_log(&self, line: &str) {
        self.pending_lines
            .lock()
            .expect("recorder lock")
            .push(line.to_string());
    }

    fn flush(&self) {
        let lines = std::mem::take(&mut *self.pending_lines.lock().expect("recorder lock"));
        if !lines.is_empty() {
            self.flushed_batches
                .lock()
                .expect("recorder lock")
                .push(lines);
        }
    }
}
