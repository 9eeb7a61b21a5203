//! # beacon-core
//!
//! Core logic for the beacon presence detection system.
//!
//! This crate continuously discovers BLE beacon advertisements near a hub,
//! maintains a verified presence state per known beacon, and raises events
//! when a beacon crosses a debounced threshold (enters range, exits range).
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`radio`] - The radio discovery abstraction and its BlueZ implementation
//! - [`classify`] - Mapping raw advertisements to typed beacons per family
//! - [`presence`] - Per-beacon hysteresis/verification state machines
//! - [`scheduler`] - Periodic discovery cycles and radio-access sequencing
//! - [`sequencer`] - Serialized connect-update-disconnect per device
//! - [`pairing`] - Exclusive pairing windows and candidate discovery
//! - [`config`] - Settings loading, validation, and change notification
//! - [`registry`] - Paired device storage
//! - [`trigger`] - Event and log dispatch seam
//! - [`error`] - Unified error types for the crate
//! - [`types`] - Shared types (identities, advertisements, cycle results)

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod classify;
pub mod config;
pub mod error;
#[cfg(any(test, feature = "mock-radio"))]
pub mod mock;
pub mod pairing;
pub mod presence;
pub mod radio;
pub mod registry;
pub mod scheduler;
pub mod sequencer;
pub mod trigger;
pub mod types;

// Re-export primary types for convenience
pub use classify::{classify, to_pairing_descriptor, Beacon, BeaconFamily, BeaconFields};
pub use config::{BeaconSettings, SettingsHandle};
pub use error::{BeaconError, Result};
#[cfg(any(test, feature = "mock-radio"))]
pub use mock::MockRadio;
pub use pairing::{discover_candidates, PairingGuard};
pub use presence::{BeaconPresenceState, PresenceState, PresenceTracker, TransitionEvent};
#[cfg(feature = "bluetooth")]
pub use radio::BlueZRadio;
pub use radio::{Peripheral, RadioDiscovery};
pub use registry::{apply_batch, DeviceRegistry, FileRegistry};
pub use scheduler::{CycleOutput, ScanScheduler};
pub use sequencer::{BatchResult, ConnectSequencer, DeviceOutcome};
pub use trigger::{TracingTrigger, TriggerAdapter};
pub use types::{
    Advertisement, BeaconIdentity, DeviceRecord, PairingData, PairingDescriptor, ScanCycleResult,
};
