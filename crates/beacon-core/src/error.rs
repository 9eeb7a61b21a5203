//! Unified error types for the beacon core library.
//!
//! This module provides a unified error type [`BeaconError`] that covers all
//! failure modes across the beacon system.
//!
//! # Design Principles
//!
//! - **Specific variants**: Each error variant captures exactly one failure mode
//! - **Actionable messages**: Error messages guide users toward resolution
//! - **Never fatal**: Per-device errors become an "undetected" outcome for that
//!   device only; per-cycle errors are logged and the next cycle still runs
//!
//! An advertisement that matches no known beacon family is not an error at
//! all: classification returns `None` and the packet is silently dropped.

use std::path::PathBuf;
use thiserror::Error;

/// The unified error type for all beacon operations.
#[derive(Debug, Error)]
pub enum BeaconError {
    // =========================================================================
    // RADIO ERRORS
    // =========================================================================
    /// No Bluetooth adapter was found on this system.
    #[error(
        "No Bluetooth adapter found. Ensure Bluetooth hardware is present and drivers are loaded."
    )]
    AdapterNotFound,

    /// The Bluetooth adapter exists but is powered off.
    #[error("Bluetooth adapter is powered off. Run 'bluetoothctl power on' to enable.")]
    AdapterPoweredOff,

    /// A discovery pass did not complete within its configured window.
    #[error("Discovery timed out after {timeout_ms} ms")]
    DiscoveryTimeout {
        /// The configured discovery window in milliseconds.
        timeout_ms: u64,
    },

    /// A discovery pass failed outright (radio error, session loss).
    #[error("Discovery failed: {0}")]
    DiscoveryFailed(String),

    /// A single-identity lookup found nothing within its timeout.
    #[error("Device not found: '{identity}'. Ensure it is powered on and within range.")]
    DeviceNotFound {
        /// The identity that was searched for.
        identity: String,
    },

    /// Connecting to a found device failed.
    #[error("Could not connect to '{identity}': {message}")]
    ConnectFailed {
        /// The identity of the device.
        identity: String,
        /// Underlying failure description.
        message: String,
    },

    /// Reading service or capability values over an open connection failed.
    #[error("Could not read from '{identity}': {message}")]
    ReadFailed {
        /// The identity of the device.
        identity: String,
        /// Underlying failure description.
        message: String,
    },

    // =========================================================================
    // PAIRING ERRORS
    // =========================================================================
    /// A pairing discovery pass found no devices that are not already paired.
    #[error("No pairable devices found")]
    NoPairableDevices,

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// An identity string is neither a MAC address nor a hex identifier.
    #[error("Invalid beacon identity: '{0}'")]
    InvalidIdentity(String),

    /// The configuration file was not found at the expected path.
    #[error("Configuration file not found at: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// The configuration file exists but could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// The configuration was parsed but contains an invalid value.
    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidation {
        /// Name of the offending setting.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },

    // =========================================================================
    // PERSISTENCE & I/O ERRORS
    // =========================================================================
    /// An error occurred while persisting or reading data.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for beacon operations.
pub type Result<T> = std::result::Result<T, BeaconError>;

impl BeaconError {
    /// Returns `true` if this error came from the radio layer.
    #[inline]
    #[must_use]
    pub fn is_radio_error(&self) -> bool {
        matches!(
            self,
            Self::AdapterNotFound
                | Self::AdapterPoweredOff
                | Self::DiscoveryTimeout { .. }
                | Self::DiscoveryFailed(_)
                | Self::DeviceNotFound { .. }
                | Self::ConnectFailed { .. }
                | Self::ReadFailed { .. }
        )
    }

    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidIdentity(_)
                | Self::ConfigNotFound(_)
                | Self::ConfigParse(_)
                | Self::ConfigValidation { .. }
        )
    }

    /// Returns `true` if this error is expected to clear on a later cycle
    /// without user intervention.
    ///
    /// The scheduler retries indefinitely; these are the errors it retries
    /// through without escalating beyond a log line.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::DiscoveryTimeout { .. }
                | Self::DiscoveryFailed(_)
                | Self::DeviceNotFound { .. }
                | Self::ConnectFailed { .. }
                | Self::ReadFailed { .. }
        )
    }

    /// Returns `true` if this error represents an expected operational state
    /// rather than a system failure.
    #[inline]
    #[must_use]
    pub fn is_expected_state(&self) -> bool {
        matches!(self, Self::NoPairableDevices)
    }
}

impl From<toml::de::Error> for BeaconError {
    fn from(err: toml::de::Error) -> Self {
        Self::ConfigParse(err.to_string())
    }
}

impl From<toml::ser::Error> for BeaconError {
    fn from(err: toml::ser::Error) -> Self {
        Self::ConfigParse(err.to_string())
    }
}

impl From<serde_json::Error> for BeaconError {
    fn from(err: serde_json::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoErr, ErrorKind};

    #[test]
    fn test_radio_error_classification() {
        assert!(BeaconError::AdapterNotFound.is_radio_error());
        assert!(BeaconError::DiscoveryTimeout { timeout_ms: 10_000 }.is_radio_error());
        assert!(BeaconError::DeviceNotFound {
            identity: "AA:BB:CC:DD:EE:FF".into()
        }
        .is_radio_error());

        assert!(!BeaconError::NoPairableDevices.is_radio_error());
        assert!(!BeaconError::ConfigParse("bad".into()).is_radio_error());
    }

    #[test]
    fn test_config_error_classification() {
        assert!(BeaconError::ConfigNotFound(PathBuf::from("/test")).is_config_error());
        assert!(BeaconError::InvalidIdentity("nope".into()).is_config_error());
        assert!(BeaconError::ConfigValidation {
            field: "update_interval_secs",
            message: "must be greater than zero".into()
        }
        .is_config_error());

        assert!(!BeaconError::AdapterNotFound.is_config_error());
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(BeaconError::DiscoveryTimeout { timeout_ms: 5000 }.is_recoverable());
        assert!(BeaconError::ConnectFailed {
            identity: "AA:BB:CC:DD:EE:FF".into(),
            message: "refused".into()
        }
        .is_recoverable());

        // A missing adapter will not fix itself between cycles.
        assert!(!BeaconError::AdapterNotFound.is_recoverable());
    }

    #[test]
    fn test_expected_state() {
        assert!(BeaconError::NoPairableDevices.is_expected_state());
        assert!(!BeaconError::AdapterNotFound.is_expected_state());
    }

    #[test]
    fn test_error_display_messages() {
        let err = BeaconError::DeviceNotFound {
            identity: "AA:BB:CC:DD:EE:FF".into(),
        };
        assert!(format!("{err}").contains("AA:BB:CC:DD:EE:FF"));

        let err = BeaconError::DiscoveryTimeout { timeout_ms: 10_000 };
        assert!(format!("{err}").contains("10000 ms"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoErr::new(ErrorKind::NotFound, "file not found");
        let err: BeaconError = io_err.into();
        assert!(matches!(err, BeaconError::Io(_)));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<BeaconError>();
        assert_sync::<BeaconError>();
    }
}
