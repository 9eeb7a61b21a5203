//! Shared data types for the beacon system.
//!
//! These are the values that cross module boundaries: the identity a beacon
//! broadcasts under, the raw advertisement snapshot taken each discovery
//! cycle, the per-cycle result consumed by logging, and the device record
//! held by the registry.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{BeaconError, Result};

/// Matches a Bluetooth MAC address like `AA:BB:CC:DD:EE:FF`.
static MAC_ADDRESS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9A-Fa-f]{2}(:[0-9A-Fa-f]{2}){5}$").expect("valid regex"));

/// Matches a bare hex identifier (12 to 32 hex digits, no separators),
/// the form BLE stacks report when no MAC address is exposed.
static HEX_UUID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9A-Fa-f]{12,32}$").expect("valid regex"));

/// The identity a beacon or device is addressed by.
///
/// Either a colon-separated MAC address (normalized to uppercase) or a bare
/// hex identifier (normalized to lowercase). Construction always validates,
/// so a held `BeaconIdentity` is known well-formed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct BeaconIdentity(String);

impl BeaconIdentity {
    /// Parse and normalize an identity string.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::InvalidIdentity`] if the string is neither a
    /// MAC address nor a bare hex identifier.
    pub fn parse(value: &str) -> Result<Self> {
        if MAC_ADDRESS_RE.is_match(value) {
            Ok(Self(value.to_ascii_uppercase()))
        } else if HEX_UUID_RE.is_match(value) {
            Ok(Self(value.to_ascii_lowercase()))
        } else {
            Err(BeaconError::InvalidIdentity(value.to_string()))
        }
    }

    /// The normalized identity string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this identity is a MAC address (as opposed to a bare hex id).
    #[must_use]
    pub fn is_mac_address(&self) -> bool {
        MAC_ADDRESS_RE.is_match(&self.0)
    }
}

impl fmt::Display for BeaconIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for BeaconIdentity {
    type Err = BeaconError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl<'de> Deserialize<'de> for BeaconIdentity {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// One radio broadcast packet observed during a discovery cycle.
///
/// Ephemeral: produced fresh each cycle and never retained beyond the
/// cycle's [`ScanCycleResult`].
#[derive(Debug, Clone)]
pub struct Advertisement {
    /// Identity the packet was broadcast under.
    pub identity: BeaconIdentity,

    /// Broadcast name, if the beacon advertises one.
    pub local_name: Option<String>,

    /// Manufacturer-specific data keyed by Bluetooth SIG company identifier.
    pub manufacturer_data: HashMap<u16, Vec<u8>>,

    /// Received signal strength in dBm, if reported.
    pub rssi: Option<i16>,

    /// When this packet was first seen in the current cycle.
    pub first_seen_at: DateTime<Utc>,
}

/// Result of one complete scan-and-classify pass.
///
/// Transient: produced once per cycle and handed to logging collaborators,
/// never kept as shared state.
#[derive(Debug, Clone)]
pub struct ScanCycleResult {
    /// Advertisement snapshot taken this cycle.
    pub advertisements: Vec<Advertisement>,

    /// How many advertisements classified to a known beacon family.
    pub classified: usize,

    /// When the discovery pass started.
    pub started_at: DateTime<Utc>,

    /// Wall-clock duration of the pass in milliseconds.
    pub duration_ms: u64,

    /// Discovery error, if the pass failed. A failed pass is recorded and
    /// logged; it never prevents the next cycle.
    pub error: Option<String>,
}

impl ScanCycleResult {
    /// Whether the discovery pass itself succeeded.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Identifying payload stored with a paired device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingData {
    /// Stable identifier used as the device id.
    pub id: String,

    /// Identity in hex/uuid form.
    pub uuid: String,

    /// Identity in address form.
    pub address: String,

    /// Broadcast name at pairing time.
    pub name: String,

    /// Beacon family name.
    #[serde(rename = "type")]
    pub kind: String,

    /// Version of the software that produced this descriptor.
    pub version: String,
}

/// A pairable device as presented to the pairing flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingDescriptor {
    /// Display name.
    pub name: String,

    /// Identifying payload stored with the device.
    pub data: PairingData,

    /// Capabilities the paired device will expose.
    pub capabilities: Vec<String>,
}

/// A device held by the registry.
///
/// The core reads these and writes back the detect flag through tracked
/// outcomes; storage belongs to the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Identity this device is found and connected by.
    pub identity: BeaconIdentity,

    /// Display name.
    pub name: String,

    /// Last recorded detect value. `None` until the device has been
    /// observed at least once.
    #[serde(default)]
    pub detect: Option<bool>,

    /// Free-form per-device settings, owned by external collaborators.
    #[serde(default)]
    pub settings: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_normalizes_mac_address() {
        let id = BeaconIdentity::parse("aa:bb:cc:dd:ee:ff").unwrap();
        assert_eq!(id.as_str(), "AA:BB:CC:DD:EE:FF");
        assert!(id.is_mac_address());
    }

    #[test]
    fn parses_and_normalizes_hex_identifier() {
        let id = BeaconIdentity::parse("0123456789ABCDEF0123").unwrap();
        assert_eq!(id.as_str(), "0123456789abcdef0123");
        assert!(!id.is_mac_address());
    }

    #[test]
    fn rejects_malformed_identity() {
        for bad in ["", "not-an-id", "AA:BB:CC", "zz:zz:zz:zz:zz:zz", "0123"] {
            assert!(
                BeaconIdentity::parse(bad).is_err(),
                "expected rejection of {bad:?}"
            );
        }
    }

    #[test]
    fn identity_roundtrips_through_serde() {
        let id = BeaconIdentity::parse("AA:BB:CC:DD:EE:FF").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        let back: BeaconIdentity = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn identity_deserialization_validates() {
        let result: std::result::Result<BeaconIdentity, _> =
            serde_json::from_str("\"definitely not valid\"");
        assert!(result.is_err());
    }

    #[test]
    fn device_record_defaults_detect_to_none() {
        let record: DeviceRecord = serde_json::from_str(
            r#"{"identity": "AA:BB:CC:DD:EE:FF", "name": "Key fob"}"#,
        )
        .unwrap();
        assert_eq!(record.detect, None);
        assert!(record.settings.is_null());
    }
}
