//! Advertisement classification.
//!
//! Maps a raw advertisement to a typed [`Beacon`] for each supported
//! hardware family, or rejects it. Families are distinguished by the
//! payload-layout signature at the start of the manufacturer data. A packet
//! that matches no signature, or carries no broadcast name, is silently
//! dropped; that is the expected fate of most traffic near a hub, not an
//! error.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{Advertisement, PairingData, PairingDescriptor};
use crate::BeaconIdentity;

/// Bluetooth SIG company identifier for Apple, used by iBeacon.
const APPLE_COMPANY_ID: u16 = 0x004C;

/// Bluetooth SIG company identifier for Ruuvi Innovations.
const RUUVI_COMPANY_ID: u16 = 0x0499;

/// iBeacon payload prefix: type 0x02 (proximity), length 0x15.
const IBEACON_PREFIX: [u8; 2] = [0x02, 0x15];

/// AltBeacon payload prefix ("beacon code").
const ALTBEACON_PREFIX: [u8; 2] = [0xBE, 0xAC];

/// RuuviTag RAWv2 data format identifier.
const RUUVI_FORMAT_V5: u8 = 5;

/// Supported beacon hardware families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BeaconFamily {
    /// Apple iBeacon proximity frames.
    IBeacon,
    /// AltBeacon (Radius Networks open format).
    AltBeacon,
    /// Ruuvi RuuviTag sensor beacons (RAWv2).
    RuuviTag,
}

impl fmt::Display for BeaconFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::IBeacon => "ibeacon",
            Self::AltBeacon => "altbeacon",
            Self::RuuviTag => "ruuvitag",
        };
        f.write_str(name)
    }
}

/// Family-specific fields decoded from the manufacturer payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeaconFields {
    /// iBeacon proximity frame.
    IBeacon {
        /// Advertised proximity UUID.
        proximity_uuid: Uuid,
        /// Major group number.
        major: u16,
        /// Minor identifier within the group.
        minor: u16,
        /// Calibrated signal strength at 1 m, in dBm.
        tx_power: i8,
    },
    /// AltBeacon frame.
    AltBeacon {
        /// 20-byte organizational beacon identifier.
        beacon_id: [u8; 20],
        /// Calibrated reference RSSI at 1 m, in dBm.
        reference_rssi: i8,
    },
    /// RuuviTag frame; presence detection only needs the format marker.
    RuuviTag {
        /// Ruuvi data format version.
        data_format: u8,
    },
}

/// A classified, recognized advertisement.
///
/// Derived and stateless: recomputed from the raw advertisement on every
/// sighting, never stored.
#[derive(Debug, Clone)]
pub struct Beacon {
    /// Identity the beacon broadcasts under.
    pub identity: BeaconIdentity,

    /// Hardware family the payload signature matched.
    pub family: BeaconFamily,

    /// Decoded family-specific fields.
    pub fields: BeaconFields,

    /// Received signal strength in dBm, if reported.
    pub rssi: Option<i16>,

    /// Broadcast name. Classification requires one.
    pub local_name: String,
}

/// Classify a raw advertisement into a typed beacon.
///
/// Returns `None` for advertisements lacking a broadcast name or matching
/// no known payload-layout signature. Pure: no state, no I/O.
#[must_use]
pub fn classify(advertisement: &Advertisement) -> Option<Beacon> {
    let local_name = advertisement.local_name.as_deref()?.to_string();

    let (family, fields) = classify_manufacturer_data(advertisement)?;

    Some(Beacon {
        identity: advertisement.identity.clone(),
        family,
        fields,
        rssi: advertisement.rssi,
        local_name,
    })
}

/// Try each family signature against the advertisement's manufacturer data.
///
/// Company-keyed signatures (iBeacon, RuuviTag) are checked under their
/// company identifier; AltBeacon is company-agnostic and checked last.
fn classify_manufacturer_data(
    advertisement: &Advertisement,
) -> Option<(BeaconFamily, BeaconFields)> {
    let data = &advertisement.manufacturer_data;

    if let Some(fields) = data.get(&APPLE_COMPANY_ID).and_then(|p| decode_ibeacon(p)) {
        return Some((BeaconFamily::IBeacon, fields));
    }

    if let Some(fields) = data.get(&RUUVI_COMPANY_ID).and_then(|p| decode_ruuvi(p)) {
        return Some((BeaconFamily::RuuviTag, fields));
    }

    for payload in data.values() {
        if let Some(fields) = decode_altbeacon(payload) {
            return Some((BeaconFamily::AltBeacon, fields));
        }
    }

    None
}

/// Decode an iBeacon payload: 0x02 0x15, 16-byte UUID, major, minor, tx power.
fn decode_ibeacon(payload: &[u8]) -> Option<BeaconFields> {
    if payload.len() < 23 || payload[0..2] != IBEACON_PREFIX {
        return None;
    }

    let proximity_uuid = Uuid::from_slice(&payload[2..18]).ok()?;
    let major = u16::from_be_bytes([payload[18], payload[19]]);
    let minor = u16::from_be_bytes([payload[20], payload[21]]);
    let tx_power = payload[22] as i8;

    Some(BeaconFields::IBeacon {
        proximity_uuid,
        major,
        minor,
        tx_power,
    })
}

/// Decode an AltBeacon payload: 0xBE 0xAC, 20-byte id, reference RSSI.
fn decode_altbeacon(payload: &[u8]) -> Option<BeaconFields> {
    if payload.len() < 23 || payload[0..2] != ALTBEACON_PREFIX {
        return None;
    }

    let mut beacon_id = [0u8; 20];
    beacon_id.copy_from_slice(&payload[2..22]);
    let reference_rssi = payload[22] as i8;

    Some(BeaconFields::AltBeacon {
        beacon_id,
        reference_rssi,
    })
}

/// Decode a RuuviTag payload: first byte is the data format.
fn decode_ruuvi(payload: &[u8]) -> Option<BeaconFields> {
    match payload.first() {
        Some(&RUUVI_FORMAT_V5) => Some(BeaconFields::RuuviTag {
            data_format: RUUVI_FORMAT_V5,
        }),
        _ => None,
    }
}

/// Build the pairing descriptor for a classified beacon.
///
/// Callers use this only for identities not already present in their
/// known-identity set; the pairing flow lists the result to the user.
#[must_use]
pub fn to_pairing_descriptor(beacon: &Beacon, driver_name: &str) -> PairingDescriptor {
    PairingDescriptor {
        name: beacon.local_name.clone(),
        data: PairingData {
            id: beacon.identity.to_string(),
            uuid: beacon.identity.to_string(),
            address: beacon.identity.to_string(),
            name: beacon.local_name.clone(),
            kind: format!("{}/{}", driver_name, beacon.family),
            version: format!("v{}", env!("CARGO_PKG_VERSION")),
        },
        capabilities: vec!["detect".to_string()],
    }
}
