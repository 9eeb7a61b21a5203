//! Pairing support.
//!
//! Pairing needs exclusive use of the radio, so the flow takes a
//! [`PairingGuard`] before touching it; the scheduler skips cycle bodies
//! while the guard is held and resumes on drop. Candidate discovery
//! reuses the normal discovery pass and filters out identities that are
//! already paired.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::classify::{classify, to_pairing_descriptor};
use crate::error::{BeaconError, Result};
use crate::radio::RadioDiscovery;
use crate::types::{BeaconIdentity, PairingDescriptor};

/// RAII marker for a pairing window.
///
/// Holds the shared pairing-in-progress flag for its lifetime; dropping
/// the guard resumes background scanning.
#[derive(Debug)]
pub struct PairingGuard {
    flag: Arc<AtomicBool>,
}

impl PairingGuard {
    /// Take the pairing window, or `None` if one is already open.
    #[must_use]
    pub fn acquire(flag: Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for PairingGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Discover pairable beacons not yet present in the known-identity set.
///
/// # Errors
///
/// Returns [`BeaconError::NoPairableDevices`] when the pass found nothing
/// new, or a discovery error when the pass itself failed.
pub async fn discover_candidates<R: RadioDiscovery>(
    radio: &R,
    known: &HashSet<BeaconIdentity>,
    driver_name: &str,
    timeout: Duration,
) -> Result<Vec<PairingDescriptor>> {
    let advertisements = radio.discover(timeout).await?;

    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for advertisement in &advertisements {
        if known.contains(&advertisement.identity) {
            continue;
        }
        if !seen.insert(advertisement.identity.clone()) {
            continue;
        }
        if let Some(beacon) = classify(advertisement) {
            candidates.push(to_pairing_descriptor(&beacon, driver_name));
        }
    }

    if candidates.is_empty() {
        return Err(BeaconError::NoPairableDevices);
    }
    Ok(candidates)
}
