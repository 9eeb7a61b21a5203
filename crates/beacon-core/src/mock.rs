//! Scriptable radio for tests.
//!
//! `MockRadio` replaces the BlueZ stack with scripted discovery cycles and
//! per-identity failure injection, and counts the radio operations issued
//! against it so tests can assert on sequencing behavior.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{BeaconError, Result};
use crate::radio::{Peripheral, RadioDiscovery};
use crate::types::{Advertisement, BeaconIdentity};

/// Operation counters shared between a [`MockRadio`] and its peripherals.
#[derive(Debug, Default)]
pub struct MockRadioStats {
    /// Number of `discover` calls issued.
    pub discover_calls: AtomicUsize,
    /// Number of `find` calls issued.
    pub find_calls: AtomicUsize,
    /// Number of `connect` calls issued.
    pub connect_calls: AtomicUsize,
    disconnects: Mutex<HashMap<BeaconIdentity, usize>>,
}

impl MockRadioStats {
    /// How many times the peripheral for `identity` was disconnected.
    #[must_use]
    pub fn disconnects_for(&self, identity: &BeaconIdentity) -> usize {
        *self
            .disconnects
            .lock()
            .expect("stats lock")
            .get(identity)
            .unwrap_or(&0)
    }
}

/// A radio whose behavior is scripted up front.
#[derive(Default)]
pub struct MockRadio {
    cycles: Mutex<VecDeque<Result<Vec<Advertisement>>>>,
    findable: Mutex<HashMap<BeaconIdentity, Advertisement>>,
    fail_find: Mutex<HashSet<BeaconIdentity>>,
    fail_connect: Mutex<HashSet<BeaconIdentity>>,
    fail_read: Mutex<HashSet<BeaconIdentity>>,
    stats: Arc<MockRadioStats>,
}

impl MockRadio {
    /// Create an empty mock; every discover call yields no advertisements
    /// until cycles are scripted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the advertisement snapshot for the next discovery cycle.
    pub fn push_cycle(&self, advertisements: Vec<Advertisement>) {
        self.cycles
            .lock()
            .expect("cycles lock")
            .push_back(Ok(advertisements));
    }

    /// Script a discovery failure for the next cycle.
    pub fn push_cycle_error(&self, error: BeaconError) {
        self.cycles.lock().expect("cycles lock").push_back(Err(error));
    }

    /// Make an identity resolvable through `find`.
    pub fn make_findable(&self, advertisement: Advertisement) {
        self.findable
            .lock()
            .expect("findable lock")
            .insert(advertisement.identity.clone(), advertisement);
    }

    /// Make `find` fail for this identity.
    pub fn fail_find(&self, identity: BeaconIdentity) {
        self.fail_find.lock().expect("fail lock").insert(identity);
    }

    /// Make `connect` fail for this identity.
    pub fn fail_connect(&self, identity: BeaconIdentity) {
        self.fail_connect.lock().expect("fail lock").insert(identity);
    }

    /// Make the capability read fail for this identity after a successful
    /// connect.
    pub fn fail_read(&self, identity: BeaconIdentity) {
        self.fail_read.lock().expect("fail lock").insert(identity);
    }

    /// Shared operation counters.
    #[must_use]
    pub fn stats(&self) -> Arc<MockRadioStats> {
        Arc::clone(&self.stats)
    }
}

#[async_trait]
impl RadioDiscovery for MockRadio {
    async fn discover(&self, _timeout: Duration) -> Result<Vec<Advertisement>> {
        self.stats.discover_calls.fetch_add(1, Ordering::SeqCst);
        self.cycles
            .lock()
            .expect("cycles lock")
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn find(&self, identity: &BeaconIdentity, _timeout: Duration) -> Result<Advertisement> {
        self.stats.find_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_find.lock().expect("fail lock").contains(identity) {
            return Err(BeaconError::DeviceNotFound {
                identity: identity.to_string(),
            });
        }

        self.findable
            .lock()
            .expect("findable lock")
            .get(identity)
            .cloned()
            .ok_or_else(|| BeaconError::DeviceNotFound {
                identity: identity.to_string(),
            })
    }

    async fn connect(&self, advertisement: &Advertisement) -> Result<Box<dyn Peripheral>> {
        self.stats.connect_calls.fetch_add(1, Ordering::SeqCst);

        let identity = advertisement.identity.clone();
        if self.fail_connect.lock().expect("fail lock").contains(&identity) {
            return Err(BeaconError::ConnectFailed {
                identity: identity.to_string(),
                message: "scripted connect failure".into(),
            });
        }

        let fail_read = self.fail_read.lock().expect("fail lock").contains(&identity);
        Ok(Box::new(MockPeripheral {
            identity,
            fail_read,
            connected: AtomicBool::new(true),
            stats: Arc::clone(&self.stats),
        }))
    }
}

struct MockPeripheral {
    identity: BeaconIdentity,
    fail_read: bool,
    connected: AtomicBool,
    stats: Arc<MockRadioStats>,
}

#[async_trait]
impl Peripheral for MockPeripheral {
    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn read_services(&self) -> Result<()> {
        if self.fail_read {
            return Err(BeaconError::ReadFailed {
                identity: self.identity.to_string(),
                message: "scripted read failure".into(),
            });
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        *self
            .stats
            .disconnects
            .lock()
            .expect("stats lock")
            .entry(self.identity.clone())
            .or_insert(0) += 1;
        Ok(())
    }
}

/// Build a well-formed iBeacon advertisement for tests.
#[must_use]
pub fn ibeacon_advertisement(identity: &str, local_name: &str) -> Advertisement {
    let mut payload = vec![0x02, 0x15];
    payload.extend_from_slice(&[0x11; 16]);
    payload.extend_from_slice(&[0x00, 0x01, 0x00, 0x2A]);
    payload.push(0xC5);

    Advertisement {
        identity: BeaconIdentity::parse(identity).expect("valid test identity"),
        local_name: Some(local_name.to_string()),
        manufacturer_data: HashMap::from([(0x004C, payload)]),
        rssi: Some(-55),
        first_seen_at: Utc::now(),
    }
}

/// Build an advertisement with an unrecognized manufacturer payload.
#[must_use]
pub fn unclassifiable_advertisement(identity: &str, local_name: &str) -> Advertisement {
    Advertisement {
        identity: BeaconIdentity::parse(identity).expect("valid test identity"),
        local_name: Some(local_name.to_string()),
        manufacturer_data: HashMap::from([(0x00E0, vec![0x01, 0x02, 0x03])]),
        rssi: Some(-70),
        first_seen_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_cycles_are_consumed_in_order() {
        let radio = MockRadio::new();
        radio.push_cycle(vec![ibeacon_advertisement("AA:BB:CC:DD:EE:01", "one")]);
        radio.push_cycle(vec![]);

        let first = radio.discover(Duration::from_secs(1)).await.unwrap();
        assert_eq!(first.len(), 1);

        let second = radio.discover(Duration::from_secs(1)).await.unwrap();
        assert!(second.is_empty());

        // Exhausted script behaves like an empty airspace.
        let third = radio.discover(Duration::from_secs(1)).await.unwrap();
        assert!(third.is_empty());
        assert_eq!(radio.stats().discover_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn disconnects_are_counted_per_identity() {
        let radio = MockRadio::new();
        let adv = ibeacon_advertisement("AA:BB:CC:DD:EE:01", "one");
        let identity = adv.identity.clone();

        let peripheral = radio.connect(&adv).await.unwrap();
        assert!(peripheral.is_connected().await);
        peripheral.disconnect().await.unwrap();
        assert!(!peripheral.is_connected().await);

        assert_eq!(radio.stats().disconnects_for(&identity), 1);
    }
}
