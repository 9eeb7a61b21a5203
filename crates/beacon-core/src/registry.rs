//! Device registry.
//!
//! Paired devices live in the registry; the core enumerates them and writes
//! detect flags back through tracked outcomes, but storage belongs here.
//! The file-backed implementation keeps a single JSON document, rewritten
//! on every mutation.

use std::path::PathBuf;

use crate::error::{BeaconError, Result};
use crate::sequencer::BatchResult;
use crate::types::{BeaconIdentity, DeviceRecord};

/// Enumerable store of paired devices.
pub trait DeviceRegistry: Send + Sync {
    /// All registered devices, in registration order.
    fn devices(&self) -> Result<Vec<DeviceRecord>>;

    /// Record a new detect value for a device.
    fn set_detect(&self, identity: &BeaconIdentity, detected: bool) -> Result<()>;

    /// Remove a device. Returns `true` if it existed.
    fn remove(&self, identity: &BeaconIdentity) -> Result<bool>;
}

/// Write the detect flags from a connect batch back to the registry.
///
/// Only outcomes that changed the flag (or recorded it for the first time)
/// touch storage.
///
/// # Errors
///
/// Propagates the first registry write failure.
pub fn apply_batch(registry: &dyn DeviceRegistry, batch: &BatchResult) -> Result<()> {
    for outcome in &batch.outcomes {
        if outcome.changed || outcome.first_observation {
            registry.set_detect(&outcome.identity, outcome.detected)?;
        }
    }
    Ok(())
}

/// JSON-file-backed registry.
#[derive(Debug, Clone)]
pub struct FileRegistry {
    path: PathBuf,
}

impl FileRegistry {
    /// Create a registry backed by `devices.json` under `data_dir`.
    #[must_use]
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            path: data_dir.join("devices.json"),
        }
    }

    /// The default storage location.
    ///
    /// On the hub: `/var/lib/beacon/`.
    /// For development: the platform data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if no data directory can be determined.
    pub fn default_location() -> Result<Self> {
        #[cfg(target_os = "linux")]
        {
            Ok(Self::new(PathBuf::from("/var/lib/beacon")))
        }
        #[cfg(not(target_os = "linux"))]
        {
            let dirs = directories::ProjectDirs::from("", "", "beacon").ok_or_else(|| {
                BeaconError::Persistence("Cannot determine data directory".into())
            })?;
            Ok(Self::new(dirs.data_dir().to_path_buf()))
        }
    }

    /// Register a new device from a completed pairing.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::Persistence`] if the identity is already
    /// registered, or an I/O error if the file cannot be written.
    pub fn add(&self, record: DeviceRecord) -> Result<()> {
        let mut devices = self.load()?;
        if devices.iter().any(|d| d.identity == record.identity) {
            return Err(BeaconError::Persistence(format!(
                "device '{}' is already registered",
                record.identity
            )));
        }
        devices.push(record);
        self.save(&devices)
    }

    fn load(&self) -> Result<Vec<DeviceRecord>> {
        if self.path.exists() {
            let content = std::fs::read_to_string(&self.path)?;
            Ok(serde_json::from_str(&content)?)
        } else {
            Ok(Vec::new())
        }
    }

    fn save(&self, devices: &[DeviceRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(devices)?;
        // Write to a sibling file and rename into place, so a crash
        // mid-write never leaves a truncated devices.json behind.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl DeviceRegistry for FileRegistry {
    fn devices(&self) -> Result<Vec<DeviceRecord>> {
        self.load()
    }

    fn set_detect(&self, identity: &BeaconIdentity, detected: bool) -> Result<()> {
        let mut devices = self.load()?;
        let device = devices
            .iter_mut()
            .find(|d| &d.identity == identity)
            .ok_or_else(|| {
                BeaconError::Persistence(format!("device '{identity}' is not registered"))
            })?;
        device.detect = Some(detected);
        self.save(&devices)
    }

    fn remove(&self, identity: &BeaconIdentity) -> Result<bool> {
        let mut devices = self.load()?;
        let before = devices.len();
        devices.retain(|d| &d.identity != identity);
        if devices.len() == before {
            return Ok(false);
        }
        self.save(&devices)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(identity: &str, name: &str) -> DeviceRecord {
        DeviceRecord {
            identity: BeaconIdentity::parse(identity).unwrap(),
            name: name.to_string(),
            detect: None,
            settings: serde_json::Value::Null,
        }
    }

    #[test]
    fn empty_registry_enumerates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FileRegistry::new(dir.path().to_path_buf());
        assert!(registry.devices().unwrap().is_empty());
    }

    #[test]
    fn add_then_enumerate_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FileRegistry::new(dir.path().to_path_buf());

        registry.add(record("AA:BB:CC:DD:EE:01", "Key fob")).unwrap();
        registry.add(record("AA:BB:CC:DD:EE:02", "Collar tag")).unwrap();

        let devices = registry.devices().unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].name, "Key fob");
        assert_eq!(devices[0].detect, None);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FileRegistry::new(dir.path().to_path_buf());

        registry.add(record("AA:BB:CC:DD:EE:01", "Key fob")).unwrap();
        let result = registry.add(record("AA:BB:CC:DD:EE:01", "Duplicate"));
        assert!(result.is_err());
    }

    #[test]
    fn set_detect_persists() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FileRegistry::new(dir.path().to_path_buf());
        let identity = BeaconIdentity::parse("AA:BB:CC:DD:EE:01").unwrap();

        registry.add(record("AA:BB:CC:DD:EE:01", "Key fob")).unwrap();
        registry.set_detect(&identity, true).unwrap();

        // Reopen from disk to prove persistence.
        let reopened = FileRegistry::new(dir.path().to_path_buf());
        assert_eq!(reopened.devices().unwrap()[0].detect, Some(true));
    }

    #[test]
    fn set_detect_for_unregistered_identity_fails() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FileRegistry::new(dir.path().to_path_buf());
        let identity = BeaconIdentity::parse("AA:BB:CC:DD:EE:09").unwrap();

        assert!(registry.set_detect(&identity, true).is_err());
    }

    #[test]
    fn save_replaces_the_file_and_leaves_no_temp_behind() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FileRegistry::new(dir.path().to_path_buf());
        let identity = BeaconIdentity::parse("AA:BB:CC:DD:EE:01").unwrap();

        registry.add(record("AA:BB:CC:DD:EE:01", "Key fob")).unwrap();
        registry.set_detect(&identity, false).unwrap();

        // The live file holds the latest state and the staging file is gone.
        assert!(!dir.path().join("devices.json.tmp").exists());
        let content = std::fs::read_to_string(dir.path().join("devices.json")).unwrap();
        let parsed: Vec<DeviceRecord> = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed[0].detect, Some(false));
    }

    #[test]
    fn remove_reports_whether_device_existed() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FileRegistry::new(dir.path().to_path_buf());
        let identity = BeaconIdentity::parse("AA:BB:CC:DD:EE:01").unwrap();

        registry.add(record("AA:BB:CC:DD:EE:01", "Key fob")).unwrap();
        assert!(registry.remove(&identity).unwrap());
        assert!(!registry.remove(&identity).unwrap());
        assert!(registry.devices().unwrap().is_empty());
    }
}
