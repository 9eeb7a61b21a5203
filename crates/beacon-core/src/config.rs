//! Settings management.
//!
//! Handles loading, saving, and validating the beacon settings, and
//! publishes settings changes over a watch channel so running components
//! pick up new values at their next suspension point. The scheduler reads
//! its reschedule delay at schedule time, so a cadence change takes effect
//! on the next cycle without restarting anything.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::{BeaconError, Result};

/// Runtime settings for discovery, verification, and the update cadence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeaconSettings {
    /// Discovery and find window in milliseconds.
    pub timeout_ms: u64,

    /// Seconds between scan cycles.
    pub update_interval_secs: u64,

    /// Consecutive sightings required before a beacon is verified inside.
    pub verification_amount_inside: u32,

    /// Consecutive absent cycles required before a beacon is verified outside.
    pub verification_amount_outside: u32,

    /// When `false`, the scheduler never self-schedules a follow-up cycle;
    /// cycles run only when externally triggered.
    pub use_timeout: bool,
}

impl Default for BeaconSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            update_interval_secs: 10,
            verification_amount_inside: 1,
            verification_amount_outside: 5,
            use_timeout: true,
        }
    }
}

impl BeaconSettings {
    /// Discovery window as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Delay between scan cycles as a [`Duration`].
    #[must_use]
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    /// Validate all settings values.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::ConfigValidation`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(BeaconError::ConfigValidation {
                field: "timeout_ms",
                message: "must be greater than zero".into(),
            });
        }
        if self.update_interval_secs == 0 {
            return Err(BeaconError::ConfigValidation {
                field: "update_interval_secs",
                message: "must be greater than zero".into(),
            });
        }
        if self.verification_amount_inside == 0 {
            return Err(BeaconError::ConfigValidation {
                field: "verification_amount_inside",
                message: "must be at least one cycle".into(),
            });
        }
        if self.verification_amount_outside == 0 {
            return Err(BeaconError::ConfigValidation {
                field: "verification_amount_outside",
                message: "must be at least one cycle".into(),
            });
        }
        Ok(())
    }

    /// Load settings from a TOML file, falling back to defaults when the
    /// file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// parsed values fail validation.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let settings: Self = toml::from_str(&content)?;
            settings.validate()?;
            Ok(settings)
        } else {
            Ok(Self::default())
        }
    }

    /// Save settings to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// The default settings file path.
    ///
    /// On the hub: `/etc/beacon/config.toml`.
    /// For development: `~/.config/beacon/config.toml`.
    ///
    /// # Errors
    ///
    /// Returns an error if no config directory can be determined.
    pub fn default_path() -> Result<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            Ok(PathBuf::from("/etc/beacon/config.toml"))
        }
        #[cfg(not(target_os = "linux"))]
        {
            let dirs = directories::ProjectDirs::from("", "", "beacon").ok_or_else(|| {
                BeaconError::ConfigParse("Cannot determine config directory".into())
            })?;
            Ok(dirs.config_dir().join("config.toml"))
        }
    }
}

/// Owner of the current settings snapshot.
///
/// Components hold a [`watch::Receiver`] and read the snapshot at use time
/// rather than consulting shared mutable state on demand. Updates validate,
/// persist (when a backing path is set), and broadcast in one step.
#[derive(Debug)]
pub struct SettingsHandle {
    tx: watch::Sender<BeaconSettings>,
    path: Option<PathBuf>,
}

impl SettingsHandle {
    /// Create a handle around in-memory settings with no backing file.
    #[must_use]
    pub fn new(settings: BeaconSettings) -> Self {
        let (tx, _) = watch::channel(settings);
        Self { tx, path: None }
    }

    /// Load settings from `path` (or defaults when missing) and keep the
    /// path for persisting later updates.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or is invalid.
    pub fn open(path: PathBuf) -> Result<Self> {
        let settings = BeaconSettings::load_or_default(&path)?;
        let (tx, _) = watch::channel(settings);
        Self { tx, path: Some(path) }.persisted()
    }

    fn persisted(self) -> Result<Self> {
        if let Some(path) = &self.path {
            if !path.exists() {
                self.tx.borrow().save(path)?;
            }
        }
        Ok(self)
    }

    /// Subscribe to settings changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<BeaconSettings> {
        self.tx.subscribe()
    }

    /// The current settings snapshot.
    #[must_use]
    pub fn current(&self) -> BeaconSettings {
        self.tx.borrow().clone()
    }

    /// Apply a mutation to the settings, then validate, persist, and
    /// broadcast the new snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the mutated settings fail validation or cannot
    /// be persisted. On error the previous snapshot stays in effect.
    pub fn update(&self, mutate: impl FnOnce(&mut BeaconSettings)) -> Result<()> {
        let mut next = self.current();
        mutate(&mut next);
        next.validate()?;
        if let Some(path) = &self.path {
            next.save(path)?;
        }
        self.tx.send_replace(next);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let settings = BeaconSettings::default();
        assert_eq!(settings.timeout_ms, 10_000);
        assert_eq!(settings.update_interval_secs, 10);
        assert_eq!(settings.verification_amount_inside, 1);
        assert_eq!(settings.verification_amount_outside, 5);
        assert!(settings.use_timeout);
        settings.validate().unwrap();
    }

    #[test]
    fn validation_names_the_offending_field() {
        let settings = BeaconSettings {
            update_interval_secs: 0,
            ..BeaconSettings::default()
        };
        match settings.validate() {
            Err(BeaconError::ConfigValidation { field, .. }) => {
                assert_eq!(field, "update_interval_secs");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn zero_verification_thresholds_are_rejected() {
        let inside = BeaconSettings {
            verification_amount_inside: 0,
            ..BeaconSettings::default()
        };
        assert!(inside.validate().is_err());

        let outside = BeaconSettings {
            verification_amount_outside: 0,
            ..BeaconSettings::default()
        };
        assert!(outside.validate().is_err());
    }

    #[test]
    fn settings_roundtrip_through_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let settings = BeaconSettings {
            timeout_ms: 5000,
            verification_amount_outside: 3,
            ..BeaconSettings::default()
        };
        settings.save(&path).unwrap();

        let loaded = BeaconSettings::load_or_default(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = BeaconSettings::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(loaded, BeaconSettings::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "timeout_ms = 2500\n").unwrap();

        let loaded = BeaconSettings::load_or_default(&path).unwrap();
        assert_eq!(loaded.timeout_ms, 2500);
        assert_eq!(loaded.update_interval_secs, 10);
    }

    #[test]
    fn update_broadcasts_to_subscribers() {
        let handle = SettingsHandle::new(BeaconSettings::default());
        let rx = handle.subscribe();

        handle
            .update(|s| s.update_interval_secs = 30)
            .unwrap();

        assert_eq!(rx.borrow().update_interval_secs, 30);
    }

    #[test]
    fn invalid_update_is_rejected_and_keeps_previous_snapshot() {
        let handle = SettingsHandle::new(BeaconSettings::default());

        let result = handle.update(|s| s.timeout_ms = 0);
        assert!(result.is_err());
        assert_eq!(handle.current().timeout_ms, 10_000);
    }

    #[test]
    fn open_persists_defaults_for_a_fresh_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let handle = SettingsHandle::open(path.clone()).unwrap();
        assert!(path.exists());
        assert_eq!(handle.current(), BeaconSettings::default());

        handle.update(|s| s.timeout_ms = 4000).unwrap();
        let reopened = SettingsHandle::open(path).unwrap();
        assert_eq!(reopened.current().timeout_ms, 4000);
    }
}
