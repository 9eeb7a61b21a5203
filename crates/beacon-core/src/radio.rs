//! Radio discovery abstraction and the BlueZ-backed implementation.
//!
//! The radio is a single shared resource: one outstanding discovery or
//! connection operation at a time. Nothing here enforces that with a lock;
//! callers guarantee it by strict sequencing (the scheduler loop is the
//! only task issuing radio operations).

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Advertisement, BeaconIdentity};

/// Discovery primitive the core runs against.
///
/// Implemented by [`BlueZRadio`] on the hub and by the mock in tests.
#[async_trait]
pub trait RadioDiscovery: Send + Sync {
    /// Run one discovery pass for the given window and return a snapshot
    /// of every advertisement observed.
    ///
    /// The window elapsing is the normal end of a pass, not an error.
    async fn discover(&self, timeout: Duration) -> Result<Vec<Advertisement>>;

    /// Look for a single identity, returning as soon as it is seen.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BeaconError::DeviceNotFound`] if the identity was
    /// not seen within the window.
    async fn find(&self, identity: &BeaconIdentity, timeout: Duration) -> Result<Advertisement>;

    /// Open a connection to a previously found advertisement.
    async fn connect(&self, advertisement: &Advertisement) -> Result<Box<dyn Peripheral>>;
}

/// An open connection to a device.
#[async_trait]
pub trait Peripheral: Send + Sync {
    /// Whether the connection is still established.
    async fn is_connected(&self) -> bool;

    /// Re-read the service and capability values over the connection.
    async fn read_services(&self) -> Result<()>;

    /// Release the connection. Callers invoke this on every exit path
    /// where a connection was established.
    async fn disconnect(&self) -> Result<()>;
}

#[cfg(feature = "bluetooth")]
pub use bluez::{BlueZPeripheral, BlueZRadio};

#[cfg(feature = "bluetooth")]
mod bluez {
    use std::collections::HashMap;

    use bluer::{Adapter, AdapterEvent, Address};
    use chrono::Utc;
    use futures::{pin_mut, StreamExt};
    use tracing::{debug, trace};

    use super::*;
    use crate::error::BeaconError;

    /// BlueZ-backed radio via the system `bluetoothd`.
    pub struct BlueZRadio {
        adapter: Adapter,
    }

    impl BlueZRadio {
        /// Connect to the session bus and take the default adapter.
        ///
        /// # Errors
        ///
        /// Returns [`BeaconError::AdapterNotFound`] when no adapter exists
        /// and [`BeaconError::AdapterPoweredOff`] when it is powered down.
        pub async fn new() -> Result<Self> {
            let session = bluer::Session::new()
                .await
                .map_err(|e| BeaconError::DiscoveryFailed(e.to_string()))?;
            let adapter = session
                .default_adapter()
                .await
                .map_err(|_| BeaconError::AdapterNotFound)?;

            let powered = adapter
                .is_powered()
                .await
                .map_err(|e| BeaconError::DiscoveryFailed(e.to_string()))?;
            if !powered {
                return Err(BeaconError::AdapterPoweredOff);
            }

            debug!(adapter = %adapter.name(), "bluetooth adapter ready");
            Ok(Self { adapter })
        }

        /// Read the current advertisement properties of a discovered device.
        ///
        /// Devices that vanish between the event and the property reads are
        /// skipped; the next cycle will see them again if they are real.
        async fn snapshot(&self, address: Address) -> Option<Advertisement> {
            let device = self.adapter.device(address).ok()?;
            let identity = BeaconIdentity::parse(&address.to_string()).ok()?;

            let local_name = device.name().await.ok().flatten();
            let manufacturer_data = device
                .manufacturer_data()
                .await
                .ok()
                .flatten()
                .unwrap_or_default();
            let rssi = device.rssi().await.ok().flatten();

            Some(Advertisement {
                identity,
                local_name,
                manufacturer_data,
                rssi,
                first_seen_at: Utc::now(),
            })
        }

        fn address_of(identity: &BeaconIdentity) -> Result<Address> {
            identity
                .as_str()
                .parse()
                .map_err(|_| BeaconError::InvalidIdentity(identity.to_string()))
        }
    }

    #[async_trait]
    impl RadioDiscovery for BlueZRadio {
        async fn discover(&self, timeout: Duration) -> Result<Vec<Advertisement>> {
            let events = self
                .adapter
                .discover_devices()
                .await
                .map_err(|e| BeaconError::DiscoveryFailed(e.to_string()))?;
            pin_mut!(events);

            let deadline = tokio::time::Instant::now() + timeout;
            let mut seen: HashMap<Address, Advertisement> = HashMap::new();

            loop {
                match tokio::time::timeout_at(deadline, events.next()).await {
                    Ok(Some(AdapterEvent::DeviceAdded(address))) => {
                        if let Some(advertisement) = self.snapshot(address).await {
                            trace!(%address, "advertisement observed");
                            seen.insert(address, advertisement);
                        }
                    }
                    Ok(Some(_)) => {}
                    // Stream ended or window elapsed: the pass is complete.
                    Ok(None) | Err(_) => break,
                }
            }

            Ok(seen.into_values().collect())
        }

        async fn find(
            &self,
            identity: &BeaconIdentity,
            timeout: Duration,
        ) -> Result<Advertisement> {
            let target = Self::address_of(identity)?;

            let events = self
                .adapter
                .discover_devices()
                .await
                .map_err(|e| BeaconError::DiscoveryFailed(e.to_string()))?;
            pin_mut!(events);

            let deadline = tokio::time::Instant::now() + timeout;
            loop {
                match tokio::time::timeout_at(deadline, events.next()).await {
                    Ok(Some(AdapterEvent::DeviceAdded(address))) if address == target => {
                        if let Some(advertisement) = self.snapshot(address).await {
                            return Ok(advertisement);
                        }
                    }
                    Ok(Some(_)) => {}
                    Ok(None) | Err(_) => {
                        return Err(BeaconError::DeviceNotFound {
                            identity: identity.to_string(),
                        });
                    }
                }
            }
        }

        async fn connect(&self, advertisement: &Advertisement) -> Result<Box<dyn Peripheral>> {
            let address = Self::address_of(&advertisement.identity)?;
            let device =
                self.adapter
                    .device(address)
                    .map_err(|e| BeaconError::ConnectFailed {
                        identity: advertisement.identity.to_string(),
                        message: e.to_string(),
                    })?;

            device.connect().await.map_err(|e| BeaconError::ConnectFailed {
                identity: advertisement.identity.to_string(),
                message: e.to_string(),
            })?;

            Ok(Box::new(BlueZPeripheral {
                identity: advertisement.identity.clone(),
                device,
            }))
        }
    }

    /// An open BlueZ connection.
    pub struct BlueZPeripheral {
        identity: BeaconIdentity,
        device: bluer::Device,
    }

    #[async_trait]
    impl Peripheral for BlueZPeripheral {
        async fn is_connected(&self) -> bool {
            self.device.is_connected().await.unwrap_or(false)
        }

        async fn read_services(&self) -> Result<()> {
            let services =
                self.device
                    .services()
                    .await
                    .map_err(|e| BeaconError::ReadFailed {
                        identity: self.identity.to_string(),
                        message: e.to_string(),
                    })?;
            trace!(identity = %self.identity, services = services.len(), "services read");
            Ok(())
        }

        async fn disconnect(&self) -> Result<()> {
            self.device
                .disconnect()
                .await
                .map_err(|e| BeaconError::ConnectFailed {
                    identity: self.identity.to_string(),
                    message: e.to_string(),
                })
        }
    }
}
