//! Device transport abstraction layer.
//!
//! This module defines the `DeviceTransport` trait that abstracts the
//! short-range radio (real BLE via btleplug, or the in-memory mock backend)
//! behind a common interface.

pub mod ble;
pub mod mock;

pub use ble::BleTransport;
pub use mock::{MockOperation, MockTransport};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::TransportSection;
use crate::error::{Error, Result};

/// One notification fragment pushed by a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceNotification {
    pub address: String,
    pub characteristic: String,
    pub payload: Vec<u8>,
}

/// A device seen during discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub address: String,
    /// Advertised name, or "Unknown" when the device does not announce one.
    pub name: String,
    pub rssi: Option<i16>,
}

/// Primary trait for device transports.
///
/// Notification fragments are delivered through the mpsc sender handed to
/// the implementation at construction, in arrival order. All methods are
/// safe to call for addresses the transport has never seen.
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    /// Unique identifier for this backend ("ble", "mock").
    fn backend(&self) -> &'static str;

    /// Establish a connection to one device.
    async fn connect(&self, address: &str) -> Result<()>;

    /// Tear down the connection to one device. Unknown devices are a no-op.
    async fn disconnect(&self, address: &str) -> Result<()>;

    /// Discover nearby devices within the given window.
    async fn discover(&self, timeout: Duration) -> Result<Vec<DiscoveredDevice>>;

    /// Write bytes to a characteristic of a connected device.
    async fn write_characteristic(
        &self,
        address: &str,
        characteristic: &str,
        payload: &[u8],
    ) -> Result<()>;

    /// Start notification delivery for a characteristic.
    async fn subscribe(&self, address: &str, characteristic: &str) -> Result<()>;

    /// Stop notification delivery for a characteristic. Unknown devices are
    /// a no-op.
    async fn unsubscribe(&self, address: &str, characteristic: &str) -> Result<()>;
}

/// Build the transport backend selected in configuration.
pub async fn build_transport(
    section: &TransportSection,
    notify_tx: mpsc::Sender<DeviceNotification>,
) -> Result<Arc<dyn DeviceTransport>> {
    match section.backend.as_str() {
        "ble" => Ok(Arc::new(BleTransport::new(notify_tx).await?)),
        "mock" => Ok(Arc::new(MockTransport::new(notify_tx))),
        other => Err(Error::UnknownBackend(other.to_string())),
    }
}
