//! Device session bookkeeping.

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use bluebridge_common::SensorStatus;

use crate::error::Result;
use crate::transport::DeviceTransport;

/// State tracked for one known device.
#[derive(Debug, Clone)]
pub struct DeviceSession {
    pub address: String,
    pub connected: bool,
    /// Characteristic UUID -> subscription handle.
    subscriptions: HashMap<String, Uuid>,
}

impl DeviceSession {
    fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            connected: false,
            subscriptions: HashMap::new(),
        }
    }
}

/// Exclusive owner of the address -> session map.
///
/// Mutating calls drive the transport first and update the bookkeeping only
/// on success, so the map always reflects what actually happened on the
/// radio. Every operation is idempotent.
pub struct DeviceSessionManager {
    transport: Arc<dyn DeviceTransport>,
    sessions: HashMap<String, DeviceSession>,
}

impl DeviceSessionManager {
    pub fn new(transport: Arc<dyn DeviceTransport>) -> Self {
        Self {
            transport,
            sessions: HashMap::new(),
        }
    }

    /// Connect a device. An already-connected device is a no-op success
    /// with no transport call.
    pub async fn connect(&mut self, address: &str) -> Result<()> {
        if self.is_paired(address) {
            tracing::debug!("Device {} already connected", address);
            return Ok(());
        }
        self.transport.connect(address).await?;
        let session = self
            .sessions
            .entry(address.to_string())
            .or_insert_with(|| DeviceSession::new(address));
        session.connected = true;
        Ok(())
    }

    /// Disconnect a device. Unknown or already-disconnected devices are a
    /// no-op success with no transport call.
    pub async fn disconnect(&mut self, address: &str) -> Result<()> {
        if !self.is_paired(address) {
            tracing::debug!("Device {} not connected, nothing to do", address);
            return Ok(());
        }
        self.transport.disconnect(address).await?;
        if let Some(session) = self.sessions.get_mut(address) {
            session.connected = false;
            session.subscriptions.clear();
        }
        Ok(())
    }

    /// Subscribe to a characteristic. Re-subscribing an active subscription
    /// returns the existing handle without touching the transport.
    pub async fn subscribe(&mut self, address: &str, characteristic: &str) -> Result<Uuid> {
        let existing = self
            .sessions
            .get(address)
            .and_then(|s| s.subscriptions.get(characteristic).copied());
        if let Some(handle) = existing {
            return Ok(handle);
        }
        self.transport.subscribe(address, characteristic).await?;
        let handle = Uuid::new_v4();
        let session = self
            .sessions
            .entry(address.to_string())
            .or_insert_with(|| DeviceSession::new(address));
        session
            .subscriptions
            .insert(characteristic.to_string(), handle);
        Ok(handle)
    }

    /// Drop a subscription. Unknown subscriptions are a no-op success.
    pub async fn unsubscribe(&mut self, address: &str, characteristic: &str) -> Result<()> {
        let known = self
            .sessions
            .get(address)
            .map(|s| s.subscriptions.contains_key(characteristic))
            .unwrap_or(false);
        if !known {
            return Ok(());
        }
        self.transport.unsubscribe(address, characteristic).await?;
        if let Some(session) = self.sessions.get_mut(address) {
            session.subscriptions.remove(characteristic);
        }
        Ok(())
    }

    pub fn is_paired(&self, address: &str) -> bool {
        self.sessions
            .get(address)
            .map(|s| s.connected)
            .unwrap_or(false)
    }

    /// Characteristics currently subscribed for a device.
    pub fn subscribed_characteristics(&self, address: &str) -> Vec<String> {
        self.sessions
            .get(address)
            .map(|s| s.subscriptions.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Pairing status of every tracked device, ordered by address.
    pub fn snapshot(&self) -> Vec<SensorStatus> {
        let mut statuses: Vec<SensorStatus> = self
            .sessions
            .values()
            .map(|session| SensorStatus {
                address: session.address.clone(),
                is_paired: session.connected,
            })
            .collect();
        statuses.sort_by(|a, b| a.address.cmp(&b.address));
        statuses
    }
}
