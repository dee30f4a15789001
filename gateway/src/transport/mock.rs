//! In-memory transport backend.
//!
//! Selected with `transport.backend = "mock"` for development without a
//! radio, and used by the test suite to script device behavior. Every call
//! is recorded in an operation log.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::error::{Error, Result};

use super::{DeviceNotification, DeviceTransport, DiscoveredDevice};

/// One recorded transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOperation {
    Connect(String),
    Disconnect(String),
    Discover,
    Write {
        address: String,
        characteristic: String,
        payload: Vec<u8>,
    },
    Subscribe {
        address: String,
        characteristic: String,
    },
    Unsubscribe {
        address: String,
        characteristic: String,
    },
}

#[derive(Default)]
struct MockState {
    connected: HashSet<String>,
    subscriptions: HashSet<(String, String)>,
    discoverable: Vec<DiscoveredDevice>,
    fail_connect: HashSet<String>,
    connect_delay: Option<Duration>,
    operations: Vec<MockOperation>,
}

/// Scriptable in-memory device transport.
pub struct MockTransport {
    notify_tx: mpsc::Sender<DeviceNotification>,
    state: Mutex<MockState>,
}

impl MockTransport {
    pub fn new(notify_tx: mpsc::Sender<DeviceNotification>) -> Self {
        Self {
            notify_tx,
            state: Mutex::new(MockState::default()),
        }
    }

    /// Add a device to the discovery results.
    pub async fn add_discoverable(&self, device: DiscoveredDevice) {
        self.state.lock().await.discoverable.push(device);
    }

    /// Make future connects to this address fail.
    pub async fn fail_connect(&self, address: &str) {
        self.state
            .lock()
            .await
            .fail_connect
            .insert(address.to_string());
    }

    /// Delay every future connect, simulating a slow device.
    pub async fn set_connect_delay(&self, delay: Duration) {
        self.state.lock().await.connect_delay = Some(delay);
    }

    /// Deliver one notification fragment as if the device pushed it.
    pub async fn push_notification(&self, address: &str, characteristic: &str, payload: &[u8]) {
        let fragment = DeviceNotification {
            address: address.to_string(),
            characteristic: characteristic.to_string(),
            payload: payload.to_vec(),
        };
        let _ = self.notify_tx.send(fragment).await;
    }

    /// Everything the transport was asked to do, in order.
    pub async fn operations(&self) -> Vec<MockOperation> {
        self.state.lock().await.operations.clone()
    }

    /// Number of connect calls recorded for one address.
    pub async fn connect_count(&self, address: &str) -> usize {
        self.state
            .lock()
            .await
            .operations
            .iter()
            .filter(|op| matches!(op, MockOperation::Connect(a) if a == address))
            .count()
    }

    /// Whether a subscription is currently active.
    pub async fn is_subscribed(&self, address: &str, characteristic: &str) -> bool {
        self.state
            .lock()
            .await
            .subscriptions
            .contains(&(address.to_string(), characteristic.to_string()))
    }
}

#[async_trait]
impl DeviceTransport for MockTransport {
    fn backend(&self) -> &'static str {
        "mock"
    }

    async fn connect(&self, address: &str) -> Result<()> {
        let delay = {
            let mut state = self.state.lock().await;
            state
                .operations
                .push(MockOperation::Connect(address.to_string()));
            if state.fail_connect.contains(address) {
                return Err(Error::Transport(format!(
                    "simulated connect failure for {address}"
                )));
            }
            state.connect_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.state.lock().await.connected.insert(address.to_string());
        Ok(())
    }

    async fn disconnect(&self, address: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .operations
            .push(MockOperation::Disconnect(address.to_string()));
        state.connected.remove(address);
        state.subscriptions.retain(|(a, _)| a != address);
        Ok(())
    }

    async fn discover(&self, _timeout: Duration) -> Result<Vec<DiscoveredDevice>> {
        let mut state = self.state.lock().await;
        state.operations.push(MockOperation::Discover);
        Ok(state.discoverable.clone())
    }

    async fn write_characteristic(
        &self,
        address: &str,
        characteristic: &str,
        payload: &[u8],
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.operations.push(MockOperation::Write {
            address: address.to_string(),
            characteristic: characteristic.to_string(),
            payload: payload.to_vec(),
        });
        if !state.connected.contains(address) {
            return Err(Error::NotConnected(address.to_string()));
        }
        Ok(())
    }

    async fn subscribe(&self, address: &str, characteristic: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.operations.push(MockOperation::Subscribe {
            address: address.to_string(),
            characteristic: characteristic.to_string(),
        });
        if !state.connected.contains(address) {
            return Err(Error::NotConnected(address.to_string()));
        }
        state
            .subscriptions
            .insert((address.to_string(), characteristic.to_string()));
        Ok(())
    }

    async fn unsubscribe(&self, address: &str, characteristic: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.operations.push(MockOperation::Unsubscribe {
            address: address.to_string(),
            characteristic: characteristic.to_string(),
        });
        state
            .subscriptions
            .remove(&(address.to_string(), characteristic.to_string()));
        Ok(())
    }
}
