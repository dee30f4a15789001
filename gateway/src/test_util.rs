//! Scriptable collaborators for the test suite.
//!
//! Compiled into the library so integration tests can reuse them alongside
//! the in-memory transport backend.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::channel::{ChannelCredentials, MessageChannel};
use crate::error::{Error, Result};

/// In-memory broker channel recording every publish.
#[derive(Default)]
pub struct MockChannel {
    connected: AtomicBool,
    fail_next_connects: AtomicU32,
    connect_calls: AtomicU32,
    publishes: Mutex<Vec<(String, String)>>,
}

impl MockChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` connect calls fail.
    pub fn fail_next_connects(&self, count: u32) {
        self.fail_next_connects.store(count, Ordering::SeqCst);
    }

    /// Force the session state, as if the broker dropped us.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn connect_calls(&self) -> u32 {
        self.connect_calls.load(Ordering::SeqCst)
    }

    /// Every `(topic, payload)` published so far, in order.
    pub async fn published(&self) -> Vec<(String, String)> {
        self.publishes.lock().await.clone()
    }

    /// Payloads published so far whose JSON `type` field matches.
    pub async fn published_of_kind(&self, kind: &str) -> Vec<String> {
        let needle = format!(r#""type":"{kind}""#);
        self.publishes
            .lock()
            .await
            .iter()
            .filter(|(_, payload)| payload.contains(&needle))
            .map(|(_, payload)| payload.clone())
            .collect()
    }
}

#[async_trait]
impl MessageChannel for MockChannel {
    async fn connect(&self, _credentials: &ChannelCredentials) -> Result<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.fail_next_connects.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next_connects
                .store(remaining - 1, Ordering::SeqCst);
            return Err(Error::Channel("scripted connect failure".to_string()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &str) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(Error::Channel("not connected".to_string()));
        }
        self.publishes
            .lock()
            .await
            .push((topic.to_string(), payload.to_string()));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
