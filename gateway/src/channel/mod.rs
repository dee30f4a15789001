//! Broker channel abstraction.
//!
//! The gateway talks to the cloud pub/sub broker through [`MessageChannel`]
//! so the state machine can be exercised against an in-memory channel in
//! tests. The production implementation is the WebSocket channel in [`ws`].

mod ws;

pub use ws::WsChannel;

use async_trait::async_trait;

use crate::error::Result;

/// Username/password pair issued by the provisioning service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelCredentials {
    pub username: String,
    pub password: String,
}

/// One payload delivered on a subscribed topic.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: String,
}

/// Connection to the cloud pub/sub broker.
///
/// Implementations deliver inbound control payloads through the mpsc sender
/// handed to them at construction; the gateway main loop is the sole
/// consumer.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Open a credentialed session and subscribe to the control topic.
    async fn connect(&self, credentials: &ChannelCredentials) -> Result<()>;

    /// Close the session. Idempotent.
    async fn disconnect(&self) -> Result<()>;

    /// Publish one payload to a topic.
    async fn publish(&self, topic: &str, payload: &str) -> Result<()>;

    /// Whether the session is currently believed to be up.
    fn is_connected(&self) -> bool;
}
