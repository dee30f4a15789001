//! WebSocket implementation of the broker channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use bluebridge_common::{BrokerFrame, ClientFrame};

use crate::config::BrokerSection;
use crate::error::{Error, Result};

use super::{ChannelCredentials, InboundMessage, MessageChannel};

/// Broker channel over WebSocket.
///
/// `connect` opens one session: credentialed `Connect`, `ConnAck` wait with
/// timeout, control-topic `Subscribe`, then a background task that pumps
/// outbound frames, forwards inbound publishes into the control queue, and
/// keeps the session alive with pings. Reconnect policy stays with the
/// caller.
pub struct WsChannel {
    url: String,
    control_topic: String,
    keepalive: Duration,
    connect_timeout: Duration,
    control_tx: mpsc::Sender<InboundMessage>,
    connected: Arc<AtomicBool>,
    outbound: Mutex<Option<mpsc::Sender<ClientFrame>>>,
    session: Mutex<Option<JoinHandle<()>>>,
}

impl WsChannel {
    pub fn new(
        broker: &BrokerSection,
        control_topic: String,
        control_tx: mpsc::Sender<InboundMessage>,
    ) -> Self {
        Self {
            url: broker.url.clone(),
            control_topic,
            keepalive: Duration::from_secs(broker.keepalive_secs),
            connect_timeout: Duration::from_secs(broker.connect_timeout_secs),
            control_tx,
            connected: Arc::new(AtomicBool::new(false)),
            outbound: Mutex::new(None),
            session: Mutex::new(None),
        }
    }

    async fn drop_stale_session(&self) {
        if let Some(handle) = self.session.lock().await.take() {
            handle.abort();
        }
        self.outbound.lock().await.take();
        self.connected.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl MessageChannel for WsChannel {
    async fn connect(&self, credentials: &ChannelCredentials) -> Result<()> {
        self.drop_stale_session().await;

        let (ws_stream, _) = timeout(self.connect_timeout, connect_async(&self.url))
            .await
            .map_err(|_| Error::Channel(format!("connect timeout to {}", self.url)))?
            .map_err(|e| Error::Channel(format!("connect to {} failed: {e}", self.url)))?;
        let (mut write, mut read) = ws_stream.split();

        let frame = ClientFrame::Connect {
            username: credentials.username.clone(),
            password: credentials.password.clone(),
            keep_alive_secs: self.keepalive.as_secs(),
        };
        let json = serde_json::to_string(&frame)?;
        write
            .send(Message::Text(json))
            .await
            .map_err(|e| Error::Channel(format!("connect frame send failed: {e}")))?;

        // Wait for the connection ack with timeout
        match timeout(self.connect_timeout, read.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => {
                let response: BrokerFrame = serde_json::from_str(&text)?;
                match response {
                    BrokerFrame::ConnAck { session_id } => {
                        tracing::info!("Broker session established: {}", session_id);
                    }
                    BrokerFrame::Error { code, message } => {
                        return Err(Error::Channel(format!(
                            "broker rejected connect: {code} - {message}"
                        )));
                    }
                    _ => {
                        return Err(Error::Channel(
                            "unexpected response to connect".to_string(),
                        ));
                    }
                }
            }
            Ok(Some(Ok(_))) => {
                return Err(Error::Channel(
                    "expected text frame for connection ack".to_string(),
                ));
            }
            Ok(Some(Err(e))) => {
                return Err(Error::Channel(format!(
                    "websocket error during connect: {e}"
                )));
            }
            Ok(None) => {
                return Err(Error::Channel(
                    "connection closed during connect".to_string(),
                ));
            }
            Err(_) => {
                return Err(Error::Channel("connection ack timeout".to_string()));
            }
        }

        // Ask for control deliveries; the ack is logged by the session loop
        let subscribe = serde_json::to_string(&ClientFrame::Subscribe {
            topic: self.control_topic.clone(),
        })?;
        write
            .send(Message::Text(subscribe))
            .await
            .map_err(|e| Error::Channel(format!("subscribe send failed: {e}")))?;

        let (tx, rx) = mpsc::channel::<ClientFrame>(32);
        let connected = self.connected.clone();
        connected.store(true, Ordering::SeqCst);
        let control_tx = self.control_tx.clone();
        let keepalive = self.keepalive;
        let handle = tokio::spawn(async move {
            if let Err(e) = session_loop(&mut write, &mut read, rx, keepalive, control_tx).await {
                tracing::warn!("Broker session ended: {}", e);
            }
            connected.store(false, Ordering::SeqCst);
        });

        *self.outbound.lock().await = Some(tx);
        *self.session.lock().await = Some(handle);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        if let Some(tx) = self.outbound.lock().await.take() {
            // The session loop sends the close frame and exits on its own
            let _ = tx.send(ClientFrame::Disconnect).await;
        }
        if let Some(mut handle) = self.session.lock().await.take() {
            if timeout(Duration::from_secs(1), &mut handle).await.is_err() {
                handle.abort();
            }
        }
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &str) -> Result<()> {
        let outbound = self.outbound.lock().await.clone();
        let tx = outbound.ok_or_else(|| Error::Channel("not connected".to_string()))?;
        tx.send(ClientFrame::publish(topic, payload))
            .await
            .map_err(|_| Error::Channel("session task gone".to_string()))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

async fn session_loop<S, R>(
    write: &mut S,
    read: &mut R,
    mut rx: mpsc::Receiver<ClientFrame>,
    keepalive: Duration,
    control_tx: mpsc::Sender<InboundMessage>,
) -> Result<()>
where
    S: SinkExt<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
    R: StreamExt<Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>
        + Unpin,
{
    let mut ping = interval(keepalive);
    // The first interval tick completes immediately
    ping.tick().await;

    loop {
        tokio::select! {
            // Outbound frames from the gateway loop
            Some(frame) = rx.recv() => {
                let closing = matches!(frame, ClientFrame::Disconnect);
                let json = serde_json::to_string(&frame)?;
                write
                    .send(Message::Text(json))
                    .await
                    .map_err(|e| Error::Channel(format!("send failed: {e}")))?;
                if closing {
                    tracing::info!("Sent close frame to broker");
                    return Ok(());
                }
            }

            // Application-level keepalive
            _ = ping.tick() => {
                let json = serde_json::to_string(&ClientFrame::Ping)?;
                write
                    .send(Message::Text(json))
                    .await
                    .map_err(|e| Error::Channel(format!("ping failed: {e}")))?;
            }

            // Inbound frames from the broker
            Some(result) = read.next() => {
                match result {
                    Ok(Message::Text(text)) => {
                        handle_broker_frame(&text, &control_tx).await;
                    }
                    Ok(Message::Ping(data)) => {
                        write
                            .send(Message::Pong(data))
                            .await
                            .map_err(|e| Error::Channel(format!("pong failed: {e}")))?;
                    }
                    Ok(Message::Close(_)) => {
                        tracing::info!("Broker sent close frame");
                        return Ok(());
                    }
                    Ok(_) => {} // Ignore other message types
                    Err(e) => {
                        return Err(Error::Channel(format!("websocket error: {e}")));
                    }
                }
            }

            else => {
                return Ok(());
            }
        }
    }
}

async fn handle_broker_frame(text: &str, control_tx: &mpsc::Sender<InboundMessage>) {
    let frame: BrokerFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!("Dropping unparseable broker frame: {}", e);
            return;
        }
    };

    match frame {
        BrokerFrame::Publish { topic, payload } => {
            if control_tx
                .send(InboundMessage { topic, payload })
                .await
                .is_err()
            {
                tracing::warn!("Control queue closed, dropping delivery");
            }
        }
        BrokerFrame::SubAck { topic } => {
            tracing::info!("Subscribed to {}", topic);
        }
        BrokerFrame::Pong => {
            tracing::debug!("Broker pong");
        }
        BrokerFrame::ConnAck { session_id } => {
            tracing::warn!(
                "Unexpected conn_ack for session {} after connect",
                session_id
            );
        }
        BrokerFrame::Error { code, message } => {
            tracing::error!("Broker error: {} - {}", code, message);
        }
    }
}
