//! WebSocket frames for gateway-broker communication.
//!
//! The broker channel carries JSON-encoded frames over WebSocket. Each frame
//! has a `type` field that determines its structure.
//!
//! # Connection Flow
//!
//! 1. Gateway opens the WebSocket to the broker endpoint
//! 2. Gateway sends `Connect` with its channel credentials and keepalive
//! 3. Broker responds with `ConnAck` on success or `Error` on failure
//! 4. Gateway sends `Subscribe` for its control topic, broker answers `SubAck`
//! 5. Either side publishes with `Publish { topic, payload }`
//! 6. Gateway sends `Ping` at the keepalive interval, broker answers `Pong`
//!
//! Payloads are opaque JSON text; the gateway parses control payloads at its
//! router boundary and serializes telemetry envelopes before publishing.

use serde::{Deserialize, Serialize};

/// Frames sent from the gateway to the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Credentialed session open.
    Connect {
        username: String,
        password: String,
        keep_alive_secs: u64,
    },
    /// Ask for deliveries on a topic.
    Subscribe { topic: String },
    /// Publish one payload to a topic.
    Publish { topic: String, payload: String },
    /// Application-level keepalive.
    Ping,
    /// Orderly session close.
    Disconnect,
}

/// Frames sent from the broker to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BrokerFrame {
    /// Acknowledgment of a successful `Connect`.
    ConnAck { session_id: String },
    /// Acknowledgment of a `Subscribe`.
    SubAck { topic: String },
    /// One delivery on a subscribed topic.
    Publish { topic: String, payload: String },
    /// Answer to a `Ping`.
    Pong,
    /// Broker-side failure.
    Error { code: String, message: String },
}

impl ClientFrame {
    /// Publish frame for an already-serialized payload.
    pub fn publish(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        ClientFrame::Publish {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_frame_serialization() {
        let frame = ClientFrame::Connect {
            username: "B827EBB63381".to_string(),
            password: "s3cret".to_string(),
            keep_alive_secs: 60,
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains(r#""type":"connect""#));
        assert!(json.contains(r#""keep_alive_secs":60"#));
    }

    #[test]
    fn test_publish_frame_serialization() {
        let frame = ClientFrame::publish("gateway/telemetry", r#"{"type":"heartbeat"}"#);
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains(r#""type":"publish""#));
        assert!(json.contains(r#""topic":"gateway/telemetry""#));
    }

    #[test]
    fn test_broker_frame_deserialization() {
        let json = r#"{"type":"conn_ack","session_id":"sess-1"}"#;
        let frame: BrokerFrame = serde_json::from_str(json).unwrap();
        match frame {
            BrokerFrame::ConnAck { session_id } => assert_eq!(session_id, "sess-1"),
            other => panic!("expected conn_ack, got {:?}", other),
        }
    }

    #[test]
    fn test_broker_publish_round_trip() {
        let frame = BrokerFrame::Publish {
            topic: "gateway/B827EBB63381/control".to_string(),
            payload: r#"{"type":"scan"}"#.to_string(),
        };
        let json = serde_json::to_string(&frame).unwrap();
        let back: BrokerFrame = serde_json::from_str(&json).unwrap();
        match back {
            BrokerFrame::Publish { topic, payload } => {
                assert_eq!(topic, "gateway/B827EBB63381/control");
                assert_eq!(payload, r#"{"type":"scan"}"#);
            }
            other => panic!("expected publish, got {:?}", other),
        }
    }
}
