//! Control-plane messages sent from the cloud to a gateway.
//!
//! Every control payload is a JSON object with a `type` field that selects
//! the operation. Unknown types and malformed payloads are dropped at the
//! gateway's router boundary, so additions here are backward compatible.

use serde::{Deserialize, Serialize};

/// One remote instruction addressed to a gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlMessage {
    /// Connect a sensor and arm its notification sources.
    Pair(PairRequest),
    /// Drop every subscription for a sensor, then disconnect it.
    Unpair { address: String },
    /// Discover nearby sensors.
    Scan,
    /// Trigger and collect one measurement from a paired sensor.
    Read { address: String },
    /// Pair every listed sensor that is not already paired.
    SensorList { sensors: Vec<SensorEntry> },
}

/// Pairing target plus its optional per-device setup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairRequest {
    pub address: String,
    #[serde(default)]
    pub config: Option<PairConfig>,
}

/// Per-device setup applied right after a successful connect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairConfig {
    /// Characteristic UUIDs to subscribe to for notifications.
    #[serde(default)]
    pub notify_characteristics: Vec<String>,
    /// Writes issued in order after the subscriptions are armed.
    #[serde(default)]
    pub initial_commands: Vec<InitialCommand>,
}

/// A single setup write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialCommand {
    pub characteristic: String,
    /// Hex-encoded bytes to write.
    pub data: String,
}

/// One entry of a fleet sensor list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorEntry {
    pub address: String,
    #[serde(default)]
    pub config: Option<PairConfig>,
}

impl ControlMessage {
    /// Pair instruction with no per-device setup.
    pub fn pair(address: impl Into<String>) -> Self {
        ControlMessage::Pair(PairRequest {
            address: address.into(),
            config: None,
        })
    }

    /// Unpair instruction for one address.
    pub fn unpair(address: impl Into<String>) -> Self {
        ControlMessage::Unpair {
            address: address.into(),
        }
    }

    /// Read instruction for one address.
    pub fn read(address: impl Into<String>) -> Self {
        ControlMessage::Read {
            address: address.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_message_serialization() {
        let msg = ControlMessage::pair("AA:BB:CC:DD:EE:FF");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"pair""#));
        assert!(json.contains(r#""address":"AA:BB:CC:DD:EE:FF""#));
    }

    #[test]
    fn test_scan_has_no_payload() {
        let json = serde_json::to_string(&ControlMessage::Scan).unwrap();
        assert_eq!(json, r#"{"type":"scan"}"#);
    }

    #[test]
    fn test_pair_with_config_deserialization() {
        let json = r#"{
            "type": "pair",
            "address": "AA:BB:CC:DD:EE:FF",
            "config": {
                "notify_characteristics": ["87654321-4321-8765-4321-56789abcdef0"],
                "initial_commands": [
                    {"characteristic": "87654321-1234-f393-e0a9-e50e24dcca9e", "data": "0102"}
                ]
            }
        }"#;
        let msg: ControlMessage = serde_json::from_str(json).unwrap();
        match msg {
            ControlMessage::Pair(req) => {
                let config = req.config.unwrap();
                assert_eq!(config.notify_characteristics.len(), 1);
                assert_eq!(config.initial_commands[0].data, "0102");
            }
            other => panic!("expected pair, got {:?}", other),
        }
    }

    #[test]
    fn test_pair_config_is_optional() {
        let json = r#"{"type":"pair","address":"AA:BB:CC:DD:EE:FF"}"#;
        let msg: ControlMessage = serde_json::from_str(json).unwrap();
        match msg {
            ControlMessage::Pair(req) => assert!(req.config.is_none()),
            other => panic!("expected pair, got {:?}", other),
        }
    }

    #[test]
    fn test_sensor_list_deserialization() {
        let json = r#"{
            "type": "sensorlist",
            "sensors": [
                {"address": "AA:AA:AA:AA:AA:AA"},
                {"address": "BB:BB:BB:BB:BB:BB"}
            ]
        }"#;
        let msg: ControlMessage = serde_json::from_str(json).unwrap();
        match msg {
            ControlMessage::SensorList { sensors } => assert_eq!(sensors.len(), 2),
            other => panic!("expected sensorlist, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let json = r#"{"type":"reboot"}"#;
        assert!(serde_json::from_str::<ControlMessage>(json).is_err());
    }
}
