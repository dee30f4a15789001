//! Telemetry envelopes published from a gateway to the cloud.
//!
//! The envelope is a flat JSON object; `type` selects the payload shape.
//! Heartbeats additionally carry a `sensorlist` array describing every
//! device the gateway currently tracks.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// What a telemetry envelope announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TelemetryKind {
    /// One collected sensor read-out.
    Measurement,
    /// Periodic liveness report with the tracked-sensor snapshot.
    Heartbeat,
    /// First-connect request for the fleet sensor list.
    Getsensorlist,
}

impl std::fmt::Display for TelemetryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TelemetryKind::Measurement => write!(f, "measurement"),
            TelemetryKind::Heartbeat => write!(f, "heartbeat"),
            TelemetryKind::Getsensorlist => write!(f, "getsensorlist"),
        }
    }
}

/// Pairing status of one tracked sensor, as reported in heartbeats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorStatus {
    pub address: String,
    #[serde(rename = "ispaired")]
    pub is_paired: bool,
}

/// One outbound telemetry message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryEnvelope {
    pub gateway_mac: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_mac: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Unix seconds.
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub kind: TelemetryKind,
    #[serde(
        default,
        rename = "sensorlist",
        skip_serializing_if = "Option::is_none"
    )]
    pub sensor_list: Option<Vec<SensorStatus>>,
}

impl TelemetryEnvelope {
    /// One collected measurement for a single sensor.
    pub fn measurement(
        gateway_mac: impl Into<String>,
        sensor_mac: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        TelemetryEnvelope {
            gateway_mac: gateway_mac.into(),
            sensor_mac: Some(sensor_mac.into()),
            data: Some(data.into()),
            timestamp: Utc::now().timestamp(),
            kind: TelemetryKind::Measurement,
            sensor_list: None,
        }
    }

    /// Periodic heartbeat carrying the tracked-sensor snapshot.
    pub fn heartbeat(gateway_mac: impl Into<String>, sensors: Vec<SensorStatus>) -> Self {
        TelemetryEnvelope {
            gateway_mac: gateway_mac.into(),
            sensor_mac: None,
            data: None,
            timestamp: Utc::now().timestamp(),
            kind: TelemetryKind::Heartbeat,
            sensor_list: Some(sensors),
        }
    }

    /// One-shot first-connect request for the fleet sensor list.
    pub fn sensor_list_request(gateway_mac: impl Into<String>) -> Self {
        TelemetryEnvelope {
            gateway_mac: gateway_mac.into(),
            sensor_mac: None,
            data: None,
            timestamp: Utc::now().timestamp(),
            kind: TelemetryKind::Getsensorlist,
            sensor_list: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measurement_serialization() {
        let env = TelemetryEnvelope::measurement("B827EBB63381", "AA:BB:CC:DD:EE:FF", "01,02,ff");
        let json = serde_json::to_string(&env).unwrap();
        assert!(json.contains(r#""type":"measurement""#));
        assert!(json.contains(r#""gatewayMac":"B827EBB63381""#));
        assert!(json.contains(r#""sensorMac":"AA:BB:CC:DD:EE:FF""#));
        assert!(json.contains(r#""data":"01,02,ff""#));
        assert!(!json.contains("sensorlist"));
    }

    #[test]
    fn test_heartbeat_carries_sensor_statuses() {
        let env = TelemetryEnvelope::heartbeat(
            "B827EBB63381",
            vec![SensorStatus {
                address: "AA:BB:CC:DD:EE:FF".to_string(),
                is_paired: true,
            }],
        );
        let json = serde_json::to_string(&env).unwrap();
        assert!(json.contains(r#""type":"heartbeat""#));
        assert!(json.contains(r#""sensorlist":[{"address":"AA:BB:CC:DD:EE:FF","ispaired":true}]"#));
    }

    #[test]
    fn test_sensor_list_request_serialization() {
        let env = TelemetryEnvelope::sensor_list_request("B827EBB63381");
        let json = serde_json::to_string(&env).unwrap();
        assert!(json.contains(r#""type":"getsensorlist""#));
        assert!(!json.contains("sensorMac"));
        assert!(env.timestamp > 0);
    }

    #[test]
    fn test_envelope_round_trip() {
        let env = TelemetryEnvelope::heartbeat("B827EBB63381", vec![]);
        let json = serde_json::to_string(&env).unwrap();
        let back: TelemetryEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind, TelemetryKind::Heartbeat);
        assert_eq!(back.sensor_list, Some(vec![]));
    }
}
