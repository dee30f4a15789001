//! Parse boundary between the broker channel and the dispatcher.

use std::time::Duration;

use bluebridge_common::{
    ControlMessage, InitialCommand, SensorEntry, SensorStatus, TelemetryEnvelope,
};

/// A parsed, fully-typed instruction ready for execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Pair {
        address: String,
        notify_characteristics: Vec<String>,
        initial_commands: Vec<InitialCommand>,
    },
    Unpair {
        address: String,
    },
    Scan {
        timeout: Duration,
    },
    Read {
        address: String,
    },
    SensorList {
        sensors: Vec<SensorEntry>,
    },
}

impl Instruction {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Instruction::Pair { .. } => "pair",
            Instruction::Unpair { .. } => "unpair",
            Instruction::Scan { .. } => "scan",
            Instruction::Read { .. } => "read",
            Instruction::SensorList { .. } => "sensorlist",
        }
    }
}

/// Translates between wire payloads and the gateway's internal types.
///
/// Inbound payloads either become a typed [`Instruction`] or are dropped
/// with a warning; they never fault the loop. Outbound results are stamped
/// into telemetry envelopes carrying this gateway's MAC.
pub struct MessageRouter {
    gateway_mac: String,
    scan_timeout: Duration,
}

impl MessageRouter {
    pub fn new(gateway_mac: impl Into<String>, scan_timeout: Duration) -> Self {
        Self {
            gateway_mac: gateway_mac.into(),
            scan_timeout,
        }
    }

    /// Parse one inbound control payload.
    pub fn parse_instruction(&self, payload: &str) -> Option<Instruction> {
        let message: ControlMessage = match serde_json::from_str(payload) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Dropping malformed control payload: {}", e);
                return None;
            }
        };

        Some(match message {
            ControlMessage::Pair(request) => {
                let config = request.config.unwrap_or_default();
                Instruction::Pair {
                    address: request.address,
                    notify_characteristics: config.notify_characteristics,
                    initial_commands: config.initial_commands,
                }
            }
            ControlMessage::Unpair { address } => Instruction::Unpair { address },
            // The wire carries no scan window; the configured default applies
            ControlMessage::Scan => Instruction::Scan {
                timeout: self.scan_timeout,
            },
            ControlMessage::Read { address } => Instruction::Read { address },
            ControlMessage::SensorList { sensors } => Instruction::SensorList { sensors },
        })
    }

    /// Envelope for one collected measurement.
    pub fn measurement(&self, sensor_mac: &str, data: String) -> TelemetryEnvelope {
        TelemetryEnvelope::measurement(self.gateway_mac.as_str(), sensor_mac, data)
    }

    /// Envelope for the periodic heartbeat.
    pub fn heartbeat(&self, sensors: Vec<SensorStatus>) -> TelemetryEnvelope {
        TelemetryEnvelope::heartbeat(self.gateway_mac.as_str(), sensors)
    }

    /// Envelope for the one-shot first-connect announcement.
    pub fn sensor_list_request(&self) -> TelemetryEnvelope {
        TelemetryEnvelope::sensor_list_request(self.gateway_mac.as_str())
    }
}
