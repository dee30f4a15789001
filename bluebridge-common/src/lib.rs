//! Bluebridge Common Types
//!
//! Wire contract shared by the gateway and the cloud side: control
//! instructions, telemetry envelopes, and broker channel frames.

pub mod ble;
pub mod channel;
pub mod control;
pub mod telemetry;

pub use channel::{BrokerFrame, ClientFrame};
pub use control::{ControlMessage, InitialCommand, PairConfig, PairRequest, SensorEntry};
pub use telemetry::{SensorStatus, TelemetryEnvelope, TelemetryKind};
