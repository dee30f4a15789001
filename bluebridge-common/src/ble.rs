//! Fixed GATT identifiers for the sensor measurement profile.

/// Characteristic that accepts measurement trigger commands.
pub const MEASUREMENT_COMMAND_UUID: &str = "87654321-1234-f393-e0a9-e50e24dcca9e";

/// Characteristic that streams measurement fragments back to the gateway.
pub const MEASUREMENT_RESPONSE_UUID: &str = "87654321-4321-8765-4321-56789abcdef0";

/// Commands written to [`MEASUREMENT_COMMAND_UUID`].
pub mod commands {
    /// Start a measurement read-out.
    pub const TRIGGER_MEASUREMENT: u8 = 0x35;
}
