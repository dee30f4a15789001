//! Configuration for the gateway.

use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;

/// Main configuration structure for the gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub gateway: GatewaySection,
    pub cloud: CloudSection,
    pub broker: BrokerSection,
    #[serde(default)]
    pub transport: TransportSection,
    #[serde(default)]
    pub runtime: RuntimeSection,
}

/// Identity of this gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySection {
    /// MAC address used as the gateway identity (format: B827EBB63381).
    pub mac_address: String,
    /// Optional registration secret seed. Overwritten when the cloud
    /// returns a fresh secret on registration.
    #[serde(default)]
    pub secret: Option<String>,
}

/// Provisioning endpoints and retry policy.
#[derive(Debug, Clone, Deserialize)]
pub struct CloudSection {
    pub registration_endpoint: String,
    pub credentials_endpoint: String,
    #[serde(default)]
    pub wipe_endpoint: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_registration_backoff")]
    pub registration_backoff_secs: u64,
    #[serde(default = "default_connect_backoff")]
    pub connect_backoff_secs: u64,
    /// Registration attempts before the gateway stops calling the endpoint.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

/// Broker channel connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerSection {
    pub url: String,
    /// Topic for outbound telemetry. Defaults to the gateway MAC address.
    #[serde(default)]
    pub telemetry_topic: Option<String>,
    /// Topic carrying inbound control messages. Defaults to the gateway MAC
    /// address.
    #[serde(default)]
    pub control_topic: Option<String>,
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

/// Device transport selection and timing.
#[derive(Debug, Clone, Deserialize)]
pub struct TransportSection {
    /// Transport backend: "ble" or "mock".
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_scan_timeout")]
    pub scan_timeout_secs: u64,
    /// Length of the measurement collection window.
    #[serde(default = "default_read_window")]
    pub read_window_secs: u64,
    /// Sub-tick interval inside the measurement window.
    #[serde(default = "default_read_poll_interval")]
    pub read_poll_interval_secs: u64,
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            scan_timeout_secs: default_scan_timeout(),
            read_window_secs: default_read_window(),
            read_poll_interval_secs: default_read_poll_interval(),
        }
    }
}

/// Main loop timing.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeSection {
    /// Steady-state tick interval while connected.
    #[serde(default = "default_tick")]
    pub tick_secs: u64,
    /// Number of ticks between heartbeats.
    #[serde(default = "default_heartbeat_ticks")]
    pub heartbeat_ticks: u32,
    /// Capacity of the control and notification queues.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            tick_secs: default_tick(),
            heartbeat_ticks: default_heartbeat_ticks(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl BrokerSection {
    /// Telemetry topic, falling back to the gateway MAC.
    pub fn telemetry_topic(&self, mac_address: &str) -> String {
        self.telemetry_topic
            .clone()
            .unwrap_or_else(|| mac_address.to_string())
    }

    /// Control topic, falling back to the gateway MAC.
    pub fn control_topic(&self, mac_address: &str) -> String {
        self.control_topic
            .clone()
            .unwrap_or_else(|| mac_address.to_string())
    }
}

// Default values
fn default_request_timeout() -> u64 {
    10
}
fn default_registration_backoff() -> u64 {
    10
}
fn default_connect_backoff() -> u64 {
    5
}
fn default_max_attempts() -> u32 {
    10
}
fn default_keepalive() -> u64 {
    60
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_backend() -> String {
    "ble".to_string()
}
fn default_scan_timeout() -> u64 {
    30
}
fn default_read_window() -> u64 {
    10
}
fn default_read_poll_interval() -> u64 {
    1
}
fn default_tick() -> u64 {
    5
}
fn default_heartbeat_ticks() -> u32 {
    12
}
fn default_queue_capacity() -> usize {
    32
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Configuration sources (in order of precedence):
    /// 1. Environment variables (BRIDGE__SECTION__KEY format)
    /// 2. config.toml file (if present)
    /// 3. Built-in defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config = ConfigLoader::builder()
            // Load from config.toml if exists
            .add_source(File::with_name("config").required(false))
            // Override with environment variables (BRIDGE__SECTION__KEY format)
            .add_source(
                Environment::with_prefix("BRIDGE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
