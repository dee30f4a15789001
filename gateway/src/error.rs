//! Error types for the gateway.

/// Errors raised by gateway operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Registration failed: {0}")]
    Registration(String),

    #[error("Credentials request failed: {0}")]
    Credentials(String),

    #[error("Wipe failed: {0}")]
    Wipe(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Device not connected: {0}")]
    NotConnected(String),

    #[error("Unknown transport backend: {0}")]
    UnknownBackend(String),

    #[error("Invalid hex payload: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
