//! Error types for the attestation service.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Nonce or UID missing")]
    MissingNonceOrUid,

    #[error("UID missing")]
    MissingUid,

    #[error("Invalid UID format")]
    UnknownDeviceClass,

    #[error("Nonce is not valid hex")]
    InvalidNonce,

    #[error("Signing failed: {0}")]
    Signing(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::MissingNonceOrUid
            | Error::MissingUid
            | Error::UnknownDeviceClass
            | Error::InvalidNonce => StatusCode::BAD_REQUEST,
            Error::Signing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, Error>;
