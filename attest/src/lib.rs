//! Attestation endpoints for low-end sensor devices.
//!
//! Devices too constrained for TLS authenticate through per-class HMAC keys
//! shared with this service. The cloud calls here to have a device's nonce
//! signed and to fetch the signed conformity certificate it presents during
//! onboarding.

pub mod error;

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tower_http::trace::TraceLayer;

pub use error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Signing keys for the development fleet, one per device class. The class
/// is the first character of a device UID.
fn dev_keys() -> HashMap<char, String> {
    [
        ('0', "ef55032bcaed111c7449cb9fd6f3ccd5e2529c241c24f248e2476e00499b309b"),
        ('1', "1e33fcedd16e26f7a0a7ce8b981174bb555e7a4de0be9e6bfecdbc7518da2e33"),
        ('2', "b82199e25dca75744992dcacfa3b3bc912c98f72fb021e3a88b832b5fa60befa"),
        ('3', "13a099941cccb9d8f5577488b0bf08201b5df23991fe8e0e3dc0a9938acce7ea"),
        ('4', "4516447f4b46ac8eff3c111f05054f154630750734f27a88eec3a72679a998df"),
        ('5', "a01cfd643d81e125d35afee4985e14f3a5cb87fee81a3f9215c9292d89048152"),
        ('6', "eb06b18693bacfc8b74dbd5cf29f9fce9f97678fc4a551cde75031e0d901923e"),
        ('7', "0df82ae6b8fa95be0fd6d50e3edcc4b7cde3c8e42a1205a715c82e2fd2805d44"),
        ('8', "be95f803d250c1681af8a35db71d99d621d56e92967a956fa13a1e9336df0abd"),
    ]
    .into_iter()
    .map(|(class, key)| (class, key.to_string()))
    .collect()
}

/// HMAC key table, selected by device class.
#[derive(Clone)]
pub struct KeyTable {
    keys: Arc<HashMap<char, String>>,
}

impl KeyTable {
    /// Development keys, each overridable with `ATTEST_KEY_<class>`.
    pub fn load() -> Self {
        let mut keys = dev_keys();
        for (class, key) in keys.iter_mut() {
            if let Ok(value) = std::env::var(format!("ATTEST_KEY_{class}")) {
                *key = value;
            }
        }
        Self {
            keys: Arc::new(keys),
        }
    }

    fn for_uid(&self, uid: &str) -> Result<&str> {
        let class = uid.chars().next().ok_or(Error::UnknownDeviceClass)?;
        self.keys
            .get(&class)
            .map(String::as_str)
            .ok_or(Error::UnknownDeviceClass)
    }
}

fn sign(key_hex: &str, data: &[u8]) -> Result<String> {
    let key = hex::decode(key_hex).map_err(|e| Error::Signing(format!("bad key material: {e}")))?;
    let mut mac =
        HmacSha256::new_from_slice(&key).map_err(|e| Error::Signing(e.to_string()))?;
    mac.update(data);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[derive(Debug, Deserialize)]
pub struct VerificationRequest {
    #[serde(default)]
    pub nonce: Option<String>,
    #[serde(default)]
    pub uid: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VerificationResponse {
    #[serde(rename = "signednonce")]
    pub signed_nonce: String,
}

#[derive(Debug, Deserialize)]
pub struct CertificateRequest {
    #[serde(default)]
    pub uid: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CertificateResponse {
    /// Hex-encoded JSON certificate envelope.
    pub conformity_certificate: String,
}

#[derive(Debug, Clone, Copy, Serialize)]
struct ConformityCertificate {
    device_id: &'static str,
    domain_id: &'static str,
    integrity: &'static str,
    access_control: &'static str,
}

/// Static certificate for the low-end device profile.
const CONFORMITY_CERTIFICATE: ConformityCertificate = ConformityCertificate {
    device_id: "LOWEND_1",
    domain_id: "QUBITECH",
    integrity: "1",
    access_control: "1",
};

#[derive(Debug, Serialize)]
struct CertificateEnvelope {
    cc: ConformityCertificate,
    evidence: Evidence,
}

#[derive(Debug, Serialize)]
struct Evidence {
    signature: String,
    uid: String,
}

/// Build the service router.
pub fn router(keys: KeyTable) -> Router {
    Router::new()
        .route("/lowenddevice_verification", post(verify_device))
        .route("/lowenddevice_cc", post(conformity_certificate))
        .layer(TraceLayer::new_for_http())
        .with_state(keys)
}

/// POST /lowenddevice_verification - sign a device's challenge nonce.
async fn verify_device(
    State(keys): State<KeyTable>,
    Json(request): Json<VerificationRequest>,
) -> Result<Json<VerificationResponse>> {
    let (nonce, uid) = match (request.nonce, request.uid) {
        (Some(nonce), Some(uid)) if !nonce.is_empty() && !uid.is_empty() => (nonce, uid),
        _ => return Err(Error::MissingNonceOrUid),
    };
    let key = keys.for_uid(&uid)?;

    // The nonce travels as hex; the device signed its raw bytes.
    let nonce_bytes = hex::decode(&nonce).map_err(|_| Error::InvalidNonce)?;
    let signed_nonce = sign(key, &nonce_bytes)?;

    tracing::debug!("Signed verification nonce for {}", uid);
    Ok(Json(VerificationResponse { signed_nonce }))
}

/// POST /lowenddevice_cc - issue the signed conformity certificate.
async fn conformity_certificate(
    State(keys): State<KeyTable>,
    Json(request): Json<CertificateRequest>,
) -> Result<Json<CertificateResponse>> {
    let uid = match request.uid {
        Some(uid) if !uid.is_empty() => uid,
        _ => return Err(Error::MissingUid),
    };
    let key = keys.for_uid(&uid)?;

    // The certificate body is signed standalone; the evidence block carries
    // the signature next to it.
    let certificate_json = serde_json::to_string(&CONFORMITY_CERTIFICATE)
        .map_err(|e| Error::Signing(e.to_string()))?;
    let signature = sign(key, certificate_json.as_bytes())?;

    let envelope = CertificateEnvelope {
        cc: CONFORMITY_CERTIFICATE,
        evidence: Evidence { signature, uid },
    };
    let bytes = serde_json::to_vec(&envelope).map_err(|e| Error::Signing(e.to_string()))?;

    Ok(Json(CertificateResponse {
        conformity_certificate: hex::encode(bytes),
    }))
}
