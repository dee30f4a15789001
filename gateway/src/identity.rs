//! Gateway identity and provisioning material.

use crate::channel::ChannelCredentials;

/// Identity the gateway presents to the cloud.
///
/// The MAC address is fixed at boot. The registration secret and the broker
/// credentials are refreshed by the provisioning flow.
#[derive(Debug, Clone)]
pub struct GatewayIdentity {
    mac_address: String,
    secret: Option<String>,
    credentials: Option<ChannelCredentials>,
}

impl GatewayIdentity {
    pub fn new(mac_address: impl Into<String>, secret_seed: Option<String>) -> Self {
        Self {
            mac_address: mac_address.into(),
            secret: secret_seed,
            credentials: None,
        }
    }

    pub fn mac_address(&self) -> &str {
        &self.mac_address
    }

    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref()
    }

    pub fn credentials(&self) -> Option<&ChannelCredentials> {
        self.credentials.as_ref()
    }

    /// Store the secret returned by registration. A response without a
    /// secret keeps the currently held one.
    pub fn apply_registration(&mut self, secret: Option<String>) {
        if let Some(secret) = secret {
            self.secret = Some(secret);
        }
    }

    pub fn apply_credentials(&mut self, credentials: ChannelCredentials) {
        self.credentials = Some(credentials);
    }
}
