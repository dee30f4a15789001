//! HTTP client for the cloud provisioning endpoints.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;

use crate::channel::ChannelCredentials;
use crate::config::CloudSection;
use crate::error::{Error, Result};

/// Client for gateway registration, credential retrieval, and wipe.
///
/// All requests share one client with a hard timeout so provisioning can
/// never stall the state machine.
pub struct ProvisioningClient {
    client: reqwest::Client,
    registration_endpoint: String,
    credentials_endpoint: String,
    wipe_endpoint: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RegistrationResponse {
    secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CredentialsResponse {
    username: String,
    password: String,
}

impl ProvisioningClient {
    pub fn new(cloud: &CloudSection) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cloud.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            registration_endpoint: cloud.registration_endpoint.clone(),
            credentials_endpoint: cloud.credentials_endpoint.clone(),
            wipe_endpoint: cloud.wipe_endpoint.clone(),
        })
    }

    /// Register the gateway. Returns the fresh secret when the cloud issued
    /// one; a 200/201 without a parseable body is still a success.
    pub async fn register(&self, mac_address: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(&self.registration_endpoint)
            .query(&[("macAddress", mac_address)])
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::CREATED {
            return Err(Error::Registration(format!("unexpected status {status}")));
        }

        let body = response
            .json::<RegistrationResponse>()
            .await
            .unwrap_or(RegistrationResponse { secret: None });
        Ok(body.secret)
    }

    /// Fetch broker credentials for a registered gateway.
    pub async fn fetch_credentials(
        &self,
        mac_address: &str,
        secret: &str,
    ) -> Result<ChannelCredentials> {
        let response = self
            .client
            .get(&self.credentials_endpoint)
            .query(&[("macAddress", mac_address), ("secret", secret)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Credentials(format!(
                "unexpected status {}",
                response.status()
            )));
        }

        let body: CredentialsResponse = response
            .json()
            .await
            .map_err(|e| Error::Credentials(format!("invalid body: {e}")))?;
        Ok(ChannelCredentials {
            username: body.username,
            password: body.password,
        })
    }

    /// Ask the cloud to forget this gateway.
    pub async fn wipe(&self, mac_address: &str, only_db: bool) -> Result<()> {
        let endpoint = self
            .wipe_endpoint
            .as_ref()
            .ok_or_else(|| Error::Wipe("no wipe endpoint configured".to_string()))?;

        // The wipe endpoint takes its arguments in semicolon-separated form
        let url = format!(
            "{endpoint}?macAddress={mac_address};onlydb={}",
            if only_db { "True" } else { "False" }
        );
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::CREATED {
            return Err(Error::Wipe(format!("unexpected status {status}")));
        }
        Ok(())
    }
}
