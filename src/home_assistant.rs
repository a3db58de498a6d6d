use serde_derive::{Deserialize, Serialize};
use std::time::Duration;

use crate::inexogy_api::REQUEST_TIMEOUT;

pub struct HomeAssistantAPI {
    endpoint_url: String,
    auth_token: String,
    client: reqwest::Client,
}

impl HomeAssistantAPI {
    pub fn new(endpoint_url: &str, auth_token: &str) -> Result<Self, anyhow::Error> {
        Self::with_timeout(endpoint_url, auth_token, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(
        endpoint_url: &str,
        auth_token: &str,
        timeout: Duration,
    ) -> Result<Self, anyhow::Error> {
        Ok(Self {
            endpoint_url: endpoint_url.trim_end_matches('/').to_string(),
            auth_token: auth_token.to_string(),
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    /// Creates or replaces the state of an entity via `POST /api/states/<entity_id>`
    pub async fn write_state(
        &self,
        entity_id: &str,
        state: &HAStateUpdate,
    ) -> Result<HASensor, anyhow::Error> {
        if self.endpoint_url.is_empty() {
            anyhow::bail!("No HA connection");
        }
        let result = self
            .client
            .post(format!("{}/api/states/{}", self.endpoint_url, entity_id))
            .bearer_auth(&self.auth_token)
            .json(state)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(result)
    }
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HAStateUpdate {
    pub state: String,
    pub attributes: serde_json::Value,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HASensor {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: serde_json::Value,
    #[serde(default)]
    pub last_changed: String,
    #[serde(default)]
    pub last_reported: String,
    #[serde(default)]
    pub last_updated: String,
}
