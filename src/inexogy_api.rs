use serde::de::Deserializer;
use serde::Deserialize as _;
use serde_derive::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://api.inexogy.com/public/v1";
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Reasons a poll of the readings endpoint produced no new reading
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("inexogy returned HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("invalid JSON in response: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("unexpected response structure from inexogy: {0}")]
    UnexpectedShape(String),
}

/// Thin client for the inexogy (Discovergy compatible) REST API
pub struct InexogyAPI {
    base_url: String,
    auth_token: String,
    client: reqwest::Client,
}

impl InexogyAPI {
    pub fn new(base_url: &str, auth_token: &str) -> Result<Self, anyhow::Error> {
        Self::with_timeout(base_url, auth_token, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: &str,
        auth_token: &str,
        timeout: Duration,
    ) -> Result<Self, anyhow::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token: auth_token.to_string(),
            client,
        })
    }

    /// Fetches the most recent reading of a meter (`readings?last=1`)
    pub async fn fetch_latest_reading(&self, meter_id: &str) -> Result<Reading, FetchError> {
        let response = self
            .client
            .get(format!("{}/meters/{}/readings", self.base_url, meter_id))
            .query(&[("last", "1")])
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Token token={}", self.auth_token),
            )
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(FetchError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let body = response.bytes().await.map_err(FetchError::Transport)?;
        parse_readings(&body)
    }
}

/// Picks the first reading out of a `readings` response body
pub fn parse_readings(body: &[u8]) -> Result<Reading, FetchError> {
    let data: serde_json::Value = serde_json::from_slice(body).map_err(FetchError::Decode)?;

    // Expected: a list holding a single reading object
    let first = match data.as_array().and_then(|readings| readings.first()) {
        Some(first) => first,
        None => return Err(FetchError::UnexpectedShape(data.to_string())),
    };
    if !first.is_object() {
        return Err(FetchError::UnexpectedShape(data.to_string()));
    }

    serde_json::from_value(first.clone())
        .map_err(|e| FetchError::UnexpectedShape(format!("{e}: {first}")))
}

/// One snapshot of measured values for a meter
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Milliseconds since the epoch, when the provider sends it
    #[serde(default, deserialize_with = "lenient_millis")]
    pub time: Option<i64>,
    #[serde(default)]
    pub values: HashMap<String, serde_json::Value>,
}

impl Reading {
    /// Returns `values[field] / scale`, or `None` when the field is absent or not a number.
    pub fn derive_value(&self, field: &str, scale: f64) -> Option<f64> {
        let raw = self.values.get(field)?;
        let number = match raw {
            serde_json::Value::Null => return None,
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
        .filter(|n| n.is_finite());
        if number.is_none() {
            tracing::warn!(field, value = %raw, "reading field is not numeric");
        }
        number.map(|n| n / scale)
    }
}

/// Timestamps that are not plain numbers are dropped instead of rejecting the reading
fn lenient_millis<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    Ok(match raw {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        _ => None,
    })
}
