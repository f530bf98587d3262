//! REST client for the backend's chat history and API key endpoints

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, Result};

/// Services whose API keys the backend manages
pub const SERVICES: &[&str] = &["aai", "gemini", "murf", "openweather"];

/// One stored exchange between the user and the agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEntry {
    /// Local time the exchange was saved (ISO 8601, no offset)
    pub timestamp: NaiveDateTime,
    pub user_query: String,
    pub ai_response: String,
}

/// Whether one service has a key configured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct KeyStatus {
    pub configured: bool,
}

/// Keys to set or test; absent or empty keys are left untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApiKeyUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aai: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gemini: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub murf: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openweather: Option<String>,
}

impl ApiKeyUpdate {
    /// True when no key carries a value
    #[must_use]
    pub fn is_empty(&self) -> bool {
        [&self.aai, &self.gemini, &self.murf, &self.openweather]
            .iter()
            .all(|k| k.as_deref().is_none_or(str::is_empty))
    }
}

/// Result of `POST /api/keys`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UpdateKeysResponse {
    /// Whether any key was changed
    #[serde(default)]
    pub updated: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Validity of one tested key
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KeyTestResult {
    pub valid: bool,
    pub message: String,
}

/// Body shape shared by the backend's mutation endpoints
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    body: T,
}

impl<T> Envelope<T> {
    fn into_result(self) -> Result<T> {
        if let Some(error) = self.error {
            return Err(Error::Backend(error));
        }
        if self.success == Some(false) {
            return Err(Error::Backend("request was not successful".to_string()));
        }
        Ok(self.body)
    }
}

#[derive(Debug, Deserialize)]
struct ClearBody {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TestKeysBody {
    #[serde(default)]
    results: BTreeMap<String, KeyTestResult>,
}

/// `GET /chat_history` returns a list, or an `{error}` object on failure
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HistoryResponse {
    Entries(Vec<ChatEntry>),
    Failed { error: String },
}

/// HTTP client for the backend's REST surface
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    base_url: Url,
}

impl BackendClient {
    /// Create a client for the backend at `base_url`
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client, base_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::Config(format!("invalid endpoint '{path}': {e}")))
    }

    /// Fetch the stored chat history, oldest first
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the backend reports an error
    pub async fn chat_history(&self) -> Result<Vec<ChatEntry>> {
        let response = self
            .client
            .get(self.endpoint("chat_history")?)
            .send()
            .await?
            .error_for_status()?;

        match response.json::<HistoryResponse>().await? {
            HistoryResponse::Entries(entries) => {
                tracing::debug!(entries = entries.len(), "fetched chat history");
                Ok(entries)
            }
            HistoryResponse::Failed { error } => Err(Error::Backend(error)),
        }
    }

    /// Delete the stored chat history
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the backend reports an error
    pub async fn clear_chat_history(&self) -> Result<String> {
        let body: Envelope<ClearBody> = self
            .client
            .delete(self.endpoint("chat_history")?)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let cleared = body.into_result()?;
        tracing::info!("chat history cleared");
        Ok(cleared
            .message
            .unwrap_or_else(|| "Chat history cleared".to_string()))
    }

    /// Which services have a key configured
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    pub async fn key_status(&self) -> Result<BTreeMap<String, KeyStatus>> {
        let status = self
            .client
            .get(self.endpoint("api/keys")?)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(status)
    }

    /// Replace the backend's keys with the non-empty values in `keys`
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the backend rejects the update
    pub async fn update_keys(&self, keys: &ApiKeyUpdate) -> Result<UpdateKeysResponse> {
        let body: Envelope<UpdateKeysResponse> = self
            .client
            .post(self.endpoint("api/keys")?)
            .json(keys)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let response = body.into_result()?;
        tracing::info!(updated = response.updated, "API keys submitted");
        Ok(response)
    }

    /// Ask the backend to validate `keys` against each service
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the backend reports an error
    pub async fn test_keys(&self, keys: &ApiKeyUpdate) -> Result<BTreeMap<String, KeyTestResult>> {
        let body: Envelope<TestKeysBody> = self
            .client
            .post(self.endpoint("api/test-keys")?)
            .json(keys)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(body.into_result()?.results)
    }
}
