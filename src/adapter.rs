use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::retry::RetryPolicy;

const DEFAULT_BASE_URL: &str = "https://api.deepseek.com/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const RETRY_MAX_DELAY: Duration = Duration::from_secs(10);

/// Field names the rewritten text may appear under, checked in order.
const TEXT_FIELDS: &[&str] = &["result", "text", "content", "message"];

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("adaptation service unreachable after retries: {0}")]
    Unavailable(#[source] reqwest::Error),
    #[error("adaptation service returned an unusable response: {0}")]
    MalformedResponse(String),
}

/// Client for the DeepSeek post-adaptation endpoint.
pub struct AdapterClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    retry: RetryPolicy,
}

impl AdapterClient {
    pub fn new(api_key: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("building DeepSeek HTTP client")?;
        Ok(Self {
            http,
            api_key: api_key.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            retry: RetryPolicy::with_max_delay(RETRY_MAX_DELAY),
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Rewrite a post through DeepSeek. Transport failures are retried;
    /// a response without a usable text field is not.
    pub async fn adapt_post(&self, original_text: &str) -> Result<String, AdapterError> {
        let url = format!("{}/posts/adapt", self.base_url);
        let payload = serde_json::json!({ "text": original_text });

        let body = self
            .retry
            .run("deepseek adapt", || async {
                let response = self
                    .http
                    .post(&url)
                    .header("Authorization", format!("Bearer {}", self.api_key))
                    .json(&payload)
                    .send()
                    .await?;
                response.error_for_status()?.text().await
            })
            .await
            .map_err(AdapterError::Unavailable)?;

        let payload: Value = serde_json::from_str(&body)
            .map_err(|err| AdapterError::MalformedResponse(format!("invalid JSON: {err}")))?;
        let adapted = extract_adapted_text(&payload).ok_or_else(|| {
            AdapterError::MalformedResponse("no text field in response".to_string())
        })?;

        debug!("adapted post is {} characters", adapted.len());
        Ok(adapted)
    }
}

/// First non-empty string under a known field name wins.
fn extract_adapted_text(payload: &Value) -> Option<String> {
    let object = payload.as_object()?;
    TEXT_FIELDS.iter().find_map(|field| {
        object
            .get(*field)
            .and_then(Value::as_str)
            .filter(|text| !text.trim().is_empty())
            .map(str::to_string)
    })
}
