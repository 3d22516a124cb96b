use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::retry::RetryPolicy;

const DEFAULT_BASE_URL: &str = "https://api.telegram.org";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
const RETRY_MAX_DELAY: Duration = Duration::from_secs(8);

/// Update kinds requested from getUpdates. Edited channel posts are fetched
/// so they advance the cursor, but their payload is never republished.
const ALLOWED_UPDATES: &[&str] = &["message", "channel_post", "edited_channel_post"];

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("telegram {method} unreachable after retries: {source}")]
    Unavailable {
        method: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("telegram {method} returned an error response: {detail}")]
    Api { method: &'static str, detail: String },
    #[error("webhook conflict on getUpdates persisted after deleteWebhook")]
    WebhookConflict,
}

/// A channel post that passed sender and text filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMessage {
    pub update_id: i64,
    pub message_id: i64,
    pub text: String,
}

/// Bot API client for both ends of the bridge: reads the source channel via
/// getUpdates and publishes to the target channel via sendMessage.
pub struct TelegramClient {
    http: reqwest::Client,
    token: String,
    source_chat_id: i64,
    target_channel: String,
    base_url: String,
    retry: RetryPolicy,
}

impl TelegramClient {
    pub fn new(token: &str, source_chat_id: i64, target_channel: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("building Telegram HTTP client")?;
        Ok(Self {
            http,
            token: token.to_string(),
            source_chat_id,
            target_channel: target_channel.to_string(),
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

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.base_url, self.token)
    }

    /// Fetch updates strictly after `last_update_id` and filter them down to
    /// posts from the configured source chat.
    ///
    /// A 409 from getUpdates means an active webhook is blocking polling;
    /// it is remediated with one deleteWebhook call, after which the fetch
    /// is retried once. A second conflict fails the call.
    pub async fn fetch_new_messages(
        &self,
        last_update_id: Option<i64>,
    ) -> Result<(Vec<ChannelMessage>, Option<i64>), TelegramError> {
        let url = self.method_url("getUpdates");
        let mut params = vec![
            ("timeout".to_string(), "0".to_string()),
            (
                "allowed_updates".to_string(),
                serde_json::to_string(ALLOWED_UPDATES).unwrap_or_default(),
            ),
        ];
        if let Some(id) = last_update_id {
            params.push(("offset".to_string(), (id + 1).to_string()));
        }

        let mut conflict_handled = false;
        let body = loop {
            let outcome = self
                .retry
                .run("getUpdates", || async {
                    let response = self.http.get(&url).query(&params).send().await?;
                    response.error_for_status()?.text().await
                })
                .await;

            match outcome {
                Ok(body) => break body,
                Err(err) if err.status() == Some(StatusCode::CONFLICT) => {
                    if conflict_handled {
                        return Err(TelegramError::WebhookConflict);
                    }
                    warn!("getUpdates returned 409, an active webhook blocks polling: {err}");
                    self.delete_webhook().await?;
                    conflict_handled = true;
                }
                Err(err) => {
                    return Err(TelegramError::Unavailable {
                        method: "getUpdates",
                        source: err,
                    })
                }
            }
        };

        let envelope = check_envelope("getUpdates", &body)?;
        let updates: Vec<Update> =
            serde_json::from_value(envelope.result.unwrap_or_else(|| Value::Array(Vec::new())))
                .map_err(|err| TelegramError::Api {
                    method: "getUpdates",
                    detail: format!("unexpected result shape: {err}"),
                })?;

        Ok(collect_messages(updates, self.source_chat_id, last_update_id))
    }

    /// Post the finished text to the target channel. Returns the raw message
    /// payload Telegram echoes back.
    pub async fn publish_post(
        &self,
        text: &str,
        disable_preview: bool,
    ) -> Result<Value, TelegramError> {
        let url = self.method_url("sendMessage");
        let payload = serde_json::json!({
            "chat_id": self.target_channel,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": disable_preview,
        });

        let body = self
            .retry
            .run("sendMessage", || async {
                let response = self.http.post(&url).json(&payload).send().await?;
                response.error_for_status()?.text().await
            })
            .await
            .map_err(|source| TelegramError::Unavailable {
                method: "sendMessage",
                source,
            })?;

        let envelope = check_envelope("sendMessage", &body)?;
        info!("published post to {}", self.target_channel);
        Ok(envelope.result.unwrap_or(Value::Null))
    }

    /// Drop the active webhook registration without discarding pending
    /// updates, so polling can take over delivery.
    async fn delete_webhook(&self) -> Result<(), TelegramError> {
        let url = self.method_url("deleteWebhook");
        let payload = serde_json::json!({ "drop_pending_updates": false });

        let body = self
            .retry
            .run("deleteWebhook", || async {
                let response = self.http.post(&url).json(&payload).send().await?;
                response.error_for_status()?.text().await
            })
            .await
            .map_err(|source| TelegramError::Unavailable {
                method: "deleteWebhook",
                source,
            })?;

        check_envelope("deleteWebhook", &body)?;
        info!("removed active webhook, polling can resume");
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    result: Option<Value>,
}

/// The Bot API wraps every response in `{ok, result, description}`; a 2xx
/// status with `ok` absent or false is still an error.
fn check_envelope(method: &'static str, body: &str) -> Result<ApiEnvelope, TelegramError> {
    let envelope: ApiEnvelope = serde_json::from_str(body).map_err(|err| TelegramError::Api {
        method,
        detail: format!("unparseable response body: {err}"),
    })?;
    if !envelope.ok {
        let detail = envelope
            .description
            .unwrap_or_else(|| body.trim().to_string());
        return Err(TelegramError::Api { method, detail });
    }
    Ok(envelope)
}

#[derive(Debug, Deserialize)]
struct Update {
    #[serde(default)]
    update_id: i64,
    #[serde(default)]
    message: Option<PostPayload>,
    #[serde(default)]
    channel_post: Option<PostPayload>,
}

#[derive(Debug, Deserialize)]
struct PostPayload {
    #[serde(default)]
    message_id: i64,
    #[serde(default)]
    sender_chat: Option<Peer>,
    #[serde(default)]
    from: Option<Peer>,
    #[serde(default)]
    chat: Option<Peer>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    caption: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Peer {
    #[serde(default)]
    id: Option<Value>,
}

impl PostPayload {
    /// Sender identity: first of sender_chat, from, chat whose id parses as
    /// an integer. Unparseable candidates fall through to the next one.
    fn sender_id(&self) -> Option<i64> {
        [
            self.sender_chat.as_ref(),
            self.from.as_ref(),
            self.chat.as_ref(),
        ]
        .into_iter()
        .flatten()
        .filter_map(|peer| peer.id.as_ref())
        .find_map(peer_id_as_i64)
    }

    /// Trimmed post text, with caption as the fallback for media posts.
    fn post_text(&self) -> Option<String> {
        let raw = self
            .text
            .as_deref()
            .filter(|text| !text.is_empty())
            .or(self.caption.as_deref())?;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

fn peer_id_as_i64(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|raw| raw.trim().parse().ok()))
}

/// Apply sender/text filtering and advance the cursor. Every update moves
/// the cursor past its update_id, relevant or not.
fn collect_messages(
    updates: Vec<Update>,
    source_chat_id: i64,
    last_update_id: Option<i64>,
) -> (Vec<ChannelMessage>, Option<i64>) {
    let mut messages = Vec::new();
    let mut new_last_update = last_update_id;

    for update in updates {
        new_last_update = Some(
            new_last_update
                .unwrap_or(update.update_id)
                .max(update.update_id),
        );

        let post = match update.channel_post.or(update.message) {
            Some(post) => post,
            None => continue,
        };

        if post.sender_id() != Some(source_chat_id) {
            continue;
        }

        let text = match post.post_text() {
            Some(text) => text,
            None => continue,
        };

        messages.push(ChannelMessage {
            update_id: update.update_id,
            message_id: post.message_id,
            text,
        });
    }

    debug!("collected {} relevant messages", messages.len());
    (messages, new_last_update)
}
