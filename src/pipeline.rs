use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::adapter::AdapterClient;
use crate::links;
use crate::state::CursorStore;
use crate::telegram::{ChannelMessage, TelegramClient};

/// How many posts a cold start (no stored cursor) is allowed to publish.
/// Bounds the catch-up flood when the source channel has a long history.
const COLD_START_LIMIT: usize = 2;

const EMOJI_PREFIX: &str = "🚀";
const POPULAR_HASHTAGS: &str = "#crypto #bitcoin #trading #altcoins #defi";

/// What a continuous loop does when a cycle fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPolicy {
    /// Propagate the failure and end the loop.
    Stop,
    /// Log the failure, keep the previous cursor, poll again. The failed
    /// batch is refetched next cycle.
    KeepGoing,
}

#[async_trait]
pub trait UpdateSource: Send + Sync {
    async fn fetch_new_messages(
        &self,
        last_update_id: Option<i64>,
    ) -> Result<(Vec<ChannelMessage>, Option<i64>)>;
}

#[async_trait]
pub trait PostAdapter: Send + Sync {
    async fn adapt_post(&self, text: &str) -> Result<String>;
}

#[async_trait]
pub trait PostPublisher: Send + Sync {
    async fn publish_post(&self, text: &str) -> Result<()>;
}

#[async_trait]
impl UpdateSource for TelegramClient {
    async fn fetch_new_messages(
        &self,
        last_update_id: Option<i64>,
    ) -> Result<(Vec<ChannelMessage>, Option<i64>)> {
        Ok(TelegramClient::fetch_new_messages(self, last_update_id).await?)
    }
}

#[async_trait]
impl PostPublisher for TelegramClient {
    async fn publish_post(&self, text: &str) -> Result<()> {
        TelegramClient::publish_post(self, text, false).await?;
        Ok(())
    }
}

#[async_trait]
impl PostAdapter for AdapterClient {
    async fn adapt_post(&self, text: &str) -> Result<String> {
        Ok(AdapterClient::adapt_post(self, text).await?)
    }
}

/// Prefix the rocket emoji and append the standing hashtag footer, unless
/// the adapted text already carries them.
pub fn prepare_post(text: &str) -> String {
    let mut prepared = text.trim().to_string();
    if !prepared.starts_with(EMOJI_PREFIX) {
        prepared = format!("{EMOJI_PREFIX} {prepared}");
    }
    if !prepared.to_lowercase().contains(POPULAR_HASHTAGS) {
        prepared = format!("{}\n\n{POPULAR_HASHTAGS}", prepared.trim_end());
    }
    prepared
}

/// One fetch → filter → adapt → publish pass. Returns the advanced cursor.
///
/// Messages are processed strictly in fetch order; the first failure aborts
/// the rest of the cycle, so the caller keeps its old cursor and the whole
/// batch is refetched later (at-least-once, duplicates possible for posts
/// already published this cycle).
pub async fn run_cycle(
    source: &dyn UpdateSource,
    adapter: &dyn PostAdapter,
    publisher: &dyn PostPublisher,
    last_update_id: Option<i64>,
) -> Result<Option<i64>> {
    let (mut messages, new_last_update) = source.fetch_new_messages(last_update_id).await?;
    if messages.is_empty() {
        info!("no new posts found");
        return Ok(new_last_update);
    }

    if last_update_id.is_none() && messages.len() > COLD_START_LIMIT {
        debug!(
            "cold start: dropping {} older posts",
            messages.len() - COLD_START_LIMIT
        );
        messages.drain(..messages.len() - COLD_START_LIMIT);
    }

    info!("{} posts queued for publication", messages.len());
    let processed = process_messages(&messages, adapter, publisher).await?;
    info!("published {processed} posts");
    Ok(new_last_update)
}

async fn process_messages(
    messages: &[ChannelMessage],
    adapter: &dyn PostAdapter,
    publisher: &dyn PostPublisher,
) -> Result<usize> {
    let mut processed = 0;
    for message in messages {
        info!("processing post {}", message.message_id);
        let adapted = adapter.adapt_post(&message.text).await?;
        let prepared = prepare_post(&adapted);
        let enriched = links::append_links(&prepared);
        publisher.publish_post(&enriched).await?;
        processed += 1;
    }
    Ok(processed)
}

/// Single-pass mode: load the stored cursor, run one cycle, persist the
/// advanced cursor. The store is only written when the cycle succeeded.
pub async fn poll_once(
    source: &dyn UpdateSource,
    adapter: &dyn PostAdapter,
    publisher: &dyn PostPublisher,
    store: &CursorStore,
) -> Result<()> {
    let last_update_id = store.load();
    let new_last_update = run_cycle(source, adapter, publisher, last_update_id).await?;
    if let Some(id) = new_last_update {
        store.store(id);
    }
    Ok(())
}

/// Continuous mode: poll forever with a fixed sleep between cycles. The
/// cursor lives in memory only; nothing is persisted across restarts.
pub async fn poll_loop(
    source: &dyn UpdateSource,
    adapter: &dyn PostAdapter,
    publisher: &dyn PostPublisher,
    interval: Duration,
    on_error: LoopPolicy,
) -> Result<()> {
    let mut last_update_id = None;
    loop {
        match run_cycle(source, adapter, publisher, last_update_id).await {
            Ok(cursor) => last_update_id = cursor,
            Err(err) => match on_error {
                LoopPolicy::Stop => return Err(err),
                LoopPolicy::KeepGoing => {
                    error!("cycle failed, keeping cursor at {last_update_id:?}: {err:#}");
                }
            },
        }
        tokio::time::sleep(interval).await;
    }
}
