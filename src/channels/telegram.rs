//! Telegram source: reads channel posts through the Bot API.
//!
//! The bot must be a member of the channel. Posts are pulled with
//! `getUpdates` (`channel_post` updates only), filtered to the configured
//! channel, and returned newest first.
//!
//! The Bot API cannot replay channel history. A bot only sees posts made
//! while it was a member, and Telegram drops an update once a later
//! `getUpdates` call passes its id as the offset. `fetch` therefore stops at
//! the first short page and leaves it pending; `commit` sends the confirming
//! offset after the run has saved its collections. A backlog longer than one
//! page is confirmed page by page while reading, since there is no other way
//! to reach the next page. Once confirmed, posts are not delivered again, so
//! each run sees only what arrived since the last committed run.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::SourceError;
use crate::pipeline::types::{MessageSource, RawMessage};

/// Default Bot API endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Maximum updates per `getUpdates` call.
const PAGE_SIZE: usize = 100;

/// How many times a rate-limited call is retried.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Upper bound on a single rate-limit wait.
const MAX_RETRY_WAIT: Duration = Duration::from_secs(60);

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const SOURCE_NAME: &str = "telegram";

// ── Bot API payloads ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    channel_post: Option<ChannelPost>,
}

#[derive(Debug, Deserialize)]
struct ChannelPost {
    message_id: i64,
    date: i64,
    chat: Chat,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    caption: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
    #[serde(default)]
    username: Option<String>,
}

// ── Source ──────────────────────────────────────────────────────────

/// Telegram source: one channel, via the Bot API.
pub struct TelegramSource {
    bot_token: SecretString,
    channel: String,
    api_base: String,
    client: reqwest::Client,
    /// Offset that confirms the last fetched batch, or 0 when none is pending.
    pending_offset: AtomicI64,
}

impl TelegramSource {
    /// `channel` is a username (`@name` or `name`) or a numeric chat id.
    pub fn new(bot_token: SecretString, channel: &str) -> Self {
        Self::with_api_base(bot_token, channel, DEFAULT_API_BASE)
    }

    /// Point the source at a different Bot API endpoint.
    pub fn with_api_base(bot_token: SecretString, channel: &str, api_base: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            bot_token,
            channel: normalize_channel(channel),
            api_base: api_base.trim_end_matches('/').to_string(),
            client,
            pending_offset: AtomicI64::new(0),
        }
    }

    /// The channel this source reads, without a leading `@`.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{method}",
            self.api_base,
            self.bot_token.expose_secret()
        )
    }

    /// Call a Bot API method, waiting out rate limits.
    async fn call(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, SourceError> {
        let mut attempt = 0;
        loop {
            let resp = self
                .client
                .post(self.api_url(method))
                .json(body)
                .send()
                .await
                .map_err(|e| SourceError::Unavailable {
                    name: SOURCE_NAME.into(),
                    // Strip the URL so the token never reaches the logs.
                    reason: e.without_url().to_string(),
                })?;

            let status = resp.status();
            let payload: ApiResponse = resp.json().await.map_err(|e| {
                SourceError::InvalidPayload {
                    name: SOURCE_NAME.into(),
                    reason: format!("{method} returned {status}: {}", e.without_url()),
                }
            })?;

            if payload.ok {
                return payload.result.ok_or_else(|| SourceError::InvalidPayload {
                    name: SOURCE_NAME.into(),
                    reason: format!("{method} response has no result"),
                });
            }

            let description = payload.description.unwrap_or_default();
            match status.as_u16() {
                401 | 404 => {
                    return Err(SourceError::AuthFailed {
                        name: SOURCE_NAME.into(),
                        reason: format!("{method} returned {status}: {description}"),
                    });
                }
                429 => {
                    let retry_after = payload
                        .parameters
                        .and_then(|p| p.retry_after)
                        .map(Duration::from_secs);
                    if attempt >= MAX_RATE_LIMIT_RETRIES {
                        return Err(SourceError::RateLimited {
                            name: SOURCE_NAME.into(),
                            retry_after,
                        });
                    }
                    let wait = retry_after.unwrap_or(Duration::from_secs(1)).min(MAX_RETRY_WAIT);
                    attempt += 1;
                    warn!(
                        method,
                        attempt,
                        wait_secs = wait.as_secs(),
                        "Telegram rate limit hit, waiting before retry"
                    );
                    tokio::time::sleep(wait).await;
                }
                _ => {
                    return Err(SourceError::Http {
                        name: SOURCE_NAME.into(),
                        reason: format!("{method} returned {status}: {description}"),
                    });
                }
            }
        }
    }
}

#[async_trait]
impl MessageSource for TelegramSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn connect(&self) -> Result<(), SourceError> {
        info!("Connecting to Telegram...");
        let me = self.call("getMe", &serde_json::json!({})).await?;
        let bot = me
            .get("username")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("unknown");
        info!(bot, channel = %self.channel, "Successfully connected");
        Ok(())
    }

    async fn fetch(&self, limit: usize) -> Result<Vec<RawMessage>, SourceError> {
        info!(limit, channel = %self.channel, "Fetching channel posts");

        let mut offset: i64 = 0;
        let mut highest: Option<i64> = None;
        let mut posts = Vec::new();
        loop {
            let body = serde_json::json!({
                "offset": offset,
                "limit": PAGE_SIZE,
                "timeout": 0,
                "allowed_updates": ["channel_post"]
            });
            let result = self.call("getUpdates", &body).await?;
            let updates: Vec<Update> =
                serde_json::from_value(result).map_err(|e| SourceError::InvalidPayload {
                    name: SOURCE_NAME.into(),
                    reason: format!("getUpdates result: {e}"),
                })?;

            let page_len = updates.len();
            let Some(last_id) = updates.last().map(|u| u.update_id) else {
                break;
            };
            highest = Some(highest.map_or(last_id, |h| h.max(last_id)));

            debug!(count = page_len, offset, "Received update page");
            posts.extend(posts_from_updates(updates, &self.channel));

            // A short page is the end of the backlog. Asking for more would
            // confirm it before the run has saved anything.
            if page_len < PAGE_SIZE {
                break;
            }
            let next_offset = last_id + 1;
            if next_offset <= offset {
                warn!(offset, next_offset, "Update ids did not advance, stopping");
                break;
            }
            offset = next_offset;
        }

        self.pending_offset
            .store(highest.map_or(0, |h| h + 1), Ordering::SeqCst);

        // Updates arrive oldest first.
        posts.reverse();
        posts.truncate(limit);
        info!(count = posts.len(), "Fetched messages");
        Ok(posts)
    }

    async fn commit(&self) -> Result<(), SourceError> {
        let offset = self.pending_offset.swap(0, Ordering::SeqCst);
        if offset == 0 {
            return Ok(());
        }
        let body = serde_json::json!({
            "offset": offset,
            "limit": 1,
            "timeout": 0,
            "allowed_updates": ["channel_post"]
        });
        self.call("getUpdates", &body).await?;
        info!(offset, "Confirmed fetched updates");
        Ok(())
    }

    async fn shutdown(&self) {
        debug!("Telegram source shutting down");
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Lowercase a channel name and drop a leading `@`.
pub fn normalize_channel(channel: &str) -> String {
    channel.trim().trim_start_matches('@').to_lowercase()
}

/// Does `chat` belong to the configured channel (username or numeric id)?
fn is_target_chat(chat: &Chat, channel: &str) -> bool {
    if let Ok(id) = channel.parse::<i64>() {
        return chat.id == id;
    }
    chat.username
        .as_deref()
        .is_some_and(|u| u.eq_ignore_ascii_case(channel))
}

/// Keep text-bearing posts from the target channel, in update order.
fn posts_from_updates(updates: Vec<Update>, channel: &str) -> Vec<RawMessage> {
    updates
        .into_iter()
        .filter_map(|update| update.channel_post)
        .filter(|post| is_target_chat(&post.chat, channel))
        .filter_map(|post| {
            let text = post.text.or(post.caption).filter(|t| !t.is_empty())?;
            let Some(timestamp) = DateTime::from_timestamp(post.date, 0) else {
                warn!(message_id = post.message_id, date = post.date, "Skipping post with bad date");
                return None;
            };
            Some(RawMessage::new(post.message_id.to_string(), text, timestamp))
        })
        .collect()
}

// ── Tests ───────────────────────────────────────────────────────────
