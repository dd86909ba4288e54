//! Shared types for the sorting pipeline.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::SourceError;

// ── Category ────────────────────────────────────────────────────────

/// The two mutually exclusive output collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Executable-script content.
    Scripts,
    /// General announcements.
    News,
}

impl Category {
    /// Both categories, in persistence order.
    pub const ALL: [Category; 2] = [Category::Scripts, Category::News];

    /// Short label, also the serialized form.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Scripts => "scripts",
            Self::News => "news",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ── Raw message ─────────────────────────────────────────────────────

/// A message as delivered by a [`MessageSource`].
///
/// Sources drop messages without a text body, so `content` is never empty
/// in practice. The classifier still accepts empty text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Upstream identifier, unique within one fetch.
    pub source_id: String,
    /// Message text.
    pub content: String,
    /// When the message was posted.
    pub timestamp: DateTime<Utc>,
}

impl RawMessage {
    pub fn new(
        source_id: impl Into<String>,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            content: content.into(),
            timestamp,
        }
    }
}

// ── Processed message ───────────────────────────────────────────────

/// A classified message with its run-local sequential id.
///
/// Serialized as `{"id", "content", "date", "type"}`. `type` is redundant
/// with the file it lives in but lets consumers concatenate both files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedMessage {
    /// Sequential id, unique across both collections within one run.
    pub id: u64,
    /// Message text, verbatim.
    pub content: String,
    /// Original timestamp, verbatim.
    #[serde(rename = "date", serialize_with = "serialize_iso8601")]
    pub timestamp: DateTime<Utc>,
    /// Fixed at creation.
    #[serde(rename = "type")]
    pub category: Category,
}

/// Writes `2024-05-01T10:00:00+00:00`, which sorts lexicographically in
/// chronological order for a fixed offset.
fn serialize_iso8601<S>(timestamp: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&timestamp.to_rfc3339())
}

// ── Message source trait ────────────────────────────────────────────

/// Trait for message sources: pure I/O, no classification logic.
///
/// The pipeline calls `connect()` once and then `fetch()` once per run and
/// works on the fully materialized list. `commit()` follows a successful save.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Source name for logs and errors (e.g. "telegram", "export").
    fn name(&self) -> &str;

    /// Verify the source is reachable and authorized.
    async fn connect(&self) -> Result<(), SourceError>;

    /// Fetch up to `limit` text messages, most recent first.
    async fn fetch(&self, limit: usize) -> Result<Vec<RawMessage>, SourceError>;

    /// Confirm the last fetched batch to the source.
    ///
    /// Called only after both collections are written, so a source that
    /// consumes what it delivers never drops messages a failed run did not
    /// persist.
    async fn commit(&self) -> Result<(), SourceError> {
        Ok(())
    }

    /// Release the connection. Called after every successful `connect()`.
    async fn shutdown(&self) {}
}
