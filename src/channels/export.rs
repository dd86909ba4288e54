//! Export source: reads a Telegram Desktop channel export (`result.json`).
//!
//! Useful for backfilling history the Bot API cannot reach and for
//! running offline.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::SourceError;
use crate::pipeline::types::{MessageSource, RawMessage};

const SOURCE_NAME: &str = "export";

/// Date format used by the export's `date` field.
///
/// The value is the exporting machine's wall-clock time with no offset.
/// Recent exports also carry `date_unixtime`, which is used when present.
/// Otherwise the wall-clock time is read at the source's configured UTC
/// offset (UTC by default); a wrong offset shifts those messages relative
/// to ones with a unix timestamp.
const EXPORT_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Deserialize)]
struct ExportFile {
    #[serde(default)]
    name: Option<String>,
    messages: Vec<ExportMessage>,
}

#[derive(Debug, Deserialize)]
struct ExportMessage {
    id: i64,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    date_unixtime: Option<String>,
    #[serde(default)]
    text: ExportText,
}

/// `text` is a plain string, or a list of plain strings and formatted
/// fragments such as `{"type": "bold", "text": "..."}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExportText {
    Plain(String),
    Rich(Vec<TextPart>),
}

impl Default for ExportText {
    fn default() -> Self {
        Self::Plain(String::new())
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TextPart {
    Plain(String),
    Entity { text: String },
}

impl ExportText {
    fn flatten(self) -> String {
        match self {
            Self::Plain(text) => text,
            Self::Rich(parts) => parts
                .into_iter()
                .map(|part| match part {
                    TextPart::Plain(text) | TextPart::Entity { text } => text,
                })
                .collect(),
        }
    }
}

/// Export source: one `result.json` file.
pub struct ExportSource {
    path: PathBuf,
    utc_offset: FixedOffset,
}

impl ExportSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_utc_offset(path, Utc.fix())
    }

    /// Read offset-less `date` values at `utc_offset` instead of UTC.
    pub fn with_utc_offset(path: impl Into<PathBuf>, utc_offset: FixedOffset) -> Self {
        Self {
            path: path.into(),
            utc_offset,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl MessageSource for ExportSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn connect(&self) -> Result<(), SourceError> {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) if meta.is_file() => Ok(()),
            Ok(_) => Err(SourceError::Unavailable {
                name: SOURCE_NAME.into(),
                reason: format!("{} is not a file", self.path.display()),
            }),
            Err(e) => Err(SourceError::Unavailable {
                name: SOURCE_NAME.into(),
                reason: format!("{}: {e}", self.path.display()),
            }),
        }
    }

    async fn fetch(&self, limit: usize) -> Result<Vec<RawMessage>, SourceError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| SourceError::Io {
                path: self.path.clone(),
                source,
            })?;
        let mut messages = parse_export(&raw, self.utc_offset)?;
        let total = messages.len();

        // Exports list oldest first.
        messages.reverse();
        messages.truncate(limit);

        info!(
            path = %self.path.display(),
            count = messages.len(),
            total,
            "Fetched messages from export"
        );
        Ok(messages)
    }
}

/// Parse an export document into text messages, in file order.
fn parse_export(raw: &str, utc_offset: FixedOffset) -> Result<Vec<RawMessage>, SourceError> {
    let export: ExportFile = serde_json::from_str(raw).map_err(|e| SourceError::InvalidPayload {
        name: SOURCE_NAME.into(),
        reason: e.to_string(),
    })?;

    if let Some(name) = &export.name {
        info!(channel = %name, "Channel found");
    }

    let messages = export
        .messages
        .into_iter()
        .filter(|m| m.kind == "message")
        .filter_map(|m| {
            let Some(timestamp) = export_timestamp(&m, utc_offset) else {
                warn!(id = m.id, "Skipping exported message with unreadable date");
                return None;
            };
            let content = m.text.flatten();
            if content.is_empty() {
                return None;
            }
            Some(RawMessage::new(m.id.to_string(), content, timestamp))
        })
        .collect();
    Ok(messages)
}

/// Prefer the unix timestamp; fall back to `date` read at `utc_offset`.
fn export_timestamp(message: &ExportMessage, utc_offset: FixedOffset) -> Option<DateTime<Utc>> {
    if let Some(ts) = message
        .date_unixtime
        .as_deref()
        .and_then(|s| s.parse::<i64>().ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
    {
        return Some(ts);
    }
    let date = message.date.as_deref()?;
    NaiveDateTime::parse_from_str(date, EXPORT_DATE_FORMAT)
        .ok()
        .and_then(|naive| naive.and_local_timezone(utc_offset).single())
        .map(|local| local.with_timezone(&Utc))
}
