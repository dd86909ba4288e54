//! Error types for Channel Sorter.

use std::path::PathBuf;
use std::time::Duration;

use crate::pipeline::types::Category;

/// Top-level error type for a sorter run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {key}. {hint}")]
    MissingEnvVar { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Message source errors. Every variant is fatal for the run.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Source {name} unavailable: {reason}")]
    Unavailable { name: String, reason: String },

    #[error("Authentication failed for source {name}: {reason}")]
    AuthFailed { name: String, reason: String },

    #[error("Source {name} rate limited, last retry_after {retry_after:?}")]
    RateLimited {
        name: String,
        retry_after: Option<Duration>,
    },

    #[error("HTTP error from {name}: {reason}")]
    Http { name: String, reason: String },

    #[error("Invalid payload from {name}: {reason}")]
    InvalidPayload { name: String, reason: String },

    #[error("IO error reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Errors writing or reading an output collection.
///
/// Every variant names the collection so the operator knows which file failed.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("Failed to create directory {path:?} for {category} collection: {source}")]
    CreateDir {
        category: Category,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write {category} collection to {path:?}: {source}")]
    Write {
        category: Category,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize {category} collection: {source}")]
    Serialize {
        category: Category,
        source: serde_json::Error,
    },

    #[error("Failed to read {category} collection from {path:?}: {reason}")]
    Read {
        category: Category,
        path: PathBuf,
        reason: String,
    },
}

impl PersistError {
    /// The collection this failure belongs to.
    pub fn category(&self) -> Category {
        match self {
            Self::CreateDir { category, .. }
            | Self::Write { category, .. }
            | Self::Serialize { category, .. }
            | Self::Read { category, .. } => *category,
        }
    }
}

/// Result type alias for the sorter.
pub type Result<T> = std::result::Result<T, Error>;
