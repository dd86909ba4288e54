//! Channel Sorter: sorts channel posts into scripts and news.

pub mod channels;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod store;

pub use pipeline::rules::{Classifier, classify};
pub use pipeline::runner::{Pipeline, RunOutcome, RunSummary};
pub use pipeline::types::{Category, MessageSource, ProcessedMessage, RawMessage};
