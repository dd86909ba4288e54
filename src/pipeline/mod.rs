//! Message sorting pipeline.
//!
//! Every run flows through:
//! 1. `MessageSource::connect()` / `fetch()`: source-specific I/O
//! 2. `Classifier::classify()`: tiered pattern rules, no I/O
//! 3. `Sequencer` + `Partitioned`: run-local ids, scripts vs news
//! 4. `CollectionStore::save_all()`: one JSON file per collection
//!
//! Stages 2–3 are synchronous over the fully fetched batch.

pub mod processor;
pub mod rules;
pub mod runner;
pub mod types;
