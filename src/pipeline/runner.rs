//! Pipeline orchestrator: one full fetch → classify → persist run.

use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::pipeline::processor::MessageProcessor;
use crate::pipeline::types::MessageSource;
use crate::store::{CollectionStore, SavedCollection};

/// What a completed run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub run_id: Uuid,
    /// Messages received from the source.
    pub fetched: usize,
    /// One entry per collection written.
    pub saved: Vec<SavedCollection>,
}

/// Result of a run that did not hit an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Both collections were written.
    Written(RunSummary),
    /// The source returned nothing. No files were touched.
    Empty,
}

impl RunOutcome {
    /// Only a run that wrote its collections counts as success.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Written(_))
    }
}

/// Runs the sorter end to end.
pub struct Pipeline {
    source: Box<dyn MessageSource>,
    processor: MessageProcessor,
    store: CollectionStore,
}

impl Pipeline {
    pub fn new(
        source: Box<dyn MessageSource>,
        processor: MessageProcessor,
        store: CollectionStore,
    ) -> Self {
        Self {
            source,
            processor,
            store,
        }
    }

    pub fn store(&self) -> &CollectionStore {
        &self.store
    }

    /// Fetch up to `limit` messages, sort them, and overwrite both collections.
    ///
    /// Source and persistence failures abort the run. A failure writing the
    /// second collection leaves the first one written. The source is told to
    /// commit only once both collections are on disk.
    pub async fn run(&self, limit: usize) -> Result<RunOutcome> {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", %run_id, source = self.source.name());
        async move {
            let outcome = self.run_inner(run_id, limit).await;
            match &outcome {
                Ok(RunOutcome::Written(summary)) => info!(
                    fetched = summary.fetched,
                    "Successfully fetched and categorized messages"
                ),
                Ok(RunOutcome::Empty) => warn!("No messages fetched"),
                Err(e) => error!(error = %e, "Run failed"),
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn run_inner(&self, run_id: Uuid, limit: usize) -> Result<RunOutcome> {
        self.source.connect().await?;
        let outcome = self.fetch_and_save(run_id, limit).await;
        self.source.shutdown().await;
        outcome
    }

    async fn fetch_and_save(&self, run_id: Uuid, limit: usize) -> Result<RunOutcome> {
        let messages = self.source.fetch(limit).await?;
        if messages.is_empty() {
            return Ok(RunOutcome::Empty);
        }

        let fetched = messages.len();
        let collections = self.processor.process_batch(messages);
        let saved = self.store.save_all(&collections).await?;

        // The files are already written; an unconfirmed batch is only re-read.
        if let Err(e) = self.source.commit().await {
            warn!(error = %e, "Could not confirm fetched messages to the source");
        }

        Ok(RunOutcome::Written(RunSummary {
            run_id,
            fetched,
            saved,
        }))
    }
}
