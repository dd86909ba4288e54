//! Message processor: classifies, numbers, and partitions a fetched batch.
//!
//! Flow for each message, in delivery order:
//! 1. Classifier → category
//! 2. Sequencer → run-local id
//! 3. Partition → scripts or news
//!
//! Both collections are then sorted newest first.

use tracing::info;

use crate::pipeline::rules::Classifier;
use crate::pipeline::types::{Category, ProcessedMessage, RawMessage};

/// Hands out sequential ids for one run, starting at 1.
///
/// Owned by whoever drives the run; there is no process-wide counter.
#[derive(Debug, Clone)]
pub struct Sequencer {
    next: u64,
}

impl Sequencer {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Start the counter at `first` instead of 1.
    pub fn starting_at(first: u64) -> Self {
        Self { next: first }
    }

    /// The id the next call to [`Sequencer::next_id`] will return.
    pub fn peek(&self) -> u64 {
        self.next
    }

    /// Return the current id and advance.
    pub fn next_id(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }

    /// Build a processed message from `raw`, consuming one id.
    pub fn assign(&mut self, raw: RawMessage, category: Category) -> ProcessedMessage {
        ProcessedMessage {
            id: self.next_id(),
            content: raw.content,
            timestamp: raw.timestamp,
            category,
        }
    }
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}

/// The two output collections for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partitioned {
    pub scripts: Vec<ProcessedMessage>,
    pub news: Vec<ProcessedMessage>,
}

impl Partitioned {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the collection named by the message's category.
    pub fn push(&mut self, message: ProcessedMessage) {
        match message.category {
            Category::Scripts => self.scripts.push(message),
            Category::News => self.news.push(message),
        }
    }

    /// The collection for `category`.
    pub fn collection(&self, category: Category) -> &[ProcessedMessage] {
        match category {
            Category::Scripts => &self.scripts,
            Category::News => &self.news,
        }
    }

    /// Total messages across both collections.
    pub fn len(&self) -> usize {
        self.scripts.len() + self.news.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty() && self.news.is_empty()
    }

    /// Sort both collections newest first.
    pub fn sort_newest_first(&mut self) {
        sort_newest_first(&mut self.scripts);
        sort_newest_first(&mut self.news);
    }
}

/// Order by timestamp, most recent first. Ties keep their prior order.
pub fn sort_newest_first(messages: &mut [ProcessedMessage]) {
    // `sort_by` is stable.
    messages.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}

/// Runs the classify → sequence → partition → sort stages over a batch.
pub struct MessageProcessor {
    classifier: Classifier,
}

impl MessageProcessor {
    pub fn new(classifier: Classifier) -> Self {
        Self { classifier }
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Process a fetched batch with a fresh id counter.
    pub fn process_batch(&self, messages: Vec<RawMessage>) -> Partitioned {
        let mut sequencer = Sequencer::new();
        self.process_with(&mut sequencer, messages)
    }

    /// Process a batch, drawing ids from `sequencer`.
    pub fn process_with(
        &self,
        sequencer: &mut Sequencer,
        messages: Vec<RawMessage>,
    ) -> Partitioned {
        let total = messages.len();
        info!(count = total, "Categorizing messages");

        let mut partitioned = Partitioned::new();
        for raw in messages {
            let category = self.classifier.classify(&raw.content);
            partitioned.push(sequencer.assign(raw, category));
        }
        partitioned.sort_newest_first();

        info!(
            scripts = partitioned.scripts.len(),
            news = partitioned.news.len(),
            total,
            "Categorization complete"
        );
        partitioned
    }
}

impl Default for MessageProcessor {
    fn default() -> Self {
        Self::new(Classifier::default_rules())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
    }

    fn raw(source_id: &str, content: &str, hour: u32) -> RawMessage {
        RawMessage::new(source_id, content, at(hour))
    }

    #[test]
    fn sequencer_starts_at_one_and_increments() {
        let mut seq = Sequencer::new();
        assert_eq!(seq.peek(), 1);
        assert_eq!(seq.next_id(), 1);
        assert_eq!(seq.next_id(), 2);
        assert_eq!(seq.peek(), 3);
    }

    #[test]
    fn sequencer_ignores_source_id() {
        let mut seq = Sequencer::new();
        let msg = seq.assign(raw("9001", "hello", 1), Category::News);
        assert_eq!(msg.id, 1);
        assert_eq!(msg.content, "hello");
        assert_eq!(msg.timestamp, at(1));
    }

    #[test]
    fn ids_shared_across_collections_in_classification_order() {
        let processor = MessageProcessor::default();
        let batch = vec![
            raw("30", "local x = 1", 5),
            raw("29", "Maintenance tonight", 4),
            raw("28", "getgenv().Speed = 2", 3),
            raw("27", "New event announced", 2),
        ];
        let out = processor.process_batch(batch);

        let script_ids: Vec<u64> = out.scripts.iter().map(|m| m.id).collect();
        let news_ids: Vec<u64> = out.news.iter().map(|m| m.id).collect();
        assert_eq!(script_ids, vec![1, 3]);
        assert_eq!(news_ids, vec![2, 4]);
    }

    #[test]
    fn partition_loses_and_duplicates_nothing() {
        let processor = MessageProcessor::default();
        let contents = [
            "```lua\nprint(1)\n```",
            "hello world",
            "https://raw.githubusercontent.com/a/b",
            "script + local",
            "just news",
        ];
        let batch: Vec<RawMessage> = contents
            .iter()
            .enumerate()
            .map(|(i, c)| raw(&i.to_string(), c, i as u32))
            .collect();
        let out = processor.process_batch(batch);

        assert_eq!(out.len(), contents.len());
        for c in contents {
            let in_scripts = out.scripts.iter().any(|m| m.content == c);
            let in_news = out.news.iter().any(|m| m.content == c);
            assert!(in_scripts ^ in_news, "{c} must be in exactly one collection");
        }
        assert!(out.scripts.iter().all(|m| m.category == Category::Scripts));
        assert!(out.news.iter().all(|m| m.category == Category::News));
    }

    #[test]
    fn news_sorted_newest_first() {
        let processor = MessageProcessor::default();
        // T3 > T1 > T2, delivered as T1, T2, T3
        let batch = vec![raw("1", "news a", 10), raw("2", "news b", 5), raw("3", "news c", 20)];
        let out = processor.process_batch(batch);

        let order: Vec<&str> = out.news.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(order, vec!["news c", "news a", "news b"]);
        assert!(out.news.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
    }

    #[test]
    fn tied_timestamps_keep_classification_order() {
        let processor = MessageProcessor::default();
        let batch = vec![
            raw("1", "first", 7),
            raw("2", "second", 7),
            raw("3", "newer", 8),
            raw("4", "third", 7),
        ];
        let out = processor.process_batch(batch);

        let order: Vec<&str> = out.news.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(order, vec!["newer", "first", "second", "third"]);
    }

    #[test]
    fn sorting_does_not_change_records() {
        let processor = MessageProcessor::default();
        let out = processor.process_batch(vec![raw("1", "old", 1), raw("2", "new", 2)]);
        assert_eq!(out.news[0].id, 2);
        assert_eq!(out.news[0].content, "new");
        assert_eq!(out.news[1].id, 1);
    }

    #[test]
    fn process_with_continues_an_existing_counter() {
        let processor = MessageProcessor::default();
        let mut seq = Sequencer::starting_at(10);
        let out = processor.process_with(&mut seq, vec![raw("1", "a", 1), raw("2", "b", 2)]);
        let mut ids: Vec<u64> = out.news.iter().map(|m| m.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![10, 11]);
        assert_eq!(seq.peek(), 12);
    }

    #[test]
    fn empty_batch_yields_empty_collections() {
        let out = MessageProcessor::default().process_batch(Vec::new());
        assert!(out.is_empty());
        assert_eq!(out.len(), 0);
    }
}
