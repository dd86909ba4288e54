//! File-backed output store for the two message collections.
//!
//! Layout under the output root:
//! - `scripts/messages.json`
//! - `news/messages.json`
//!
//! Each file is a pretty-printed JSON array of records, rewritten in full on
//! every run. Files are replaced individually; there is no cross-file
//! atomicity and no locking against other writers.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info};

use crate::error::PersistError;
use crate::pipeline::processor::{Partitioned, sort_newest_first};
use crate::pipeline::types::{Category, ProcessedMessage};

/// Well-known output paths.
pub mod paths {
    pub const SCRIPTS_DIR: &str = "scripts";
    pub const NEWS_DIR: &str = "news";
    pub const FILE_NAME: &str = "messages.json";
}

/// Where each collection lives on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    /// Layout rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the collection for `category`.
    pub fn dir_for(&self, category: Category) -> PathBuf {
        let dir = match category {
            Category::Scripts => paths::SCRIPTS_DIR,
            Category::News => paths::NEWS_DIR,
        };
        self.root.join(dir)
    }

    /// File holding the collection for `category`.
    pub fn path_for(&self, category: Category) -> PathBuf {
        self.dir_for(category).join(paths::FILE_NAME)
    }
}

impl Default for OutputLayout {
    fn default() -> Self {
        Self::new(".")
    }
}

/// Outcome of writing one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedCollection {
    pub category: Category,
    pub path: PathBuf,
    pub count: usize,
}

/// Reads and writes the collection files.
#[derive(Debug, Clone, Default)]
pub struct CollectionStore {
    layout: OutputLayout,
}

impl CollectionStore {
    pub fn new(layout: OutputLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// Overwrite the collection for `category` with `messages`.
    ///
    /// Creates the parent directory if needed. The file is written next to
    /// its final name and renamed over it, so a failed write leaves the
    /// previous file in place.
    pub async fn save(
        &self,
        category: Category,
        messages: &[ProcessedMessage],
    ) -> Result<SavedCollection, PersistError> {
        let dir = self.layout.dir_for(category);
        let path = self.layout.path_for(category);

        fs::create_dir_all(&dir)
            .await
            .map_err(|source| PersistError::CreateDir {
                category,
                path: dir.clone(),
                source,
            })?;

        let mut body = serde_json::to_vec_pretty(messages)
            .map_err(|source| PersistError::Serialize { category, source })?;
        body.push(b'\n');

        let tmp_path = path.with_extension("json.tmp");
        let write_err = |source: std::io::Error| PersistError::Write {
            category,
            path: path.clone(),
            source,
        };
        fs::write(&tmp_path, &body).await.map_err(write_err)?;
        if let Err(source) = fs::rename(&tmp_path, &path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(write_err(source));
        }

        info!(
            category = %category,
            count = messages.len(),
            path = %path.display(),
            "Saved collection"
        );
        Ok(SavedCollection {
            category,
            path,
            count: messages.len(),
        })
    }

    /// Write both collections, scripts first.
    ///
    /// Stops at the first failure. A scripts file already written is not
    /// rolled back if the news write fails.
    pub async fn save_all(
        &self,
        collections: &Partitioned,
    ) -> Result<Vec<SavedCollection>, PersistError> {
        let mut saved = Vec::with_capacity(Category::ALL.len());
        for category in Category::ALL {
            saved.push(self.save(category, collections.collection(category)).await?);
        }
        Ok(saved)
    }

    /// Read the collection for `category`. A missing file reads as empty.
    pub async fn load(&self, category: Category) -> Result<Vec<ProcessedMessage>, PersistError> {
        let path = self.layout.path_for(category);
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(category = %category, path = %path.display(), "No collection file yet");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(PersistError::Read {
                    category,
                    path,
                    reason: e.to_string(),
                });
            }
        };

        serde_json::from_str(&raw).map_err(|e| PersistError::Read {
            category,
            path,
            reason: e.to_string(),
        })
    }

    /// Both collections concatenated and sorted newest first.
    pub async fn load_merged(&self) -> Result<Vec<ProcessedMessage>, PersistError> {
        let mut all = self.load(Category::Scripts).await?;
        all.extend(self.load(Category::News).await?);
        sort_newest_first(&mut all);
        Ok(all)
    }
}
