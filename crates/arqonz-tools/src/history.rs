//! Local image history, persisted to `image-history.json`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use arqonz_core::Result;
use arqonz_jobs::{Artifact, ResultSink, SinkError};

/// Items kept before the oldest are dropped.
pub const MAX_HISTORY_ITEMS: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    pub id: String,
    pub image_url: String,
    pub tool_name: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

impl HistoryItem {
    fn from_artifact(artifact: &Artifact) -> Self {
        let now = Utc::now();
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self {
            id: format!("{}-{}", now.timestamp_millis(), &suffix[..9]),
            image_url: artifact.url.clone(),
            tool_name: artifact
                .meta
                .tool_name
                .clone()
                .unwrap_or_else(|| "Unknown".into()),
            timestamp: now,
            prompt: artifact.meta.prompt.clone(),
        }
    }
}

/// Newest-first list of generated images.
///
/// Every mutation is written through to disk while the lock is held, so
/// concurrent jobs never interleave writes.
#[derive(Debug)]
pub struct HistoryStore {
    path: PathBuf,
    items: Mutex<Vec<HistoryItem>>,
}

impl HistoryStore {
    /// Load from `path`. A missing or unreadable file starts an empty history.
    pub fn load(path: &Path) -> Self {
        let mut items: Vec<HistoryItem> = match std::fs::read_to_string(path) {
            Ok(s) => serde_json::from_str(&s).unwrap_or_else(|e| {
                warn!("Ignoring corrupt history file {}: {}", path.display(), e);
                Vec::new()
            }),
            Err(_) => Vec::new(),
        };
        items.truncate(MAX_HISTORY_ITEMS);

        Self {
            path: path.to_path_buf(),
            items: Mutex::new(items),
        }
    }

    pub fn list(&self) -> Vec<HistoryItem> {
        self.items.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Prepend an item for `artifact`, dropping the oldest past the cap.
    pub fn add(&self, artifact: &Artifact) -> Result<HistoryItem> {
        let item = HistoryItem::from_artifact(artifact);
        let mut items = self.items.lock();
        items.insert(0, item.clone());
        items.truncate(MAX_HISTORY_ITEMS);
        self.save(&items)?;
        Ok(item)
    }

    /// Returns whether an item was removed.
    pub fn remove(&self, id: &str) -> Result<bool> {
        let mut items = self.items.lock();
        let before = items.len();
        items.retain(|item| item.id != id);
        if items.len() == before {
            return Ok(false);
        }
        self.save(&items)?;
        Ok(true)
    }

    pub fn clear(&self) -> Result<()> {
        let mut items = self.items.lock();
        items.clear();
        self.save(&items)?;
        info!("Cleared image history");
        Ok(())
    }

    fn save(&self, items: &[HistoryItem]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(items)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

#[async_trait]
impl ResultSink for HistoryStore {
    async fn record(&self, artifact: &Artifact) -> std::result::Result<(), SinkError> {
        self.add(artifact)
            .map(|_| ())
            .map_err(|e| SinkError(e.to_string()))
    }
}
