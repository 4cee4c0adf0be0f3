use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::cache::{AnalysisCache, CachedAnalysis};
use crate::chat::{ChatMessage, ChatTranscript};
use crate::project::{DocumentStore, ProjectFile, StoreError};

pub const SNAPSHOT_SCHEMA_VERSION: u64 = 1;

/// External key-value store holding a single project blob.
pub trait BlobStore: Send + Sync {
    /// Last saved blob, or an empty object when nothing was saved yet.
    fn load(&self) -> anyhow::Result<Value>;
    /// Overwrites the stored blob verbatim.
    fn save(&self, blob: &Value) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct JsonFileBlobStore {
    path: PathBuf,
}

impl JsonFileBlobStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BlobStore for JsonFileBlobStore {
    fn load(&self) -> anyhow::Result<Value> {
        if !self.path.exists() {
            return Ok(Value::Object(Map::new()));
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed reading {}", self.path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("{} is not valid JSON", self.path.display()))
    }

    fn save(&self, blob: &Value) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(blob)?)
            .with_context(|| format!("failed writing {}", self.path.display()))?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    pub schema_version: u64,
    pub files: Vec<ProjectFile>,
    pub active_file: String,
    #[serde(default)]
    pub analyses: BTreeMap<String, CachedAnalysis>,
    #[serde(default)]
    pub chat: Vec<ChatMessage>,
    pub saved_at: String,
}

/// Session state rebuilt from a snapshot.
#[derive(Debug, Clone)]
pub struct RestoredSession {
    pub documents: DocumentStore,
    pub analyses: AnalysisCache,
    pub transcript: ChatTranscript,
    /// Cached analyses discarded because their file changed or vanished.
    pub dropped_analyses: Vec<String>,
}

impl ProjectSnapshot {
    pub fn capture(
        documents: &DocumentStore,
        analyses: &AnalysisCache,
        transcript: &ChatTranscript,
    ) -> Self {
        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            files: documents.list_files().cloned().collect(),
            active_file: documents.active_name().to_string(),
            analyses: analyses.entries().clone(),
            chat: transcript.messages().to_vec(),
            saved_at: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false),
        }
    }

    pub fn to_blob(&self) -> anyhow::Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// `None` for the empty blob an untouched store returns.
    pub fn from_blob(blob: &Value) -> anyhow::Result<Option<Self>> {
        if blob.as_object().map(Map::is_empty).unwrap_or(false) {
            return Ok(None);
        }
        let snapshot = serde_json::from_value(blob.clone()).context("invalid project snapshot")?;
        Ok(Some(snapshot))
    }

    pub fn restore(self) -> Result<RestoredSession, StoreError> {
        let mut documents = DocumentStore::new(self.files)?;
        documents.set_active(&self.active_file)?;
        let mut analyses = AnalysisCache::from_entries(self.analyses);
        let dropped_analyses = analyses.retain_fresh(&documents);
        Ok(RestoredSession {
            documents,
            analyses,
            transcript: ChatTranscript::from_messages(self.chat),
            dropped_analyses,
        })
    }
}
