//! Derived document records and their file-backed store.
//!
//! Documents are disposable projections of blocks (or synthetic day
//! aggregates); the indexer rebuilds them at will. Upserts are always
//! whole-record, keyed by id. There is no delete: a document whose
//! source block is gone lingers until the next reindex overwrites it.

use serde::{Deserialize, Serialize};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};
use thiserror::Error;

use chrono::{DateTime, Utc};

use crate::id::BlockId;
use crate::scope::ScopeType;

#[derive(Debug, Error)]
pub enum DocStoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed document database: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    /// Derived from the source kind, never settable on its own.
    pub is_private: bool,
    pub generated_at: DateTime<Utc>,
    /// Embedding model the vector came from.
    pub model: String,
}

/// Embeddable projection of a block. `id` equals the source block id,
/// or `day-context-<scopeId>` for synthetic per-day aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AIDocument {
    pub id: String,
    pub block_id: String,
    pub scope_id: String,
    pub scope_type: ScopeType,
    /// Source block kind, or `"day-context"` for synthetic documents.
    /// A plain string so synthetic kinds live beside block kinds.
    pub kind: String,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone, Default)]
pub struct DocumentStore {
    list: Arc<RwLock<Vec<AIDocument>>>,
    path: PathBuf,
}

impl DocumentStore {
    pub fn load(path: &Path) -> Result<Self, DocStoreError> {
        if let Err(err) = std::fs::metadata(path) {
            match err.kind() {
                ErrorKind::NotFound => {
                    log::info!("creating new document database at {}", path.display());
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(path, b"[]")?;
                }
                _ => Err(err)?,
            }
        }

        let raw = std::fs::read_to_string(path)?;
        let docs: Vec<AIDocument> = serde_json::from_str(&raw)?;
        log::debug!("loaded {} documents", docs.len());

        Ok(DocumentStore {
            list: Arc::new(RwLock::new(docs)),
            path: path.to_path_buf(),
        })
    }

    fn persist(&self, docs: &[AIDocument]) -> Result<(), DocStoreError> {
        let payload = serde_json::to_string(docs)?;
        let temp_path = self.path.with_extension(format!("{}.tmp", BlockId::new()));
        std::fs::write(&temp_path, payload)?;
        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    /// Whole-record put keyed by id.
    pub fn upsert(&self, doc: AIDocument) -> Result<(), DocStoreError> {
        let mut docs = self.list.write().unwrap();
        match docs.iter().position(|d| d.id == doc.id) {
            Some(idx) => docs[idx] = doc,
            None => docs.push(doc),
        }
        self.persist(&docs)
    }

    pub fn get(&self, id: &str) -> Option<AIDocument> {
        self.list
            .read()
            .unwrap()
            .iter()
            .find(|d| d.id == id)
            .cloned()
    }

    /// Snapshot of the whole corpus, in insertion order. Retrieval scans
    /// this; the corpus is assumed small enough for a full copy.
    pub fn all(&self) -> Vec<AIDocument> {
        self.list.read().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.list.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.read().unwrap().is_empty()
    }
}
