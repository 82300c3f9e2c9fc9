//! Reconciliation between the local block set and a remote copy.
//!
//! This is deliberately not a merge. Push re-uploads the entire local
//! set as unconditional upserts; pull fetches the identity's rows and
//! overwrites local blocks with them. Concurrent edits across devices
//! resolve by whichever call ran last, with no version vector and no
//! delete propagation. Without a stored session both directions are
//! silent no-ops.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

use chrono::{DateTime, Utc};

use crate::auth::Session;
use crate::blocks::{Block, BlockKind, BlockStore, ContentBlock, StoreError};
use crate::id::BlockId;
use crate::scope::{Scope, ScopeType};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote store returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("malformed remote payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One flat remote row per block per identity, upsert-keyed by
/// `(user_id, id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRow {
    pub id: String,
    pub user_id: String,
    pub scope_type: ScopeType,
    pub scope_id: String,
    pub kind: BlockKind,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub items: Vec<ContentBlock>,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub search_text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RemoteRow {
    pub fn from_block(block: &Block, user_id: &str) -> RemoteRow {
        RemoteRow {
            id: block.id.to_string(),
            user_id: user_id.to_string(),
            scope_type: block.scope.scope_type,
            scope_id: block.scope.id.clone(),
            kind: block.kind,
            title: block.title.clone(),
            content: block.content.clone(),
            items: block.items.clone(),
            data: block.data.clone(),
            search_text: block.search_text.clone(),
            created_at: block.created_at,
            updated_at: block.updated_at,
        }
    }

    pub fn into_block(self) -> Block {
        Block {
            id: BlockId::from(self.id),
            scope: Scope {
                scope_type: self.scope_type,
                id: self.scope_id,
            },
            kind: self.kind,
            title: self.title,
            content: self.content,
            items: self.items,
            data: self.data,
            search_text: self.search_text,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

pub trait RemoteStore: Send + Sync {
    /// One batch upsert of all rows, keyed `(user_id, id)`.
    fn upsert_rows(&self, rows: &[RemoteRow]) -> Result<(), SyncError>;

    /// Every row owned by `user_id`.
    fn fetch_rows(&self, user_id: &str) -> Result<Vec<RemoteRow>, SyncError>;
}

/// Supabase-compatible REST backend for the remote block table.
pub struct HttpRemote {
    base_url: String,
    api_key: String,
    access_token: String,
}

impl HttpRemote {
    pub fn new(base_url: &str, api_key: &str, access_token: &str) -> HttpRemote {
        HttpRemote {
            base_url: base_url.strip_suffix('/').unwrap_or(base_url).to_string(),
            api_key: api_key.to_string(),
            access_token: access_token.to_string(),
        }
    }

    fn check(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, SyncError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            return Err(SyncError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }
}

impl RemoteStore for HttpRemote {
    fn upsert_rows(&self, rows: &[RemoteRow]) -> Result<(), SyncError> {
        let url = format!("{}/rest/v1/blocks", self.base_url);
        log::debug!("POST {url} ({} rows)", rows.len());
        let response = reqwest::blocking::Client::new()
            .post(url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.access_token)
            .header("Prefer", "resolution=merge-duplicates")
            .json(rows)
            .send()?;
        Self::check(response)?;
        Ok(())
    }

    fn fetch_rows(&self, user_id: &str) -> Result<Vec<RemoteRow>, SyncError> {
        let url = format!(
            "{}/rest/v1/blocks?select=*&user_id=eq.{user_id}",
            self.base_url
        );
        log::debug!("GET {url}");
        let response = reqwest::blocking::Client::new()
            .get(url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.access_token)
            .send()?;
        let text = Self::check(response)?.text()?;
        Ok(serde_json::from_str(&text)?)
    }
}

pub struct SyncReconciler {
    store: Arc<dyn BlockStore>,
    remote: Arc<dyn RemoteStore>,
    session: Option<Session>,
}

impl SyncReconciler {
    pub fn new(
        store: Arc<dyn BlockStore>,
        remote: Arc<dyn RemoteStore>,
        session: Option<Session>,
    ) -> SyncReconciler {
        SyncReconciler {
            store,
            remote,
            session,
        }
    }

    /// Uploads the entire local set in one upsert call. There is no
    /// dirty tracking; every push sends everything. Returns the row
    /// count, 0 when logged out or empty.
    pub fn push_changes(&self) -> Result<usize, SyncError> {
        let Some(session) = &self.session else {
            log::info!("not logged in, skipping push");
            return Ok(0);
        };

        let blocks = self.store.all();
        if blocks.is_empty() {
            return Ok(0);
        }

        let rows: Vec<RemoteRow> = blocks
            .iter()
            .map(|b| RemoteRow::from_block(b, &session.user_id))
            .collect();
        self.remote.upsert_rows(&rows)?;
        log::info!("pushed {} blocks", rows.len());
        Ok(rows.len())
    }

    /// Fetches every remote row for the identity and upserts the mapped
    /// blocks locally in one transaction. Remote data overwrites local
    /// on id conflict, unconditionally.
    pub fn pull_changes(&self) -> Result<usize, SyncError> {
        let Some(session) = &self.session else {
            log::info!("not logged in, skipping pull");
            return Ok(0);
        };

        let rows = self.remote.fetch_rows(&session.user_id)?;
        if rows.is_empty() {
            return Ok(0);
        }

        let blocks: Vec<Block> = rows.into_iter().map(RemoteRow::into_block).collect();
        let count = self.store.upsert_many(blocks)?;
        log::info!("pulled {count} blocks");
        Ok(count)
    }

    /// Pull then push, so remote edits land before the re-upload.
    pub fn sync(&self) -> Result<(usize, usize), SyncError> {
        let pulled = self.pull_changes()?;
        let pushed = self.push_changes()?;
        Ok((pulled, pushed))
    }
}

/// In-memory remote for tests: a flat row list keyed `(user_id, id)`.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryRemote {
    rows: std::sync::Mutex<Vec<RemoteRow>>,
}

#[cfg(test)]
impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn insert_row(&self, row: RemoteRow) {
        self.rows.lock().unwrap().push(row);
    }
}

#[cfg(test)]
impl RemoteStore for MemoryRemote {
    fn upsert_rows(&self, incoming: &[RemoteRow]) -> Result<(), SyncError> {
        let mut rows = self.rows.lock().unwrap();
        for row in incoming {
            match rows
                .iter()
                .position(|r| r.user_id == row.user_id && r.id == row.id)
            {
                Some(idx) => rows[idx] = row.clone(),
                None => rows.push(row.clone()),
            }
        }
        Ok(())
    }

    fn fetch_rows(&self, user_id: &str) -> Result<Vec<RemoteRow>, SyncError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(scope_id: &str, kind: BlockKind) -> Block {
        Block::new(
            Scope::new(ScopeType::Day, scope_id).unwrap(),
            kind,
            Some("Title"),
        )
    }

    #[test]
    fn row_mapping_round_trips() {
        let mut original = block("2025-01-01", BlockKind::DailyJournal);
        original.content = Some("wrote some thoughts".to_string());
        original.data.insert("mood".into(), serde_json::json!(7));

        let row = RemoteRow::from_block(&original, "user-1");
        assert_eq!(row.user_id, "user-1");
        assert_eq!(row.scope_type, ScopeType::Day);
        assert_eq!(row.scope_id, "2025-01-01");

        let back = row.into_block();
        assert_eq!(back, original);
    }

    #[test]
    fn row_serializes_flat_snake_case() {
        let row = RemoteRow::from_block(&block("2025-01-01", BlockKind::DailyHabits), "u");
        let json = serde_json::to_string(&row).unwrap();
        assert!(json.contains("\"scope_type\":\"day\""));
        assert!(json.contains("\"search_text\""));
        assert!(json.contains("\"created_at\""));
        assert!(!json.contains("\"scope\":{"));
    }
}
