//! Whole-store JSON export and import, independent of sync.

use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::blocks::{Block, BlockStore, StoreError};

pub const BACKUP_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("invalid backup format: {0}")]
    Validation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization failed: {0}")]
    Serde(serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Backup {
    pub version: u32,
    pub timestamp: DateTime<Utc>,
    pub blocks: Vec<Block>,
}

/// Serializes the full block set as a version-1 snapshot.
pub fn export_data(store: &dyn BlockStore) -> Result<String, BackupError> {
    let backup = Backup {
        version: BACKUP_VERSION,
        timestamp: Utc::now(),
        blocks: store.all(),
    };
    serde_json::to_string_pretty(&backup).map_err(BackupError::Serde)
}

/// Parses a snapshot and bulk-upserts every block verbatim in one
/// transaction. A missing or non-array `blocks` key rejects the whole
/// import; nothing is partially applied.
pub fn import_data(store: &dyn BlockStore, text: &str) -> Result<usize, BackupError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|err| BackupError::Validation(format!("not valid JSON: {err}")))?;

    match value.get("blocks") {
        Some(Value::Array(_)) => {}
        Some(_) => {
            return Err(BackupError::Validation(
                "`blocks` is not an array".to_string(),
            ))
        }
        None => {
            return Err(BackupError::Validation(
                "missing `blocks` key".to_string(),
            ))
        }
    }

    let backup: Backup = serde_json::from_value(value)
        .map_err(|err| BackupError::Validation(format!("malformed block record: {err}")))?;

    let count = store.upsert_many(backup.blocks)?;
    log::info!("imported {count} blocks from backup");
    Ok(count)
}

/// Writes the snapshot to `output_path`, or to stdout when piped, or to
/// a timestamped file in the working directory.
pub fn write_backup(store: &dyn BlockStore, output_path: Option<PathBuf>) -> Result<PathBuf, BackupError> {
    let payload = export_data(store)?;

    let path = match output_path {
        Some(p) => p,
        None if !io::stdout().is_terminal() => {
            io::stdout().lock().write_all(payload.as_bytes())?;
            return Ok(PathBuf::from("-"));
        }
        None => {
            let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S");
            PathBuf::from(format!("weekly-backup-{timestamp}.json"))
        }
    };

    std::fs::write(&path, payload)?;
    Ok(path)
}

/// Reads a snapshot from `path`, or from stdin when piped.
pub fn read_backup_text(path: Option<&Path>) -> Result<String, BackupError> {
    match path {
        Some(p) => Ok(std::fs::read_to_string(p)?),
        None if !io::stdin().is_terminal() => {
            let mut text = String::new();
            io::Read::read_to_string(&mut io::stdin().lock(), &mut text)?;
            Ok(text)
        }
        None => Err(BackupError::Validation(
            "no backup path given and stdin is a terminal".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{BackendJson, BlockKind};
    use crate::scope::{Scope, ScopeType};
    use tempfile::TempDir;

    fn store_with_blocks() -> (BackendJson, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = BackendJson::load(&dir.path().join("blocks.json")).unwrap();

        let mut journal = Block::new(
            Scope::new(ScopeType::Day, "2025-01-01").unwrap(),
            BlockKind::DailyJournal,
            Some("Journal"),
        );
        journal.content = Some("día uno".to_string());
        store.upsert(journal).unwrap();
        store
            .upsert(Block::new(
                Scope::new(ScopeType::Week, "2025-W01").unwrap(),
                BlockKind::WeeklyTodo,
                Some("Weekly Tasks"),
            ))
            .unwrap();

        (store, dir)
    }

    #[test]
    fn round_trip_reproduces_identical_set() {
        let (source, _dir) = store_with_blocks();
        let text = export_data(&source).unwrap();

        let dir = TempDir::new().unwrap();
        let target = BackendJson::load(&dir.path().join("blocks.json")).unwrap();
        let count = import_data(&target, &text).unwrap();

        assert_eq!(count, 2);
        let mut original = source.all();
        let mut restored = target.all();
        original.sort_by(|a, b| a.id.cmp(&b.id));
        restored.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(original, restored);

        // importing again duplicates nothing
        import_data(&target, &text).unwrap();
        assert_eq!(target.total(), 2);
    }

    #[test]
    fn export_carries_version_and_timestamp() {
        let (store, _dir) = store_with_blocks();
        let text = export_data(&store).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["version"], 1);
        assert!(value["timestamp"].is_string());
        assert_eq!(value["blocks"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn import_rejects_missing_or_wrong_typed_blocks() {
        let dir = TempDir::new().unwrap();
        let store = BackendJson::load(&dir.path().join("blocks.json")).unwrap();

        for bad in [
            "not json at all",
            r#"{"version": 1}"#,
            r#"{"version": 1, "blocks": "nope"}"#,
            r#"{"version": 1, "blocks": 42}"#,
        ] {
            let err = import_data(&store, bad).unwrap_err();
            assert!(matches!(err, BackupError::Validation(_)), "{bad}");
        }
        assert_eq!(store.total(), 0);
    }

    #[test]
    fn import_rejects_unknown_kind_wholesale() {
        let dir = TempDir::new().unwrap();
        let store = BackendJson::load(&dir.path().join("blocks.json")).unwrap();

        let text = r#"{
            "version": 1,
            "timestamp": "2025-01-01T00:00:00Z",
            "blocks": [{
                "id": "01JFAKEID0000000000000000",
                "scope": {"type": "day", "id": "2025-01-01"},
                "kind": "mystery-kind",
                "createdAt": "2025-01-01T00:00:00Z",
                "updatedAt": "2025-01-01T00:00:00Z"
            }]
        }"#;

        assert!(matches!(
            import_data(&store, text),
            Err(BackupError::Validation(_))
        ));
        assert_eq!(store.total(), 0);
    }
}
