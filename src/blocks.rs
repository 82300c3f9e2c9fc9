use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{
    collections::HashSet,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
    time::Instant,
};
use thiserror::Error;

use chrono::{DateTime, Utc};

use crate::events::{ChangeBus, ChangeEvent};
use crate::id::BlockId;
use crate::scope::{Scope, ScopeType};
use crate::search_text::{derive_search_text, normalize};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("block {0} not found")]
    NotFound(BlockId),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed block database: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Closed set of block roles. Every dispatch over kinds is an exhaustive
/// match; a record with an unknown tag fails deserialization instead of
/// flowing through as a catch-all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockKind {
    DailyChecklist,
    DailyTodo,
    DailyJournal,
    DailyHabits,
    DailySummaryPublic,
    DailySummaryPrivate,
    WeeklyJournal,
    ImportantConcepts,
    WeeklyTodo,
    WeeklySummary,
    MonthlySummary,
    MetaUpdate,
    Games,
    YearlyGoals,
    YearlySummary,
}

impl BlockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockKind::DailyChecklist => "daily-checklist",
            BlockKind::DailyTodo => "daily-todo",
            BlockKind::DailyJournal => "daily-journal",
            BlockKind::DailyHabits => "daily-habits",
            BlockKind::DailySummaryPublic => "daily-summary-public",
            BlockKind::DailySummaryPrivate => "daily-summary-private",
            BlockKind::WeeklyJournal => "weekly-journal",
            BlockKind::ImportantConcepts => "important-concepts",
            BlockKind::WeeklyTodo => "weekly-todo",
            BlockKind::WeeklySummary => "weekly-summary",
            BlockKind::MonthlySummary => "monthly-summary",
            BlockKind::MetaUpdate => "meta-update",
            BlockKind::Games => "games",
            BlockKind::YearlyGoals => "yearly-goals",
            BlockKind::YearlySummary => "yearly-summary",
        }
    }
}

impl std::fmt::Display for BlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BlockKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily-checklist" => Ok(BlockKind::DailyChecklist),
            "daily-todo" => Ok(BlockKind::DailyTodo),
            "daily-journal" => Ok(BlockKind::DailyJournal),
            "daily-habits" => Ok(BlockKind::DailyHabits),
            "daily-summary-public" => Ok(BlockKind::DailySummaryPublic),
            "daily-summary-private" => Ok(BlockKind::DailySummaryPrivate),
            "weekly-journal" => Ok(BlockKind::WeeklyJournal),
            "important-concepts" => Ok(BlockKind::ImportantConcepts),
            "weekly-todo" => Ok(BlockKind::WeeklyTodo),
            "weekly-summary" => Ok(BlockKind::WeeklySummary),
            "monthly-summary" => Ok(BlockKind::MonthlySummary),
            "meta-update" => Ok(BlockKind::MetaUpdate),
            "games" => Ok(BlockKind::Games),
            "yearly-goals" => Ok(BlockKind::YearlyGoals),
            "yearly-summary" => Ok(BlockKind::YearlySummary),
            other => Err(format!("unknown block kind {other:?}")),
        }
    }
}

/// Blocks every scope of a given type is backfilled with on first access,
/// paired with their display titles.
pub fn required_kinds(scope_type: ScopeType) -> &'static [(BlockKind, &'static str)] {
    match scope_type {
        ScopeType::Day => &[
            (BlockKind::DailyHabits, "Daily Habits"),
            (BlockKind::DailyChecklist, "Daily Routine"),
            (BlockKind::DailyTodo, "Tasks"),
            (BlockKind::DailyJournal, "Journal"),
        ],
        ScopeType::Week => &[
            (BlockKind::WeeklyJournal, "Weekly Journal"),
            (BlockKind::WeeklyTodo, "Weekly Tasks"),
            (BlockKind::ImportantConcepts, "Important Concepts"),
            (BlockKind::MetaUpdate, "Meta / Updates"),
            (BlockKind::Games, "Games Played"),
        ],
        // months hold only generated summaries, nothing is backfilled
        ScopeType::Month => &[],
        ScopeType::Year => &[
            (BlockKind::YearlySummary, "Yearly Summary"),
            (BlockKind::YearlyGoals, "Yearly Goals"),
        ],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentBlockKind {
    Text,
    BulletList,
    Quote,
    InlineTag,
}

/// One entry of a block's `items` sequence. Checklist/task completion is
/// encoded by a `"DONE: "` prefix on `text`, not a separate flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    pub id: String,
    pub kind: ContentBlockKind,
    pub text: String,
}

pub const DONE_PREFIX: &str = "DONE: ";

impl ContentBlock {
    pub fn text(text: &str) -> ContentBlock {
        ContentBlock {
            id: BlockId::new().to_string(),
            kind: ContentBlockKind::Text,
            text: text.to_string(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.text.starts_with(DONE_PREFIX)
    }

    /// The text without its completion prefix.
    pub fn label(&self) -> &str {
        self.text.strip_prefix(DONE_PREFIX).unwrap_or(&self.text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub id: BlockId,
    pub scope: Scope,
    pub kind: BlockKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default)]
    pub items: Vec<ContentBlock>,
    #[serde(default)]
    pub data: Map<String, Value>,

    /// Derived; always equals `derive_search_text` over the fields above.
    #[serde(default)]
    pub search_text: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Block {
    /// A fresh, empty block for a scope, as backfill creates it.
    pub fn new(scope: Scope, kind: BlockKind, title: Option<&str>) -> Block {
        let now = Utc::now();
        let mut block = Block {
            id: BlockId::new(),
            scope,
            kind,
            title: title.map(|t| t.to_string()),
            content: None,
            items: Vec::new(),
            data: Map::new(),
            search_text: String::new(),
            created_at: now,
            updated_at: now,
        };
        block.search_text = derive_search_text(&block);
        block
    }

    fn change_event(&self) -> ChangeEvent {
        ChangeEvent {
            scope_type: self.scope.scope_type,
            scope_id: self.scope.id.clone(),
            kind: self.kind,
        }
    }
}

/// Partial update; unset fields keep their stored values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BlockUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<ContentBlock>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
}

pub trait BlockStore: Send + Sync {
    /// Returns the blocks of `scope`, guaranteeing exactly one per
    /// required kind: missing kinds are backfilled, duplicate kinds are
    /// deleted with the oldest block winning. Safe to call repeatedly;
    /// concurrent first visits may both create, the next call converges.
    fn ensure_scope_blocks(
        &self,
        scope: &Scope,
        required: &[(BlockKind, &str)],
    ) -> Result<Vec<Block>, StoreError>;

    /// Merges `update` into the stored block, recomputes the search text
    /// and stamps `updated_at`.
    fn update(&self, id: &BlockId, update: BlockUpdate) -> Result<Block, StoreError>;

    /// Stores the block verbatim, replacing any block with the same id.
    fn upsert(&self, block: Block) -> Result<(), StoreError>;

    /// Verbatim bulk upsert in one transaction.
    fn upsert_many(&self, blocks: Vec<Block>) -> Result<usize, StoreError>;

    fn get(&self, id: &BlockId) -> Option<Block>;
    fn by_scope(&self, scope_type: ScopeType, scope_id: &str) -> Vec<Block>;
    fn by_kind(&self, kind: BlockKind) -> Vec<Block>;
    fn all(&self) -> Vec<Block>;
    fn total(&self) -> usize;

    /// Substring match over the precomputed normalized search text.
    /// Deliberately unranked.
    fn search_keyword(&self, query: &str) -> Vec<Block>;

    fn events(&self) -> &ChangeBus;
}

#[derive(Debug, Clone, Default)]
pub struct BackendJson {
    list: Arc<RwLock<Vec<Block>>>,
    path: PathBuf,
    bus: Arc<ChangeBus>,
}

impl BackendJson {
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        if let Err(err) = std::fs::metadata(path) {
            match err.kind() {
                ErrorKind::NotFound => {
                    log::info!("creating new block database at {}", path.display());
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(path, b"[]")?;
                }
                _ => Err(err)?,
            }
        }

        let now = Instant::now();
        let raw = std::fs::read_to_string(path)?;
        let blocks: Vec<Block> = serde_json::from_str(&raw)?;

        log::debug!(
            "took {}ms to read {} blocks",
            now.elapsed().as_micros() as f64 / 1000.0,
            blocks.len()
        );

        Ok(BackendJson {
            list: Arc::new(RwLock::new(blocks)),
            path: path.to_path_buf(),
            bus: Arc::new(ChangeBus::new()),
        })
    }

    /// Serializes the full set to a ULID-named temp file, then renames
    /// over the database. Callers hold the write lock across mutate +
    /// persist so a transaction commits as one unit.
    fn persist(&self, blocks: &[Block]) -> Result<(), StoreError> {
        let payload = serde_json::to_string_pretty(blocks)?;
        let temp_path = self.path.with_extension(format!("{}.tmp", BlockId::new()));
        std::fs::write(&temp_path, payload)?;
        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

impl BlockStore for BackendJson {
    fn ensure_scope_blocks(
        &self,
        scope: &Scope,
        required: &[(BlockKind, &str)],
    ) -> Result<Vec<Block>, StoreError> {
        let mut blocks = self.list.write().unwrap();

        // fetch existing, oldest first so dedup keeps the oldest
        let mut existing: Vec<Block> = blocks
            .iter()
            .filter(|b| b.scope == *scope)
            .cloned()
            .collect();
        existing.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        let present: HashSet<BlockKind> = existing.iter().map(|b| b.kind).collect();
        let synthesized: Vec<Block> = required
            .iter()
            .filter(|(kind, _)| !present.contains(kind))
            .map(|(kind, title)| Block::new(scope.clone(), *kind, Some(title)))
            .collect();

        // walk existing first; later blocks of an already-seen kind lose
        let mut seen: HashSet<BlockKind> = HashSet::new();
        let mut keep: Vec<Block> = Vec::new();
        let mut dropped: Vec<Block> = Vec::new();
        for block in existing.into_iter().chain(synthesized) {
            if seen.insert(block.kind) {
                keep.push(block);
            } else {
                dropped.push(block);
            }
        }

        let created: Vec<Block> = keep
            .iter()
            .filter(|b| !blocks.iter().any(|stored| stored.id == b.id))
            .cloned()
            .collect();

        if created.is_empty() && dropped.is_empty() {
            return Ok(keep);
        }

        for gone in &dropped {
            log::info!(
                "removing duplicate {} block {} from {}",
                gone.kind,
                gone.id,
                scope
            );
        }
        blocks.retain(|b| !dropped.iter().any(|gone| gone.id == b.id));
        blocks.extend(created.iter().cloned());
        self.persist(&blocks)?;
        drop(blocks);

        for block in created.iter().chain(dropped.iter()) {
            self.bus.publish(block.change_event());
        }

        Ok(keep)
    }

    fn update(&self, id: &BlockId, update: BlockUpdate) -> Result<Block, StoreError> {
        let mut blocks = self.list.write().unwrap();

        let idx = blocks
            .iter()
            .position(|b| b.id == *id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        let block = &mut blocks[idx];
        if let Some(title) = update.title {
            block.title = Some(title);
        }
        if let Some(content) = update.content {
            block.content = Some(content);
        }
        if let Some(items) = update.items {
            block.items = items;
        }
        if let Some(data) = update.data {
            block.data = data;
        }
        block.search_text = derive_search_text(block);
        block.updated_at = Utc::now();

        let result = block.clone();
        self.persist(&blocks)?;
        drop(blocks);

        self.bus.publish(result.change_event());

        Ok(result)
    }

    fn upsert(&self, block: Block) -> Result<(), StoreError> {
        let mut blocks = self.list.write().unwrap();

        let event = block.change_event();
        match blocks.iter().position(|b| b.id == block.id) {
            Some(idx) => blocks[idx] = block,
            None => blocks.push(block),
        }
        self.persist(&blocks)?;
        drop(blocks);

        self.bus.publish(event);

        Ok(())
    }

    fn upsert_many(&self, incoming: Vec<Block>) -> Result<usize, StoreError> {
        if incoming.is_empty() {
            return Ok(0);
        }

        let mut blocks = self.list.write().unwrap();

        let count = incoming.len();
        let mut events = Vec::with_capacity(count);
        for block in incoming {
            events.push(block.change_event());
            match blocks.iter().position(|b| b.id == block.id) {
                Some(idx) => blocks[idx] = block,
                None => blocks.push(block),
            }
        }
        self.persist(&blocks)?;
        drop(blocks);

        for event in events {
            self.bus.publish(event);
        }

        Ok(count)
    }

    fn get(&self, id: &BlockId) -> Option<Block> {
        self.list
            .read()
            .unwrap()
            .iter()
            .find(|b| b.id == *id)
            .cloned()
    }

    fn by_scope(&self, scope_type: ScopeType, scope_id: &str) -> Vec<Block> {
        self.list
            .read()
            .unwrap()
            .iter()
            .filter(|b| b.scope.scope_type == scope_type && b.scope.id == scope_id)
            .cloned()
            .collect()
    }

    fn by_kind(&self, kind: BlockKind) -> Vec<Block> {
        self.list
            .read()
            .unwrap()
            .iter()
            .filter(|b| b.kind == kind)
            .cloned()
            .collect()
    }

    fn all(&self) -> Vec<Block> {
        self.list.read().unwrap().clone()
    }

    fn total(&self) -> usize {
        self.list.read().unwrap().len()
    }

    fn search_keyword(&self, query: &str) -> Vec<Block> {
        let needle = normalize(query.trim());
        if needle.is_empty() {
            return Vec::new();
        }

        self.list
            .read()
            .unwrap()
            .iter()
            .filter(|b| b.search_text.contains(&needle))
            .cloned()
            .collect()
    }

    fn events(&self) -> &ChangeBus {
        &self.bus
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_strings_round_trip() {
        for kind in [
            BlockKind::DailyChecklist,
            BlockKind::DailyTodo,
            BlockKind::DailyJournal,
            BlockKind::DailyHabits,
            BlockKind::DailySummaryPublic,
            BlockKind::DailySummaryPrivate,
            BlockKind::WeeklyJournal,
            BlockKind::ImportantConcepts,
            BlockKind::WeeklyTodo,
            BlockKind::WeeklySummary,
            BlockKind::MonthlySummary,
            BlockKind::MetaUpdate,
            BlockKind::Games,
            BlockKind::YearlyGoals,
            BlockKind::YearlySummary,
        ] {
            assert_eq!(kind.as_str().parse::<BlockKind>().unwrap(), kind);
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
        assert!("day-journal".parse::<BlockKind>().is_err());
    }

    #[test]
    fn new_block_is_empty_with_derived_search_text() {
        let scope = Scope::new(ScopeType::Day, "2025-01-01").unwrap();
        let block = Block::new(scope.clone(), BlockKind::DailyHabits, Some("Daily Habits"));

        assert_eq!(block.scope, scope);
        assert!(block.content.is_none());
        assert!(block.items.is_empty());
        assert!(block.data.is_empty());
        assert_eq!(block.search_text, "daily habits");
        assert_eq!(block.created_at, block.updated_at);
    }

    #[test]
    fn done_prefix_convention() {
        let open = ContentBlock::text("water the plants");
        let done = ContentBlock::text("DONE: water the plants");

        assert!(!open.is_done());
        assert!(done.is_done());
        assert_eq!(done.label(), "water the plants");
        assert_eq!(open.label(), "water the plants");
    }

    #[test]
    fn block_serializes_camel_case() {
        let block = Block::new(
            Scope::new(ScopeType::Week, "2025-W01").unwrap(),
            BlockKind::WeeklyTodo,
            Some("Weekly Tasks"),
        );
        let json = serde_json::to_string(&block).unwrap();
        assert!(json.contains("\"searchText\""));
        assert!(json.contains("\"createdAt\""));
        assert!(json.contains("\"kind\":\"weekly-todo\""));
        assert!(json.contains("\"type\":\"week\""));
    }
}
