//! Builds retrieval documents from blocks and per-day aggregates.
//!
//! Only summaries and journals carry enough standalone text to embed;
//! habits and tasks enter retrieval through the synthetic public
//! day-context document instead. Bulk reindexing is strictly
//! sequential, one embedding request in flight, and skips failed items
//! rather than aborting the batch.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;

use crate::ai::context::flatten_day_public;
use crate::ai::docs::{AIDocument, DocStoreError, DocumentMetadata, DocumentStore};
use crate::ai::provider::{Embedder, ProviderError};
use crate::ai::{DAY_CONTEXT_KIND, MIN_INDEX_CHARS};
use crate::blocks::{Block, BlockKind, BlockStore};
use crate::scope::ScopeType;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Docs(#[from] DocStoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    /// A document was embedded and upserted.
    Indexed,
    /// Nothing was written: wrong kind, or too little text.
    Skipped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReindexReport {
    pub indexed: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct SemanticIndexer {
    store: Arc<dyn BlockStore>,
    docs: DocumentStore,
    embedder: Arc<dyn Embedder>,
    model_name: String,
}

impl SemanticIndexer {
    pub fn new(
        store: Arc<dyn BlockStore>,
        docs: DocumentStore,
        embedder: Arc<dyn Embedder>,
        model_name: &str,
    ) -> SemanticIndexer {
        SemanticIndexer {
            store,
            docs,
            embedder,
            model_name: model_name.to_string(),
        }
    }

    /// Embeds one block's content into a document keyed by the block id.
    /// Only summary and journal kinds qualify; everything else is a
    /// no-op, as is content shorter than the indexing threshold.
    pub fn index_block(&self, block: &Block) -> Result<IndexOutcome, IndexError> {
        let is_private = match block.kind {
            BlockKind::DailySummaryPublic | BlockKind::WeeklySummary => false,
            BlockKind::DailySummaryPrivate | BlockKind::DailyJournal | BlockKind::WeeklyJournal => {
                true
            }
            BlockKind::DailyChecklist
            | BlockKind::DailyTodo
            | BlockKind::DailyHabits
            | BlockKind::ImportantConcepts
            | BlockKind::WeeklyTodo
            | BlockKind::MonthlySummary
            | BlockKind::MetaUpdate
            | BlockKind::Games
            | BlockKind::YearlyGoals
            | BlockKind::YearlySummary => return Ok(IndexOutcome::Skipped),
        };

        let text = block.content.as_deref().unwrap_or_default();
        if text.chars().count() < MIN_INDEX_CHARS {
            return Ok(IndexOutcome::Skipped);
        }

        let embedding = self.embedder.embed(text)?;
        self.docs.upsert(AIDocument {
            id: block.id.to_string(),
            block_id: block.id.to_string(),
            scope_id: block.scope.id.clone(),
            scope_type: block.scope.scope_type,
            kind: block.kind.as_str().to_string(),
            text: text.to_string(),
            embedding,
            metadata: DocumentMetadata {
                is_private,
                generated_at: Utc::now(),
                model: self.model_name.clone(),
            },
        })?;

        log::info!("indexed block {} ({})", block.id, block.kind);
        Ok(IndexOutcome::Indexed)
    }

    /// Embeds the public flatten of one day into a synthetic document
    /// keyed `day-context-<scopeId>`. Journal text never reaches this
    /// document, so it is always public.
    pub fn index_day_context(&self, scope_id: &str) -> Result<IndexOutcome, IndexError> {
        let blocks = self.store.by_scope(ScopeType::Day, scope_id);
        let Some(text) = flatten_day_public(&blocks) else {
            return Ok(IndexOutcome::Skipped);
        };

        let synthetic_id = format!("{DAY_CONTEXT_KIND}-{scope_id}");
        let embedding = self.embedder.embed(&text)?;
        self.docs.upsert(AIDocument {
            id: synthetic_id.clone(),
            block_id: synthetic_id,
            scope_id: scope_id.to_string(),
            scope_type: ScopeType::Day,
            kind: DAY_CONTEXT_KIND.to_string(),
            text,
            embedding,
            metadata: DocumentMetadata {
                is_private: false,
                generated_at: Utc::now(),
                model: self.model_name.clone(),
            },
        })?;

        log::info!("indexed day context for {scope_id}");
        Ok(IndexOutcome::Indexed)
    }

    /// Upper bound of items `reindex_all` will process; sizes the
    /// progress bar.
    pub fn planned_items(&self) -> usize {
        let blocks = self.store.all();
        let days: BTreeSet<&str> = blocks
            .iter()
            .filter(|b| b.scope.scope_type == ScopeType::Day)
            .map(|b| b.scope.id.as_str())
            .collect();
        blocks.len() + days.len()
    }

    pub fn reindex_all(&self) -> ReindexReport {
        self.reindex_all_with(|_| {})
    }

    /// Every block through `index_block`, then every distinct day scope
    /// through `index_day_context`. `tick` is called once per processed
    /// item with a short label. Per-item provider failures are logged
    /// and counted, never fatal to the batch.
    pub fn reindex_all_with<F: FnMut(&str)>(&self, mut tick: F) -> ReindexReport {
        let mut report = ReindexReport::default();
        let blocks = self.store.all();

        for block in &blocks {
            match self.index_block(block) {
                Ok(IndexOutcome::Indexed) => report.indexed += 1,
                Ok(IndexOutcome::Skipped) => report.skipped += 1,
                Err(err) => {
                    log::warn!("failed to index block {}: {err}", block.id);
                    report.failed += 1;
                }
            }
            tick(block.id.as_str());
        }

        let days: BTreeSet<String> = blocks
            .iter()
            .filter(|b| b.scope.scope_type == ScopeType::Day)
            .map(|b| b.scope.id.clone())
            .collect();

        for day in days {
            match self.index_day_context(&day) {
                Ok(IndexOutcome::Indexed) => report.indexed += 1,
                Ok(IndexOutcome::Skipped) => report.skipped += 1,
                Err(err) => {
                    log::warn!("failed to index day {day}: {err}");
                    report.failed += 1;
                }
            }
            tick(&day);
        }

        log::info!(
            "reindex complete: {} indexed, {} skipped, {} failed",
            report.indexed,
            report.skipped,
            report.failed
        );
        report
    }
}
