//! Application wiring and the operations that span components:
//! summary generation, retrieval-augmented question answering, sync
//! construction and background indexing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc, Weekday};
use serde_json::json;

use crate::ai::context::{flatten_day_private, flatten_day_public, flatten_month, flatten_week};
use crate::ai::{
    completer_for, embedder_for, Completer, CompletionRequest, DocumentStore, Embedder,
    RetrievalEngine, ScoredDocument, SearchFilters, SemanticIndexer,
};
use crate::auth::SessionStore;
use crate::blocks::{BackendJson, Block, BlockKind, BlockStore, required_kinds};
use crate::config::Config;
use crate::scope::{Scope, ScopeType};
use crate::search_text::derive_search_text;
use crate::storage::BackendLocal;
use crate::sync::{HttpRemote, SyncReconciler};

const BLOCKS_FILE: &str = "blocks.json";
const DOCUMENTS_FILE: &str = "documents.json";

const PROMPT_DAILY_PUBLIC: &str = "You are a personal assistant writing a short public daily \
summary from the user's logged habits and tasks. You never see raw journal text. Write 2-4 \
matter-of-fact sentences about what was achieved and the day's stats. Do not invent events.";

const PROMPT_DAILY_PRIVATE: &str = "You are a personal assistant writing a private daily summary \
from the user's journal and daily data. Write a 5-10 line abstract focused on the narrative of \
the day: feelings, insights, struggles and wins. Keep the essence so the user recalls the day \
from this text alone.";

const PROMPT_WEEKLY: &str = "You are an analyst writing a weekly summary from the user's daily \
summaries and weekly goals. Write a 150-300 word narrative of the week. Identify patterns and \
themes; synthesize rather than listing days.";

const PROMPT_MONTHLY: &str = "You are a strategic advisor writing a monthly summary from the \
user's weekly summaries. Write a 200-400 word review focused on long-term progress: recurring \
struggles, trajectory, and what this month represented.";

const PROMPT_ASK: &str = "You are a helpful, concise life assistant. Answer the user's question \
from the provided journal context when it is relevant, and say so when it is not.";

/// Whose eyes the generated text is for. Private admits journal text
/// and private summaries into the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Public,
    Private,
}

pub struct Answer {
    pub text: String,
    pub evidence: Vec<ScoredDocument>,
}

pub struct App {
    pub config: Config,
    pub store: Arc<BackendJson>,
    pub docs: DocumentStore,
    pub sessions: SessionStore,
    embedder: Arc<dyn Embedder>,
}

impl App {
    /// Wires every component from the config's base directory.
    pub fn open(config: Config) -> Result<App> {
        let base = config.base_path();
        let store = Arc::new(
            BackendJson::load(&base.join(BLOCKS_FILE)).context("failed to open block database")?,
        );
        let docs = DocumentStore::load(&base.join(DOCUMENTS_FILE))
            .context("failed to open document database")?;
        let storage =
            Arc::new(BackendLocal::new(base).context("failed to open application directory")?);
        let sessions = SessionStore::new(storage);
        let embedder = embedder_for(&config.ai);

        Ok(App {
            config,
            store,
            docs,
            sessions,
            embedder,
        })
    }

    pub fn store(&self) -> Arc<dyn BlockStore> {
        self.store.clone()
    }

    /// Backfilled, deduplicated blocks for a scope.
    pub fn ensure_scope(&self, scope: &Scope) -> Result<Vec<Block>> {
        Ok(self
            .store
            .ensure_scope_blocks(scope, required_kinds(scope.scope_type))?)
    }

    pub fn indexer(&self) -> SemanticIndexer {
        SemanticIndexer::new(
            self.store(),
            self.docs.clone(),
            self.embedder.clone(),
            &self.config.ai.embedding_model,
        )
    }

    pub fn retrieval(&self) -> RetrievalEngine {
        RetrievalEngine::new(self.docs.clone(), self.embedder.clone())
    }

    fn completer(&self) -> Result<Box<dyn Completer>> {
        Ok(completer_for(&self.config.ai, self.config.openrouter_key())?)
    }

    /// Sync against the configured remote, as the stored session's
    /// identity. Errors when sync is not configured; an absent session
    /// makes the reconciler a no-op instead.
    pub fn reconciler(&self) -> Result<SyncReconciler> {
        let url = self
            .config
            .sync
            .url
            .as_deref()
            .context("sync.url is not configured")?;
        let api_key = self
            .config
            .sync
            .api_key
            .as_deref()
            .context("sync.api_key is not configured")?;

        let session = self.sessions.load();
        let token = session
            .as_ref()
            .map(|s| s.access_token.clone())
            .unwrap_or_default();
        let remote = Arc::new(HttpRemote::new(url, api_key, &token));
        Ok(SyncReconciler::new(self.store(), remote, session))
    }

    /// Generates the summary block for a scope and stores it, reusing
    /// the existing block's identity when one is already there.
    pub fn generate_summary(&self, scope: &Scope, audience: Audience) -> Result<Block> {
        let (kind, system) = match (scope.scope_type, audience) {
            (ScopeType::Day, Audience::Public) => (BlockKind::DailySummaryPublic, PROMPT_DAILY_PUBLIC),
            (ScopeType::Day, Audience::Private) => {
                (BlockKind::DailySummaryPrivate, PROMPT_DAILY_PRIVATE)
            }
            (ScopeType::Week, _) => (BlockKind::WeeklySummary, PROMPT_WEEKLY),
            (ScopeType::Month, _) => (BlockKind::MonthlySummary, PROMPT_MONTHLY),
            (ScopeType::Year, _) => bail!("yearly summaries are written by hand, not generated"),
        };

        let source_blocks = self.summary_sources(scope)?;
        let text = match (scope.scope_type, audience) {
            (ScopeType::Day, Audience::Public) => flatten_day_public(&source_blocks),
            (ScopeType::Day, Audience::Private) => flatten_day_private(&source_blocks),
            (ScopeType::Week, audience) => {
                flatten_week(&source_blocks, audience == Audience::Private)
            }
            (ScopeType::Month, _) => flatten_month(&source_blocks),
            (ScopeType::Year, _) => unreachable!(),
        };
        let Some(text) = text else {
            bail!("nothing to summarize for {scope}");
        };

        let completer = self.completer()?;
        let content = completer.complete(&CompletionRequest {
            prompt: text,
            system: Some(system.to_string()),
            temperature: self.config.ai.temperature,
        })?;

        // reuse identity of an existing summary block for this scope
        let existing = self
            .store
            .by_scope(scope.scope_type, &scope.id)
            .into_iter()
            .find(|b| b.kind == kind);

        let mut block = match existing {
            Some(block) => block,
            None => Block::new(scope.clone(), kind, None),
        };
        block.content = Some(content);
        block.data.insert(
            "sourceBlockIds".into(),
            json!(source_blocks
                .iter()
                .map(|b| b.id.to_string())
                .collect::<Vec<_>>()),
        );
        block
            .data
            .insert("generatedAt".into(), json!(Utc::now().to_rfc3339()));
        block
            .data
            .insert("model".into(), json!(completer.model_name()));
        block
            .data
            .insert("provider".into(), json!(completer.provider_name()));
        block.search_text = derive_search_text(&block);
        block.updated_at = Utc::now();

        self.store.upsert(block.clone())?;
        Ok(block)
    }

    /// The blocks a scope's summary is built from: the scope's own
    /// blocks plus, for weeks and months, the child scopes' summaries.
    fn summary_sources(&self, scope: &Scope) -> Result<Vec<Block>> {
        let mut blocks = self.store.by_scope(scope.scope_type, &scope.id);

        match scope.scope_type {
            ScopeType::Day | ScopeType::Year => {}
            ScopeType::Week => {
                for day in week_days(&scope.id)? {
                    blocks.extend(self.store.by_scope(ScopeType::Day, &Scope::day_of(day).id));
                }
            }
            ScopeType::Month => {
                for week_id in month_weeks(&scope.id)? {
                    blocks.extend(self.store.by_scope(ScopeType::Week, &week_id));
                }
            }
        }
        Ok(blocks)
    }

    /// Retrieval-augmented answer: recall the best-matching documents,
    /// hand them to the completion provider as context, return the
    /// answer with its evidence.
    pub fn ask(&self, question: &str, include_private: bool, top_k: usize) -> Result<Answer> {
        let filters = SearchFilters {
            include_private,
            date_range: None,
        };
        let evidence = self.retrieval().search(question, &filters, top_k)?;

        let prompt = if evidence.is_empty() {
            question.to_string()
        } else {
            let context = evidence
                .iter()
                .map(|r| format!("[{} - {}]: {}", r.doc.scope_id, r.doc.kind, r.doc.text))
                .collect::<Vec<_>>()
                .join("\n\n");
            format!("Question: {question}\n\nRelevant journal context:\n{context}")
        };

        let completer = self.completer()?;
        let text = completer.complete(&CompletionRequest {
            prompt,
            system: Some(PROMPT_ASK.to_string()),
            temperature: self.config.ai.temperature,
        })?;

        Ok(Answer { text, evidence })
    }

    /// Starts a worker that re-indexes summary/journal blocks as store
    /// commits announce them. Used by the interactive journal so typing
    /// never waits on an embedding request.
    pub fn spawn_index_worker(&self) -> IndexWorker {
        let rx = self.store.events().subscribe();
        let indexer = self.indexer();
        let store = self.store();
        let stop = Arc::new(AtomicBool::new(false));

        let handle = std::thread::spawn({
            let stop = stop.clone();
            move || loop {
                match rx.recv_timeout(Duration::from_millis(250)) {
                    Ok(event) => {
                        let block = store
                            .by_scope(event.scope_type, &event.scope_id)
                            .into_iter()
                            .find(|b| b.kind == event.kind);
                        if let Some(block) = block {
                            if let Err(err) = indexer.index_block(&block) {
                                log::warn!("background index of {} failed: {err}", block.id);
                            }
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        if stop.load(Ordering::Relaxed) {
                            return;
                        }
                    }
                    Err(RecvTimeoutError::Disconnected) => return,
                }
            }
        });

        IndexWorker {
            stop,
            handle: Some(handle),
        }
    }
}

pub struct IndexWorker {
    stop: Arc<AtomicBool>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl Drop for IndexWorker {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// The seven days of an ISO week id.
fn week_days(week_id: &str) -> Result<Vec<NaiveDate>> {
    let (year, week) = week_id
        .split_once("-W")
        .and_then(|(y, w)| Some((y.parse::<i32>().ok()?, w.parse::<u32>().ok()?)))
        .with_context(|| format!("malformed week id {week_id:?}"))?;
    let monday = NaiveDate::from_isoywd_opt(year, week, Weekday::Mon)
        .with_context(|| format!("week {week_id:?} does not exist"))?;
    Ok((0..7).map(|d| monday + chrono::Days::new(d)).collect())
}

/// The distinct ISO week ids overlapping a month id, in order.
fn month_weeks(month_id: &str) -> Result<Vec<String>> {
    let first = NaiveDate::parse_from_str(&format!("{month_id}-01"), "%Y-%m-%d")
        .with_context(|| format!("malformed month id {month_id:?}"))?;

    let mut weeks = Vec::new();
    let mut day = first;
    while day.format("%Y-%m").to_string() == month_id {
        let week_id = Scope::week_of(day).id;
        if weeks.last() != Some(&week_id) {
            weeks.push(week_id);
        }
        day = day + chrono::Days::new(1);
    }
    Ok(weeks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn week_days_cover_the_iso_week() {
        let days = week_days("2025-W01").unwrap();
        assert_eq!(days.len(), 7);
        // ISO week 1 of 2025 starts on Monday 2024-12-30
        assert_eq!(days[0].to_string(), "2024-12-30");
        assert_eq!(days[6].to_string(), "2025-01-05");

        assert!(week_days("2025-05").is_err());
    }

    #[test]
    fn month_weeks_are_distinct_and_ordered() {
        let weeks = month_weeks("2025-01").unwrap();
        assert_eq!(weeks.first().map(String::as_str), Some("2025-W01"));
        assert_eq!(weeks.last().map(String::as_str), Some("2025-W05"));
        let mut sorted = weeks.clone();
        sorted.dedup();
        assert_eq!(weeks, sorted);

        assert!(month_weeks("not-a-month").is_err());
    }
}
