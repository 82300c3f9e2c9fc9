use std::sync::Arc;

use crate::ai::docs::DocumentStore;
use crate::ai::provider::{Embedder, ProviderError};
use crate::ai::retrieval::{RetrievalEngine, SearchFilters};
use crate::ai::{IndexOutcome, SemanticIndexer, DAY_CONTEXT_KIND};
use crate::blocks::{BackendJson, Block, BlockKind, BlockStore, ContentBlock};
use crate::scope::{Scope, ScopeType};
use crate::tests::store::create_store;

/// Keyword-counting embedder: deterministic, and similar texts really
/// do score closer, so retrieval ordering is meaningful in tests.
struct KeywordEmbedder;

const AXES: [&str; 3] = ["running", "cooking", "reading"];

impl Embedder for KeywordEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let lower = text.to_lowercase();
        let mut vector: Vec<f32> = AXES
            .iter()
            .map(|axis| lower.matches(axis).count() as f32)
            .collect();
        // keep every vector off the origin
        vector.push(0.1);
        Ok(vector)
    }
}

fn semantic_fixture() -> (
    Arc<BackendJson>,
    DocumentStore,
    SemanticIndexer,
    RetrievalEngine,
    tempfile::TempDir,
) {
    let (store, tmp) = create_store();
    let docs = DocumentStore::load(&tmp.path().join("documents.json")).unwrap();
    let embedder = Arc::new(KeywordEmbedder);
    let indexer = SemanticIndexer::new(store.clone(), docs.clone(), embedder.clone(), "bge-m3");
    let retrieval = RetrievalEngine::new(docs.clone(), embedder);
    (store, docs, indexer, retrieval, tmp)
}

fn block_with_content(scope: Scope, kind: BlockKind, content: &str) -> Block {
    let mut block = Block::new(scope, kind, None);
    block.content = Some(content.to_string());
    block
}

#[test]
fn indexed_journals_are_recalled_only_with_private_opt_in() {
    let (store, _docs, indexer, retrieval, _tmp) = semantic_fixture();

    store
        .upsert(block_with_content(
            Scope::new(ScopeType::Day, "2025-03-01").unwrap(),
            BlockKind::DailyJournal,
            "went running by the river, best run in weeks",
        ))
        .unwrap();
    store
        .upsert(block_with_content(
            Scope::new(ScopeType::Day, "2025-03-02").unwrap(),
            BlockKind::DailySummaryPublic,
            "spent the evening cooking a big dinner",
        ))
        .unwrap();
    indexer.reindex_all();

    let public = retrieval
        .search("running", &SearchFilters::default(), 10)
        .unwrap();
    assert!(public.iter().all(|r| !r.doc.metadata.is_private));
    assert!(public.iter().all(|r| r.doc.kind != "daily-journal"));

    let private = retrieval
        .search(
            "running",
            &SearchFilters {
                include_private: true,
                ..Default::default()
            },
            10,
        )
        .unwrap();
    assert_eq!(private[0].doc.kind, "daily-journal");
}

#[test]
fn full_reindex_builds_block_and_day_context_documents() {
    let (store, docs, indexer, _retrieval, _tmp) = semantic_fixture();
    let scope = Scope::new(ScopeType::Day, "2025-03-01").unwrap();

    let summary = block_with_content(
        scope.clone(),
        BlockKind::DailySummaryPublic,
        "a calm day of reading and cooking",
    );
    let summary_id = summary.id.clone();
    store.upsert(summary).unwrap();

    let mut todo = Block::new(scope.clone(), BlockKind::DailyTodo, None);
    todo.items.push(ContentBlock::text("DONE: go running"));
    store.upsert(todo).unwrap();

    let report = indexer.reindex_all();
    assert_eq!(report.indexed, 2);
    assert_eq!(report.failed, 0);

    assert!(docs.get(summary_id.as_str()).is_some());
    let context = docs.get("day-context-2025-03-01").unwrap();
    assert_eq!(context.kind, DAY_CONTEXT_KIND);
    assert!(!context.metadata.is_private);
    assert!(context.text.contains("go running"));
}

#[test]
fn short_content_never_reaches_the_corpus() {
    let (store, docs, indexer, _retrieval, _tmp) = semantic_fixture();

    let block = block_with_content(
        Scope::new(ScopeType::Day, "2025-03-01").unwrap(),
        BlockKind::DailyJournal,
        "hi :)",
    );
    store.upsert(block.clone()).unwrap();

    assert_eq!(indexer.index_block(&block).unwrap(), IndexOutcome::Skipped);
    assert!(docs.is_empty());
}

#[test]
fn summary_outranks_equal_raw_journal() {
    let (store, _docs, indexer, retrieval, _tmp) = semantic_fixture();

    // identical content: identical raw cosine, so only the boost
    // separates them
    let text = "a week full of running and more running";
    store
        .upsert(block_with_content(
            Scope::new(ScopeType::Week, "2025-W10").unwrap(),
            BlockKind::WeeklyJournal,
            text,
        ))
        .unwrap();
    store
        .upsert(block_with_content(
            Scope::new(ScopeType::Week, "2025-W10").unwrap(),
            BlockKind::WeeklySummary,
            text,
        ))
        .unwrap();
    indexer.reindex_all();

    let results = retrieval
        .search(
            "running",
            &SearchFilters {
                include_private: true,
                ..Default::default()
            },
            10,
        )
        .unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].doc.kind, "weekly-summary");
    assert!(results[0].score > results[1].score);
}

#[test]
fn editing_a_block_and_reindexing_replaces_its_document() {
    let (store, docs, indexer, _retrieval, _tmp) = semantic_fixture();

    let block = block_with_content(
        Scope::new(ScopeType::Day, "2025-03-01").unwrap(),
        BlockKind::DailyJournal,
        "first version about cooking",
    );
    let id = block.id.clone();
    store.upsert(block).unwrap();
    indexer.reindex_all();

    store
        .update(
            &id,
            crate::blocks::BlockUpdate {
                content: Some("second version about reading".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    indexer.reindex_all();

    let doc = docs.get(id.as_str()).unwrap();
    assert!(doc.text.contains("second version"));
    assert_eq!(
        docs.all().iter().filter(|d| d.id == *id.as_str()).count(),
        1
    );
}
