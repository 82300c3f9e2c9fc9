//! Full-scan cosine retrieval over the document corpus.
//!
//! The corpus is assumed small enough (tens of thousands of rows) that
//! a linear scan beats maintaining an index structure. Query and
//! documents must share one embedding model; that is the caller's
//! contract and is not checked here.

use std::sync::Arc;

use crate::ai::docs::{AIDocument, DocumentStore};
use crate::ai::provider::{Embedder, ProviderError};
use crate::scope::ScopeType;

/// Bias toward higher-abstraction text over raw journal fragments.
const SUMMARY_BOOST: f32 = 1.25;

pub const DEFAULT_TOP_K: usize = 20;

#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub include_private: bool,
    /// Inclusive day-id bounds. Only day-scoped documents are bounded;
    /// other scope types pass unconditionally.
    pub date_range: Option<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub doc: AIDocument,
    pub score: f32,
}

pub struct RetrievalEngine {
    docs: DocumentStore,
    embedder: Arc<dyn Embedder>,
}

impl RetrievalEngine {
    pub fn new(docs: DocumentStore, embedder: Arc<dyn Embedder>) -> RetrievalEngine {
        RetrievalEngine { docs, embedder }
    }

    /// Embeds the query, scores every surviving candidate and returns
    /// the `top_k` best, descending. Ties keep corpus order.
    pub fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
        top_k: usize,
    ) -> Result<Vec<ScoredDocument>, ProviderError> {
        let query_embedding = self.embedder.embed(query)?;

        let candidates = self
            .docs
            .all()
            .into_iter()
            .filter(|doc| filters.include_private || !doc.metadata.is_private)
            .filter(|doc| match &filters.date_range {
                Some((start, end)) if doc.scope_type == ScopeType::Day => {
                    // day ids are zero-padded ISO dates, lexicographic
                    // comparison matches chronological order
                    doc.scope_id.as_str() >= start.as_str()
                        && doc.scope_id.as_str() <= end.as_str()
                }
                _ => true,
            });

        let mut scored: Vec<ScoredDocument> = candidates
            .map(|doc| {
                let mut score = cosine_similarity(&query_embedding, &doc.embedding);
                if doc.kind.contains("summary") {
                    score *= SUMMARY_BOOST;
                }
                ScoredDocument { doc, score }
            })
            .collect();

        // stable sort so equal scores preserve scan order
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }
}

/// `dot(a, b) / (‖a‖ · ‖b‖)`, with zero-norm vectors scoring 0 instead
/// of NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::docs::DocumentMetadata;
    use chrono::Utc;
    use tempfile::TempDir;

    struct AxisEmbedder;

    impl Embedder for AxisEmbedder {
        fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
            Ok(vec![1.0, 0.0])
        }
    }

    fn doc(id: &str, kind: &str, scope_id: &str, private: bool, embedding: Vec<f32>) -> AIDocument {
        AIDocument {
            id: id.to_string(),
            block_id: id.to_string(),
            scope_id: scope_id.to_string(),
            scope_type: if scope_id.contains('W') {
                ScopeType::Week
            } else {
                ScopeType::Day
            },
            kind: kind.to_string(),
            text: format!("text of {id}"),
            embedding,
            metadata: DocumentMetadata {
                is_private: private,
                generated_at: Utc::now(),
                model: "bge-m3".to_string(),
            },
        }
    }

    fn engine_with(docs_list: Vec<AIDocument>) -> (RetrievalEngine, TempDir) {
        let dir = TempDir::new().unwrap();
        let docs = DocumentStore::load(&dir.path().join("documents.json")).unwrap();
        for d in docs_list {
            docs.upsert(d).unwrap();
        }
        (RetrievalEngine::new(docs, Arc::new(AxisEmbedder)), dir)
    }

    #[test]
    fn cosine_guards_zero_norm() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn private_documents_never_surface_without_opt_in() {
        // the private doc has the best possible score
        let (engine, _dir) = engine_with(vec![
            doc("secret", "daily-journal", "2025-01-01", true, vec![1.0, 0.0]),
            doc("open", "day-context", "2025-01-01", false, vec![0.7, 0.7]),
        ]);

        let results = engine
            .search("q", &SearchFilters::default(), DEFAULT_TOP_K)
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].doc.id, "open");

        let filters = SearchFilters {
            include_private: true,
            ..Default::default()
        };
        let results = engine.search("q", &filters, DEFAULT_TOP_K).unwrap();
        assert_eq!(results[0].doc.id, "secret");
    }

    #[test]
    fn summary_boost_breaks_equal_raw_scores() {
        let (engine, _dir) = engine_with(vec![
            doc("raw", "daily-journal", "2025-01-01", false, vec![0.8, 0.2]),
            doc(
                "abstract",
                "weekly-summary",
                "2025-W01",
                false,
                vec![0.8, 0.2],
            ),
        ]);

        let filters = SearchFilters {
            include_private: true,
            ..Default::default()
        };
        let results = engine.search("q", &filters, DEFAULT_TOP_K).unwrap();
        assert_eq!(results[0].doc.id, "abstract");
        assert!(results[0].score > results[1].score);
    }

    #[test]
    fn date_range_bounds_day_documents_only() {
        let (engine, _dir) = engine_with(vec![
            doc("early", "day-context", "2025-01-01", false, vec![1.0, 0.0]),
            doc("inside", "day-context", "2025-01-15", false, vec![1.0, 0.0]),
            doc("late", "day-context", "2025-02-01", false, vec![1.0, 0.0]),
            doc("weekly", "weekly-summary", "2025-W30", false, vec![1.0, 0.0]),
        ]);

        let filters = SearchFilters {
            include_private: false,
            date_range: Some(("2025-01-10".to_string(), "2025-01-31".to_string())),
        };
        let results = engine.search("q", &filters, DEFAULT_TOP_K).unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.doc.id.as_str()).collect();
        assert!(ids.contains(&"inside"));
        // non-day documents pass the range unconditionally
        assert!(ids.contains(&"weekly"));
        assert!(!ids.contains(&"early"));
        assert!(!ids.contains(&"late"));
    }

    #[test]
    fn ties_keep_scan_order_and_top_k_truncates() {
        let (engine, _dir) = engine_with(vec![
            doc("a", "day-context", "2025-01-01", false, vec![0.5, 0.5]),
            doc("b", "day-context", "2025-01-02", false, vec![0.5, 0.5]),
            doc("c", "day-context", "2025-01-03", false, vec![0.5, 0.5]),
        ]);

        let results = engine.search("q", &SearchFilters::default(), 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].doc.id, "a");
        assert_eq!(results[1].doc.id, "b");
    }
}
