//! Semantic indexing, retrieval and text generation over blocks.
//!
//! Blocks stay the source of truth; this module derives disposable
//! document projections with embedding vectors and scores them for
//! recall. Generation (summaries, question answering) consumes the same
//! flatteners and providers.
//!
//! # Architecture
//!
//! - `provider`: embedding/completion capability traits and errors
//! - `ollama`: local daemon client (embeddings and completions)
//! - `openrouter`: cloud completion client with a bearer credential
//! - `docs`: derived document records and their JSON-file store
//! - `context`: flatteners turning a scope's blocks into plain text
//! - `indexer`: builds documents from blocks and per-day aggregates
//! - `retrieval`: full-scan cosine scoring with privacy/date filters

pub mod context;
pub mod docs;
pub mod indexer;
pub mod ollama;
pub mod openrouter;
pub mod provider;
pub mod retrieval;

pub use docs::{AIDocument, DocumentStore};
pub use indexer::{IndexOutcome, ReindexReport, SemanticIndexer};
pub use provider::{completer_for, embedder_for, Completer, CompletionRequest, Embedder, ProviderError};
pub use retrieval::{RetrievalEngine, ScoredDocument, SearchFilters};

/// Kind tag of synthetic per-day aggregate documents.
pub const DAY_CONTEXT_KIND: &str = "day-context";

/// Content shorter than this is not worth a vector.
pub const MIN_INDEX_CHARS: usize = 10;
