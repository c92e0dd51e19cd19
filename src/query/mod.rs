//! Query processing and ranking module.
//!
//! Embeds a query with the configured [`EmbeddingProvider`] and ranks every
//! publication in the corpus by cosine similarity. The corpus is small, so
//! this is an exact brute-force scan.
//!
//! # Usage
//!
//! ```rust,no_run
//! use bioquery::corpus::{CorpusCache, CorpusPaths, CorpusStore};
//! use bioquery::embedding::fastembed::FastEmbedProvider;
//! use bioquery::query::{BruteForceSearchEngine, SearchEngine};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let corpus = CorpusCache::new(CorpusStore::new(CorpusPaths::default()))
//!     .get_or_load()
//!     .await?;
//! let engine = BruteForceSearchEngine::new(FastEmbedProvider::new(None, None)?, corpus);
//!
//! for hit in engine.search("radiation effects on bone density", 5).await? {
//!     println!("{} - Score: {:.3}", hit.corpus_id, hit.score);
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use ndarray::ArrayView1;
use thiserror::Error;
use tracing::debug;

use crate::corpus::Corpus;
use crate::embedding::EmbeddingProvider;
use crate::models::SearchHit;

/// Number of hits returned when the caller does not say otherwise.
pub const DEFAULT_TOP_K: usize = 10;

/// Errors that can occur during query processing.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Query vector does not live in the corpus vector space
    #[error("Query embedding has {query} dimensions, corpus has {corpus}")]
    DimensionMismatch { query: usize, corpus: usize },
}

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Trait for search and ranking engines.
#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Rank the corpus against `query` and return at most `top_k` hits,
    /// highest score first.
    ///
    /// An empty or whitespace-only query returns no hits and is not an error.
    async fn search(&self, query: &str, top_k: usize) -> QueryResult<Vec<SearchHit>>;
}

/// Cosine similarity from a dot product and the two vector norms.
///
/// A zero norm on either side scores 0.0.
fn cosine_score(dot: f32, norm_a: f32, norm_b: f32) -> f32 {
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Score every corpus row against `query` and keep the best `top_k`.
///
/// Row norms come precomputed from the corpus. Sorting is stable, so rows with
/// equal scores stay in corpus order.
pub fn rank(corpus: &Corpus, query: &[f32], top_k: usize) -> QueryResult<Vec<SearchHit>> {
    if query.len() != corpus.dimension() {
        return Err(QueryError::DimensionMismatch {
            query: query.len(),
            corpus: corpus.dimension(),
        });
    }
    if top_k == 0 {
        return Ok(Vec::new());
    }

    let query_view = ArrayView1::from(query);
    let query_norm = query_view.dot(&query_view).sqrt();

    let mut hits: Vec<SearchHit> = corpus
        .embeddings()
        .rows()
        .into_iter()
        .zip(corpus.row_norms())
        .enumerate()
        .map(|(corpus_id, (row, &row_norm))| {
            SearchHit::new(corpus_id, cosine_score(row.dot(&query_view), query_norm, row_norm))
        })
        .collect();

    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits.truncate(top_k);
    Ok(hits)
}

/// Default brute-force search engine implementation.
pub struct BruteForceSearchEngine<E>
where
    E: EmbeddingProvider,
{
    /// Embedding provider for query embedding
    embedding_provider: E,

    /// Shared read-only corpus
    corpus: Arc<Corpus>,
}

impl<E> BruteForceSearchEngine<E>
where
    E: EmbeddingProvider,
{
    /// Create a new brute-force search engine.
    ///
    /// Callers are expected to have checked
    /// [`Corpus::ensure_compatible`] against `embedding_provider` already.
    pub fn new(embedding_provider: E, corpus: Arc<Corpus>) -> Self {
        Self {
            embedding_provider,
            corpus,
        }
    }

    pub fn corpus(&self) -> &Arc<Corpus> {
        &self.corpus
    }

    pub fn embedding_provider(&self) -> &E {
        &self.embedding_provider
    }
}

#[async_trait]
impl<E> SearchEngine for BruteForceSearchEngine<E>
where
    E: EmbeddingProvider,
{
    async fn search(&self, query: &str, top_k: usize) -> QueryResult<Vec<SearchHit>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        debug!(query, top_k, "Executing search");
        let query_embedding = self
            .embedding_provider
            .embed(query)
            .await
            .map_err(|e| QueryError::Embedding(e.to_string()))?;

        let hits = rank(&self.corpus, &query_embedding, top_k)?;
        debug!(hits = hits.len(), "Search complete");
        Ok(hits)
    }
}
