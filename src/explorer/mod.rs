//! Application wiring: configuration plus the assembled search and
//! summarization services.
//!
//! [`Explorer`] owns everything a front end needs after startup. Models and the
//! corpus are loaded once in [`Explorer::load`] and handed around explicitly.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use crate::corpus::{Corpus, CorpusCache, CorpusError, CorpusPaths, CorpusStore};
use crate::embedding::fastembed::FastEmbedProvider;
use crate::embedding::{EmbeddingError, EmbeddingProvider};
use crate::models::{Publication, SearchHit};
use crate::query::{BruteForceSearchEngine, QueryError, SearchEngine, DEFAULT_TOP_K};
use crate::summarize::onnx::OnnxSummarizer;
use crate::summarize::{SummarizationService, SummarizeError, Summarizer, SummarizerSettings};

/// Default location of the exported summarization model.
pub const DEFAULT_SUMMARIZER_DIR: &str = "models/distilbart-cnn-6-6";

/// Errors raised while assembling or using the explorer.
#[derive(Debug, Error)]
pub enum ExplorerError {
    #[error("Corpus error: {0}")]
    Corpus(#[from] CorpusError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Summarization error: {0}")]
    Summarize(#[from] SummarizeError),

    #[error("Search error: {0}")]
    Query(#[from] QueryError),

    /// A hit points outside the corpus
    #[error("No publication at corpus position {0}")]
    UnknownPublication(usize),

    /// A blocking model load task panicked
    #[error("Startup task failed: {0}")]
    Startup(String),
}

/// Result type for explorer operations.
pub type ExplorerResult<T> = Result<T, ExplorerError>;

/// Everything configurable about a session.
#[derive(Debug, Clone)]
pub struct ExplorerConfig {
    /// Corpus artifact locations and table encoding
    pub corpus: CorpusPaths,

    /// Directory holding the summarizer's ONNX graphs and tokenizer
    pub summarizer_dir: PathBuf,

    /// Where the sentence encoder's weights are cached
    pub embedding_cache_dir: Option<PathBuf>,

    /// Default number of hits per search
    pub top_k: usize,

    pub summarizer: SummarizerSettings,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            corpus: CorpusPaths::default(),
            summarizer_dir: PathBuf::from(DEFAULT_SUMMARIZER_DIR),
            embedding_cache_dir: dirs::cache_dir().map(|dir| dir.join("fastembed")),
            top_k: DEFAULT_TOP_K,
            summarizer: SummarizerSettings::default(),
        }
    }
}

impl ExplorerConfig {
    pub fn with_publications(mut self, path: impl Into<PathBuf>) -> Self {
        self.corpus.publications = path.into();
        self
    }

    pub fn with_embeddings(mut self, path: impl Into<PathBuf>) -> Self {
        self.corpus.embeddings = path.into();
        self
    }

    pub fn with_stamp(mut self, path: impl Into<PathBuf>) -> Self {
        self.corpus.stamp = path.into();
        self
    }

    pub fn with_encoding(mut self, label: impl Into<String>) -> Self {
        self.corpus.encoding = label.into();
        self
    }

    pub fn with_summarizer_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.summarizer_dir = dir.into();
        self
    }

    pub fn with_embedding_cache_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.embedding_cache_dir = dir;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_summary_timeout(mut self, timeout: Duration) -> Self {
        self.summarizer.timeout = timeout;
        self
    }

    /// Enable or disable remembering summaries of identical abstracts.
    pub fn with_summary_cache(mut self, enabled: bool) -> Self {
        self.summarizer.cache = enabled;
        self
    }
}

/// Search engine and summarization service over one loaded corpus.
pub struct Explorer<E, S>
where
    E: EmbeddingProvider,
    S: Summarizer,
{
    engine: BruteForceSearchEngine<E>,
    summarization: SummarizationService<S>,
    top_k: usize,
}

impl Explorer<FastEmbedProvider, OnnxSummarizer> {
    /// Load the corpus and both models.
    ///
    /// Any failure here is a startup failure: missing or inconsistent
    /// artifacts, an encoder that does not match the corpus, or a summarizer
    /// directory that cannot be loaded.
    pub async fn load(config: &ExplorerConfig) -> ExplorerResult<Self> {
        let cache = CorpusCache::new(CorpusStore::new(config.corpus.clone()));
        let corpus = cache.get_or_load().await?;

        let cache_dir = config.embedding_cache_dir.clone();
        let provider = tokio::task::spawn_blocking(move || FastEmbedProvider::new(None, cache_dir))
            .await
            .map_err(|e| ExplorerError::Startup(e.to_string()))??;

        let summarizer_dir = config.summarizer_dir.clone();
        let summarizer =
            tokio::task::spawn_blocking(move || OnnxSummarizer::from_directory(&summarizer_dir))
                .await
                .map_err(|e| ExplorerError::Startup(e.to_string()))??;

        Self::from_parts(provider, summarizer, corpus, config)
    }
}

impl<E, S> Explorer<E, S>
where
    E: EmbeddingProvider,
    S: Summarizer,
{
    /// Assemble an explorer from already-loaded parts.
    ///
    /// # Errors
    /// `Corpus(ModelMismatch)` if the encoder cannot produce vectors comparable
    /// with the corpus matrix
    pub fn from_parts(
        provider: E,
        summarizer: S,
        corpus: Arc<Corpus>,
        config: &ExplorerConfig,
    ) -> ExplorerResult<Self> {
        corpus.ensure_compatible(&provider.config())?;
        info!(
            encoder = provider.model_name(),
            summarizer = summarizer.model_name(),
            publications = corpus.len(),
            "Explorer ready"
        );

        Ok(Self {
            engine: BruteForceSearchEngine::new(provider, corpus),
            summarization: SummarizationService::new(summarizer, config.summarizer.clone()),
            top_k: config.top_k,
        })
    }

    pub fn corpus(&self) -> &Arc<Corpus> {
        self.engine.corpus()
    }

    /// Default hit count from the configuration.
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub async fn search(&self, query: &str, top_k: usize) -> ExplorerResult<Vec<SearchHit>> {
        Ok(self.engine.search(query, top_k).await?)
    }

    pub fn publication(&self, hit: &SearchHit) -> Option<&Publication> {
        self.corpus().publication(hit.corpus_id)
    }

    /// Summarize the abstract of the publication behind `hit`.
    pub async fn summarize_hit(&self, hit: &SearchHit) -> ExplorerResult<String> {
        let publication = self
            .publication(hit)
            .ok_or(ExplorerError::UnknownPublication(hit.corpus_id))?;
        Ok(self.summarization.summarize(&publication.abstract_text).await?)
    }

    /// Summarize arbitrary text under the same rules as abstracts.
    pub async fn summarize(&self, text: &str) -> ExplorerResult<String> {
        Ok(self.summarization.summarize(text).await?)
    }
}
