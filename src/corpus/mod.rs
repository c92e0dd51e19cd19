//! Corpus store: publication table plus precomputed embedding matrix.
//!
//! Both artifacts are produced offline and only read here. Loading validates
//! that the two line up row for row; nothing is truncated or padded to make
//! them fit.
//!
//! ```ignore
//! let cache = CorpusCache::new(CorpusStore::new(CorpusPaths::default()));
//! let corpus = cache.get_or_load().await?;
//! println!("Loaded {} publications.", corpus.len());
//! ```

pub mod loader;

use std::path::PathBuf;
use std::sync::Arc;

use ndarray::{Array2, ArrayView1};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::info;

use crate::models::{EmbeddingConfig, Publication};

pub use loader::CorpusStore;

/// Default location of the publication table.
pub const DEFAULT_PUBLICATIONS_PATH: &str = "publications.csv";

/// Default location of the embedding matrix.
pub const DEFAULT_EMBEDDINGS_PATH: &str = "embeddings.npy";

/// Default location of the optional model identity stamp.
pub const DEFAULT_STAMP_PATH: &str = "embeddings.meta.json";

/// Default text encoding of the publication table. Decoded as exact
/// ISO-8859-1, not the windows-1252 superset.
pub const DEFAULT_ENCODING: &str = "latin-1";

/// Errors that can occur while loading or validating the corpus.
#[derive(Debug, Error)]
pub enum CorpusError {
    /// An input artifact does not exist (not generated yet)
    #[error("Corpus file not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// Table and matrix disagree on the number of publications
    #[error(
        "Corpus integrity violation: {publications} publications but {embeddings} embedding rows"
    )]
    Integrity {
        publications: usize,
        embeddings: usize,
    },

    /// Structurally invalid artifact (missing column, empty vectors, bad stamp)
    #[error("Malformed corpus: {0}")]
    Malformed(String),

    /// CSV parse failure
    #[error("Failed to parse publication table: {0}")]
    Csv(#[from] csv::Error),

    /// `.npy` parse failure
    #[error("Failed to read embedding matrix: {0}")]
    Npy(String),

    /// Encoder and corpus were built with different models
    #[error("Embedding model mismatch: corpus built with {corpus}, encoder is {encoder}")]
    ModelMismatch { corpus: String, encoder: String },

    /// Unknown text encoding label
    #[error("Unsupported text encoding: {0}")]
    UnsupportedEncoding(String),

    /// Other I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CorpusError {
    /// Whether the error means "artifacts not generated yet" rather than
    /// "artifacts corrupted".
    pub fn is_not_found(&self) -> bool {
        matches!(self, CorpusError::NotFound { .. })
    }
}

/// Result type for corpus operations.
pub type CorpusResult<T> = Result<T, CorpusError>;

/// Locations of the corpus artifacts.
#[derive(Debug, Clone)]
pub struct CorpusPaths {
    pub publications: PathBuf,
    pub embeddings: PathBuf,
    /// Optional model identity sidecar; skipped when the file does not exist
    pub stamp: PathBuf,
    /// WHATWG label of the table's single-byte encoding
    pub encoding: String,
}

impl Default for CorpusPaths {
    fn default() -> Self {
        Self {
            publications: PathBuf::from(DEFAULT_PUBLICATIONS_PATH),
            embeddings: PathBuf::from(DEFAULT_EMBEDDINGS_PATH),
            stamp: PathBuf::from(DEFAULT_STAMP_PATH),
            encoding: DEFAULT_ENCODING.to_string(),
        }
    }
}

/// The loaded, validated, immutable corpus.
#[derive(Debug)]
pub struct Corpus {
    publications: Vec<Publication>,
    embeddings: Array2<f32>,
    row_norms: Vec<f32>,
    stamp: Option<EmbeddingConfig>,
}

impl Corpus {
    /// Assemble a corpus from already-parsed parts.
    ///
    /// # Errors
    /// `Integrity` if the row counts differ, `Malformed` if the matrix has no
    /// columns or the stamp disagrees with the matrix dimension.
    pub fn new(
        publications: Vec<Publication>,
        embeddings: Array2<f32>,
        stamp: Option<EmbeddingConfig>,
    ) -> CorpusResult<Self> {
        if publications.len() != embeddings.nrows() {
            return Err(CorpusError::Integrity {
                publications: publications.len(),
                embeddings: embeddings.nrows(),
            });
        }
        if embeddings.ncols() == 0 {
            return Err(CorpusError::Malformed(
                "embedding matrix has zero columns".to_string(),
            ));
        }
        if let Some(stamp) = &stamp {
            if stamp.dimension != embeddings.ncols() {
                return Err(CorpusError::Malformed(format!(
                    "stamp declares dimension {} but matrix has {} columns",
                    stamp.dimension,
                    embeddings.ncols()
                )));
            }
        }

        let row_norms = embeddings
            .rows()
            .into_iter()
            .map(|row| row.dot(&row).sqrt())
            .collect();

        Ok(Self {
            publications,
            embeddings,
            row_norms,
            stamp,
        })
    }

    /// Number of publications.
    pub fn len(&self) -> usize {
        self.publications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.publications.is_empty()
    }

    /// Embedding dimension D.
    pub fn dimension(&self) -> usize {
        self.embeddings.ncols()
    }

    pub fn publications(&self) -> &[Publication] {
        &self.publications
    }

    pub fn publication(&self, corpus_id: usize) -> Option<&Publication> {
        self.publications.get(corpus_id)
    }

    pub fn embeddings(&self) -> &Array2<f32> {
        &self.embeddings
    }

    /// Embedding row of one publication.
    pub fn embedding(&self, corpus_id: usize) -> Option<ArrayView1<'_, f32>> {
        (corpus_id < self.len()).then(|| self.embeddings.row(corpus_id))
    }

    /// L2 norm of every embedding row, in row order.
    pub fn row_norms(&self) -> &[f32] {
        &self.row_norms
    }

    /// Model identity stamp, if the offline pipeline wrote one.
    pub fn stamp(&self) -> Option<&EmbeddingConfig> {
        self.stamp.as_ref()
    }

    /// Check that vectors from `encoder` are comparable with this corpus.
    ///
    /// The dimension must always match. The model name is only checked when a
    /// stamp is present.
    pub fn ensure_compatible(&self, encoder: &EmbeddingConfig) -> CorpusResult<()> {
        let corpus_identity = match &self.stamp {
            Some(stamp) if !stamp.matches(encoder) => Some(stamp.clone()),
            Some(_) => None,
            None if encoder.dimension != self.dimension() => Some(EmbeddingConfig::new(
                "unstamped matrix",
                self.dimension(),
            )),
            None => None,
        };

        match corpus_identity {
            Some(corpus) => Err(CorpusError::ModelMismatch {
                corpus: format!("{} ({} dims)", corpus.model_name, corpus.dimension),
                encoder: format!("{} ({} dims)", encoder.model_name, encoder.dimension),
            }),
            None => Ok(()),
        }
    }
}

/// Load-once holder for the corpus.
///
/// The first successful [`get_or_load`](CorpusCache::get_or_load) reads the
/// artifacts; every later call returns the same `Arc` without touching disk.
/// A failed load leaves the cache empty.
#[derive(Debug)]
pub struct CorpusCache {
    store: CorpusStore,
    cell: OnceCell<Arc<Corpus>>,
}

impl CorpusCache {
    pub fn new(store: CorpusStore) -> Self {
        Self {
            store,
            cell: OnceCell::new(),
        }
    }

    /// Return the cached corpus, loading it on first use.
    pub async fn get_or_load(&self) -> CorpusResult<Arc<Corpus>> {
        self.cell
            .get_or_try_init(|| async {
                let corpus = self.store.load()?;
                info!(
                    publications = corpus.len(),
                    dimension = corpus.dimension(),
                    "Corpus loaded"
                );
                Ok::<_, CorpusError>(Arc::new(corpus))
            })
            .await
            .map(Arc::clone)
    }

    /// The corpus if it has been loaded successfully.
    pub fn get(&self) -> Option<Arc<Corpus>> {
        self.cell.get().cloned()
    }
}
