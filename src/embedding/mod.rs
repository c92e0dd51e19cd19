//! Embedding provider abstraction.
//!
//! The search engine only needs `encode(text) -> vector`; which model produces
//! the vector is hidden behind [`EmbeddingProvider`]. The provider used at query
//! time must be the same model that produced the precomputed corpus matrix,
//! otherwise scores are meaningless (but no error is raised).

pub mod fastembed;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::EmbeddingConfig;

/// Errors that can occur during embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Invalid input text (e.g., empty)
    #[error("Invalid input text: {0}")]
    InvalidInput(String),

    /// Model could not be initialized
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Inference failed
    #[error("Embedding generation failed: {0}")]
    Inference(String),

    /// Other unexpected errors
    #[error("Unexpected error: {0}")]
    Other(String),
}

/// Result type for embedding operations.
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Trait for text embedding providers.
///
/// # Example Usage
/// ```ignore
/// let provider = FastEmbedProvider::new(None, None)?;
/// let embedding = provider.embed("radiation effects on bone density").await?;
/// assert_eq!(embedding.len(), provider.dimension());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for the given text.
    ///
    /// # Errors
    /// Returns `EmbeddingError::InvalidInput` for empty text, or another
    /// variant if inference fails
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>>;

    /// Generate embeddings for multiple texts, in input order.
    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>>;

    /// Number of dimensions in the produced vectors.
    fn dimension(&self) -> usize;

    /// Model identifier (e.g. "sentence-transformers/all-MiniLM-L6-v2").
    fn model_name(&self) -> &str;

    /// Model identity, for comparison against a corpus stamp.
    fn config(&self) -> EmbeddingConfig {
        EmbeddingConfig::new(self.model_name(), self.dimension())
    }
}
