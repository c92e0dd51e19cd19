//! FastEmbed embedding provider implementation.
//!
//! Runs the sentence encoder locally through the fastembed library. The
//! default model, `AllMiniLML6V2`, is the all-MiniLM-L6-v2 sentence transformer
//! the publication matrix is built with.

use super::{EmbeddingError, EmbeddingProvider, EmbeddingResult};
use crate::{DEFAULT_EMBEDDING_DIMENSION, DEFAULT_EMBEDDING_MODEL};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// FastEmbed embedding provider.
#[derive(Clone)]
pub struct FastEmbedProvider {
    /// The embedding model instance (inference needs exclusive access)
    model: Arc<Mutex<TextEmbedding>>,

    /// Hugging Face style model identifier
    model_name: String,

    /// Dimension of the produced vectors
    embedding_dimension: usize,
}

/// Hugging Face identifier and dimension for the supported models.
///
/// Models without a known identity are refused: the identity is what the
/// corpus stamp is checked against, so guessing one would defeat the check.
fn model_identity(model: &EmbeddingModel) -> EmbeddingResult<(&'static str, usize)> {
    let identity = match model {
        EmbeddingModel::AllMiniLML6V2 => (DEFAULT_EMBEDDING_MODEL, DEFAULT_EMBEDDING_DIMENSION),
        EmbeddingModel::AllMiniLML12V2 => ("sentence-transformers/all-MiniLM-L12-v2", 384),
        EmbeddingModel::BGESmallENV15 => ("BAAI/bge-small-en-v1.5", 384),
        EmbeddingModel::BGEBaseENV15 => ("BAAI/bge-base-en-v1.5", 768),
        EmbeddingModel::BGELargeENV15 => ("BAAI/bge-large-en-v1.5", 1024),
        EmbeddingModel::ParaphraseMLMiniLML12V2 => {
            ("sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2", 384)
        }
        EmbeddingModel::ParaphraseMLMpnetBaseV2 => {
            ("sentence-transformers/paraphrase-multilingual-mpnet-base-v2", 768)
        }
        other => {
            return Err(EmbeddingError::ConfigError(format!(
                "Unsupported embedding model: {:?}",
                other
            )))
        }
    };
    Ok(identity)
}

impl FastEmbedProvider {
    /// Create a new FastEmbed embedding provider.
    ///
    /// # Arguments
    /// * `model` - Optional model to use (defaults to AllMiniLML6V2)
    /// * `cache_dir` - Optional cache directory for model files
    ///
    /// # Errors
    /// Returns `EmbeddingError::ConfigError` if model initialization fails
    pub fn new(model: Option<EmbeddingModel>, cache_dir: Option<PathBuf>) -> EmbeddingResult<Self> {
        let model_type = model.unwrap_or(EmbeddingModel::AllMiniLML6V2);
        let (model_name, embedding_dimension) = model_identity(&model_type)?;

        let mut init_options = InitOptions::new(model_type);
        if let Some(dir) = cache_dir {
            init_options = init_options.with_cache_dir(dir);
        }

        let text_embedding = TextEmbedding::try_new(init_options).map_err(|e| {
            EmbeddingError::ConfigError(format!("Failed to initialize FastEmbed model: {}", e))
        })?;

        info!(model = model_name, dimension = embedding_dimension, "Loaded sentence encoder");

        Ok(Self {
            model: Arc::new(Mutex::new(text_embedding)),
            model_name: model_name.to_string(),
            embedding_dimension,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("Text cannot be empty".to_string()));
        }

        let mut model = self.model.lock().await;
        let embeddings = model
            .embed(vec![text.to_string()], None)
            .map_err(|e| EmbeddingError::Inference(e.to_string()))?;

        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Other("No embedding generated".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        if texts.iter().any(|t| t.trim().is_empty()) {
            return Err(EmbeddingError::InvalidInput("All texts must be non-empty".to_string()));
        }

        let mut model = self.model.lock().await;
        let text_strings: Vec<String> = texts.iter().map(|&s| s.to_string()).collect();
        model
            .embed(text_strings, None)
            .map_err(|e| EmbeddingError::Inference(format!("Batch embedding failed: {}", e)))
    }

    fn dimension(&self) -> usize {
        self.embedding_dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

// TextEmbedding does not implement Debug
impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("model_name", &self.model_name)
            .field("embedding_dimension", &self.embedding_dimension)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_model_identity() {
        let (name, dim) = model_identity(&EmbeddingModel::AllMiniLML6V2).unwrap();
        assert_eq!(name, "sentence-transformers/all-MiniLM-L6-v2");
        assert_eq!(dim, 384);
    }

    #[test]
    fn test_model_identity_dimensions() {
        assert_eq!(model_identity(&EmbeddingModel::BGEBaseENV15).unwrap().1, 768);
        assert_eq!(model_identity(&EmbeddingModel::BGELargeENV15).unwrap().1, 1024);
    }

    #[test]
    fn test_unlisted_model_is_rejected() {
        let result = model_identity(&EmbeddingModel::NomicEmbedTextV15);
        assert!(matches!(result, Err(EmbeddingError::ConfigError(_))));
    }

    #[test]
    fn test_new_rejects_unlisted_model_before_download() {
        let result = FastEmbedProvider::new(Some(EmbeddingModel::NomicEmbedTextV15), None);
        assert!(matches!(result, Err(EmbeddingError::ConfigError(_))));
    }

    // The tests below download the model on first run.

    #[tokio::test]
    #[ignore = "downloads the all-MiniLM-L6-v2 weights"]
    async fn test_embed_single_text() {
        let provider = FastEmbedProvider::new(None, None).expect("model should load");
        let embedding = provider
            .embed("Spaceflight induces bone density loss in mice.")
            .await
            .unwrap();
        assert_eq!(embedding.len(), provider.dimension());
        assert!(embedding.iter().all(|x| x.is_finite()));
    }

    #[tokio::test]
    #[ignore = "downloads the all-MiniLM-L6-v2 weights"]
    async fn test_embed_empty_text() {
        let provider = FastEmbedProvider::new(None, None).expect("model should load");
        let result = provider.embed("   \n\t ").await;
        assert!(matches!(result, Err(EmbeddingError::InvalidInput(_))));
    }

    #[tokio::test]
    #[ignore = "downloads the all-MiniLM-L6-v2 weights"]
    async fn test_embed_consistency() {
        let provider = FastEmbedProvider::new(None, None).expect("model should load");
        let text = "Plant root growth under simulated microgravity";
        let first = provider.embed(text).await.unwrap();
        let batch = provider.embed_batch(&[text]).await.unwrap();
        assert_eq!(first, batch[0]);
    }
}
