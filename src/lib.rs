//! Bio-Query - semantic search and abstract summarization over a fixed corpus
//! of bioscience publications.
//!
//! A free-text query is embedded with a sentence encoder and compared against
//! a precomputed embedding matrix by cosine similarity. Any hit's abstract can
//! then be condensed by a pretrained seq2seq summarizer.
//!
//! # Architecture
//!
//! - **models**: Core data structures (Publication, SearchHit, RelevanceLevel, EmbeddingConfig)
//! - **corpus**: Loading and validating the publication table and embedding matrix
//! - **embedding**: Query embedding generation
//! - **query**: Brute-force cosine ranking
//! - **summarize**: Summarization gate, timeout and cache, plus the ONNX model
//! - **explorer**: Configuration and startup wiring for front ends
//!
//! # Workflow
//!
//! ## Offline (not part of this crate)
//!
//! 1. Embed every abstract with all-MiniLM-L6-v2
//! 2. Write `publications.csv` and `embeddings.npy` row-aligned
//!
//! ## Online
//!
//! 1. Load the corpus once and check it against the encoder
//! 2. Embed the query text
//! 3. Score every publication by cosine similarity
//! 4. Return the top-k hits
//! 5. Summarize a chosen hit's abstract on request
//!
//! # Example
//!
//! ```ignore
//! use bioquery::explorer::{Explorer, ExplorerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let explorer = Explorer::load(&ExplorerConfig::default()).await?;
//!
//!     let hits = explorer.search("radiation effects on bone density", 10).await?;
//!     for hit in &hits {
//!         if let Some(paper) = explorer.publication(hit) {
//!             println!("{:.3}  {}", hit.score, paper.title);
//!         }
//!     }
//!
//!     if let Some(best) = hits.first() {
//!         println!("{}", explorer.summarize_hit(best).await?);
//!     }
//!     Ok(())
//! }
//! ```

// Public modules
pub mod corpus;
pub mod embedding;
pub mod explorer;
pub mod models;
pub mod query;
pub mod summarize;

// Re-export commonly used types at the crate root
pub use corpus::{Corpus, CorpusCache, CorpusError, CorpusPaths, CorpusStore};
pub use embedding::EmbeddingProvider;
pub use explorer::{Explorer, ExplorerConfig, ExplorerError};
pub use models::{EmbeddingConfig, Publication, RelevanceLevel, SearchHit};
pub use query::{BruteForceSearchEngine, SearchEngine};
pub use summarize::{SummarizationService, Summarizer, TOO_SHORT_MESSAGE};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model name
pub const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Default embedding dimension for all-MiniLM-L6-v2
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 384;
