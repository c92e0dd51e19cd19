//! Core data models for the publication explorer.
//!
//! This module contains the fundamental data structures used across the crate:
//! publication records, search hits, relevance classes and the embedding model
//! identity used to check corpus/encoder parity.

use serde::{Deserialize, Serialize};

/// Placeholder shown for optional publication fields that are absent.
pub const NOT_AVAILABLE: &str = "N/A";

/// One row of the publication corpus.
///
/// A publication has no explicit identifier: its position in the corpus is its
/// id, and row `i` of the embedding matrix is its vector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Publication {
    /// Publication title
    pub title: String,

    /// Author list as it appears in the source table, or [`NOT_AVAILABLE`]
    pub authors: String,

    /// Publication year as text, or [`NOT_AVAILABLE`]
    pub year: String,

    /// Abstract text; the input for summarization
    #[serde(rename = "abstract")]
    pub abstract_text: String,
}

impl Publication {
    /// Build a publication, substituting [`NOT_AVAILABLE`] for missing or blank
    /// optional fields.
    pub fn new(
        title: String,
        authors: Option<String>,
        year: Option<String>,
        abstract_text: String,
    ) -> Self {
        Self {
            title,
            authors: or_not_available(authors),
            year: or_not_available(year),
            abstract_text,
        }
    }
}

fn or_not_available(value: Option<String>) -> String {
    match value {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => NOT_AVAILABLE.to_string(),
    }
}

/// Relevance classification for search hits.
///
/// Only used for display; ranking always uses the raw score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelevanceLevel {
    /// Extremely high similarity (cosine similarity > 0.95)
    Identical,

    /// Very high similarity (cosine similarity > 0.85)
    HighlySimilar,

    /// Moderate similarity (cosine similarity > 0.70)
    Similar,

    /// Anything lower
    Relevant,
}

impl RelevanceLevel {
    /// Determine relevance level from a cosine similarity score.
    pub fn from_score(score: f32) -> Self {
        if score > 0.95 {
            RelevanceLevel::Identical
        } else if score > 0.85 {
            RelevanceLevel::HighlySimilar
        } else if score > 0.70 {
            RelevanceLevel::Similar
        } else {
            RelevanceLevel::Relevant
        }
    }

    /// Upper-case label used in tables and JSON output.
    pub fn label(&self) -> &'static str {
        match self {
            RelevanceLevel::Identical => "IDENTICAL",
            RelevanceLevel::HighlySimilar => "HIGHLY_SIMILAR",
            RelevanceLevel::Similar => "SIMILAR",
            RelevanceLevel::Relevant => "RELEVANT",
        }
    }
}

/// A single ranked match: a row index into the corpus and its similarity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    /// Row index of the publication in the corpus
    pub corpus_id: usize,

    /// Cosine similarity between query and publication (higher is better)
    pub score: f32,
}

impl SearchHit {
    pub fn new(corpus_id: usize, score: f32) -> Self {
        Self { corpus_id, score }
    }

    pub fn relevance(&self) -> RelevanceLevel {
        RelevanceLevel::from_score(self.score)
    }
}

/// Identity of the embedding model behind a set of vectors.
///
/// The offline pipeline may write this next to the embedding matrix so the
/// explorer can refuse to rank with a different encoder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingConfig {
    /// Model identifier (e.g. "sentence-transformers/all-MiniLM-L6-v2")
    pub model_name: String,

    /// Dimension of the embedding vectors
    pub dimension: usize,
}

impl EmbeddingConfig {
    pub fn new(model_name: impl Into<String>, dimension: usize) -> Self {
        Self {
            model_name: model_name.into(),
            dimension,
        }
    }

    /// Whether two configs describe the same model.
    ///
    /// Names are compared case-insensitively and without the organisation
    /// prefix, so `sentence-transformers/all-MiniLM-L6-v2` and
    /// `all-minilm-l6-v2` match.
    pub fn matches(&self, other: &EmbeddingConfig) -> bool {
        self.dimension == other.dimension
            && short_model_name(&self.model_name) == short_model_name(&other.model_name)
    }
}

fn short_model_name(name: &str) -> String {
    name.rsplit('/')
        .next()
        .unwrap_or(name)
        .trim()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relevance_level_from_score() {
        assert_eq!(RelevanceLevel::from_score(0.96), RelevanceLevel::Identical);
        assert_eq!(RelevanceLevel::from_score(0.90), RelevanceLevel::HighlySimilar);
        assert_eq!(RelevanceLevel::from_score(0.75), RelevanceLevel::Similar);
        assert_eq!(RelevanceLevel::from_score(0.60), RelevanceLevel::Relevant);
        assert_eq!(RelevanceLevel::from_score(-0.2), RelevanceLevel::Relevant);
    }

    #[test]
    fn test_publication_defaults_missing_fields() {
        let paper = Publication::new(
            "Bone loss in microgravity".to_string(),
            None,
            Some("   ".to_string()),
            "Abstract".to_string(),
        );
        assert_eq!(paper.authors, NOT_AVAILABLE);
        assert_eq!(paper.year, NOT_AVAILABLE);
    }

    #[test]
    fn test_publication_keeps_present_fields() {
        let paper = Publication::new(
            "T".to_string(),
            Some("Smith J, Doe A".to_string()),
            Some("2014".to_string()),
            "Abstract".to_string(),
        );
        assert_eq!(paper.authors, "Smith J, Doe A");
        assert_eq!(paper.year, "2014");
    }

    #[test]
    fn test_embedding_config_matches_ignores_prefix_and_case() {
        let stamp = EmbeddingConfig::new("sentence-transformers/all-MiniLM-L6-v2", 384);
        let encoder = EmbeddingConfig::new("all-minilm-l6-v2", 384);
        assert!(stamp.matches(&encoder));
    }

    #[test]
    fn test_embedding_config_mismatch() {
        let stamp = EmbeddingConfig::new("sentence-transformers/all-MiniLM-L6-v2", 384);
        assert!(!stamp.matches(&EmbeddingConfig::new("BAAI/bge-small-en-v1.5", 384)));
        assert!(!stamp.matches(&EmbeddingConfig::new("all-MiniLM-L6-v2", 768)));
    }
}
