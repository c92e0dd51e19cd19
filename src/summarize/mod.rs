//! Abstract summarization.
//!
//! [`SummarizationService`] owns the rules around the model: short inputs are
//! answered with a fixed message without touching the model, long inputs are
//! cut to the model's input limit, and every model call is bounded by a
//! timeout. The model itself sits behind the [`Summarizer`] trait.

pub mod decode;
pub mod onnx;

use std::num::NonZeroUsize;
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Returned instead of a summary when the input is too short.
pub const TOO_SHORT_MESSAGE: &str = "The abstract is too short to generate a meaningful summary.";

/// Inputs with fewer words than this are not summarized.
pub const MIN_INPUT_WORDS: usize = 50;

/// Input is cut to this many characters before reaching the model.
pub const MAX_INPUT_CHARS: usize = 1024;

/// Upper bound on summary length, in tokens.
pub const MAX_SUMMARY_TOKENS: usize = 150;

/// Lower bound on summary length, in tokens.
pub const MIN_SUMMARY_TOKENS: usize = 40;

/// Default number of summaries remembered by the cache.
pub const DEFAULT_SUMMARY_CACHE_CAPACITY: usize = 256;

/// Default bound on a single model call.
pub const DEFAULT_SUMMARY_TIMEOUT: Duration = Duration::from_secs(120);

/// Errors that can occur during summarization.
#[derive(Debug, Error)]
pub enum SummarizeError {
    /// Model files missing or unloadable
    #[error("Failed to load summarization model: {0}")]
    ModelLoad(String),

    /// Model failed on a particular input
    #[error("Summarization failed: {0}")]
    Model(String),

    /// Model did not answer within the configured bound
    #[error("Summarization timed out after {0:?}")]
    Timeout(Duration),

    /// Generation was abandoned by its caller before it finished
    #[error("Summarization cancelled")]
    Cancelled,
}

/// Result type for summarization operations.
pub type SummarizeResult<T> = Result<T, SummarizeError>;

/// Length bounds handed to the model. Decoding is always deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationParams {
    /// Maximum summary length in tokens
    pub max_length: usize,

    /// Minimum summary length in tokens
    pub min_length: usize,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_length: MAX_SUMMARY_TOKENS,
            min_length: MIN_SUMMARY_TOKENS,
        }
    }
}

/// A pretrained abstractive summarization model.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize `text` within `params`. Identical inputs must give identical
    /// outputs.
    async fn generate(&self, text: &str, params: &GenerationParams) -> SummarizeResult<String>;

    /// Model identifier, for logging.
    fn model_name(&self) -> &str;
}

/// Knobs of the summarization service.
#[derive(Debug, Clone)]
pub struct SummarizerSettings {
    pub min_words: usize,
    pub max_input_chars: usize,
    pub generation: GenerationParams,
    pub timeout: Duration,
    /// Remember summaries of identical inputs
    pub cache: bool,
    /// Most summaries kept; least recently used are evicted first (0 disables)
    pub cache_capacity: usize,
}

impl Default for SummarizerSettings {
    fn default() -> Self {
        Self {
            min_words: MIN_INPUT_WORDS,
            max_input_chars: MAX_INPUT_CHARS,
            generation: GenerationParams::default(),
            timeout: DEFAULT_SUMMARY_TIMEOUT,
            cache: true,
            cache_capacity: DEFAULT_SUMMARY_CACHE_CAPACITY,
        }
    }
}

/// Number of whitespace-separated words.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// First `max_chars` characters of `text`, never splitting a character.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Gatekeeper and front door for a [`Summarizer`].
pub struct SummarizationService<S>
where
    S: Summarizer,
{
    model: S,
    settings: SummarizerSettings,
    cache: Option<Mutex<LruCache<String, String>>>,
}

impl<S> SummarizationService<S>
where
    S: Summarizer,
{
    pub fn new(model: S, settings: SummarizerSettings) -> Self {
        let cache = NonZeroUsize::new(settings.cache_capacity)
            .filter(|_| settings.cache)
            .map(|capacity| Mutex::new(LruCache::new(capacity)));
        Self {
            model,
            settings,
            cache,
        }
    }

    pub fn settings(&self) -> &SummarizerSettings {
        &self.settings
    }

    pub fn model(&self) -> &S {
        &self.model
    }

    /// Summarize a publication abstract.
    ///
    /// Returns [`TOO_SHORT_MESSAGE`] for empty or short input without calling
    /// the model.
    ///
    /// # Errors
    /// `Model` if the model fails on this input, `Timeout` if it does not
    /// answer in time. Failures are not cached.
    pub async fn summarize(&self, text: &str) -> SummarizeResult<String> {
        let words = word_count(text);
        if words < self.settings.min_words {
            debug!(words, "Input below summarization threshold");
            return Ok(TOO_SHORT_MESSAGE.to_string());
        }

        let input = truncate_chars(text, self.settings.max_input_chars);

        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.lock().await.get(input) {
                debug!("Summary cache hit");
                return Ok(hit.clone());
            }
        }

        debug!(
            model = self.model.model_name(),
            chars = input.chars().count(),
            "Generating summary"
        );
        let summary = tokio::time::timeout(
            self.settings.timeout,
            self.model.generate(input, &self.settings.generation),
        )
        .await
        .map_err(|_| {
            warn!(timeout = ?self.settings.timeout, "Summarization timed out");
            SummarizeError::Timeout(self.settings.timeout)
        })??;

        if let Some(cache) = &self.cache {
            cache.lock().await.put(input.to_string(), summary.clone());
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    /// Keeps the first `min_length` words, like a very lazy model.
    struct MockSummarizer {
        calls: AtomicUsize,
        inputs: StdMutex<Vec<String>>,
        fail: bool,
        delay: Option<Duration>,
    }

    impl MockSummarizer {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                inputs: StdMutex::new(Vec::new()),
                fail: false,
                delay: None,
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new()
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::new()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Summarizer for MockSummarizer {
        async fn generate(&self, text: &str, params: &GenerationParams) -> SummarizeResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inputs.lock().unwrap().push(text.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(SummarizeError::Model("mock failure".to_string()));
            }
            Ok(text
                .split_whitespace()
                .take(params.min_length)
                .collect::<Vec<_>>()
                .join(" "))
        }

        fn model_name(&self) -> &str {
            "mock"
        }
    }

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("word{}", i)).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_word_count() {
        assert_eq!(word_count(""), 0);
        assert_eq!(word_count("   \n "), 0);
        assert_eq!(word_count("one  two\tthree\nfour"), 4);
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("", 5), "");
    }

    #[tokio::test]
    async fn test_empty_text_returns_sentinel() {
        let service = SummarizationService::new(MockSummarizer::new(), SummarizerSettings::default());
        assert_eq!(service.summarize("").await.unwrap(), TOO_SHORT_MESSAGE);
        assert_eq!(service.model().calls(), 0);
    }

    #[tokio::test]
    async fn test_short_text_returns_sentinel_without_model() {
        let service = SummarizationService::new(MockSummarizer::new(), SummarizerSettings::default());
        assert_eq!(service.summarize(&words(40)).await.unwrap(), TOO_SHORT_MESSAGE);
        assert_eq!(service.summarize(&words(49)).await.unwrap(), TOO_SHORT_MESSAGE);
        assert_eq!(service.model().calls(), 0);
    }

    #[tokio::test]
    async fn test_threshold_text_reaches_model() {
        let service = SummarizationService::new(MockSummarizer::new(), SummarizerSettings::default());
        let summary = service.summarize(&words(50)).await.unwrap();
        assert_ne!(summary, TOO_SHORT_MESSAGE);
        assert_eq!(service.model().calls(), 1);
    }

    #[tokio::test]
    async fn test_long_text_is_truncated_before_model() {
        let service = SummarizationService::new(MockSummarizer::new(), SummarizerSettings::default());
        let text = words(400);
        assert!(text.chars().count() > MAX_INPUT_CHARS);

        service.summarize(&text).await.unwrap();

        let inputs = service.model().inputs.lock().unwrap();
        assert_eq!(inputs[0].chars().count(), MAX_INPUT_CHARS);
        assert!(text.starts_with(&inputs[0]));
    }

    #[tokio::test]
    async fn test_long_abstract_summary_is_shorter() {
        let service = SummarizationService::new(MockSummarizer::new(), SummarizerSettings::default());
        let text = words(200);
        let summary = service.summarize(&text).await.unwrap();
        assert!(!summary.is_empty());
        assert!(summary.len() < text.len());
        assert!(word_count(&summary) <= MAX_SUMMARY_TOKENS);
        assert!(word_count(&summary) >= MIN_SUMMARY_TOKENS);
    }

    #[tokio::test]
    async fn test_repeated_calls_identical_and_cached() {
        let service = SummarizationService::new(MockSummarizer::new(), SummarizerSettings::default());
        let text = words(120);
        let first = service.summarize(&text).await.unwrap();
        let second = service.summarize(&text).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(service.model().calls(), 1);
    }

    #[tokio::test]
    async fn test_cache_disabled_calls_model_each_time() {
        let settings = SummarizerSettings {
            cache: false,
            ..SummarizerSettings::default()
        };
        let service = SummarizationService::new(MockSummarizer::new(), settings);
        let text = words(120);
        let first = service.summarize(&text).await.unwrap();
        let second = service.summarize(&text).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(service.model().calls(), 2);
    }

    #[tokio::test]
    async fn test_cache_is_bounded() {
        let settings = SummarizerSettings {
            cache_capacity: 2,
            ..SummarizerSettings::default()
        };
        let service = SummarizationService::new(MockSummarizer::new(), settings);
        let texts: Vec<String> = (0..3)
            .map(|i| format!("variant{} {}", i, words(60)))
            .collect();

        for text in &texts {
            service.summarize(text).await.unwrap();
        }
        assert_eq!(service.model().calls(), 3);

        // The oldest entry was evicted; the newest is still cached.
        service.summarize(&texts[2]).await.unwrap();
        assert_eq!(service.model().calls(), 3);
        service.summarize(&texts[0]).await.unwrap();
        assert_eq!(service.model().calls(), 4);
    }

    #[tokio::test]
    async fn test_zero_capacity_disables_cache() {
        let settings = SummarizerSettings {
            cache_capacity: 0,
            ..SummarizerSettings::default()
        };
        let service = SummarizationService::new(MockSummarizer::new(), settings);
        let text = words(70);
        service.summarize(&text).await.unwrap();
        service.summarize(&text).await.unwrap();
        assert_eq!(service.model().calls(), 2);
    }

    #[tokio::test]
    async fn test_model_failure_is_reported_and_not_cached() {
        let service = SummarizationService::new(MockSummarizer::failing(), SummarizerSettings::default());
        let text = words(80);
        assert!(matches!(
            service.summarize(&text).await,
            Err(SummarizeError::Model(_))
        ));
        assert!(service.summarize(&text).await.is_err());
        assert_eq!(service.model().calls(), 2);
    }

    #[tokio::test]
    async fn test_timeout() {
        let settings = SummarizerSettings {
            timeout: Duration::from_millis(20),
            ..SummarizerSettings::default()
        };
        let service =
            SummarizationService::new(MockSummarizer::slow(Duration::from_secs(5)), settings);
        let result = service.summarize(&words(80)).await;
        assert!(matches!(result, Err(SummarizeError::Timeout(_))));
    }
}
