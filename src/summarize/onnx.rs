//! ONNX Runtime summarizer for BART-style encoder-decoder exports.
//!
//! Expects a model directory containing:
//! - `encoder_model.onnx` (inputs `input_ids`, `attention_mask`; output
//!   `last_hidden_state`)
//! - `decoder_model.onnx` (inputs `input_ids`, `encoder_attention_mask`,
//!   `encoder_hidden_states`; output `logits`)
//! - `tokenizer.json`
//!
//! This is the layout produced by exporting `sshleifer/distilbart-cnn-6-6`
//! with Hugging Face Optimum. The decoder has no KV cache input, so every step
//! re-runs it on the full prefix.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use super::decode::{greedy_decode, DecodeSettings, LogitsSource};
use super::{GenerationParams, SummarizeError, SummarizeResult, Summarizer};

/// Longest encoder input the model accepts, in tokens.
pub const MAX_SOURCE_TOKENS: usize = 1024;

const ENCODER_FILE: &str = "encoder_model.onnx";
const DECODER_FILE: &str = "decoder_model.onnx";
const TOKENIZER_FILE: &str = "tokenizer.json";

/// Summarizer running a seq2seq ONNX export with greedy decoding.
#[derive(Clone)]
pub struct OnnxSummarizer {
    encoder: Arc<Mutex<Session>>,
    decoder: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
    model_name: String,
    bos_token_id: u32,
    eos_token_id: u32,
}

impl std::fmt::Debug for OnnxSummarizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxSummarizer")
            .field("model_name", &self.model_name)
            .field("bos_token_id", &self.bos_token_id)
            .field("eos_token_id", &self.eos_token_id)
            .finish()
    }
}

fn load_error(what: &str, e: impl std::fmt::Display) -> SummarizeError {
    SummarizeError::ModelLoad(format!("{}: {}", what, e))
}

fn inference_error(what: &str, e: impl std::fmt::Display) -> SummarizeError {
    SummarizeError::Model(format!("{}: {}", what, e))
}

fn require_file(dir: &Path, name: &str) -> SummarizeResult<PathBuf> {
    let path = dir.join(name);
    if path.exists() {
        Ok(path)
    } else {
        Err(SummarizeError::ModelLoad(format!(
            "{} not found in {}",
            name,
            dir.display()
        )))
    }
}

fn open_session(path: &Path) -> SummarizeResult<Session> {
    Session::builder()
        .map_err(|e| load_error("ONNX session builder", e))?
        .with_intra_threads(num_threads())
        .map_err(|e| load_error("ONNX set threads", e))?
        .commit_from_file(path)
        .map_err(|e| load_error(&format!("ONNX load {}", path.display()), e))
}

fn num_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl OnnxSummarizer {
    /// Load the encoder, decoder and tokenizer from `model_dir`.
    ///
    /// # Errors
    /// `SummarizeError::ModelLoad` if any file is missing or fails to load
    pub fn from_directory(model_dir: &Path) -> SummarizeResult<Self> {
        let encoder_path = require_file(model_dir, ENCODER_FILE)?;
        let decoder_path = require_file(model_dir, DECODER_FILE)?;
        let tokenizer_path = require_file(model_dir, TOKENIZER_FILE)?;

        let encoder = open_session(&encoder_path)?;
        let decoder = open_session(&decoder_path)?;
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| load_error("Failed to load tokenizer", e))?;

        let bos_token_id = tokenizer.token_to_id("<s>").unwrap_or(0);
        let eos_token_id = tokenizer.token_to_id("</s>").unwrap_or(2);

        let model_name = model_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| model_dir.display().to_string());

        info!(model = %model_name, dir = %model_dir.display(), "Loaded summarization model");

        Ok(Self {
            encoder: Arc::new(Mutex::new(encoder)),
            decoder: Arc::new(Mutex::new(decoder)),
            tokenizer: Arc::new(tokenizer),
            model_name,
            bos_token_id,
            eos_token_id,
        })
    }

    fn decode_settings(&self, params: &GenerationParams) -> DecodeSettings {
        DecodeSettings {
            decoder_start_token_id: self.eos_token_id,
            forced_bos_token_id: Some(self.bos_token_id),
            forced_eos_token_id: Some(self.eos_token_id),
            eos_token_id: self.eos_token_id,
            ..DecodeSettings::bart(params)
        }
    }

    /// Tokenize, encode once, decode greedily, detokenize.
    fn generate_sync(
        &self,
        text: &str,
        params: &GenerationParams,
        cancel: &AtomicBool,
    ) -> SummarizeResult<String> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| inference_error("Tokenization failed", e))?;

        let mut input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        if input_ids.len() > MAX_SOURCE_TOKENS {
            input_ids.truncate(MAX_SOURCE_TOKENS - 1);
            input_ids.push(self.eos_token_id as i64);
        }
        let source_len = input_ids.len();
        let attention_mask = vec![1i64; source_len];

        let (hidden_shape, hidden_states) = self.encode(input_ids, attention_mask.clone())?;

        let mut steps = DecoderSteps {
            session: &self.decoder,
            attention_mask,
            hidden_shape,
            hidden_states,
        };
        let tokens = greedy_decode(&mut steps, &self.decode_settings(params), cancel)?;
        debug!(source_tokens = source_len, summary_tokens = tokens.len(), "Decoded summary");

        let summary = self
            .tokenizer
            .decode(&tokens, true)
            .map_err(|e| inference_error("Detokenization failed", e))?;
        Ok(summary.trim().to_string())
    }

    /// Run the encoder; returns the hidden-state shape and flat data.
    fn encode(
        &self,
        input_ids: Vec<i64>,
        attention_mask: Vec<i64>,
    ) -> SummarizeResult<(Vec<usize>, Vec<f32>)> {
        let len = input_ids.len();
        let ids = Tensor::from_array(([1usize, len], input_ids))
            .map_err(|e| inference_error("input_ids tensor", e))?;
        let mask = Tensor::from_array(([1usize, len], attention_mask))
            .map_err(|e| inference_error("attention_mask tensor", e))?;

        let mut session = self
            .encoder
            .lock()
            .map_err(|e| inference_error("Encoder lock poisoned", e))?;
        let outputs = session
            .run(ort::inputs![
                "input_ids" => ids,
                "attention_mask" => mask,
            ])
            .map_err(|e| inference_error("Encoder inference failed", e))?;

        let (shape, data) = outputs["last_hidden_state"]
            .try_extract_tensor::<f32>()
            .map_err(|e| inference_error("Extract encoder output", e))?;
        let shape: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
        if shape.len() != 3 {
            return Err(SummarizeError::Model(format!(
                "Unexpected encoder output shape: {:?}",
                shape
            )));
        }
        Ok((shape, data.to_vec()))
    }
}

/// Decoder state for one generation: encoder outputs reused at every step.
struct DecoderSteps<'a> {
    session: &'a Mutex<Session>,
    attention_mask: Vec<i64>,
    hidden_shape: Vec<usize>,
    hidden_states: Vec<f32>,
}

impl LogitsSource for DecoderSteps<'_> {
    fn next_token_logits(&mut self, prefix: &[u32]) -> SummarizeResult<Vec<f32>> {
        let prefix_len = prefix.len();
        let ids: Vec<i64> = prefix.iter().map(|&t| t as i64).collect();

        let ids = Tensor::from_array(([1usize, prefix_len], ids))
            .map_err(|e| inference_error("decoder input_ids tensor", e))?;
        let mask = Tensor::from_array(([1usize, self.attention_mask.len()], self.attention_mask.clone()))
            .map_err(|e| inference_error("encoder_attention_mask tensor", e))?;
        let hidden = Tensor::from_array((
            [self.hidden_shape[0], self.hidden_shape[1], self.hidden_shape[2]],
            self.hidden_states.clone(),
        ))
        .map_err(|e| inference_error("encoder_hidden_states tensor", e))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| inference_error("Decoder lock poisoned", e))?;
        let outputs = session
            .run(ort::inputs![
                "input_ids" => ids,
                "encoder_attention_mask" => mask,
                "encoder_hidden_states" => hidden,
            ])
            .map_err(|e| inference_error("Decoder inference failed", e))?;

        // logits: [1, prefix_len, vocab]; keep the last position
        let (shape, data) = outputs["logits"]
            .try_extract_tensor::<f32>()
            .map_err(|e| inference_error("Extract logits", e))?;
        let vocab = shape.last().copied().unwrap_or(0) as usize;
        if vocab == 0 || data.len() < vocab {
            return Err(SummarizeError::Model(format!(
                "Unexpected logits shape: {:?}",
                shape.iter().collect::<Vec<_>>()
            )));
        }
        Ok(data[data.len() - vocab..].to_vec())
    }
}

/// Raises the flag when dropped, so a blocking generation stops once the
/// future awaiting it is gone (for example after a timeout).
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

#[async_trait]
impl Summarizer for OnnxSummarizer {
    async fn generate(&self, text: &str, params: &GenerationParams) -> SummarizeResult<String> {
        // ONNX Runtime inference is CPU-bound; run on a blocking thread.
        let model = self.clone();
        let text = text.to_string();
        let params = *params;
        let cancel = Arc::new(AtomicBool::new(false));
        let _guard = CancelOnDrop(Arc::clone(&cancel));

        tokio::task::spawn_blocking(move || model.generate_sync(&text, &params, &cancel))
            .await
            .map_err(|e| SummarizeError::Model(format!("Summarization task panicked: {}", e)))?
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
