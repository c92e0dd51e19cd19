//! Greedy sequence decoding for encoder-decoder summarizers.
//!
//! The decoding rules are kept apart from the inference runtime: anything that
//! can produce next-token logits for a prefix implements [`LogitsSource`].

use std::sync::atomic::{AtomicBool, Ordering};

use super::{GenerationParams, SummarizeError, SummarizeResult};

/// Token ids and rules that shape generation for a BART-style model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeSettings {
    /// Maximum total sequence length, start tokens included
    pub max_length: usize,

    /// EOS is suppressed while the sequence is shorter than this
    pub min_length: usize,

    /// An n-gram of this size may not appear twice (0 disables)
    pub no_repeat_ngram_size: usize,

    /// First token fed to the decoder
    pub decoder_start_token_id: u32,

    /// Token forced as the first generated token
    pub forced_bos_token_id: Option<u32>,

    /// Token forced at the last position when nothing ended the sequence
    pub forced_eos_token_id: Option<u32>,

    pub eos_token_id: u32,
}

impl DecodeSettings {
    /// BART CNN defaults (`</s>` = 2 starts decoding, `<s>` = 0 is forced first).
    pub fn bart(params: &GenerationParams) -> Self {
        Self {
            max_length: params.max_length,
            min_length: params.min_length,
            no_repeat_ngram_size: 3,
            decoder_start_token_id: 2,
            forced_bos_token_id: Some(0),
            forced_eos_token_id: Some(2),
            eos_token_id: 2,
        }
    }
}

/// Produces next-token logits for a decoder prefix.
pub trait LogitsSource {
    /// Logits over the vocabulary for the token following `prefix`.
    fn next_token_logits(&mut self, prefix: &[u32]) -> SummarizeResult<Vec<f32>>;
}

/// Tokens that would complete an n-gram already present in `sequence`.
fn banned_tokens(sequence: &[u32], ngram_size: usize) -> Vec<u32> {
    if ngram_size == 0 || sequence.len() + 1 < ngram_size {
        return Vec::new();
    }
    let prefix_len = ngram_size - 1;
    let current = &sequence[sequence.len() - prefix_len..];
    sequence
        .windows(ngram_size)
        .filter(|window| &window[..prefix_len] == current)
        .map(|window| window[prefix_len])
        .collect()
}

/// Index of the largest logit; the first one wins ties.
fn argmax(logits: &[f32]) -> Option<u32> {
    logits
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (i, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i as u32)
}

/// Deterministic greedy decoding.
///
/// Returns the whole sequence, including the decoder start token and the
/// terminating EOS if one was produced. `cancel` is checked before every step;
/// once set, decoding stops with [`SummarizeError::Cancelled`].
pub fn greedy_decode<L: LogitsSource>(
    source: &mut L,
    settings: &DecodeSettings,
    cancel: &AtomicBool,
) -> SummarizeResult<Vec<u32>> {
    let mut sequence = vec![settings.decoder_start_token_id];

    while sequence.len() < settings.max_length {
        if cancel.load(Ordering::Relaxed) {
            return Err(SummarizeError::Cancelled);
        }
        let position = sequence.len();

        let forced = match (settings.forced_bos_token_id, settings.forced_eos_token_id) {
            (Some(bos), _) if position == 1 => Some(bos),
            (_, Some(eos)) if position + 1 == settings.max_length => Some(eos),
            _ => None,
        };

        let next = match forced {
            Some(token) => token,
            None => {
                let mut logits = source.next_token_logits(&sequence)?;
                if logits.is_empty() {
                    return Err(SummarizeError::Model("decoder returned no logits".to_string()));
                }
                if position < settings.min_length {
                    if let Some(l) = logits.get_mut(settings.eos_token_id as usize) {
                        *l = f32::NEG_INFINITY;
                    }
                }
                for token in banned_tokens(&sequence, settings.no_repeat_ngram_size) {
                    if let Some(l) = logits.get_mut(token as usize) {
                        *l = f32::NEG_INFINITY;
                    }
                }
                argmax(&logits).ok_or_else(|| {
                    SummarizeError::Model("decoder returned no logits".to_string())
                })?
            }
        };

        sequence.push(next);
        if next == settings.eos_token_id && position >= settings.min_length {
            break;
        }
    }

    Ok(sequence)
}
