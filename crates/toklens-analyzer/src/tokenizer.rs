use tiktoken_rs::CoreBPE;
use toklens_core::{ToklensError, ToklensResult};

/// Encoding used when no model or encoding name is given.
pub const DEFAULT_ENCODING: &str = "cl100k_base";

/// Counts tokens in text.
///
/// Implementations need not be reentrant; [`crate::TokenCounter`] serializes
/// access.
pub trait Tokenizer: Send {
    /// Number of tokens `text` encodes to.
    fn count(&self, text: &str) -> usize;
}

/// BPE tokenizer backed by `tiktoken-rs`.
pub struct TiktokenTokenizer {
    bpe: CoreBPE,
}

impl TiktokenTokenizer {
    /// Resolve `name` as an encoding name first, then as a model name.
    /// An empty name selects [`DEFAULT_ENCODING`].
    pub fn for_name(name: &str) -> ToklensResult<Self> {
        let name = if name.is_empty() { DEFAULT_ENCODING } else { name };

        let bpe = match name {
            "cl100k_base" => tiktoken_rs::cl100k_base(),
            "o200k_base" => tiktoken_rs::o200k_base(),
            "p50k_base" => tiktoken_rs::p50k_base(),
            "p50k_edit" => tiktoken_rs::p50k_edit(),
            "r50k_base" => tiktoken_rs::r50k_base(),
            model => tiktoken_rs::get_bpe_from_model(model),
        }
        .map_err(|e| ToklensError::Tokenizer(format!("failed to get encoding for {name:?}: {e}")))?;

        Ok(Self { bpe })
    }
}

impl Tokenizer for TiktokenTokenizer {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }
}

/// Rough estimate of four bytes per token, rounded down.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproxTokenizer;

impl Tokenizer for ApproxTokenizer {
    fn count(&self, text: &str) -> usize {
        text.len() / 4
    }
}
