//! Token accounting for MCP server artifacts.
//!
//! [`TokenCounter`] wraps a pluggable [`Tokenizer`] and turns tool, prompt,
//! resource and resource-template definitions into per-field token counts.
//! [`analyze_source`] drives one connected server through every artifact
//! category and produces a [`ServerAnalysis`].
//!
//! # Main types
//!
//! - [`Tokenizer`] — Counts tokens in a string.
//! - [`TokenCounter`] — Thread-safe counting and per-artifact analysis.
//! - [`ToolTokens`], [`PromptTokens`], [`ResourceTokens`] — Accumulable stats.
//! - [`ServerAnalysis`] — Everything measured for one server.

/// Thread-safe counting façade and per-artifact analysis.
pub mod counter;
/// Drives a capability source through all artifact categories.
pub mod engine;
/// Accumulable token statistics.
pub mod stats;
/// The tokenizer seam and its implementations.
pub mod tokenizer;

pub use counter::TokenCounter;
pub use engine::{analyze_source, ServerAnalysis};
pub use stats::{PromptTokens, ResourceTokens, TokenStats, ToolTokens, TOTAL_LABEL};
pub use tokenizer::{ApproxTokenizer, TiktokenTokenizer, Tokenizer, DEFAULT_ENCODING};
