//! Core error definitions for the toklens workspace.
//!
//! Every toklens crate reports failures through [`ToklensError`]. The variants
//! follow the failure taxonomy of the tool: construction and validation
//! errors abort a run before any connection is attempted, while connect,
//! listing and item errors are captured per server and never escape the
//! orchestrator.
//!
//! # Main types
//!
//! - [`ToklensError`] — Unified error enum for all toklens subsystems.
//! - [`ToklensResult`] — Convenience alias for `Result<T, ToklensError>`.
//! - [`ValidationErrors`] — Aggregate of every per-server validation problem.

use std::fmt;

// --- Error types ---

/// Top-level error type for toklens.
///
/// Each variant corresponds to a subsystem that can produce errors.
#[derive(Debug, thiserror::Error)]
pub enum ToklensError {
    /// Malformed or unreadable configuration payload.
    #[error("Config error: {0}")]
    Config(String),

    /// One or more server definitions failed validation.
    #[error("invalid config: {0}")]
    Validation(ValidationErrors),

    /// A dotenv-style file could not be read or parsed.
    #[error("Env file error: {0}")]
    EnvFile(String),

    /// A relative env-file reference escaped the config directory.
    #[error("envFile {path:?} resolves outside the config directory")]
    PathConfinement {
        /// The env-file reference as written in the config.
        path: String,
    },

    /// The tokenizer could not be constructed for the requested model.
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// Establishing a session with a server failed.
    #[error("Connect error: {0}")]
    Connect(String),

    /// The server answered with something that is not a valid protocol message.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A paginated listing failed part way through.
    #[error("Listing error: {0}")]
    Listing(String),

    /// A single artifact could not be analyzed.
    #[error("Item error: {0}")]
    Item(String),

    /// A unit of work panicked; the panic was contained to its own server.
    #[error("analysis panicked: {0}")]
    Panicked(String),

    /// The run was cancelled before this unit of work finished.
    #[error("cancelled")]
    Cancelled,

    /// Some servers in a batch failed; per-server details live in the results.
    #[error("{failed} of {total} servers failed analysis")]
    PartialFailure {
        /// Number of servers whose analysis failed.
        failed: usize,
        /// Number of servers attempted.
        total: usize,
    },

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`ToklensError`].
pub type ToklensResult<T> = Result<T, ToklensError>;

/// Every per-server problem found while validating a configuration.
///
/// Displayed as a single message with the entries joined by `"; "`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    messages: Vec<String>,
}

impl ValidationErrors {
    /// Creates an empty aggregate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one problem.
    pub fn push(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    /// Returns `true` when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The recorded messages in insertion order.
    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// Converts the aggregate into `Ok(())` when empty, or a
    /// [`ToklensError::Validation`] otherwise.
    pub fn into_result(self) -> ToklensResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ToklensError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.messages.join("; "))
    }
}
