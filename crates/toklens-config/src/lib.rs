//! Configuration model for toklens.
//!
//! Reads MCP configuration files in either of the two dialects in common use
//! (`mcpServers` and `servers`), infers and normalizes each server's
//! transport, validates the result, and resolves per-server environment
//! overlays from inline maps and dotenv-style files.
//!
//! # Main types
//!
//! - [`Config`] — Both dialect maps plus a memoized merged view.
//! - [`ServerConfig`] — A single server definition.
//! - [`Transport`] — The transport kind declared or inferred for a server.

/// Config file model, inference, validation and warnings.
pub mod config;
/// Dotenv-style file loading and per-server env merging.
pub mod env;

pub use config::{load_config, Config, OAuthConfig, ServerConfig, TlsConfig, Transport};
pub use env::{load_env_file, merge_server_env, parse_env};
