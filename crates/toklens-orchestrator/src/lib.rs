//! Concurrent, failure-isolated analysis of many MCP servers.
//!
//! [`Orchestrator::run_all`] runs one connect-and-analyze unit per configured
//! server under a fixed concurrency ceiling and gathers a [`ServerResult`] for
//! each. Failures stay inside their own result; the batch as a whole reports
//! only how many servers failed.
//!
//! # Main types
//!
//! - [`Orchestrator`] — Bounded fan-out over a [`toklens_mcp::Connector`].
//! - [`ServerResult`] — A server's display name and analysis or error.
//! - [`AnalysisOutcome`] — Sorted results of one batch.

/// Bounded fan-out and per-server units of work.
pub mod engine;
/// Per-server and per-batch result types.
pub mod result;

pub use engine::{Orchestrator, DEFAULT_CONCURRENCY};
pub use result::{resolve_server_name, AnalysisOutcome, ServerResult, UNKNOWN_SERVER};
