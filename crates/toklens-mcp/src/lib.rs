//! Model Context Protocol client for toklens.
//!
//! Only the handshake and the four listing methods are implemented; that is
//! all toklens needs to measure what a server advertises.
//!
//! # Main types
//!
//! - [`CapabilitySource`] — A connected session that can be listed.
//! - [`NamedSession`] — A session paired with its configured display name.
//! - [`Connector`] / [`McpConnector`] — Open sessions from a [`toklens_config::ServerConfig`].
//! - [`list`] — Paginated listing as a lazy stream.

/// Connecting sessions from server configuration.
pub mod connector;
/// Streamable HTTP transport.
pub mod http;
/// JSON-RPC 2.0 and MCP message types.
pub mod protocol;
/// The capability-source abstraction and paginated listing.
pub mod source;
/// Subprocess stdio transport.
pub mod stdio;

pub use connector::{Connector, McpConnector};
pub use http::HttpSession;
pub use protocol::{
    Implementation, InitializeResult, ListKind, Listable, Page, Prompt, PromptArgument, Resource,
    ResourceTemplate, Tool,
};
pub use source::{list, CapabilitySource, NamedSession};
pub use stdio::StdioSession;

use std::time::Duration;

/// Upper bound on any single request, and the HTTP client timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
