//! MCP session over streamable HTTP.
//!
//! Every JSON-RPC message is POSTed to the endpoint. The server answers
//! either with a JSON body or with a `text/event-stream` body whose `data:`
//! lines carry the response. A `Mcp-Session-Id` header returned by the
//! handshake is echoed on every later request.

use crate::protocol::*;
use crate::source::CapabilitySource;
use crate::REQUEST_TIMEOUT;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use toklens_core::{ToklensError, ToklensResult};
use tracing::{debug, info};

const SESSION_HEADER: &str = "mcp-session-id";

/// MCP session with a remote server over streamable HTTP.
pub struct HttpSession {
    client: reqwest::Client,
    endpoint: String,
    session_id: Option<String>,
    next_id: AtomicU64,
    init: InitializeResult,
}

impl HttpSession {
    /// Build a client sending `headers` on every request and perform the
    /// initialization handshake against `endpoint`.
    pub async fn connect(endpoint: &str, headers: &HashMap<String, String>) -> ToklensResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(header_map(headers)?)
            .build()
            .map_err(|e| ToklensError::Connect(format!("failed to build HTTP client: {e}")))?;

        let mut session = Self {
            client,
            endpoint: endpoint.to_string(),
            session_id: None,
            next_id: AtomicU64::new(1),
            init: InitializeResult::default(),
        };

        let (resp, session_id) = session
            .post_request("initialize", Some(initialize_params()))
            .await
            .map_err(|e| match e {
                ToklensError::Protocol(msg) => ToklensError::Connect(format!(
                    "failed to connect to MCP server at {endpoint}: {msg}"
                )),
                other => other,
            })?;
        session.session_id = session_id;
        session.init = serde_json::from_value(resp.into_result("initialize")?).map_err(|e| {
            ToklensError::Protocol(format!("failed to parse initialize result: {e}"))
        })?;
        info!(
            endpoint = %session.endpoint,
            version = %session.init.protocol_version,
            "MCP server initialized"
        );

        session
            .send(&notification("notifications/initialized"))
            .await?;

        Ok(session)
    }

    fn post(&self) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .post(&self.endpoint)
            .header(ACCEPT, "application/json, text/event-stream");
        match &self.session_id {
            Some(id) => builder.header(SESSION_HEADER, id),
            None => builder,
        }
    }

    /// POST a message whose reply is not needed.
    async fn send(&self, msg: &serde_json::Value) -> ToklensResult<()> {
        let resp = self
            .post()
            .json(msg)
            .send()
            .await
            .map_err(|e| ToklensError::Protocol(format!("HTTP request failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(ToklensError::Protocol(format!(
                "HTTP {} from {}",
                resp.status(),
                self.endpoint
            )));
        }
        Ok(())
    }

    /// POST a request and decode its response. Also returns the session id
    /// header if the server set one.
    async fn post_request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> ToklensResult<(JsonRpcResponse, Option<String>)> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let req = JsonRpcRequest::new(id, method, params);

        let resp = self
            .post()
            .json(&req)
            .send()
            .await
            .map_err(|e| ToklensError::Protocol(format!("HTTP request '{method}' failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ToklensError::Protocol(format!(
                "HTTP {status} from {} for '{method}'",
                self.endpoint
            )));
        }

        let session_id = resp
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let is_sse = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));

        let body = resp
            .text()
            .await
            .map_err(|e| ToklensError::Protocol(format!("failed to read '{method}' body: {e}")))?;
        debug!(method, bytes = body.len(), sse = is_sse, "MCP HTTP response");

        let parsed = if is_sse {
            response_from_sse(&body, id)
        } else {
            serde_json::from_str::<JsonRpcResponse>(&body).ok()
        };

        parsed
            .map(|r| (r, session_id))
            .ok_or_else(|| ToklensError::Protocol(format!("no JSON-RPC response to '{method}'")))
    }
}

#[async_trait]
impl CapabilitySource for HttpSession {
    fn initialize_result(&self) -> Option<&InitializeResult> {
        Some(&self.init)
    }

    async fn list_page(&self, kind: ListKind, cursor: Option<String>) -> ToklensResult<Page> {
        let (resp, _) = self
            .post_request(kind.method(), kind.params(cursor.as_deref()))
            .await?;
        Page::from_result(kind, resp.into_result(kind.method())?)
    }

    async fn close(&self) -> ToklensResult<()> {
        // Servers may not support explicit termination; failures are ignored.
        if let Some(id) = &self.session_id {
            let _ = self
                .client
                .delete(&self.endpoint)
                .header(SESSION_HEADER, id)
                .send()
                .await;
        }
        Ok(())
    }
}

fn header_map(headers: &HashMap<String, String>) -> ToklensResult<HeaderMap> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ToklensError::Connect(format!("invalid header name {name:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ToklensError::Connect(format!("invalid value for header {name}: {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

/// Find the response with `id` among the `data:` payloads of an SSE body.
///
/// Events end at a blank line; `\n` and `\r\n` line endings are both accepted.
fn response_from_sse(body: &str, id: u64) -> Option<JsonRpcResponse> {
    let mut data: Vec<&str> = Vec::new();

    for line in body.lines().chain(std::iter::once("")) {
        if !line.is_empty() {
            if let Some(d) = line.strip_prefix("data:") {
                data.push(d.strip_prefix(' ').unwrap_or(d));
            }
            continue;
        }
        if data.is_empty() {
            continue;
        }
        let payload = data.join("\n");
        data.clear();
        if let Ok(resp) = serde_json::from_str::<JsonRpcResponse>(&payload) {
            if resp.id == Some(id) {
                return Some(resp);
            }
        }
    }

    None
}
