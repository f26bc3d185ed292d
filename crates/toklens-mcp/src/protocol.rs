//! MCP (Model Context Protocol) JSON-RPC 2.0 message types.

use serde::{Deserialize, Serialize};
use toklens_core::{ToklensError, ToklensResult};

/// Protocol revision requested during the handshake.
pub const PROTOCOL_VERSION: &str = "2025-03-26";

/// JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    /// Always `"2.0"`.
    pub jsonrpc: &'static str,
    /// Request id.
    pub id: u64,
    /// Method name.
    pub method: String,
    /// Method parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    /// Build a request with the `2.0` version tag.
    pub fn new(id: u64, method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC 2.0 notification (no id, no response).
pub fn notification(method: &str) -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
    })
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    /// Matches the request id; `None` for notifications.
    pub id: Option<u64>,
    /// Successful result, if any.
    pub result: Option<serde_json::Value>,
    /// Error object, if any.
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Unwrap the `result` member, turning a JSON-RPC error into [`ToklensError::Protocol`].
    pub fn into_result(self, method: &str) -> ToklensResult<serde_json::Value> {
        if let Some(err) = self.error {
            return Err(ToklensError::Protocol(format!(
                "{method}: MCP error {}: {}",
                err.code, err.message
            )));
        }
        self.result
            .ok_or_else(|| ToklensError::Protocol(format!("{method}: empty result")))
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    /// JSON-RPC error code.
    pub code: i64,
    /// Human-readable error message.
    pub message: String,
}

/// Parameters for the `initialize` request.
pub fn initialize_params() -> serde_json::Value {
    serde_json::json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": "toklens",
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}

/// Name and version of an MCP implementation.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Implementation {
    /// Name.
    #[serde(default)]
    pub name: String,
    /// Version.
    #[serde(default)]
    pub version: String,
}

/// MCP initialize response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// Protocol revision the server agreed to.
    #[serde(default)]
    pub protocol_version: String,
    /// Capabilities the server advertises.
    #[serde(default)]
    pub capabilities: serde_json::Value,
    /// Server name and version, if reported.
    #[serde(default)]
    pub server_info: Option<Implementation>,
    /// Free-form usage guidance for the model.
    #[serde(default)]
    pub instructions: Option<String>,
}

/// MCP tool definition from the `tools/list` response.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    /// Name.
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// JSON Schema of the arguments.
    #[serde(default)]
    pub input_schema: serde_json::Value,
    /// JSON Schema of structured results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,
    /// Behaviour hints such as `readOnlyHint`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<serde_json::Value>,
}

/// One declared argument of a prompt.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PromptArgument {
    /// Name.
    pub name: String,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the argument must be supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
}

/// MCP prompt definition from the `prompts/list` response.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Prompt {
    /// Name.
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Declared arguments; `None` when the server omits the list.
    #[serde(default)]
    pub arguments: Option<Vec<PromptArgument>>,
}

/// MCP resource from the `resources/list` response.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// Resource URI.
    pub uri: String,
    /// Name.
    #[serde(default)]
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// MIME type, if declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// MCP resource template from the `resources/templates/list` response.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTemplate {
    /// RFC 6570 URI template.
    pub uri_template: String,
    /// Name.
    #[serde(default)]
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// MIME type, if declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// The four listable artifact categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListKind {
    /// `tools/list`
    Tools,
    /// `prompts/list`
    Prompts,
    /// `resources/list`
    Resources,
    /// `resources/templates/list`
    ResourceTemplates,
}

impl ListKind {
    /// JSON-RPC method name.
    pub fn method(self) -> &'static str {
        match self {
            ListKind::Tools => "tools/list",
            ListKind::Prompts => "prompts/list",
            ListKind::Resources => "resources/list",
            ListKind::ResourceTemplates => "resources/templates/list",
        }
    }

    /// Member of the result object holding the items.
    pub fn field(self) -> &'static str {
        match self {
            ListKind::Tools => "tools",
            ListKind::Prompts => "prompts",
            ListKind::Resources => "resources",
            ListKind::ResourceTemplates => "resourceTemplates",
        }
    }

    /// Human-readable category label used in logs.
    pub fn label(self) -> &'static str {
        match self {
            ListKind::Tools => "tools",
            ListKind::Prompts => "prompts",
            ListKind::Resources => "resources",
            ListKind::ResourceTemplates => "resource templates",
        }
    }

    /// Request parameters for one page.
    pub fn params(self, cursor: Option<&str>) -> Option<serde_json::Value> {
        cursor.map(|c| serde_json::json!({ "cursor": c }))
    }
}

/// Artifact types that can be listed.
pub trait Listable: serde::de::DeserializeOwned + Send + 'static {
    /// Category this type is listed under.
    const KIND: ListKind;

    /// Name used when reporting on a single item.
    fn item_name(&self) -> &str;
}

impl Listable for Tool {
    const KIND: ListKind = ListKind::Tools;

    fn item_name(&self) -> &str {
        &self.name
    }
}

impl Listable for Prompt {
    const KIND: ListKind = ListKind::Prompts;

    fn item_name(&self) -> &str {
        &self.name
    }
}

impl Listable for Resource {
    const KIND: ListKind = ListKind::Resources;

    fn item_name(&self) -> &str {
        &self.name
    }
}

impl Listable for ResourceTemplate {
    const KIND: ListKind = ListKind::ResourceTemplates;

    fn item_name(&self) -> &str {
        &self.name
    }
}

/// One page of a paginated listing, items still undecoded.
#[derive(Debug, Clone, Default)]
pub struct Page {
    /// Raw items, decoded lazily by [`crate::list`].
    pub items: Vec<serde_json::Value>,
    /// Cursor for the next page; `None` on the last one.
    pub next_cursor: Option<String>,
}

impl Page {
    /// Extract a page from a listing method's `result` object.
    pub fn from_result(kind: ListKind, result: serde_json::Value) -> ToklensResult<Self> {
        let mut result = match result {
            serde_json::Value::Object(map) => map,
            other => {
                return Err(ToklensError::Protocol(format!(
                    "{}: expected object result, got {other}",
                    kind.method()
                )))
            }
        };

        let items = match result.remove(kind.field()) {
            Some(serde_json::Value::Array(items)) => items,
            None | Some(serde_json::Value::Null) => Vec::new(),
            Some(other) => {
                return Err(ToklensError::Protocol(format!(
                    "{}: '{}' is not an array: {other}",
                    kind.method(),
                    kind.field()
                )))
            }
        };

        let next_cursor = result
            .get("nextCursor")
            .and_then(|c| c.as_str())
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        Ok(Self { items, next_cursor })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_rpc_request_serialization() {
        let req = JsonRpcRequest::new(1, "tools/list", Some(serde_json::json!({"cursor": "c1"})));
        let parsed: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&req).unwrap()).unwrap();
        assert_eq!(parsed["jsonrpc"], "2.0");
        assert_eq!(parsed["id"], 1);
        assert_eq!(parsed["method"], "tools/list");
        assert_eq!(parsed["params"]["cursor"], "c1");
    }

    #[test]
    fn test_json_rpc_request_no_params() {
        let req = JsonRpcRequest::new(2, "prompts/list", None);
        let parsed = serde_json::to_value(&req).unwrap();
        assert!(parsed.get("params").is_none());
    }

    #[test]
    fn test_json_rpc_error_into_result() {
        let resp: JsonRpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"Method not found"}}"#,
        )
        .unwrap();
        let err = resp.into_result("prompts/list").unwrap_err();
        assert!(err.to_string().contains("-32601"));
        assert!(err.to_string().contains("Method not found"));
    }

    #[test]
    fn test_initialize_result_parse() {
        let json = r#"{"protocolVersion":"2025-03-26","capabilities":{"tools":{}},
            "serverInfo":{"name":"test-server","version":"1.0"},"instructions":"Use wisely."}"#;
        let result: InitializeResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.server_info.unwrap().name, "test-server");
        assert_eq!(result.instructions.as_deref(), Some("Use wisely."));
    }

    #[test]
    fn test_tool_parse() {
        let json = r#"{"name":"read_file","description":"Read a file",
            "inputSchema":{"type":"object","properties":{"path":{"type":"string"}}},
            "annotations":{"readOnlyHint":true}}"#;
        let tool: Tool = serde_json::from_str(json).unwrap();
        assert_eq!(tool.name, "read_file");
        assert!(tool.output_schema.is_none());
        assert_eq!(tool.annotations.unwrap()["readOnlyHint"], true);
    }

    #[test]
    fn test_page_from_result() {
        let page = Page::from_result(
            ListKind::ResourceTemplates,
            serde_json::json!({"resourceTemplates": [{"uriTemplate": "file:///{path}"}], "nextCursor": "2"}),
        )
        .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.next_cursor.as_deref(), Some("2"));

        let last = Page::from_result(ListKind::Tools, serde_json::json!({"tools": [], "nextCursor": ""}))
            .unwrap();
        assert!(last.next_cursor.is_none());
    }

    #[test]
    fn test_page_rejects_non_array() {
        let err = Page::from_result(ListKind::Prompts, serde_json::json!({"prompts": 3})).unwrap_err();
        assert!(matches!(err, ToklensError::Protocol(_)));
    }
}
