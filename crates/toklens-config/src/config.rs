use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use toklens_core::{ToklensError, ToklensResult, ValidationErrors};
use tracing::debug;

/// Transport used to reach an MCP server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Transport {
    /// Spawn a process and speak JSON-RPC over its stdin/stdout.
    Stdio,
    /// Streamable HTTP.
    Http,
    /// `streamable-http`, an alias some clients write for [`Transport::Http`].
    StreamableHttp,
    /// Any other value found in a config file. Rejected by validation.
    Unknown(String),
}

impl Transport {
    /// The value as written in a config file.
    pub fn as_str(&self) -> &str {
        match self {
            Transport::Stdio => "stdio",
            Transport::Http => "http",
            Transport::StreamableHttp => "streamable-http",
            Transport::Unknown(other) => other,
        }
    }
}

impl From<&str> for Transport {
    fn from(value: &str) -> Self {
        match value {
            "stdio" => Transport::Stdio,
            "http" => Transport::Http,
            "streamable-http" => Transport::StreamableHttp,
            other => Transport::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Transport {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// `"type": ""` is treated the same as an absent type.
fn deserialize_transport<'de, D>(deserializer: D) -> Result<Option<Transport>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .filter(|s| !s.is_empty())
        .map(|s| Transport::from(s.as_str())))
}

/// A `null` dialect map is the same as an absent one.
fn null_as_empty<'de, D>(deserializer: D) -> Result<HashMap<String, ServerConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<HashMap<String, ServerConfig>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Configuration for a single MCP server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Taken from the map key during parsing, never from the entry itself.
    #[serde(skip)]
    pub name: String,
    /// Explicit transport, or `None` until [`Config::infer_defaults`] runs.
    #[serde(
        rename = "type",
        default,
        deserialize_with = "deserialize_transport",
        skip_serializing_if = "Option::is_none"
    )]
    pub transport: Option<Transport>,
    /// Executable for stdio servers.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub command: String,
    /// Arguments for stdio servers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Endpoint for HTTP servers.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    /// Extra headers sent with every HTTP request.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    /// Inline environment overlay. Overrides entries from `env_file`.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
    /// Dotenv-style file, relative to the config file's directory unless absolute.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub env_file: String,
    /// OAuth client credentials. Parsed but not enforced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<OAuthConfig>,
    /// Custom TLS trust settings. Parsed but not enforced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,
}

impl ServerConfig {
    /// A stdio server running `command` with `args`.
    pub fn stdio(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            ..Self::default()
        }
    }

    /// An HTTP server at `url`.
    pub fn http(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    fn has_auth(&self) -> bool {
        self.auth
            .as_ref()
            .is_some_and(|a| !a.client_id.is_empty() || !a.client_secret.is_empty())
    }

    fn has_tls(&self) -> bool {
        self.tls.as_ref().is_some_and(|t| {
            t.insecure_skip_verify
                || !t.ca_cert_file.is_empty()
                || !t.client_cert_file.is_empty()
                || !t.client_key_file.is_empty()
        })
    }
}

/// OAuth 2.0 client credentials (Cursor format). Not enforced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// Client identifier.
    #[serde(rename = "CLIENT_ID", default)]
    pub client_id: String,
    /// Client secret.
    #[serde(rename = "CLIENT_SECRET", default)]
    pub client_secret: String,
    /// Requested scopes.
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// Custom TLS settings for HTTP servers. Not enforced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsConfig {
    /// Skip certificate verification.
    #[serde(default)]
    pub insecure_skip_verify: bool,
    /// Extra CA bundle.
    #[serde(default)]
    pub ca_cert_file: String,
    /// Client certificate for mutual TLS.
    #[serde(default)]
    pub client_cert_file: String,
    /// Client key for mutual TLS.
    #[serde(default)]
    pub client_key_file: String,
}

/// A parsed MCP configuration file.
///
/// Holds the Claude/Cursor dialect (`mcpServers`) and the VS Code dialect
/// (`servers`) side by side. On a name collision the `mcpServers` entry wins
/// in full.
///
/// The configuration is mutated only by [`Config::infer_defaults`]; after
/// that it is read-only and may be shared freely between workers.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default, rename = "mcpServers", deserialize_with = "null_as_empty")]
    mcp_servers: HashMap<String, ServerConfig>,
    #[serde(default, deserialize_with = "null_as_empty")]
    servers: HashMap<String, ServerConfig>,
    #[serde(skip)]
    merged: OnceLock<HashMap<String, Arc<ServerConfig>>>,
}

impl Clone for Config {
    fn clone(&self) -> Self {
        Self::from_dialects(self.mcp_servers.clone(), self.servers.clone())
    }
}

impl Config {
    /// Parse a configuration from JSON bytes, naming every server after its map key.
    pub fn parse(data: &[u8]) -> ToklensResult<Self> {
        let cfg: Config = serde_json::from_slice(data)
            .map_err(|e| ToklensError::Config(format!("failed to parse config JSON: {e}")))?;
        Ok(Self::from_dialects(cfg.mcp_servers, cfg.servers))
    }

    /// Build a configuration from already-deserialized dialect maps.
    pub fn from_dialects(
        mut mcp_servers: HashMap<String, ServerConfig>,
        mut servers: HashMap<String, ServerConfig>,
    ) -> Self {
        for (name, srv) in mcp_servers.iter_mut().chain(servers.iter_mut()) {
            srv.name.clone_from(name);
        }
        Self {
            mcp_servers,
            servers,
            merged: OnceLock::new(),
        }
    }

    /// A configuration holding one unnamed server, used for ad-hoc runs.
    ///
    /// The empty key makes the display name fall back to whatever the server
    /// reports during its handshake.
    pub fn ad_hoc(server: ServerConfig) -> Self {
        Self::from_dialects(HashMap::from([(String::new(), server)]), HashMap::new())
    }

    /// Servers declared under `mcpServers`.
    pub fn mcp_servers(&self) -> &HashMap<String, ServerConfig> {
        &self.mcp_servers
    }

    /// Servers declared under `servers`.
    pub fn servers(&self) -> &HashMap<String, ServerConfig> {
        &self.servers
    }

    /// All servers from both dialects, `mcpServers` winning on collision.
    ///
    /// The merged view is computed once per instance. Every call returns a
    /// new map; the values are shared with the memoized view.
    pub fn merged_servers(&self) -> HashMap<String, Arc<ServerConfig>> {
        self.merged
            .get_or_init(|| {
                let mut merged: HashMap<String, Arc<ServerConfig>> = self
                    .servers
                    .iter()
                    .map(|(name, srv)| (name.clone(), Arc::new(srv.clone())))
                    .collect();
                for (name, srv) in &self.mcp_servers {
                    merged.insert(name.clone(), Arc::new(srv.clone()));
                }
                merged
            })
            .clone()
    }

    /// Fill in values derivable from other fields.
    ///
    /// Normalizes `streamable-http` to `http`, then gives every server without
    /// a transport `stdio` if it has a command, else `http` if it has a URL.
    /// Servers with neither stay unset and are rejected by [`Config::validate`].
    /// Running this more than once has no further effect.
    pub fn infer_defaults(&mut self) {
        for srv in self.mcp_servers.values_mut().chain(self.servers.values_mut()) {
            if srv.transport == Some(Transport::StreamableHttp) {
                srv.transport = Some(Transport::Http);
            }

            if srv.transport.is_none() {
                if !srv.command.is_empty() {
                    srv.transport = Some(Transport::Stdio);
                } else if !srv.url.is_empty() {
                    srv.transport = Some(Transport::Http);
                }
            }
        }
        // Drop any view memoized before inference.
        self.merged.take();
    }

    /// Check every merged server definition.
    ///
    /// Expects [`Config::infer_defaults`] to have run; performs no inference.
    /// All problems are collected and reported together.
    pub fn validate(&self) -> ToklensResult<()> {
        let servers = self.merged_servers();
        if servers.is_empty() {
            return Err(ToklensError::Config(
                "no servers defined in configuration".into(),
            ));
        }

        let mut errs = ValidationErrors::new();
        for (name, srv) in sorted(&servers) {
            match &srv.transport {
                Some(Transport::Stdio) => {
                    if srv.command.is_empty() {
                        errs.push(format!(
                            "server {name:?}: stdio transport requires 'command' field"
                        ));
                    }
                }
                Some(Transport::Http) => {
                    if srv.url.is_empty() {
                        errs.push(format!(
                            "server {name:?}: http transport requires 'url' field"
                        ));
                    } else if let Err(reason) = validate_url(&srv.url) {
                        errs.push(format!("server {name:?}: invalid url: {reason}"));
                    }
                }
                None => errs.push(format!(
                    "server {name:?}: cannot infer transport type (need 'command' or 'url')"
                )),
                Some(other) => errs.push(format!(
                    "server {name:?}: unknown transport type {:?}",
                    other.as_str()
                )),
            }
        }

        debug!(servers = servers.len(), problems = errs.messages().len(), "config validated");
        errs.into_result()
    }

    /// One message per server carrying credential or TLS settings that are
    /// accepted but not acted on. Does not affect validation.
    pub fn warnings(&self) -> Vec<String> {
        let servers = self.merged_servers();
        let mut warnings = Vec::new();
        for (name, srv) in sorted(&servers) {
            if srv.has_auth() {
                warnings.push(format!(
                    "server {name:?}: OAuth auth config present but not yet implemented (ignored)"
                ));
            }
            if srv.has_tls() {
                warnings.push(format!(
                    "server {name:?}: TLS config present but not yet implemented (ignored)"
                ));
            }
        }
        warnings
    }
}

/// Read and parse a configuration file.
pub fn load_config(path: &Path) -> ToklensResult<Config> {
    let data = std::fs::read(path).map_err(|e| {
        ToklensError::Config(format!(
            "failed to read config file '{}': {e}",
            path.display()
        ))
    })?;
    Config::parse(&data)
}

fn sorted(servers: &HashMap<String, Arc<ServerConfig>>) -> Vec<(&String, &Arc<ServerConfig>)> {
    let mut entries: Vec<_> = servers.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
}

/// Accepts only absolute `http`/`https` URLs with a non-empty host.
fn validate_url(raw: &str) -> Result<(), String> {
    let parsed = url::Url::parse(raw).map_err(|e| format!("malformed URL: {e}"))?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(format!(
            "unsupported scheme {:?} (must be http or https)",
            parsed.scheme()
        ));
    }

    // WHATWG parsing supplies a host for `http:///x` and `http:host`, so the
    // authority must also be present literally.
    let authority = raw
        .split_once("://")
        .map(|(_, rest)| rest.split(['/', '?', '#']).next().unwrap_or_default())
        .unwrap_or_default();
    if authority.is_empty() || parsed.host_str().map_or(true, str::is_empty) {
        return Err("missing host".into());
    }

    Ok(())
}
