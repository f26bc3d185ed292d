use crate::http::HttpSession;
use crate::source::NamedSession;
use crate::stdio::StdioSession;
use async_trait::async_trait;
use std::path::Path;
use toklens_config::{merge_server_env, ServerConfig, Transport};
use toklens_core::{ToklensError, ToklensResult};
use tracing::debug;

/// Opens sessions for configured servers.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to `server`, resolving relative paths against `config_dir`.
    async fn connect(&self, server: &ServerConfig, config_dir: &Path)
        -> ToklensResult<NamedSession>;
}

/// Connects over the transport named in the server's configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct McpConnector;

#[async_trait]
impl Connector for McpConnector {
    async fn connect(
        &self,
        server: &ServerConfig,
        config_dir: &Path,
    ) -> ToklensResult<NamedSession> {
        let env = merge_server_env(server, config_dir)?;
        debug!(server = %server.name, env_vars = env.len(), "connecting");

        let session: Box<dyn crate::CapabilitySource> = match &server.transport {
            Some(Transport::Stdio) => {
                Box::new(StdioSession::connect(&server.command, &server.args, &env).await?)
            }
            Some(Transport::Http) => Box::new(HttpSession::connect(&server.url, &server.headers).await?),
            Some(other) => {
                return Err(ToklensError::Connect(format!(
                    "unsupported transport type: {other}"
                )))
            }
            None => {
                return Err(ToklensError::Connect(
                    "transport type not set; run inference first".into(),
                ))
            }
        };

        Ok(NamedSession::new(session, server.name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_without_transport() {
        let err = McpConnector
            .connect(&ServerConfig::stdio("echo", vec![]), Path::new(""))
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("transport type not set"));
    }

    #[tokio::test]
    async fn test_env_resolution_failure_blocks_connect() {
        let server = ServerConfig {
            name: "svc".into(),
            transport: Some(Transport::Stdio),
            command: "echo".into(),
            env_file: "../../etc/shadow".into(),
            ..ServerConfig::default()
        };
        let err = McpConnector
            .connect(&server, Path::new("/tmp/cfg"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ToklensError::PathConfinement { .. }));
    }
}
