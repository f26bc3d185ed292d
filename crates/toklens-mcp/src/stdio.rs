//! MCP session over a subprocess's stdin/stdout, exchanging newline-delimited
//! JSON-RPC 2.0 messages.

use crate::protocol::*;
use crate::source::CapabilitySource;
use crate::REQUEST_TIMEOUT;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{oneshot, Mutex};
use toklens_core::{ToklensError, ToklensResult};
use tracing::{debug, error, info};

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

/// MCP session with a server running as a child process.
///
/// The child is killed when the session is closed or dropped, so abandoning
/// a connect or listing future also tears the process down.
pub struct StdioSession {
    stdin: Mutex<ChildStdin>,
    child: Mutex<Child>,
    pending: PendingMap,
    closed: Arc<AtomicBool>,
    next_id: AtomicU64,
    command: String,
    init: InitializeResult,
}

impl StdioSession {
    /// Spawn `command` with `args`, add `env` on top of the inherited
    /// environment, and perform the initialization handshake.
    pub async fn connect(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> ToklensResult<Self> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            ToklensError::Connect(format!("failed to spawn MCP server '{command}': {e}"))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ToklensError::Connect("MCP server stdin not available".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ToklensError::Connect("MCP server stdout not available".into()))?;

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        // Reader task: route responses to their waiting requests by id.
        let pending_clone = pending.clone();
        let closed_clone = closed.clone();
        let label = command.to_string();
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            let mut line = String::new();
            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        debug!(server = %label, "MCP server stdout closed");
                        break;
                    }
                    Ok(_) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                            Ok(resp) => {
                                // Notifications and server requests carry no matching id.
                                if let Some(id) = resp.id {
                                    if let Some(tx) = pending_clone.lock().await.remove(&id) {
                                        let _ = tx.send(resp);
                                    }
                                }
                            }
                            Err(e) => {
                                debug!(server = %label, line = %trimmed, error = %e, "non-JSON-RPC line from MCP server");
                            }
                        }
                    }
                    Err(e) => {
                        error!(server = %label, error = %e, "error reading MCP server stdout");
                        break;
                    }
                }
            }
            // Fail any request still waiting instead of letting it time out.
            closed_clone.store(true, Ordering::SeqCst);
            pending_clone.lock().await.clear();
        });

        let mut session = Self {
            stdin: Mutex::new(stdin),
            child: Mutex::new(child),
            pending,
            closed,
            next_id: AtomicU64::new(1),
            command: command.to_string(),
            init: InitializeResult::default(),
        };

        let resp = session.request("initialize", Some(initialize_params())).await?;
        session.init = serde_json::from_value(resp.into_result("initialize")?).map_err(|e| {
            ToklensError::Protocol(format!("failed to parse initialize result: {e}"))
        })?;
        info!(
            server = %session.command,
            version = %session.init.protocol_version,
            "MCP server initialized"
        );

        session
            .write_line(&notification("notifications/initialized"))
            .await?;

        Ok(session)
    }

    /// Send a JSON-RPC request and wait for the response.
    async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> ToklensResult<JsonRpcResponse> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let req = JsonRpcRequest::new(id, method, params);

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            if self.closed.load(Ordering::SeqCst) {
                return Err(ToklensError::Protocol(format!(
                    "MCP server '{}' exited before '{method}'",
                    self.command
                )));
            }
            pending.insert(id, tx);
        }

        if let Err(e) = self.write_line(&req).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        tokio::time::timeout(REQUEST_TIMEOUT, rx)
            .await
            .map_err(|_| ToklensError::Protocol(format!("MCP request '{method}' timed out")))?
            .map_err(|_| {
                ToklensError::Protocol(format!(
                    "MCP server '{}' closed before answering '{method}'",
                    self.command
                ))
            })
    }

    async fn write_line<T: serde::Serialize>(&self, msg: &T) -> ToklensResult<()> {
        let mut line = serde_json::to_vec(msg)?;
        line.push(b'\n');

        let mut stdin = self.stdin.lock().await;
        stdin
            .write_all(&line)
            .await
            .map_err(|e| ToklensError::Protocol(format!("failed to write to MCP stdin: {e}")))?;
        stdin
            .flush()
            .await
            .map_err(|e| ToklensError::Protocol(format!("failed to flush MCP stdin: {e}")))
    }
}

#[async_trait]
impl CapabilitySource for StdioSession {
    fn initialize_result(&self) -> Option<&InitializeResult> {
        Some(&self.init)
    }

    async fn list_page(&self, kind: ListKind, cursor: Option<String>) -> ToklensResult<Page> {
        let resp = self
            .request(kind.method(), kind.params(cursor.as_deref()))
            .await?;
        Page::from_result(kind, resp.into_result(kind.method())?)
    }

    async fn close(&self) -> ToklensResult<()> {
        let mut child = self.child.lock().await;
        if child.try_wait()?.is_none() {
            child.start_kill()?;
            let _ = child.wait().await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_nonexistent_command() {
        let err = StdioSession::connect("/nonexistent/mcp-server", &[], &HashMap::new())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ToklensError::Connect(_)));
        assert!(err.to_string().contains("/nonexistent/mcp-server"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_connect_to_non_mcp_process_fails() {
        // `true` exits immediately without answering the handshake.
        let err = StdioSession::connect("true", &[], &HashMap::new())
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            ToklensError::Protocol(_) | ToklensError::Connect(_)
        ));
    }
}
