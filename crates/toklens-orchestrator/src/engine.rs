use crate::result::{resolve_server_name, AnalysisOutcome, ServerResult};
use futures_util::FutureExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use toklens_analyzer::{analyze_source, TokenCounter};
use toklens_config::ServerConfig;
use toklens_core::ToklensError;
use toklens_mcp::{CapabilitySource, Connector};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Number of servers analyzed at once unless configured otherwise.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Fans analysis out across many servers.
///
/// Every server gets its own unit of work: connect, analyze, close. At most
/// `concurrency` units run at a time. A unit's failure, including a panic,
/// ends up in that server's [`ServerResult`] and nowhere else.
pub struct Orchestrator {
    connector: Arc<dyn Connector>,
    counter: Arc<TokenCounter>,
    concurrency: usize,
}

impl Orchestrator {
    /// An orchestrator with the default concurrency ceiling.
    pub fn new(connector: Arc<dyn Connector>, counter: Arc<TokenCounter>) -> Self {
        Self {
            connector,
            counter,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Set the concurrency ceiling. Zero is treated as one.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Current concurrency ceiling.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Analyze every server in `servers`.
    ///
    /// Returns one result per server, sorted by display name. Once `cancel`
    /// turns `true`, units that have not started are skipped and running ones
    /// are dropped, which tears down their process or connection; neither
    /// produces a result.
    pub async fn run_all(
        &self,
        servers: HashMap<String, Arc<ServerConfig>>,
        config_dir: &Path,
        cancel: watch::Receiver<bool>,
    ) -> AnalysisOutcome {
        let total = servers.len();
        info!(servers = total, concurrency = self.concurrency, "starting analysis");

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let results = Arc::new(Mutex::new(Vec::with_capacity(total)));
        let mut workers = JoinSet::new();

        for (_, server) in servers {
            let semaphore = semaphore.clone();
            let results = results.clone();
            let connector = self.connector.clone();
            let counter = self.counter.clone();
            let config_dir = config_dir.to_path_buf();
            let mut cancel = cancel.clone();

            workers.spawn(async move {
                let _permit = tokio::select! {
                    biased;
                    () = cancelled(&mut cancel) => {
                        debug!(server = %server.name, "skipped, run cancelled");
                        return;
                    }
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return,
                    },
                };

                let fallback_name = resolve_server_name(&server.name, None);
                let unit = AssertUnwindSafe(analyze_server(connector, counter, server, config_dir))
                    .catch_unwind();

                let result = tokio::select! {
                    biased;
                    () = cancelled(&mut cancel) => {
                        debug!(server = %fallback_name, "abandoned, run cancelled");
                        return;
                    }
                    outcome = unit => match outcome {
                        Ok(result) => result,
                        Err(panic) => {
                            let message = panic_message(&*panic);
                            warn!(server = %fallback_name, panic = %message, "analysis panicked");
                            ServerResult::failed(fallback_name, ToklensError::Panicked(message))
                        }
                    },
                };

                results.lock().push(result);
            });
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "analysis task did not complete");
            }
        }

        let mut results = std::mem::take(&mut *results.lock());
        results.sort_by(|a, b| a.name().cmp(b.name()));

        let outcome = AnalysisOutcome {
            results,
            cancelled: *cancel.borrow(),
        };
        info!(
            servers = total,
            completed = outcome.results.len(),
            failed = outcome.failed_count(),
            cancelled = outcome.cancelled,
            "analysis finished"
        );
        outcome
    }
}

/// Connect to one server, analyze it and close the session.
async fn analyze_server(
    connector: Arc<dyn Connector>,
    counter: Arc<TokenCounter>,
    server: Arc<ServerConfig>,
    config_dir: PathBuf,
) -> ServerResult {
    let session = match connector.connect(&server, &config_dir).await {
        Ok(session) => session,
        Err(e) => {
            let name = resolve_server_name(&server.name, None);
            warn!(server = %name, error = %e, "failed to connect");
            return ServerResult::failed(name, e);
        }
    };

    let name = resolve_server_name(
        session.name(),
        session
            .initialize_result()
            .and_then(|init| init.server_info.as_ref()),
    );
    let outcome = analyze_source(&session, &counter, &name).await;

    if let Err(e) = session.close().await {
        debug!(server = %name, error = %e, "error closing session");
    }

    match outcome {
        Ok(analysis) => ServerResult::succeeded(name, analysis),
        Err(e) => {
            warn!(server = %name, error = %e, "analysis failed");
            ServerResult::failed(name, e)
        }
    }
}

/// Resolves once the signal turns `true`. A dropped sender never cancels.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let sender_dropped = cancel.wait_for(|cancelled| *cancelled).await.is_err();
    if sender_dropped {
        std::future::pending::<()>().await;
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concurrency_floor() {
        let counter = Arc::new(TokenCounter::new("approx").unwrap());
        let orchestrator = Orchestrator::new(Arc::new(toklens_mcp::McpConnector), counter);
        assert_eq!(orchestrator.concurrency(), DEFAULT_CONCURRENCY);
        assert_eq!(orchestrator.with_concurrency(0).concurrency(), 1);
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*boxed), "boom");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&*boxed), "bang");
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let counter = Arc::new(TokenCounter::new("approx").unwrap());
        let orchestrator = Orchestrator::new(Arc::new(toklens_mcp::McpConnector), counter);
        let (_tx, rx) = watch::channel(false);
        let outcome = orchestrator.run_all(HashMap::new(), Path::new("."), rx).await;
        assert!(outcome.results.is_empty());
        assert!(outcome.check().is_ok());
    }
}
