mod options;
mod render;

use anyhow::{anyhow, Context};
use clap::Parser;
use options::{Cli, OutputFormat, RunOptions};
use std::collections::HashMap;
use std::sync::Arc;
use toklens_analyzer::TokenCounter;
use toklens_core::ToklensError;
use toklens_mcp::McpConnector;
use toklens_orchestrator::Orchestrator;
use tokio::sync::watch;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.with_target(false).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let options = RunOptions::from_cli(cli)?;

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling analysis");
            let _ = cancel_tx.send(true);
        }
    });

    run(&options, cancel_rx).await
}

async fn run(options: &RunOptions, cancel: watch::Receiver<bool>) -> anyhow::Result<()> {
    let counter = TokenCounter::new(&options.model).context("failed to initialize token counter")?;

    let (mut config, config_dir) = options.load_config()?;
    config.infer_defaults();
    config.validate()?;
    for warning in config.warnings() {
        warn!("{warning}");
    }

    let mut servers = config.merged_servers();
    if let Some(name) = &options.server {
        let server = servers
            .remove(name)
            .ok_or_else(|| anyhow!("server {name:?} not found in config"))?;
        servers = HashMap::from([(name.clone(), server)]);
    }
    if servers.is_empty() {
        return Err(anyhow!("no servers to analyze"));
    }
    let single = servers.len() == 1;
    debug!(servers = servers.len(), config_dir = %config_dir.display(), "config ready");

    let orchestrator = Orchestrator::new(Arc::new(McpConnector), Arc::new(counter))
        .with_concurrency(options.concurrency);
    let outcome = orchestrator.run_all(servers, &config_dir, cancel).await;
    if outcome.cancelled {
        return Err(ToklensError::Cancelled.into());
    }

    if single {
        let result = outcome
            .results
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("no result for server"))?;
        if let Some(e) = result.error() {
            return Err(anyhow!("server {:?}: {e}", result.name()));
        }
        match options.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
            OutputFormat::Table => {
                if let Some(analysis) = result.analysis() {
                    print!("{}", render::single_server(result.name(), analysis, options.limit));
                }
            }
        }
        return Ok(());
    }

    match options.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
        OutputFormat::Table => {
            print!("{}", render::group_summary(&outcome.results, options.limit));
            if options.detail {
                print!("{}", render::detailed_tables(&outcome.results));
            }
        }
    }

    outcome.check()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use options::ServerSource;
    use std::path::Path;

    fn options_for(path: &Path) -> RunOptions {
        RunOptions {
            source: ServerSource::File(path.to_path_buf()),
            model: "approx".into(),
            server: None,
            detail: false,
            limit: None,
            concurrency: 2,
            format: OutputFormat::Table,
        }
    }

    fn write_config(dir: &Path, json: &str) -> std::path::PathBuf {
        let path = dir.join("mcp.json");
        std::fs::write(&path, json).unwrap();
        path
    }

    fn idle() -> watch::Receiver<bool> {
        watch::channel(false).1
    }

    #[tokio::test]
    async fn test_invalid_config_aborts_before_connecting() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), r#"{"mcpServers": {"a": {"type": "http"}}}"#);
        let err = run(&options_for(&path), idle()).await.unwrap_err();
        assert!(err.to_string().starts_with("invalid config"));
    }

    #[tokio::test]
    async fn test_unknown_server_filter() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), r#"{"mcpServers": {"a": {"command": "echo"}}}"#);
        let mut options = options_for(&path);
        options.server = Some("b".into());
        let err = run(&options, idle()).await.unwrap_err();
        assert_eq!(err.to_string(), r#"server "b" not found in config"#);
    }

    #[tokio::test]
    async fn test_single_server_failure_is_run_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            r#"{"mcpServers": {"a": {"command": "/nonexistent/toklens-test-server"}}}"#,
        );
        let err = run(&options_for(&path), idle()).await.unwrap_err();
        assert!(err.to_string().starts_with(r#"server "a": "#));
    }

    #[tokio::test]
    async fn test_multi_server_failure_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            r#"{"mcpServers": {"a": {"command": "/nonexistent/one"}},
                "servers": {"b": {"command": "/nonexistent/two"}}}"#,
        );
        let err = run(&options_for(&path), idle()).await.unwrap_err();
        assert_eq!(err.to_string(), "2 of 2 servers failed analysis");
    }

    #[tokio::test]
    async fn test_bad_tokenizer_model() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), r#"{"mcpServers": {"a": {"command": "echo"}}}"#);
        let mut options = options_for(&path);
        options.model = "not-a-model".into();
        let err = run(&options, idle()).await.unwrap_err();
        assert!(err.to_string().contains("failed to initialize token counter"));
    }
}
