use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use toklens_config::{load_config, Config, ServerConfig};
use toklens_orchestrator::DEFAULT_CONCURRENCY;

#[derive(Parser, Debug)]
#[command(
    name = "toklens",
    version,
    about = "Measure the context cost of MCP servers"
)]
pub struct Cli {
    /// Transport for an ad-hoc server
    #[arg(
        short = 't',
        long = "mcp.transport",
        default_value = "stdio",
        value_parser = ["stdio", "http", "streamable-http"]
    )]
    pub transport: String,

    /// Command line of an ad-hoc stdio server
    #[arg(short = 'c', long = "mcp.command")]
    pub command: Option<String>,

    /// URL of an ad-hoc HTTP server
    #[arg(short = 'u', long = "mcp.url")]
    pub url: Option<String>,

    /// Tokenizer model or encoding (e.g. gpt-4, o200k_base)
    #[arg(short = 'm', long = "tokenizer.model", default_value = "gpt-4")]
    pub model: String,

    /// Path to an mcp.json config file
    #[arg(short = 'f', long = "config")]
    pub config: Option<PathBuf>,

    /// Analyze only this named server from the config
    #[arg(short = 's', long = "server")]
    pub server: Option<String>,

    /// Show per-item tables for every server
    #[arg(long)]
    pub detail: bool,

    /// Context window size used to report usage as a percentage
    #[arg(long)]
    pub limit: Option<usize>,

    /// Maximum number of servers analyzed at once
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,

    /// Emit logs as JSON
    #[arg(long)]
    pub log_json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

/// Where the servers to analyze come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerSource {
    File(PathBuf),
    AdHoc(ServerConfig),
}

/// Settings for one run, fixed once the flags are parsed.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub source: ServerSource,
    pub model: String,
    pub server: Option<String>,
    pub detail: bool,
    pub limit: Option<usize>,
    pub concurrency: usize,
    pub format: OutputFormat,
}

impl RunOptions {
    pub fn from_cli(cli: Cli) -> anyhow::Result<Self> {
        let source = match cli.config {
            Some(path) => ServerSource::File(path),
            None => ServerSource::AdHoc(ad_hoc_server(
                &cli.transport,
                cli.command.as_deref(),
                cli.url.as_deref(),
            )?),
        };

        Ok(Self {
            source,
            model: cli.model,
            server: cli.server,
            detail: cli.detail,
            limit: cli.limit.filter(|l| *l > 0),
            concurrency: cli.concurrency,
            format: cli.format,
        })
    }

    /// The configuration to analyze and the directory relative env files
    /// resolve against. Ad-hoc servers resolve against the working directory.
    pub fn load_config(&self) -> anyhow::Result<(Config, PathBuf)> {
        match &self.source {
            ServerSource::File(path) => {
                let config = load_config(path).context("failed to load config")?;
                let dir = path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .unwrap_or_else(|| Path::new("."))
                    .to_path_buf();
                Ok((config, dir))
            }
            ServerSource::AdHoc(server) => Ok((Config::ad_hoc(server.clone()), PathBuf::new())),
        }
    }
}

/// Build the single server described by the ad-hoc flags. Its transport is
/// left for inference.
fn ad_hoc_server(
    transport: &str,
    command: Option<&str>,
    url: Option<&str>,
) -> anyhow::Result<ServerConfig> {
    match transport {
        "stdio" => {
            let mut parts = command.unwrap_or_default().split_whitespace().map(str::to_string);
            let Some(program) = parts.next() else {
                bail!("--mcp.command is required for stdio transport");
            };
            Ok(ServerConfig::stdio(program, parts.collect()))
        }
        _ => match url.filter(|u| !u.is_empty()) {
            Some(url) => Ok(ServerConfig::http(url)),
            None => bail!("--mcp.url is required for http transport"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("toklens").chain(args.iter().copied()))
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&["-c", "npx -y server"]);
        assert_eq!(cli.transport, "stdio");
        assert_eq!(cli.model, "gpt-4");
        assert_eq!(cli.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(cli.format, OutputFormat::Table);
    }

    #[test]
    fn test_ad_hoc_command_split() {
        let opts = RunOptions::from_cli(parse(&["--mcp.command", "npx  -y @scope/server"])).unwrap();
        let ServerSource::AdHoc(server) = opts.source else {
            panic!("expected ad-hoc source");
        };
        assert_eq!(server.command, "npx");
        assert_eq!(server.args, vec!["-y", "@scope/server"]);
        assert!(server.transport.is_none());
    }

    #[test]
    fn test_ad_hoc_requires_command() {
        let err = RunOptions::from_cli(parse(&[])).unwrap_err();
        assert!(err.to_string().contains("--mcp.command is required"));
    }

    #[test]
    fn test_ad_hoc_http_requires_url() {
        let err = RunOptions::from_cli(parse(&["-t", "streamable-http"])).unwrap_err();
        assert!(err.to_string().contains("--mcp.url is required"));

        let opts =
            RunOptions::from_cli(parse(&["-t", "http", "-u", "http://localhost:8080/mcp"])).unwrap();
        assert_eq!(
            opts.source,
            ServerSource::AdHoc(ServerConfig::http("http://localhost:8080/mcp"))
        );
    }

    #[test]
    fn test_about_text() {
        use clap::CommandFactory;
        let about = Cli::command().get_about().map(ToString::to_string);
        assert_eq!(about.as_deref(), Some("Measure the context cost of MCP servers"));
    }

    #[test]
    fn test_rejects_unknown_transport() {
        assert!(Cli::try_parse_from(["toklens", "-t", "sse"]).is_err());
    }

    #[test]
    fn test_config_dir_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mcp.json");
        std::fs::write(&path, r#"{"servers": {"a": {"command": "echo"}}}"#).unwrap();

        let opts = RunOptions::from_cli(parse(&["-f", path.to_str().unwrap(), "--limit", "0"])).unwrap();
        assert_eq!(opts.limit, None);
        let (config, config_dir) = opts.load_config().unwrap();
        assert_eq!(config_dir, dir.path());
        assert!(config.merged_servers().contains_key("a"));
    }

    #[test]
    fn test_missing_config_file() {
        let opts = RunOptions::from_cli(parse(&["-f", "/nonexistent/mcp.json"])).unwrap();
        let err = opts.load_config().unwrap_err();
        assert!(err.to_string().contains("failed to load config"));
    }
}
