use serde::ser::{Serialize, SerializeStruct, Serializer};
use toklens_analyzer::ServerAnalysis;
use toklens_core::{ToklensError, ToklensResult};
use toklens_mcp::Implementation;

/// Display name used when neither the config nor the server names a server.
pub const UNKNOWN_SERVER: &str = "<unknown>";

/// Pick the name a server is reported under.
///
/// The configured name wins; an ad-hoc run has none, so the name the server
/// sent during its handshake is used. An empty reported name is treated the
/// same as a missing one.
pub fn resolve_server_name(configured: &str, reported: Option<&Implementation>) -> String {
    if !configured.is_empty() {
        return configured.to_string();
    }
    match reported {
        Some(info) if !info.name.is_empty() => info.name.clone(),
        _ => UNKNOWN_SERVER.to_string(),
    }
}

/// Outcome of analyzing one server: either a complete analysis or the error
/// that stopped it.
#[derive(Debug)]
pub struct ServerResult {
    name: String,
    outcome: Result<ServerAnalysis, ToklensError>,
}

impl ServerResult {
    /// A result carrying a finished analysis.
    pub fn succeeded(name: impl Into<String>, analysis: ServerAnalysis) -> Self {
        Self {
            name: name.into(),
            outcome: Ok(analysis),
        }
    }

    /// A result carrying the error that stopped the server.
    pub fn failed(name: impl Into<String>, error: ToklensError) -> Self {
        Self {
            name: name.into(),
            outcome: Err(error),
        }
    }

    /// Resolved display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The analysis, unless the server failed.
    pub fn analysis(&self) -> Option<&ServerAnalysis> {
        self.outcome.as_ref().ok()
    }

    /// The error, if the server failed.
    pub fn error(&self) -> Option<&ToklensError> {
        self.outcome.as_ref().err()
    }

    /// Whether the server failed.
    pub fn is_failed(&self) -> bool {
        self.outcome.is_err()
    }

    /// Total tokens across instructions and every category; zero when failed.
    pub fn total_tokens(&self) -> usize {
        self.analysis().map_or(0, ServerAnalysis::total_tokens)
    }

    /// Take the analysis or the error out of the result.
    pub fn into_outcome(self) -> Result<ServerAnalysis, ToklensError> {
        self.outcome
    }
}

impl Serialize for ServerResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ServerResult", 4)?;
        state.serialize_field("name", &self.name)?;
        state.serialize_field("error", &self.error().map(ToString::to_string))?;
        state.serialize_field("total_tokens", &self.total_tokens())?;
        state.serialize_field("analysis", &self.analysis())?;
        state.end()
    }
}

/// Results of one batch, sorted by display name.
#[derive(Debug, Default, serde::Serialize)]
pub struct AnalysisOutcome {
    /// One entry per analyzed server.
    pub results: Vec<ServerResult>,
    /// Set when the batch was cancelled; `results` then omits the servers
    /// that never finished.
    pub cancelled: bool,
}

impl AnalysisOutcome {
    /// Number of servers that failed.
    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_failed()).count()
    }

    /// Sum of [`ServerResult::total_tokens`] over the servers that succeeded.
    pub fn total_tokens(&self) -> usize {
        self.results.iter().map(ServerResult::total_tokens).sum()
    }

    /// `Err` carrying the failed-vs-total count if any server failed.
    pub fn check(&self) -> ToklensResult<()> {
        let failed = self.failed_count();
        if failed > 0 {
            return Err(ToklensError::PartialFailure {
                failed,
                total: self.results.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(name: &str) -> Implementation {
        Implementation {
            name: name.into(),
            version: "1".into(),
        }
    }

    #[test]
    fn test_configured_name_wins() {
        assert_eq!(resolve_server_name("a", Some(&info("x"))), "a");
    }

    #[test]
    fn test_reported_name_fallback() {
        assert_eq!(resolve_server_name("", Some(&info("x"))), "x");
    }

    #[test]
    fn test_unknown_name() {
        assert_eq!(resolve_server_name("", None), UNKNOWN_SERVER);
        assert_eq!(resolve_server_name("", Some(&info(""))), UNKNOWN_SERVER);
    }

    #[test]
    fn test_check_reports_counts() {
        let outcome = AnalysisOutcome {
            results: vec![
                ServerResult::succeeded("a", ServerAnalysis::default()),
                ServerResult::failed("b", ToklensError::Connect("refused".into())),
                ServerResult::failed("c", ToklensError::Connect("refused".into())),
            ],
            cancelled: false,
        };
        assert_eq!(outcome.failed_count(), 2);
        assert_eq!(
            outcome.check().unwrap_err().to_string(),
            "2 of 3 servers failed analysis"
        );
    }

    #[test]
    fn test_serialize_failed_result() {
        let result = ServerResult::failed("b", ToklensError::Connect("refused".into()));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["name"], "b");
        assert_eq!(json["error"], "Connect error: refused");
        assert!(json["analysis"].is_null());
    }
}
