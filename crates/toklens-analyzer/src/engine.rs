use crate::counter::TokenCounter;
use crate::stats::{PromptTokens, ResourceTokens, TokenStats, ToolTokens};
use futures_util::StreamExt;
use serde::Serialize;
use toklens_core::{ToklensError, ToklensResult};
use toklens_mcp::{
    list, CapabilitySource, Implementation, Listable, Prompt, Resource, ResourceTemplate, Tool,
};
use tracing::{debug, warn};

/// Everything measured for one server.
///
/// Only produced when the analysis as a whole succeeded; categories that could
/// not be listed are present with zero totals and no items.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ServerAnalysis {
    /// Implementation info reported during the handshake.
    pub server_info: Option<Implementation>,
    /// Tokens in the server's instructions text.
    pub instruction_tokens: usize,
    /// Sum over `tools`.
    pub tool_total: ToolTokens,
    /// Sum over `prompts`.
    pub prompt_total: PromptTokens,
    /// Resources and resource templates together.
    pub resource_total: ResourceTokens,
    /// Per-tool counts.
    pub tools: Vec<ToolTokens>,
    /// Per-prompt counts.
    pub prompts: Vec<PromptTokens>,
    /// Per-resource and per-template counts.
    pub resources: Vec<ResourceTokens>,
}

impl ServerAnalysis {
    /// Instructions plus every category total.
    pub fn total_tokens(&self) -> usize {
        self.instruction_tokens
            + self.tool_total.total_tokens
            + self.prompt_total.total_tokens
            + self.resource_total.total_tokens
    }

    /// Name the server reported for itself, if any.
    pub fn reported_name(&self) -> Option<&str> {
        self.server_info.as_ref().map(|info| info.name.as_str())
    }
}

/// Analyze every artifact category of a connected source.
///
/// Fails only when the source never completed its handshake. Listing failures
/// leave that category empty and item failures skip the item; both are logged
/// under `label`.
pub async fn analyze_source(
    source: &dyn CapabilitySource,
    counter: &TokenCounter,
    label: &str,
) -> ToklensResult<ServerAnalysis> {
    let init = source
        .initialize_result()
        .ok_or_else(|| ToklensError::Protocol("MCP session not initialized".into()))?;

    let instruction_tokens = init
        .instructions
        .as_deref()
        .map_or(0, |text| counter.count(text));

    let tools = collect_category::<Tool, _, _>(source, label, |t| counter.analyze_tool(t)).await;
    let prompts = collect_category::<Prompt, _, _>(source, label, |p| counter.analyze_prompt(p)).await;
    let mut resources =
        collect_category::<Resource, _, _>(source, label, |r| counter.analyze_resource(r)).await;
    resources.extend(
        collect_category::<ResourceTemplate, _, _>(source, label, |t| {
            counter.analyze_resource_template(t)
        })
        .await,
    );

    let analysis = ServerAnalysis {
        server_info: init.server_info.clone(),
        instruction_tokens,
        tool_total: ToolTokens::sum(&tools),
        prompt_total: PromptTokens::sum(&prompts),
        resource_total: ResourceTokens::sum(&resources),
        tools,
        prompts,
        resources,
    };
    debug!(
        server = label,
        tools = analysis.tools.len(),
        prompts = analysis.prompts.len(),
        resources = analysis.resources.len(),
        total_tokens = analysis.total_tokens(),
        "analysis complete"
    );
    Ok(analysis)
}

async fn collect_category<T, S, F>(source: &dyn CapabilitySource, label: &str, analyze: F) -> Vec<S>
where
    T: Listable,
    S: TokenStats,
    F: Fn(&T) -> ToklensResult<S>,
{
    let kind = T::KIND.label();
    let mut items = Vec::new();
    let mut stream = list::<T>(source);

    while let Some(next) = stream.next().await {
        match next {
            Ok(item) => match analyze(&item) {
                Ok(stats) => items.push(stats),
                Err(e) => {
                    warn!(server = label, kind, item = item.item_name(), error = %e, "skipping item");
                }
            },
            Err(e) => {
                warn!(server = label, kind, error = %e, "listing failed, reporting category as empty");
                return Vec::new();
            }
        }
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::Tokenizer;
    use async_trait::async_trait;
    use serde_json::json;
    use toklens_mcp::{InitializeResult, ListKind, Page};

    struct WordTokenizer;

    impl Tokenizer for WordTokenizer {
        fn count(&self, text: &str) -> usize {
            text.split_whitespace().count()
        }
    }

    /// Serves a single page per category; prompts are unsupported.
    struct FakeSource {
        init: Option<InitializeResult>,
    }

    #[async_trait]
    impl CapabilitySource for FakeSource {
        fn initialize_result(&self) -> Option<&InitializeResult> {
            self.init.as_ref()
        }

        async fn list_page(&self, kind: ListKind, _cursor: Option<String>) -> ToklensResult<Page> {
            let items = match kind {
                ListKind::Tools => vec![
                    json!({"name": "read_file", "description": "Read a file", "inputSchema": {}}),
                    json!({"name": "write_file", "description": "Write a file to disk", "inputSchema": {}}),
                ],
                ListKind::Prompts => {
                    return Err(ToklensError::Protocol("prompts/list: MCP error -32601: Method not found".into()))
                }
                ListKind::Resources => vec![json!({"uri": "file:///a", "name": "a", "description": "first file"})],
                ListKind::ResourceTemplates => {
                    vec![json!({"uriTemplate": "file:///{path}", "name": "any file"})]
                }
            };
            Ok(Page {
                items,
                next_cursor: None,
            })
        }

        async fn close(&self) -> ToklensResult<()> {
            Ok(())
        }
    }

    fn initialized() -> FakeSource {
        FakeSource {
            init: Some(InitializeResult {
                server_info: Some(Implementation {
                    name: "fake".into(),
                    version: "1.0".into(),
                }),
                instructions: Some("Use these tools carefully".into()),
                ..InitializeResult::default()
            }),
        }
    }

    #[tokio::test]
    async fn test_analyze_source() {
        let counter = TokenCounter::with_tokenizer(WordTokenizer);
        let analysis = analyze_source(&initialized(), &counter, "fake").await.unwrap();

        assert_eq!(analysis.reported_name(), Some("fake"));
        assert_eq!(analysis.instruction_tokens, 4);

        // name + description + `{}`
        assert_eq!(analysis.tools.len(), 2);
        assert_eq!(analysis.tools[0].total_tokens, 1 + 3 + 1);
        assert_eq!(analysis.tools[1].total_tokens, 1 + 5 + 1);
        assert_eq!(analysis.tool_total.name, crate::TOTAL_LABEL);
        assert_eq!(analysis.tool_total.total_tokens, 12);

        assert!(analysis.prompts.is_empty());
        assert_eq!(analysis.prompt_total.total_tokens, 0);

        assert_eq!(analysis.resources.len(), 2);
        assert_eq!(analysis.resources[1].name, "any file");
        assert_eq!(analysis.resource_total.total_tokens, (1 + 1 + 2) + (2 + 1));

        assert_eq!(analysis.total_tokens(), 4 + 12 + 7);
    }

    #[tokio::test]
    async fn test_uninitialized_source_fails() {
        let counter = TokenCounter::with_tokenizer(WordTokenizer);
        let err = analyze_source(&FakeSource { init: None }, &counter, "fake")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not initialized"));
    }

    #[tokio::test]
    async fn test_missing_instructions_count_zero() {
        let counter = TokenCounter::with_tokenizer(WordTokenizer);
        let source = FakeSource {
            init: Some(InitializeResult::default()),
        };
        let analysis = analyze_source(&source, &counter, "").await.unwrap();
        assert_eq!(analysis.instruction_tokens, 0);
        assert_eq!(analysis.reported_name(), None);
    }

    #[tokio::test]
    async fn test_failing_item_is_skipped() {
        let counter = TokenCounter::with_tokenizer(WordTokenizer);
        let tools = collect_category::<Tool, _, _>(&initialized(), "fake", |t| {
            if t.name == "read_file" {
                Err(ToklensError::Item("failed to marshal input schema".into()))
            } else {
                counter.analyze_tool(t)
            }
        })
        .await;

        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "write_file");
        let total = ToolTokens::sum(&tools);
        assert_eq!(total.total_tokens, 1 + 5 + 1);
    }
}
