use crate::stats::{PromptTokens, ResourceTokens, ToolTokens};
use crate::tokenizer::{ApproxTokenizer, TiktokenTokenizer, Tokenizer};
use parking_lot::Mutex;
use serde::Serialize;
use toklens_core::{ToklensError, ToklensResult};
use toklens_mcp::{Prompt, Resource, ResourceTemplate, Tool};

/// Token counter shared by every analysis worker.
///
/// The tokenizer sits behind a mutex, so one counter can be shared through an
/// `Arc` and called concurrently. Counting is cheap next to the network and
/// process round trips around it, so the lock is not a bottleneck.
pub struct TokenCounter {
    tokenizer: Mutex<Box<dyn Tokenizer>>,
}

impl TokenCounter {
    /// Build a counter for a model or encoding name.
    ///
    /// An empty name selects the default encoding and `"approx"` selects
    /// [`ApproxTokenizer`]. An unknown name fails here; counting never fails.
    pub fn new(model: &str) -> ToklensResult<Self> {
        if model == "approx" {
            return Ok(Self::with_tokenizer(ApproxTokenizer));
        }
        Ok(Self::with_tokenizer(TiktokenTokenizer::for_name(model)?))
    }

    /// Build a counter around any tokenizer.
    pub fn with_tokenizer(tokenizer: impl Tokenizer + 'static) -> Self {
        Self {
            tokenizer: Mutex::new(Box::new(tokenizer)),
        }
    }

    /// Number of tokens in `text`.
    pub fn count(&self, text: &str) -> usize {
        self.tokenizer.lock().count(text)
    }

    fn count_json<T: Serialize + ?Sized>(&self, value: &T, what: &str) -> ToklensResult<usize> {
        let text = serde_json::to_string(value)
            .map_err(|e| ToklensError::Item(format!("failed to marshal {what}: {e}")))?;
        Ok(self.count(&text))
    }

    /// Count a tool's name, description, input schema, output schema and annotations.
    pub fn analyze_tool(&self, tool: &Tool) -> ToklensResult<ToolTokens> {
        let schema_tokens = self.count_json(&tool.input_schema, "input schema")?;
        let output_schema_tokens = match &tool.output_schema {
            Some(schema) => self.count_json(schema, "output schema")?,
            None => 0,
        };
        let annotations_tokens = match &tool.annotations {
            Some(annotations) => self.count_json(annotations, "annotations")?,
            None => 0,
        };
        let name_tokens = self.count(&tool.name);
        let desc_tokens = self.count(&tool.description);

        Ok(ToolTokens {
            name: tool.name.clone(),
            name_tokens,
            desc_tokens,
            schema_tokens,
            output_schema_tokens,
            annotations_tokens,
            total_tokens: name_tokens
                + desc_tokens
                + schema_tokens
                + output_schema_tokens
                + annotations_tokens,
        })
    }

    /// Count a prompt's name, description and serialized argument list.
    pub fn analyze_prompt(&self, prompt: &Prompt) -> ToklensResult<PromptTokens> {
        let args_tokens = self.count_json(&prompt.arguments, "prompt arguments")?;
        let name_tokens = self.count(&prompt.name);
        let desc_tokens = self.count(&prompt.description);

        Ok(PromptTokens {
            name: prompt.name.clone(),
            name_tokens,
            desc_tokens,
            args_tokens,
            total_tokens: name_tokens + desc_tokens + args_tokens,
        })
    }

    /// Count a resource's name, URI and description.
    pub fn analyze_resource(&self, resource: &Resource) -> ToklensResult<ResourceTokens> {
        Ok(self.resource_like(&resource.name, &resource.uri, &resource.description))
    }

    /// Count a resource template's name, URI template and description.
    pub fn analyze_resource_template(
        &self,
        template: &ResourceTemplate,
    ) -> ToklensResult<ResourceTokens> {
        Ok(self.resource_like(&template.name, &template.uri_template, &template.description))
    }

    fn resource_like(&self, name: &str, uri: &str, description: &str) -> ResourceTokens {
        let name_tokens = self.count(name);
        let uri_tokens = self.count(uri);
        let desc_tokens = self.count(description);

        ResourceTokens {
            name: name.to_string(),
            name_tokens,
            uri_tokens,
            desc_tokens,
            total_tokens: name_tokens + uri_tokens + desc_tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// One token per whitespace-separated word.
    struct WordTokenizer;

    impl Tokenizer for WordTokenizer {
        fn count(&self, text: &str) -> usize {
            text.split_whitespace().count()
        }
    }

    fn counter() -> TokenCounter {
        TokenCounter::with_tokenizer(WordTokenizer)
    }

    #[test]
    fn test_analyze_tool() {
        let tool = Tool {
            name: "get_weather".into(),
            description: "Get the weather for a city".into(),
            input_schema: serde_json::json!({"type": "object", "properties": {"city": {"type": "string"}}}),
            output_schema: Some(serde_json::json!({"type": "object"})),
            annotations: None,
        };
        let stats = counter().analyze_tool(&tool).unwrap();
        assert_eq!(stats.name, "get_weather");
        assert_eq!(stats.name_tokens, 1);
        assert_eq!(stats.desc_tokens, 6);
        // Compact JSON has no whitespace.
        assert_eq!(stats.schema_tokens, 1);
        assert_eq!(stats.output_schema_tokens, 1);
        assert_eq!(stats.annotations_tokens, 0);
        assert_eq!(stats.total_tokens, 9);
    }

    #[test]
    fn test_analyze_prompt_without_arguments() {
        let prompt = Prompt {
            name: "summarize".into(),
            description: "Summarize some text".into(),
            arguments: None,
        };
        let stats = counter().analyze_prompt(&prompt).unwrap();
        // `null`
        assert_eq!(stats.args_tokens, 1);
        assert_eq!(stats.total_tokens, 1 + 3 + 1);
    }

    #[test]
    fn test_analyze_resource_template_counts_uri_template() {
        let template = ResourceTemplate {
            uri_template: "file:///{path}".into(),
            name: "project files".into(),
            description: String::new(),
            mime_type: None,
        };
        let stats = counter().analyze_resource_template(&template).unwrap();
        assert_eq!(stats.name_tokens, 2);
        assert_eq!(stats.uri_tokens, 1);
        assert_eq!(stats.desc_tokens, 0);
        assert_eq!(stats.total_tokens, 3);
    }

    #[test]
    fn test_analyze_resource() {
        let resource = Resource {
            uri: "file:///readme.md".into(),
            name: "readme".into(),
            description: "The project readme".into(),
            mime_type: Some("text/markdown".into()),
        };
        let stats = counter().analyze_resource(&resource).unwrap();
        assert_eq!(stats.total_tokens, 1 + 1 + 3);
    }

    #[test]
    fn test_tiktoken_counter() {
        let counter = TokenCounter::new("").unwrap();
        assert_eq!(counter.count(""), 0);
        assert_eq!(counter.count("hello world"), 2);
    }

    #[test]
    fn test_invalid_model_fails_at_construction() {
        assert!(TokenCounter::new("not-a-real-model").is_err());
    }

    #[test]
    fn test_approx_counter() {
        let counter = TokenCounter::new("approx").unwrap();
        assert_eq!(counter.count("twelve bytes"), 3);
    }

    #[test]
    fn test_concurrent_counting() {
        let counter = Arc::new(counter());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counter = counter.clone();
                std::thread::spawn(move || (0..200).map(|_| counter.count("a b c")).sum::<usize>())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 600);
        }
    }
}
