use serde::Serialize;
use std::ops::AddAssign;

/// Name given to accumulated category totals.
pub const TOTAL_LABEL: &str = "TOTAL";

/// Common view over the per-kind stats types.
pub trait TokenStats: Default + for<'a> AddAssign<&'a Self> {
    /// Zeroed stats carrying `name`.
    fn named(name: impl Into<String>) -> Self;

    /// The artifact (or total row) these stats describe.
    fn name(&self) -> &str;

    /// Sum of every sub-field.
    fn total_tokens(&self) -> usize;

    /// Accumulate `items` into a new value named [`TOTAL_LABEL`].
    fn sum<'a, I>(items: I) -> Self
    where
        I: IntoIterator<Item = &'a Self>,
        Self: 'a,
    {
        let mut total = Self::named(TOTAL_LABEL);
        for item in items {
            total += item;
        }
        total
    }
}

/// Token counts for one tool definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ToolTokens {
    /// Tool name, or `TOTAL` for a category sum.
    pub name: String,
    /// Name.
    pub name_tokens: usize,
    /// Description.
    pub desc_tokens: usize,
    /// Serialized input schema.
    pub schema_tokens: usize,
    /// Serialized output schema; 0 when absent.
    pub output_schema_tokens: usize,
    /// Serialized annotations; 0 when absent.
    pub annotations_tokens: usize,
    /// Sum of the fields above.
    pub total_tokens: usize,
}

/// Sums every count; the receiver keeps its name.
impl AddAssign<&ToolTokens> for ToolTokens {
    fn add_assign(&mut self, other: &ToolTokens) {
        self.name_tokens += other.name_tokens;
        self.desc_tokens += other.desc_tokens;
        self.schema_tokens += other.schema_tokens;
        self.output_schema_tokens += other.output_schema_tokens;
        self.annotations_tokens += other.annotations_tokens;
        self.total_tokens += other.total_tokens;
    }
}

impl TokenStats for ToolTokens {
    fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn total_tokens(&self) -> usize {
        self.total_tokens
    }
}

/// Token counts for one prompt definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PromptTokens {
    /// Prompt name, or `TOTAL` for a category sum.
    pub name: String,
    /// Name.
    pub name_tokens: usize,
    /// Description.
    pub desc_tokens: usize,
    /// Serialized argument list.
    pub args_tokens: usize,
    /// Sum of the fields above.
    pub total_tokens: usize,
}

/// Sums every count; the receiver keeps its name.
impl AddAssign<&PromptTokens> for PromptTokens {
    fn add_assign(&mut self, other: &PromptTokens) {
        self.name_tokens += other.name_tokens;
        self.desc_tokens += other.desc_tokens;
        self.args_tokens += other.args_tokens;
        self.total_tokens += other.total_tokens;
    }
}

impl TokenStats for PromptTokens {
    fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn total_tokens(&self) -> usize {
        self.total_tokens
    }
}

/// Token counts for one resource or resource template.
///
/// For templates `uri_tokens` counts the URI template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResourceTokens {
    /// Resource name, or `TOTAL` for a category sum.
    pub name: String,
    /// Name.
    pub name_tokens: usize,
    /// URI, or URI template.
    pub uri_tokens: usize,
    /// Description.
    pub desc_tokens: usize,
    /// Sum of the fields above.
    pub total_tokens: usize,
}

/// Sums every count; the receiver keeps its name.
impl AddAssign<&ResourceTokens> for ResourceTokens {
    fn add_assign(&mut self, other: &ResourceTokens) {
        self.name_tokens += other.name_tokens;
        self.uri_tokens += other.uri_tokens;
        self.desc_tokens += other.desc_tokens;
        self.total_tokens += other.total_tokens;
    }
}

impl TokenStats for ResourceTokens {
    fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn total_tokens(&self) -> usize {
        self.total_tokens
    }
}
