use async_trait::async_trait;
use parley_common::Result;

pub mod web_search;
pub mod youtube;

pub use web_search::WebSearchTool;
pub use youtube::{YouTubeApi, YouTubeChannelSearchTool, YouTubeSummarizeTool};

/// A function the model may call during a generation.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// JSON schema of the arguments object.
    fn input_schema(&self) -> serde_json::Value;

    async fn execute(&self, context: &ToolContext, args: serde_json::Value) -> Result<ToolOutput>;
}

/// Who a tool call is being made for.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub memory_key: String,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// Pull a required, non-blank string argument out of a tool call.
pub(crate) fn required_str<'a>(args: &'a serde_json::Value, key: &str) -> Result<&'a str> {
    args[key]
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| parley_common::Error::Tool(format!("missing or invalid '{key}' argument")))
}
