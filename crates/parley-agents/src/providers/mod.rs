use async_trait::async_trait;
use parley_common::Result;
use serde::{Deserialize, Serialize};

pub mod gemini;
pub use gemini::GeminiProvider;

/// A generative backend bound to one credential and one model.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Label used in logs, e.g. "gemini-2.5-pro#1". Never contains the key.
    fn provider_id(&self) -> &str;

    fn model(&self) -> &str;

    /// Send a completion request and return the response.
    ///
    /// Backend failures are reported as [`parley_common::Error::Upstream`] so
    /// callers can decide whether another credential is worth trying.
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse>;

    /// Check that the credential and model are usable.
    async fn health_check(&self) -> Result<bool>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmRequest {
    pub messages: Vec<ChatMessage>,
    pub system: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub tools: Vec<ToolDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: MessagePart,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: MessagePart::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: MessagePart::Text(text.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessagePart {
    Text(String),
    Parts(Vec<ContentBlock>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        /// Gemini matches results to calls by function name, not id.
        name: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: Vec<ContentBlock>,
    pub model: String,
    pub usage: Option<Usage>,
    pub stop_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Concatenate the text blocks of a response.
pub fn extract_text(content: &[ContentBlock]) -> String {
    content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("")
}

/// The first tool call in a response, if any.
pub fn first_tool_use(content: &[ContentBlock]) -> Option<(&str, &str, &serde_json::Value)> {
    content.iter().find_map(|block| match block {
        ContentBlock::ToolUse { id, name, input } => Some((id.as_str(), name.as_str(), input)),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extract_text_skips_tool_blocks() {
        let content = vec![
            ContentBlock::Text {
                text: "Hello, ".into(),
            },
            ContentBlock::ToolUse {
                id: "call-0".into(),
                name: "web_search".into(),
                input: json!({"query": "rust"}),
            },
            ContentBlock::Text {
                text: "world".into(),
            },
        ];
        assert_eq!(extract_text(&content), "Hello, world");
    }

    #[test]
    fn first_tool_use_picks_the_earliest_call() {
        let content = vec![
            ContentBlock::ToolUse {
                id: "a".into(),
                name: "web_search".into(),
                input: json!({}),
            },
            ContentBlock::ToolUse {
                id: "b".into(),
                name: "summarize_youtube_video".into(),
                input: json!({}),
            },
        ];
        let (id, name, _) = first_tool_use(&content).expect("has a call");
        assert_eq!(id, "a");
        assert_eq!(name, "web_search");
        assert!(first_tool_use(&[]).is_none());
    }
}
