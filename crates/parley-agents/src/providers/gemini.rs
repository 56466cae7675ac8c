use async_trait::async_trait;
use parley_common::{Error, Result, UpstreamError, UpstreamErrorKind};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::{
    ChatMessage, ChatRole, ContentBlock, LlmProvider, LlmRequest, LlmResponse, MessagePart, Usage,
};

pub const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const MAX_ERROR_BODY_CHARS: usize = 500;

/// Google Gemini `generateContent` client for one API key and one model.
pub struct GeminiProvider {
    id: String,
    api_key: String,
    model: String,
    client: Client,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            id: format!("gemini:{model}"),
            api_key: api_key.into(),
            model,
            client: Client::new(),
            base_url: GEMINI_API_URL.to_string(),
        }
    }

    /// Share a preconfigured client (timeouts, pooling) across providers.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.id = label.into();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    fn create_request_body(&self, request: &LlmRequest) -> Value {
        let contents: Vec<Value> = request.messages.iter().filter_map(message_to_content).collect();

        let mut body = json!({ "contents": contents });

        if let Some(system) = request.system.as_deref().filter(|s| !s.trim().is_empty()) {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }

        let mut generation = serde_json::Map::new();
        if let Some(max_tokens) = request.max_tokens {
            generation.insert("maxOutputTokens".into(), json!(max_tokens));
        }
        if let Some(temperature) = request.temperature {
            generation.insert("temperature".into(), json!(temperature));
        }
        if !generation.is_empty() {
            body["generationConfig"] = Value::Object(generation);
        }

        if !request.tools.is_empty() {
            let declarations: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.input_schema,
                    })
                })
                .collect();
            body["tools"] = json!([{ "functionDeclarations": declarations }]);
        }

        body
    }
}

fn message_to_content(message: &ChatMessage) -> Option<Value> {
    let role = match message.role {
        ChatRole::User => "user",
        ChatRole::Assistant => "model",
    };
    let parts: Vec<Value> = match &message.content {
        MessagePart::Text(text) if text.is_empty() => Vec::new(),
        MessagePart::Text(text) => vec![json!({ "text": text })],
        MessagePart::Parts(blocks) => blocks.iter().filter_map(block_to_part).collect(),
    };
    if parts.is_empty() {
        return None;
    }
    Some(json!({ "role": role, "parts": parts }))
}

fn block_to_part(block: &ContentBlock) -> Option<Value> {
    match block {
        ContentBlock::Text { text } if text.is_empty() => None,
        ContentBlock::Text { text } => Some(json!({ "text": text })),
        ContentBlock::ToolUse { name, input, .. } => Some(json!({
            "functionCall": { "name": name, "args": input }
        })),
        ContentBlock::ToolResult {
            name,
            content,
            is_error,
            ..
        } => {
            // `response` must be a JSON object.
            let response = if *is_error {
                json!({ "error": content })
            } else {
                json!({ "content": content })
            };
            Some(json!({
                "functionResponse": { "name": name, "response": response }
            }))
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    usage_metadata: Option<UsageMetadata>,
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
    function_call: Option<FunctionCall>,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
    status: Option<String>,
}

fn parse_response(raw: GenerateContentResponse, model: &str) -> LlmResponse {
    let usage = raw.usage_metadata.map(|u| Usage {
        input_tokens: u.prompt_token_count,
        output_tokens: u.candidates_token_count,
    });
    let model = raw.model_version.unwrap_or_else(|| model.to_string());

    let Some(candidate) = raw.candidates.into_iter().next() else {
        let stop_reason = raw
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .or_else(|| Some("NO_CANDIDATES".to_string()));
        return LlmResponse {
            content: Vec::new(),
            model,
            usage,
            stop_reason,
        };
    };

    let mut content = Vec::new();
    let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
    for (index, part) in parts.into_iter().enumerate() {
        if let Some(call) = part.function_call {
            content.push(ContentBlock::ToolUse {
                id: format!("{}-{index}", call.name),
                name: call.name,
                input: call.args,
            });
        } else if let Some(text) = part.text
            && !part.thought
        {
            content.push(ContentBlock::Text { text });
        }
    }

    LlmResponse {
        content,
        model,
        usage,
        stop_reason: candidate.finish_reason,
    }
}

/// Map an HTTP failure from the Gemini API onto an [`UpstreamErrorKind`].
pub(crate) fn classify_status(status: StatusCode, body: &str) -> UpstreamError {
    let detail = serde_json::from_str::<ErrorEnvelope>(body).ok().map(|e| e.error);
    let api_status = detail.as_ref().and_then(|d| d.status.as_deref());

    let kind = match (status.as_u16(), api_status) {
        (_, Some("RESOURCE_EXHAUSTED")) => UpstreamErrorKind::QuotaExhausted,
        (429, _) => UpstreamErrorKind::RateLimited,
        (500 | 502 | 503 | 504, _) | (_, Some("UNAVAILABLE")) => UpstreamErrorKind::Unavailable,
        (401 | 403, _) | (_, Some("UNAUTHENTICATED" | "PERMISSION_DENIED")) => {
            UpstreamErrorKind::Unauthorized
        }
        (400 | 404, _) => UpstreamErrorKind::InvalidRequest,
        _ => UpstreamErrorKind::Other,
    };

    let message = match detail {
        Some(d) if !d.message.is_empty() => d.message,
        _ => body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
    };
    UpstreamError::new(kind, message).with_status(status.as_u16())
}

pub(crate) fn classify_transport(err: &reqwest::Error) -> UpstreamError {
    let kind = if err.is_timeout() || err.is_connect() {
        UpstreamErrorKind::Unavailable
    } else {
        UpstreamErrorKind::Other
    };
    UpstreamError::new(kind, format!("network error: {err}"))
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn provider_id(&self) -> &str {
        &self.id
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let body = self.create_request_body(request);
        debug!(
            provider = %self.id,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "sending gemini request"
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Upstream(classify_transport(&e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Upstream(classify_transport(&e)))?;

        if !status.is_success() {
            return Err(Error::Upstream(classify_status(status, &text)));
        }

        let raw: GenerateContentResponse = serde_json::from_str(&text).map_err(|e| {
            Error::Upstream(UpstreamError::new(
                UpstreamErrorKind::MalformedResponse,
                format!("failed to parse gemini response: {e}"),
            ))
        })?;

        Ok(parse_response(raw, &self.model))
    }

    async fn health_check(&self) -> Result<bool> {
        let response = self
            .client
            .get(format!("{}/models/{}", self.base_url, self.model))
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| Error::Upstream(classify_transport(&e)))?;
        Ok(response.status().is_success())
    }
}
