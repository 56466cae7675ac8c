use async_trait::async_trait;
use parley_common::{Error, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use super::{Tool, ToolContext, ToolOutput, required_str};

pub const CUSTOM_SEARCH_URL: &str = "https://www.googleapis.com/customsearch/v1";

const MAX_RESULTS: usize = 5;

/// Google Programmable Search over the public web.
pub struct WebSearchTool {
    client: Client,
    api_key: Option<String>,
    engine_id: Option<String>,
    base_url: String,
}

impl WebSearchTool {
    pub fn new(client: Client, api_key: Option<String>, engine_id: Option<String>) -> Self {
        Self {
            client,
            api_key,
            engine_id,
            base_url: CUSTOM_SEARCH_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &'static str {
        "web_search"
    }

    fn description(&self) -> &'static str {
        "Search the web for current information, news, facts or anything the model may not \
         know. Returns the top results with title, link and snippet."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, _context: &ToolContext, args: serde_json::Value) -> Result<ToolOutput> {
        let (Some(api_key), Some(engine_id)) = (&self.api_key, &self.engine_id) else {
            return Ok(ToolOutput::error("Web search is not configured."));
        };
        let query = required_str(&args, "query")?;

        let num = MAX_RESULTS.to_string();
        let url = Url::parse_with_params(
            &self.base_url,
            [
                ("key", api_key.as_str()),
                ("cx", engine_id.as_str()),
                ("q", query),
                ("num", num.as_str()),
            ],
        )
        .map_err(|e| Error::Tool(format!("invalid search url: {e}")))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Tool(format!("web search request failed: {}", e.without_url())))?;
        if !response.status().is_success() {
            return Err(Error::Tool(format!(
                "web search returned HTTP {}",
                response.status()
            )));
        }
        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| Error::Tool(format!("invalid web search response: {}", e.without_url())))?;

        if body.items.is_empty() {
            return Ok(ToolOutput::success(format!("No results found for '{query}'.")));
        }

        let rendered = body
            .items
            .iter()
            .take(MAX_RESULTS)
            .enumerate()
            .map(|(i, item)| {
                format!(
                    "{}. {}\n{}\n{}",
                    i + 1,
                    item.title,
                    item.link,
                    item.snippet.trim()
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");
        Ok(ToolOutput::success(rendered))
    }
}
