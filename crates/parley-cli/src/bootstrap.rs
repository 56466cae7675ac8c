use std::sync::Arc;

use parley_agents::tools::{
    WebSearchTool, YouTubeApi, YouTubeChannelSearchTool, YouTubeSummarizeTool,
};
use parley_agents::{
    ChatOrchestrator, CredentialRotator, GeminiProvider, LlmProvider, ToolDispatcher,
};
use parley_common::Result;
use parley_config::BotConfig;
use parley_store::ConversationStore;
use reqwest::Client;
use tracing::info;

/// One tier per model, primary first; each tier holds one provider per API key.
pub fn build_tiers(config: &BotConfig, client: &Client) -> Vec<Vec<Arc<dyn LlmProvider>>> {
    let gemini = &config.app.gemini;
    gemini
        .model_tiers()
        .into_iter()
        .map(|model| {
            config
                .secrets
                .gemini_api_keys
                .iter()
                .enumerate()
                .map(|(i, key)| {
                    let provider = GeminiProvider::new(key.clone(), model.clone())
                        .with_client(client.clone())
                        .with_base_url(gemini.base_url.clone())
                        .with_label(format!("{model}#{}", i + 1));
                    Arc::new(provider) as Arc<dyn LlmProvider>
                })
                .collect()
        })
        .collect()
}

pub fn build_dispatcher(config: &BotConfig, client: &Client) -> ToolDispatcher {
    let secrets = &config.secrets;
    let mut dispatcher = ToolDispatcher::new().with_max_rounds(config.app.tools.max_tool_rounds);

    dispatcher.register_tool(Box::new(WebSearchTool::new(
        client.clone(),
        secrets.search_api_key.clone(),
        secrets.search_engine_id.clone(),
    )));

    let youtube = Arc::new(YouTubeApi::new(client.clone(), secrets.youtube_api_key.clone()));
    dispatcher.register_tool(Box::new(YouTubeChannelSearchTool::new(Arc::clone(&youtube))));
    dispatcher.register_tool(Box::new(YouTubeSummarizeTool::new(youtube)));

    dispatcher
}

pub fn build_orchestrator(
    config: &BotConfig,
    client: &Client,
    store: Arc<ConversationStore>,
) -> Result<ChatOrchestrator> {
    let rotator = CredentialRotator::with_tiers(build_tiers(config, client))?;
    info!(
        credentials = rotator.len(),
        tiers = rotator.tier_count(),
        labels = ?rotator.labels(),
        "credential rotation ready"
    );

    let gemini = &config.app.gemini;
    let mut orchestrator = ChatOrchestrator::new(rotator, store, build_dispatcher(config, client));
    if let Some(prompt) = gemini.system_prompt.clone() {
        orchestrator.set_system_prompt(prompt);
    }
    if let Some(max_tokens) = gemini.max_output_tokens {
        orchestrator.set_max_tokens(max_tokens);
    }
    if let Some(temperature) = gemini.temperature {
        orchestrator.set_temperature(temperature);
    }
    Ok(orchestrator)
}
