use std::fmt;
use std::time::Duration;

use chrono::TimeDelta;
use serde::Deserialize;

pub const DEFAULT_PRIMARY_MODEL: &str = "gemini-2.5-pro";
pub const DEFAULT_FALLBACK_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DISCORD_MAX_MESSAGE_LENGTH: usize = 2000;
pub(crate) const SECS_PER_HOUR: u64 = 60 * 60;

/// Fully resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub app: AppConfig,
    pub secrets: Secrets,
}

/// Tunables read from the optional TOML file. Every field has a default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub discord: DiscordConfig,
    pub gemini: GeminiConfig,
    pub conversation: ConversationConfig,
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    /// Guilds to register slash commands in (instant). Empty registers globally.
    pub guild_ids: Vec<u64>,
    pub max_message_length: usize,
    /// How long the temporary error notice stays up after a failed reply.
    pub error_notice_secs: u64,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            guild_ids: Vec::new(),
            max_message_length: DISCORD_MAX_MESSAGE_LENGTH,
            error_notice_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub primary_model: String,
    /// Second model tier tried after every key has been tried on the primary.
    pub fallback_model: Option<String>,
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub max_output_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub system_prompt: Option<String>,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            primary_model: DEFAULT_PRIMARY_MODEL.to_string(),
            fallback_model: Some(DEFAULT_FALLBACK_MODEL.to_string()),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            request_timeout_secs: 120,
            max_output_tokens: None,
            temperature: None,
            system_prompt: None,
        }
    }
}

impl GeminiConfig {
    /// Model tiers in the order credentials are built for them.
    pub fn model_tiers(&self) -> Vec<String> {
        let mut tiers = vec![self.primary_model.clone()];
        if let Some(fallback) = self
            .fallback_model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            && fallback != self.primary_model
        {
            tiers.push(fallback.to_string());
        }
        tiers
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    pub max_turns: usize,
    pub max_inactivity_days: i64,
    pub reclaim_interval_hours: u64,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_turns: 20,
            max_inactivity_days: 30,
            reclaim_interval_hours: 24,
        }
    }
}

impl ConversationConfig {
    /// Saturates on values the loader would have rejected.
    pub fn max_inactivity(&self) -> TimeDelta {
        TimeDelta::try_days(self.max_inactivity_days).unwrap_or(TimeDelta::MAX)
    }

    pub fn reclaim_interval(&self) -> Duration {
        Duration::from_secs(self.reclaim_interval_hours.saturating_mul(SECS_PER_HOUR))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub max_tool_rounds: usize,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self { max_tool_rounds: 3 }
    }
}

/// Credentials, read from the environment only.
#[derive(Clone, Default)]
pub struct Secrets {
    pub discord_token: String,
    pub gemini_api_keys: Vec<String>,
    pub search_api_key: Option<String>,
    pub search_engine_id: Option<String>,
    pub youtube_api_key: Option<String>,
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("discord_token", &"[REDACTED]")
            .field("gemini_api_keys", &self.gemini_api_keys.len())
            .field("search_api_key", &self.search_api_key.is_some())
            .field("search_engine_id", &self.search_engine_id)
            .field("youtube_api_key", &self.youtube_api_key.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_behaviour() {
        let app = AppConfig::default();
        assert_eq!(app.discord.max_message_length, 2000);
        assert_eq!(app.conversation.max_turns, 20);
        assert_eq!(app.conversation.max_inactivity(), TimeDelta::days(30));
        assert_eq!(app.conversation.reclaim_interval(), Duration::from_secs(86_400));
        assert_eq!(app.tools.max_tool_rounds, 3);
        assert_eq!(
            app.gemini.model_tiers(),
            vec!["gemini-2.5-pro".to_string(), "gemini-2.5-flash".to_string()]
        );
    }

    #[test]
    fn fallback_tier_dropped_when_same_or_empty() {
        let mut gemini = GeminiConfig {
            fallback_model: Some(DEFAULT_PRIMARY_MODEL.to_string()),
            ..GeminiConfig::default()
        };
        assert_eq!(gemini.model_tiers().len(), 1);

        gemini.fallback_model = Some("  ".to_string());
        assert_eq!(gemini.model_tiers().len(), 1);

        gemini.fallback_model = None;
        assert_eq!(gemini.model_tiers(), vec![DEFAULT_PRIMARY_MODEL.to_string()]);
    }

    #[test]
    fn secrets_debug_hides_values() {
        let secrets = Secrets {
            discord_token: "super-secret-token".into(),
            gemini_api_keys: vec!["AIzaSecret".into()],
            ..Secrets::default()
        };
        let rendered = format!("{secrets:?}");
        assert!(!rendered.contains("super-secret-token"));
        assert!(!rendered.contains("AIzaSecret"));
    }
}
