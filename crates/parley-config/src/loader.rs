use std::path::Path;

use chrono::TimeDelta;
use parley_common::{Error, Result};
use tracing::{info, warn};

use crate::model::{AppConfig, BotConfig, DISCORD_MAX_MESSAGE_LENGTH, SECS_PER_HOUR, Secrets};

/// Environment variables holding Gemini API keys, in rotation order.
pub const GEMINI_KEY_VARS: [&str; 5] = [
    "GEMINI_API_KEY",
    "GEMINI_API_KEY_2",
    "GEMINI_API_KEY_3",
    "GEMINI_API_KEY_4",
    "GEMINI_API_KEY_5",
];

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Resolves [`BotConfig`] from environment variables plus an optional TOML file
/// named by `PARLEY_CONFIG`.
pub struct ConfigLoader {
    lookup: Lookup,
}

impl ConfigLoader {
    pub fn from_env() -> Self {
        Self::with_lookup(|key| std::env::var(key).ok())
    }

    pub fn with_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            lookup: Box::new(lookup),
        }
    }

    fn var(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .filter(|v| !looks_like_placeholder_secret(v))
    }

    pub fn load(&self) -> Result<BotConfig> {
        let mut app = match self.var("PARLEY_CONFIG") {
            Some(path) => load_file(Path::new(&path))?,
            None => AppConfig::default(),
        };

        if let Some(raw) = self.var("DISCORD_GUILD_IDS") {
            app.discord.guild_ids = parse_guild_ids(&raw)?;
        }
        if let Some(model) = self.var("GEMINI_MODEL") {
            app.gemini.primary_model = model;
        }
        if let Some(model) = self.var("GEMINI_FALLBACK_MODEL") {
            app.gemini.fallback_model = Some(model);
        }

        let secrets = self.load_secrets()?;
        validate(&app)?;

        info!(
            gemini_keys = secrets.gemini_api_keys.len(),
            model_tiers = app.gemini.model_tiers().len(),
            web_search = secrets.search_api_key.is_some() && secrets.search_engine_id.is_some(),
            youtube = secrets.youtube_api_key.is_some(),
            "configuration loaded"
        );

        Ok(BotConfig { app, secrets })
    }

    fn load_secrets(&self) -> Result<Secrets> {
        let discord_token = self
            .var("DISCORD_BOT_TOKEN")
            .ok_or_else(|| Error::Config("DISCORD_BOT_TOKEN is required".into()))?;

        let mut gemini_api_keys: Vec<String> = Vec::new();
        for var in GEMINI_KEY_VARS {
            if let Some(key) = self.var(var) {
                if gemini_api_keys.contains(&key) {
                    warn!("{var} duplicates an earlier Gemini key; ignoring");
                    continue;
                }
                gemini_api_keys.push(key);
            }
        }
        if gemini_api_keys.is_empty() {
            return Err(Error::Config(
                "at least one Gemini API key is required (GEMINI_API_KEY)".into(),
            ));
        }

        let search_api_key = self.var("GOOGLE_SEARCH_API_KEY");
        let search_engine_id = self.var("GOOGLE_SEARCH_ENGINE_ID");
        if search_api_key.is_some() != search_engine_id.is_some() {
            warn!(
                "web search needs both GOOGLE_SEARCH_API_KEY and GOOGLE_SEARCH_ENGINE_ID; it stays disabled"
            );
        }

        Ok(Secrets {
            discord_token,
            gemini_api_keys,
            search_api_key,
            search_engine_id,
            youtube_api_key: self.var("YOUTUBE_API_KEY"),
        })
    }
}

fn load_file(path: &Path) -> Result<AppConfig> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("failed to read config file {}: {e}", path.display()))
    })?;
    let app: AppConfig = toml::from_str(&raw).map_err(|e| {
        Error::Config(format!("invalid config file {}: {e}", path.display()))
    })?;
    info!("loaded config file {}", path.display());
    Ok(app)
}

fn parse_guild_ids(raw: &str) -> Result<Vec<u64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u64>()
                .map_err(|_| Error::Config(format!("invalid guild id in DISCORD_GUILD_IDS: '{s}'")))
        })
        .collect()
}

fn validate(app: &AppConfig) -> Result<()> {
    let max_len = app.discord.max_message_length;
    if max_len == 0 || max_len > DISCORD_MAX_MESSAGE_LENGTH {
        return Err(Error::Config(format!(
            "discord.max_message_length must be between 1 and {DISCORD_MAX_MESSAGE_LENGTH}, got {max_len}"
        )));
    }
    if app.conversation.max_turns < 2 {
        return Err(Error::Config(
            "conversation.max_turns must hold at least one exchange (2)".into(),
        ));
    }
    let days = app.conversation.max_inactivity_days;
    if days <= 0 || TimeDelta::try_days(days).is_none() {
        return Err(Error::Config(format!(
            "conversation.max_inactivity_days must be a positive number of days, got {days}"
        )));
    }
    let hours = app.conversation.reclaim_interval_hours;
    if hours == 0 || hours.checked_mul(SECS_PER_HOUR).is_none() {
        return Err(Error::Config(format!(
            "conversation.reclaim_interval_hours must be a positive number of hours, got {hours}"
        )));
    }
    if app.gemini.primary_model.trim().is_empty() {
        return Err(Error::Config("gemini.primary_model cannot be empty".into()));
    }
    Ok(())
}

fn looks_like_placeholder_secret(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.starts_with("your_") && trimmed.ends_with("_here")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn loader(pairs: &[(&str, &str)]) -> ConfigLoader {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ConfigLoader::with_lookup(move |key| vars.get(key).cloned())
    }

    #[test]
    fn minimal_environment_loads() {
        let config = loader(&[("DISCORD_BOT_TOKEN", "token"), ("GEMINI_API_KEY", "key-1")])
            .load()
            .expect("should load");
        assert_eq!(config.secrets.discord_token, "token");
        assert_eq!(config.secrets.gemini_api_keys, vec!["key-1".to_string()]);
        assert!(config.secrets.youtube_api_key.is_none());
        assert_eq!(config.app.discord.max_message_length, 2000);
    }

    #[test]
    fn missing_discord_token_fails() {
        let err = loader(&[("GEMINI_API_KEY", "key-1")])
            .load()
            .expect_err("should fail without token");
        assert!(err.to_string().contains("DISCORD_BOT_TOKEN"));
    }

    #[test]
    fn missing_all_gemini_keys_fails() {
        let err = loader(&[("DISCORD_BOT_TOKEN", "token")])
            .load()
            .expect_err("should fail without keys");
        assert!(err.to_string().contains("Gemini API key"));
    }

    #[test]
    fn collects_numbered_keys_in_order_and_skips_gaps_and_duplicates() {
        let config = loader(&[
            ("DISCORD_BOT_TOKEN", "token"),
            ("GEMINI_API_KEY_3", "key-3"),
            ("GEMINI_API_KEY", "key-1"),
            ("GEMINI_API_KEY_5", "key-1"),
        ])
        .load()
        .expect("should load");
        assert_eq!(
            config.secrets.gemini_api_keys,
            vec!["key-1".to_string(), "key-3".to_string()]
        );
    }

    #[test]
    fn placeholder_and_blank_values_are_ignored() {
        let err = loader(&[
            ("DISCORD_BOT_TOKEN", "token"),
            ("GEMINI_API_KEY", "your_gemini_api_key_here"),
            ("GEMINI_API_KEY_2", "   "),
        ])
        .load()
        .expect_err("placeholders do not count as keys");
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn guild_ids_and_model_overrides() {
        let config = loader(&[
            ("DISCORD_BOT_TOKEN", "token"),
            ("GEMINI_API_KEY", "key-1"),
            ("DISCORD_GUILD_IDS", "111, 222,"),
            ("GEMINI_MODEL", "gemini-2.5-flash"),
            ("GEMINI_FALLBACK_MODEL", "gemini-2.5-flash-lite"),
        ])
        .load()
        .expect("should load");
        assert_eq!(config.app.discord.guild_ids, vec![111, 222]);
        assert_eq!(
            config.app.gemini.model_tiers(),
            vec![
                "gemini-2.5-flash".to_string(),
                "gemini-2.5-flash-lite".to_string()
            ]
        );
    }

    #[test]
    fn bad_guild_id_fails() {
        let err = loader(&[
            ("DISCORD_BOT_TOKEN", "token"),
            ("GEMINI_API_KEY", "key-1"),
            ("DISCORD_GUILD_IDS", "abc"),
        ])
        .load()
        .expect_err("non-numeric guild id");
        assert!(err.to_string().contains("abc"));
    }

    #[test]
    fn out_of_range_conversation_windows_are_rejected() {
        let mut app = AppConfig::default();
        app.conversation.max_inactivity_days = i64::MAX;
        let err = validate(&app).expect_err("days overflow a TimeDelta");
        assert!(err.to_string().contains("max_inactivity_days"));

        let mut app = AppConfig::default();
        app.conversation.reclaim_interval_hours = u64::MAX / 60;
        let err = validate(&app).expect_err("hours overflow seconds");
        assert!(err.to_string().contains("reclaim_interval_hours"));

        assert!(validate(&AppConfig::default()).is_ok());
    }
}
