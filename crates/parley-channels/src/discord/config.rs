use std::time::Duration;

use parley_common::{Error, Result};
use parley_config::BotConfig;
use serenity::all::GatewayIntents;

/// Discord connection settings resolved from [`BotConfig`].
#[derive(Debug, Clone)]
pub struct DiscordSettings {
    /// Bot token for authenticating with Discord.
    pub bot_token: String,

    /// Guild IDs for registering guild-specific slash commands.
    /// If empty, commands are registered globally.
    pub guild_ids: Vec<u64>,

    /// Gateway intents to request from Discord.
    pub intents: GatewayIntents,

    pub max_message_length: usize,

    /// How long the "something went wrong" notice stays before it is deleted.
    pub error_notice_ttl: Duration,
}

impl DiscordSettings {
    pub fn from_bot_config(config: &BotConfig) -> Result<Self> {
        let bot_token = config.secrets.discord_token.trim().to_string();
        if bot_token.is_empty() {
            return Err(Error::Config("discord bot token is required".into()));
        }

        // - GUILDS: guild info for command registration
        // - GUILD_MESSAGES + MESSAGE_CONTENT: read mentions in server channels
        // - DIRECT_MESSAGES: answer DMs
        let intents = GatewayIntents::GUILDS
            | GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::DIRECT_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT;

        Ok(Self {
            bot_token,
            guild_ids: config.app.discord.guild_ids.clone(),
            intents,
            max_message_length: config.app.discord.max_message_length,
            error_notice_ttl: Duration::from_secs(config.app.discord.error_notice_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_config::{AppConfig, Secrets};

    fn bot_config(token: &str, guild_ids: Vec<u64>) -> BotConfig {
        let mut app = AppConfig::default();
        app.discord.guild_ids = guild_ids;
        BotConfig {
            app,
            secrets: Secrets {
                discord_token: token.to_string(),
                gemini_api_keys: vec!["key".into()],
                ..Secrets::default()
            },
        }
    }

    #[test]
    fn settings_follow_bot_config() {
        let settings = DiscordSettings::from_bot_config(&bot_config(" token ", vec![111, 222]))
            .expect("should build");
        assert_eq!(settings.bot_token, "token");
        assert_eq!(settings.guild_ids, vec![111, 222]);
        assert_eq!(settings.max_message_length, 2000);
        assert_eq!(settings.error_notice_ttl, Duration::from_secs(15));
        assert!(settings.intents.contains(GatewayIntents::MESSAGE_CONTENT));
    }

    #[test]
    fn blank_token_fails() {
        let err = DiscordSettings::from_bot_config(&bot_config("   ", vec![]))
            .expect_err("should fail with blank token");
        assert!(err.to_string().contains("token"));
    }
}
