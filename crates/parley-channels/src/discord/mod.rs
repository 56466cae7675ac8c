pub mod commands;
pub mod config;
pub mod convert;
pub mod handler;

use std::sync::Arc;

use async_trait::async_trait;
use parley_common::{Error, Result};
use poise::serenity_prelude as serenity;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub use commands::{BotState, CommandError};
pub use config::DiscordSettings;
pub use handler::DiscordHandler;

use crate::traits::{ChannelLifecycle, ChannelStatus};

/// Discord connection: a serenity client running the poise command framework
/// alongside the mention handler.
pub struct DiscordChannel {
    settings: DiscordSettings,
    state: Arc<BotState>,
    status: ChannelStatus,
    shard_manager: Option<Arc<serenity::ShardManager>>,
    client_task: Option<JoinHandle<()>>,
}

impl DiscordChannel {
    pub fn new(settings: DiscordSettings, state: Arc<BotState>) -> Self {
        Self {
            settings,
            state,
            status: ChannelStatus::Disconnected,
            shard_manager: None,
            client_task: None,
        }
    }

    /// Wait until the gateway client stops, either through [`ChannelLifecycle::disconnect`]
    /// or a fatal gateway error.
    pub async fn wait(&mut self) -> Result<()> {
        if let Some(task) = self.client_task.take() {
            task.await
                .map_err(|e| Error::Channel(format!("discord client task failed: {e}")))?;
        }
        self.status = ChannelStatus::Disconnected;
        Ok(())
    }

    fn build_framework(&self) -> poise::Framework<Arc<BotState>, CommandError> {
        let guild_ids = self.settings.guild_ids.clone();
        let state = Arc::clone(&self.state);

        poise::Framework::builder()
            .options(poise::FrameworkOptions {
                commands: commands::all_commands(),
                on_error: |error| Box::pin(on_error(error)),
                ..Default::default()
            })
            .setup(move |ctx, ready, framework| {
                Box::pin(async move {
                    info!("poise framework ready for {}", ready.user.name);
                    commands::register_commands(ctx, &guild_ids, &framework.options().commands)
                        .await?;
                    Ok(state)
                })
            })
            .build()
    }
}

async fn on_error(error: poise::FrameworkError<'_, Arc<BotState>, CommandError>) {
    match error {
        poise::FrameworkError::Setup { error, .. } => {
            error!("failed to set up discord commands: {error}");
        }
        poise::FrameworkError::Command { error, ctx, .. } => {
            error!(command = %ctx.command().name, "command failed: {error}");
        }
        other => {
            if let Err(e) = poise::builtins::on_error(other).await {
                error!("failed to report command error: {e}");
            }
        }
    }
}

#[async_trait]
impl ChannelLifecycle for DiscordChannel {
    fn display_name(&self) -> &str {
        "discord"
    }

    async fn connect(&mut self) -> Result<()> {
        if self.client_task.is_some() {
            return Err(Error::Channel("discord channel is already connected".into()));
        }
        self.status = ChannelStatus::Connecting;

        let framework = self.build_framework();
        let built = serenity::ClientBuilder::new(&self.settings.bot_token, self.settings.intents)
            .framework(framework)
            .event_handler(DiscordHandler::new(Arc::clone(&self.state)))
            .await;
        let mut client = match built {
            Ok(client) => client,
            Err(e) => {
                self.status = ChannelStatus::Error(e.to_string());
                return Err(Error::Channel(format!("failed to build discord client: {e}")));
            }
        };

        self.shard_manager = Some(Arc::clone(&client.shard_manager));
        self.client_task = Some(tokio::spawn(async move {
            if let Err(e) = client.start_autosharded().await {
                error!("discord client stopped: {e}");
            }
        }));
        self.status = ChannelStatus::Connected;
        info!("discord channel started");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        match self.shard_manager.take() {
            Some(shard_manager) => shard_manager.shutdown_all().await,
            None => warn!("discord channel was not connected"),
        }
        self.wait().await?;
        info!("discord channel disconnected");
        Ok(())
    }

    fn status(&self) -> ChannelStatus {
        self.status.clone()
    }
}
