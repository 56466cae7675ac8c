use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use parley_agents::ChatOrchestrator;
use parley_common::{ChannelId, Error, MemoryKey, UserId};
use parley_store::{ConversationMemory, MemoryMode};
use poise::serenity_prelude as serenity;
use tracing::{error, info};

use crate::delivery::{ReplyTarget, deliver};
use crate::{EMPTY_MENTION_REPLY, GENERIC_FAILURE_REPLY};

/// Shared state handed to every command and to the message handler.
pub struct BotState {
    pub orchestrator: Arc<ChatOrchestrator>,
    pub memory: Arc<ConversationMemory>,
    pub started_at: DateTime<Utc>,
    pub max_message_length: usize,
    pub error_notice_ttl: Duration,
}

impl BotState {
    pub fn memory_key(&self, channel: serenity::ChannelId, user: serenity::UserId) -> MemoryKey {
        self.memory
            .memory_key(&ChannelId::from(channel.get()), &UserId::from(user.get()))
    }
}

/// Type alias for the poise error type.
pub type CommandError = Box<dyn std::error::Error + Send + Sync>;

/// Type alias for the poise context.
pub type CommandContext<'a> = poise::Context<'a, Arc<BotState>, CommandError>;

/// Sends chunked replies as the interaction response plus follow-ups.
struct CommandReply<'a> {
    ctx: CommandContext<'a>,
}

#[async_trait]
impl ReplyTarget for CommandReply<'_> {
    async fn reply(&self, text: &str) -> parley_common::Result<()> {
        self.ctx
            .say(text)
            .await
            .map(|_| ())
            .map_err(|e| Error::Channel(format!("failed to send reply: {e}")))
    }

    async fn follow_up(&self, text: &str) -> parley_common::Result<()> {
        self.reply(text).await
    }
}

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum MemoryModeChoice {
    #[name = "channel"]
    Channel,
    #[name = "user"]
    User,
}

impl From<MemoryModeChoice> for MemoryMode {
    fn from(choice: MemoryModeChoice) -> Self {
        match choice {
            MemoryModeChoice::Channel => MemoryMode::Channel,
            MemoryModeChoice::User => MemoryMode::User,
        }
    }
}

/// `/ask`: Ask the assistant a question.
#[poise::command(slash_command)]
pub async fn ask(
    ctx: CommandContext<'_>,
    #[description = "Your question"] question: String,
) -> Result<(), CommandError> {
    let question = question.trim();
    if question.is_empty() {
        ctx.say(EMPTY_MENTION_REPLY).await?;
        return Ok(());
    }
    ctx.defer().await?;

    let state = ctx.data();
    let key = state.memory_key(ctx.channel_id(), ctx.author().id);
    let user_id = ctx.author().id.to_string();

    match state
        .orchestrator
        .generate_with_context(question, &key, Some(&user_id))
        .await
    {
        Ok(answer) => {
            let target = CommandReply { ctx };
            if let Err(e) = deliver(&target, &answer, state.max_message_length).await {
                error!(memory_key = %key, "failed to deliver /ask reply: {e}");
                ctx.say(GENERIC_FAILURE_REPLY).await?;
            }
        }
        Err(e) => {
            error!(memory_key = %key, "/ask failed: {e}");
            ctx.say(GENERIC_FAILURE_REPLY).await?;
        }
    }
    Ok(())
}

/// `/help`: Show what the bot can do.
#[poise::command(slash_command)]
pub async fn help(ctx: CommandContext<'_>) -> Result<(), CommandError> {
    ctx.say(help_text()).await?;
    Ok(())
}

/// `/clear`: Forget the current conversation.
#[poise::command(
    slash_command,
    required_permissions = "MANAGE_MESSAGES",
    default_member_permissions = "MANAGE_MESSAGES"
)]
pub async fn clear(ctx: CommandContext<'_>) -> Result<(), CommandError> {
    let state = ctx.data();
    let (key, existed) = state.memory.clear_for(
        &ChannelId::from(ctx.channel_id().get()),
        &UserId::from(ctx.author().id.get()),
    );
    info!(memory_key = %key, existed, "conversation cleared by command");

    let text = if existed {
        "🧹 Conversation memory cleared."
    } else {
        "There was no conversation memory to clear."
    };
    ctx.say(text).await?;
    Ok(())
}

/// `/memorymode`: Share one conversation per channel or keep one per user.
#[poise::command(
    slash_command,
    rename = "memorymode",
    required_permissions = "MANAGE_MESSAGES",
    default_member_permissions = "MANAGE_MESSAGES"
)]
pub async fn memory_mode(
    ctx: CommandContext<'_>,
    #[description = "channel: shared conversation, user: one conversation per user"]
    mode: MemoryModeChoice,
) -> Result<(), CommandError> {
    let mode = MemoryMode::from(mode);
    let removed = ctx
        .data()
        .memory
        .switch_mode(&ChannelId::from(ctx.channel_id().get()), mode);

    let scope = match mode {
        MemoryMode::Channel => "everyone in this channel shares one conversation",
        MemoryMode::User => "each user has their own conversation",
    };
    ctx.say(format!(
        "Memory mode set to **{mode}**: {scope}. Cleared {removed} stored conversation(s)."
    ))
    .await?;
    Ok(())
}

/// `/stats`: Report uptime and memory usage.
#[poise::command(slash_command)]
pub async fn stats(ctx: CommandContext<'_>) -> Result<(), CommandError> {
    let state = ctx.data();
    let store = state.memory.store();
    let text = format!(
        "**Parley stats**\n\
         Uptime: {}\n\
         Gemini credentials: {}\n\
         Active conversations: {}\n\
         Approximate memory: {}",
        format_uptime(Utc::now() - state.started_at),
        state.orchestrator.credential_count(),
        store.len(),
        format_bytes(store.approximate_bytes()),
    );
    ctx.say(text).await?;
    Ok(())
}

/// `/ping`: Gateway heartbeat latency and message round trip.
#[poise::command(slash_command)]
pub async fn ping(ctx: CommandContext<'_>) -> Result<(), CommandError> {
    let heartbeat = ctx.ping().await;
    let sent_at = Instant::now();
    let handle = ctx.say("🏓 Pinging...").await?;
    let round_trip = sent_at.elapsed();

    let heartbeat = if heartbeat.is_zero() {
        "not measured yet".to_string()
    } else {
        format!("{}ms", heartbeat.as_millis())
    };
    handle
        .edit(
            ctx,
            poise::CreateReply::default().content(format!(
                "🏓 Pong! Gateway heartbeat: {heartbeat}. Round trip: {}ms.",
                round_trip.as_millis()
            )),
        )
        .await?;
    Ok(())
}

/// All registered slash commands.
pub fn all_commands() -> Vec<poise::Command<Arc<BotState>, CommandError>> {
    vec![ask(), help(), clear(), memory_mode(), stats(), ping()]
}

/// Register slash commands with Discord for the given guild IDs.
///
/// If `guild_ids` is empty, commands are registered globally (takes up to 1 hour).
/// If `guild_ids` is provided, commands are registered per-guild (instant).
pub async fn register_commands(
    ctx: &serenity::Context,
    guild_ids: &[u64],
    commands: &[poise::Command<Arc<BotState>, CommandError>],
) -> Result<(), CommandError> {
    if guild_ids.is_empty() {
        info!("registering {} slash commands globally", commands.len());
        poise::builtins::register_globally(ctx, commands).await?;
    } else {
        for &guild_id in guild_ids {
            let guild = serenity::GuildId::new(guild_id);
            info!(
                "registering {} slash commands for guild {}",
                commands.len(),
                guild_id
            );
            poise::builtins::register_in_guild(ctx, commands, guild).await?;
        }
    }

    Ok(())
}

fn help_text() -> String {
    "**Parley** answers questions with Google Gemini.\n\
     Mention me with a question, or use:\n\
     • `/ask` ask a question\n\
     • `/clear` forget the current conversation (Manage Messages)\n\
     • `/memorymode` share memory per channel or keep it per user (Manage Messages)\n\
     • `/stats` uptime and memory usage\n\
     • `/ping` check latency\n\
     I can search the web and look up or summarize YouTube videos when it helps."
        .to_string()
}

fn format_uptime(uptime: TimeDelta) -> String {
    let total = uptime.num_seconds().max(0);
    let (days, hours, minutes, seconds) = (
        total / 86_400,
        total % 86_400 / 3_600,
        total % 3_600 / 60,
        total % 60,
    );
    if days > 0 {
        format!("{days}d {hours}h {minutes}m {seconds}s")
    } else if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else {
        format!("{minutes}m {seconds}s")
    }
}

fn format_bytes(bytes: usize) -> String {
    const KIB: f64 = 1024.0;
    let bytes_f = bytes as f64;
    if bytes_f < KIB {
        format!("{bytes} B")
    } else if bytes_f < KIB * KIB {
        format!("{:.1} KiB", bytes_f / KIB)
    } else {
        format!("{:.1} MiB", bytes_f / (KIB * KIB))
    }
}
