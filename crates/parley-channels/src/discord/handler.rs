use std::sync::Arc;

use async_trait::async_trait;
use parley_common::{Error, Result};
use serenity::all::{Context, EventHandler, Message as SerenityMessage, Ready};
use tracing::{debug, error, info, warn};

use super::commands::BotState;
use super::convert::{self, InboundPrompt};
use crate::delivery::{ReplyTarget, deliver};
use crate::{EMPTY_MENTION_REPLY, GENERIC_FAILURE_REPLY};

/// Replies to the triggering message first, then posts follow-ups in its channel.
struct MessageReply<'a> {
    ctx: &'a Context,
    msg: &'a SerenityMessage,
}

#[async_trait]
impl ReplyTarget for MessageReply<'_> {
    async fn reply(&self, text: &str) -> Result<()> {
        self.msg
            .reply(self.ctx, text)
            .await
            .map(|_| ())
            .map_err(|e| Error::Channel(format!("failed to reply: {e}")))
    }

    async fn follow_up(&self, text: &str) -> Result<()> {
        self.msg
            .channel_id
            .say(&self.ctx.http, text)
            .await
            .map(|_| ())
            .map_err(|e| Error::Channel(format!("failed to send follow-up: {e}")))
    }
}

/// Serenity event handler that answers messages mentioning the bot.
pub struct DiscordHandler {
    state: Arc<BotState>,
}

impl DiscordHandler {
    pub fn new(state: Arc<BotState>) -> Self {
        Self { state }
    }

    /// Tell the user something went wrong, then remove the notice after a while.
    async fn notify_failure(&self, ctx: &Context, msg: &SerenityMessage) {
        let notice = match msg.reply(ctx, GENERIC_FAILURE_REPLY).await {
            Ok(notice) => notice,
            Err(e) => {
                warn!(channel = %msg.channel_id, "failed to send error notice: {e}");
                return;
            }
        };

        let http = Arc::clone(&ctx.http);
        let ttl = self.state.error_notice_ttl;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Err(e) = notice.channel_id.delete_message(&http, notice.id).await {
                warn!(message_id = %notice.id, "failed to delete error notice: {e}");
            }
        });
    }
}

#[serenity::async_trait]
impl EventHandler for DiscordHandler {
    /// Fired when the bot successfully connects and is ready.
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(
            "Discord bot connected as {} (guilds: {})",
            ready.user.name,
            ready.guilds.len()
        );
    }

    /// Fired when a message is received in any channel the bot can see.
    async fn message(&self, ctx: Context, msg: SerenityMessage) {
        let bot_id = ctx.cache.current_user().id;
        let mentioned = msg.mentions_user_id(bot_id);
        let Some(prompt) = convert::inbound_prompt(&msg.content, msg.author.bot, mentioned)
        else {
            return;
        };

        let prompt = match prompt {
            InboundPrompt::Text(prompt) => prompt,
            InboundPrompt::Empty => {
                if let Err(e) = msg.reply(&ctx, EMPTY_MENTION_REPLY).await {
                    warn!(channel = %msg.channel_id, "failed to send mention nudge: {e}");
                }
                return;
            }
        };

        debug!(
            message_id = %msg.id,
            author = %msg.author.name,
            channel = %msg.channel_id,
            "received mention"
        );

        let key = self.state.memory_key(msg.channel_id, msg.author.id);
        let user_id = msg.author.id.to_string();

        let typing = msg.channel_id.start_typing(&ctx.http);
        let result = self
            .state
            .orchestrator
            .generate_with_context(&prompt, &key, Some(&user_id))
            .await;
        typing.stop();

        let answer = match result {
            Ok(answer) => answer,
            Err(e) => {
                error!(memory_key = %key, "failed to answer mention: {e}");
                self.notify_failure(&ctx, &msg).await;
                return;
            }
        };

        let target = MessageReply {
            ctx: &ctx,
            msg: &msg,
        };
        if let Err(e) = deliver(&target, &answer, self.state.max_message_length).await {
            error!(memory_key = %key, "failed to deliver reply: {e}");
            self.notify_failure(&ctx, &msg).await;
        }
    }
}
