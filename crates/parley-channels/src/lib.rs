pub mod chunk;
pub mod delivery;
pub mod traits;

#[cfg(feature = "discord")]
pub mod discord;

pub use chunk::split_reply;
pub use delivery::{ReplyTarget, deliver};
pub use traits::{ChannelLifecycle, ChannelStatus};

#[cfg(feature = "discord")]
pub use discord::{BotState, DiscordChannel};

/// Sent when a reply could not be produced.
pub const GENERIC_FAILURE_REPLY: &str = "Sorry, I ran into an error. Please try again later.";

/// Sent when the bot is mentioned without a question.
pub const EMPTY_MENTION_REPLY: &str = "You mentioned me! Ask me anything.";
