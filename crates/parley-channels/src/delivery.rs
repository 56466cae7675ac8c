use async_trait::async_trait;
use parley_common::{Error, Result};
use tracing::debug;

use crate::chunk::split_reply;

/// Somewhere a chunked reply can be sent: the first segment answers the
/// request directly, later segments follow it.
#[async_trait]
pub trait ReplyTarget: Send + Sync {
    async fn reply(&self, text: &str) -> Result<()>;

    async fn follow_up(&self, text: &str) -> Result<()>;
}

/// Split `text` to fit `max_len` and send it through `target`.
///
/// Returns the number of messages sent. A reply with no visible content is an
/// error because the platform rejects empty messages.
pub async fn deliver(target: &dyn ReplyTarget, text: &str, max_len: usize) -> Result<usize> {
    let segments: Vec<String> = split_reply(text, max_len)
        .into_iter()
        .filter(|s| !s.trim().is_empty())
        .collect();

    let Some((first, rest)) = segments.split_first() else {
        return Err(Error::Channel("generated reply is empty".into()));
    };

    target.reply(first).await?;
    for segment in rest {
        target.follow_up(segment).await?;
    }
    debug!(segments = segments.len(), "reply delivered");
    Ok(segments.len())
}
