use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::conversation::ConversationStore;

/// Spawn a background task that drops idle conversations every `period`.
///
/// The first pass runs one full period after startup.
pub fn spawn_reclaimer(
    store: Arc<ConversationStore>,
    period: Duration,
    max_inactivity: TimeDelta,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let removed = store.reclaim(Utc::now(), max_inactivity);
            if removed > 0 {
                info!(
                    removed,
                    remaining = store.len(),
                    "reclaimed inactive conversations"
                );
            } else {
                debug!(remaining = store.len(), "no inactive conversations to reclaim");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Turn;
    use parley_common::{ChannelId, MemoryKey};

    #[tokio::test(start_paused = true)]
    async fn reclaimer_runs_on_its_period() {
        let store = Arc::new(ConversationStore::new());
        let stale = MemoryKey::channel(&ChannelId::from(1));
        let fresh = MemoryKey::channel(&ChannelId::from(2));
        store.append_at(&stale, Turn::user("old"), Utc::now() - TimeDelta::days(45));
        store.append(&fresh, Turn::user("new"));

        let handle = spawn_reclaimer(
            Arc::clone(&store),
            Duration::from_secs(60),
            TimeDelta::days(30),
        );

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(store.contains(&stale), "must not run before the first period");

        tokio::time::sleep(Duration::from_secs(31)).await;
        tokio::task::yield_now().await;
        assert!(!store.contains(&stale));
        assert!(store.contains(&fresh));

        handle.abort();
    }
}
