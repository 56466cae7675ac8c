use std::sync::Arc;

use parley_common::{ChannelId, MemoryKey, UserId};
use tracing::info;

use crate::conversation::ConversationStore;
use crate::modes::{MemoryMode, MemoryModes};

/// Conversation store paired with the memory-mode table that decides its keys.
pub struct ConversationMemory {
    store: Arc<ConversationStore>,
    modes: MemoryModes,
}

impl ConversationMemory {
    pub fn new(store: Arc<ConversationStore>) -> Self {
        Self {
            store,
            modes: MemoryModes::new(),
        }
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn mode_for(&self, channel: &ChannelId) -> MemoryMode {
        self.modes.mode_for(channel)
    }

    pub fn memory_key(&self, channel: &ChannelId, user: &UserId) -> MemoryKey {
        self.modes.memory_key(channel, user)
    }

    /// Clear the conversation the caller is currently talking in, as scoped by the
    /// channel's mode. Returns the key that was targeted and whether it existed.
    pub fn clear_for(&self, channel: &ChannelId, user: &UserId) -> (MemoryKey, bool) {
        let key = self.memory_key(channel, user);
        let existed = self.store.clear(&key);
        (key, existed)
    }

    /// Switch a channel's mode. Every stored conversation is dropped, not only
    /// the affected channel's. Returns how many conversations were removed.
    pub fn switch_mode(&self, channel: &ChannelId, mode: MemoryMode) -> usize {
        let previous = self.modes.set_mode(channel, mode);
        let removed = self.store.clear_all();
        info!(
            channel = %channel,
            from = %previous,
            to = %mode,
            removed,
            "memory mode switched, all conversations cleared"
        );
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Turn;

    #[test]
    fn switching_mode_clears_every_conversation() {
        let store = Arc::new(ConversationStore::new());
        let memory = ConversationMemory::new(Arc::clone(&store));
        let channel_a = ChannelId::from(1);
        let channel_b = ChannelId::from(2);
        let user = UserId::from(9);

        let key_a = memory.memory_key(&channel_a, &user);
        let key_b = memory.memory_key(&channel_b, &user);
        store.append(&key_a, Turn::user("hello a"));
        store.append(&key_b, Turn::user("hello b"));

        assert_eq!(memory.switch_mode(&channel_a, MemoryMode::User), 2);
        assert!(!store.contains(&key_a));
        assert!(!store.contains(&key_b));
        assert_eq!(memory.mode_for(&channel_a), MemoryMode::User);
        assert_eq!(memory.mode_for(&channel_b), MemoryMode::Channel);
    }

    #[test]
    fn clear_is_scoped_by_mode() {
        let store = Arc::new(ConversationStore::new());
        let memory = ConversationMemory::new(Arc::clone(&store));
        let channel = ChannelId::from(1);
        let alice = UserId::from(100);
        let bob = UserId::from(200);

        memory.switch_mode(&channel, MemoryMode::User);
        store.append(&memory.memory_key(&channel, &alice), Turn::user("alice"));
        store.append(&memory.memory_key(&channel, &bob), Turn::user("bob"));

        let (key, existed) = memory.clear_for(&channel, &alice);
        assert!(existed);
        assert_eq!(key, MemoryKey::user(&alice));
        assert!(store.contains(&MemoryKey::user(&bob)));
    }
}
