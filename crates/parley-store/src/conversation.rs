use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use parley_common::MemoryKey;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Ten user/model exchanges.
pub const DEFAULT_MAX_TURNS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Model,
}

/// One message in a conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    pub fn model(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Model,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConversationEntry {
    pub history: Vec<Turn>,
    pub last_activity: DateTime<Utc>,
}

impl ConversationEntry {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            history: Vec::new(),
            last_activity: now,
        }
    }
}

/// In-memory conversation histories keyed by [`MemoryKey`].
///
/// Every operation takes the shard lock for a single map access and never
/// holds it across an `.await`. There is no per-key serialization: two
/// generations running for the same key concurrently each see a snapshot
/// taken when their own prompt was appended, and their turns interleave in
/// completion order.
pub struct ConversationStore {
    entries: DashMap<MemoryKey, ConversationEntry>,
    max_turns: usize,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::with_max_turns(DEFAULT_MAX_TURNS)
    }

    pub fn with_max_turns(max_turns: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_turns: max_turns.max(1),
        }
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// Return a snapshot of the entry for `key`, creating an empty one if absent.
    pub fn get_or_create(&self, key: &MemoryKey) -> ConversationEntry {
        self.entries
            .entry(key.clone())
            .or_insert_with(|| ConversationEntry::new(Utc::now()))
            .clone()
    }

    /// Append a turn, trim the oldest turns beyond the bound, and mark the entry active.
    ///
    /// Returns the history as it stands after trimming.
    pub fn append(&self, key: &MemoryKey, turn: Turn) -> Vec<Turn> {
        self.append_at(key, turn, Utc::now())
    }

    pub fn append_at(&self, key: &MemoryKey, turn: Turn, now: DateTime<Utc>) -> Vec<Turn> {
        let mut entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| ConversationEntry::new(now));

        entry.history.push(turn);
        if entry.history.len() > self.max_turns {
            let excess = entry.history.len() - self.max_turns;
            entry.history.drain(..excess);
            debug!(key = %key, dropped = excess, "trimmed conversation history");
        }
        entry.last_activity = now;
        entry.history.clone()
    }

    pub fn touch(&self, key: &MemoryKey) {
        self.touch_at(key, Utc::now());
    }

    pub fn touch_at(&self, key: &MemoryKey, now: DateTime<Utc>) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.last_activity = now;
        }
    }

    pub fn history(&self, key: &MemoryKey) -> Vec<Turn> {
        self.entries
            .get(key)
            .map(|entry| entry.history.clone())
            .unwrap_or_default()
    }

    pub fn last_activity(&self, key: &MemoryKey) -> Option<DateTime<Utc>> {
        self.entries.get(key).map(|entry| entry.last_activity)
    }

    pub fn contains(&self, key: &MemoryKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Remove one conversation. Returns `true` if it existed.
    pub fn clear(&self, key: &MemoryKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove every conversation. Returns how many were removed.
    pub fn clear_all(&self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    /// Drop every entry idle for strictly longer than `max_inactivity`.
    pub fn reclaim(&self, now: DateTime<Utc>, max_inactivity: TimeDelta) -> usize {
        let mut removed = 0usize;
        self.entries.retain(|_, entry| {
            let keep = now.signed_duration_since(entry.last_activity) <= max_inactivity;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rough heap footprint of all stored conversations, in bytes.
    pub fn approximate_bytes(&self) -> usize {
        self.entries
            .iter()
            .map(|item| {
                let turns: usize = item
                    .history
                    .iter()
                    .map(|turn| std::mem::size_of::<Turn>() + turn.content.capacity())
                    .sum();
                item.key().as_str().len() + std::mem::size_of::<ConversationEntry>() + turns
            })
            .sum()
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_common::ChannelId;

    fn key(id: u64) -> MemoryKey {
        MemoryKey::channel(&ChannelId::from(id))
    }

    #[test]
    fn get_or_create_starts_empty() {
        let store = ConversationStore::new();
        let entry = store.get_or_create(&key(1));
        assert!(entry.history.is_empty());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn append_preserves_order() {
        let store = ConversationStore::new();
        store.append(&key(1), Turn::user("hi"));
        let history = store.append(&key(1), Turn::model("hello"));
        assert_eq!(history, vec![Turn::user("hi"), Turn::model("hello")]);
    }

    #[test]
    fn history_is_bounded_and_drops_oldest_first() {
        let store = ConversationStore::new();
        let k = key(7);
        for i in 0..15 {
            store.append(&k, Turn::user(format!("question {i}")));
            let history = store.append(&k, Turn::model(format!("answer {i}")));
            assert!(history.len() <= DEFAULT_MAX_TURNS);
        }

        let history = store.history(&k);
        assert_eq!(history.len(), 20);
        // 15 exchanges appended, the 10 most recent survive.
        assert_eq!(history[0], Turn::user("question 5"));
        assert_eq!(history[1], Turn::model("answer 5"));
        assert_eq!(history[19], Turn::model("answer 14"));
    }

    #[test]
    fn append_updates_activity() {
        let store = ConversationStore::new();
        let start = Utc::now() - TimeDelta::days(3);
        store.append_at(&key(1), Turn::user("a"), start);
        assert_eq!(store.last_activity(&key(1)), Some(start));

        let later = start + TimeDelta::hours(1);
        store.append_at(&key(1), Turn::model("b"), later);
        assert_eq!(store.last_activity(&key(1)), Some(later));
    }

    #[test]
    fn touch_updates_activity_without_appending() {
        let store = ConversationStore::new();
        let start = Utc::now() - TimeDelta::days(1);
        store.append_at(&key(1), Turn::user("a"), start);
        let now = Utc::now();
        store.touch_at(&key(1), now);
        assert_eq!(store.last_activity(&key(1)), Some(now));
        assert_eq!(store.history(&key(1)).len(), 1);
    }

    #[test]
    fn touch_missing_key_is_noop() {
        let store = ConversationStore::new();
        store.touch(&key(99));
        assert!(store.is_empty());
    }

    #[test]
    fn clear_and_clear_all() {
        let store = ConversationStore::new();
        store.append(&key(1), Turn::user("a"));
        store.append(&key(2), Turn::user("b"));
        store.append(&key(3), Turn::user("c"));

        assert!(store.clear(&key(1)));
        assert!(!store.clear(&key(1)));
        assert_eq!(store.len(), 2);

        assert_eq!(store.clear_all(), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn reclaim_boundary_is_exclusive() {
        let store = ConversationStore::new();
        let threshold = TimeDelta::days(30);
        let last = Utc::now() - TimeDelta::days(40);
        store.append_at(&key(1), Turn::user("a"), last);

        assert_eq!(store.reclaim(last + threshold, threshold), 0);
        assert!(store.contains(&key(1)));

        let one_past = last + threshold + TimeDelta::milliseconds(1);
        assert_eq!(store.reclaim(one_past, threshold), 1);
        assert!(!store.contains(&key(1)));
    }

    #[test]
    fn reclaim_keeps_fresh_entries() {
        let store = ConversationStore::new();
        let now = Utc::now();
        store.append_at(&key(1), Turn::user("old"), now - TimeDelta::days(31));
        store.append_at(&key(2), Turn::user("new"), now - TimeDelta::days(2));

        assert_eq!(store.reclaim(now, TimeDelta::days(30)), 1);
        assert!(!store.contains(&key(1)));
        assert!(store.contains(&key(2)));
    }

    #[test]
    fn approximate_bytes_grows_with_content() {
        let store = ConversationStore::new();
        assert_eq!(store.approximate_bytes(), 0);
        store.append(&key(1), Turn::user("short"));
        let small = store.approximate_bytes();
        store.append(&key(1), Turn::model("x".repeat(1000)));
        assert!(store.approximate_bytes() >= small + 1000);
    }

    #[test]
    fn custom_bound_is_respected() {
        let store = ConversationStore::with_max_turns(4);
        for i in 0..10 {
            store.append(&key(1), Turn::user(i.to_string()));
        }
        let history = store.history(&key(1));
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].content, "6");
    }
}
