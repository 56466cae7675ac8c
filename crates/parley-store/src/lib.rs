pub mod conversation;
pub mod memory;
pub mod modes;
pub mod reclaim;

pub use conversation::{
    ConversationEntry, ConversationStore, DEFAULT_MAX_TURNS, Turn, TurnRole,
};
pub use memory::ConversationMemory;
pub use modes::{MemoryMode, MemoryModes};
pub use reclaim::spawn_reclaimer;
