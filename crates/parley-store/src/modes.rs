use std::fmt;
use std::str::FromStr;

use dashmap::DashMap;
use parley_common::{ChannelId, Error, MemoryKey, UserId};
use serde::{Deserialize, Serialize};

/// Whether a channel shares one conversation or keeps one per user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryMode {
    #[default]
    Channel,
    User,
}

impl MemoryMode {
    pub fn as_str(self) -> &'static str {
        match self {
            MemoryMode::Channel => "channel",
            MemoryMode::User => "user",
        }
    }
}

impl fmt::Display for MemoryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "channel" => Ok(MemoryMode::Channel),
            "user" => Ok(MemoryMode::User),
            other => Err(Error::Config(format!(
                "unknown memory mode '{other}', expected 'channel' or 'user'"
            ))),
        }
    }
}

/// Per-channel memory mode table. Channels without an entry use [`MemoryMode::Channel`].
#[derive(Default)]
pub struct MemoryModes {
    modes: DashMap<ChannelId, MemoryMode>,
}

impl MemoryModes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode_for(&self, channel: &ChannelId) -> MemoryMode {
        self.modes.get(channel).map(|m| *m).unwrap_or_default()
    }

    /// Set the mode for a channel, returning the previous one.
    pub fn set_mode(&self, channel: &ChannelId, mode: MemoryMode) -> MemoryMode {
        self.modes.insert(channel.clone(), mode).unwrap_or_default()
    }

    pub fn memory_key(&self, channel: &ChannelId, user: &UserId) -> MemoryKey {
        match self.mode_for(channel) {
            MemoryMode::Channel => MemoryKey::channel(channel),
            MemoryMode::User => MemoryKey::user(user),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_channel_mode() {
        let modes = MemoryModes::new();
        let channel = ChannelId::from(10);
        assert_eq!(modes.mode_for(&channel), MemoryMode::Channel);
        assert_eq!(
            modes.memory_key(&channel, &UserId::from(5)),
            MemoryKey::channel(&channel)
        );
    }

    #[test]
    fn user_mode_keys_by_user() {
        let modes = MemoryModes::new();
        let channel = ChannelId::from(10);
        let user = UserId::from(5);
        assert_eq!(modes.set_mode(&channel, MemoryMode::User), MemoryMode::Channel);
        assert_eq!(modes.memory_key(&channel, &user), MemoryKey::user(&user));
        // Other channels are unaffected.
        let other = ChannelId::from(11);
        assert_eq!(modes.memory_key(&other, &user), MemoryKey::channel(&other));
    }

    #[test]
    fn parses_mode_names() {
        assert_eq!("channel".parse::<MemoryMode>().unwrap(), MemoryMode::Channel);
        assert_eq!(" USER ".parse::<MemoryMode>().unwrap(), MemoryMode::User);
        assert!("guild".parse::<MemoryMode>().is_err());
    }
}
