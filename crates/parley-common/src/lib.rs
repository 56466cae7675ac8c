pub mod error;
pub mod types;

pub use error::{Error, Result, UpstreamError, UpstreamErrorKind};
pub use types::{ChannelId, MemoryKey, UserId};
