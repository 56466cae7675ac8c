pub mod dispatch;
pub mod providers;
pub mod rotation;
pub mod runtime;
pub mod tools;

pub use dispatch::{DEFAULT_MAX_TOOL_ROUNDS, DispatchOutcome, ToolDispatcher};
pub use providers::{
    ChatMessage, ChatRole, ContentBlock, GeminiProvider, LlmProvider, LlmRequest, LlmResponse,
    MessagePart, ToolDefinition, Usage,
};
pub use rotation::{Attempts, Credential, CredentialRotator};
pub use runtime::ChatOrchestrator;
pub use tools::{Tool, ToolContext, ToolOutput};
