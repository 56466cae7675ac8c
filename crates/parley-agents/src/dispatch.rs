use parley_common::Result;
use tracing::{debug, info, warn};

use crate::providers::{
    ChatMessage, ChatRole, ContentBlock, LlmProvider, LlmRequest, MessagePart, ToolDefinition,
    extract_text, first_tool_use,
};
use crate::tools::{Tool, ToolContext, ToolOutput};

pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 3;

/// Result of one bounded generation with tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub text: String,
    /// Tool calls serviced before the final answer.
    pub rounds: usize,
    /// True when the backend still wanted a tool after the last allowed round.
    pub exhausted: bool,
}

struct PendingCall {
    id: String,
    name: String,
    input: serde_json::Value,
}

enum DispatchState {
    AwaitingBackend,
    AwaitingTool(PendingCall),
    Done { text: String, exhausted: bool },
}

/// Registered tools plus the loop that lets the backend call them.
pub struct ToolDispatcher {
    tools: Vec<Box<dyn Tool>>,
    max_rounds: usize,
}

impl Default for ToolDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolDispatcher {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            max_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn max_rounds(&self) -> usize {
        self.max_rounds
    }

    pub fn register_tool(&mut self, tool: Box<dyn Tool>) {
        info!("registered tool: {}", tool.name());
        self.tools.push(tool);
    }

    pub fn tool_names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    fn find_tool(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    /// Run one tool call. Failures and unknown names become error text for the model.
    pub async fn execute(
        &self,
        context: &ToolContext,
        name: &str,
        input: serde_json::Value,
    ) -> ToolOutput {
        match self.find_tool(name) {
            Some(tool) => tool.execute(context, input).await.unwrap_or_else(|e| {
                warn!(tool = name, "tool failed: {e}");
                ToolOutput::error(e.to_string())
            }),
            None => {
                warn!(tool = name, "backend requested unknown tool");
                ToolOutput::error(format!("unknown tool: {name}"))
            }
        }
    }

    /// Drive `provider` until it answers without a tool call or the round limit is hit.
    ///
    /// Only the first tool call of each response is serviced. Backend errors are
    /// returned unchanged so the caller can rotate credentials.
    pub async fn run(
        &self,
        provider: &dyn LlmProvider,
        mut request: LlmRequest,
        context: &ToolContext,
    ) -> Result<DispatchOutcome> {
        let mut rounds = 0;
        let mut state = DispatchState::AwaitingBackend;

        loop {
            state = match state {
                DispatchState::AwaitingBackend => {
                    let response = provider.complete(&request).await?;
                    let text = extract_text(&response.content);
                    match first_tool_use(&response.content) {
                        None => DispatchState::Done {
                            text,
                            exhausted: false,
                        },
                        Some((_, name, _)) if rounds >= self.max_rounds => {
                            warn!(
                                provider = provider.provider_id(),
                                tool = name,
                                rounds,
                                "tool round limit reached, returning partial answer"
                            );
                            DispatchState::Done {
                                text,
                                exhausted: true,
                            }
                        }
                        Some((id, name, input)) => DispatchState::AwaitingTool(PendingCall {
                            id: id.to_string(),
                            name: name.to_string(),
                            input: input.clone(),
                        }),
                    }
                }
                DispatchState::AwaitingTool(call) => {
                    rounds += 1;
                    debug!(tool = %call.name, round = rounds, "executing tool");
                    let output = self.execute(context, &call.name, call.input.clone()).await;

                    request.messages.push(ChatMessage {
                        role: ChatRole::Assistant,
                        content: MessagePart::Parts(vec![ContentBlock::ToolUse {
                            id: call.id.clone(),
                            name: call.name.clone(),
                            input: call.input,
                        }]),
                    });
                    request.messages.push(ChatMessage {
                        role: ChatRole::User,
                        content: MessagePart::Parts(vec![ContentBlock::ToolResult {
                            tool_use_id: call.id,
                            name: call.name,
                            content: output.content,
                            is_error: output.is_error,
                        }]),
                    });
                    DispatchState::AwaitingBackend
                }
                DispatchState::Done { text, exhausted } => {
                    return Ok(DispatchOutcome {
                        text,
                        rounds,
                        exhausted,
                    });
                }
            };
        }
    }
}
