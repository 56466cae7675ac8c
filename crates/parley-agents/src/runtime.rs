use std::sync::Arc;

use futures::future::join_all;
use parley_common::{Error, MemoryKey, Result, UpstreamError, UpstreamErrorKind};
use parley_store::{ConversationStore, Turn, TurnRole};
use tracing::{error, info, instrument, warn};

use crate::dispatch::ToolDispatcher;
use crate::providers::{ChatMessage, LlmRequest};
use crate::rotation::CredentialRotator;
use crate::tools::ToolContext;

/// Answers prompts against the shared conversation store, rotating through
/// credentials on retryable backend failures.
pub struct ChatOrchestrator {
    rotator: CredentialRotator,
    store: Arc<ConversationStore>,
    dispatcher: ToolDispatcher,
    system_prompt: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f64>,
}

impl ChatOrchestrator {
    pub fn new(
        rotator: CredentialRotator,
        store: Arc<ConversationStore>,
        dispatcher: ToolDispatcher,
    ) -> Self {
        Self {
            rotator,
            store,
            dispatcher,
            system_prompt: None,
            max_tokens: None,
            temperature: None,
        }
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    pub fn set_system_prompt(&mut self, prompt: String) {
        self.system_prompt = Some(prompt);
    }

    pub fn set_max_tokens(&mut self, max_tokens: u32) {
        self.max_tokens = Some(max_tokens);
    }

    pub fn set_temperature(&mut self, temperature: f64) {
        self.temperature = Some(temperature);
    }

    pub fn rotator(&self) -> &CredentialRotator {
        &self.rotator
    }

    pub fn credential_count(&self) -> usize {
        self.rotator.len()
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn dispatcher(&self) -> &ToolDispatcher {
        &self.dispatcher
    }

    pub async fn generate(&self, prompt: &str, memory_key: &MemoryKey) -> Result<String> {
        self.generate_with_context(prompt, memory_key, None).await
    }

    /// Record `prompt`, answer it with at most one attempt per credential, and
    /// record the answer. Fallback tiers are only tried once every primary
    /// attempt has failed retryably.
    ///
    /// The user turn stays in history even when every attempt fails.
    #[instrument(skip(self, prompt), fields(memory_key = %memory_key, prompt_len = prompt.len()))]
    pub async fn generate_with_context(
        &self,
        prompt: &str,
        memory_key: &MemoryKey,
        user_id: Option<&str>,
    ) -> Result<String> {
        let history = self.store.append(memory_key, Turn::user(prompt));
        let prior = &history[..history.len().saturating_sub(1)];

        let mut messages: Vec<ChatMessage> = prior.iter().map(turn_to_message).collect();
        messages.push(ChatMessage::user(prompt));

        let request = LlmRequest {
            messages,
            system: self.system_prompt.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            tools: self.dispatcher.definitions(),
        };
        let context = ToolContext {
            memory_key: memory_key.to_string(),
            user_id: user_id.map(str::to_string),
        };

        let attempts = self.rotator.len();
        let mut last_error: Option<UpstreamError> = None;

        for (attempt, credential) in self.rotator.attempts().enumerate() {
            let attempt = attempt + 1;
            match self
                .dispatcher
                .run(credential.provider.as_ref(), request.clone(), &context)
                .await
            {
                Ok(outcome) => {
                    info!(
                        credential = %credential.label,
                        tier = credential.tier,
                        attempt,
                        tool_rounds = outcome.rounds,
                        reply_len = outcome.text.len(),
                        "generated reply"
                    );
                    self.store.append(memory_key, Turn::model(outcome.text.clone()));
                    return Ok(outcome.text);
                }
                Err(Error::Upstream(err)) if err.is_retryable() => {
                    warn!(
                        credential = %credential.label,
                        tier = credential.tier,
                        attempt,
                        attempts,
                        kind = %err.kind,
                        "credential failed, rotating: {}",
                        err.message
                    );
                    last_error = Some(err);
                }
                Err(err) => {
                    error!(
                        credential = %credential.label,
                        tier = credential.tier,
                        attempt,
                        "non-retryable failure: {err}"
                    );
                    return Err(err);
                }
            }
        }

        let last = last_error.unwrap_or_else(|| {
            UpstreamError::new(UpstreamErrorKind::Other, "no credential was attempted")
        });
        error!(attempts, "all credentials exhausted: {last}");
        Err(Error::AllCredentialsExhausted { attempts, last })
    }

    /// Health-check every credential concurrently, returning `(label, healthy)`.
    pub async fn health_check_all(&self) -> Vec<(String, bool)> {
        let checks = self.rotator.credentials().map(|credential| async move {
            let healthy = match credential.provider.health_check().await {
                Ok(healthy) => healthy,
                Err(e) => {
                    warn!(credential = %credential.label, "health check failed: {e}");
                    false
                }
            };
            (credential.label.clone(), healthy)
        });
        join_all(checks).await
    }
}

fn turn_to_message(turn: &Turn) -> ChatMessage {
    match turn.role {
        TurnRole::User => ChatMessage::user(turn.content.clone()),
        TurnRole::Model => ChatMessage::assistant(turn.content.clone()),
    }
}
