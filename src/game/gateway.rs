// src/game/gateway.rs — One conversational turn against the chat provider

use std::sync::Arc;

use crate::infra::config::ModelConfig;
use crate::infra::errors::GoodQuestionError;
use crate::provider::{ChatProvider, ChatRequest, Message, Role, StopReason};

pub struct ConversationGateway {
    provider: Arc<dyn ChatProvider>,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl ConversationGateway {
    pub fn new(provider: Arc<dyn ChatProvider>, config: &ModelConfig) -> Self {
        Self {
            provider,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_output_tokens,
        }
    }

    /// Send `new_message` after `history` under `system_instruction` and return the reply text.
    ///
    /// Rate limits come back as `GoodQuestionError::RateLimited`; every other failure
    /// is a provider error. The caller decides what, if anything, to record.
    pub async fn send_turn(
        &self,
        history: &[Message],
        new_message: &str,
        system_instruction: &str,
    ) -> Result<String, GoodQuestionError> {
        let mut messages = prepare_history(history);
        messages.push(Message::user(new_message));

        let request = ChatRequest {
            model: self.model.clone(),
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system: Some(system_instruction.to_string()),
        };

        let response = self.provider.chat(request).await?;
        tracing::debug!(
            provider = self.provider.id(),
            tokens = response.usage.total(),
            stop_reason = ?response.stop_reason,
            "Turn completed"
        );
        if matches!(response.stop_reason, StopReason::MaxTokens | StopReason::Safety) {
            tracing::warn!(stop_reason = ?response.stop_reason, "Reply was cut short");
        }
        Ok(response.content)
    }
}

/// Drop local notices, then drop model turns until the first user turn.
pub fn prepare_history(history: &[Message]) -> Vec<Message> {
    history
        .iter()
        .filter(|m| m.role != Role::System)
        .skip_while(|m| m.role == Role::Model)
        .cloned()
        .collect()
}
