// src/infra/errors.rs — Error types for goodquestion

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GoodQuestionError {
    // Collaborator errors (recoverable, no state change)
    #[error("Provider '{provider}' error: {message}")]
    Provider {
        provider: String,
        message: String,
        retriable: bool,
    },

    #[error("Rate limited by '{provider}', retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: u64,
    },

    // Configuration errors (fatal to the request)
    #[error("No API key configured. Set GOOGLE_AI_API_KEY or [model].api_key_env in config.toml.")]
    NoApiKey,

    #[error("Prompt template '{name}' not found or empty")]
    TemplateNotFound { name: String },

    #[error("Configuration error: {0}")]
    Config(String),

    // Lifecycle misuse
    #[error("Action requires phase '{expected}', session is in '{actual}'")]
    InvalidPhase { expected: String, actual: String },

    #[error("Question limit reached ({limit})")]
    QuestionLimitReached { limit: u32 },

    #[error("Evaluation needs at least {required} questions, {asked} asked")]
    NotEnoughQuestions { required: u32, asked: u32 },

    #[error("Input is empty")]
    EmptyInput,

    #[error("No active session")]
    NoActiveSession,

    // Infra
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl GoodQuestionError {
    /// Worth another attempt after a backoff. A 429 is never retried.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            GoodQuestionError::Provider {
                retriable: true,
                ..
            }
        )
    }

    /// Failures of the LLM collaborator. The orchestrator turns these into a
    /// user-facing notice instead of propagating them.
    pub fn is_collaborator_failure(&self) -> bool {
        matches!(
            self,
            GoodQuestionError::Provider { .. } | GoodQuestionError::RateLimited { .. }
        )
    }
}
