use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::sleep;

use crate::{analyzer::Role, text::helper::fit_to_budget};

/// One rendered turn of generation context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTurn {
    /// Author of the turn; summaries are passed as `system`.
    pub role: Role,
    /// Text of the turn.
    pub content: String,
}

/// Request sent to a generation backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationPrompt {
    /// Persona frame placed before the conversation.
    pub persona: String,
    /// Conversation context, oldest first.
    pub turns: Vec<PromptTurn>,
    /// Completion length cap.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Nucleus sampling cutoff.
    pub top_p: f32,
}

impl GenerationPrompt {
    /// Creates a prompt with default sampling settings.
    #[must_use]
    pub fn new(persona: impl Into<String>, turns: Vec<PromptTurn>) -> Self {
        Self {
            persona: persona.into(),
            turns,
            max_tokens: 300,
            temperature: 0.7,
            top_p: 0.9,
        }
    }

    /// Latest user turn, if any.
    #[must_use]
    pub fn last_user_turn(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|turn| turn.role == Role::User)
            .map(|turn| turn.content.as_str())
    }

    /// Flattens the prompt into plain text ending with the persona's cue.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        if !self.persona.is_empty() {
            out.push_str(&self.persona);
            out.push_str("\n\n");
        }
        for turn in &self.turns {
            out.push_str(turn.role.as_str());
            out.push_str(": ");
            out.push_str(&turn.content);
            out.push('\n');
        }
        out.push_str("dopple:");
        out
    }
}

/// Backend reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    /// Generated text.
    pub text: String,
}

/// Errors surfaced by generation backends.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Transport or provider failure.
    #[error("backend error: {0}")]
    Backend(String),
    /// No reply within the deadline.
    #[error("generation timed out after {0:?}")]
    Timeout(Duration),
    /// Reply without any text.
    #[error("backend returned an empty completion")]
    EmptyCompletion,
}

/// Opaque prompt-to-completion service.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Produces a completion for the prompt.
    async fn complete(&self, prompt: &GenerationPrompt) -> Result<Completion, GenerationError>;
}

/// Offline backend answering from the last user turn, for tests and demos.
#[derive(Debug, Clone, Default)]
pub struct LoopbackBackend {
    latency: Duration,
}

impl LoopbackBackend {
    /// Creates a backend that waits `latency` before answering.
    #[must_use]
    pub const fn with_latency(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl GenerationBackend for LoopbackBackend {
    async fn complete(&self, prompt: &GenerationPrompt) -> Result<Completion, GenerationError> {
        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }
        let text = prompt.last_user_turn().map_or_else(
            || "Hello! What would you like to talk about?".to_string(),
            |last| format!("I hear you. Tell me more about \"{}\".", fit_to_budget(last, 60)),
        );
        Ok(Completion { text })
    }
}
