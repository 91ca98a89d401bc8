use std::sync::Arc;

use dopple_connectome::{Connectome, NodeStat};
use dopple_memory_data::{ConversationMemory, MemoryError, MemoryTelemetry, Message};
use dopple_nlp::{Completion, GenerationBackend, GenerationError, GenerationPrompt, Role};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_logging::LogLevel;
use thiserror::Error;
use tokio::time::timeout;
use tracing::warn;

use crate::{
    config::{GenerationConfig, PersonaConfig},
    persona::PersonaFrame,
};

/// Errors surfaced to callers of the orchestrator.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The conversation was ended.
    #[error("conversation {0} is closed")]
    ClosedConversation(String),
    /// The backend failed, timed out or answered nothing. The user message
    /// stays recorded.
    #[error("generation failed: {0}")]
    GenerationFailure(#[source] GenerationError),
    /// Loading or saving a conversation failed.
    #[error("persistence failed: {0:#}")]
    Persistence(anyhow::Error),
    /// Any other memory failure.
    #[error(transparent)]
    Memory(MemoryError),
}

impl From<MemoryError> for OrchestratorError {
    fn from(err: MemoryError) -> Self {
        match err {
            MemoryError::ClosedConversation(id) => Self::ClosedConversation(id),
            other => Self::Memory(other),
        }
    }
}

/// Result of one successful turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnOutcome {
    /// The recorded dopple reply.
    pub message: Message,
    /// Connectome after the turn.
    pub connectome_snapshot: Connectome,
    /// Strongest nodes per type after the turn.
    pub top_entities: Vec<NodeStat>,
}

/// Drives one conversational turn: record, build context, generate, record.
#[derive(Clone)]
pub struct ResponseOrchestrator {
    backend: Arc<dyn GenerationBackend>,
    generation: GenerationConfig,
    persona: PersonaConfig,
    telemetry: Option<MemoryTelemetry>,
}

impl std::fmt::Debug for ResponseOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseOrchestrator")
            .field("generation", &self.generation)
            .field("persona", &self.persona)
            .finish_non_exhaustive()
    }
}

impl ResponseOrchestrator {
    /// Creates an orchestrator over `backend`.
    #[must_use]
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        generation: GenerationConfig,
        persona: PersonaConfig,
    ) -> Self {
        Self {
            backend,
            generation,
            persona,
            telemetry: None,
        }
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: MemoryTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Persona frame and prompt for the memory's current state.
    #[must_use]
    pub fn build_prompt(&self, memory: &ConversationMemory) -> (PersonaFrame, GenerationPrompt) {
        let frame = PersonaFrame::build(&memory.connectome(), memory.stage(), &self.persona)
            .with_information_needed(memory.information_needed());
        let context = memory.context_for_generation();
        let prompt = GenerationPrompt {
            max_tokens: self.generation.max_tokens,
            temperature: self.generation.temperature,
            top_p: self.generation.top_p,
            ..GenerationPrompt::new(frame.render(memory.dopple_id()), context.turns())
        };
        (frame, prompt)
    }

    /// Records the user message, generates a reply and records it.
    ///
    /// On [`OrchestratorError::GenerationFailure`] the user message and its
    /// connectome effects remain committed and no reply is recorded.
    pub async fn generate_response(
        &self,
        memory: &mut ConversationMemory,
        content: &str,
    ) -> Result<TurnOutcome, OrchestratorError> {
        let telemetry = self
            .telemetry
            .as_ref()
            .map(|tel| tel.scoped(memory.dopple_id(), memory.conversation_id()));
        memory.add_message(Role::User, content).await?;

        let (frame, prompt) = self.build_prompt(memory);
        let completion = match self.complete(&prompt).await {
            Ok(completion) => completion,
            Err(err) => {
                warn!(
                    conversation_id = memory.conversation_id(),
                    error = %err,
                    "generation failed; user message kept"
                );
                if let Some(tel) = &telemetry {
                    let payload = json!({ "error": err.to_string() });
                    report(tel, LogLevel::Error, "orchestrator.generation.failed", payload).await;
                }
                return Err(OrchestratorError::GenerationFailure(err));
            }
        };

        let message = memory
            .add_message(Role::Dopple, completion.text.trim())
            .await?;
        if let Some(item) = &frame.information_needed {
            memory.record_information_asked(&item.name);
        }
        let connectome_snapshot = memory.connectome();
        let top_entities =
            PersonaFrame::build(&connectome_snapshot, memory.stage(), &self.persona).top_entities();
        if let Some(tel) = &telemetry {
            let payload = json!({
                "message_id": message.id,
                "prompt_turns": prompt.turns.len(),
                "nodes": connectome_snapshot.nodes.len(),
                "information_needed": frame.information_needed.as_ref().map(|item| &item.name),
            });
            report(tel, LogLevel::Info, "orchestrator.turn.completed", payload).await;
        }
        Ok(TurnOutcome {
            message,
            connectome_snapshot,
            top_entities,
        })
    }

    async fn complete(&self, prompt: &GenerationPrompt) -> Result<Completion, GenerationError> {
        let deadline = self.generation.timeout();
        match timeout(deadline, self.backend.complete(prompt)).await {
            Ok(Ok(completion)) if completion.text.trim().is_empty() => {
                Err(GenerationError::EmptyCompletion)
            }
            Ok(result) => result,
            Err(_) => Err(GenerationError::Timeout(deadline)),
        }
    }
}

/// Writes a log record and publishes the matching event; sink failures are
/// logged and never fail the turn.
async fn report(
    tel: &MemoryTelemetry,
    level: LogLevel,
    name: &str,
    payload: serde_json::Value,
) {
    if let Err(err) = tel.log(level, name, payload.clone()) {
        warn!(error = %err, record = name, "telemetry log record dropped");
    }
    if let Err(err) = tel.event(name, payload).await {
        warn!(error = %err, event_type = name, "telemetry event dropped");
    }
}
