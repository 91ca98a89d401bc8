use std::{collections::HashMap, sync::Arc};

use dopple_connectome::{Connectome, ConnectomeLimits, ConnectomeStore, NodeStat, NodeType};
use dopple_memory_data::{ConversationMemory, MemoryConfig, MemoryTelemetry};
use dopple_nlp::{
    ExtractiveSummarizer, GenerationBackend, LexiconAnalyzer, LlmSummarizer, LoopbackBackend,
    MessageAnalyzer, Summarizer,
};
use parking_lot::Mutex;
use shared_event_bus::FileEventPublisher;
use tracing::{debug, warn};

use crate::{
    backend::HttpGenerationBackend,
    config::{DoppleConfig, LoggingConfig},
    orchestrator::{OrchestratorError, ResponseOrchestrator, TurnOutcome},
    persistence::PersistenceLayer,
};

/// Conversation guarded for a single writer at a time.
pub type SharedConversation = Arc<tokio::sync::Mutex<ConversationMemory>>;

type ConversationKey = (String, String);

/// Live conversations keyed by `(dopple_id, conversation_id)`, loaded from
/// persistence on first use.
pub struct ConversationRegistry {
    memory_config: MemoryConfig,
    limits: ConnectomeLimits,
    analyzer: Arc<dyn MessageAnalyzer>,
    summarizer: Arc<dyn Summarizer>,
    persistence: Arc<dyn PersistenceLayer>,
    telemetry: Option<MemoryTelemetry>,
    conversations: Mutex<HashMap<ConversationKey, SharedConversation>>,
}

impl std::fmt::Debug for ConversationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationRegistry")
            .field("memory_config", &self.memory_config)
            .field("limits", &self.limits)
            .field("live", &self.len())
            .finish_non_exhaustive()
    }
}

impl ConversationRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(
        memory_config: MemoryConfig,
        limits: ConnectomeLimits,
        analyzer: Arc<dyn MessageAnalyzer>,
        summarizer: Arc<dyn Summarizer>,
        persistence: Arc<dyn PersistenceLayer>,
    ) -> Self {
        Self {
            memory_config,
            limits,
            analyzer,
            summarizer,
            persistence,
            telemetry: None,
            conversations: Mutex::new(HashMap::new()),
        }
    }

    /// Telemetry attached to every conversation opened afterwards.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: MemoryTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Live conversations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.conversations.lock().len()
    }

    /// True when no conversation is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conversations.lock().is_empty()
    }

    /// Returns the live conversation, restoring or creating it first.
    pub async fn open(
        &self,
        dopple_id: &str,
        conversation_id: &str,
    ) -> Result<SharedConversation, OrchestratorError> {
        let key = (dopple_id.to_string(), conversation_id.to_string());
        let existing = self.conversations.lock().get(&key).cloned();
        if let Some(existing) = existing {
            return Ok(existing);
        }

        let snapshot = self
            .persistence
            .load(dopple_id, conversation_id)
            .await
            .map_err(OrchestratorError::Persistence)?;
        let restored = snapshot.is_some();
        let mut memory = match snapshot {
            Some(snapshot) => ConversationMemory::restore(
                snapshot,
                self.memory_config.clone(),
                self.limits,
                Arc::clone(&self.analyzer),
                Arc::clone(&self.summarizer),
            )?,
            None => ConversationMemory::new(
                dopple_id,
                conversation_id,
                self.memory_config.clone(),
                Arc::clone(&self.analyzer),
                Arc::clone(&self.summarizer),
            )?
            .with_store(ConnectomeStore::new(self.limits)),
        };
        if let Some(tel) = &self.telemetry {
            memory.set_telemetry(tel);
        }
        debug!(dopple_id, conversation_id, restored, "conversation opened");

        // Another caller may have opened it while we were loading.
        let shared = Arc::clone(
            self.conversations
                .lock()
                .entry(key)
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(memory))),
        );
        Ok(shared)
    }

    /// Persists the conversation's current state.
    pub async fn save(&self, memory: &ConversationMemory) -> Result<(), OrchestratorError> {
        self.persistence
            .save(&memory.snapshot())
            .await
            .map_err(OrchestratorError::Persistence)
    }

    /// Drops a live conversation from the registry; persisted state stays.
    ///
    /// A conversation still held elsewhere (a turn in flight, a caller of
    /// [`Self::open`]) is kept, so it is never reloaded next to a live copy.
    /// Returns true when the entry was removed.
    pub fn evict(&self, dopple_id: &str, conversation_id: &str) -> bool {
        let key = (dopple_id.to_string(), conversation_id.to_string());
        let mut conversations = self.conversations.lock();
        match conversations.get(&key) {
            Some(shared) if Arc::strong_count(shared) == 1 => {
                conversations.remove(&key);
                true
            }
            Some(_) => {
                debug!(dopple_id, conversation_id, "conversation in use; not evicted");
                false
            }
            None => false,
        }
    }
}

/// Entry point tying the registry, persistence and orchestrator together.
#[derive(Debug)]
pub struct DoppleService {
    registry: ConversationRegistry,
    orchestrator: ResponseOrchestrator,
}

impl DoppleService {
    /// Combines an existing registry and orchestrator.
    #[must_use]
    pub const fn new(registry: ConversationRegistry, orchestrator: ResponseOrchestrator) -> Self {
        Self {
            registry,
            orchestrator,
        }
    }

    /// Wires every collaborator from configuration. Without a generation
    /// endpoint the offline loopback backend and extractive summaries are used.
    pub fn from_config(
        config: &DoppleConfig,
        persistence: Arc<dyn PersistenceLayer>,
    ) -> anyhow::Result<Self> {
        let analyzer: Arc<dyn MessageAnalyzer> = Arc::new(LexiconAnalyzer::new(config.analyzer));
        let (backend, summarizer) = match HttpGenerationBackend::from_config(&config.generation)? {
            Some(http) => {
                let backend: Arc<dyn GenerationBackend> = Arc::new(http);
                let summarizer: Arc<dyn Summarizer> =
                    Arc::new(LlmSummarizer::new(Arc::clone(&backend)));
                (backend, summarizer)
            }
            None => {
                let backend: Arc<dyn GenerationBackend> = Arc::new(LoopbackBackend::default());
                let summarizer: Arc<dyn Summarizer> = Arc::new(ExtractiveSummarizer);
                (backend, summarizer)
            }
        };

        let mut registry = ConversationRegistry::new(
            config.memory.clone(),
            config.connectome,
            analyzer,
            summarizer,
            persistence,
        );
        let mut orchestrator = ResponseOrchestrator::new(
            backend,
            config.generation.clone(),
            config.persona.clone(),
        );
        if let Some(tel) = telemetry_from(&config.logging)? {
            registry = registry.with_telemetry(tel.clone());
            orchestrator = orchestrator.with_telemetry(tel);
        }
        Ok(Self::new(registry, orchestrator))
    }

    /// Conversation registry.
    #[must_use]
    pub const fn registry(&self) -> &ConversationRegistry {
        &self.registry
    }

    /// Runs one turn and saves the conversation afterwards, including after
    /// a failed generation.
    pub async fn generate_response(
        &self,
        dopple_id: &str,
        conversation_id: &str,
        content: &str,
    ) -> Result<TurnOutcome, OrchestratorError> {
        let conversation = self.registry.open(dopple_id, conversation_id).await?;
        let mut memory = conversation.lock().await;
        let outcome = self.orchestrator.generate_response(&mut memory, content).await;
        if matches!(outcome, Err(OrchestratorError::ClosedConversation(_))) {
            drop(memory);
            drop(conversation);
            self.registry.evict(dopple_id, conversation_id);
            return outcome;
        }
        let saved = self.registry.save(&memory).await;
        match (outcome, saved) {
            (Ok(turn), Ok(())) => Ok(turn),
            (Ok(_), Err(err)) => Err(err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(save_err)) => {
                warn!(conversation_id, error = %save_err, "saving after failed turn");
                Err(err)
            }
        }
    }

    /// Closes a conversation, persists it and drops it from the registry.
    pub async fn end_conversation(
        &self,
        dopple_id: &str,
        conversation_id: &str,
    ) -> Result<(), OrchestratorError> {
        let conversation = self.registry.open(dopple_id, conversation_id).await?;
        {
            let mut memory = conversation.lock().await;
            memory.end_conversation().await;
            self.registry.save(&memory).await?;
        }
        drop(conversation);
        self.registry.evict(dopple_id, conversation_id);
        Ok(())
    }

    /// Current connectome of a conversation.
    pub async fn connectome(
        &self,
        dopple_id: &str,
        conversation_id: &str,
    ) -> Result<Connectome, OrchestratorError> {
        let conversation = self.registry.open(dopple_id, conversation_id).await?;
        let memory = conversation.lock().await;
        Ok(memory.connectome())
    }

    /// Strongest `n` nodes of a type in a conversation.
    pub async fn top_nodes(
        &self,
        dopple_id: &str,
        conversation_id: &str,
        node_type: NodeType,
        n: usize,
    ) -> Result<Vec<NodeStat>, OrchestratorError> {
        let conversation = self.registry.open(dopple_id, conversation_id).await?;
        let memory = conversation.lock().await;
        Ok(memory.top_nodes(node_type, n))
    }
}

fn telemetry_from(logging: &LoggingConfig) -> anyhow::Result<Option<MemoryTelemetry>> {
    if logging.log_path.is_none() && logging.event_log_path.is_none() {
        return Ok(None);
    }
    let mut builder = MemoryTelemetry::builder("dopple");
    if let Some(path) = &logging.log_path {
        builder = builder.log_path(path);
    }
    if let Some(path) = &logging.event_log_path {
        builder = builder.event_publisher(Arc::new(FileEventPublisher::new(path)?));
    }
    builder.build().map(Some)
}
