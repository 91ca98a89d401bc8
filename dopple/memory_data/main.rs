//! Conversation memory runtime: records messages, reinforces the
//! connectome and compacts old turns into summaries.

use std::{collections::HashSet, sync::Arc};

use chrono::Utc;
use dopple_connectome::{
    Connectome, ConnectomeAnalytics, ConnectomeLimits, ConnectomeStore, NodeStat, NodeType,
    RankMetric,
};
use dopple_nlp::{
    estimate_tokens, AnalysisDelta, MessageAnalyzer, Role, Summarizer, SummaryLine,
    SummaryRequest,
};
use indexmap::IndexMap;
use serde_json::json;
use shared_logging::LogLevel;
use tracing::warn;
use uuid::Uuid;

use crate::{
    collection::{InformationItem, InformationTracker},
    config::MemoryConfig,
    conversation::{
        ContextWindow, ConversationStage, ConversationState, ConversationSnapshot,
        ConversationSummary, LogEntry, Message,
    },
    error::MemoryError,
    telemetry::MemoryTelemetry,
};

/// Per-entry overhead of the token estimate (role and framing).
const ENTRY_OVERHEAD_TOKENS: usize = 4;

fn entry_tokens(entry: &LogEntry) -> usize {
    ENTRY_OVERHEAD_TOKENS + estimate_tokens(entry.text())
}

/// Memory of one `(dopple_id, conversation_id)` pair.
///
/// The log always holds summaries first, then raw messages, so the span
/// chosen for compaction is the oldest contiguous run of raw messages.
pub struct ConversationMemory {
    dopple_id: String,
    conversation_id: String,
    config: MemoryConfig,
    state: ConversationState,
    entries: Vec<LogEntry>,
    store: ConnectomeStore,
    introduced: IndexMap<String, Vec<String>>,
    messages_since_last_compaction: usize,
    user_message_count: usize,
    information: InformationTracker,
    analyzer: Arc<dyn MessageAnalyzer>,
    summarizer: Arc<dyn Summarizer>,
    telemetry: Option<MemoryTelemetry>,
}

impl std::fmt::Debug for ConversationMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationMemory")
            .field("dopple_id", &self.dopple_id)
            .field("conversation_id", &self.conversation_id)
            .field("state", &self.state)
            .field("entries", &self.entries.len())
            .field("nodes", &self.store.node_count())
            .finish_non_exhaustive()
    }
}

impl ConversationMemory {
    /// Creates an empty, active conversation.
    pub fn new(
        dopple_id: impl Into<String>,
        conversation_id: impl Into<String>,
        config: MemoryConfig,
        analyzer: Arc<dyn MessageAnalyzer>,
        summarizer: Arc<dyn Summarizer>,
    ) -> Result<Self, MemoryError> {
        config.validate()?;
        Ok(Self {
            dopple_id: dopple_id.into(),
            conversation_id: conversation_id.into(),
            config,
            state: ConversationState::Active,
            entries: Vec::new(),
            store: ConnectomeStore::default(),
            introduced: IndexMap::new(),
            messages_since_last_compaction: 0,
            user_message_count: 0,
            information: InformationTracker::default(),
            analyzer,
            summarizer,
            telemetry: None,
        })
    }

    /// Rebuilds a conversation from a persisted snapshot.
    pub fn restore(
        snapshot: ConversationSnapshot,
        config: MemoryConfig,
        limits: ConnectomeLimits,
        analyzer: Arc<dyn MessageAnalyzer>,
        summarizer: Arc<dyn Summarizer>,
    ) -> Result<Self, MemoryError> {
        config.validate()?;
        let store = ConnectomeStore::from_connectome(limits, snapshot.connectome)?;
        // An interrupted compaction left the log untouched.
        let state = match snapshot.state {
            ConversationState::Summarizing => ConversationState::Active,
            other => other,
        };
        Ok(Self {
            dopple_id: snapshot.dopple_id,
            conversation_id: snapshot.conversation_id,
            config,
            state,
            entries: snapshot.entries,
            store,
            introduced: snapshot.introduced_entities,
            messages_since_last_compaction: snapshot.messages_since_last_compaction,
            user_message_count: snapshot.user_message_count,
            information: snapshot.information,
            analyzer,
            summarizer,
            telemetry: None,
        })
    }

    /// Replaces the connectome store (e.g. to apply custom limits).
    #[must_use]
    pub fn with_store(mut self, store: ConnectomeStore) -> Self {
        self.store = store;
        self.information.seed_from(&self.store.connectome());
        self
    }

    /// Attaches telemetry sinks, scoped to this conversation.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: &MemoryTelemetry) -> Self {
        self.set_telemetry(telemetry);
        self
    }

    /// Sets telemetry after construction.
    pub fn set_telemetry(&mut self, telemetry: &MemoryTelemetry) {
        self.telemetry = Some(telemetry.scoped(&self.dopple_id, &self.conversation_id));
    }

    /// Persona id.
    #[must_use]
    pub fn dopple_id(&self) -> &str {
        &self.dopple_id
    }

    /// Conversation id.
    #[must_use]
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ConversationState {
        self.state
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Ordered log of summaries and messages.
    #[must_use]
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Raw messages still in the log.
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter().filter_map(LogEntry::as_message)
    }

    /// Summaries in the log.
    pub fn summaries(&self) -> impl Iterator<Item = &ConversationSummary> {
        self.entries.iter().filter_map(LogEntry::as_summary)
    }

    /// Connectome store.
    #[must_use]
    pub const fn store(&self) -> &ConnectomeStore {
        &self.store
    }

    /// Messages recorded since the last compaction.
    #[must_use]
    pub const fn messages_since_last_compaction(&self) -> usize {
        self.messages_since_last_compaction
    }

    /// User messages over the whole conversation.
    #[must_use]
    pub const fn user_message_count(&self) -> usize {
        self.user_message_count
    }

    /// What the dopple still wants to learn about the user.
    #[must_use]
    pub const fn information(&self) -> &InformationTracker {
        &self.information
    }

    /// Item the next reply should steer towards, if any is left.
    #[must_use]
    pub fn information_needed(&self) -> Option<&InformationItem> {
        self.information.next_needed()
    }

    /// Counts a question about `name`. Returns false for unknown items.
    pub fn record_information_asked(&mut self, name: &str) -> bool {
        self.information.record_asked(name, Utc::now())
    }

    /// Relationship stage derived from the user message count.
    #[must_use]
    pub const fn stage(&self) -> ConversationStage {
        ConversationStage::from_user_messages(self.user_message_count)
    }

    /// Connectome snapshot.
    #[must_use]
    pub fn connectome(&self) -> Connectome {
        self.store.connectome()
    }

    /// Replaces the connectome wholesale.
    pub fn set_connectome(&mut self, connectome: Connectome) -> Result<(), MemoryError> {
        self.store.set_connectome(connectome)?;
        self.introduced.clear();
        self.information.seed_from(&self.store.connectome());
        self.log(LogLevel::Info, "memory.connectome.replaced", json!({
            "nodes": self.store.node_count(),
            "edges": self.store.edge_count(),
        }));
        Ok(())
    }

    /// Strongest `n` nodes of a type.
    #[must_use]
    pub fn top_nodes(&self, node_type: NodeType, n: usize) -> Vec<NodeStat> {
        let snapshot = self.store.connectome();
        ConnectomeAnalytics::new(&snapshot).top_nodes(node_type, n)
    }

    /// Token estimate of the whole log.
    #[must_use]
    pub fn estimated_context_size(&self) -> usize {
        self.entries.iter().map(entry_tokens).sum()
    }

    /// Persistable state.
    #[must_use]
    pub fn snapshot(&self) -> ConversationSnapshot {
        ConversationSnapshot {
            dopple_id: self.dopple_id.clone(),
            conversation_id: self.conversation_id.clone(),
            state: self.state,
            entries: self.entries.clone(),
            connectome: self.store.connectome(),
            messages_since_last_compaction: self.messages_since_last_compaction,
            user_message_count: self.user_message_count,
            introduced_entities: self.introduced.clone(),
            information: self.information.clone(),
        }
    }

    /// Records a message, reinforces the connectome from it and compacts
    /// when the interval or the token budget is exceeded.
    ///
    /// Compaction failures are logged; the message stays recorded.
    pub async fn add_message(
        &mut self,
        role: Role,
        content: impl Into<String>,
    ) -> Result<Message, MemoryError> {
        match self.state {
            ConversationState::Closed => {
                return Err(MemoryError::ClosedConversation(self.conversation_id.clone()));
            }
            ConversationState::Summarizing => {
                warn!(
                    conversation_id = %self.conversation_id,
                    "previous compaction did not finish; log left unchanged"
                );
                self.state = ConversationState::Active;
            }
            ConversationState::Active => {}
        }

        let message = Message::new(role, content);
        self.entries.push(LogEntry::Message(message.clone()));

        let delta = self.analyzer.analyze(&message.content, role);
        let created = self.apply_delta(&delta);
        if !created.is_empty() {
            self.introduced.insert(message.id.clone(), created);
        }
        if role == Role::User {
            let collected = self.information.observe(&message.content, &delta);
            if !collected.is_empty() {
                self.log(
                    LogLevel::Debug,
                    "memory.information.collected",
                    json!({ "message_id": message.id, "items": collected }),
                );
            }
        }
        if let Some(decay) = self.config.decay {
            self.store.apply_decay(decay.rate, decay.min_strength)?;
            let pruned = self.store.prune_edges(decay.prune_below);
            if pruned > 0 {
                self.log(LogLevel::Debug, "memory.connectome.pruned", json!({ "edges": pruned }));
            }
        }

        self.messages_since_last_compaction += 1;
        if role == Role::User {
            self.user_message_count += 1;
        }
        let size = self.estimated_context_size();
        self.log(
            LogLevel::Debug,
            "memory.message.recorded",
            json!({
                "message_id": message.id,
                "role": role,
                "entities": delta.entity_deltas.len(),
                "estimated_tokens": size,
            }),
        );
        self.emit(
            "memory.message.recorded",
            json!({ "message_id": message.id, "role": role }),
        )
        .await;

        if self.messages_since_last_compaction >= self.config.summary_interval
            || size > self.config.max_context_size
        {
            if let Err(err) = self.compact().await {
                warn!(
                    conversation_id = %self.conversation_id,
                    error = %err,
                    "compaction failed; message kept"
                );
                self.log(
                    LogLevel::Warn,
                    "memory.compaction.failed",
                    json!({ "error": err.to_string() }),
                );
            }
        }
        Ok(message)
    }

    /// Folds every raw message outside the protected recent window into one
    /// summary. While the log is over `max_context_size`, the existing
    /// summaries are folded in as well, so the log keeps at most one
    /// summary under a tight budget. Returns `None` when there is nothing to
    /// fold.
    pub async fn compact(&mut self) -> Result<Option<ConversationSummary>, MemoryError> {
        if self.state == ConversationState::Closed {
            return Err(MemoryError::ClosedConversation(self.conversation_id.clone()));
        }
        let raw: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.as_message().is_some())
            .map(|(i, _)| i)
            .collect();
        let span_len = raw.len().saturating_sub(self.config.recent_messages_count);
        if span_len == 0 {
            return Ok(None);
        }
        let last = raw[span_len - 1];
        let folded: Vec<ConversationSummary> =
            if self.estimated_context_size() > self.config.max_context_size {
                self.summaries().cloned().collect()
            } else {
                Vec::new()
            };
        // summaries sit at the front of the log
        let first = if folded.is_empty() { raw[0] } else { 0 };
        let span: Vec<Message> = self.entries[first..=last]
            .iter()
            .filter_map(LogEntry::as_message)
            .cloned()
            .collect();

        self.state = ConversationState::Summarizing;
        let (entity_ids, entity_names) = self.salient_entities(&span, &folded);
        let request = SummaryRequest {
            lines: folded
                .iter()
                .map(|summary| SummaryLine {
                    role: Role::System,
                    content: summary.condensed_text.clone(),
                })
                .chain(span.iter().map(|message| SummaryLine {
                    role: message.role,
                    content: message.content.clone(),
                }))
                .collect(),
            compression_ratio: self.config.compression_ratio,
            salient_entities: entity_names,
        };
        let condensed_text = match self.summarizer.summarize(&request).await {
            Ok(text) => text,
            Err(err) => {
                self.state = ConversationState::Active;
                return Err(err.into());
            }
        };

        let summary = ConversationSummary {
            id: Uuid::new_v4().to_string(),
            source_range: folded
                .iter()
                .flat_map(|summary| summary.source_range.iter().cloned())
                .chain(span.iter().map(|message| message.id.clone()))
                .collect(),
            condensed_text,
            retained_entity_refs: entity_ids,
            created_at: Utc::now(),
        };
        self.entries.drain(first..=last);
        self.entries.insert(first, LogEntry::Summary(summary.clone()));
        for message in &span {
            self.introduced.shift_remove(&message.id);
        }
        self.messages_since_last_compaction = 0;
        self.state = ConversationState::Active;

        let size = self.estimated_context_size();
        self.log(
            LogLevel::Info,
            "memory.compaction.completed",
            json!({
                "summary_id": summary.id,
                "messages": span.len(),
                "merged_summaries": folded.len(),
                "input_chars": request.input_len(),
                "output_chars": summary.condensed_text.chars().count(),
                "entities": summary.retained_entity_refs,
                "estimated_tokens": size,
            }),
        );
        self.emit(
            "memory.compaction.completed",
            json!({ "summary_id": summary.id, "messages": span.len() }),
        )
        .await;
        Ok(Some(summary))
    }

    /// All summaries plus the protected recent messages, trimmed from the
    /// oldest entry until the estimate fits `max_context_size`.
    #[must_use]
    pub fn context_for_generation(&self) -> ContextWindow {
        let mut summaries: Vec<&LogEntry> = Vec::new();
        let mut messages: Vec<&LogEntry> = Vec::new();
        for entry in &self.entries {
            match entry {
                LogEntry::Summary(_) => summaries.push(entry),
                LogEntry::Message(_) => messages.push(entry),
            }
        }
        let skip = messages
            .len()
            .saturating_sub(self.config.recent_messages_count);
        let mut messages = messages.split_off(skip);

        let budget = self.config.max_context_size;
        let mut total: usize = summaries
            .iter()
            .chain(messages.iter())
            .map(|entry| entry_tokens(entry))
            .sum();
        let (mut omitted_summaries, mut omitted_messages) = (0, 0);
        while total > budget && !summaries.is_empty() {
            total -= entry_tokens(summaries.remove(0));
            omitted_summaries += 1;
        }
        while total > budget && !messages.is_empty() {
            total -= entry_tokens(messages.remove(0));
            omitted_messages += 1;
        }

        ContextWindow {
            entries: summaries.into_iter().chain(messages).cloned().collect(),
            estimated_tokens: total,
            omitted_summaries,
            omitted_messages,
        }
    }

    /// Closes the conversation. Further mutations fail; closing twice is a no-op.
    pub async fn end_conversation(&mut self) {
        if self.state == ConversationState::Closed {
            return;
        }
        self.state = ConversationState::Closed;
        self.log(
            LogLevel::Info,
            "memory.conversation.closed",
            json!({ "entries": self.entries.len(), "user_messages": self.user_message_count }),
        );
        self.emit(
            "memory.conversation.closed",
            json!({ "entries": self.entries.len() }),
        )
        .await;
    }

    /// Applies node deltas, then edge deltas. Returns ids of created nodes.
    fn apply_delta(&mut self, delta: &AnalysisDelta) -> Vec<String> {
        let mut created = Vec::new();
        for entity in &delta.entity_deltas {
            match self
                .store
                .reinforce_node(&entity.name, entity.node_type, entity.delta)
            {
                Ok(update) if update.created => created.push(update.id),
                Ok(_) => {}
                Err(err) => warn!(name = %entity.name, error = %err, "node delta dropped"),
            }
        }
        for edge in &delta.edge_deltas {
            let source = self.store.node_id(&edge.name_a, edge.type_a).map(str::to_string);
            let target = self.store.node_id(&edge.name_b, edge.type_b).map(str::to_string);
            let (Some(source), Some(target)) = (source, target) else {
                warn!(
                    source = %edge.name_a,
                    target = %edge.name_b,
                    "edge delta names an unknown node; dropped"
                );
                continue;
            };
            if let Err(err) = self.store.reinforce_edge(&source, &target, edge.weight_delta) {
                warn!(error = %err, "edge delta dropped");
            }
        }
        created
    }

    /// Node ids (strongest first) and names introduced by `span` or kept by
    /// the `folded` summaries that are still present in the connectome.
    fn salient_entities(
        &self,
        span: &[Message],
        folded: &[ConversationSummary],
    ) -> (Vec<String>, Vec<String>) {
        let ids: HashSet<&str> = span
            .iter()
            .filter_map(|message| self.introduced.get(&message.id))
            .flatten()
            .chain(folded.iter().flat_map(|summary| &summary.retained_entity_refs))
            .map(String::as_str)
            .collect();
        if ids.is_empty() {
            return (Vec::new(), Vec::new());
        }
        let snapshot = self.store.connectome();
        let ranked =
            ConnectomeAnalytics::new(&snapshot).rank(None, RankMetric::Strength, usize::MAX);
        ranked
            .into_iter()
            .filter(|stat| ids.contains(stat.id.as_str()))
            .map(|stat| (stat.id, stat.name))
            .unzip()
    }

    fn log(&self, level: LogLevel, message: &str, metadata: serde_json::Value) {
        if let Some(tel) = &self.telemetry {
            if let Err(err) = tel.log(level, message, metadata) {
                warn!(error = %err, record = message, "telemetry log record dropped");
            }
        }
    }

    async fn emit(&self, event_type: &str, payload: serde_json::Value) {
        if let Some(tel) = &self.telemetry {
            if let Err(err) = tel.event(event_type, payload).await {
                warn!(error = %err, event_type, "telemetry event dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dopple_nlp::{
        EdgeDelta, EntityDelta, ExtractiveSummarizer, LexiconAnalyzer, SummarizerError,
    };
    use shared_event_bus::MemoryEventBus;

    fn memory(config: MemoryConfig) -> ConversationMemory {
        ConversationMemory::new(
            "dopple-1",
            "conv-1",
            config,
            Arc::new(LexiconAnalyzer::default()),
            Arc::new(ExtractiveSummarizer),
        )
        .unwrap()
    }

    fn interval_config() -> MemoryConfig {
        MemoryConfig {
            summary_interval: 8,
            recent_messages_count: 5,
            ..MemoryConfig::default()
        }
    }

    #[tokio::test]
    async fn compacts_at_interval_and_keeps_recent_window() {
        let mut memory = memory(interval_config());
        let mut summaries_after = Vec::new();
        for i in 1..=20 {
            memory
                .add_message(Role::User, format!("Message number {i} about my work."))
                .await
                .unwrap();
            summaries_after.push(memory.summaries().count());
        }
        // first compaction at message 8, second at message 16
        assert_eq!(summaries_after[6], 0);
        assert_eq!(summaries_after[7], 1);
        assert_eq!(summaries_after[14], 1);
        assert_eq!(summaries_after[15], 2);
        assert_eq!(summaries_after[19], 2);

        let context = memory.context_for_generation();
        assert_eq!(context.summary_count(), 2);
        assert_eq!(context.message_count(), 5);
        assert_eq!(context.omitted_messages + context.omitted_summaries, 0);
        let last = context.entries.last().unwrap().as_message().unwrap();
        assert!(last.content.contains("number 20"));

        let summaries: Vec<_> = memory.summaries().collect();
        assert_eq!(summaries[0].source_range.len(), 3);
        assert_eq!(summaries[1].source_range.len(), 8);
        assert!(matches!(memory.entries()[0], LogEntry::Summary(_)));
        assert!(matches!(memory.entries()[1], LogEntry::Summary(_)));
    }

    #[tokio::test]
    async fn summaries_respect_ratio_and_retain_new_entities() {
        let mut memory = memory(interval_config());
        let lines = [
            "I feel curious about technology lately.",
            "My family loves music and movies.",
            "Honesty is what I value the most.",
            "nothing notable here",
            "still nothing notable",
            "more filler text",
            "and more filler",
            "last filler line",
        ];
        for line in lines {
            memory.add_message(Role::User, line).await.unwrap();
        }
        let summary = memory.summaries().next().unwrap().clone();
        let input: usize = lines[..3].iter().map(|l| l.chars().count()).sum();
        let budget = (input as f64 * 0.7).ceil() as usize;
        assert!(summary.condensed_text.chars().count() <= budget);
        for id in [
            "emotion_curious",
            "interest_technology",
            "interest_family",
            "interest_entertainment",
            "value_honesty",
        ] {
            assert!(summary.retained_entity_refs.iter().any(|r| r == id), "{id}");
        }
        assert!(summary.condensed_text.starts_with("[entities: "));
    }

    #[tokio::test]
    async fn closed_conversation_rejects_messages() {
        let mut memory = memory(MemoryConfig::default());
        memory.add_message(Role::User, "hello").await.unwrap();
        memory.end_conversation().await;
        memory.end_conversation().await;
        let err = memory.add_message(Role::User, "anyone?").await.unwrap_err();
        assert!(matches!(err, MemoryError::ClosedConversation(_)));
        assert_eq!(memory.entries().len(), 1);
        assert_eq!(memory.state(), ConversationState::Closed);
        assert!(memory.compact().await.is_err());
    }

    #[tokio::test]
    async fn user_messages_reinforce_the_connectome() {
        let mut memory = memory(MemoryConfig::default());
        memory
            .add_message(Role::User, "I'm happy with my job")
            .await
            .unwrap();
        memory
            .add_message(Role::Dopple, "I'm happy too, work is fun")
            .await
            .unwrap();
        memory
            .add_message(Role::System, "happy work")
            .await
            .unwrap();
        let store = memory.store();
        assert_eq!(store.node_count(), 2);
        let happy = store.node_id("happy", NodeType::Emotion).unwrap();
        let work = store.node_id("work", NodeType::Interest).unwrap();
        assert!(store.edge(happy, work).is_some());
        assert_eq!(memory.user_message_count(), 1);
        assert_eq!(memory.top_nodes(NodeType::Emotion, 1)[0].name, "happy");
    }

    #[tokio::test]
    async fn context_is_trimmed_to_budget() {
        let config = MemoryConfig {
            max_context_size: 40,
            recent_messages_count: 4,
            summary_interval: 100,
            ..MemoryConfig::default()
        };
        let mut memory = memory(config);
        for _ in 0..4 {
            memory
                .add_message(Role::User, "x".repeat(60))
                .await
                .unwrap();
        }
        let context = memory.context_for_generation();
        assert!(context.estimated_tokens <= 40);
        assert_eq!(context.message_count(), 2);
        assert_eq!(context.omitted_messages, 2);
    }

    #[tokio::test]
    async fn size_budget_triggers_compaction() {
        let config = MemoryConfig {
            max_context_size: 60,
            recent_messages_count: 1,
            summary_interval: 100,
            ..MemoryConfig::default()
        };
        let mut memory = memory(config);
        for i in 0..3 {
            memory
                .add_message(Role::User, format!("{i} {}.", "word ".repeat(20)))
                .await
                .unwrap();
        }
        assert!(memory.summaries().count() >= 1);
        assert_eq!(memory.messages().count(), 1);
    }

    #[tokio::test]
    async fn tight_budget_keeps_a_single_summary() {
        let config = MemoryConfig {
            max_context_size: 60,
            summary_interval: 10,
            recent_messages_count: 2,
            ..MemoryConfig::default()
        };
        let mut memory = memory(config);
        let mut most_summaries = 0;
        for i in 0..60 {
            memory
                .add_message(Role::User, format!("Message {i} about my work today."))
                .await
                .unwrap();
            most_summaries = most_summaries.max(memory.summaries().count());
        }
        assert_eq!(most_summaries, 1);
        assert!(memory.messages().count() <= 3);
        assert!(memory.estimated_context_size() <= 2 * 60);
        // the surviving summary covers everything folded so far
        let summary = memory.summaries().next().unwrap();
        assert_eq!(summary.source_range.len() + memory.messages().count(), 60);
        assert!(summary
            .retained_entity_refs
            .iter()
            .any(|id| id == "interest_work"));
    }

    /// Emits fixed deltas regardless of the message.
    struct ScriptedAnalyzer(AnalysisDelta);

    impl MessageAnalyzer for ScriptedAnalyzer {
        fn analyze(&self, _: &str, _: Role) -> AnalysisDelta {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn edges_to_unresolved_names_are_skipped() {
        let entity = |name: &str, node_type| EntityDelta {
            name: name.into(),
            node_type,
            delta: 1.5,
        };
        let delta = AnalysisDelta {
            entity_deltas: vec![
                entity("happy", NodeType::Emotion),
                entity("work", NodeType::Interest),
            ],
            edge_deltas: vec![
                EdgeDelta {
                    name_a: "happy".into(),
                    type_a: NodeType::Emotion,
                    name_b: "work".into(),
                    type_b: NodeType::Interest,
                    weight_delta: 1.0,
                },
                // a node id is not a name: must not resolve to emotion_happy
                EdgeDelta {
                    name_a: "work".into(),
                    type_a: NodeType::Interest,
                    name_b: "emotion_happy".into(),
                    type_b: NodeType::Emotion,
                    weight_delta: 1.0,
                },
            ],
        };
        let mut memory = ConversationMemory::new(
            "dopple-1",
            "conv-1",
            MemoryConfig::default(),
            Arc::new(ScriptedAnalyzer(delta)),
            Arc::new(ExtractiveSummarizer),
        )
        .unwrap();
        memory.add_message(Role::User, "anything").await.unwrap();
        let store = memory.store();
        assert_eq!(store.node_count(), 2);
        assert_eq!(store.edge_count(), 1);
        assert!(store.edge("emotion_happy", "interest_work").is_some());
        assert!(store.edge("interest_work", "emotion_happy").is_none());
    }

    #[tokio::test]
    async fn user_messages_answer_information_items() {
        let mut memory = memory(MemoryConfig::default());
        assert_eq!(memory.information_needed().unwrap().name, "personality");
        memory
            .add_message(Role::Dopple, "What is your hobby? Tell me about your job.")
            .await
            .unwrap();
        assert_eq!(memory.information().remaining(), memory.information().items().len());

        memory
            .add_message(Role::User, "I'm pretty creative, and my hobby is painting.")
            .await
            .unwrap();
        let collected: Vec<&str> = memory
            .information()
            .items()
            .iter()
            .filter(|item| item.collected)
            .map(|item| item.name.as_str())
            .collect();
        assert_eq!(collected, ["personality", "hobbies"]);
        assert_eq!(memory.information_needed().unwrap().name, "core values");
        assert!(memory.record_information_asked("core values"));
        assert_eq!(memory.snapshot().information, *memory.information());
    }

    struct BrokenSummarizer;

    #[async_trait]
    impl Summarizer for BrokenSummarizer {
        async fn summarize(&self, _: &SummaryRequest) -> Result<String, SummarizerError> {
            Err(SummarizerError::Backend("down".into()))
        }
    }

    #[tokio::test]
    async fn failed_compaction_keeps_messages() {
        let mut memory = ConversationMemory::new(
            "dopple-1",
            "conv-1",
            MemoryConfig {
                summary_interval: 2,
                recent_messages_count: 1,
                ..MemoryConfig::default()
            },
            Arc::new(LexiconAnalyzer::default()),
            Arc::new(BrokenSummarizer),
        )
        .unwrap();
        memory.add_message(Role::User, "one").await.unwrap();
        memory.add_message(Role::User, "two").await.unwrap();
        assert_eq!(memory.messages().count(), 2);
        assert_eq!(memory.state(), ConversationState::Active);
        assert!(matches!(
            memory.compact().await,
            Err(MemoryError::Summarizer(_))
        ));
    }

    #[tokio::test]
    async fn snapshot_restores_equivalent_memory() {
        let mut memory = memory(interval_config());
        for i in 0..10 {
            memory
                .add_message(Role::User, format!("I love music {i}!"))
                .await
                .unwrap();
        }
        let snapshot = memory.snapshot();
        let restored = ConversationMemory::restore(
            snapshot.clone(),
            interval_config(),
            ConnectomeLimits::default(),
            Arc::new(LexiconAnalyzer::default()),
            Arc::new(ExtractiveSummarizer),
        )
        .unwrap();
        assert_eq!(restored.snapshot(), snapshot);

        let json = serde_json::to_string(&snapshot).unwrap();
        let decoded: ConversationSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.entries, snapshot.entries);
        assert_eq!(decoded.introduced_entities, snapshot.introduced_entities);
        assert_eq!(decoded.connectome.nodes.len(), snapshot.connectome.nodes.len());
        assert_eq!(restored.stage(), ConversationStage::Exploring);
    }

    #[tokio::test]
    async fn telemetry_reports_compaction() {
        let bus = Arc::new(MemoryEventBus::new(64));
        let telemetry = MemoryTelemetry::builder("memory")
            .event_publisher(bus.clone())
            .build()
            .unwrap();
        let mut memory = memory(interval_config()).with_telemetry(&telemetry);
        for i in 0..8 {
            memory
                .add_message(Role::User, format!("line {i}"))
                .await
                .unwrap();
        }
        memory.end_conversation().await;
        assert_eq!(bus.events_of("memory.message.recorded").len(), 8);
        let compactions = bus.events_of("memory.compaction.completed");
        assert_eq!(compactions.len(), 1);
        assert_eq!(compactions[0].conversation_id.as_deref(), Some("conv-1"));
        assert_eq!(bus.events_of("memory.conversation.closed").len(), 1);
    }

    #[tokio::test]
    async fn decay_weakens_and_prunes() {
        let config = MemoryConfig {
            decay: Some(crate::config::DecayConfig {
                rate: 0.5,
                prune_below: 0.5,
                min_strength: 0.0,
            }),
            ..MemoryConfig::default()
        };
        let mut memory = memory(config);
        memory
            .add_message(Role::User, "happy about work")
            .await
            .unwrap();
        // importance 5: node 1.5 -> 0.75, edge 1.0 -> 0.5
        let happy = memory.store().node_id("happy", NodeType::Emotion).unwrap().to_string();
        assert!((memory.store().node(&happy).unwrap().strength - 0.75).abs() < 1e-9);
        assert_eq!(memory.store().edge_count(), 1);
        memory.add_message(Role::User, "nothing").await.unwrap();
        assert_eq!(memory.store().edge_count(), 0);
    }
}
