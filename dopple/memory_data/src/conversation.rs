use std::fmt;

use chrono::{DateTime, Utc};
use dopple_connectome::Connectome;
use dopple_nlp::{PromptTurn, Role};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::collection::InformationTracker;

/// Immutable conversation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier.
    pub id: String,
    /// Author.
    pub role: Role,
    /// Text.
    pub content: String,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Creates a message stamped now.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Condensed replacement for a contiguous run of messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    /// Unique identifier.
    pub id: String,
    /// Ids of the covered messages, in order.
    pub source_range: Vec<String>,
    /// Summary text.
    pub condensed_text: String,
    /// Node ids first introduced by the covered messages, strongest first.
    pub retained_entity_refs: Vec<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Element of the conversation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LogEntry {
    /// Raw message.
    Message(Message),
    /// Compacted span.
    Summary(ConversationSummary),
}

impl LogEntry {
    /// Text counted against the context budget.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Message(message) => &message.content,
            Self::Summary(summary) => &summary.condensed_text,
        }
    }

    /// Rendering for a generation prompt; summaries become system turns.
    #[must_use]
    pub fn to_turn(&self) -> PromptTurn {
        match self {
            Self::Message(message) => PromptTurn {
                role: message.role,
                content: message.content.clone(),
            },
            Self::Summary(summary) => PromptTurn {
                role: Role::System,
                content: format!("Summary of earlier conversation: {}", summary.condensed_text),
            },
        }
    }

    /// Message payload, if this entry is one.
    #[must_use]
    pub const fn as_message(&self) -> Option<&Message> {
        match self {
            Self::Message(message) => Some(message),
            Self::Summary(_) => None,
        }
    }

    /// Summary payload, if this entry is one.
    #[must_use]
    pub const fn as_summary(&self) -> Option<&ConversationSummary> {
        match self {
            Self::Summary(summary) => Some(summary),
            Self::Message(_) => None,
        }
    }
}

/// Lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationState {
    /// Accepting messages.
    Active,
    /// Compaction in flight.
    Summarizing,
    /// Terminal; no further mutation.
    Closed,
}

impl fmt::Display for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Active => "active",
            Self::Summarizing => "summarizing",
            Self::Closed => "closed",
        })
    }
}

/// Depth of the relationship, by number of user messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStage {
    /// Up to 3 user messages.
    Initial,
    /// More than 3.
    Exploring,
    /// More than 10.
    Deepening,
    /// More than 20.
    Relationship,
}

impl ConversationStage {
    /// Stage reached after `user_messages` user messages.
    #[must_use]
    pub const fn from_user_messages(user_messages: usize) -> Self {
        match user_messages {
            0..=3 => Self::Initial,
            4..=10 => Self::Exploring,
            11..=20 => Self::Deepening,
            _ => Self::Relationship,
        }
    }

    /// Guidance line for the persona frame.
    #[must_use]
    pub const fn guidance(self) -> &'static str {
        match self {
            Self::Initial => "You are just getting to know each other; keep it light and curious.",
            Self::Exploring => "Explore the user's interests and experiences.",
            Self::Deepening => "Go deeper into values and feelings you have learned about.",
            Self::Relationship => "Speak as a close companion who remembers shared history.",
        }
    }
}

impl fmt::Display for ConversationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Initial => "initial",
            Self::Exploring => "exploring",
            Self::Deepening => "deepening",
            Self::Relationship => "relationship",
        })
    }
}

/// Persistable state of one conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSnapshot {
    /// Persona owning the conversation.
    pub dopple_id: String,
    /// Conversation identifier.
    pub conversation_id: String,
    /// Lifecycle state.
    pub state: ConversationState,
    /// Ordered log.
    pub entries: Vec<LogEntry>,
    /// Connectome of the conversation.
    pub connectome: Connectome,
    /// Messages recorded since the last compaction.
    #[serde(default)]
    pub messages_since_last_compaction: usize,
    /// User messages recorded over the whole conversation.
    #[serde(default)]
    pub user_message_count: usize,
    /// Node ids first introduced by raw messages still in the log.
    #[serde(default)]
    pub introduced_entities: IndexMap<String, Vec<String>>,
    /// What the dopple still wants to learn about the user.
    #[serde(default)]
    pub information: InformationTracker,
}

/// Context assembled for one generation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextWindow {
    /// Summaries followed by the protected recent messages.
    pub entries: Vec<LogEntry>,
    /// Estimated tokens of `entries`.
    pub estimated_tokens: usize,
    /// Summaries left out to fit the budget.
    pub omitted_summaries: usize,
    /// Recent messages left out to fit the budget.
    pub omitted_messages: usize,
}

impl ContextWindow {
    /// Entries rendered as prompt turns.
    #[must_use]
    pub fn turns(&self) -> Vec<PromptTurn> {
        self.entries.iter().map(LogEntry::to_turn).collect()
    }

    /// Number of summaries included.
    #[must_use]
    pub fn summary_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.as_summary().is_some())
            .count()
    }

    /// Number of raw messages included.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.entries.len() - self.summary_count()
    }
}
