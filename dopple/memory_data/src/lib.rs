#![deny(clippy::all, clippy::pedantic, clippy::nursery, rust_2018_idioms)]
#![warn(missing_docs)]

//! Conversation memory for dopples: an ordered log of messages and
//! summaries, a per-conversation connectome fed by message analysis, and
//! a compaction policy that keeps the context within a token budget.

/// Information the dopple still wants to learn.
pub mod collection;
/// Memory configuration.
pub mod config;
/// Conversation log data model.
pub mod conversation;
/// Memory error taxonomy.
pub mod error;

/// Telemetry helpers for conversation memory.
#[path = "../telemetry.rs"]
pub mod telemetry;

/// Conversation memory runtime.
#[path = "../main.rs"]
pub mod orchestration_entry;

pub use collection::{
    InformationCategory, InformationItem, InformationPriority, InformationTracker,
};
pub use config::{DecayConfig, MemoryConfig};
pub use conversation::{
    ContextWindow, ConversationStage, ConversationState, ConversationSnapshot,
    ConversationSummary, LogEntry, Message,
};
pub use error::MemoryError;
pub use orchestration_entry::ConversationMemory;
pub use telemetry::{MemoryTelemetry, MemoryTelemetryBuilder};
