use dopple_connectome::ConnectomeError;
use dopple_nlp::SummarizerError;
use thiserror::Error;

/// Errors raised by conversation memory.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Mutation attempted after `end_conversation`.
    #[error("conversation {0} is closed")]
    ClosedConversation(String),
    /// Compaction could not produce a summary.
    #[error("summarizer failed: {0}")]
    Summarizer(#[from] SummarizerError),
    /// Connectome rejected a snapshot or update.
    #[error("connectome error: {0}")]
    Connectome(#[from] ConnectomeError),
    /// Configuration outside its valid range.
    #[error("invalid memory configuration: {0}")]
    InvalidConfig(String),
}
