#![deny(clippy::all, clippy::pedantic, clippy::nursery, rust_2018_idioms)]
#![warn(missing_docs)]

//! Language-side collaborators of a dopple conversation: the message
//! analyzer feeding the connectome, the summarizer used by compaction and
//! the contract of the external generation backend.

/// Message analysis producing connectome deltas.
pub mod analyzer;
/// Generation backend contract.
pub mod generation;
/// Summarization strategies.
pub mod summarizer;
/// Text normalization and scoring helpers.
pub mod text;

pub use analyzer::{
    AnalysisDelta, AnalyzerConfig, EdgeDelta, EntityDelta, LexiconAnalyzer, MessageAnalyzer, Role,
};
pub use generation::{
    Completion, GenerationBackend, GenerationError, GenerationPrompt, LoopbackBackend, PromptTurn,
};
pub use summarizer::{
    ExtractiveSummarizer, LlmSummarizer, Summarizer, SummarizerError, SummaryLine, SummaryRequest,
};
pub use text::helper::{estimate_tokens, fit_to_budget, normalize, split_sentences, tokenize};
