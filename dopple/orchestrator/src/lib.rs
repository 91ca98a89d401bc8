#![deny(clippy::all, clippy::pedantic, clippy::nursery, rust_2018_idioms)]
#![warn(missing_docs)]

//! Response orchestration for dopples: configuration, persona framing,
//! per-conversation registry with persistence, and the HTTP generation
//! backend.

/// HTTP generation backend.
pub mod backend;
/// TOML configuration document.
pub mod config;
/// Turn orchestration.
pub mod orchestrator;
/// Snapshot persistence.
pub mod persistence;
/// Persona frame assembly.
pub mod persona;
/// Conversation registry and service facade.
pub mod registry;

pub use backend::HttpGenerationBackend;
pub use config::{DoppleConfig, GenerationConfig, LoggingConfig, PersonaConfig};
pub use orchestrator::{OrchestratorError, ResponseOrchestrator, TurnOutcome};
pub use persistence::{FilePersistence, InMemoryPersistence, PersistenceLayer};
pub use persona::PersonaFrame;
pub use registry::{ConversationRegistry, DoppleService, SharedConversation};
