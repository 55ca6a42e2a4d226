//! Wonton is the model-orchestration and streaming core of a Gemini-backed
//! conversational application.
//!
//! It turns a conversation plus a mode into a normalized, resumable stream
//! of typed events, handling on the way: retries with backoff, function
//! calling with schema validation and per-call timeouts, URL context and
//! input safety, token-budget enforcement, long-running deep-research tasks
//! with reconnection, and a structured error taxonomy with stable
//! retryability.
//!
//! # Quick start
//!
//! ```no_run
//! use wonton::config::GeminiConfig;
//! use wonton::registry::FunctionRegistry;
//! use wonton::stream::StreamCoordinator;
//! use wonton::types::{ChatMode, ChatRequest, ConversationTurn};
//! use futures_util::StreamExt;
//!
//! # async fn run() -> Result<(), wonton::error::GeminiError> {
//! let config = GeminiConfig::from_env()?;
//! let registry = FunctionRegistry::with_builtins()?;
//! let coordinator = StreamCoordinator::new(config, registry);
//!
//! let request = ChatRequest {
//!     conversation: vec![ConversationTurn::user("What is 2 + 2?")],
//!     mode: ChatMode::Standard,
//!     model_id: "gemini-2.5-flash".into(),
//!     thinking_config: None,
//! };
//! let mut events = coordinator.create_stream(request);
//! while let Some(event) = events.next().await {
//!     println!("{}", serde_json::to_string(&event)?);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! Data flows one way: request preparation ([`client`]) feeds either the
//! standard agentic workflow ([`agent`]) or the deep-research orchestrator
//! ([`research`]), and both are normalized by the streaming adapter
//! ([`stream`]) into the event vocabulary of [`types::events`]. The
//! provider is only ever reached through the [`client::ModelBackend`]
//! trait, so everything above the HTTP layer is testable with scripted
//! mocks.

pub mod agent;
pub mod client;
pub mod config;
pub mod error;
pub mod registry;
pub mod research;
pub mod retry;
pub mod stream;
pub mod tokens;
pub mod types;
pub mod utils;

/// Common imports for consumers of the crate.
pub mod prelude {
    pub use crate::agent::AgenticWorkflow;
    pub use crate::client::{ModelBackend, ModelResponse};
    pub use crate::config::GeminiConfig;
    pub use crate::error::{ErrorKind, GeminiError};
    pub use crate::registry::{FunctionHandler, FunctionRegistry, RegisteredFunction};
    pub use crate::research::ResearchOrchestrator;
    pub use crate::retry::{RetryPolicy, with_retry};
    pub use crate::stream::StreamCoordinator;
    pub use crate::types::events::{StreamEvent, StreamEventData};
    pub use crate::types::{ChatMode, ChatRequest, ContentPart, ConversationTurn, Role};
    pub use crate::utils::CancelHandle;
}
