//! Model client core.
//!
//! Defines the provider seam (`ModelBackend`), the shared request
//! preparation pipeline, and the single-flight shared backend handle.
//! Everything above this module (workflows, adapter) talks to the provider
//! exclusively through the trait, which is what makes orchestration testable
//! without a network.

pub mod files;
pub mod grounding;
pub mod http;
pub mod request;
pub mod safety;
pub mod url_context;

pub use http::GeminiHttpBackend;
pub use request::{GenerateContentRequest, prepare_request};

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;

use crate::config::GeminiConfig;
use crate::error::GeminiError;
use crate::types::{FileRef, FinishReason, ResearchPhase, ResearchTask, ToolCall};

/// One event from a streaming generate call, before normalization.
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    TextDelta(String),
    ThoughtDelta(String),
    /// A complete tool-call request extracted from the response.
    ToolCall(ToolCall),
    /// Raw grounding metadata as the provider sent it; parsed downstream.
    Grounding(serde_json::Value),
    Finish(FinishReason),
}

/// Stream of provider events for one model call.
pub type ProviderStream = Pin<Box<dyn Stream<Item = Result<ProviderEvent, GeminiError>> + Send>>;

/// Non-streaming model response.
#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub text: String,
    pub thoughts: Vec<String>,
    pub tool_calls: Vec<ToolCall>,
    pub grounding: Option<serde_json::Value>,
    pub finish_reason: FinishReason,
}

/// Point-in-time view of a remote research task.
///
/// `thoughts` is cumulative: every poll returns all summaries produced so
/// far, which is what makes re-observation idempotent and reconnection
/// possible without a durable event log.
#[derive(Debug, Clone)]
pub struct ResearchSnapshot {
    pub task_id: String,
    pub phase: ResearchPhase,
    pub thoughts: Vec<String>,
    pub answer: Option<String>,
    pub error: Option<String>,
}

/// The provider SDK boundary.
///
/// Implemented over HTTP by [`GeminiHttpBackend`]; tests substitute scripted
/// mocks. All methods are potentially long I/O and must be cancel-safe.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Single non-streaming generation call.
    async fn generate(&self, request: GenerateContentRequest) -> Result<ModelResponse, GeminiError>;

    /// Streaming generation call. The returned stream delivers payload; the
    /// call itself is the retryable connection attempt.
    async fn generate_stream(
        &self,
        request: GenerateContentRequest,
    ) -> Result<ProviderStream, GeminiError>;

    /// Submit a long-running research task.
    async fn submit_research(
        &self,
        request: GenerateContentRequest,
    ) -> Result<ResearchTask, GeminiError>;

    /// Fetch the current state of a research task.
    async fn poll_research(&self, task_id: &str) -> Result<ResearchSnapshot, GeminiError>;

    /// Extend a completed task with a follow-up question, transitioning it
    /// back to running.
    async fn follow_up_research(&self, task_id: &str, question: &str) -> Result<(), GeminiError>;

    /// Upload raw media bytes to the provider's file store.
    async fn upload_file(&self, bytes: Vec<u8>, mime_type: &str) -> Result<FileRef, GeminiError>;

    /// Current processing state of a staged file.
    async fn file_status(&self, name: &str) -> Result<FileRef, GeminiError>;
}

/// Single-flight holder for the shared HTTP backend.
///
/// The handle is constructed lazily on first use; concurrent first-use must
/// not construct two clients, so initialization goes through a
/// `tokio::sync::OnceCell`.
#[derive(Default)]
pub struct BackendHandle {
    cell: tokio::sync::OnceCell<Arc<GeminiHttpBackend>>,
}

impl BackendHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the shared backend, constructing it on first call.
    pub async fn get(&self, config: &GeminiConfig) -> Result<Arc<GeminiHttpBackend>, GeminiError> {
        self.cell
            .get_or_try_init(|| async {
                config.validate()?;
                tracing::debug!(base_url = %config.base_url, model = %config.model, "constructing shared backend");
                Ok(Arc::new(GeminiHttpBackend::new(config.clone())?))
            })
            .await
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn backend_handle_is_single_flight() {
        let handle = Arc::new(BackendHandle::new());
        let config = GeminiConfig::new("test-key");

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let handle = handle.clone();
            let config = config.clone();
            tasks.push(tokio::spawn(async move { handle.get(&config).await }));
        }
        let mut backends = Vec::new();
        for task in tasks {
            backends.push(task.await.unwrap().unwrap());
        }
        // Every task observed the same instance.
        for backend in &backends[1..] {
            assert!(Arc::ptr_eq(&backends[0], backend));
        }
    }

    #[tokio::test]
    async fn invalid_config_fails_initialization() {
        let handle = BackendHandle::new();
        let config = GeminiConfig::default(); // empty key
        assert!(handle.get(&config).await.is_err());
    }
}
