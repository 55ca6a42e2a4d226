//! Streaming adapter between the workflows and the transport.
//!
//! The adapter owns three guarantees the transport relies on:
//! - inbound requests are validated before any I/O is started,
//! - every event carries a monotonically increasing `seq`,
//! - the stream always ends with exactly one `Done` sentinel, reached
//!   through at most one terminal `error` event.

pub mod encoder;

use std::sync::Arc;

use crate::agent::AgenticWorkflow;
use crate::client::request::validate_turns;
use crate::client::url_context::UrlContextResolver;
use crate::client::{BackendHandle, ModelBackend};
use crate::config::GeminiConfig;
use crate::error::GeminiError;
use crate::registry::FunctionRegistry;
use crate::research::ResearchOrchestrator;
use crate::types::events::{EventStream, RawEventStream, StreamEvent, StreamEventData};
use crate::types::{ChatMode, ChatRequest};
use crate::utils::cancel::{self, CancelHandle};

/// Entry point for the transport layer.
///
/// Holds the long-lived pieces (registry, backend handle) and builds a
/// per-request workflow selected by mode.
pub struct StreamCoordinator {
    config: GeminiConfig,
    registry: Arc<FunctionRegistry>,
    backend: Arc<BackendHandle>,
}

impl StreamCoordinator {
    pub fn new(config: GeminiConfig, registry: FunctionRegistry) -> Self {
        Self {
            config,
            registry: Arc::new(registry),
            backend: Arc::new(BackendHandle::new()),
        }
    }

    /// Serve one chat request as an ordered event stream.
    ///
    /// Shape problems are reported synchronously as an error-then-done
    /// stream without touching the network.
    pub fn create_stream(&self, request: ChatRequest) -> EventStream {
        if let Err(error) = validate_request(&request) {
            return error_stream(&error);
        }
        finalize(self.build_raw(request))
    }

    /// Like [`create_stream`](Self::create_stream), but the returned stream
    /// also ends (sentinel included) when `handle` fires.
    pub fn create_stream_cancellable(
        &self,
        request: ChatRequest,
        handle: &CancelHandle,
    ) -> EventStream {
        if let Err(error) = validate_request(&request) {
            return error_stream(&error);
        }
        finalize(cancel::cancellable(self.build_raw(request), handle))
    }

    fn build_raw(&self, request: ChatRequest) -> RawEventStream {
        let turn_id = uuid::Uuid::new_v4();
        tracing::info!(
            %turn_id,
            mode = ?request.mode,
            model = %request.model_id,
            turns = request.conversation.len(),
            "opening event stream"
        );
        let config = self.config.clone().with_model(request.model_id.clone());
        let registry = self.registry.clone();
        let backend_init = self.backend_for(&config);

        let raw: RawEventStream = Box::pin(async_stream::stream! {
            let backend = match backend_init.await {
                Ok(backend) => backend,
                Err(error) => {
                    yield Err(error);
                    return;
                }
            };

            match request.mode {
                ChatMode::Standard => {
                    let resolver = UrlContextResolver::new(backend.http_client());
                    let backend: Arc<dyn ModelBackend> = backend;
                    let workflow = Arc::new(
                        AgenticWorkflow::new(backend, registry, config)
                            .with_resolver(resolver),
                    );
                    let mut events =
                        workflow.run(request.conversation, request.thinking_config);
                    while let Some(event) = futures_util::StreamExt::next(&mut events).await {
                        yield event;
                    }
                }
                ChatMode::DeepResearch => {
                    let backend: Arc<dyn ModelBackend> = backend;
                    let orchestrator =
                        Arc::new(ResearchOrchestrator::new(backend, config));
                    match orchestrator.execute_deep_research(request.conversation).await {
                        Ok((_task_id, mut events)) => {
                            while let Some(event) =
                                futures_util::StreamExt::next(&mut events).await
                            {
                                yield event;
                            }
                        }
                        Err(error) => yield Err(error),
                    }
                }
            }
        });
        raw
    }

    /// Re-attach to a deep-research task from a previous connection.
    pub fn reconnect_research(&self, task_id: String) -> EventStream {
        let config = self.config.clone();
        let backend_init = self.backend_for(&config);
        let raw: RawEventStream = Box::pin(async_stream::stream! {
            match backend_init.await {
                Ok(backend) => {
                    let orchestrator = Arc::new(ResearchOrchestrator::new(backend, config));
                    let mut events = orchestrator.reconnect(task_id);
                    while let Some(event) = futures_util::StreamExt::next(&mut events).await {
                        yield event;
                    }
                }
                Err(error) => yield Err(error),
            }
        });
        finalize(raw)
    }

    /// Extend a completed deep-research task with a follow-up question.
    pub fn follow_up_research(&self, task_id: String, question: String) -> EventStream {
        let config = self.config.clone();
        let backend_init = self.backend_for(&config);
        let raw: RawEventStream = Box::pin(async_stream::stream! {
            match backend_init.await {
                Ok(backend) => {
                    let orchestrator = Arc::new(ResearchOrchestrator::new(backend, config));
                    let mut events = orchestrator.ask_follow_up(task_id, question);
                    while let Some(event) = futures_util::StreamExt::next(&mut events).await {
                        yield event;
                    }
                }
                Err(error) => yield Err(error),
            }
        });
        finalize(raw)
    }

    fn backend_for(
        &self,
        config: &GeminiConfig,
    ) -> impl std::future::Future<
        Output = Result<Arc<crate::client::GeminiHttpBackend>, GeminiError>,
    > + Send
    + 'static {
        let handle = self.backend.clone();
        let config = config.clone();
        async move { handle.get(&config).await }
    }
}

/// Shape checks that run before any I/O.
fn validate_request(request: &ChatRequest) -> Result<(), GeminiError> {
    if request.model_id.is_empty() {
        return Err(GeminiError::Validation("model_id is empty".into()));
    }
    validate_turns(&request.conversation)
}

/// Assign sequence numbers, convert errors and flush the sentinel.
///
/// The first error is terminal: it is translated into one `error` event
/// with the user-safe message, the rest of the raw stream is dropped, and
/// the sentinel still goes out.
pub(crate) fn finalize(mut raw: RawEventStream) -> EventStream {
    let stream = async_stream::stream! {
        let mut seq: u64 = 0;
        while let Some(item) = futures_util::StreamExt::next(&mut raw).await {
            match item {
                Ok(data) => {
                    yield StreamEvent { seq, data };
                    seq += 1;
                }
                Err(error) => {
                    tracing::warn!(%error, "stream terminated by error");
                    yield StreamEvent {
                        seq,
                        data: StreamEventData::from_error(&error.into_classified()),
                    };
                    seq += 1;
                    break;
                }
            }
        }
        yield StreamEvent {
            seq,
            data: StreamEventData::Done,
        };
    };
    Box::pin(stream)
}

/// Synchronous error-then-done stream for requests rejected before I/O.
fn error_stream(error: &GeminiError) -> EventStream {
    let events = vec![
        StreamEvent {
            seq: 0,
            data: StreamEventData::from_error(error),
        },
        StreamEvent {
            seq: 1,
            data: StreamEventData::Done,
        },
    ];
    Box::pin(futures::stream::iter(events))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use futures_util::StreamExt;

    fn raw(items: Vec<Result<StreamEventData, GeminiError>>) -> RawEventStream {
        Box::pin(futures::stream::iter(items))
    }

    #[tokio::test]
    async fn seq_is_contiguous_and_done_is_last() {
        let events: Vec<_> = finalize(raw(vec![
            Ok(StreamEventData::TextDelta { delta: "a".into() }),
            Ok(StreamEventData::TextDelta { delta: "b".into() }),
        ]))
        .collect()
        .await;

        let seqs: Vec<_> = events.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
        assert!(matches!(events.last().unwrap().data, StreamEventData::Done));
    }

    #[tokio::test]
    async fn deltas_are_preserved_then_error_then_sentinel() {
        let events: Vec<_> = finalize(raw(vec![
            Ok(StreamEventData::TextDelta { delta: "par".into() }),
            Ok(StreamEventData::TextDelta { delta: "tial".into() }),
            Err(GeminiError::Safety("blocked".into())),
            // Anything after the error must be dropped.
            Ok(StreamEventData::TextDelta { delta: "lost".into() }),
        ]))
        .collect()
        .await;

        assert_eq!(events.len(), 4);
        assert!(matches!(&events[0].data, StreamEventData::TextDelta { delta } if delta == "par"));
        assert!(matches!(&events[1].data, StreamEventData::TextDelta { delta } if delta == "tial"));
        match &events[2].data {
            StreamEventData::Error { kind, retryable, .. } => {
                assert_eq!(*kind, ErrorKind::Safety);
                assert!(!retryable);
            }
            other => panic!("expected error event, got {other:?}"),
        }
        assert!(matches!(events[3].data, StreamEventData::Done));
    }

    #[tokio::test]
    async fn empty_conversation_is_rejected_without_io() {
        let coordinator = StreamCoordinator::new(
            GeminiConfig::new("test-key"),
            FunctionRegistry::new(),
        );
        let request = ChatRequest {
            conversation: vec![],
            mode: ChatMode::Standard,
            model_id: "gemini-2.5-flash".into(),
            thinking_config: None,
        };
        let events: Vec<_> = coordinator.create_stream(request).collect().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0].data,
            StreamEventData::Error { kind: ErrorKind::Validation, .. }
        ));
        assert!(matches!(events[1].data, StreamEventData::Done));
    }

    #[tokio::test]
    async fn empty_model_id_is_rejected_without_io() {
        let coordinator = StreamCoordinator::new(
            GeminiConfig::new("test-key"),
            FunctionRegistry::new(),
        );
        let request = ChatRequest {
            conversation: vec![crate::types::ConversationTurn::user("hi")],
            mode: ChatMode::Standard,
            model_id: String::new(),
            thinking_config: None,
        };
        let events: Vec<_> = coordinator.create_stream(request).collect().await;
        assert!(matches!(
            events[0].data,
            StreamEventData::Error { kind: ErrorKind::Validation, .. }
        ));
    }

    #[tokio::test]
    async fn cancelled_stream_still_flushes_the_sentinel() {
        let coordinator = StreamCoordinator::new(
            GeminiConfig::new("test-key"),
            FunctionRegistry::new(),
        );
        let handle = CancelHandle::new();
        handle.cancel();
        let request = ChatRequest {
            conversation: vec![crate::types::ConversationTurn::user("hi")],
            mode: ChatMode::Standard,
            model_id: "gemini-2.5-flash".into(),
            thinking_config: None,
        };
        let events: Vec<_> = coordinator
            .create_stream_cancellable(request, &handle)
            .collect()
            .await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].data, StreamEventData::Done));
    }

    #[tokio::test]
    async fn generic_errors_are_classified_before_emission() {
        let events: Vec<_> = finalize(raw(vec![Err(GeminiError::Generic(
            "error 429: rate limit exceeded".into(),
        ))]))
        .collect()
        .await;
        match &events[0].data {
            StreamEventData::Error { kind, retryable, .. } => {
                assert_eq!(*kind, ErrorKind::RateLimit);
                assert!(retryable);
            }
            other => panic!("expected error event, got {other:?}"),
        }
    }
}
