//! UI-facing stream event vocabulary.
//!
//! Both workflows are normalized into this one tagged union before anything
//! reaches the transport boundary. Events are produced in order over a single
//! connection; the sequence marker exists so a reconnecting client can drop
//! replayed events idempotently, not to reorder.

use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::error::{ErrorKind, GeminiError};
use crate::types::GroundingMetadata;

/// Lifecycle/phase marker carried by `agentic-phase` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    // Standard-mode turn lifecycle.
    Started,
    CallingTool,
    Complete,
    // Deep-research task lifecycle, mirrored from the remote phase field.
    Queued,
    Running,
    Thinking,
    Cancelled,
}

/// Payload of one stream event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamEventData {
    /// Incremental answer text.
    TextDelta { delta: String },
    /// A unit of exposed intermediate reasoning.
    ThoughtStep { text: String },
    /// Workflow phase transition.
    AgenticPhase { phase: Phase },
    /// The model requested a tool invocation.
    FunctionCall {
        name: String,
        args: serde_json::Value,
    },
    /// Outcome of a tool invocation. Exactly one of `result`/`error` is set.
    FunctionResult {
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<serde_json::Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Web-search citations for the final answer.
    Grounding { metadata: GroundingMetadata },
    /// Follow-up question suggestions derived from the final answer.
    RelatedQuestions { questions: Vec<String> },
    /// A deep-research task reached its final answer.
    ResearchComplete { task_id: String },
    /// Terminal error. The stream still ends with the `Done` sentinel.
    Error {
        kind: ErrorKind,
        message: String,
        retryable: bool,
    },
    /// End-of-stream sentinel; always the last event, error path included.
    Done,
}

impl StreamEventData {
    /// Build a terminal error event from a typed error, with the user-safe
    /// message rather than raw provider internals.
    pub fn from_error(error: &GeminiError) -> Self {
        Self::Error {
            kind: error.kind(),
            message: error.user_message().to_string(),
            retryable: error.is_retryable(),
        }
    }
}

/// One ordered event within a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEvent {
    /// Monotonically non-decreasing within a single turn.
    pub seq: u64,
    #[serde(flatten)]
    pub data: StreamEventData,
}

/// Pull-based event sequence handed to the transport layer.
///
/// Producers suspend at every I/O boundary, so dropping the stream cancels
/// outstanding work at the next suspension point.
pub type EventStream = Pin<Box<dyn futures::Stream<Item = StreamEvent> + Send>>;

/// Internal stream produced by the workflows, before sequence assignment and
/// error conversion in the adapter.
pub(crate) type RawEventStream =
    Pin<Box<dyn futures::Stream<Item = Result<StreamEventData, GeminiError>> + Send>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_tagged_kebab_case() {
        let ev = StreamEvent {
            seq: 3,
            data: StreamEventData::TextDelta {
                delta: "hi".into(),
            },
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["seq"], 3);
        assert_eq!(json["type"], "text-delta");
        assert_eq!(json["delta"], "hi");
    }

    #[test]
    fn error_event_carries_kind_and_flag() {
        let data = StreamEventData::from_error(&GeminiError::Safety("blocked".into()));
        match data {
            StreamEventData::Error {
                kind,
                retryable,
                message,
            } => {
                assert_eq!(kind, ErrorKind::Safety);
                assert!(!retryable);
                assert!(!message.contains("blocked"), "raw detail must not leak");
            }
            other => panic!("expected error event, got {other:?}"),
        }
    }

    #[test]
    fn function_result_omits_absent_side() {
        let data = StreamEventData::FunctionResult {
            name: "calculator".into(),
            result: Some(serde_json::json!({"value": 4})),
            error: None,
        };
        let json = serde_json::to_value(&data).unwrap();
        assert!(json.get("error").is_none());
    }
}
