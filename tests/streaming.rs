//! End-to-end tests: HTTP boundary through workflow to the event stream.

use futures_util::StreamExt;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use wonton::config::GeminiConfig;
use wonton::error::ErrorKind;
use wonton::registry::FunctionRegistry;
use wonton::stream::StreamCoordinator;
use wonton::types::events::{Phase, StreamEvent, StreamEventData};
use wonton::types::{ChatMode, ChatRequest, ConversationTurn};

const MODEL: &str = "gemini-2.5-flash";

fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "warn".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

fn coordinator(server: &MockServer) -> StreamCoordinator {
    init_tracing();
    let mut config = GeminiConfig::new("test-key").with_base_url(server.uri());
    config.research.poll_interval = Duration::from_millis(10);
    config.research.max_poll_interval = Duration::from_millis(40);
    // No related-question call; keeps the mock surface to the calls under test.
    config.related_question_count = 0;
    StreamCoordinator::new(config, FunctionRegistry::new())
}

fn chat(mode: ChatMode, text: &str) -> ChatRequest {
    ChatRequest {
        conversation: vec![ConversationTurn::user(text)],
        mode,
        model_id: MODEL.into(),
        thinking_config: None,
    }
}

fn sse(chunks: &[serde_json::Value]) -> ResponseTemplate {
    let body: String = chunks
        .iter()
        .map(|chunk| format!("data: {chunk}\n\n"))
        .collect();
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(body)
}

fn assert_seq_contiguous(events: &[StreamEvent]) {
    for (expected, event) in events.iter().enumerate() {
        assert_eq!(event.seq, expected as u64);
    }
}

#[tokio::test]
async fn standard_turn_streams_deltas_and_completes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/models/{MODEL}:streamGenerateContent")))
        .respond_with(sse(&[
            json!({"candidates": [{"content": {"parts": [{"text": "Hel"}]}}]}),
            json!({"candidates": [{"content": {"parts": [{"text": "lo"}]}, "finishReason": "STOP"}]}),
        ]))
        .mount(&server)
        .await;

    let events: Vec<_> = coordinator(&server)
        .create_stream(chat(ChatMode::Standard, "say hello"))
        .collect()
        .await;

    assert_seq_contiguous(&events);
    assert!(matches!(
        events[0].data,
        StreamEventData::AgenticPhase { phase: Phase::Started }
    ));
    let text: String = events
        .iter()
        .filter_map(|e| match &e.data {
            StreamEventData::TextDelta { delta } => Some(delta.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(text, "Hello");
    let n = events.len();
    assert!(matches!(
        events[n - 2].data,
        StreamEventData::AgenticPhase { phase: Phase::Complete }
    ));
    assert!(matches!(events[n - 1].data, StreamEventData::Done));
}

#[tokio::test]
async fn mid_stream_safety_block_preserves_deltas_then_error_then_sentinel() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/models/{MODEL}:streamGenerateContent")))
        .respond_with(sse(&[
            json!({"candidates": [{"content": {"parts": [{"text": "par"}]}}]}),
            json!({"candidates": [{"content": {"parts": [{"text": "tial"}]}}]}),
            json!({"candidates": [{"content": {"parts": []}, "finishReason": "SAFETY"}]}),
        ]))
        .mount(&server)
        .await;

    let events: Vec<_> = coordinator(&server)
        .create_stream(chat(ChatMode::Standard, "borderline"))
        .collect()
        .await;

    assert_seq_contiguous(&events);
    let deltas: Vec<_> = events
        .iter()
        .filter_map(|e| match &e.data {
            StreamEventData::TextDelta { delta } => Some(delta.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(deltas, vec!["par", "tial"]);

    let n = events.len();
    match &events[n - 2].data {
        StreamEventData::Error {
            kind,
            retryable,
            message,
        } => {
            assert_eq!(*kind, ErrorKind::Safety);
            assert!(!retryable);
            assert!(!message.is_empty());
        }
        other => panic!("expected error event before sentinel, got {other:?}"),
    }
    assert!(matches!(events[n - 1].data, StreamEventData::Done));
}

#[tokio::test]
async fn retryable_connect_failure_is_retried_transparently() {
    let server = MockServer::start().await;
    // First attempt is rate-limited, the retry succeeds.
    Mock::given(method("POST"))
        .and(path(format!("/models/{MODEL}:streamGenerateContent")))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/models/{MODEL}:streamGenerateContent")))
        .respond_with(sse(&[json!({
            "candidates": [{"content": {"parts": [{"text": "ok"}]}, "finishReason": "STOP"}]
        })]))
        .mount(&server)
        .await;

    let events: Vec<_> = coordinator(&server)
        .create_stream(chat(ChatMode::Standard, "hi"))
        .collect()
        .await;

    assert!(
        events
            .iter()
            .all(|e| !matches!(e.data, StreamEventData::Error { .. }))
    );
    assert!(events.iter().any(
        |e| matches!(&e.data, StreamEventData::TextDelta { delta } if delta == "ok")
    ));
}

#[tokio::test]
async fn tool_round_executes_builtin_and_issues_follow_up_call() {
    let server = MockServer::start().await;
    // Round one asks for the calculator, round two answers with its result.
    Mock::given(method("POST"))
        .and(path(format!("/models/{MODEL}:streamGenerateContent")))
        .respond_with(sse(&[json!({
            "candidates": [{
                "content": {"parts": [
                    {"functionCall": {"name": "calculator", "args": {"expression": "2+2"}}}
                ]},
                "finishReason": "STOP"
            }]
        })]))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/models/{MODEL}:streamGenerateContent")))
        .respond_with(sse(&[json!({
            "candidates": [{"content": {"parts": [{"text": "2 + 2 = 4"}]}, "finishReason": "STOP"}]
        })]))
        .mount(&server)
        .await;

    let mut config = GeminiConfig::new("test-key").with_base_url(server.uri());
    config.related_question_count = 0;
    let coordinator =
        StreamCoordinator::new(config, FunctionRegistry::with_builtins().unwrap());

    let events: Vec<_> = coordinator
        .create_stream(chat(ChatMode::Standard, "what is 2+2?"))
        .collect()
        .await;

    assert_seq_contiguous(&events);
    assert!(events.iter().any(|e| matches!(
        &e.data,
        StreamEventData::FunctionCall { name, .. } if name == "calculator"
    )));
    let result = events.iter().find_map(|e| match &e.data {
        StreamEventData::FunctionResult { result, error, .. } => {
            assert!(error.is_none());
            result.clone()
        }
        _ => None,
    });
    assert_eq!(result.unwrap()["value"], json!(4.0));
    assert!(events.iter().any(
        |e| matches!(&e.data, StreamEventData::TextDelta { delta } if delta == "2 + 2 = 4")
    ));
    assert!(matches!(
        events[events.len() - 2].data,
        StreamEventData::AgenticPhase { phase: Phase::Complete }
    ));
}

#[tokio::test]
async fn deep_research_polls_to_completion_with_one_complete_event() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/researchTasks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "taskId": "task-9", "phase": "QUEUED"
        })))
        .mount(&server)
        .await;
    // Scripted poll sequence: thinking with one thought, thinking with two,
    // then complete with the answer.
    Mock::given(method("GET"))
        .and(path("/researchTasks/task-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "taskId": "task-9", "phase": "THINKING", "thoughts": ["scanning sources"]
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/researchTasks/task-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "taskId": "task-9", "phase": "THINKING",
            "thoughts": ["scanning sources", "cross-checking"]
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/researchTasks/task-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "taskId": "task-9", "phase": "COMPLETE",
            "thoughts": ["scanning sources", "cross-checking"],
            "answer": "the findings"
        })))
        .mount(&server)
        .await;

    let events: Vec<_> = coordinator(&server)
        .create_stream(chat(ChatMode::DeepResearch, "investigate"))
        .collect()
        .await;

    assert_seq_contiguous(&events);
    let thoughts: Vec<_> = events
        .iter()
        .filter_map(|e| match &e.data {
            StreamEventData::ThoughtStep { text } => Some(text.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(thoughts, vec!["scanning sources", "cross-checking"]);

    let completes = events
        .iter()
        .filter(|e| matches!(&e.data, StreamEventData::ResearchComplete { task_id } if task_id == "task-9"))
        .count();
    assert_eq!(completes, 1);

    let answer: String = events
        .iter()
        .filter_map(|e| match &e.data {
            StreamEventData::TextDelta { delta } => Some(delta.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(answer, "the findings");
    assert!(matches!(events.last().unwrap().data, StreamEventData::Done));
}

#[tokio::test]
async fn reconnect_after_progress_emits_only_new_thoughts() {
    let server = MockServer::start().await;
    // The reconnect's seeding snapshot already carries two thoughts.
    Mock::given(method("GET"))
        .and(path("/researchTasks/task-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "taskId": "task-9", "phase": "THINKING", "thoughts": ["a", "b"]
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/researchTasks/task-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "taskId": "task-9", "phase": "COMPLETE",
            "thoughts": ["a", "b", "c"], "answer": "done"
        })))
        .mount(&server)
        .await;

    let events: Vec<_> = coordinator(&server)
        .reconnect_research("task-9".into())
        .collect()
        .await;

    let thoughts: Vec<_> = events
        .iter()
        .filter_map(|e| match &e.data {
            StreamEventData::ThoughtStep { text } => Some(text.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(thoughts, vec!["c"], "observed thoughts must not replay");
    let completes = events
        .iter()
        .filter(|e| matches!(e.data, StreamEventData::ResearchComplete { .. }))
        .count();
    assert_eq!(completes, 1);
    assert!(matches!(events.last().unwrap().data, StreamEventData::Done));
}

#[tokio::test]
async fn auth_failure_surfaces_as_non_retryable_error_event() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/models/{MODEL}:streamGenerateContent")))
        .respond_with(ResponseTemplate::new(401).set_body_string("API key not valid"))
        .mount(&server)
        .await;

    let events: Vec<_> = coordinator(&server)
        .create_stream(chat(ChatMode::Standard, "hi"))
        .collect()
        .await;

    let n = events.len();
    match &events[n - 2].data {
        StreamEventData::Error { kind, retryable, .. } => {
            assert_eq!(*kind, ErrorKind::Auth);
            assert!(!retryable);
        }
        other => panic!("expected auth error event, got {other:?}"),
    }
    assert!(matches!(events[n - 1].data, StreamEventData::Done));
}
