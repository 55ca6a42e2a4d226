//! Deep-research orchestration.
//!
//! Research tasks run remotely; this side only submits, polls and
//! translates. The remote snapshot is the source of truth: thoughts are
//! cumulative, so progress is keyed on how many we have already emitted.
//! That index is all the state a stream carries, which is what makes
//! reconnection possible without a durable event log. Reconnects seed the
//! index from their first snapshot so nothing observed before the drop is
//! replayed.

use std::sync::Arc;

use crate::client::request::prepare_request;
use crate::client::{ModelBackend, ResearchSnapshot};
use crate::config::GeminiConfig;
use crate::error::GeminiError;
use crate::types::events::{Phase, RawEventStream, StreamEventData};
use crate::types::{ConversationTurn, ResearchPhase};

/// Size of the text-delta chunks the final answer is replayed in.
const ANSWER_CHUNK_CHARS: usize = 512;

/// Driver for deep-research turns.
pub struct ResearchOrchestrator {
    backend: Arc<dyn ModelBackend>,
    config: GeminiConfig,
}

/// Poll-loop cursor: what the stream has already told the client.
struct Progress {
    /// Thoughts emitted so far; snapshots carry the cumulative list.
    thoughts_seen: usize,
    /// Last remote phase forwarded as an `agentic-phase` event.
    last_phase: Option<ResearchPhase>,
}

impl Progress {
    fn new() -> Self {
        Self {
            thoughts_seen: 0,
            last_phase: None,
        }
    }

    /// Seed the cursor from a snapshot, suppressing everything the client
    /// observed before a reconnect.
    fn seeded(snapshot: &ResearchSnapshot) -> Self {
        Self {
            thoughts_seen: snapshot.thoughts.len(),
            last_phase: Some(snapshot.phase),
        }
    }
}

impl ResearchOrchestrator {
    pub fn new(backend: Arc<dyn ModelBackend>, config: GeminiConfig) -> Self {
        Self { backend, config }
    }

    /// Submit a research task and stream its progress to completion.
    ///
    /// The task id is returned eagerly so the caller can persist it for
    /// [`reconnect`](Self::reconnect) before consuming the stream.
    pub async fn execute_deep_research(
        self: Arc<Self>,
        turns: Vec<ConversationTurn>,
    ) -> Result<(String, RawEventStream), GeminiError> {
        let request = prepare_request(&turns, &self.config, None, &[], None).await?;
        let task = self.backend.submit_research(request).await?;
        let task_id = task.task_id.clone();
        tracing::info!(task_id = %task_id, "deep research task submitted");

        let stream = self.stream_task(task_id.clone(), Progress::new(), true);
        Ok((task_id, stream))
    }

    /// Re-attach to a running task after a dropped stream.
    ///
    /// Emits nothing for progress made before the first snapshot; if the
    /// task already completed, the answer and completion event are emitted
    /// immediately.
    pub fn reconnect(self: Arc<Self>, task_id: String) -> RawEventStream {
        let stream = async_stream::stream! {
            let snapshot = match self.backend.poll_research(&task_id).await {
                Ok(snapshot) => snapshot,
                Err(error) => {
                    yield Err(error);
                    return;
                }
            };

            if snapshot.phase.is_terminal() {
                for event in terminal_events(&task_id, &snapshot) {
                    yield event;
                }
                return;
            }

            let progress = Progress::seeded(&snapshot);
            let mut inner = self.stream_task(task_id.clone(), progress, false);
            while let Some(event) = futures_util::StreamExt::next(&mut inner).await {
                yield event;
            }
        };
        Box::pin(stream)
    }

    /// Extend a completed task with a follow-up question and stream the
    /// extension.
    pub fn ask_follow_up(self: Arc<Self>, task_id: String, question: String) -> RawEventStream {
        let stream = async_stream::stream! {
            // Seed from the pre-follow-up snapshot so only new thoughts and
            // the new answer are emitted.
            let snapshot = match self.backend.poll_research(&task_id).await {
                Ok(snapshot) => snapshot,
                Err(error) => {
                    yield Err(error);
                    return;
                }
            };
            if let Err(error) = self.backend.follow_up_research(&task_id, &question).await {
                yield Err(error);
                return;
            }

            let progress = Progress::seeded(&snapshot);
            let mut inner = self.stream_task(task_id.clone(), progress, false);
            while let Some(event) = futures_util::StreamExt::next(&mut inner).await {
                yield event;
            }
        };
        Box::pin(stream)
    }

    /// The poll loop shared by all three entry points.
    ///
    /// Pull-based: every tick suspends on the poll interval, so dropping
    /// the stream stops polling within one tick. `emit_initial_phase`
    /// distinguishes a fresh submission (the queued phase is news) from a
    /// reconnect (it is not).
    fn stream_task(
        self: Arc<Self>,
        task_id: String,
        mut progress: Progress,
        emit_initial_phase: bool,
    ) -> RawEventStream {
        let stream = async_stream::stream! {
            let research = self.config.research.clone();
            let deadline = tokio::time::Instant::now() + research.max_task_duration;
            let mut interval = research.poll_interval;
            let mut consecutive_failures: u32 = 0;
            let mut first = true;

            loop {
                if tokio::time::Instant::now() >= deadline {
                    yield Err(GeminiError::Timeout(format!(
                        "research task {task_id} exceeded {}s",
                        research.max_task_duration.as_secs()
                    )));
                    return;
                }

                if !first {
                    tokio::time::sleep(interval).await;
                }
                first = false;

                let snapshot = match self.backend.poll_research(&task_id).await {
                    Ok(snapshot) => {
                        consecutive_failures = 0;
                        snapshot
                    }
                    Err(error) if error.is_retryable() => {
                        consecutive_failures += 1;
                        tracing::debug!(
                            task_id = %task_id,
                            failures = consecutive_failures,
                            %error,
                            "poll failed"
                        );
                        if consecutive_failures >= research.max_poll_failures {
                            yield Err(GeminiError::Timeout(format!(
                                "lost contact with research task {task_id} after {} consecutive poll failures",
                                consecutive_failures
                            )));
                            return;
                        }
                        continue;
                    }
                    Err(error) => {
                        yield Err(error);
                        return;
                    }
                };

                let phase_changed = progress.last_phase != Some(snapshot.phase);
                if phase_changed {
                    // Back off only while nothing moves; reset on progress.
                    interval = research.poll_interval;
                    if emit_initial_phase || progress.last_phase.is_some() {
                        if let Some(phase) = ui_phase(snapshot.phase) {
                            yield Ok(StreamEventData::AgenticPhase { phase });
                        }
                    }
                    progress.last_phase = Some(snapshot.phase);
                } else {
                    interval = (interval * 2).min(research.max_poll_interval);
                }

                for thought in snapshot.thoughts.iter().skip(progress.thoughts_seen) {
                    yield Ok(StreamEventData::ThoughtStep {
                        text: thought.clone(),
                    });
                }
                progress.thoughts_seen = progress.thoughts_seen.max(snapshot.thoughts.len());

                if snapshot.phase.is_terminal() {
                    for event in terminal_events(&task_id, &snapshot) {
                        yield event;
                    }
                    return;
                }
            }
        };
        Box::pin(stream)
    }
}

/// Events for a task that reached a terminal phase.
///
/// On Complete the answer is replayed as chunked text-deltas followed by
/// exactly one completion marker.
fn terminal_events(
    task_id: &str,
    snapshot: &ResearchSnapshot,
) -> Vec<Result<StreamEventData, GeminiError>> {
    match snapshot.phase {
        ResearchPhase::Complete => {
            let mut events = Vec::new();
            if let Some(answer) = &snapshot.answer {
                for chunk in chunk_chars(answer, ANSWER_CHUNK_CHARS) {
                    events.push(Ok(StreamEventData::TextDelta { delta: chunk }));
                }
            }
            events.push(Ok(StreamEventData::ResearchComplete {
                task_id: task_id.to_string(),
            }));
            events
        }
        ResearchPhase::Cancelled => {
            vec![Ok(StreamEventData::AgenticPhase {
                phase: Phase::Cancelled,
            })]
        }
        ResearchPhase::Error => {
            let detail = snapshot
                .error
                .clone()
                .unwrap_or_else(|| "research task failed".into());
            vec![Err(GeminiError::Generic(detail).into_classified())]
        }
        _ => Vec::new(),
    }
}

/// Remote phases with a client-facing counterpart.
fn ui_phase(phase: ResearchPhase) -> Option<Phase> {
    match phase {
        ResearchPhase::Queued => Some(Phase::Queued),
        ResearchPhase::Running => Some(Phase::Running),
        ResearchPhase::Thinking => Some(Phase::Thinking),
        ResearchPhase::Cancelled => Some(Phase::Cancelled),
        ResearchPhase::Complete | ResearchPhase::Error => None,
    }
}

/// Split on character boundaries into chunks of at most `size` chars.
fn chunk_chars(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size)
        .map(|chunk| chunk.iter().collect())
        .collect()
}
