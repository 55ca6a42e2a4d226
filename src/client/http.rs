//! HTTP implementation of the provider boundary.
//!
//! Thin wrapper over the Gemini REST surface: generateContent (unary and
//! SSE streaming), the research-task resource, and the file store. All
//! failures are mapped through the error taxonomy before they leave this
//! module; status codes win over message heuristics.

use async_trait::async_trait;
use chrono::Utc;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use super::request::GenerateContentRequest;
use super::{ModelBackend, ModelResponse, ProviderEvent, ProviderStream, ResearchSnapshot};
use crate::config::GeminiConfig;
use crate::error::{GeminiError, from_status};
use crate::types::{FileRef, FileState, FinishReason, ResearchPhase, ResearchTask, ToolCall};

/// Shared HTTP backend, cheap to clone behind an `Arc`.
pub struct GeminiHttpBackend {
    config: GeminiConfig,
    http: reqwest::Client,
}

impl std::fmt::Debug for GeminiHttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiHttpBackend")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .finish()
    }
}

impl GeminiHttpBackend {
    pub fn new(config: GeminiConfig) -> Result<Self, GeminiError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.http.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(connect) = config.http.connect_timeout {
            builder = builder.connect_timeout(connect);
        }
        let http = builder
            .build()
            .map_err(|e| GeminiError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, http })
    }

    /// The HTTP client, shared with the URL-context resolver.
    pub fn http_client(&self) -> reqwest::Client {
        self.http.clone()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let mut builder = builder.header("x-goog-api-key", self.config.api_key.expose_secret());
        for (name, value) in &self.config.http.headers {
            builder = builder.header(name, value);
        }
        builder
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, GeminiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(from_status(status.as_u16(), &body))
    }
}

#[async_trait]
impl ModelBackend for GeminiHttpBackend {
    async fn generate(&self, request: GenerateContentRequest) -> Result<ModelResponse, GeminiError> {
        let url = self.url(&format!("models/{}:generateContent", request.model));
        let response = self.authed(self.http.post(&url)).json(&request).send().await?;
        let response = Self::check(response).await?;
        let body: GenerateContentResponse = response.json().await.map_err(GeminiError::from)?;
        model_response_from_wire(body)
    }

    async fn generate_stream(
        &self,
        request: GenerateContentRequest,
    ) -> Result<ProviderStream, GeminiError> {
        let url = self.url(&format!("models/{}:streamGenerateContent", request.model));
        let response = self
            .authed(self.http.post(&url).query(&[("alt", "sse")]))
            .json(&request)
            .send()
            .await?;
        let response = Self::check(response).await?;

        let mut events = response.bytes_stream().eventsource();
        let stream = async_stream::stream! {
            let mut saw_tool_call = false;
            while let Some(event) = events.next().await {
                match event {
                    Ok(event) => {
                        let data = event.data.trim();
                        if data.is_empty() || data == "[DONE]" {
                            continue;
                        }
                        match serde_json::from_str::<GenerateContentResponse>(data) {
                            Ok(chunk) => {
                                for ev in events_from_chunk(chunk, &mut saw_tool_call) {
                                    yield ev;
                                }
                            }
                            Err(e) => {
                                yield Err(GeminiError::Generic(format!(
                                    "failed to parse SSE chunk: {e}"
                                )));
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        yield Err(GeminiError::Network(format!("SSE stream error: {e}")));
                        return;
                    }
                }
            }
        };
        Ok(Box::pin(stream))
    }

    async fn submit_research(
        &self,
        request: GenerateContentRequest,
    ) -> Result<ResearchTask, GeminiError> {
        let url = self.url("researchTasks");
        let response = self.authed(self.http.post(&url)).json(&request).send().await?;
        let response = Self::check(response).await?;
        let body: ResearchTaskResource = response.json().await.map_err(GeminiError::from)?;
        tracing::info!(task_id = %body.task_id, "submitted research task");
        Ok(ResearchTask {
            task_id: body.task_id,
            phase: phase_from_wire(&body.phase),
            created_at: Utc::now(),
        })
    }

    async fn poll_research(&self, task_id: &str) -> Result<ResearchSnapshot, GeminiError> {
        let url = self.url(&format!("researchTasks/{task_id}"));
        let response = self.authed(self.http.get(&url)).send().await?;
        let response = Self::check(response).await?;
        let body: ResearchTaskResource = response.json().await.map_err(GeminiError::from)?;
        Ok(ResearchSnapshot {
            task_id: body.task_id,
            phase: phase_from_wire(&body.phase),
            thoughts: body.thoughts,
            answer: body.answer,
            error: body.error,
        })
    }

    async fn follow_up_research(&self, task_id: &str, question: &str) -> Result<(), GeminiError> {
        let url = self.url(&format!("researchTasks/{task_id}:followUp"));
        let response = self
            .authed(self.http.post(&url))
            .json(&serde_json::json!({ "question": question }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn upload_file(&self, bytes: Vec<u8>, mime_type: &str) -> Result<FileRef, GeminiError> {
        let url = self.url("files");
        let response = self
            .authed(self.http.post(&url).query(&[("uploadType", "media")]))
            .header(reqwest::header::CONTENT_TYPE, mime_type)
            .body(bytes)
            .send()
            .await?;
        let response = Self::check(response).await?;
        let body: FileResource = response.json().await.map_err(GeminiError::from)?;
        Ok(body.into_file_ref())
    }

    async fn file_status(&self, name: &str) -> Result<FileRef, GeminiError> {
        let url = self.url(&format!("files/{}", name.trim_start_matches("files/")));
        let response = self.authed(self.http.get(&url)).send().await?;
        let response = Self::check(response).await?;
        let body: FileResource = response.json().await.map_err(GeminiError::from)?;
        Ok(body.into_file_ref())
    }
}

// ---------------------------------------------------------------------------
// Wire response shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
    grounding_metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CandidatePart {
    text: Option<String>,
    #[serde(default)]
    thought: Option<bool>,
    function_call: Option<WireCall>,
}

#[derive(Debug, Deserialize)]
struct WireCall {
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResearchTaskResource {
    task_id: String,
    phase: String,
    #[serde(default)]
    thoughts: Vec<String>,
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileResource {
    name: String,
    #[serde(default)]
    uri: Option<String>,
    mime_type: String,
    state: String,
}

impl FileResource {
    fn into_file_ref(self) -> FileRef {
        let state = match self.state.as_str() {
            "ACTIVE" => FileState::Active,
            "FAILED" => FileState::Failed,
            _ => FileState::Processing,
        };
        FileRef {
            uri: self.uri.unwrap_or_else(|| self.name.clone()),
            name: self.name,
            mime_type: self.mime_type,
            state,
        }
    }
}

fn finish_reason_from_wire(reason: &str) -> FinishReason {
    match reason {
        "STOP" => FinishReason::Stop,
        "MAX_TOKENS" => FinishReason::Length,
        "SAFETY" => FinishReason::Safety,
        "RECITATION" => FinishReason::Recitation,
        _ => FinishReason::Unknown,
    }
}

fn phase_from_wire(phase: &str) -> ResearchPhase {
    match phase {
        "QUEUED" => ResearchPhase::Queued,
        "RUNNING" => ResearchPhase::Running,
        "THINKING" => ResearchPhase::Thinking,
        "COMPLETE" => ResearchPhase::Complete,
        "ERROR" => ResearchPhase::Error,
        "CANCELLED" => ResearchPhase::Cancelled,
        other => {
            tracing::warn!(phase = other, "unknown research phase, treating as running");
            ResearchPhase::Running
        }
    }
}

/// Convert one streamed chunk into provider events.
fn events_from_chunk(
    chunk: GenerateContentResponse,
    saw_tool_call: &mut bool,
) -> Vec<Result<ProviderEvent, GeminiError>> {
    if let Some(feedback) = &chunk.prompt_feedback {
        if let Some(reason) = &feedback.block_reason {
            return vec![Err(GeminiError::Safety(format!(
                "prompt blocked: {reason}"
            )))];
        }
    }

    let mut out = Vec::new();
    for candidate in chunk.candidates {
        if let Some(content) = candidate.content {
            for part in content.parts {
                if let Some(call) = part.function_call {
                    *saw_tool_call = true;
                    out.push(Ok(ProviderEvent::ToolCall(ToolCall {
                        name: call.name,
                        args: call.args,
                    })));
                } else if let Some(text) = part.text {
                    if text.is_empty() {
                        continue;
                    }
                    if part.thought.unwrap_or(false) {
                        out.push(Ok(ProviderEvent::ThoughtDelta(text)));
                    } else {
                        out.push(Ok(ProviderEvent::TextDelta(text)));
                    }
                }
            }
        }
        if let Some(grounding) = candidate.grounding_metadata {
            out.push(Ok(ProviderEvent::Grounding(grounding)));
        }
        if let Some(reason) = candidate.finish_reason {
            let mapped = match finish_reason_from_wire(&reason) {
                // Tool-call parts arrive with a plain STOP; the presence of
                // calls is what routes the round.
                FinishReason::Stop if *saw_tool_call => FinishReason::ToolCalls,
                other => other,
            };
            out.push(Ok(ProviderEvent::Finish(mapped)));
        }
    }
    out
}

fn model_response_from_wire(body: GenerateContentResponse) -> Result<ModelResponse, GeminiError> {
    if let Some(feedback) = &body.prompt_feedback {
        if let Some(reason) = &feedback.block_reason {
            return Err(GeminiError::Safety(format!("prompt blocked: {reason}")));
        }
    }

    let Some(candidate) = body.candidates.into_iter().next() else {
        return Err(GeminiError::Generic("response has no candidates".into()));
    };

    let mut text = String::new();
    let mut thoughts = Vec::new();
    let mut tool_calls = Vec::new();
    if let Some(content) = candidate.content {
        for part in content.parts {
            if let Some(call) = part.function_call {
                tool_calls.push(ToolCall {
                    name: call.name,
                    args: call.args,
                });
            } else if let Some(t) = part.text {
                if part.thought.unwrap_or(false) {
                    thoughts.push(t);
                } else {
                    text.push_str(&t);
                }
            }
        }
    }

    let finish_reason = match candidate.finish_reason.as_deref() {
        Some(reason) => match finish_reason_from_wire(reason) {
            FinishReason::Stop if !tool_calls.is_empty() => FinishReason::ToolCalls,
            other => other,
        },
        None if !tool_calls.is_empty() => FinishReason::ToolCalls,
        None => FinishReason::Unknown,
    };

    Ok(ModelResponse {
        text,
        thoughts,
        tool_calls,
        grounding: candidate.grounding_metadata,
        finish_reason,
    })
}
