//! Standard-mode agentic workflow.
//!
//! One conversation turn is a bounded sequence of rounds: stream a model
//! call, and if the model requests tools, execute them all concurrently,
//! fold the results back into the request and go again. Rounds are atomic.
//! Tool failures (validation, handler error, timeout) become error-shaped
//! function results and the round still closes, so the model always gets a
//! complete set of responses.

use std::sync::Arc;

use futures::future::join_all;
use futures_util::StreamExt;

use crate::client::grounding::{self, DedupPolicy};
use crate::client::request::{Content, GenerateContentRequest, Part, WireFunctionCall, WireFunctionResponse, prepare_request};
use crate::client::url_context::UrlContextResolver;
use crate::client::{ModelBackend, ProviderEvent};
use crate::config::GeminiConfig;
use crate::error::GeminiError;
use crate::registry::{FunctionOutcome, FunctionRegistry};
use crate::retry::{RetryPolicy, with_retry_stream};
use crate::types::events::{Phase, RawEventStream, StreamEventData};
use crate::types::{ConversationTurn, FinishReason, ThinkingConfig, ToolCall};

/// Driver for standard-mode turns.
pub struct AgenticWorkflow {
    backend: Arc<dyn ModelBackend>,
    registry: Arc<FunctionRegistry>,
    config: GeminiConfig,
    retry: RetryPolicy,
    resolver: Option<UrlContextResolver>,
}

impl AgenticWorkflow {
    pub fn new(
        backend: Arc<dyn ModelBackend>,
        registry: Arc<FunctionRegistry>,
        config: GeminiConfig,
    ) -> Self {
        Self {
            backend,
            registry,
            config,
            retry: RetryPolicy::new(),
            resolver: None,
        }
    }

    /// Enable URL-context resolution for the latest user turn.
    pub fn with_resolver(mut self, resolver: UrlContextResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Run one turn, yielding normalized events until the turn finalizes.
    ///
    /// The stream is pull-based: dropping it cancels the turn at the next
    /// suspension point, including mid-round.
    pub fn run(
        self: Arc<Self>,
        turns: Vec<ConversationTurn>,
        thinking: Option<ThinkingConfig>,
    ) -> RawEventStream {
        let stream = async_stream::stream! {
            yield Ok(StreamEventData::AgenticPhase { phase: Phase::Started });

            let declarations = self.registry.list();
            let mut request = match prepare_request(
                &turns,
                &self.config,
                thinking,
                &declarations,
                self.resolver.as_ref(),
            )
            .await
            {
                Ok(request) => request,
                Err(error) => {
                    yield Err(error);
                    return;
                }
            };
            drop(declarations);

            let mut final_text = String::new();
            let mut final_grounding: Option<serde_json::Value> = None;

            for round in 0..self.config.max_agentic_rounds {
                let round_request = request.clone();
                let connect = with_retry_stream(&self.retry, || {
                    self.backend.generate_stream(round_request.clone())
                })
                .await;
                let mut events = match connect {
                    Ok(events) => events,
                    Err(error) => {
                        yield Err(error);
                        return;
                    }
                };

                let mut round_text = String::new();
                let mut tool_calls: Vec<ToolCall> = Vec::new();
                let mut finish = FinishReason::Unknown;

                while let Some(event) = events.next().await {
                    match event {
                        Ok(ProviderEvent::TextDelta(delta)) => {
                            round_text.push_str(&delta);
                            yield Ok(StreamEventData::TextDelta { delta });
                        }
                        Ok(ProviderEvent::ThoughtDelta(text)) => {
                            yield Ok(StreamEventData::ThoughtStep { text });
                        }
                        Ok(ProviderEvent::ToolCall(call)) => {
                            tool_calls.push(call);
                        }
                        Ok(ProviderEvent::Grounding(raw)) => {
                            final_grounding = Some(raw);
                        }
                        Ok(ProviderEvent::Finish(reason)) => {
                            finish = reason;
                        }
                        Err(error) => {
                            yield Err(error);
                            return;
                        }
                    }
                }

                final_text.push_str(&round_text);

                // A stream can end without a finish marker; calls already
                // collected still make this a tool round, matching the unary
                // response mapping.
                let finish = match finish {
                    FinishReason::Unknown if !tool_calls.is_empty() => FinishReason::ToolCalls,
                    other => other,
                };

                match finish {
                    FinishReason::ToolCalls => {
                        tracing::debug!(round, count = tool_calls.len(), "executing tool round");
                        yield Ok(StreamEventData::AgenticPhase { phase: Phase::CallingTool });

                        for call in &tool_calls {
                            yield Ok(StreamEventData::FunctionCall {
                                name: call.name.clone(),
                                args: call.args.clone(),
                            });
                        }

                        // All calls run concurrently; the round closes only
                        // once every result is in.
                        let executions = tool_calls.iter().map(|call| {
                            let registry = self.registry.clone();
                            async move { registry.execute(&call.name, call.args.clone()).await }
                        });
                        let outcomes = join_all(executions).await;

                        let mut responses = Vec::with_capacity(tool_calls.len());
                        for (call, outcome) in tool_calls.iter().zip(outcomes) {
                            let (result, error, response) = match outcome {
                                FunctionOutcome::Success(value) => {
                                    let response = value.clone();
                                    (Some(value), None, response)
                                }
                                FunctionOutcome::Error(message) => {
                                    let response = serde_json::json!({ "error": message });
                                    (None, Some(message), response)
                                }
                            };
                            yield Ok(StreamEventData::FunctionResult {
                                name: call.name.clone(),
                                result,
                                error,
                            });
                            responses.push(WireFunctionResponse {
                                name: call.name.clone(),
                                response,
                            });
                        }

                        extend_with_tool_round(&mut request, &round_text, &tool_calls, responses);
                    }
                    FinishReason::Stop | FinishReason::Unknown => {
                        if let Some(raw) = final_grounding.take() {
                            let metadata = grounding::parse_grounding(&raw, DedupPolicy::ByDomain);
                            if !metadata.sources.is_empty() {
                                yield Ok(StreamEventData::Grounding { metadata });
                            }
                        }

                        if self.config.related_question_count > 0 && !final_text.is_empty() {
                            if let Some(questions) = self.related_questions(&final_text).await {
                                yield Ok(StreamEventData::RelatedQuestions { questions });
                            }
                        }

                        yield Ok(StreamEventData::AgenticPhase { phase: Phase::Complete });
                        return;
                    }
                    FinishReason::Safety => {
                        yield Err(GeminiError::Safety("response blocked".into()));
                        return;
                    }
                    FinishReason::Recitation => {
                        yield Err(GeminiError::Recitation("response blocked".into()));
                        return;
                    }
                    FinishReason::Length => {
                        yield Err(GeminiError::TokenLimit {
                            message: "response hit the output token limit".into(),
                            token_count: None,
                        });
                        return;
                    }
                }
            }

            yield Err(GeminiError::Generic(format!(
                "turn exceeded {} tool rounds",
                self.config.max_agentic_rounds
            )));
        };
        Box::pin(stream)
    }

    /// Derive follow-up question suggestions from the final answer.
    ///
    /// Best-effort: any failure is logged and swallowed, the turn already
    /// succeeded.
    async fn related_questions(&self, answer: &str) -> Option<Vec<String>> {
        let count = self.config.related_question_count;
        let prompt = format!(
            "Based on the following answer, suggest up to {count} short follow-up \
             questions a reader might ask next. Return one question per line with \
             no numbering.\n\n{answer}"
        );
        let request = GenerateContentRequest {
            model: self.config.model.clone(),
            contents: vec![Content {
                role: "user".into(),
                parts: vec![Part::text(prompt)],
            }],
            tools: None,
            generation_config: None,
        };

        match self.backend.generate(request).await {
            Ok(response) => {
                let questions: Vec<String> = response
                    .text
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .take(count)
                    .map(String::from)
                    .collect();
                if questions.is_empty() { None } else { Some(questions) }
            }
            Err(error) => {
                tracing::debug!(%error, "related-question call failed, skipping");
                None
            }
        }
    }
}

/// Append the model's tool-call turn and our function responses to the
/// request for the follow-up call.
fn extend_with_tool_round(
    request: &mut GenerateContentRequest,
    round_text: &str,
    calls: &[ToolCall],
    responses: Vec<WireFunctionResponse>,
) {
    let mut model_parts = Vec::new();
    if !round_text.is_empty() {
        model_parts.push(Part::text(round_text));
    }
    for call in calls {
        model_parts.push(Part {
            function_call: Some(WireFunctionCall {
                name: call.name.clone(),
                args: call.args.clone(),
            }),
            ..Default::default()
        });
    }
    request.contents.push(Content {
        role: "model".into(),
        parts: model_parts,
    });
    request.contents.push(Content {
        role: "user".into(),
        parts: responses
            .into_iter()
            .map(|response| Part {
                function_response: Some(response),
                ..Default::default()
            })
            .collect(),
    });
}
