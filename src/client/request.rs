//! Provider request preparation.
//!
//! Wire shapes for the generateContent family plus the shared pipeline that
//! turns validated conversation turns into a provider request: token budget
//! check, input-safety pass, URL-context resolution, tool declarations and
//! thinking configuration.

use serde::{Deserialize, Serialize};

use crate::client::safety;
use crate::client::url_context::{self, UrlContextResolver};
use crate::config::GeminiConfig;
use crate::error::GeminiError;
use crate::tokens;
use crate::types::{
    ContentPart, ConversationTurn, FunctionDeclaration, MediaData, Role, ThinkingConfig,
    ThinkingLevel,
};

/// Request body for `models/{model}:generateContent` and friends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateContentRequest {
    pub model: String,
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<WireTool>>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "generationConfig")]
    pub generation_config: Option<GenerationConfig>,
}

/// One conversation entry on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

/// One part of a content entry. Exactly one field is populated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "inlineData")]
    pub inline_data: Option<Blob>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "fileData")]
    pub file_data: Option<FileData>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "functionCall")]
    pub function_call: Option<WireFunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "functionResponse")]
    pub function_response: Option<WireFunctionResponse>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }
}

/// Inline base64 media.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blob {
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub data: String,
}

/// Reference to a staged file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileData {
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    #[serde(rename = "fileUri")]
    pub file_uri: String,
}

/// Function call emitted by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireFunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

/// Function result echoed back to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireFunctionResponse {
    pub name: String,
    pub response: serde_json::Value,
}

/// Tool declarations on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireTool {
    #[serde(skip_serializing_if = "Option::is_none", rename = "functionDeclarations")]
    pub function_declarations: Option<Vec<WireFunctionDeclaration>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireFunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Generation options we actually set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none", rename = "thinkingConfig")]
    pub thinking_config: Option<WireThinkingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireThinkingConfig {
    #[serde(rename = "thinkingBudget")]
    pub thinking_budget: i32,
    #[serde(rename = "includeThoughts")]
    pub include_thoughts: bool,
}

impl From<ThinkingConfig> for WireThinkingConfig {
    fn from(config: ThinkingConfig) -> Self {
        let thinking_budget = match config.level {
            ThinkingLevel::Minimal => 0,
            ThinkingLevel::Low => 1024,
            ThinkingLevel::Medium => 8192,
            ThinkingLevel::High => 24576,
        };
        Self {
            thinking_budget,
            include_thoughts: config.include_thoughts,
        }
    }
}

/// Validate turn shape: non-empty conversation, non-empty parts.
///
/// Consecutive same-role turns are tolerated; the provider accepts them and
/// rejecting here would break histories edited by the product layer.
pub fn validate_turns(turns: &[ConversationTurn]) -> Result<(), GeminiError> {
    if turns.is_empty() {
        return Err(GeminiError::Validation("conversation is empty".into()));
    }
    for (index, turn) in turns.iter().enumerate() {
        if turn.parts.is_empty() {
            return Err(GeminiError::Validation(format!(
                "turn {index} has no content parts"
            )));
        }
    }
    Ok(())
}

/// Build a provider request from conversation turns.
///
/// Pipeline: shape validation, token budget check, safety screen over the
/// latest user turn, URL-context resolution (when a resolver is supplied),
/// then wire conversion. Fails fast before any generation I/O.
pub async fn prepare_request(
    turns: &[ConversationTurn],
    config: &GeminiConfig,
    thinking: Option<ThinkingConfig>,
    declarations: &[&FunctionDeclaration],
    resolver: Option<&UrlContextResolver>,
) -> Result<GenerateContentRequest, GeminiError> {
    validate_turns(turns)?;

    let check = tokens::check_limits(turns, config.model_max_tokens);
    if !check.within_limit {
        return Err(GeminiError::TokenLimit {
            message: format!(
                "estimated {} tokens exceeds the {}-token budget",
                check.estimated_total, config.model_max_tokens
            ),
            token_count: Some(check.estimated_total),
        });
    }

    // Safety pass over the latest user turn only; earlier turns were
    // screened when they were the latest.
    let latest_user = turns.iter().rev().find(|t| t.role == Role::User);
    let screened_latest = match latest_user {
        Some(turn) => Some(safety::screen_input(&turn.text())?),
        None => None,
    };

    let mut contents: Vec<Content> = turns.iter().map(content_from_turn).collect();

    // URL context: extract from the (screened) latest user text and append
    // resolved documents as extra user parts.
    if let (Some(text), Some(resolver)) = (screened_latest.as_deref(), resolver) {
        let urls = url_context::extract_urls(text, config.max_context_urls);
        if !urls.is_empty() {
            let resolved = resolver.resolve_all(&urls).await;
            if !resolved.is_empty() {
                let parts = resolved
                    .into_iter()
                    .map(|doc| {
                        Part::text(format!("[content of {}]\n{}", doc.url, doc.content))
                    })
                    .collect();
                contents.push(Content {
                    role: "user".into(),
                    parts,
                });
            }
        }
    }

    let tools = if declarations.is_empty() {
        None
    } else {
        Some(vec![WireTool {
            function_declarations: Some(
                declarations
                    .iter()
                    .map(|d| WireFunctionDeclaration {
                        name: d.name.clone(),
                        description: d.description.clone(),
                        parameters: d.parameters.clone(),
                    })
                    .collect(),
            ),
        }])
    };

    Ok(GenerateContentRequest {
        model: config.model.clone(),
        contents,
        tools,
        generation_config: thinking.map(|t| GenerationConfig {
            thinking_config: Some(t.into()),
        }),
    })
}

fn content_from_turn(turn: &ConversationTurn) -> Content {
    let role = match turn.role {
        Role::User => "user",
        Role::Assistant => "model",
    };
    Content {
        role: role.into(),
        parts: turn.parts.iter().map(part_from_content).collect(),
    }
}

fn part_from_content(part: &ContentPart) -> Part {
    match part {
        ContentPart::Text { text } => {
            // The latest user turn is screened separately; historical text
            // still gets PII redaction on its way to the wire.
            let (redacted, _) = safety::redact_pii(text);
            Part::text(redacted)
        }
        ContentPart::Image { data, mime_type }
        | ContentPart::Video { data, mime_type }
        | ContentPart::Audio { data, mime_type }
        | ContentPart::Document { data, mime_type } => match data {
            MediaData::FileUri { file_uri } => Part {
                file_data: Some(FileData {
                    mime_type: mime_type.clone(),
                    file_uri: file_uri.clone(),
                }),
                ..Default::default()
            },
            MediaData::Inline { base64 } => Part {
                inline_data: Some(Blob {
                    mime_type: mime_type.clone(),
                    data: base64.clone(),
                }),
                ..Default::default()
            },
        },
    }
}
