//! Shared data model for the orchestration core.

pub mod events;

pub use events::{EventStream, Phase, StreamEvent, StreamEventData};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One content part of a turn. Media parts reference either inline bytes
/// (base64 on the wire) or a previously staged file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentPart {
    Text { text: String },
    Image { data: MediaData, mime_type: String },
    Video { data: MediaData, mime_type: String },
    Audio { data: MediaData, mime_type: String },
    Document { data: MediaData, mime_type: String },
}

/// Inline bytes or a staged-file reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MediaData {
    /// Reference to a file already staged with the provider's file API.
    FileUri { file_uri: String },
    /// Raw bytes, base64-encoded when serialized.
    Inline { base64: String },
}

impl ContentPart {
    /// Convenience constructor for a text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Image part from raw bytes, base64-encoded for the wire.
    pub fn inline_image(bytes: &[u8], mime_type: impl Into<String>) -> Self {
        use base64::Engine;
        Self::Image {
            data: MediaData::Inline {
                base64: base64::engine::general_purpose::STANDARD.encode(bytes),
            },
            mime_type: mime_type.into(),
        }
    }

    /// Video part referencing a staged file.
    pub fn staged_video(file_uri: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self::Video {
            data: MediaData::FileUri {
                file_uri: file_uri.into(),
            },
            mime_type: mime_type.into(),
        }
    }

    /// The text of this part, if it is one.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// One role-attributed unit of conversation content.
///
/// Well-formed histories alternate user/assistant, but consecutive same-role
/// turns are tolerated everywhere in the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub parts: Vec<ContentPart>,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![ContentPart::text(text)],
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            parts: vec![ContentPart::text(text)],
        }
    }

    /// Concatenated text of all text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(ContentPart::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Reasoning-effort level requested for a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingLevel {
    Minimal,
    Low,
    #[default]
    Medium,
    High,
}

/// Per-request thinking configuration; absent means provider default.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ThinkingConfig {
    pub level: ThinkingLevel,
    pub include_thoughts: bool,
}

/// Operation mode requested by the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChatMode {
    Standard,
    DeepResearch,
}

/// Inbound request consumed from the transport boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub conversation: Vec<ConversationTurn>,
    pub mode: ChatMode,
    pub model_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_config: Option<ThinkingConfig>,
}

/// A single web source backing part of a generated answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundingSource {
    pub source_url: String,
    pub title: String,
    /// Answer segments this source supports.
    #[serde(default)]
    pub segments: Vec<String>,
}

/// Web-search grounding attached to an answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroundingMetadata {
    pub sources: Vec<GroundingSource>,
}

/// Declared shape of a callable function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    /// JSON Schema for the arguments object.
    pub parameters: serde_json::Value,
}

/// Phase of a server-side research task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResearchPhase {
    Queued,
    Running,
    Thinking,
    Complete,
    Error,
    Cancelled,
}

impl ResearchPhase {
    /// Terminal phases never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error | Self::Cancelled)
    }
}

/// Client-side view of a long-running research task. Resumable from
/// `task_id` alone; the id is opaque beyond string equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchTask {
    pub task_id: String,
    pub phase: ResearchPhase,
    pub created_at: DateTime<Utc>,
}

/// A staged file ready to be referenced in a generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRef {
    /// Provider-assigned resource name, e.g. `files/abc-123`.
    pub name: String,
    pub uri: String,
    pub mime_type: String,
    pub state: FileState,
}

/// Processing state of a staged file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileState {
    Processing,
    Active,
    Failed,
}

/// Finish reason reported by the model for one generation round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Safety,
    Recitation,
    Length,
    Unknown,
}

/// A tool invocation requested by the model within one agentic round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub args: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_text_joins_text_parts_only() {
        let turn = ConversationTurn {
            role: Role::User,
            parts: vec![
                ContentPart::text("hello"),
                ContentPart::Image {
                    data: MediaData::FileUri {
                        file_uri: "files/x".into(),
                    },
                    mime_type: "image/png".into(),
                },
                ContentPart::text("world"),
            ],
        };
        assert_eq!(turn.text(), "hello\nworld");
    }

    #[test]
    fn chat_mode_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_string(&ChatMode::DeepResearch).unwrap(),
            "\"deep-research\""
        );
    }

    #[test]
    fn terminal_phases() {
        assert!(ResearchPhase::Complete.is_terminal());
        assert!(ResearchPhase::Error.is_terminal());
        assert!(ResearchPhase::Cancelled.is_terminal());
        assert!(!ResearchPhase::Thinking.is_terminal());
    }
}
