//! Core error types for the orchestration layer.

use serde::{Deserialize, Serialize};

/// Coarse error kind, stable across message wording changes.
///
/// The transport layer keys friendly messages off this kind, so every error
/// produced by this crate carries exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Safety,
    RateLimit,
    Quota,
    Auth,
    ModelUnavailable,
    Validation,
    Network,
    Timeout,
    Recitation,
    TokenLimit,
    Generic,
}

/// Typed error for everything the orchestration core can fail with.
///
/// Retryability is fixed by kind: `RateLimit`, `Network` and `Timeout` are
/// retryable, `ModelUnavailable` is retryable unless the constructor says
/// otherwise, everything else is terminal for the current turn.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GeminiError {
    /// Request or response was blocked by the provider's safety filters.
    #[error("content blocked by safety filters: {0}")]
    Safety(String),

    /// Provider rate limit hit. `retry_after_ms` is populated when the
    /// provider said how long to wait.
    #[error("rate limited: {message}")]
    RateLimit {
        message: String,
        retry_after_ms: Option<u64>,
    },

    /// Billing or daily quota exhausted. Retrying will not help.
    #[error("quota exhausted: {0}")]
    Quota(String),

    /// Missing, expired or invalid credentials.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The requested model is temporarily unavailable or overloaded.
    #[error("model unavailable: {message}")]
    ModelUnavailable { message: String, retryable: bool },

    /// Malformed inbound request, schema violation, or rejected input.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Connection-level failure (DNS, socket, TLS, reset).
    #[error("network error: {0}")]
    Network(String),

    /// An operation exceeded its deadline.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Response blocked because it reproduced training material.
    #[error("response blocked for recitation: {0}")]
    Recitation(String),

    /// Request exceeds the model's context window.
    #[error("token limit exceeded: {message}")]
    TokenLimit {
        message: String,
        token_count: Option<u64>,
    },

    /// Anything we could not classify more precisely.
    #[error("{0}")]
    Generic(String),
}

impl GeminiError {
    /// The coarse kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Safety(_) => ErrorKind::Safety,
            Self::RateLimit { .. } => ErrorKind::RateLimit,
            Self::Quota(_) => ErrorKind::Quota,
            Self::Auth(_) => ErrorKind::Auth,
            Self::ModelUnavailable { .. } => ErrorKind::ModelUnavailable,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Network(_) => ErrorKind::Network,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Recitation(_) => ErrorKind::Recitation,
            Self::TokenLimit { .. } => ErrorKind::TokenLimit,
            Self::Generic(_) => ErrorKind::Generic,
        }
    }

    /// Whether a blind re-attempt with backoff has a reasonable chance of
    /// succeeding without caller intervention.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimit { .. } | Self::Network(_) | Self::Timeout(_) => true,
            Self::ModelUnavailable { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// User-safe message for the transport layer. Never exposes raw provider
    /// internals; the full detail stays on `Display` for logs.
    pub fn user_message(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Safety => "The request was blocked by safety filters. Please rephrase and try again.",
            ErrorKind::RateLimit => "The service is experiencing high demand. Please retry shortly.",
            ErrorKind::Quota => "The usage quota for this service has been reached.",
            ErrorKind::Auth => "Authentication with the model service failed.",
            ErrorKind::ModelUnavailable => "The selected model is temporarily unavailable.",
            ErrorKind::Validation => "The request was invalid and could not be processed.",
            ErrorKind::Network => "A network problem interrupted the request. Please retry.",
            ErrorKind::Timeout => "The request took too long and was stopped.",
            ErrorKind::Recitation => "The response was blocked for quoting protected material.",
            ErrorKind::TokenLimit => "The conversation is too long for this model.",
            ErrorKind::Generic => "Something went wrong while generating a response.",
        }
    }

    /// Convenience constructor for model-unavailable with the default
    /// (retryable) disposition.
    pub fn model_unavailable(message: impl Into<String>) -> Self {
        Self::ModelUnavailable {
            message: message.into(),
            retryable: true,
        }
    }
}

impl From<reqwest::Error> for GeminiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() || err.is_request() {
            Self::Network(err.to_string())
        } else {
            super::classify::classify(&err.to_string())
        }
    }
}

impl From<serde_json::Error> for GeminiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Generic(format!("JSON error: {err}"))
    }
}
