//! Client configuration.

use secrecy::SecretString;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::GeminiError;

/// HTTP behavior knobs for the provider boundary.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Request timeout.
    pub timeout: Option<Duration>,
    /// Connection timeout.
    pub connect_timeout: Option<Duration>,
    /// Custom headers attached to every request.
    pub headers: HashMap<String, String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(60)),
            connect_timeout: Some(Duration::from_secs(10)),
            headers: HashMap::new(),
        }
    }
}

/// Tuning for the deep-research poll loop.
#[derive(Debug, Clone)]
pub struct ResearchConfig {
    /// Fixed base interval between polls.
    pub poll_interval: Duration,
    /// Backoff ceiling while the remote phase is unchanged.
    pub max_poll_interval: Duration,
    /// Consecutive poll failures tolerated before giving up.
    pub max_poll_failures: u32,
    /// Overall wall-clock bound for one research task.
    pub max_task_duration: Duration,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            max_poll_interval: Duration::from_secs(30),
            max_poll_failures: 5,
            // Research mode's documented upper bound is on the order of
            // tens of minutes.
            max_task_duration: Duration::from_secs(45 * 60),
        }
    }
}

/// Configuration for the orchestration core.
#[derive(Clone)]
pub struct GeminiConfig {
    /// API key for authentication (securely stored).
    pub api_key: SecretString,
    /// Base URL for the Gemini API.
    pub base_url: String,
    /// Default model to use.
    pub model: String,
    /// HTTP behavior.
    pub http: HttpConfig,
    /// Deep-research poll tuning.
    pub research: ResearchConfig,
    /// Maximum URL-context references resolved per request.
    pub max_context_urls: usize,
    /// Maximum agentic rounds (model-call / tool-result cycles) per turn.
    pub max_agentic_rounds: usize,
    /// Number of related-question suggestions derived after finalize.
    pub related_question_count: usize,
    /// Soft context budget used by the token estimator.
    pub model_max_tokens: u64,
}

impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use secrecy::ExposeSecret;
        f.debug_struct("GeminiConfig")
            .field("api_key_present", &(!self.api_key.expose_secret().is_empty()))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("http", &self.http)
            .field("research", &self.research)
            .field("max_context_urls", &self.max_context_urls)
            .field("max_agentic_rounds", &self.max_agentic_rounds)
            .finish()
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: SecretString::from(String::new()),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-2.5-flash".to_string(),
            http: HttpConfig::default(),
            research: ResearchConfig::default(),
            max_context_urls: 5,
            max_agentic_rounds: 8,
            related_question_count: 3,
            model_max_tokens: 1_000_000,
        }
    }
}

impl GeminiConfig {
    /// Create a configuration with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::from(api_key.into()),
            ..Default::default()
        }
    }

    /// Load the API key from `GEMINI_API_KEY`.
    pub fn from_env() -> Result<Self, GeminiError> {
        let key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| GeminiError::Auth("GEMINI_API_KEY is not set".into()))?;
        Ok(Self::new(key))
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_http(mut self, http: HttpConfig) -> Self {
        self.http = http;
        self
    }

    pub fn with_research(mut self, research: ResearchConfig) -> Self {
        self.research = research;
        self
    }

    /// Validate configuration before constructing the shared backend.
    pub fn validate(&self) -> Result<(), GeminiError> {
        use secrecy::ExposeSecret;
        if self.api_key.expose_secret().is_empty() {
            return Err(GeminiError::Auth("API key is empty".into()));
        }
        if self.base_url.is_empty() {
            return Err(GeminiError::Validation("base_url is empty".into()));
        }
        if self.model.is_empty() {
            return Err(GeminiError::Validation("model is empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_does_not_leak_api_key() {
        let config = GeminiConfig::new("super-secret");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("super-secret"));
    }

    #[test]
    fn validate_requires_key() {
        assert!(GeminiConfig::default().validate().is_err());
        assert!(GeminiConfig::new("k").validate().is_ok());
    }
}
