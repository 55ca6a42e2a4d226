//! URL-context extraction and resolution.
//!
//! Literal URLs in the latest user turn are extracted, normalized and
//! deduplicated, then resolved against a content-type allow-list and a size
//! ceiling so the request can carry page content the model may cite. A URL
//! that fails resolution is skipped, never fatal.

use std::sync::OnceLock;

use regex::Regex;

use crate::client::grounding::normalize_url;
use crate::error::GeminiError;

/// Content types we are willing to inline into a request.
pub const ALLOWED_CONTENT_TYPES: &[&str] = &[
    "text/html",
    "text/plain",
    "text/markdown",
    "application/json",
    "application/pdf",
];

/// Maximum content size per resolved URL.
pub const MAX_CONTENT_BYTES: u64 = 5 * 1024 * 1024;

/// A URL whose content was fetched and admitted.
#[derive(Debug, Clone)]
pub struct ResolvedUrl {
    pub url: String,
    pub content_type: String,
    pub content: String,
}

fn url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"https?://[^\s<>"')\]]+"#).expect("static URL pattern")
    })
}

/// Extract, normalize, deduplicate and cap literal URLs from `text`.
pub fn extract_urls(text: &str, cap: usize) -> Vec<String> {
    let mut seen = Vec::new();
    for m in url_pattern().find_iter(text) {
        let normalized = normalize_url(m.as_str().trim_end_matches(['.', ',', ';']));
        if !seen.contains(&normalized) {
            seen.push(normalized);
            if seen.len() == cap {
                break;
            }
        }
    }
    seen
}

/// Resolves URL content through the shared HTTP client.
#[derive(Debug, Clone)]
pub struct UrlContextResolver {
    http: reqwest::Client,
}

impl UrlContextResolver {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Resolve one URL, enforcing the allow-list and size ceiling.
    pub async fn resolve(&self, url: &str) -> Result<ResolvedUrl, GeminiError> {
        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(GeminiError::Network(format!(
                "URL context fetch failed with status {} for {url}",
                response.status()
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_lowercase())
            .unwrap_or_default();
        if !ALLOWED_CONTENT_TYPES.contains(&content_type.as_str()) {
            return Err(GeminiError::Validation(format!(
                "content type '{content_type}' not allowed for URL context"
            )));
        }

        if let Some(length) = response.content_length() {
            if length > MAX_CONTENT_BYTES {
                return Err(GeminiError::Validation(format!(
                    "content length {length} exceeds URL context limit"
                )));
            }
        }

        // The declared length is advisory; the read itself enforces the cap.
        let content = collect_body(response, MAX_CONTENT_BYTES).await?;

        Ok(ResolvedUrl {
            url: url.to_string(),
            content_type,
            content,
        })
    }

    /// Resolve a batch of URLs, skipping failures.
    pub async fn resolve_all(&self, urls: &[String]) -> Vec<ResolvedUrl> {
        let mut resolved = Vec::new();
        for url in urls {
            match self.resolve(url).await {
                Ok(doc) => resolved.push(doc),
                Err(error) => {
                    tracing::debug!(url, %error, "skipping unresolvable context URL");
                }
            }
        }
        resolved
    }
}

/// Read a response body chunk by chunk, failing as soon as the running total
/// crosses `cap`. Nothing beyond the cap is buffered.
async fn collect_body(mut response: reqwest::Response, cap: u64) -> Result<String, GeminiError> {
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        if (body.len() + chunk.len()) as u64 > cap {
            return Err(GeminiError::Validation(
                "content exceeds URL context limit".into(),
            ));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(String::from_utf8_lossy(&body).into_owned())
}
