//! Heuristic error classification.
//!
//! Raw failures from the transport or provider SDK arrive as freeform
//! strings. `classify` maps them onto the typed taxonomy by case-insensitive
//! substring matching in a fixed priority order. The heuristic is brittle by
//! nature, so the HTTP boundary prefers `from_status` (structured codes) and
//! only falls back to the substring chain for message bodies.

use std::sync::OnceLock;

use regex::Regex;

use super::types::GeminiError;

/// Classify a raw error message into a typed error.
///
/// Total function: never fails, always returns a kind with a fixed
/// retryability flag. Priority order: safety, rate-limit, quota, auth,
/// timeout, recitation, network, token-limit, then generic.
pub fn classify(raw: &str) -> GeminiError {
    let lower = raw.to_lowercase();

    if contains_any(&lower, &["safety", "blocked_reason", "harm_category", "harassment"]) {
        return GeminiError::Safety(raw.to_string());
    }
    if contains_any(&lower, &["rate limit", "rate-limit", "429", "resource_exhausted", "too many requests"]) {
        return GeminiError::RateLimit {
            message: raw.to_string(),
            retry_after_ms: extract_retry_after_ms(&lower),
        };
    }
    if contains_any(&lower, &["quota", "billing", "exceeded your current"]) {
        return GeminiError::Quota(raw.to_string());
    }
    if contains_any(&lower, &["api key", "api_key", "unauthorized", "unauthenticated", "permission denied", "401", "403"]) {
        return GeminiError::Auth(raw.to_string());
    }
    if contains_any(&lower, &["timeout", "timed out", "deadline exceeded", "deadline_exceeded"]) {
        return GeminiError::Timeout(raw.to_string());
    }
    if contains_any(&lower, &["recitation"]) {
        return GeminiError::Recitation(raw.to_string());
    }
    if contains_any(&lower, &["network", "connection", "dns", "socket", "fetch failed", "econnreset", "broken pipe"]) {
        return GeminiError::Network(raw.to_string());
    }
    if contains_any(&lower, &["token limit", "context length", "context window", "input token count", "max_tokens"]) {
        return GeminiError::TokenLimit {
            message: raw.to_string(),
            token_count: extract_token_count(&lower),
        };
    }
    // Overload markers are not part of the fixed chain above; they map to the
    // retryable model-unavailable kind before we give up and go generic.
    if contains_any(&lower, &["overloaded", "unavailable", "503"]) {
        return GeminiError::model_unavailable(raw);
    }

    GeminiError::Generic(raw.to_string())
}

/// Classify an HTTP status plus response body. Structured codes win over
/// substring heuristics; unknown statuses fall back to `classify`.
pub fn from_status(status: u16, body: &str) -> GeminiError {
    match status {
        400 => {
            // 400 is used for both bad requests and oversized contexts.
            let lower = body.to_lowercase();
            if lower.contains("token") && lower.contains("exceed") {
                GeminiError::TokenLimit {
                    message: body.to_string(),
                    token_count: extract_token_count(&lower),
                }
            } else {
                GeminiError::Validation(body.to_string())
            }
        }
        401 | 403 => GeminiError::Auth(body.to_string()),
        404 => GeminiError::Validation(format!("not found: {body}")),
        408 => GeminiError::Timeout(body.to_string()),
        429 => GeminiError::RateLimit {
            message: body.to_string(),
            retry_after_ms: extract_retry_after_ms(&body.to_lowercase()),
        },
        500 | 502 | 504 => GeminiError::model_unavailable(body),
        503 => GeminiError::model_unavailable(body),
        _ => classify(body),
    }
}

/// Retryability check that also accepts untyped messages, so retry logic
/// works before classification has happened.
pub fn is_retryable_message(raw: &str) -> bool {
    classify(raw).is_retryable()
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

fn retry_after_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"retry(?:\s+in|delay[^0-9]*)\s*(\d+)\s*s").expect("static retry-after pattern")
    })
}

fn token_count_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d+)\s*tokens?").expect("static token-count pattern"))
}

/// Best-effort extraction of `retry in Ns` / `retryDelay: Ns` hints.
fn extract_retry_after_ms(lower: &str) -> Option<u64> {
    let caps = retry_after_pattern().captures(lower)?;
    caps.get(1)?.as_str().parse::<u64>().ok().map(|s| s * 1000)
}

/// Best-effort extraction of a token count from limit errors.
fn extract_token_count(lower: &str) -> Option<u64> {
    let caps = token_count_pattern().captures(lower)?;
    caps.get(1)?.as_str().parse().ok()
}
