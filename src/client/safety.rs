//! Input-safety pass: PII redaction and prompt-injection screening.
//!
//! Runs over user-authored text before anything reaches the provider.
//! Redaction is best-effort pattern matching; injection screening is a
//! weighted marker heuristic with a fixed rejection threshold.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::GeminiError;

/// Injection confidence at or above this rejects the turn.
pub const INJECTION_THRESHOLD: f32 = 0.7;

/// Replacement inserted for each redacted span.
const REDACTED: &str = "[redacted]";

fn pii_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // Email addresses.
            r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}",
            // US-style SSNs.
            r"\b\d{3}-\d{2}-\d{4}\b",
            // 13-16 digit card numbers, with or without separators.
            r"\b\d{4}[ -]?\d{4}[ -]?\d{4}[ -]?\d{1,4}\b",
            // Phone numbers with optional country code.
            r"(?:\+\d{1,3}[ -]?)?\(?\d{3}\)?[ -]?\d{3}[ -]?\d{4}\b",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("static PII pattern"))
        .collect()
    })
}

struct InjectionMarker {
    pattern: &'static str,
    weight: f32,
}

const INJECTION_MARKERS: &[InjectionMarker] = &[
    InjectionMarker { pattern: "ignore previous instructions", weight: 0.9 },
    InjectionMarker { pattern: "ignore all previous instructions", weight: 0.9 },
    InjectionMarker { pattern: "disregard the above", weight: 0.8 },
    InjectionMarker { pattern: "disregard all prior", weight: 0.8 },
    InjectionMarker { pattern: "you are now", weight: 0.4 },
    InjectionMarker { pattern: "system prompt", weight: 0.5 },
    InjectionMarker { pattern: "reveal your instructions", weight: 0.8 },
    InjectionMarker { pattern: "print your instructions", weight: 0.8 },
    InjectionMarker { pattern: "developer mode", weight: 0.5 },
    InjectionMarker { pattern: "jailbreak", weight: 0.6 },
];

/// Redact detectable PII patterns. Returns the redacted text and the number
/// of spans replaced.
pub fn redact_pii(text: &str) -> (String, usize) {
    let mut redacted = text.to_string();
    let mut count = 0usize;
    for pattern in pii_patterns() {
        let matches = pattern.find_iter(&redacted).count();
        if matches > 0 {
            redacted = pattern.replace_all(&redacted, REDACTED).into_owned();
            count += matches;
        }
    }
    (redacted, count)
}

/// Confidence in `[0, 1]` that the text is a prompt-injection attempt.
///
/// Markers accumulate; two weak markers together can cross the threshold.
pub fn injection_confidence(text: &str) -> f32 {
    let lower = text.to_lowercase();
    let mut confidence: f32 = 0.0;
    for marker in INJECTION_MARKERS {
        if lower.contains(marker.pattern) {
            confidence += marker.weight * (1.0 - confidence);
        }
    }
    confidence.min(1.0)
}

/// Run the full safety pass over one piece of user text.
///
/// Rejects with a Validation error when injection confidence reaches the
/// threshold; otherwise returns the PII-redacted text.
pub fn screen_input(text: &str) -> Result<String, GeminiError> {
    let confidence = injection_confidence(text);
    if confidence >= INJECTION_THRESHOLD {
        tracing::warn!(confidence, "rejected input with prompt-injection markers");
        return Err(GeminiError::Validation(format!(
            "input rejected: prompt-injection confidence {confidence:.2} exceeds threshold"
        )));
    }
    let (redacted, count) = redact_pii(text);
    if count > 0 {
        tracing::debug!(spans = count, "redacted PII spans from user input");
    }
    Ok(redacted)
}
