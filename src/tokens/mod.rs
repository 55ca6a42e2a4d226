//! Approximate token accounting.
//!
//! Uses a fixed 4-chars-per-token ratio instead of the provider tokenizer.
//! The estimate feeds soft budget checks only, never pricing or hard
//! truncation points that would need model-exact counts.

use crate::types::{ContentPart, ConversationTurn};

/// Fixed characters-per-token ratio.
pub const CHARS_PER_TOKEN: usize = 4;

/// Flat per-part token surcharges for attached media.
pub const IMAGE_TOKENS: u64 = 258;
pub const VIDEO_TOKENS: u64 = 4800;
pub const AUDIO_TOKENS: u64 = 1920;
pub const DOCUMENT_TOKENS: u64 = 1024;

/// Result of a conversation-wide budget check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenCheck {
    pub within_limit: bool,
    pub estimated_total: u64,
}

/// Estimate the token count of `text`: ceil(chars / 4).
///
/// Counts Unicode scalar values, not bytes, so multi-byte text does not
/// inflate the estimate.
pub fn estimate(text: &str) -> u64 {
    let chars = text.chars().count();
    (chars as u64).div_ceil(CHARS_PER_TOKEN as u64)
}

/// Truncate `text` so that `estimate(result) <= max_tokens`.
///
/// Cuts at the nearest token-multiple of characters; operating on `char`
/// boundaries guarantees no multi-byte code point is ever split.
pub fn truncate_to_limit(text: &str, max_tokens: u64) -> String {
    let max_chars = (max_tokens as usize).saturating_mul(CHARS_PER_TOKEN);
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}

/// Estimated token cost of one content part.
pub fn estimate_part(part: &ContentPart) -> u64 {
    match part {
        ContentPart::Text { text } => estimate(text),
        ContentPart::Image { .. } => IMAGE_TOKENS,
        ContentPart::Video { .. } => VIDEO_TOKENS,
        ContentPart::Audio { .. } => AUDIO_TOKENS,
        ContentPart::Document { .. } => DOCUMENT_TOKENS,
    }
}

/// Sum per-turn estimates (text plus media surcharges) against a model's
/// context budget.
pub fn check_limits(turns: &[ConversationTurn], model_max: u64) -> TokenCheck {
    let estimated_total: u64 = turns
        .iter()
        .flat_map(|turn| turn.parts.iter())
        .map(estimate_part)
        .sum();
    TokenCheck {
        within_limit: estimated_total <= model_max,
        estimated_total,
    }
}
