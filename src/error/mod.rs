//! Error handling module.
//!
//! Provides the typed error taxonomy (`GeminiError`, `ErrorKind`) and the
//! heuristic classifier that turns raw transport/provider failures into it.
//!
//! # Example
//!
//! ```rust
//! use wonton::error::{classify, ErrorKind};
//!
//! let e = classify("429 Too Many Requests, retry in 3s");
//! assert_eq!(e.kind(), ErrorKind::RateLimit);
//! assert!(e.is_retryable());
//! ```

pub mod classify;
mod types;

pub use classify::{classify, from_status, is_retryable_message};
pub use types::{ErrorKind, GeminiError};

impl GeminiError {
    /// Re-run classification on an error that may still be untyped.
    ///
    /// Identity for every typed kind; only `Generic` messages get another
    /// pass through the substring chain, so the operation is idempotent.
    pub fn into_classified(self) -> Self {
        match self {
            Self::Generic(msg) => classify::classify(&msg),
            other => other,
        }
    }
}
