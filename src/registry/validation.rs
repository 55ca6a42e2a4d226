//! Argument validation against declared parameter schemas.
//!
//! Validation walks the full schema (objects, arrays, enums, required
//! fields) via a compiled `jsonschema` validator and fails closed: every
//! violation is collected, not just the first, so the caller can show the
//! complete list.

use crate::error::GeminiError;

/// Outcome of validating arguments against a declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub valid: bool,
    /// One entry per violation, each naming the offending location.
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    pub fn failed(errors: Vec<String>) -> Self {
        Self {
            valid: false,
            errors,
        }
    }

    /// All violations joined for user-facing display.
    pub fn display_message(&self) -> String {
        self.errors.join("; ")
    }
}

/// Compile a parameter schema. A schema that does not compile is a
/// registration-time validation error, not a runtime surprise.
pub fn compile_schema(schema: &serde_json::Value) -> Result<jsonschema::Validator, GeminiError> {
    jsonschema::validator_for(schema)
        .map_err(|e| GeminiError::Validation(format!("invalid parameter schema: {e}")))
}

/// Validate `args` against a compiled schema, collecting every violation.
pub fn validate_args(validator: &jsonschema::Validator, args: &serde_json::Value) -> ValidationResult {
    let errors: Vec<String> = validator
        .iter_errors(args)
        .map(|err| {
            let path = err.instance_path.to_string();
            if path.is_empty() {
                err.to_string()
            } else {
                format!("{}: {}", path.trim_start_matches('/'), err)
            }
        })
        .collect();

    if errors.is_empty() {
        ValidationResult::ok()
    } else {
        ValidationResult::failed(errors)
    }
}
