//! Function-call registry.
//!
//! Maps tool names to declarations, handlers and execution limits. The
//! registry is built once by the composition root (built-ins first, then
//! domain tools) and is read-only afterwards; callers hold it behind an
//! `Arc` and never mutate it mid-flight.

mod builtins;
mod validation;

pub use builtins::register_builtins;
pub use validation::{ValidationResult, compile_schema, validate_args};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::GeminiError;
use crate::types::FunctionDeclaration;

/// Default per-call execution ceiling.
pub const DEFAULT_MAX_EXECUTION_TIME: Duration = Duration::from_secs(10);

/// Implemented by anything callable through the registry.
#[async_trait]
pub trait FunctionHandler: Send + Sync {
    async fn call(&self, args: Value) -> Result<Value, GeminiError>;
}

/// A declaration paired with its handler and execution limits.
#[derive(Clone)]
pub struct RegisteredFunction {
    pub declaration: FunctionDeclaration,
    pub handler: Arc<dyn FunctionHandler>,
    /// Skip schema validation only for tools that validate internally.
    pub requires_validation: bool,
    pub max_execution_time: Duration,
}

impl RegisteredFunction {
    pub fn new(declaration: FunctionDeclaration, handler: Arc<dyn FunctionHandler>) -> Self {
        Self {
            declaration,
            handler,
            requires_validation: true,
            max_execution_time: DEFAULT_MAX_EXECUTION_TIME,
        }
    }

    pub fn with_max_execution_time(mut self, limit: Duration) -> Self {
        self.max_execution_time = limit;
        self
    }

    pub fn without_validation(mut self) -> Self {
        self.requires_validation = false;
        self
    }
}

impl std::fmt::Debug for RegisteredFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredFunction")
            .field("name", &self.declaration.name)
            .field("requires_validation", &self.requires_validation)
            .field("max_execution_time", &self.max_execution_time)
            .finish()
    }
}

/// Result of one tool execution.
///
/// Failures (including timeouts) are packaged as an outcome, never thrown,
/// so the caller's turn can continue with partial tool results.
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionOutcome {
    Success(Value),
    Error(String),
}

struct RegistryEntry {
    function: RegisteredFunction,
    validator: Option<jsonschema::Validator>,
}

/// Name → function mapping, immutable after init.
#[derive(Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, RegistryEntry>,
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.list().iter().map(|d| &d.name).collect::<Vec<_>>())
            .finish()
    }
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in tools.
    pub fn with_builtins() -> Result<Self, GeminiError> {
        let mut registry = Self::new();
        register_builtins(&mut registry)?;
        Ok(registry)
    }

    /// Register a function. Fails on duplicate names and on schemas that do
    /// not compile; both are bootstrap bugs and surface immediately.
    pub fn register(&mut self, function: RegisteredFunction) -> Result<(), GeminiError> {
        let name = function.declaration.name.clone();
        if self.functions.contains_key(&name) {
            return Err(GeminiError::Validation(format!(
                "function '{name}' is already registered"
            )));
        }
        let validator = if function.requires_validation {
            Some(compile_schema(&function.declaration.parameters)?)
        } else {
            None
        };
        self.functions.insert(name, RegistryEntry { function, validator });
        Ok(())
    }

    /// Declarations of every registered function, for the model request.
    pub fn list(&self) -> Vec<&FunctionDeclaration> {
        let mut declarations: Vec<_> = self
            .functions
            .values()
            .map(|entry| &entry.function.declaration)
            .collect();
        declarations.sort_by(|a, b| a.name.cmp(&b.name));
        declarations
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Validate `args` against the declared schema for `name`.
    pub fn validate(&self, name: &str, args: &Value) -> ValidationResult {
        let Some(entry) = self.functions.get(name) else {
            return ValidationResult::failed(vec![format!("unknown function '{name}'")]);
        };
        match &entry.validator {
            Some(validator) => validate_args(validator, args),
            None => ValidationResult::ok(),
        }
    }

    /// Execute a function with validation and the per-call timeout.
    ///
    /// A timeout races the handler against `max_execution_time`; losing the
    /// race is reported as an error outcome so the agentic round can close
    /// with partial results.
    pub async fn execute(&self, name: &str, args: Value) -> FunctionOutcome {
        let Some(entry) = self.functions.get(name) else {
            return FunctionOutcome::Error(format!("unknown function '{name}'"));
        };

        if entry.function.requires_validation {
            let result = self.validate(name, &args);
            if !result.valid {
                return FunctionOutcome::Error(format!(
                    "invalid arguments for '{name}': {}",
                    result.display_message()
                ));
            }
        }

        let limit = entry.function.max_execution_time;
        match tokio::time::timeout(limit, entry.function.handler.call(args)).await {
            Ok(Ok(value)) => FunctionOutcome::Success(value),
            Ok(Err(error)) => {
                tracing::warn!(function = name, %error, "function handler failed");
                FunctionOutcome::Error(error.to_string())
            }
            Err(_) => {
                tracing::warn!(
                    function = name,
                    limit_ms = limit.as_millis() as u64,
                    "function execution timed out"
                );
                FunctionOutcome::Error(format!(
                    "'{name}' timed out after {}ms",
                    limit.as_millis()
                ))
            }
        }
    }
}
