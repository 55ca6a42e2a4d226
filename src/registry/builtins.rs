//! Built-in functions registered once at process start.
//!
//! These cover the two tools every deployment gets for free: a calculator
//! for arithmetic the model should not do in-weights, and a date/time
//! utility so answers about "now" are grounded in wall-clock time.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};

use super::{FunctionHandler, FunctionRegistry, RegisteredFunction};
use crate::error::GeminiError;
use crate::types::FunctionDeclaration;

/// Register the built-in tools into `registry`.
///
/// Called exactly once from the composition root; built-ins are not
/// removable at runtime.
pub fn register_builtins(registry: &mut FunctionRegistry) -> Result<(), GeminiError> {
    registry.register(RegisteredFunction::new(
        FunctionDeclaration {
            name: "calculator".into(),
            description: "Evaluates a basic arithmetic expression (+, -, *, /, parentheses)".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "expression": {
                        "type": "string",
                        "description": "Arithmetic expression, e.g. \"(2 + 3) * 4\""
                    }
                },
                "required": ["expression"]
            }),
        },
        Arc::new(Calculator),
    ))?;

    registry.register(RegisteredFunction::new(
        FunctionDeclaration {
            name: "current_datetime".into(),
            description: "Returns the current date and time in UTC".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "format": {
                        "type": "string",
                        "enum": ["iso", "unix", "human"],
                        "description": "Output format, defaults to iso"
                    }
                }
            }),
        },
        Arc::new(CurrentDatetime),
    ))?;

    Ok(())
}

struct Calculator;

#[async_trait]
impl FunctionHandler for Calculator {
    async fn call(&self, args: Value) -> Result<Value, GeminiError> {
        let expression = args
            .get("expression")
            .and_then(Value::as_str)
            .ok_or_else(|| GeminiError::Validation("missing 'expression'".into()))?;
        let value = eval_expression(expression)?;
        Ok(json!({ "expression": expression, "value": value }))
    }
}

struct CurrentDatetime;

#[async_trait]
impl FunctionHandler for CurrentDatetime {
    async fn call(&self, args: Value) -> Result<Value, GeminiError> {
        let now = Utc::now();
        let format = args.get("format").and_then(Value::as_str).unwrap_or("iso");
        let rendered = match format {
            "unix" => json!(now.timestamp()),
            "human" => json!(now.format("%A, %B %e %Y, %H:%M UTC").to_string()),
            _ => json!(now.to_rfc3339()),
        };
        Ok(json!({ "datetime": rendered }))
    }
}

/// Evaluate `+ - * /` with parentheses and unary minus over f64.
///
/// Recursive descent; no names, no calls, so model-provided input cannot
/// reach anything but arithmetic.
fn eval_expression(input: &str) -> Result<f64, GeminiError> {
    let tokens: Vec<char> = input.chars().filter(|c| !c.is_whitespace()).collect();
    let mut parser = ExprParser { tokens, pos: 0 };
    let value = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(GeminiError::Validation(format!(
            "unexpected trailing input in expression at position {}",
            parser.pos
        )));
    }
    if !value.is_finite() {
        return Err(GeminiError::Validation(
            "expression result is not a finite number".into(),
        ));
    }
    Ok(value)
}

struct ExprParser {
    tokens: Vec<char>,
    pos: usize,
}

impl ExprParser {
    fn peek(&self) -> Option<char> {
        self.tokens.get(self.pos).copied()
    }

    fn expr(&mut self) -> Result<f64, GeminiError> {
        let mut value = self.term()?;
        while let Some(op @ ('+' | '-')) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            if op == '+' {
                value += rhs;
            } else {
                value -= rhs;
            }
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64, GeminiError> {
        let mut value = self.factor()?;
        while let Some(op @ ('*' | '/')) = self.peek() {
            self.pos += 1;
            let rhs = self.factor()?;
            if op == '*' {
                value *= rhs;
            } else {
                if rhs == 0.0 {
                    return Err(GeminiError::Validation("division by zero".into()));
                }
                value /= rhs;
            }
        }
        Ok(value)
    }

    fn factor(&mut self) -> Result<f64, GeminiError> {
        match self.peek() {
            Some('-') => {
                self.pos += 1;
                Ok(-self.factor()?)
            }
            Some('(') => {
                self.pos += 1;
                let value = self.expr()?;
                if self.peek() != Some(')') {
                    return Err(GeminiError::Validation("missing closing parenthesis".into()));
                }
                self.pos += 1;
                Ok(value)
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.number(),
            other => Err(GeminiError::Validation(format!(
                "unexpected token {other:?} in expression"
            ))),
        }
    }

    fn number(&mut self) -> Result<f64, GeminiError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '.') {
            self.pos += 1;
        }
        let text: String = self.tokens[start..self.pos].iter().collect();
        text.parse::<f64>()
            .map_err(|_| GeminiError::Validation(format!("invalid number '{text}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_with_precedence() {
        assert_eq!(eval_expression("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(eval_expression("(2 + 3) * 4").unwrap(), 20.0);
        assert_eq!(eval_expression("-3 + 10 / 4").unwrap(), -0.5);
        assert_eq!(eval_expression("1.5 * 2").unwrap(), 3.0);
    }

    #[test]
    fn malformed_expressions_are_rejected() {
        assert!(eval_expression("2 +").is_err());
        assert!(eval_expression("(1 + 2").is_err());
        assert!(eval_expression("1 / 0").is_err());
        assert!(eval_expression("import os").is_err());
        assert!(eval_expression("").is_err());
    }

    #[tokio::test]
    async fn builtins_round_trip_through_registry() {
        let registry = FunctionRegistry::with_builtins().unwrap();
        let outcome = registry
            .execute("calculator", json!({ "expression": "6 * 7" }))
            .await;
        match outcome {
            crate::registry::FunctionOutcome::Success(v) => {
                assert_eq!(v["value"], 42.0);
            }
            other => panic!("expected success, got {other:?}"),
        }

        let outcome = registry
            .execute("current_datetime", json!({ "format": "unix" }))
            .await;
        assert!(matches!(
            outcome,
            crate::registry::FunctionOutcome::Success(_)
        ));
    }
}
