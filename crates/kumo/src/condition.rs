//! Condition evaluation for `$if` directives.
//!
//! A condition is either the literal `true`/`false` or a dotted parameter
//! reference, optionally wrapped in one `{{ }}` pair. References are coerced
//! by truthiness; a missing parameter counts as false.

use crate::context::{parse_reference, ParameterContext};
use crate::error::{Result, TemplateError};
use crate::substitute::{CLOSE, OPEN};

/// A parsed condition expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Literal(bool),
    Reference(Vec<String>),
}

impl Condition {
    pub fn parse(expression: &str) -> Result<Self> {
        let trimmed = expression.trim();
        match trimmed {
            "true" => return Ok(Condition::Literal(true)),
            "false" => return Ok(Condition::Literal(false)),
            _ => {}
        }

        let inner = match trimmed.strip_prefix(OPEN) {
            Some(rest) => rest.strip_suffix(CLOSE).ok_or_else(|| {
                malformed(expression, "unterminated '{{' in condition")
            })?,
            None => trimmed,
        };

        match inner.trim() {
            "true" => Ok(Condition::Literal(true)),
            "false" => Ok(Condition::Literal(false)),
            reference => parse_reference(reference)
                .map(|segments| {
                    Condition::Reference(segments.into_iter().map(str::to_string).collect())
                })
                .ok_or_else(|| {
                    malformed(
                        expression,
                        "expected 'true', 'false' or a dotted parameter reference",
                    )
                }),
        }
    }

    pub fn evaluate(&self, params: &ParameterContext) -> bool {
        match self {
            Condition::Literal(value) => *value,
            Condition::Reference(path) => params
                .resolve(path.as_slice())
                .map(|value| value.is_truthy())
                .unwrap_or(false),
        }
    }
}

/// Parse and evaluate `expression` against `params`.
pub fn evaluate(expression: &str, params: &ParameterContext) -> Result<bool> {
    Ok(Condition::parse(expression)?.evaluate(params))
}

fn malformed(expression: &str, message: &str) -> TemplateError {
    TemplateError::ConditionEvaluationError {
        expression: expression.to_string(),
        message: message.to_string(),
    }
}
