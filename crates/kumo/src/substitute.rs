//! `{{ name }}` placeholder substitution in literal strings.

use crate::context::{parse_reference, ParameterContext};
use crate::error::{Result, TemplateError};
use indexmap::IndexMap;
use kumo_ast::Value;
use std::convert::Infallible;

pub const OPEN: &str = "{{";
pub const CLOSE: &str = "}}";

/// Substitute placeholders leniently: missing parameters render as the empty
/// string. This never fails.
pub fn substitute(text: &str, params: &ParameterContext) -> String {
    match render::<Infallible>(text, params, |_| Ok(())) {
        Ok(output) => output,
        Err(never) => match never {},
    }
}

/// Placeholder substitution with a configurable policy for missing
/// parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Substitutor {
    strict: bool,
}

impl Substitutor {
    pub fn new(strict: bool) -> Self {
        Self { strict }
    }

    /// Replace every placeholder in `text` in one pass. Text outside
    /// placeholders, including an unterminated `{{`, is copied verbatim.
    pub fn substitute(&self, text: &str, params: &ParameterContext) -> Result<String> {
        if !text.contains(OPEN) {
            return Ok(text.to_string());
        }
        render(text, params, |reference| self.missing(reference))
    }

    /// Substitute inside a parameter value bound by an `$include`.
    ///
    /// A string that is exactly one placeholder binds the referenced value
    /// itself, keeping its type; other strings are substituted as text.
    /// Sequences and mappings are processed element by element.
    pub fn substitute_value(&self, value: &Value, params: &ParameterContext) -> Result<Value> {
        match value {
            Value::String(text) => match sole_placeholder(text) {
                Some(reference) => match params.lookup(reference) {
                    Some(found) => Ok(found.clone()),
                    None => self.missing(reference).map(|_| Value::Null),
                },
                None => self.substitute(text, params).map(Value::String),
            },
            Value::Array(items) => items
                .iter()
                .map(|item| self.substitute_value(item, params))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Value::Object(entries) => entries
                .iter()
                .map(|(k, v)| Ok((k.clone(), self.substitute_value(v, params)?)))
                .collect::<Result<IndexMap<_, _>>>()
                .map(Value::Object),
            other => Ok(other.clone()),
        }
    }

    /// Build the context for an included document from its `params` block,
    /// resolving each value against the including document's context.
    pub fn bind(
        &self,
        raw: &IndexMap<String, Value>,
        outer: &ParameterContext,
    ) -> Result<ParameterContext> {
        raw.iter()
            .map(|(name, value)| Ok((name.clone(), self.substitute_value(value, outer)?)))
            .collect()
    }

    fn missing(&self, reference: &str) -> Result<()> {
        if self.strict {
            Err(TemplateError::UndefinedParameter {
                name: reference.trim().to_string(),
            })
        } else {
            Ok(())
        }
    }
}

/// One pass over `text`; `on_missing` decides what an unresolved reference
/// does. Resolved values are never rescanned.
fn render<E>(
    text: &str,
    params: &ParameterContext,
    mut on_missing: impl FnMut(&str) -> std::result::Result<(), E>,
) -> std::result::Result<String, E> {
    let mut output = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(OPEN) {
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            break;
        };

        output.push_str(&rest[..start]);
        let reference = &after_open[..end];
        match params.lookup(reference) {
            Some(value) => output.push_str(&value.stringify()),
            None => on_missing(reference)?,
        }
        rest = &after_open[end + CLOSE.len()..];
    }
    output.push_str(rest);
    Ok(output)
}

/// The reference inside `text` when `text` is a single placeholder and
/// nothing else (surrounding whitespace allowed).
pub(crate) fn sole_placeholder(text: &str) -> Option<&str> {
    let inner = text
        .trim()
        .strip_prefix(OPEN)?
        .strip_suffix(CLOSE)?;
    if inner.contains(OPEN) || inner.contains(CLOSE) {
        return None;
    }
    parse_reference(inner).map(|_| inner.trim())
}
