//! Parameter context for placeholder and condition resolution.

use crate::error::{Result, TemplateError};
use indexmap::IndexMap;
use kumo_ast::Value;
use serde::{Deserialize, Serialize};

/// Named values visible to one expansion frame.
///
/// A context is never modified once built. Each `$include` gets a fresh
/// context made from its own `params` block, so nothing leaks from the
/// including document unless it is forwarded explicitly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterContext {
    params: IndexMap<String, Value>,
}

impl ParameterContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from a JSON object (or `null` for an empty context).
    pub fn from_json(json: serde_json::Value) -> Result<Self> {
        match Value::from_json(json) {
            Value::Object(params) => Ok(Self { params }),
            Value::Null => Ok(Self::new()),
            other => Err(TemplateError::InvalidParameters {
                found: other.type_name(),
            }),
        }
    }

    /// Return a copy of this context with `name` bound to `value`.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    /// Resolve path segments, e.g. `["user", "profile", "name"]`.
    pub fn resolve<S: AsRef<str>>(&self, path: &[S]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut value = self.params.get(first.as_ref())?;
        for segment in rest {
            value = value.get(segment.as_ref())?;
        }
        Some(value)
    }

    /// Resolve a dotted reference such as `user.profile.name`.
    ///
    /// Returns `None` both for missing parameters and for text that is not a
    /// valid reference.
    pub fn lookup(&self, reference: &str) -> Option<&Value> {
        let segments = parse_reference(reference)?;
        self.resolve(segments.as_slice())
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.params.iter()
    }
}

impl FromIterator<(String, Value)> for ParameterContext {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            params: iter.into_iter().collect(),
        }
    }
}

/// Split a dotted parameter reference into its segments.
///
/// Returns `None` unless every segment is non-empty and made of ASCII
/// letters, digits, `_` or `-`, and the first segment does not start with a
/// digit.
pub fn parse_reference(reference: &str) -> Option<Vec<&str>> {
    let reference = reference.trim();
    if reference.is_empty() {
        return None;
    }

    let segments: Vec<&str> = reference.split('.').collect();
    if !segments.iter().all(|s| is_valid_segment(s)) {
        return None;
    }
    if segments[0].starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    Some(segments)
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn create_test_context() -> ParameterContext {
        ParameterContext::from_json(json!({
            "name": "Alice",
            "user": {"email": "alice@example.com", "roles": ["admin", "editor"]}
        }))
        .unwrap()
    }

    #[test]
    fn test_resolve_simple() {
        let ctx = create_test_context();
        assert_eq!(ctx.lookup("name"), Some(&Value::String("Alice".to_string())));
    }

    #[test]
    fn test_resolve_path() {
        let ctx = create_test_context();
        assert_eq!(
            ctx.lookup("user.email"),
            Some(&Value::String("alice@example.com".to_string()))
        );
        assert_eq!(
            ctx.resolve(&["user", "roles", "1"]),
            Some(&Value::String("editor".to_string()))
        );
    }

    #[test]
    fn test_missing_is_none() {
        let ctx = create_test_context();
        assert_eq!(ctx.lookup("unknown"), None);
        assert_eq!(ctx.lookup("name.first"), None);
        assert_eq!(ctx.lookup("user.roles.9"), None);
    }

    #[test]
    fn test_invalid_reference_is_none() {
        let ctx = create_test_context();
        assert_eq!(ctx.lookup("user..email"), None);
        assert_eq!(ctx.lookup("a b"), None);
        assert_eq!(ctx.lookup(""), None);
    }

    #[test]
    fn test_parse_reference() {
        assert_eq!(parse_reference(" user.name "), Some(vec!["user", "name"]));
        assert_eq!(parse_reference("items.0.id"), Some(vec!["items", "0", "id"]));
        assert_eq!(parse_reference("is-enabled"), Some(vec!["is-enabled"]));
        assert_eq!(parse_reference("0.name"), None);
        assert_eq!(parse_reference("user."), None);
        assert_eq!(parse_reference("a == b"), None);
    }

    #[test]
    fn test_from_json_rejects_non_object() {
        let result = ParameterContext::from_json(json!(["a"]));
        assert!(matches!(
            result,
            Err(TemplateError::InvalidParameters { found: "sequence" })
        ));
        assert!(ParameterContext::from_json(json!(null)).unwrap().is_empty());
    }

    #[test]
    fn test_with_preserves_insertion_order() {
        let ctx = ParameterContext::new()
            .with("b", 1i64)
            .with("a", true)
            .with("c", "x");
        let names: Vec<&str> = ctx.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }
}
