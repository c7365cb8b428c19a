//! Kumo - template expansion for declarative UI documents
//!
//! Kumo takes a component document (YAML or JSON) and expands its directives
//! into a plain component tree:
//! - `$include` inlines another document with its own parameters
//! - `$if` keeps a block only when its condition holds
//! - `{{ name }}` placeholders in string fields are replaced by parameters
//!
//! Included documents are parsed once and cached, and include cycles are
//! reported instead of recursing forever.
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//!
//! let doc = r#"
//! - type: heading
//!   text: "Hello, {{ name }}!"
//! - $if:
//!     condition: admin
//!     template:
//!       - type: button
//!         label: Delete
//! "#;
//!
//! let nodes = kumo::expand(doc, "page.yaml", json!({"name": "World", "admin": false})).unwrap();
//!
//! assert_eq!(nodes.len(), 1);
//! assert_eq!(
//!     serde_json::to_value(&nodes).unwrap(),
//!     json!([{"type": "heading", "text": "Hello, World!", "level": 1}]),
//! );
//! ```

// Public modules
pub mod condition;
pub mod config;
pub mod context;
pub mod cycle;
pub mod error;
pub mod expander;
pub mod substitute;
pub mod template_cache;
pub mod template_loader;

pub use config::ExpanderConfig;
pub use context::ParameterContext;
pub use error::{ConfigError, Result, TemplateError, TemplateErrorKind};
pub use expander::{CancellationToken, Expander};
pub use kumo_ast::{Component, ComponentNode, ParseError, Value};
pub use template_cache::{CacheStats, TemplateCache};

use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Expansion engine owning a template cache, for hosts that expand many
/// documents.
#[derive(Debug)]
pub struct Engine {
    config: ExpanderConfig,
    expander: Expander,
}

impl Engine {
    /// Create an engine with its own cache.
    ///
    /// # Example
    ///
    /// ```rust
    /// use kumo::{Engine, ExpanderConfig, ParameterContext};
    ///
    /// let engine = Engine::new(ExpanderConfig::default()).unwrap();
    /// let nodes = engine
    ///     .expand("- type: divider", "page.yaml", &ParameterContext::new())
    ///     .unwrap();
    /// assert_eq!(nodes.len(), 1);
    /// ```
    pub fn new(config: ExpanderConfig) -> Result<Self> {
        let cache = Arc::new(TemplateCache::from_config(&config));
        Self::with_cache(config, cache)
    }

    /// Create an engine sharing an existing cache.
    pub fn with_cache(config: ExpanderConfig, cache: Arc<TemplateCache>) -> Result<Self> {
        let expander = Expander::new(cache, &config)?;
        Ok(Self { config, expander })
    }

    /// Expand `text`, the content of the document at `base_path`.
    pub fn expand(
        &self,
        text: &str,
        base_path: impl AsRef<Path>,
        params: &ParameterContext,
    ) -> Result<Vec<ComponentNode>> {
        self.expander.expand(text, base_path.as_ref(), params)
    }

    /// Like [`Engine::expand`], taking parameters as a JSON object.
    pub fn expand_json(
        &self,
        text: &str,
        base_path: impl AsRef<Path>,
        params: serde_json::Value,
    ) -> Result<Vec<ComponentNode>> {
        let params = ParameterContext::from_json(params)?;
        self.expand(text, base_path, &params)
    }

    pub fn expand_with_cancel(
        &self,
        text: &str,
        base_path: impl AsRef<Path>,
        params: &ParameterContext,
        cancel: &CancellationToken,
    ) -> Result<Vec<ComponentNode>> {
        self.expander
            .expand_with_cancel(text, base_path.as_ref(), params, cancel)
    }

    /// Read the document at `path` and expand it.
    pub fn expand_file(
        &self,
        path: impl AsRef<Path>,
        params: &ParameterContext,
    ) -> Result<Vec<ComponentNode>> {
        let path = path.as_ref();
        let (nodes, _) = template_loader::load_document(path)?;
        self.expander.expand_tree(&nodes, path, params, None)
    }

    /// Drop the cached tree for `file_path`, typically after the file was
    /// edited. Returns whether an entry was removed.
    pub fn invalidate_template_cache(&self, file_path: impl AsRef<Path>) -> bool {
        self.expander.cache().invalidate(file_path.as_ref())
    }

    pub fn clear_cache(&self) {
        self.expander.cache().clear();
    }

    /// Dry run reporting the first include cycle reachable from `text`
    /// (empty when there is none). Never fails.
    pub fn detect_circular_references(
        &self,
        text: &str,
        base_path: impl AsRef<Path>,
    ) -> Vec<PathBuf> {
        self.expander
            .detect_circular_references(text, base_path.as_ref())
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.expander.cache().stats()
    }

    pub fn cache(&self) -> &Arc<TemplateCache> {
        self.expander.cache()
    }

    pub fn config(&self) -> &ExpanderConfig {
        &self.config
    }
}

/// Convenience function: expand one document without keeping a cache
///
/// # Example
///
/// ```rust
/// use serde_json::json;
///
/// let nodes = kumo::expand(
///     "- type: text\n  content: \"{{ count }} items\"",
///     "page.yaml",
///     json!({"count": 3}),
/// ).unwrap();
///
/// assert_eq!(
///     serde_json::to_value(&nodes).unwrap(),
///     json!([{"type": "text", "content": "3 items"}]),
/// );
/// ```
pub fn expand(
    text: &str,
    base_path: impl AsRef<Path>,
    params: serde_json::Value,
) -> Result<Vec<ComponentNode>> {
    Engine::new(ExpanderConfig::default().without_cache())?.expand_json(text, base_path, params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    #[test]
    fn test_engine_reuse() {
        let engine = Engine::new(ExpanderConfig::default()).unwrap();
        let doc = "- type: text\n  content: \"Hello, {{ name }}!\"";

        let first = engine.expand_json(doc, "page.yaml", json!({"name": "Alice"})).unwrap();
        let second = engine.expand_json(doc, "page.yaml", json!({"name": "Bob"})).unwrap();

        assert_eq!(
            serde_json::to_value(&first).unwrap(),
            json!([{"type": "text", "content": "Hello, Alice!"}])
        );
        assert_eq!(
            serde_json::to_value(&second).unwrap(),
            json!([{"type": "text", "content": "Hello, Bob!"}])
        );
    }

    #[test]
    fn test_expand_file_uses_file_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("pages")).unwrap();
        fs::write(dir.path().join("pages/home.yaml"), "- $include: part.yaml\n").unwrap();
        fs::write(dir.path().join("pages/part.yaml"), "- type: divider\n").unwrap();

        let engine = Engine::new(ExpanderConfig::default()).unwrap();
        let nodes = engine
            .expand_file(dir.path().join("pages/home.yaml"), &ParameterContext::new())
            .unwrap();
        assert_eq!(serde_json::to_value(&nodes).unwrap(), json!([{"type": "divider"}]));
        assert_eq!(engine.cache_stats().entries, 1);
    }

    #[test]
    fn test_expand_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::new(ExpanderConfig::default()).unwrap();
        let result = engine.expand_file(dir.path().join("nope.yaml"), &ParameterContext::new());
        assert_eq!(result.unwrap_err().kind(), TemplateErrorKind::TemplateNotFound);
    }

    #[test]
    fn test_expand_json_rejects_non_object_params() {
        let result = expand("[]", "page.yaml", json!([1, 2]));
        assert_eq!(result.unwrap_err().kind(), TemplateErrorKind::InvalidParameters);
    }

    #[test]
    fn test_root_parse_error() {
        let result = expand("- type: [", "page.yaml", json!({}));
        match result {
            Err(TemplateError::Parse { path: None, .. }) => {}
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_shared_cache_between_engines() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("part.yaml"), "- type: divider\n").unwrap();
        let cache = Arc::new(TemplateCache::new(None));
        let strict = Engine::with_cache(
            ExpanderConfig::default().with_strict_parameters(true),
            Arc::clone(&cache),
        )
        .unwrap();
        let lenient = Engine::with_cache(ExpanderConfig::default(), Arc::clone(&cache)).unwrap();

        let base = dir.path().join("page.yaml");
        strict
            .expand("- $include: part.yaml", &base, &ParameterContext::new())
            .unwrap();
        lenient
            .expand("- $include: part.yaml", &base, &ParameterContext::new())
            .unwrap();

        assert_eq!(cache.stats().misses, 1);
        assert_eq!(cache.stats().hits, 1);
        assert!(strict.config().strict_parameters);
    }
}
