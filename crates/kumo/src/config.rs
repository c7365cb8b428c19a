//! Expander configuration.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_NAME: &str = "kumo.config.json";

pub const DEFAULT_CACHE_TTL_MS: u64 = 30_000;

pub const DEFAULT_MAX_INCLUDE_DEPTH: usize = 64;

/// Engine configuration, usually read from `kumo.config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpanderConfig {
    /// Cache entry lifetime in milliseconds; `null` keeps entries until
    /// they are invalidated.
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: Option<u64>,

    #[serde(default = "default_true")]
    pub cache_enabled: bool,

    /// Maximum number of nested include frames.
    #[serde(default = "default_max_include_depth")]
    pub max_include_depth: usize,

    /// Fail on placeholders that reference missing parameters instead of
    /// rendering them empty.
    #[serde(default)]
    pub strict_parameters: bool,

    /// Includes must resolve inside this directory when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_root: Option<PathBuf>,
}

fn default_cache_ttl_ms() -> Option<u64> {
    Some(DEFAULT_CACHE_TTL_MS)
}

fn default_true() -> bool {
    true
}

fn default_max_include_depth() -> usize {
    DEFAULT_MAX_INCLUDE_DEPTH
}

impl ExpanderConfig {
    /// Load config from a directory, falling back to defaults when the file
    /// does not exist.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config_path = dir.as_ref().join(DEFAULT_CONFIG_NAME);

        if config_path.exists() {
            let content =
                std::fs::read_to_string(&config_path).map_err(|source| ConfigError::Io {
                    path: config_path.clone(),
                    source,
                })?;
            Self::from_json_str(&content)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl_ms.map(Duration::from_millis)
    }

    pub fn with_cache_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.cache_ttl_ms = ttl.map(|d| d.as_millis() as u64);
        self
    }

    pub fn with_strict_parameters(mut self, strict: bool) -> Self {
        self.strict_parameters = strict;
        self
    }

    pub fn with_include_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.include_root = Some(root.into());
        self
    }

    pub fn with_max_include_depth(mut self, depth: usize) -> Self {
        self.max_include_depth = depth;
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.cache_enabled = false;
        self
    }
}

impl Default for ExpanderConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: default_cache_ttl_ms(),
            cache_enabled: true,
            max_include_depth: DEFAULT_MAX_INCLUDE_DEPTH,
            strict_parameters: false,
            include_root: None,
        }
    }
}
