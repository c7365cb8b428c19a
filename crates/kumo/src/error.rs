//! Error types for the Kumo expansion engine.

use std::fmt;
use std::path::{Path, PathBuf};

use kumo_ast::{DirectiveKind, ParseError};
use thiserror::Error;

/// All errors that abort an expansion.
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Template not found: '{template}' (resolved to {}, included from {})", resolved.display(), included_from.display())]
    TemplateNotFound {
        template: String,
        resolved: PathBuf,
        included_from: PathBuf,
    },

    #[error("Circular reference: {}", PathChain(chain))]
    CircularReference { chain: Vec<PathBuf> },

    #[error("Invalid {directive} directive: {message}")]
    InvalidDirective {
        directive: DirectiveKind,
        message: String,
    },

    #[error("Cannot evaluate condition '{expression}': {message}")]
    ConditionEvaluationError { expression: String, message: String },

    #[error("Undefined parameter '{name}'")]
    UndefinedParameter { name: String },

    #[error("Parameters must be a mapping, got {found}")]
    InvalidParameters { found: &'static str },

    #[error("Include depth {depth} exceeds the limit of {limit}")]
    DepthLimitExceeded { depth: usize, limit: usize },

    #[error("Path traversal detected: {} is outside the include root", path.display())]
    PathTraversal { path: PathBuf },

    #[error("Expansion cancelled")]
    Cancelled,

    #[error("Failed to parse {}: {source}", DocumentName(path.as_deref()))]
    Parse {
        path: Option<PathBuf>,
        #[source]
        source: ParseError,
    },

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Discriminant of a [`TemplateError`], for hosts that map errors to
/// diagnostics without matching on payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateErrorKind {
    TemplateNotFound,
    CircularReference,
    InvalidDirective,
    ConditionEvaluationError,
    UndefinedParameter,
    InvalidParameters,
    DepthLimitExceeded,
    PathTraversal,
    Cancelled,
    Parse,
    Io,
}

impl TemplateErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateErrorKind::TemplateNotFound => "TemplateNotFound",
            TemplateErrorKind::CircularReference => "CircularReference",
            TemplateErrorKind::InvalidDirective => "InvalidDirective",
            TemplateErrorKind::ConditionEvaluationError => "ConditionEvaluationError",
            TemplateErrorKind::UndefinedParameter => "UndefinedParameter",
            TemplateErrorKind::InvalidParameters => "InvalidParameters",
            TemplateErrorKind::DepthLimitExceeded => "DepthLimitExceeded",
            TemplateErrorKind::PathTraversal => "PathTraversal",
            TemplateErrorKind::Cancelled => "Cancelled",
            TemplateErrorKind::Parse => "ParseError",
            TemplateErrorKind::Io => "IoError",
        }
    }
}

impl TemplateError {
    pub fn kind(&self) -> TemplateErrorKind {
        match self {
            TemplateError::TemplateNotFound { .. } => TemplateErrorKind::TemplateNotFound,
            TemplateError::CircularReference { .. } => TemplateErrorKind::CircularReference,
            TemplateError::InvalidDirective { .. } => TemplateErrorKind::InvalidDirective,
            TemplateError::ConditionEvaluationError { .. } => {
                TemplateErrorKind::ConditionEvaluationError
            }
            TemplateError::UndefinedParameter { .. } => TemplateErrorKind::UndefinedParameter,
            TemplateError::InvalidParameters { .. } => TemplateErrorKind::InvalidParameters,
            TemplateError::DepthLimitExceeded { .. } => TemplateErrorKind::DepthLimitExceeded,
            TemplateError::PathTraversal { .. } => TemplateErrorKind::PathTraversal,
            TemplateError::Cancelled => TemplateErrorKind::Cancelled,
            TemplateError::Parse { .. } => TemplateErrorKind::Parse,
            TemplateError::Io { .. } => TemplateErrorKind::Io,
        }
    }

    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        TemplateError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Errors raised while loading an [`ExpanderConfig`](crate::config::ExpanderConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Json(#[from] serde_json::Error),
}

struct PathChain<'a>(&'a [PathBuf]);

impl fmt::Display for PathChain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, path) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{}", path.display())?;
        }
        Ok(())
    }
}

struct DocumentName<'a>(Option<&'a Path>);

impl fmt::Display for DocumentName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(path) => write!(f, "{}", path.display()),
            None => f.write_str("root document"),
        }
    }
}

/// Result type alias for Kumo operations
pub type Result<T> = std::result::Result<T, TemplateError>;
