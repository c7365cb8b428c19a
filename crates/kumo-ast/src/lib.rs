//! Component tree model and document parser for Kumo UI documents.
//!
//! Documents are YAML (or JSON) sequences of typed component records, mixed
//! with `$include` and `$if` directive nodes that the `kumo` crate expands.

pub mod node;
pub mod value;

pub use node::{
    Button, Checkbox, Component, ComponentNode, Container, DirectiveKind, Divider, Form, Heading,
    IfDirective, Image, IncludeDirective, Input, Link, MalformedDirective, Select, SelectOption,
    Text, Textarea, IF_KEY, INCLUDE_KEY,
};
pub use value::Value;

use serde_yaml::Value as YamlValue;
use thiserror::Error;

/// Key holding the node sequence when the document root is a mapping.
pub const COMPONENTS_KEY: &str = "components";

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("document syntax error: {0}")]
    Syntax(#[from] serde_yaml::Error),

    #[error("document root must be a sequence of nodes or a mapping with a 'components' sequence, found {found}")]
    InvalidRoot { found: &'static str },
}

impl ParseError {
    /// 1-indexed line and column of a syntax error, when the parser knows it.
    pub fn location(&self) -> Option<(usize, usize)> {
        match self {
            ParseError::Syntax(e) => e.location().map(|l| (l.line(), l.column())),
            ParseError::InvalidRoot { .. } => None,
        }
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Parse document text into its raw (unexpanded) node sequence.
pub fn parse(source: &str) -> Result<Vec<ComponentNode>, ParseError> {
    let root: YamlValue = serde_yaml::from_str(source)?;
    match root {
        YamlValue::Null => Ok(Vec::new()),
        YamlValue::Sequence(items) => Ok(node::read_sequence(&items)?),
        YamlValue::Mapping(mut mapping) => match mapping.remove(COMPONENTS_KEY) {
            Some(YamlValue::Sequence(items)) => Ok(node::read_sequence(&items)?),
            Some(YamlValue::Null) => Ok(Vec::new()),
            Some(_) => Err(ParseError::InvalidRoot {
                found: "a non-sequence 'components' entry",
            }),
            None => Err(ParseError::InvalidRoot { found: "mapping" }),
        },
        YamlValue::String(_) | YamlValue::Number(_) | YamlValue::Bool(_) => {
            Err(ParseError::InvalidRoot { found: "scalar" })
        }
        YamlValue::Tagged(_) => Err(ParseError::InvalidRoot {
            found: "tagged value",
        }),
    }
}

// ============================================================================
// Tests
// ============================================================================
