//! Component tree model: renderable components plus the `$include` and
//! `$if` directives.

use indexmap::IndexMap;
use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value as YamlValue};

use crate::value::Value;

pub const IF_KEY: &str = "$if";
pub const INCLUDE_KEY: &str = "$include";

// ============================================================================
// Nodes
// ============================================================================

/// One entry in a component sequence.
///
/// Directive nodes only exist in raw documents; expansion replaces them with
/// zero or more plain components.
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentNode {
    Component(Component),
    Include(IncludeDirective),
    If(IfDirective),
    /// A directive whose body is missing a required field or has the wrong
    /// shape. Kept in the tree so the error surfaces only if the walker
    /// actually reaches it.
    Malformed(MalformedDirective),
}

impl ComponentNode {
    pub fn is_directive(&self) -> bool {
        !matches!(self, ComponentNode::Component(_))
    }
}

impl From<Component> for ComponentNode {
    fn from(component: Component) -> Self {
        ComponentNode::Component(component)
    }
}

/// `$include`: inline another document with its own parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct IncludeDirective {
    pub template_path: String,
    pub params: IndexMap<String, Value>,
}

/// `$if`: keep `template` only when `condition` holds.
#[derive(Debug, Clone, PartialEq)]
pub struct IfDirective {
    pub condition: String,
    pub template: Vec<ComponentNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveKind {
    Include,
    If,
}

impl DirectiveKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DirectiveKind::Include => INCLUDE_KEY,
            DirectiveKind::If => IF_KEY,
        }
    }
}

impl std::fmt::Display for DirectiveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directive that could not be read, with the raw node preserved.
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedDirective {
    pub directive: DirectiveKind,
    pub reason: String,
    pub raw: YamlValue,
}

// ============================================================================
// Components
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Component {
    Text(Text),
    Heading(Heading),
    Input(Input),
    Textarea(Textarea),
    Select(Select),
    Checkbox(Checkbox),
    Button(Button),
    Image(Image),
    Link(Link),
    Divider(Divider),
    Container(Container),
    Form(Form),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Text {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Heading {
    pub text: String,
    #[serde(default = "default_heading_level")]
    pub level: u8,
}

fn default_heading_level() -> u8 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Input {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Textarea {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Select {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub options: Vec<SelectOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectOption {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkbox {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub checked: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Button {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub src: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub text: String,
    pub href: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Divider {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    #[serde(default)]
    pub children: Vec<ComponentNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub style: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Form {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submit_action: Option<String>,
    #[serde(default)]
    pub fields: Vec<ComponentNode>,
    #[serde(default)]
    pub actions: Vec<ComponentNode>,
}

impl Component {
    /// The `type` tag this component carries in documents.
    pub fn kind(&self) -> &'static str {
        match self {
            Component::Text(_) => "text",
            Component::Heading(_) => "heading",
            Component::Input(_) => "input",
            Component::Textarea(_) => "textarea",
            Component::Select(_) => "select",
            Component::Checkbox(_) => "checkbox",
            Component::Button(_) => "button",
            Component::Image(_) => "image",
            Component::Link(_) => "link",
            Component::Divider(_) => "divider",
            Component::Container(_) => "container",
            Component::Form(_) => "form",
        }
    }

    /// Child sequences in declaration order.
    pub fn child_lists(&self) -> Vec<&Vec<ComponentNode>> {
        match self {
            Component::Container(c) => vec![&c.children],
            Component::Form(f) => vec![&f.fields, &f.actions],
            _ => Vec::new(),
        }
    }

    pub fn child_lists_mut(&mut self) -> Vec<&mut Vec<ComponentNode>> {
        match self {
            Component::Container(c) => vec![&mut c.children],
            Component::Form(f) => vec![&mut f.fields, &mut f.actions],
            _ => Vec::new(),
        }
    }

    /// Apply `f` to every literal string property, including those nested in
    /// option lists and style maps. Child sequences are not visited.
    pub fn try_for_each_text_mut<E, F>(&mut self, mut f: F) -> Result<(), E>
    where
        F: FnMut(&mut String) -> Result<(), E>,
    {
        match self {
            Component::Text(t) => {
                f(&mut t.content)?;
                visit_opt(&mut t.variant, &mut f)?;
            }
            Component::Heading(h) => f(&mut h.text)?,
            Component::Input(i) => {
                f(&mut i.name)?;
                visit_opt(&mut i.label, &mut f)?;
                visit_opt(&mut i.placeholder, &mut f)?;
                visit_opt(&mut i.input_type, &mut f)?;
                visit_opt(&mut i.default_value, &mut f)?;
            }
            Component::Textarea(t) => {
                f(&mut t.name)?;
                visit_opt(&mut t.label, &mut f)?;
                visit_opt(&mut t.placeholder, &mut f)?;
            }
            Component::Select(s) => {
                f(&mut s.name)?;
                visit_opt(&mut s.label, &mut f)?;
                for option in &mut s.options {
                    f(&mut option.label)?;
                    f(&mut option.value)?;
                }
            }
            Component::Checkbox(c) => {
                f(&mut c.name)?;
                visit_opt(&mut c.label, &mut f)?;
            }
            Component::Button(b) => {
                f(&mut b.label)?;
                visit_opt(&mut b.action, &mut f)?;
                visit_opt(&mut b.variant, &mut f)?;
            }
            Component::Image(i) => {
                f(&mut i.src)?;
                visit_opt(&mut i.alt, &mut f)?;
            }
            Component::Link(l) => {
                f(&mut l.text)?;
                f(&mut l.href)?;
            }
            Component::Divider(_) => {}
            Component::Container(c) => {
                visit_opt(&mut c.direction, &mut f)?;
                for value in c.style.values_mut() {
                    f(value)?;
                }
            }
            Component::Form(form) => {
                visit_opt(&mut form.title, &mut f)?;
                visit_opt(&mut form.submit_action, &mut f)?;
            }
        }
        Ok(())
    }
}

fn visit_opt<E, F>(value: &mut Option<String>, f: &mut F) -> Result<(), E>
where
    F: FnMut(&mut String) -> Result<(), E>,
{
    match value {
        Some(s) => f(s),
        None => Ok(()),
    }
}

// ============================================================================
// Reading nodes from YAML
// ============================================================================

impl ComponentNode {
    /// Classify one raw node. Directive bodies are read leniently: missing or
    /// ill-typed fields produce [`ComponentNode::Malformed`] rather than an
    /// error. Component records go through their serde definitions.
    pub fn from_yaml(raw: YamlValue) -> Result<Self, serde_yaml::Error> {
        let mapping = match &raw {
            YamlValue::Mapping(mapping) => mapping,
            other => {
                return Err(de::Error::custom(format!(
                    "expected a component mapping, found {}",
                    yaml_type_name(other)
                )))
            }
        };

        if let Some(body) = mapping.get(IF_KEY) {
            return read_if(body, mapping, &raw);
        }
        if let Some(body) = mapping.get(INCLUDE_KEY) {
            return Ok(read_include(body, mapping, &raw));
        }

        serde_yaml::from_value::<Component>(raw).map(ComponentNode::Component)
    }
}

fn read_if(
    body: &YamlValue,
    node: &Mapping,
    raw: &YamlValue,
) -> Result<ComponentNode, serde_yaml::Error> {
    let malformed = |reason: String| {
        ComponentNode::Malformed(MalformedDirective {
            directive: DirectiveKind::If,
            reason,
            raw: raw.clone(),
        })
    };

    if let Some(key) = extra_key(node, IF_KEY) {
        return Ok(malformed(format!("unexpected key '{key}' next to '{IF_KEY}'")));
    }
    let body = match body {
        YamlValue::Mapping(m) => m,
        YamlValue::Null => return Ok(malformed(missing_field("condition"))),
        other => {
            return Ok(malformed(format!(
                "body must be a mapping, found {}",
                yaml_type_name(other)
            )))
        }
    };

    let condition = match body.get("condition").map(scalar_text) {
        None | Some(Ok(None)) => return Ok(malformed(missing_field("condition"))),
        Some(Err(found)) => {
            return Ok(malformed(format!(
                "field 'condition' must be a scalar, found {found}"
            )))
        }
        Some(Ok(Some(text))) => text,
    };

    // Nested nodes are real document content, so their errors are not deferred.
    let template = match body.get("template") {
        None | Some(YamlValue::Null) => return Ok(malformed(missing_field("template"))),
        Some(YamlValue::Sequence(items)) => read_sequence(items)?,
        Some(other) => {
            return Ok(malformed(format!(
                "field 'template' must be a sequence, found {}",
                yaml_type_name(other)
            )))
        }
    };

    Ok(ComponentNode::If(IfDirective {
        condition,
        template,
    }))
}

fn read_include(body: &YamlValue, node: &Mapping, raw: &YamlValue) -> ComponentNode {
    let malformed = |reason: String| {
        ComponentNode::Malformed(MalformedDirective {
            directive: DirectiveKind::Include,
            reason,
            raw: raw.clone(),
        })
    };

    if let Some(key) = extra_key(node, INCLUDE_KEY) {
        return malformed(format!("unexpected key '{key}' next to '{INCLUDE_KEY}'"));
    }

    let (template, params) = match body {
        YamlValue::String(path) => (Some(YamlValue::String(path.clone())), None),
        YamlValue::Mapping(m) => (m.get("template").cloned(), m.get("params").cloned()),
        YamlValue::Null => (None, None),
        other => {
            return malformed(format!(
                "body must be a path or a mapping, found {}",
                yaml_type_name(other)
            ))
        }
    };

    let template_path = match template {
        None | Some(YamlValue::Null) => return malformed(missing_field("template")),
        Some(YamlValue::String(path)) if !path.trim().is_empty() => path,
        Some(YamlValue::String(_)) => return malformed("field 'template' is empty".to_string()),
        Some(other) => {
            return malformed(format!(
                "field 'template' must be a string, found {}",
                yaml_type_name(&other)
            ))
        }
    };

    let params = match params {
        None | Some(YamlValue::Null) => IndexMap::new(),
        Some(value @ YamlValue::Mapping(_)) => {
            match serde_yaml::from_value::<IndexMap<String, Value>>(value) {
                Ok(params) => params,
                Err(e) => return malformed(format!("field 'params': {e}")),
            }
        }
        Some(other) => {
            return malformed(format!(
                "field 'params' must be a mapping, found {}",
                yaml_type_name(&other)
            ))
        }
    };

    ComponentNode::Include(IncludeDirective {
        template_path,
        params,
    })
}

pub(crate) fn read_sequence(items: &[YamlValue]) -> Result<Vec<ComponentNode>, serde_yaml::Error> {
    items.iter().cloned().map(ComponentNode::from_yaml).collect()
}

fn missing_field(field: &str) -> String {
    format!("missing required field '{field}'")
}

fn extra_key(node: &Mapping, directive_key: &str) -> Option<String> {
    node.keys().find_map(|key| match key.as_str() {
        Some(k) if k == directive_key => None,
        Some(k) => Some(k.to_string()),
        None => Some(format!("{key:?}")),
    })
}

/// Textual form of a scalar; `Ok(None)` for null, `Err` with the found type
/// for sequences and mappings.
fn scalar_text(value: &YamlValue) -> Result<Option<String>, &'static str> {
    match value {
        YamlValue::Null => Ok(None),
        YamlValue::Bool(b) => Ok(Some(b.to_string())),
        YamlValue::Number(n) => Ok(Some(n.to_string())),
        YamlValue::String(s) => Ok(Some(s.clone())),
        other => Err(yaml_type_name(other)),
    }
}

fn yaml_type_name(value: &YamlValue) -> &'static str {
    match value {
        YamlValue::Null => "null",
        YamlValue::Bool(_) => "boolean",
        YamlValue::Number(_) => "number",
        YamlValue::String(_) => "string",
        YamlValue::Sequence(_) => "sequence",
        YamlValue::Mapping(_) => "mapping",
        YamlValue::Tagged(_) => "tagged value",
    }
}

impl<'de> Deserialize<'de> for ComponentNode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = YamlValue::deserialize(deserializer)?;
        ComponentNode::from_yaml(raw).map_err(de::Error::custom)
    }
}

// ============================================================================
// Writing nodes
// ============================================================================

#[derive(Serialize)]
struct IncludeBody<'a> {
    template: &'a str,
    #[serde(skip_serializing_if = "has_no_params")]
    params: &'a IndexMap<String, Value>,
}

fn has_no_params(params: &&IndexMap<String, Value>) -> bool {
    params.is_empty()
}

#[derive(Serialize)]
struct IfBody<'a> {
    condition: &'a str,
    template: &'a [ComponentNode],
}

impl Serialize for ComponentNode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            ComponentNode::Component(component) => component.serialize(serializer),
            ComponentNode::Include(d) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(
                    INCLUDE_KEY,
                    &IncludeBody {
                        template: &d.template_path,
                        params: &d.params,
                    },
                )?;
                map.end()
            }
            ComponentNode::If(d) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(
                    IF_KEY,
                    &IfBody {
                        condition: &d.condition,
                        template: &d.template,
                    },
                )?;
                map.end()
            }
            ComponentNode::Malformed(m) => m.raw.serialize(serializer),
        }
    }
}
