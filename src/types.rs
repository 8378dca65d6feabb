//! Structural types and typed values.
//!
//! A [`ComplexType`] describes an XML element's children, a
//! [`ComplexContent`] is an instance of one. The marshaller and parser walk
//! the type to decide element names, namespaces and occurrence; the content
//! only holds values keyed by child name.

use crate::error::{Result, SoapError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named, namespaced structural type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexType {
    /// Type (and root element) name
    pub name: String,

    /// Namespace of the type
    #[serde(default)]
    pub namespace: Option<String>,

    /// Child elements and attributes, in document order
    #[serde(default)]
    pub children: Vec<ElementDef>,

    /// Children without an explicit namespace inherit this type's namespace
    #[serde(default = "default_true")]
    pub element_qualified: bool,

    /// Unknown children are skipped when parsing instead of rejected
    #[serde(default)]
    pub open: bool,
}

fn default_true() -> bool {
    true
}

fn default_min_occurs() -> u32 {
    1
}

fn default_max_occurs() -> Option<u32> {
    Some(1)
}

/// A child element (or attribute) of a [`ComplexType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementDef {
    /// Local name
    pub name: String,

    /// Explicit namespace; `None` defers to the parent type's qualification
    #[serde(default)]
    pub namespace: Option<String>,

    /// Content type
    #[serde(rename = "type")]
    pub kind: ElementType,

    /// Minimum occurrences
    #[serde(default = "default_min_occurs")]
    pub min_occurs: u32,

    /// Maximum occurrences, `None` for unbounded
    #[serde(default = "default_max_occurs")]
    pub max_occurs: Option<u32>,

    /// Rendered as an (unqualified) attribute rather than an element
    #[serde(default)]
    pub attribute: bool,

    /// May carry `xsi:nil`
    #[serde(default)]
    pub nillable: bool,
}

/// Content type of an element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ElementType {
    Simple(SimpleType),
    Complex(Box<ComplexType>),
}

/// Built-in simple types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimpleType {
    String,
    Boolean,
    #[serde(alias = "integer", alias = "long")]
    Int,
    #[serde(alias = "double")]
    Decimal,
}

impl SimpleType {
    /// Parse a lexical value into a typed [`Value`].
    pub fn parse(&self, text: &str) -> Result<Value> {
        match self {
            Self::String => Ok(Value::String(text.to_string())),
            Self::Boolean => match text.trim() {
                "true" | "1" => Ok(Value::Boolean(true)),
                "false" | "0" => Ok(Value::Boolean(false)),
                other => Err(SoapError::Format(format!("Invalid boolean: {:?}", other))),
            },
            Self::Int => text
                .trim()
                .parse()
                .map(Value::Integer)
                .map_err(|e| SoapError::Format(format!("Invalid integer {:?}: {}", text, e))),
            Self::Decimal => text
                .trim()
                .parse()
                .map(Value::Decimal)
                .map_err(|e| SoapError::Format(format!("Invalid decimal {:?}: {}", text, e))),
        }
    }
}

impl ComplexType {
    /// Create an empty type.
    pub fn new(name: impl Into<String>, namespace: Option<String>) -> Self {
        Self {
            name: name.into(),
            namespace,
            children: Vec::new(),
            element_qualified: true,
            open: false,
        }
    }

    /// Add a child definition.
    pub fn with_child(mut self, child: ElementDef) -> Self {
        self.children.push(child);
        self
    }

    /// Look up a child definition by name.
    pub fn child(&self, name: &str) -> Option<&ElementDef> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Namespace a child element resolves to in XML.
    pub fn child_namespace<'a>(&'a self, child: &'a ElementDef) -> Option<&'a str> {
        if child.attribute {
            return None;
        }
        match (&child.namespace, self.element_qualified) {
            (Some(ns), _) => Some(ns.as_str()),
            (None, true) => self.namespace.as_deref(),
            (None, false) => None,
        }
    }

    /// Create an empty instance of this type.
    pub fn new_instance(&self) -> ComplexContent {
        ComplexContent {
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            fields: BTreeMap::new(),
        }
    }
}

impl ElementDef {
    /// A single, required element.
    pub fn new(name: impl Into<String>, kind: ElementType) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            kind,
            min_occurs: 1,
            max_occurs: Some(1),
            attribute: false,
            nillable: false,
        }
    }

    /// A single element of a simple type.
    pub fn simple(name: impl Into<String>, ty: SimpleType) -> Self {
        Self::new(name, ElementType::Simple(ty))
    }

    /// A single element of a complex type.
    pub fn complex(name: impl Into<String>, ty: ComplexType) -> Self {
        Self::new(name, ElementType::Complex(Box::new(ty)))
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_min_occurs(mut self, min_occurs: u32) -> Self {
        self.min_occurs = min_occurs;
        self
    }

    pub fn with_max_occurs(mut self, max_occurs: Option<u32>) -> Self {
        self.max_occurs = max_occurs;
        self
    }

    pub fn as_attribute(mut self) -> Self {
        self.attribute = true;
        self
    }

    pub fn nillable(mut self) -> Self {
        self.nillable = true;
        self
    }

    /// Whether more than one occurrence is allowed.
    pub fn is_list(&self) -> bool {
        self.max_occurs != Some(1)
    }
}

/// A typed value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    String(String),
    Integer(i64),
    Boolean(bool),
    Decimal(f64),
    Complex(ComplexContent),
    List(Vec<Value>),
    Nil,
}

impl Value {
    /// Lexical form of a simple value.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::String(s) => Some(s.clone()),
            Self::Integer(i) => Some(i.to_string()),
            Self::Boolean(b) => Some(b.to_string()),
            Self::Decimal(d) => Some(d.to_string()),
            _ => None,
        }
    }

    pub fn as_complex(&self) -> Option<&ComplexContent> {
        match self {
            Self::Complex(c) => Some(c),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<ComplexContent> for Value {
    fn from(c: ComplexContent) -> Self {
        Value::Complex(c)
    }
}

/// An instance of a [`ComplexType`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplexContent {
    #[serde(skip)]
    name: String,
    #[serde(skip)]
    namespace: Option<String>,
    #[serde(flatten)]
    fields: BTreeMap<String, Value>,
}

impl ComplexContent {
    /// Name of the type this content was created from.
    pub fn type_name(&self) -> &str {
        &self.name
    }

    /// Namespace of the type this content was created from.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Get a value by `/`-separated path.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let (head, rest) = split_path(path);
        let value = self.fields.get(head)?;
        match rest {
            None => Some(value),
            Some(rest) => value.as_complex()?.get(rest),
        }
    }

    /// Set a value by `/`-separated path. Intermediate segments must already
    /// hold complex content.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> Result<()> {
        let (head, rest) = split_path(path);
        match rest {
            None => {
                self.fields.insert(head.to_string(), value.into());
                Ok(())
            }
            Some(rest) => match self.fields.get_mut(head) {
                Some(Value::Complex(inner)) => inner.set(rest, value),
                _ => Err(SoapError::Serialization(format!(
                    "Cannot set {:?}: {:?} is not complex content of {}",
                    path, head, self.name
                ))),
            },
        }
    }

    /// Remove a top-level field.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    /// Whether no field is set.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over the set fields.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

fn split_path(path: &str) -> (&str, Option<&str>) {
    match path.split_once('/') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    }
}
