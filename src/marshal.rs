//! Schema-driven XML marshalling with namespace prefix control.

use crate::error::{Result, SoapError};
use crate::types::{ComplexContent, ComplexType, ElementDef, ElementType, Value};
use encoding_rs::Encoding;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

/// XML Schema instance namespace.
pub const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";

const GENERATED_PREFIX: &str = "tns";

/// Writes [`ComplexContent`] as an XML document rooted at a [`ComplexType`].
///
/// All namespace declarations are emitted on the root element in first-use
/// order, so the output for a given type and content is deterministic.
pub struct Marshaller<'a> {
    root: &'a ComplexType,
    allow_xsi: bool,
    allow_default_namespace: bool,
    default_namespace: Option<String>,
    /// (namespace, prefix)
    prefixes: Vec<(String, String)>,
}

impl<'a> Marshaller<'a> {
    pub fn new(root: &'a ComplexType) -> Self {
        Self {
            root,
            allow_xsi: false,
            allow_default_namespace: false,
            default_namespace: None,
            prefixes: Vec::new(),
        }
    }

    /// Emit `xsi:nil` for nil values of nillable elements.
    pub fn set_allow_xsi(&mut self, allow: bool) {
        self.allow_xsi = allow;
    }

    /// Allow one namespace to be declared as the prefix-less default.
    pub fn set_allow_default_namespace(&mut self, allow: bool) {
        self.allow_default_namespace = allow;
    }

    /// Namespace to declare as default, if default namespaces are allowed.
    pub fn set_default_namespace(&mut self, namespace: impl Into<String>) {
        self.default_namespace = Some(namespace.into());
    }

    /// Bind a namespace to a prefix. A later binding for the same namespace
    /// replaces the earlier one.
    pub fn set_prefix(&mut self, namespace: impl Into<String>, prefix: impl Into<String>) {
        let namespace = namespace.into();
        let prefix = prefix.into();
        match self.prefixes.iter_mut().find(|(ns, _)| *ns == namespace) {
            Some(binding) => binding.1 = prefix,
            None => self.prefixes.push((namespace, prefix)),
        }
    }

    /// Marshal `content` to bytes in the given charset.
    pub fn marshal(&self, content: &ComplexContent, encoding: &'static Encoding) -> Result<Vec<u8>> {
        let encoding = encoding.output_encoding();

        let mut used = Vec::new();
        note_namespace(&mut used, self.root.namespace.as_deref());
        self.collect_namespaces(self.root, content, &mut used)?;
        let bindings = self.assign_prefixes(&used)?;

        let mut writer = Writer::new(Vec::new());
        write(
            &mut writer,
            Event::Decl(BytesDecl::new("1.0", Some(encoding.name()), None)),
        )?;

        // An unqualified root cannot carry the default declaration itself
        let scope = Scope {
            bindings: &bindings,
            default: match self.root.namespace {
                Some(_) => bindings
                    .iter()
                    .find(|(_, prefix)| prefix.is_empty())
                    .map(|(ns, _)| ns.as_str()),
                None => None,
            },
        };
        self.write_complex(
            &mut writer,
            &self.root.name,
            self.root.namespace.as_deref(),
            self.root,
            content,
            scope,
            true,
        )?;

        let xml = writer.into_inner();
        if encoding == encoding_rs::UTF_8 {
            return Ok(xml);
        }
        let text = String::from_utf8(xml).map_err(|e| SoapError::Serialization(e.to_string()))?;
        let (bytes, _, unmappable) = encoding.encode(&text);
        if unmappable {
            return Err(SoapError::Serialization(format!(
                "Content cannot be represented in {}",
                encoding.name()
            )));
        }
        Ok(bytes.into_owned())
    }

    fn collect_namespaces(
        &self,
        ty: &ComplexType,
        content: &ComplexContent,
        used: &mut Vec<String>,
    ) -> Result<()> {
        check_fields(ty, content)?;
        for def in ty.children.iter().filter(|d| !d.attribute) {
            for item in self.emitted(def, content) {
                note_namespace(used, ty.child_namespace(def));
                match (item, &def.kind) {
                    (Value::Nil, _) => note_namespace(used, Some(XSI_NS)),
                    (Value::Complex(inner), ElementType::Complex(inner_ty)) => {
                        self.collect_namespaces(inner_ty, inner, used)?
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn assign_prefixes(&self, used: &[String]) -> Result<Vec<(String, String)>> {
        let default = if self.allow_default_namespace {
            self.default_namespace.as_deref()
        } else {
            None
        };
        let taken = |prefix: &str, bindings: &[(String, String)]| {
            self.prefixes.iter().any(|(_, p)| p == prefix)
                || bindings.iter().any(|(_, p)| p == prefix)
        };

        let mut bindings: Vec<(String, String)> = Vec::with_capacity(used.len());
        let mut counter = 0;
        for ns in used {
            let prefix = if default == Some(ns.as_str()) && ns != XSI_NS {
                String::new()
            } else if let Some((_, prefix)) = self.prefixes.iter().find(|(n, _)| n == ns) {
                if let Some((other, _)) = bindings.iter().find(|(_, p)| p == prefix) {
                    return Err(SoapError::Serialization(format!(
                        "Prefix {:?} is bound to both {} and {}",
                        prefix, other, ns
                    )));
                }
                prefix.clone()
            } else if ns == XSI_NS && !taken("xsi", &bindings) {
                "xsi".to_string()
            } else {
                loop {
                    counter += 1;
                    let candidate = format!("{}{}", GENERATED_PREFIX, counter);
                    if !taken(&candidate, &bindings) {
                        break candidate;
                    }
                }
            };
            bindings.push((ns.clone(), prefix));
        }
        Ok(bindings)
    }

    /// Values of `def` that end up in the document.
    fn emitted<'c>(&self, def: &ElementDef, content: &'c ComplexContent) -> Vec<&'c Value> {
        let items: Vec<&Value> = match content.get(&def.name) {
            None => Vec::new(),
            Some(Value::List(items)) => items.iter().collect(),
            Some(value) => vec![value],
        };
        items
            .into_iter()
            .filter(|v| !matches!(v, Value::Nil) || (self.allow_xsi && def.nillable))
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn write_complex(
        &self,
        writer: &mut Writer<Vec<u8>>,
        name: &str,
        namespace: Option<&str>,
        ty: &ComplexType,
        content: &ComplexContent,
        scope: Scope<'_>,
        root: bool,
    ) -> Result<()> {
        let mut scope = scope;
        let (qname, default_decl) = scope.open(name, namespace)?;
        let mut start = BytesStart::new(qname.clone());
        if root {
            for (ns, prefix) in scope.bindings {
                if prefix.is_empty() {
                    if namespace.is_some() {
                        start.push_attribute(("xmlns", ns.as_str()));
                    }
                } else {
                    start.push_attribute((format!("xmlns:{}", prefix).as_str(), ns.as_str()));
                }
            }
        }
        if let Some(ns) = default_decl {
            start.push_attribute(("xmlns", ns));
        }

        for def in ty.children.iter().filter(|d| d.attribute) {
            if let Some(value) = content.get(&def.name) {
                let text = value.as_text().ok_or_else(|| {
                    SoapError::Serialization(format!(
                        "Attribute {} of {} needs a simple value",
                        def.name, ty.name
                    ))
                })?;
                start.push_attribute((def.name.as_str(), text.as_str()));
            }
        }

        let children: Vec<(&ElementDef, &Value)> = ty
            .children
            .iter()
            .filter(|d| !d.attribute)
            .flat_map(|def| self.emitted(def, content).into_iter().map(move |v| (def, v)))
            .collect();

        if children.is_empty() {
            return write(writer, Event::Empty(start));
        }

        write(writer, Event::Start(start))?;
        for (def, value) in children {
            self.write_child(writer, ty, def, value, scope)?;
        }
        write(writer, Event::End(BytesEnd::new(qname)))
    }

    fn write_child(
        &self,
        writer: &mut Writer<Vec<u8>>,
        parent: &ComplexType,
        def: &ElementDef,
        value: &Value,
        scope: Scope<'_>,
    ) -> Result<()> {
        let namespace = parent.child_namespace(def);
        match (value, &def.kind) {
            (Value::Nil, _) => {
                let mut scope = scope;
                let (qname, default_decl) = scope.open(&def.name, namespace)?;
                let mut start = BytesStart::new(qname);
                if let Some(ns) = default_decl {
                    start.push_attribute(("xmlns", ns));
                }
                let nil = scope.qualify("nil", Some(XSI_NS))?;
                start.push_attribute((nil.as_str(), "true"));
                write(writer, Event::Empty(start))
            }
            (Value::Complex(inner), ElementType::Complex(inner_ty)) => {
                self.write_complex(writer, &def.name, namespace, inner_ty, inner, scope, false)
            }
            (Value::Complex(_), ElementType::Simple(_)) | (Value::List(_), _) => {
                Err(SoapError::Serialization(format!(
                    "Element {} of {} needs a simple value",
                    def.name, parent.name
                )))
            }
            (_, ElementType::Complex(_)) => Err(SoapError::Serialization(format!(
                "Element {} of {} needs complex content",
                def.name, parent.name
            ))),
            (simple, ElementType::Simple(_)) => {
                let mut scope = scope;
                let (qname, default_decl) = scope.open(&def.name, namespace)?;
                let mut start = BytesStart::new(qname.clone());
                if let Some(ns) = default_decl {
                    start.push_attribute(("xmlns", ns));
                }
                let text = simple.as_text().unwrap_or_default();
                if text.is_empty() {
                    return write(writer, Event::Empty(start));
                }
                write(writer, Event::Start(start))?;
                write(writer, Event::Text(BytesText::new(&text)))?;
                write(writer, Event::End(BytesEnd::new(qname)))
            }
        }
    }
}

#[derive(Clone, Copy)]
struct Scope<'b> {
    bindings: &'b [(String, String)],
    /// Default namespace in effect at this point of the document
    default: Option<&'b str>,
}

impl<'b> Scope<'b> {
    fn binding(&self, namespace: &str) -> Result<(&'b str, &'b str)> {
        self.bindings
            .iter()
            .find(|(ns, _)| ns == namespace)
            .map(|(ns, prefix)| (ns.as_str(), prefix.as_str()))
            .ok_or_else(|| {
                SoapError::Serialization(format!("No prefix bound for namespace {}", namespace))
            })
    }

    /// Qualified name of an attribute. Only prefixed bindings apply.
    fn qualify(&self, name: &str, namespace: Option<&str>) -> Result<String> {
        let Some(namespace) = namespace else {
            return Ok(name.to_string());
        };
        match self.binding(namespace)? {
            (_, "") => Err(SoapError::Serialization(format!(
                "Attribute {} needs a prefix for namespace {}",
                name, namespace
            ))),
            (_, prefix) => Ok(format!("{}:{}", prefix, name)),
        }
    }

    /// Qualified name of an element, plus the default namespace declaration
    /// it has to carry. Updates the scope seen by its children.
    fn open(&mut self, name: &str, namespace: Option<&str>) -> Result<(String, Option<&'b str>)> {
        let Some(namespace) = namespace else {
            // An unqualified element below a default namespace has to undeclare it.
            return Ok((name.to_string(), self.default.take().map(|_| "")));
        };
        let (ns, prefix) = self.binding(namespace)?;
        if !prefix.is_empty() {
            return Ok((format!("{}:{}", prefix, name), None));
        }
        if self.default == Some(ns) {
            return Ok((name.to_string(), None));
        }
        // The default was reset by an unqualified ancestor
        self.default = Some(ns);
        Ok((name.to_string(), Some(ns)))
    }
}

fn note_namespace(used: &mut Vec<String>, namespace: Option<&str>) {
    if let Some(ns) = namespace {
        if !used.iter().any(|u| u == ns) {
            used.push(ns.to_string());
        }
    }
}

fn check_fields(ty: &ComplexType, content: &ComplexContent) -> Result<()> {
    for (name, _) in content.fields() {
        if ty.child(name).is_none() {
            return Err(SoapError::Serialization(format!(
                "Type {} has no element {}",
                ty.name, name
            )));
        }
    }
    Ok(())
}

fn write(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| SoapError::Serialization(e.to_string()))
}
