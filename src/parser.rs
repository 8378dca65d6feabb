//! Schema-bound XML parsing.
//!
//! Uses quick-xml which is safe against XXE by default (doesn't expand
//! entities); DOCTYPE declarations are rejected outright.

use crate::error::{Result, SoapError};
use crate::marshal::XSI_NS;
use crate::types::{ComplexContent, ComplexType, ElementDef, ElementType, Value};
use encoding_rs::Encoding;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;

/// Parse a document whose root element is an instance of `root`.
pub fn unmarshal(data: &[u8], encoding: &'static Encoding, root: &ComplexType) -> Result<ComplexContent> {
    let text = decode(data, encoding)?;
    let mut parser = Parser::new(&text);
    let (namespace, start, empty) = parser.root_element()?;
    check_name(&start, namespace.as_deref(), &root.name, root.namespace.as_deref())?;
    let content = parser.parse_complex(root, &start, empty)?;
    parser.finish()?;
    Ok(content)
}

/// Parse a standalone document holding a single `element`.
pub fn unmarshal_element(data: &[u8], encoding: &'static Encoding, element: &ElementDef) -> Result<Value> {
    let text = decode(data, encoding)?;
    let mut parser = Parser::new(&text);
    let (namespace, start, empty) = parser.root_element()?;
    check_name(&start, namespace.as_deref(), &element.name, element.namespace.as_deref())?;
    let value = parser.parse_value(element, &start, empty)?;
    parser.finish()?;
    Ok(value)
}

fn decode<'d>(data: &'d [u8], encoding: &'static Encoding) -> Result<std::borrow::Cow<'d, str>> {
    let (text, used, malformed) = encoding.decode(data);
    if malformed {
        return Err(SoapError::Parse(format!("Invalid {} content", used.name())));
    }
    Ok(text)
}

fn check_name(
    start: &BytesStart<'_>,
    namespace: Option<&str>,
    name: &str,
    expected_ns: Option<&str>,
) -> Result<()> {
    let local = local_name(start);
    if local != name || namespace != expected_ns {
        return Err(SoapError::Format(format!(
            "Expected root element {{{}}}{}, found {{{}}}{}",
            expected_ns.unwrap_or(""),
            name,
            namespace.unwrap_or(""),
            local
        )));
    }
    Ok(())
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

struct Parser<'i> {
    reader: NsReader<&'i [u8]>,
}

impl<'i> Parser<'i> {
    fn new(text: &'i str) -> Self {
        Self {
            reader: NsReader::from_str(text),
        }
    }

    /// Next event together with its resolved namespace.
    fn next(&mut self) -> Result<(Option<String>, Event<'i>)> {
        let (resolved, event) = self.reader.read_resolved_event()?;
        let namespace = match resolved {
            ResolveResult::Bound(ns) => Some(String::from_utf8_lossy(ns.as_ref()).into_owned()),
            ResolveResult::Unbound => None,
            ResolveResult::Unknown(prefix) => {
                return Err(SoapError::Parse(format!(
                    "Unbound namespace prefix {}",
                    String::from_utf8_lossy(&prefix)
                )))
            }
        };
        if let Event::DocType(_) = event {
            return Err(SoapError::Parse(
                "DOCTYPE declarations are not allowed".to_string(),
            ));
        }
        Ok((namespace, event))
    }

    fn root_element(&mut self) -> Result<(Option<String>, BytesStart<'i>, bool)> {
        loop {
            match self.next()? {
                (ns, Event::Start(e)) => return Ok((ns, e, false)),
                (ns, Event::Empty(e)) => return Ok((ns, e, true)),
                (_, Event::Eof) => {
                    return Err(SoapError::Parse("Document has no root element".to_string()))
                }
                (_, Event::Text(t)) if !is_blank(&t.unescape()?) => {
                    return Err(SoapError::Parse("Text outside of root element".to_string()))
                }
                _ => {}
            }
        }
    }

    fn finish(&mut self) -> Result<()> {
        loop {
            match self.next()? {
                (_, Event::Eof) => return Ok(()),
                (_, Event::Start(_)) | (_, Event::Empty(_)) => {
                    return Err(SoapError::Parse("Multiple root elements".to_string()))
                }
                _ => {}
            }
        }
    }

    fn parse_complex(&mut self, ty: &ComplexType, start: &BytesStart<'_>, empty: bool) -> Result<ComplexContent> {
        let mut content = ty.new_instance();

        for attr in start.attributes() {
            let attr = attr.map_err(|e| SoapError::Parse(e.to_string()))?;
            if attr.key.as_namespace_binding().is_some() {
                continue;
            }
            let (resolved, local) = self.reader.resolve_attribute(attr.key);
            if !matches!(resolved, ResolveResult::Unbound) {
                continue;
            }
            let local = String::from_utf8_lossy(local.as_ref()).into_owned();
            if let Some(def) = ty.children.iter().find(|d| d.attribute && d.name == local) {
                if let ElementType::Simple(simple) = &def.kind {
                    let value = attr.unescape_value()?;
                    content.set(&def.name, simple.parse(&value)?)?;
                }
            }
        }

        if empty {
            return Ok(content);
        }

        loop {
            let (namespace, event) = self.next()?;
            let (e, child_empty) = match event {
                Event::Start(e) => (e, false),
                Event::Empty(e) => (e, true),
                Event::End(_) => return Ok(content),
                Event::Eof => {
                    return Err(SoapError::Parse(format!(
                        "Unexpected end of document inside {}",
                        ty.name
                    )))
                }
                _ => continue,
            };

            let local = local_name(&e);
            let def = ty.children.iter().find(|d| {
                !d.attribute && d.name == local && ty.child_namespace(d) == namespace.as_deref()
            });
            match def {
                Some(def) => {
                    let value = self.parse_value(def, &e, child_empty)?;
                    add_value(&mut content, def, value)?;
                }
                None if ty.open => {
                    if !child_empty {
                        self.skip()?;
                    }
                }
                None => {
                    return Err(SoapError::Format(format!(
                        "Unexpected element {{{}}}{} in {}",
                        namespace.unwrap_or_default(),
                        local,
                        ty.name
                    )))
                }
            }
        }
    }

    fn parse_value(&mut self, def: &ElementDef, start: &BytesStart<'_>, empty: bool) -> Result<Value> {
        if self.is_nil(start)? {
            if !empty {
                self.skip()?;
            }
            return Ok(Value::Nil);
        }
        match &def.kind {
            ElementType::Simple(simple) => {
                let text = if empty { String::new() } else { self.read_text(&def.name)? };
                simple.parse(&text)
            }
            ElementType::Complex(ty) => Ok(Value::Complex(self.parse_complex(ty, start, empty)?)),
        }
    }

    fn is_nil(&self, start: &BytesStart<'_>) -> Result<bool> {
        for attr in start.attributes() {
            let attr = attr.map_err(|e| SoapError::Parse(e.to_string()))?;
            let (resolved, local) = self.reader.resolve_attribute(attr.key);
            let is_xsi = matches!(resolved, ResolveResult::Bound(ns) if ns.as_ref() == XSI_NS.as_bytes());
            if is_xsi && local.as_ref() == b"nil" {
                let value = attr.unescape_value()?;
                return Ok(matches!(value.trim(), "true" | "1"));
            }
        }
        Ok(false)
    }

    fn read_text(&mut self, name: &str) -> Result<String> {
        let mut text = String::new();
        loop {
            match self.next()? {
                (_, Event::Text(t)) => text.push_str(&t.unescape()?),
                (_, Event::CData(c)) => text.push_str(
                    std::str::from_utf8(&c).map_err(|e| SoapError::Parse(e.to_string()))?,
                ),
                (_, Event::End(_)) => return Ok(text),
                (_, Event::Start(_)) | (_, Event::Empty(_)) => {
                    return Err(SoapError::Format(format!(
                        "Simple element {} has child elements",
                        name
                    )))
                }
                (_, Event::Eof) => {
                    return Err(SoapError::Parse(format!(
                        "Unexpected end of document inside {}",
                        name
                    )))
                }
                _ => {}
            }
        }
    }

    /// Skip the rest of the current element.
    fn skip(&mut self) -> Result<()> {
        let mut depth = 0usize;
        loop {
            match self.next()? {
                (_, Event::Start(_)) => depth += 1,
                (_, Event::End(_)) if depth == 0 => return Ok(()),
                (_, Event::End(_)) => depth -= 1,
                (_, Event::Eof) => {
                    return Err(SoapError::Parse("Unexpected end of document".to_string()))
                }
                _ => {}
            }
        }
    }
}

fn add_value(content: &mut ComplexContent, def: &ElementDef, value: Value) -> Result<()> {
    if !def.is_list() {
        if content.get(&def.name).is_some() {
            return Err(SoapError::Format(format!(
                "Element {} may occur only once",
                def.name
            )));
        }
        return content.set(&def.name, value);
    }
    let items = match content.remove(&def.name) {
        Some(Value::List(mut items)) => {
            items.push(value);
            items
        }
        Some(other) => vec![other, value],
        None => vec![value],
    };
    if let Some(max) = def.max_occurs {
        if items.len() > max as usize {
            return Err(SoapError::Format(format!(
                "Element {} occurs more than {} times",
                def.name, max
            )));
        }
    }
    content.set(&def.name, Value::List(items))
}

fn is_blank(text: &str) -> bool {
    text.chars().all(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SimpleType;

    const NS: &str = "http://example.org/users";

    fn user_type() -> ComplexType {
        ComplexType::new("User", Some(NS.to_string()))
            .with_child(ElementDef::simple("id", SimpleType::Int).as_attribute())
            .with_child(ElementDef::simple("Name", SimpleType::String))
            .with_child(ElementDef::simple("Active", SimpleType::Boolean).with_min_occurs(0))
            .with_child(
                ElementDef::simple("Role", SimpleType::String)
                    .with_min_occurs(0)
                    .with_max_occurs(None),
            )
            .with_child(ElementDef::simple("Manager", SimpleType::String).nillable())
    }

    #[test]
    fn test_parse_typed_content() {
        let xml = r#"<?xml version="1.0"?>
<u:User xmlns:u="http://example.org/users" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" id="7">
  <u:Name>Alice &amp; co</u:Name>
  <u:Active>true</u:Active>
  <u:Role>admin</u:Role>
  <u:Role><![CDATA[<ops>]]></u:Role>
  <u:Manager xsi:nil="true"/>
</u:User>"#;
        let user = unmarshal(xml.as_bytes(), encoding_rs::UTF_8, &user_type()).unwrap();
        assert_eq!(user.get("id"), Some(&Value::Integer(7)));
        assert_eq!(user.get("Name"), Some(&Value::from("Alice & co")));
        assert_eq!(user.get("Active"), Some(&Value::Boolean(true)));
        assert_eq!(
            user.get("Role"),
            Some(&Value::List(vec!["admin".into(), "<ops>".into()]))
        );
        assert_eq!(user.get("Manager"), Some(&Value::Nil));
    }

    #[test]
    fn test_default_namespace_matches_prefixed() {
        let xml = r#"<User xmlns="http://example.org/users"><Name>Bob</Name></User>"#;
        let user = unmarshal(xml.as_bytes(), encoding_rs::UTF_8, &user_type()).unwrap();
        assert_eq!(user.get("Name"), Some(&Value::from("Bob")));
    }

    #[test]
    fn test_wrong_namespace_is_format_error() {
        let xml = r#"<User xmlns="http://example.org/users"><Name xmlns="urn:other">Bob</Name></User>"#;
        let err = unmarshal(xml.as_bytes(), encoding_rs::UTF_8, &user_type()).unwrap_err();
        assert!(matches!(err, SoapError::Format(_)));

        let xml = r#"<User><Name>Bob</Name></User>"#;
        let err = unmarshal(xml.as_bytes(), encoding_rs::UTF_8, &user_type()).unwrap_err();
        assert!(matches!(err, SoapError::Format(_)));
    }

    #[test]
    fn test_repeated_single_element_rejected() {
        let xml = r#"<User xmlns="http://example.org/users"><Name>Bob</Name><Name>Eve</Name></User>"#;
        let err = unmarshal(xml.as_bytes(), encoding_rs::UTF_8, &user_type()).unwrap_err();
        assert!(matches!(err, SoapError::Format(_)));
    }

    #[test]
    fn test_bounded_list_rejects_excess() {
        let ty = ComplexType::new("User", Some(NS.to_string())).with_child(
            ElementDef::simple("Role", SimpleType::String).with_max_occurs(Some(2)),
        );
        let two = r#"<User xmlns="http://example.org/users"><Role>a</Role><Role>b</Role></User>"#;
        let user = unmarshal(two.as_bytes(), encoding_rs::UTF_8, &ty).unwrap();
        assert_eq!(user.get("Role"), Some(&Value::List(vec!["a".into(), "b".into()])));

        let three = r#"<User xmlns="http://example.org/users"><Role>a</Role><Role>b</Role><Role>c</Role></User>"#;
        let err = unmarshal(three.as_bytes(), encoding_rs::UTF_8, &ty).unwrap_err();
        assert!(matches!(err, SoapError::Format(_)));
    }

    #[test]
    fn test_open_type_skips_unknown() {
        let mut ty = user_type();
        ty.open = true;
        let xml = r#"<User xmlns="http://example.org/users"><Extra><Deep/></Extra><Name>Bob</Name></User>"#;
        let user = unmarshal(xml.as_bytes(), encoding_rs::UTF_8, &ty).unwrap();
        assert_eq!(user.get("Name"), Some(&Value::from("Bob")));
        assert!(user.get("Extra").is_none());
    }

    #[test]
    fn test_doctype_rejected() {
        let xml = r#"<?xml version="1.0"?>
<!DOCTYPE foo [<!ENTITY xxe SYSTEM "file:///etc/passwd">]>
<User xmlns="http://example.org/users"><Name>&xxe;</Name></User>"#;
        let err = unmarshal(xml.as_bytes(), encoding_rs::UTF_8, &user_type()).unwrap_err();
        assert!(matches!(err, SoapError::Parse(_)));
    }

    #[test]
    fn test_malformed_xml() {
        let xml = r#"<User xmlns="http://example.org/users"><Name>Bob</User>"#;
        let err = unmarshal(xml.as_bytes(), encoding_rs::UTF_8, &user_type()).unwrap_err();
        assert!(matches!(err, SoapError::Parse(_)));

        let err = unmarshal(b"", encoding_rs::UTF_8, &user_type()).unwrap_err();
        assert!(matches!(err, SoapError::Parse(_)));
    }

    #[test]
    fn test_bad_simple_value() {
        let xml = r#"<User xmlns="http://example.org/users" id="seven"/>"#;
        let err = unmarshal(xml.as_bytes(), encoding_rs::UTF_8, &user_type()).unwrap_err();
        assert!(matches!(err, SoapError::Format(_)));
    }

    #[test]
    fn test_legacy_charset_decoding() {
        let xml = b"<User xmlns=\"http://example.org/users\"><Name>Ren\xe9</Name></User>";
        let user = unmarshal(xml, encoding_rs::WINDOWS_1252, &user_type()).unwrap();
        assert_eq!(user.get("Name"), Some(&Value::from("René")));
    }

    #[test]
    fn test_unmarshal_element() {
        let def = ElementDef::complex("User", user_type()).with_namespace(NS);
        let xml = r#"<User xmlns="http://example.org/users"><Name>Eve</Name></User>"#;
        let value = unmarshal_element(xml.as_bytes(), encoding_rs::UTF_8, &def).unwrap();
        let user = value.as_complex().unwrap();
        assert_eq!(user.get("Name"), Some(&Value::from("Eve")));
        assert_eq!(user.namespace(), Some(NS));
    }
}
