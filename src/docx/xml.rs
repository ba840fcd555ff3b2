//! Minimal owned XML element tree for OOXML parts.
//!
//! Parts are read with `quick_xml::Reader` into [`Element`]s that keep
//! qualified names (`w:p`), attributes in document order and text nodes
//! verbatim, then written back with `quick_xml::Writer`. Comments and
//! processing instructions are dropped; the declaration is regenerated.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::error::{DceError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    pub fn is(&self, name: &str) -> bool {
        self.name == name
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.attrs.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((key, value)),
        }
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|e| e.is(name))
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.elements_mut().find(|e| e.is(name))
    }

    /// Returns the named child, inserting an empty one at `index` when absent.
    pub fn ensure_child_at(&mut self, name: &str, index: usize) -> &mut Element {
        let pos = self
            .children
            .iter()
            .position(|n| matches!(n, Node::Element(e) if e.is(name)));
        let pos = match pos {
            Some(pos) => pos,
            None => {
                let at = index.min(self.children.len());
                self.children.insert(at, Node::Element(Element::new(name)));
                at
            }
        };
        match &mut self.children[pos] {
            Node::Element(e) => e,
            Node::Text(_) => unreachable!("position points at an element"),
        }
    }

    /// Returns the named child, inserting an empty one before the first child
    /// listed in `followers` (or at the end) when absent.
    ///
    /// OOXML property elements have a fixed child order; `followers` lists the
    /// siblings that must come after `name`.
    pub fn ensure_child_before(&mut self, name: &str, followers: &[&str]) -> &mut Element {
        let index = self
            .children
            .iter()
            .position(|n| matches!(n, Node::Element(e) if followers.contains(&e.name.as_str())))
            .unwrap_or(self.children.len());
        self.ensure_child_at(name, index)
    }

    /// Removes every direct child element matching `pred`.
    pub fn remove_children(&mut self, pred: impl Fn(&Element) -> bool) {
        self.children.retain(|n| match n {
            Node::Element(e) => !pred(e),
            Node::Text(_) => true,
        });
    }

    /// Whether any descendant (or self) satisfies `pred`.
    pub fn any_descendant(&self, pred: &impl Fn(&Element) -> bool) -> bool {
        pred(self) || self.elements().any(|e| e.any_descendant(pred))
    }

    /// Visits every descendant element (and self), depth first.
    pub fn walk_mut(&mut self, f: &mut impl FnMut(&mut Element)) {
        f(self);
        for child in self.elements_mut() {
            child.walk_mut(f);
        }
    }

    /// Concatenated text nodes of this element only.
    pub fn own_text(&self) -> String {
        self.children
            .iter()
            .filter_map(|n| match n {
                Node::Text(t) => Some(t.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }
}

fn start_to_element(part: &str, e: &BytesStart<'_>) -> Result<Element> {
    let mut element = Element::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
    for attr in e.attributes() {
        let attr = attr.map_err(|err| DceError::xml(part, err))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| DceError::xml(part, err))?
            .into_owned();
        element.attrs.push((key, value));
    }
    Ok(element)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, node: Node) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => {
            if let Node::Element(e) = node {
                if root.is_none() {
                    *root = Some(e);
                }
            }
        }
    }
}

/// Parses an XML part into its root element.
pub fn parse(part: &str, xml: &[u8]) -> Result<Element> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => stack.push(start_to_element(part, &e)?),
            Ok(Event::Empty(e)) => {
                let element = start_to_element(part, &e)?;
                attach(&mut stack, &mut root, Node::Element(element));
            }
            Ok(Event::End(_)) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| DceError::xml(part, "unbalanced end tag"))?;
                attach(&mut stack, &mut root, Node::Element(element));
            }
            Ok(Event::Text(te)) => {
                if !stack.is_empty() {
                    let text = te.unescape().map_err(|err| DceError::xml(part, err))?;
                    attach(&mut stack, &mut root, Node::Text(text.into_owned()));
                }
            }
            Ok(Event::CData(cd)) => {
                if !stack.is_empty() {
                    let text = String::from_utf8_lossy(&cd.into_inner()).into_owned();
                    attach(&mut stack, &mut root, Node::Text(text));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(DceError::xml(part, e)),
            _ => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(DceError::xml(part, "unexpected end of document"));
    }
    root.ok_or_else(|| DceError::xml(part, "no root element"))
}

fn write_element(
    part: &str,
    writer: &mut quick_xml::Writer<Vec<u8>>,
    element: &Element,
) -> Result<()> {
    let mut start = BytesStart::new(element.name.as_str());
    for (k, v) in &element.attrs {
        start.push_attribute((k.as_str(), v.as_str()));
    }
    if element.children.is_empty() {
        writer
            .write_event(Event::Empty(start))
            .map_err(|e| DceError::xml(part, e))?;
        return Ok(());
    }
    writer
        .write_event(Event::Start(start))
        .map_err(|e| DceError::xml(part, e))?;
    for child in &element.children {
        match child {
            Node::Element(e) => write_element(part, writer, e)?,
            Node::Text(t) => writer
                .write_event(Event::Text(BytesText::new(t)))
                .map_err(|e| DceError::xml(part, e))?,
        }
    }
    writer
        .write_event(Event::End(BytesEnd::new(element.name.as_str())))
        .map_err(|e| DceError::xml(part, e))?;
    Ok(())
}

/// Serializes a root element with a standalone UTF-8 declaration.
pub fn write(part: &str, root: &Element) -> Result<Vec<u8>> {
    let mut writer = quick_xml::Writer::new(Vec::new());
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))
        .map_err(|e| DceError::xml(part, e))?;
    write_element(part, &mut writer, root)?;
    Ok(writer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:r><w:t xml:space="preserve"> A &amp; B </w:t></w:r></w:p><w:sectPr/></w:body></w:document>"#;

    #[test]
    fn parse_keeps_names_attributes_and_text() {
        let root = parse("word/document.xml", SAMPLE.as_bytes()).unwrap();
        assert_eq!(root.name, "w:document");
        assert!(root.attr("xmlns:w").is_some());
        let body = root.child("w:body").unwrap();
        let t = body
            .child("w:p")
            .and_then(|p| p.child("w:r"))
            .and_then(|r| r.child("w:t"))
            .unwrap();
        assert_eq!(t.attr("xml:space"), Some("preserve"));
        assert_eq!(t.own_text(), " A & B ");
        assert!(body.child("w:sectPr").is_some());
    }

    #[test]
    fn write_then_parse_preserves_tree() {
        let root = parse("part", SAMPLE.as_bytes()).unwrap();
        let bytes = write("part", &root).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>"));
        assert!(text.contains("A &amp; B"));
        assert!(text.contains("<w:sectPr/>"));
        assert_eq!(parse("part", &bytes).unwrap(), root);
    }

    #[test]
    fn malformed_xml_is_an_error() {
        let err = parse("part", b"<a><b></a>").unwrap_err();
        assert!(matches!(err, DceError::Xml { .. }));
    }

    #[test]
    fn ensure_child_inserts_once() {
        let mut p = Element::new("w:p").with_child(Element::new("w:r"));
        p.ensure_child_at("w:pPr", 0).set_attr("x", "1");
        p.ensure_child_at("w:pPr", 0).set_attr("x", "2");
        assert_eq!(p.elements().count(), 2);
        assert_eq!(p.elements().next().unwrap().attr("x"), Some("2"));
    }
}
