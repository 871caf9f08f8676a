//! In-memory XML tree.
//!
//! # Responsibilities
//! - Parse text into an owned element tree (quick-xml events)
//! - Serialize back to escaped XML text
//! - Answer simple path queries with prefix-insensitive name matching
//!
//! # Path Syntax
//! ```text
//! //name      any descendant named `name` (document root included)
//! /a/b        root `a`, child `b`
//! a/b         same as /a/b when asked on a document, children of self on an element
//! *           any element
//! soap:Body   matches `Body` regardless of prefix
//! ```

use std::fmt;

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum XmlError {
    #[error("malformed XML at byte {position}: {message}")]
    Syntax { position: u64, message: String },

    #[error("document has no root element")]
    NoRoot,

    #[error("document has more than one root element")]
    MultipleRoots,

    #[error("unexpected closing tag `{0}`")]
    UnexpectedEnd(String),

    #[error("element `{0}` is never closed")]
    Unclosed(String),

    #[error("text content outside the root element")]
    TextOutsideRoot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
    CData(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

/// A parsed document. Declarations, comments and processing instructions
/// are not preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    pub root: XmlElement,
}

fn local(name: &str) -> &str {
    name.rsplit_once(':').map(|(_, l)| l).unwrap_or(name)
}

fn name_matches(element: &XmlElement, step: &str) -> bool {
    step == "*" || local(&element.name) == local(step)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
}

fn parse_path(path: &str) -> Vec<(Axis, &str)> {
    let mut steps = Vec::new();
    let mut axis = Axis::Child;
    let trimmed = path.trim();
    let trimmed = trimmed.strip_prefix('/').unwrap_or(trimmed);
    for part in trimmed.split('/') {
        if part.is_empty() {
            axis = Axis::Descendant;
            continue;
        }
        steps.push((axis, part));
        axis = Axis::Child;
    }
    steps
}

fn collect_matching<'a>(element: &'a XmlElement, step: &str, out: &mut Vec<&'a XmlElement>) {
    if name_matches(element, step) {
        out.push(element);
    }
    for child in element.child_elements() {
        collect_matching(child, step, out);
    }
}

fn apply_steps<'a>(mut current: Vec<&'a XmlElement>, steps: &[(Axis, &str)]) -> Vec<&'a XmlElement> {
    for &(axis, step) in steps {
        let mut next = Vec::new();
        for element in current {
            for child in element.child_elements() {
                match axis {
                    Axis::Child if name_matches(child, step) => next.push(child),
                    Axis::Child => {}
                    Axis::Descendant => collect_matching(child, step, &mut next),
                }
            }
        }
        current = next;
    }
    current
}

fn syntax_error(reader: &Reader<&[u8]>, message: impl fmt::Display) -> XmlError {
    XmlError::Syntax {
        position: reader.buffer_position() as u64,
        message: message.to_string(),
    }
}

fn start_element(reader: &Reader<&[u8]>, start: &BytesStart<'_>) -> Result<XmlElement, XmlError> {
    let mut element = XmlElement::new(String::from_utf8_lossy(start.name().as_ref()));
    for attr in start.attributes() {
        let attr = attr.map_err(|e| syntax_error(reader, e))?;
        let value = attr.unescape_value().map_err(|e| syntax_error(reader, e))?;
        element
            .attributes
            .push((String::from_utf8_lossy(attr.key.as_ref()).into_owned(), value.into_owned()));
    }
    Ok(element)
}

impl XmlDocument {
    pub fn new(root: XmlElement) -> Self {
        Self { root }
    }

    pub fn parse(input: &str) -> Result<Self, XmlError> {
        let mut reader = Reader::from_str(input);

        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        let mut finish = |element: XmlElement, stack: &mut Vec<XmlElement>| -> Result<(), XmlError> {
            match stack.last_mut() {
                Some(parent) => {
                    parent.children.push(XmlNode::Element(element));
                    Ok(())
                }
                None if root.is_some() => Err(XmlError::MultipleRoots),
                None => {
                    root = Some(element);
                    Ok(())
                }
            }
        };

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let element = start_element(&reader, &e)?;
                    stack.push(element);
                }
                Ok(Event::Empty(e)) => {
                    let element = start_element(&reader, &e)?;
                    finish(element, &mut stack)?;
                }
                Ok(Event::End(e)) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| XmlError::UnexpectedEnd(String::from_utf8_lossy(e.name().as_ref()).into_owned()))?;
                    finish(element, &mut stack)?;
                }
                Ok(Event::Text(t)) => {
                    let text = t.unescape().map_err(|e| syntax_error(&reader, e))?;
                    // Indentation between elements is dropped; other text is kept verbatim.
                    if text.trim().is_empty() {
                        continue;
                    }
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(XmlNode::Text(text.into_owned())),
                        None => return Err(XmlError::TextOutsideRoot),
                    }
                }
                Ok(Event::CData(c)) => {
                    let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(XmlNode::CData(text)),
                        None => return Err(XmlError::TextOutsideRoot),
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(syntax_error(&reader, e)),
            }
        }

        if let Some(open) = stack.pop() {
            return Err(XmlError::Unclosed(open.name));
        }
        root.map(XmlDocument::new).ok_or(XmlError::NoRoot)
    }

    /// First element matching `path`.
    pub fn select(&self, path: &str) -> Option<&XmlElement> {
        self.select_all(path).into_iter().next()
    }

    /// Every element matching `path`, in document order.
    pub fn select_all(&self, path: &str) -> Vec<&XmlElement> {
        self.root.select_all_as_root(path)
    }

    pub fn strip_namespaces(&mut self) {
        self.root.strip_namespaces();
    }

    pub fn into_root(self) -> XmlElement {
        self.root
    }
}

impl fmt::Display for XmlDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.root.fmt(f)
    }
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attribute(name, value);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(XmlNode::Text(text.into()));
        self
    }

    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    pub fn push_child(&mut self, child: XmlElement) {
        self.children.push(XmlNode::Element(child));
    }

    /// Element name without its namespace prefix.
    pub fn local_name(&self) -> &str {
        local(&self.name)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == name) {
            Some(existing) => existing.1 = value,
            None => self.attributes.push((name, value)),
        }
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(e) => Some(e),
            _ => None,
        })
    }

    /// Concatenated text of this element and all its descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                XmlNode::Text(t) | XmlNode::CData(t) => out.push_str(t),
                XmlNode::Element(e) => e.collect_text(out),
            }
        }
    }

    /// Replace all children with a single text node.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.children.clear();
        self.children.push(XmlNode::Text(text.into()));
    }

    pub fn select(&self, path: &str) -> Option<&XmlElement> {
        self.select_all(path).into_iter().next()
    }

    /// Elements matching `path` relative to this element.
    pub fn select_all(&self, path: &str) -> Vec<&XmlElement> {
        apply_steps(vec![self], &parse_path(path))
    }

    /// Evaluate `path` as if this element were a document root.
    pub fn select_as_root(&self, path: &str) -> Option<&XmlElement> {
        self.select_all_as_root(path).into_iter().next()
    }

    pub fn select_all_as_root(&self, path: &str) -> Vec<&XmlElement> {
        let steps = parse_path(path);
        let Some((&(axis, step), rest)) = steps.split_first() else {
            return Vec::new();
        };
        let mut first = Vec::new();
        match axis {
            Axis::Child if name_matches(self, step) => first.push(self),
            Axis::Child => {}
            Axis::Descendant => collect_matching(self, step, &mut first),
        }
        apply_steps(first, rest)
    }

    /// Depth-first search for a descendant with the given local name.
    pub fn find_descendant(&self, local_name: &str) -> Option<&XmlElement> {
        for child in self.child_elements() {
            if child.local_name() == local_name {
                return Some(child);
            }
            if let Some(found) = child.find_descendant(local_name) {
                return Some(found);
            }
        }
        None
    }

    pub fn find_descendant_mut(&mut self, local_name: &str) -> Option<&mut XmlElement> {
        for child in self.children.iter_mut() {
            if let XmlNode::Element(element) = child {
                if element.local_name() == local_name {
                    return Some(element);
                }
                if let Some(found) = element.find_descendant_mut(local_name) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Drop prefixes from element and attribute names and remove `xmlns` declarations.
    pub fn strip_namespaces(&mut self) {
        self.name = local(&self.name).to_string();
        self.attributes
            .retain(|(k, _)| k != "xmlns" && !k.starts_with("xmlns:"));
        for (k, _) in self.attributes.iter_mut() {
            *k = local(k).to_string();
        }
        for child in self.children.iter_mut() {
            if let XmlNode::Element(element) = child {
                element.strip_namespaces();
            }
        }
    }
}

impl fmt::Display for XmlElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.name)?;
        for (k, v) in &self.attributes {
            write!(f, " {}=\"{}\"", k, escape(v.as_str()))?;
        }
        if self.children.is_empty() {
            return f.write_str("/>");
        }
        f.write_str(">")?;
        for child in &self.children {
            match child {
                XmlNode::Element(e) => e.fmt(f)?,
                XmlNode::Text(t) => f.write_str(&escape(t.as_str()))?,
                // `]]>` cannot appear inside a section; split it across two.
                XmlNode::CData(t) => write!(f, "<![CDATA[{}]]>", t.replace("]]>", "]]]]><![CDATA[>"))?,
            }
        }
        write!(f, "</{}>", self.name)
    }
}
