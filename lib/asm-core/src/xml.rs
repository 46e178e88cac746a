//! Owned XML documents.
//!
//! Response bodies are parsed with `roxmltree` and copied into an owned tree
//! so a resolved page can be shared across threads and outlive the buffer it
//! was parsed from. The same tree is used to build request bodies.
//!
//! # Example
//!
//! ```
//! use asm_core::{XmlDocument, XmlElement};
//!
//! let document = XmlDocument::parse(r#"<drl connectionid="c-42"><archive name="a"/></drl>"#)
//!     .expect("well-formed");
//! assert_eq!(document.root().attribute("connectionid"), Some("c-42"));
//! assert_eq!(document.elements_by_tag_name("archive").count(), 1);
//!
//! let request = XmlElement::new("drl").with_attribute("mode", "normal");
//! assert_eq!(request.to_string(), r#"<drl mode="normal"/>"#);
//! ```

use std::fmt::{self, Write as _};

use crate::{Error, Result};

/// Deepest element nesting accepted from a parsed document.
pub const MAX_DEPTH: usize = 256;

/// A parsed (or built) XML document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    doctype: Option<String>,
    root: XmlElement,
}

impl XmlDocument {
    /// Creates a document with the given root element.
    #[must_use]
    pub fn new(root: XmlElement) -> Self {
        Self {
            doctype: None,
            root,
        }
    }

    /// Sets the system identifier of the `DOCTYPE` declaration written on output.
    #[must_use]
    pub fn with_doctype(mut self, system_id: impl Into<String>) -> Self {
        self.doctype = Some(system_id.into());
        self
    }

    /// Parses a document from text.
    ///
    /// Documents carrying a `DOCTYPE` are accepted; external DTDs are not fetched.
    /// Elements nested deeper than [`MAX_DEPTH`] are rejected before parsing.
    pub fn parse(text: &str) -> Result<Self> {
        check_depth(text, MAX_DEPTH)?;
        let options = roxmltree::ParsingOptions {
            allow_dtd: true,
            ..roxmltree::ParsingOptions::default()
        };
        let document = roxmltree::Document::parse_with_options(text, options)
            .map_err(|e| Error::xml(e.to_string()))?;

        Ok(Self::new(XmlElement::from_node(document.root_element())))
    }

    /// Parses a document from UTF-8 bytes.
    pub fn parse_bytes(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes).map_err(|e| Error::xml(e.to_string()))?;
        Self::parse(text)
    }

    /// The root element.
    #[must_use]
    pub const fn root(&self) -> &XmlElement {
        &self.root
    }

    /// All elements with the given local name, in document order, root included.
    pub fn elements_by_tag_name<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.root
            .descendants()
            .filter(move |element| element.name == name)
    }

    /// Serializes the document with an XML declaration.
    #[must_use]
    pub fn to_xml_string(&self) -> String {
        let mut out = String::from(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        if let Some(system_id) = &self.doctype {
            let _ = write!(
                out,
                r#"<!DOCTYPE {} SYSTEM "{}">"#,
                self.root.name,
                escape(system_id)
            );
        }
        self.root.write_to(&mut out);
        out
    }
}

/// A node inside an [`XmlElement`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    /// A child element.
    Element(XmlElement),
    /// Character data (whitespace-only runs are dropped on parse).
    Text(String),
}

/// An XML element with attributes and children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<XmlNode>,
}

impl XmlElement {
    /// Creates an empty element.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Adds an attribute, replacing any previous value with the same name.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = value,
            None => self.attributes.push((name, value)),
        }
        self
    }

    /// Appends a child element.
    #[must_use]
    pub fn with_child(mut self, child: Self) -> Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    /// Appends character data.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(XmlNode::Text(text.into()));
        self
    }

    /// Local name of the element.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attribute value by local name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value.as_str())
    }

    /// All attributes in document order.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Child nodes.
    #[must_use]
    pub fn nodes(&self) -> &[XmlNode] {
        &self.children
    }

    /// Child elements.
    pub fn children(&self) -> impl Iterator<Item = &Self> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(element) => Some(element),
            XmlNode::Text(_) => None,
        })
    }

    /// First child element with the given name.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Self> {
        self.children().find(|child| child.name == name)
    }

    /// Concatenated direct character data.
    #[must_use]
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                XmlNode::Text(text) => Some(text.as_str()),
                XmlNode::Element(_) => None,
            })
            .collect()
    }

    /// This element and all of its descendants, depth-first in document order.
    #[must_use]
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants { stack: vec![self] }
    }

    fn from_node(node: roxmltree::Node<'_, '_>) -> Self {
        let attributes = node
            .attributes()
            .map(|attr| (attr.name().to_string(), attr.value().to_string()))
            .collect();

        let children = node
            .children()
            .filter_map(|child| {
                if child.is_element() {
                    Some(XmlNode::Element(Self::from_node(child)))
                } else if child.is_text() {
                    child
                        .text()
                        .filter(|text| !text.trim().is_empty())
                        .map(|text| XmlNode::Text(text.to_string()))
                } else {
                    None
                }
            })
            .collect();

        Self {
            name: node.tag_name().name().to_string(),
            attributes,
            children,
        }
    }

    fn write_to(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (name, value) in &self.attributes {
            let _ = write!(out, r#" {name}="{}""#, escape(value));
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for child in &self.children {
            match child {
                XmlNode::Element(element) => element.write_to(out),
                XmlNode::Text(text) => out.push_str(&escape(text)),
            }
        }
        let _ = write!(out, "</{}>", self.name);
    }
}

impl fmt::Display for XmlElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.write_to(&mut out);
        f.write_str(&out)
    }
}

/// Depth-first iterator over an element and its descendants.
#[derive(Debug)]
pub struct Descendants<'a> {
    stack: Vec<&'a XmlElement>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a XmlElement;

    fn next(&mut self) -> Option<Self::Item> {
        let element = self.stack.pop()?;
        let start = self.stack.len();
        self.stack.extend(element.children());
        if let Some(pushed) = self.stack.get_mut(start..) {
            pushed.reverse();
        }
        Some(element)
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

// ============================================================================
// Nesting guard
// ============================================================================

/// Rejects documents whose elements nest deeper than `limit`.
///
/// Runs ahead of `roxmltree`, which recurses per nesting level. Only the
/// markup structure is tracked; well-formedness is left to the parser.
fn check_depth(text: &str, limit: usize) -> Result<()> {
    let mut depth = 0usize;
    let mut rest = text;
    while let Some(open) = rest.find('<') {
        let tag = rest.get(open..).unwrap_or_default();
        rest = if let Some(after) = tag.strip_prefix("<!--") {
            skip_past(after, "-->")
        } else if let Some(after) = tag.strip_prefix("<![CDATA[") {
            skip_past(after, "]]>")
        } else if let Some(after) = tag.strip_prefix("<?") {
            skip_past(after, "?>")
        } else if let Some(after) = tag.strip_prefix("<!") {
            skip_declaration(after)
        } else if let Some(after) = tag.strip_prefix("</") {
            depth = depth.saturating_sub(1);
            skip_past(after, ">")
        } else {
            let (after, self_closing) = skip_start_tag(tag.get(1..).unwrap_or_default());
            if !self_closing {
                depth += 1;
                if depth > limit {
                    return Err(Error::xml(format!(
                        "elements nested deeper than {limit} levels"
                    )));
                }
            }
            after
        };
    }
    Ok(())
}

fn skip_past<'a>(text: &'a str, end: &str) -> &'a str {
    text.find(end)
        .and_then(|at| text.get(at + end.len()..))
        .unwrap_or_default()
}

/// Skips a `<!...>` declaration, including a bracketed internal subset.
fn skip_declaration(text: &str) -> &str {
    let mut subset = 0usize;
    for (at, c) in text.char_indices() {
        match c {
            '[' => subset += 1,
            ']' => subset = subset.saturating_sub(1),
            '>' if subset == 0 => return text.get(at + 1..).unwrap_or_default(),
            _ => {}
        }
    }
    ""
}

/// Skips past a start tag, honouring quoted attribute values. Reports
/// whether the tag closes itself.
fn skip_start_tag(text: &str) -> (&str, bool) {
    let mut quote = None;
    let mut previous = ' ';
    for (at, c) in text.char_indices() {
        match (quote, c) {
            (Some(open), c) if c == open => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '>') => return (text.get(at + 1..).unwrap_or_default(), previous == '/'),
            _ => {}
        }
        if !c.is_whitespace() {
            previous = c;
        }
    }
    ("", false)
}
