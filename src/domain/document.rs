//! In-memory structured document tree used as a read source.
//!
//! Content items are elements carrying an `isDoc` attribute; their other
//! child elements hold property values.

use std::fmt::Write as _;
use std::sync::Arc;

pub const IS_DOC_ATTRIBUTE: &str = "isDoc";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentChild {
    Element(Arc<DocumentNode>),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DocumentNode {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<DocumentChild>,
}

impl DocumentNode {
    pub fn element(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// A content-item element (flagged with `isDoc`).
    pub fn doc(name: impl Into<String>) -> Self {
        Self::element(name).with_attribute(IS_DOC_ATTRIBUTE, "")
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    pub fn with_child(mut self, child: DocumentNode) -> Self {
        self.children.push(DocumentChild::Element(Arc::new(child)));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(DocumentChild::Text(text.into()));
        self
    }

    /// Shorthand for a property element holding plain text.
    pub fn with_value(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.with_child(DocumentNode::element(name).with_text(value))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes()
            .find(|(candidate, _)| *candidate == name)
            .map(|(_, value)| value)
    }

    pub fn is_doc(&self) -> bool {
        self.attribute(IS_DOC_ATTRIBUTE).is_some()
    }

    pub fn elements(&self) -> impl Iterator<Item = &Arc<DocumentNode>> {
        self.children.iter().filter_map(|child| match child {
            DocumentChild::Element(element) => Some(element),
            DocumentChild::Text(_) => None,
        })
    }

    /// Child elements that are content items in their own right.
    pub fn doc_children(&self) -> impl Iterator<Item = &Arc<DocumentNode>> {
        self.elements().filter(|element| element.is_doc())
    }

    pub fn has_element_children(&self) -> bool {
        self.elements().next().is_some()
    }

    /// Holds element children, or attributes without any text.
    pub fn is_structured(&self) -> bool {
        if self.has_element_children() {
            return true;
        }
        !self.attributes.is_empty()
            && !self
                .children
                .iter()
                .any(|child| matches!(child, DocumentChild::Text(_)))
    }

    /// Concatenated text of this element and its descendants.
    pub fn text(&self) -> String {
        let mut buffer = String::new();
        self.collect_text(&mut buffer);
        buffer
    }

    fn collect_text(&self, buffer: &mut String) {
        for child in &self.children {
            match child {
                DocumentChild::Text(text) => buffer.push_str(text),
                DocumentChild::Element(element) => element.collect_text(buffer),
            }
        }
    }

    /// Markup of the element including its own tag.
    pub fn outer_markup(&self) -> String {
        let mut buffer = String::new();
        self.write_markup(&mut buffer);
        buffer
    }

    /// Markup of the element's children only.
    pub fn inner_markup(&self) -> String {
        let mut buffer = String::new();
        for child in &self.children {
            match child {
                DocumentChild::Text(text) => buffer.push_str(&escape(text)),
                DocumentChild::Element(element) => element.write_markup(&mut buffer),
            }
        }
        buffer
    }

    fn write_markup(&self, buffer: &mut String) {
        buffer.push('<');
        buffer.push_str(&self.name);
        for (name, value) in &self.attributes {
            let _ = write!(buffer, " {name}=\"{}\"", escape(value));
        }
        if self.children.is_empty() {
            buffer.push_str(" />");
            return;
        }
        buffer.push('>');
        buffer.push_str(&self.inner_markup());
        let _ = write!(buffer, "</{}>", self.name);
    }
}

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            other => escaped.push(other),
        }
    }
    escaped
}
