//! Small owned markup tree
//!
//! The extractor works against this tree instead of a parser's native types.
//! Any HTML parser can produce it; [`parse_document`] uses `scraper`.

use scraper::{ElementRef, Html, Node};

/// A node of the markup tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupNode {
    Element(Element),
    Text(String),
}

/// An element with its attributes and children
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    /// Lowercase tag name
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<MarkupNode>,
}

impl Element {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Whether the `class` attribute contains `token`
    pub fn has_class(&self, token: &str) -> bool {
        self.attr("class")
            .map(|classes| classes.split_whitespace().any(|c| c == token))
            .unwrap_or(false)
    }

    /// All descendant elements in document order (self excluded)
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants {
            stack: self.children.iter().rev().collect(),
        }
    }

    /// First descendant element named `name`
    pub fn find(&self, name: &str) -> Option<&Element> {
        self.descendants().find(|e| e.name == name)
    }

    /// Concatenated text of all descendants
    pub fn text(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }

    /// Text with runs of whitespace collapsed and ends trimmed
    pub fn clean_text(&self) -> String {
        self.text().split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Renders the children of this element back to markup
    ///
    /// Attributes are written with single quotes (`<span class='st'>`) and
    /// text is entity-encoded, so the output can be searched for fixed
    /// fragments and stripped of tags without losing literal `<`.
    pub fn inner_markup(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            render(child, &mut out);
        }
        out
    }
}

/// Depth-first iterator over descendant elements
pub struct Descendants<'a> {
    stack: Vec<&'a MarkupNode>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(node) = self.stack.pop() {
            if let MarkupNode::Element(element) = node {
                self.stack.extend(element.children.iter().rev());
                return Some(element);
            }
        }
        None
    }
}

fn collect_text(nodes: &[MarkupNode], out: &mut String) {
    for node in nodes {
        match node {
            MarkupNode::Text(text) => out.push_str(text),
            MarkupNode::Element(element) => collect_text(&element.children, out),
        }
    }
}

fn render(node: &MarkupNode, out: &mut String) {
    match node {
        MarkupNode::Text(text) => out.push_str(&html_escape::encode_text(text)),
        MarkupNode::Element(element) => {
            out.push('<');
            out.push_str(&element.name);
            for (key, value) in &element.attrs {
                out.push(' ');
                out.push_str(key);
                out.push_str("='");
                out.push_str(&html_escape::encode_single_quoted_attribute(value));
                out.push('\'');
            }
            out.push('>');
            for child in &element.children {
                render(child, out);
            }
            out.push_str("</");
            out.push_str(&element.name);
            out.push('>');
        }
    }
}

/// Parses an HTML document into a tree rooted at `<html>`
///
/// Parsing never fails; broken markup is repaired the way browsers do it.
pub fn parse_document(markup: &str) -> Element {
    let document = Html::parse_document(markup);
    convert(document.root_element())
}

fn convert(element: ElementRef<'_>) -> Element {
    let value = element.value();
    let mut converted = Element {
        name: value.name().to_ascii_lowercase(),
        attrs: value
            .attrs()
            .map(|(key, val)| (key.to_string(), val.to_string()))
            .collect(),
        children: Vec::new(),
    };

    for child in element.children() {
        match child.value() {
            Node::Element(_) => {
                if let Some(child_element) = ElementRef::wrap(child) {
                    converted
                        .children
                        .push(MarkupNode::Element(convert(child_element)));
                }
            }
            Node::Text(text) => converted.children.push(MarkupNode::Text(text.to_string())),
            // Comments, doctypes and processing instructions carry no results
            _ => {}
        }
    }

    converted
}
