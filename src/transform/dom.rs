//! Owned element tree and XHTML serializer.
//!
//! Chapter markup is parsed with `scraper` (html5ever), then copied into
//! this small owned tree so the rewriting passes can mutate it freely.
//! Serialization follows XML rules: void elements self-close, text and
//! attribute values are escaped, comments are dropped, and attributes
//! whose names are not valid XML names are skipped.

use scraper::{ElementRef, Node as HtmlNode};

use crate::naming::escape_xml;

/// HTML elements that never have content.
const VOID_ELEMENTS: [&str; 14] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Namespace prefixes declared on the document element.
const DECLARED_PREFIXES: [&str; 2] = ["xml", "epub"];

const SVG_NAMESPACE: &str = "http://www.w3.org/2000/svg";
const MATHML_NAMESPACE: &str = "http://www.w3.org/1998/Math/MathML";
const XLINK_NAMESPACE: &str = "http://www.w3.org/1999/xlink";

/// A node of the owned tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An element with ordered attributes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    /// Local name as produced by the HTML parser.
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
    /// True inside `<svg>` or `<math>` subtrees.
    pub foreign: bool,
}

impl Element {
    /// Creates an empty HTML element.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Copies a parsed element and its subtree.
    #[must_use]
    pub fn from_html(element: ElementRef<'_>) -> Self {
        Self::copy(element, false)
    }

    fn copy(element: ElementRef<'_>, foreign_parent: bool) -> Self {
        let value = element.value();
        let name = value.name().to_string();
        let foreign = foreign_parent || name == "svg" || name == "math";
        let attrs = value
            .attrs()
            .map(|(key, val)| (key.to_string(), val.to_string()))
            .collect();

        let mut children = Vec::new();
        for child in element.children() {
            match child.value() {
                HtmlNode::Text(text) => children.push(Node::Text(String::from(&**text))),
                HtmlNode::Element(_) => {
                    if let Some(child_element) = ElementRef::wrap(child) {
                        children.push(Node::Element(Self::copy(child_element, foreign)));
                    }
                }
                _ => {}
            }
        }

        Self {
            name,
            attrs,
            children,
            foreign,
        }
    }

    /// Value of the attribute `name`.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Sets `name`, replacing an existing value in place.
    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attrs.iter_mut().find(|(key, _)| key == name) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((name.to_string(), value)),
        }
    }

    /// Removes `name` if present.
    pub fn remove_attr(&mut self, name: &str) {
        self.attrs.retain(|(key, _)| key != name);
    }

    /// Builder form of [`set_attr`](Self::set_attr).
    #[must_use]
    pub fn with_attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Child elements, skipping text.
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|child| match child {
            Node::Element(element) => Some(element),
            Node::Text(_) => None,
        })
    }

    /// Calls `visit` on this element and every descendant, parents first.
    pub fn walk_mut(&mut self, visit: &mut impl FnMut(&mut Element)) {
        visit(self);
        for child in &mut self.children {
            if let Node::Element(element) = child {
                element.walk_mut(visit);
            }
        }
    }

    /// First element in document order (this one included) matching `predicate`.
    pub fn find(&self, predicate: &impl Fn(&Element) -> bool) -> Option<&Element> {
        if predicate(self) {
            return Some(self);
        }
        self.child_elements().find_map(|child| child.find(predicate))
    }

    /// Concatenated text of the subtree.
    #[must_use]
    pub fn text(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }

    /// Serializes the subtree as XHTML.
    #[must_use]
    pub fn to_xhtml(&self) -> String {
        let mut out = String::new();
        write_element(self, false, &mut out);
        out
    }
}

fn collect_text(element: &Element, out: &mut String) {
    for child in &element.children {
        match child {
            Node::Text(text) => out.push_str(text),
            Node::Element(inner) => collect_text(inner, out),
        }
    }
}

/// Whether `name` can be written as an attribute name in the package.
fn is_writable_attr(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_alphabetic() || first == '_') {
        return false;
    }
    if !chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')) {
        return false;
    }
    match name.split_once(':') {
        None => true,
        Some((prefix, local)) => {
            DECLARED_PREFIXES.contains(&prefix) && !local.is_empty() && !local.contains(':')
        }
    }
}

fn write_element(element: &Element, inside_foreign: bool, out: &mut String) {
    out.push('<');
    out.push_str(&element.name);

    let foreign_root = element.foreign && !inside_foreign;
    if foreign_root {
        let namespace = if element.name == "math" {
            MATHML_NAMESPACE
        } else {
            SVG_NAMESPACE
        };
        out.push_str(&format!(" xmlns=\"{namespace}\" xmlns:xlink=\"{XLINK_NAMESPACE}\""));
    }

    for (key, value) in &element.attrs {
        let name = if element.foreign {
            // Namespace declarations are emitted on the foreign root.
            if key == "xmlns" || key == "xlink" {
                continue;
            }
            if key == "href" { "xlink:href" } else { key.as_str() }
        } else {
            key.as_str()
        };
        if name != "xlink:href" && !is_writable_attr(name) {
            continue;
        }
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        out.push_str(&escape_xml(value));
        out.push('"');
    }

    let is_void = !element.foreign && VOID_ELEMENTS.contains(&element.name.as_str());
    if element.children.is_empty() && (is_void || element.foreign) {
        out.push_str("/>");
        return;
    }
    out.push('>');
    if !is_void {
        for child in &element.children {
            match child {
                Node::Text(text) => out.push_str(&escape_xml(text)),
                Node::Element(inner) => write_element(inner, element.foreign, out),
            }
        }
    }
    out.push_str("</");
    out.push_str(&element.name);
    out.push('>');
}
