use std::fmt;
use std::str::FromStr;

use roxmltree::Node;

use crate::world::{Vec3, Vec3I};

pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";
pub const XSD_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";
const INDENT: &str = "  ";

/// Controls how forgiving document reads are.
///
/// Producers of world files are known to emit elements this engine does not
/// model, so the default skips unknown elements and attributes instead of
/// rejecting the document. `strict()` turns the first unknown node into an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOptions {
    pub ignore_unknown: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            ignore_unknown: true,
        }
    }
}

impl ReadOptions {
    pub fn strict() -> Self {
        Self {
            ignore_unknown: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeErrorCode {
    NotUtf8,
    XmlMalformed,
    InvalidRoot,
    UnknownElement,
    UnknownAttribute,
    MissingField,
    InvalidValue,
    Unregistered,
}

#[derive(Debug, Clone)]
pub struct DecodeError {
    pub code: DecodeErrorCode,
    pub message: String,
    pub location: Option<SourceLocation>,
}

impl DecodeError {
    pub fn new(code: DecodeErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            location: None,
        }
    }

    pub fn at_node(code: DecodeErrorCode, message: impl Into<String>, node: Node<'_, '_>) -> Self {
        let pos = node.document().text_pos_at(node.range().start);
        Self {
            code,
            message: message.into(),
            location: Some(SourceLocation {
                line: pos.row as usize,
                column: pos.col as usize,
            }),
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(
                f,
                "{:?}: {} (line={}, column={})",
                self.code, self.message, loc.line, loc.column
            ),
            None => write!(f, "{:?}: {}", self.code, self.message),
        }
    }
}

impl std::error::Error for DecodeError {}

pub(crate) fn element_children<'a, 'input>(
    node: Node<'a, 'input>,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|child| child.is_element())
}

pub(crate) fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    element_children(node).find(|child| child.tag_name().name() == name)
}

pub(crate) fn children_named<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    element_children(node).filter(move |child| child.tag_name().name() == name)
}

pub(crate) fn child_text(node: Node<'_, '_>, name: &str) -> Option<String> {
    child(node, name).map(|field| field.text().map(str::trim).unwrap_or_default().to_string())
}

pub(crate) fn parse_child<T: FromStr>(
    node: Node<'_, '_>,
    name: &str,
) -> Result<Option<T>, DecodeError> {
    let Some(field) = child(node, name) else {
        return Ok(None);
    };
    let raw = field.text().map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<T>().map(Some).map_err(|_| {
        DecodeError::at_node(
            DecodeErrorCode::InvalidValue,
            format!("<{name}> value '{raw}' is not valid"),
            field,
        )
    })
}

pub(crate) fn parse_attribute<T: FromStr>(
    node: Node<'_, '_>,
    name: &str,
) -> Result<Option<T>, DecodeError> {
    let Some(raw) = node.attribute(name) else {
        return Ok(None);
    };
    raw.trim().parse::<T>().map(Some).map_err(|_| {
        DecodeError::at_node(
            DecodeErrorCode::InvalidValue,
            format!(
                "attribute {}=\"{}\" on <{}> is not valid",
                name,
                raw,
                node.tag_name().name()
            ),
            node,
        )
    })
}

pub(crate) fn parse_bool_child(
    node: Node<'_, '_>,
    name: &str,
) -> Result<Option<bool>, DecodeError> {
    let Some(raw) = child_text(node, name) else {
        return Ok(None);
    };
    match raw.to_ascii_lowercase().as_str() {
        "" => Ok(None),
        "true" | "1" => Ok(Some(true)),
        "false" | "0" => Ok(Some(false)),
        _ => Err(DecodeError::at_node(
            DecodeErrorCode::InvalidValue,
            format!("<{name}> value '{raw}' is not a boolean"),
            node,
        )),
    }
}

/// Reads `x`/`y`/`z` attributes; absent components are zero.
pub(crate) fn read_vec3(node: Node<'_, '_>) -> Result<Vec3, DecodeError> {
    Ok(Vec3 {
        x: parse_attribute(node, "x")?.unwrap_or_default(),
        y: parse_attribute(node, "y")?.unwrap_or_default(),
        z: parse_attribute(node, "z")?.unwrap_or_default(),
    })
}

pub(crate) fn read_vec3i(node: Node<'_, '_>) -> Result<Vec3I, DecodeError> {
    Ok(Vec3I {
        x: parse_attribute(node, "x")?.unwrap_or_default(),
        y: parse_attribute(node, "y")?.unwrap_or_default(),
        z: parse_attribute(node, "z")?.unwrap_or_default(),
    })
}

/// In strict mode rejects child elements and attributes outside the known lists.
/// Namespaced attributes (`xsi:type`, `xmlns:*`) are always allowed.
pub(crate) fn expect_known(
    node: Node<'_, '_>,
    elements: &[&str],
    attributes: &[&str],
    options: &ReadOptions,
) -> Result<(), DecodeError> {
    if options.ignore_unknown {
        return Ok(());
    }
    for field in element_children(node) {
        let name = field.tag_name().name();
        if !elements.contains(&name) {
            return Err(DecodeError::at_node(
                DecodeErrorCode::UnknownElement,
                format!("unknown element <{}> in <{}>", name, node.tag_name().name()),
                field,
            ));
        }
    }
    for attribute in node.attributes() {
        if attribute.namespace().is_some() {
            continue;
        }
        if !attributes.contains(&attribute.name()) {
            return Err(DecodeError::at_node(
                DecodeErrorCode::UnknownAttribute,
                format!(
                    "unknown attribute '{}' on <{}>",
                    attribute.name(),
                    node.tag_name().name()
                ),
                node,
            ));
        }
    }
    Ok(())
}

/// Minimal pretty-printing XML writer with fixed two-space indentation.
#[derive(Debug, Default)]
pub struct XmlWriter {
    out: String,
    open: Vec<String>,
}

impl XmlWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declaration(&mut self) {
        self.out
            .push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    }

    pub fn start(&mut self, name: &str, attributes: &[(&str, &str)]) {
        self.indent();
        self.out.push('<');
        self.out.push_str(name);
        self.push_attributes(attributes);
        self.out.push_str(">\n");
        self.open.push(name.to_string());
    }

    pub fn end(&mut self) {
        if let Some(name) = self.open.pop() {
            self.indent();
            self.out.push_str("</");
            self.out.push_str(&name);
            self.out.push_str(">\n");
        }
    }

    pub fn empty(&mut self, name: &str, attributes: &[(&str, &str)]) {
        self.indent();
        self.out.push('<');
        self.out.push_str(name);
        self.push_attributes(attributes);
        self.out.push_str(" />\n");
    }

    pub fn text_element(&mut self, name: &str, text: &str) {
        self.indent();
        self.out.push('<');
        self.out.push_str(name);
        self.out.push('>');
        self.out.push_str(&escape(text));
        self.out.push_str("</");
        self.out.push_str(name);
        self.out.push_str(">\n");
    }

    pub fn display_element(&mut self, name: &str, value: impl fmt::Display) {
        self.text_element(name, &value.to_string());
    }

    pub fn vec3(&mut self, name: &str, value: Vec3) {
        let (x, y, z) = (value.x.to_string(), value.y.to_string(), value.z.to_string());
        self.empty(name, &[("x", &x), ("y", &y), ("z", &z)]);
    }

    pub fn vec3i(&mut self, name: &str, value: Vec3I) {
        let (x, y, z) = (value.x.to_string(), value.y.to_string(), value.z.to_string());
        self.empty(name, &[("x", &x), ("y", &y), ("z", &z)]);
    }

    pub fn comment(&mut self, text: &str) {
        self.indent();
        self.out.push_str("<!--");
        self.out.push_str(&text.replace("--", "- -"));
        self.out.push_str("-->\n");
    }

    /// Closes anything still open and returns the document text.
    pub fn finish(mut self) -> String {
        while !self.open.is_empty() {
            self.end();
        }
        self.out
    }

    fn indent(&mut self) {
        for _ in 0..self.open.len() {
            self.out.push_str(INDENT);
        }
    }

    fn push_attributes(&mut self, attributes: &[(&str, &str)]) {
        for (name, value) in attributes {
            self.out.push(' ');
            self.out.push_str(name);
            self.out.push_str("=\"");
            self.out.push_str(&escape(value));
            self.out.push('"');
        }
    }
}

fn escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
