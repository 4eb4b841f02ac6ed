//! XML payloads of the Payment Action API.
//!
//! Requests are serialized in a fixed element order; responses are parsed into a
//! small owned tree ([`XmlDocument`]) that can be re-serialized with indentation
//! for display. Comments, processing instructions and the DOCTYPE are dropped;
//! CDATA sections become text.
//!
//! # Examples
//!
//! ```
//! use pgw_envelope::{
//!     api::{PaymentActionRequest, ProcessType},
//!     xml::{build_request_xml, parse_response_xml},
//! };
//!
//! # fn example() -> pgw_envelope::error::Result<()> {
//! let request = PaymentActionRequest::new("704704000000211", "INV1", ProcessType::Inquiry)
//!     .with_time_stamp("240101120000");
//! let xml = build_request_xml(&request)?;
//! assert!(xml.starts_with("<PaymentProcessRequest><version>3.8</version>"));
//!
//! let document = parse_response_xml(&xml)?;
//! assert_eq!(document.root.child_text("invoiceNo").as_deref(), Some("INV1"));
//! # Ok(())
//! # }
//! ```

use std::{borrow::Cow, fmt, io::Cursor};

use quick_xml::{
    Reader, Writer,
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
};

use crate::{
    api::PaymentActionRequest,
    error::{HarnessError, Result},
};

/// Root element of a Payment Action request.
pub const REQUEST_ROOT: &str = "PaymentProcessRequest";

const INDENT: usize = 2;

/// Child of an [`XmlElement`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    /// Nested element.
    Element(XmlElement),
    /// Unescaped character data.
    Text(String),
}

/// Element with its attributes and children in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    /// Qualified element name.
    pub name: String,
    /// Attributes in document order, values unescaped.
    pub attributes: Vec<(String, String)>,
    /// Child nodes in document order.
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    /// Creates an element without attributes or children.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), attributes: Vec::new(), children: Vec::new() }
    }

    /// Child elements, skipping text.
    pub fn elements(&self) -> impl Iterator<Item = &Self> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(element) => Some(element),
            XmlNode::Text(_) => None,
        })
    }

    /// First child element named `name`.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Self> {
        self.elements().find(|element| element.name == name)
    }

    /// Concatenated text of the direct text children.
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

    /// Text of the first child element named `name`, e.g. `respCode`.
    #[must_use]
    pub fn child_text(&self, name: &str) -> Option<String> {
        self.child(name).map(Self::text)
    }

    fn from_start(start: &BytesStart<'_>) -> Result<Self> {
        let name = utf8(start.name().as_ref())?.to_owned();
        let mut attributes = Vec::new();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(|e| HarnessError::Xml(e.to_string()))?;
            let key = utf8(attribute.key.as_ref())?.to_owned();
            let value = attribute
                .unescape_value()
                .map_err(|e| HarnessError::Xml(e.to_string()))?
                .into_owned();
            attributes.push((key, value));
        }
        Ok(Self { name, attributes, children: Vec::new() })
    }

    fn write<W: std::io::Write>(&self, writer: &mut Writer<W>) -> Result<()> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        if self.children.is_empty() {
            return write_event(writer, Event::Empty(start));
        }

        write_event(writer, Event::Start(start))?;
        for child in &self.children {
            match child {
                XmlNode::Element(element) => element.write(writer)?,
                XmlNode::Text(text) => write_event(writer, Event::Text(BytesText::new(text)))?,
            }
        }
        write_event(writer, Event::End(BytesEnd::new(self.name.as_str())))
    }
}

/// `<?xml ...?>` declaration of a parsed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDeclaration {
    /// `version` pseudo-attribute.
    pub version: String,
    /// `encoding` pseudo-attribute, if present.
    pub encoding: Option<String>,
    /// `standalone` pseudo-attribute, if present.
    pub standalone: Option<String>,
}

impl XmlDeclaration {
    fn from_decl(decl: &BytesDecl<'_>) -> Result<Self> {
        let version = decl.version().map_err(|e| HarnessError::Xml(e.to_string()))?;
        Ok(Self {
            version: utf8(&version)?.to_owned(),
            encoding: optional_pseudo_attribute(decl.encoding())?,
            standalone: optional_pseudo_attribute(decl.standalone())?,
        })
    }
}

/// Parsed XML document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    /// Declaration, if the input had one.
    pub declaration: Option<XmlDeclaration>,
    /// Root element.
    pub root: XmlElement,
}

impl XmlDocument {
    /// Serializes the document with two-space indentation.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Xml`] if writing fails.
    pub fn to_pretty_string(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', INDENT);
        if let Some(declaration) = &self.declaration {
            let decl = BytesDecl::new(
                &declaration.version,
                declaration.encoding.as_deref(),
                declaration.standalone.as_deref(),
            );
            write_event(&mut writer, Event::Decl(decl))?;
        }
        self.root.write(&mut writer)?;
        into_string(writer)
    }
}

impl fmt::Display for XmlDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pretty = self.to_pretty_string().map_err(|_| fmt::Error)?;
        f.write_str(&pretty)
    }
}

/// Serializes a Payment Action request.
///
/// The root is `PaymentProcessRequest` with exactly eight children in wire order.
/// Text is escaped; empty values become empty elements. No declaration is
/// emitted.
///
/// # Errors
///
/// Returns [`HarnessError::Xml`] if writing fails.
pub fn build_request_xml(request: &PaymentActionRequest) -> Result<String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    write_event(&mut writer, Event::Start(BytesStart::new(REQUEST_ROOT)))?;
    for (name, value) in request.fields() {
        if value.is_empty() {
            write_event(&mut writer, Event::Empty(BytesStart::new(name)))?;
        } else {
            write_event(&mut writer, Event::Start(BytesStart::new(name)))?;
            write_event(&mut writer, Event::Text(BytesText::new(value)))?;
            write_event(&mut writer, Event::End(BytesEnd::new(name)))?;
        }
    }
    write_event(&mut writer, Event::End(BytesEnd::new(REQUEST_ROOT)))?;
    into_string(writer)
}

/// Parses a response XML document.
///
/// # Errors
///
/// Returns [`HarnessError::Xml`] for syntax errors, mismatched or unclosed tags,
/// text outside the root element, more than one root, or an empty document.
pub fn parse_response_xml(text: &str) -> Result<XmlDocument> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut declaration = None;
    let mut root: Option<XmlElement> = None;
    let mut stack: Vec<XmlElement> = Vec::new();

    loop {
        let event = reader.read_event().map_err(|e| {
            HarnessError::Xml(format!("{e} at position {}", reader.buffer_position()))
        })?;
        match event {
            Event::Decl(decl) => declaration = Some(XmlDeclaration::from_decl(&decl)?),
            Event::Start(start) => stack.push(XmlElement::from_start(&start)?),
            Event::Empty(start) => attach(&mut stack, &mut root, XmlElement::from_start(&start)?)?,
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| HarnessError::Xml("unexpected closing tag".to_owned()))?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(|e| HarnessError::Xml(e.to_string()))?;
                push_text(&mut stack, text.into_owned())?;
            }
            Event::CData(data) => push_text(&mut stack, utf8(&data)?.to_owned())?,
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(HarnessError::Xml(format!("unclosed element <{}>", open.name)));
    }
    let root = root.ok_or_else(|| HarnessError::Xml("document has no root element".to_owned()))?;
    Ok(XmlDocument { declaration, root })
}

/// Re-serializes XML with two-space indentation.
///
/// Display helper: input that does not parse is returned unchanged.
#[must_use]
pub fn pretty_print(text: &str) -> String {
    parse_response_xml(text)
        .and_then(|document| document.to_pretty_string())
        .unwrap_or_else(|_| text.to_owned())
}

fn optional_pseudo_attribute<E: fmt::Display>(
    value: Option<std::result::Result<Cow<'_, [u8]>, E>>,
) -> Result<Option<String>> {
    match value {
        Some(Ok(bytes)) => Ok(Some(utf8(&bytes)?.to_owned())),
        Some(Err(e)) => Err(HarnessError::Xml(e.to_string())),
        None => Ok(None),
    }
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(XmlNode::Element(element));
        return Ok(());
    }
    if root.is_some() {
        return Err(HarnessError::Xml(format!(
            "multiple root elements, second is <{}>",
            element.name
        )));
    }
    *root = Some(element);
    Ok(())
}

fn push_text(stack: &mut [XmlElement], text: String) -> Result<()> {
    let parent = stack
        .last_mut()
        .ok_or_else(|| HarnessError::Xml("text outside of the root element".to_owned()))?;
    parent.children.push(XmlNode::Text(text));
    Ok(())
}

fn write_event<W: std::io::Write>(writer: &mut Writer<W>, event: Event<'_>) -> Result<()> {
    writer.write_event(event).map_err(|e| HarnessError::Xml(e.to_string()))
}

fn into_string(writer: Writer<Cursor<Vec<u8>>>) -> Result<String> {
    String::from_utf8(writer.into_inner().into_inner())
        .map_err(|e| HarnessError::Xml(e.to_string()))
}

fn utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|e| HarnessError::Xml(e.to_string()))
}
