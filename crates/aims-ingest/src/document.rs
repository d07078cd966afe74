//! Raw, order-preserving element tree read from an XML document.
//!
//! The tree keeps names, attributes, child order, and text exactly as the
//! document carried them (entities unescaped, nothing trimmed), so the parser
//! can hand references through verbatim.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::ParseError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
    /// Concatenated text and CDATA content directly inside this element.
    pub text: String,
}

impl Element {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// First child named `name`.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Self> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Every child named `name`, in document order.
    pub fn children<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Self> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// A parsed document: a single root element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    pub root: Element,
}

impl RawDocument {
    #[must_use]
    pub const fn new(root: Element) -> Self {
        Self { root }
    }

    /// Read an XML string into an element tree.
    ///
    /// # Errors
    ///
    /// Returns `ParseError::Malformed` for XML syntax errors (including
    /// mismatched end tags) and `ParseError::Unbalanced` when elements are
    /// left open, or when there is no root or more than one.
    pub fn from_xml(xml: &str) -> Result<Self, ParseError> {
        let mut reader = Reader::from_str(xml);
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(start)) => {
                    stack.push(open_element(&start, reader.buffer_position())?);
                }
                Ok(Event::Empty(start)) => {
                    let element = open_element(&start, reader.buffer_position())?;
                    attach(&mut stack, &mut root, element)?;
                }
                Ok(Event::End(end)) => {
                    let Some(element) = stack.pop() else {
                        return Err(ParseError::Unbalanced(format!(
                            "closing </{}> without an open element",
                            String::from_utf8_lossy(end.name().as_ref())
                        )));
                    };
                    attach(&mut stack, &mut root, element)?;
                }
                Ok(Event::Text(text)) => {
                    if let Some(current) = stack.last_mut() {
                        let text = text
                            .unescape()
                            .map_err(|e| malformed(reader.buffer_position(), &e))?;
                        current.text.push_str(&text);
                    }
                }
                Ok(Event::CData(data)) => {
                    if let Some(current) = stack.last_mut() {
                        current
                            .text
                            .push_str(&String::from_utf8_lossy(&data.into_inner()));
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(malformed(reader.buffer_position(), &e)),
            }
        }

        if let Some(open) = stack.last() {
            return Err(ParseError::Unbalanced(format!(
                "<{}> is never closed",
                open.name
            )));
        }
        root.map(Self::new)
            .ok_or_else(|| ParseError::Unbalanced("document has no root element".into()))
    }
}

fn open_element(start: &BytesStart<'_>, position: usize) -> Result<Element, ParseError> {
    let mut element = Element::new(String::from_utf8_lossy(start.name().as_ref()));
    for attr in start.attributes() {
        let attr = attr.map_err(|e| malformed(position, &e))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| malformed(position, &e))?
            .into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), ParseError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
        return Ok(());
    }
    if root.is_some() {
        return Err(ParseError::Unbalanced(format!(
            "second root element <{}>",
            element.name
        )));
    }
    *root = Some(element);
    Ok(())
}

fn malformed(position: usize, error: &impl std::fmt::Display) -> ParseError {
    ParseError::Malformed {
        position,
        message: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_order_attributes_and_raw_text() {
        let doc = RawDocument::from_xml(
            r#"<?xml version="1.0"?>
<root a="1">
  <item ref=" X &amp; Y "><narrative>  Spaced Name </narrative></item>
  <item ref="2"/>
</root>"#,
        )
        .unwrap();

        assert_eq!(doc.root.name, "root");
        assert_eq!(doc.root.attr("a"), Some("1"));
        let items: Vec<_> = doc.root.children("item").collect();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].attr("ref"), Some(" X & Y "));
        assert_eq!(
            items[0].child("narrative").map(Element::text),
            Some("  Spaced Name ")
        );
        assert_eq!(items[1].attr("ref"), Some("2"));
    }

    #[test]
    fn unclosed_element_is_unbalanced() {
        let err = RawDocument::from_xml("<root><item></item>").unwrap_err();
        assert!(
            matches!(err, ParseError::Unbalanced(_) | ParseError::Malformed { .. }),
            "got {err:?}"
        );
    }

    #[test]
    fn mismatched_end_tag_is_malformed() {
        let err = RawDocument::from_xml("<root><item></root></item>").unwrap_err();
        assert!(matches!(err, ParseError::Malformed { .. }), "got {err:?}");
    }

    #[test]
    fn empty_input_has_no_root() {
        assert!(matches!(
            RawDocument::from_xml("   "),
            Err(ParseError::Unbalanced(_))
        ));
    }

    #[test]
    fn cdata_is_text() {
        let doc = RawDocument::from_xml("<root><![CDATA[a < b]]></root>").unwrap();
        assert_eq!(doc.root.text(), "a < b");
    }
}
