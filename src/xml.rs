//! A schema-free view of a parsed feed document.
//!
//! Every element becomes either a text leaf or an ordered mapping of child
//! names to values. Attributes live in the same mapping under an `@_` prefix
//! and mixed text under `#text`. Children that repeat under one parent are
//! folded into a [`XmlValue::List`], so a feed with one `<item>` and a feed
//! with fifty look the same to callers that go through [`XmlValue::items`].

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

/// Key holding the text content of an element that also has children or attributes.
pub const TEXT_KEY: &str = "#text";
/// Prefix for attribute keys.
pub const ATTR_PREFIX: &str = "@_";

const MAX_DEPTH: usize = 64;

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("malformed XML: {0}")]
    Malformed(String),
    #[error("unexpected end of document")]
    UnexpectedEof,
    #[error("nesting deeper than {0} elements")]
    TooDeep(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub enum XmlValue {
    Text(String),
    List(Vec<XmlValue>),
    Map(Vec<(String, XmlValue)>),
}

impl XmlValue {
    /// Looks up a child or attribute of a mapping node.
    pub fn get(&self, key: &str) -> Option<&XmlValue> {
        match self {
            XmlValue::Map(entries) => entries
                .iter()
                .find(|(name, _)| name == key)
                .map(|(_, value)| value),
            _ => None,
        }
    }

    /// Looks up an attribute, `attr("href")` reading `@_href`.
    pub fn attr(&self, name: &str) -> Option<&str> {
        match self {
            XmlValue::Map(entries) => entries
                .iter()
                .find(|(key, _)| key.strip_prefix(ATTR_PREFIX) == Some(name))
                .and_then(|(_, value)| value.as_text()),
            _ => None,
        }
    }

    /// Follows a chain of child names.
    pub fn path(&self, keys: &[&str]) -> Option<&XmlValue> {
        keys.iter().try_fold(self, |node, key| node.get(key))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            XmlValue::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Views the node as a sequence: lists yield their members, anything else yields itself.
    pub fn items(&self) -> Vec<&XmlValue> {
        match self {
            XmlValue::List(items) => items.iter().collect(),
            other => vec![other],
        }
    }

    pub fn entries(&self) -> &[(String, XmlValue)] {
        match self {
            XmlValue::Map(entries) => entries,
            _ => &[],
        }
    }
}

struct Frame {
    name: String,
    entries: Vec<(String, XmlValue)>,
    text: String,
}

impl Frame {
    fn new(name: String) -> Self {
        Self {
            name,
            entries: Vec::new(),
            text: String::new(),
        }
    }

    fn open(start: &BytesStart<'_>) -> Self {
        let mut frame = Self::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());

        for attr in start.attributes().with_checks(false).flatten() {
            let key = String::from_utf8_lossy(attr.key.as_ref());
            let raw = String::from_utf8_lossy(&attr.value);
            let value = html_escape::decode_html_entities(&raw).into_owned();
            frame.insert(format!("{ATTR_PREFIX}{key}"), XmlValue::Text(value));
        }

        frame
    }

    fn insert(&mut self, key: String, value: XmlValue) {
        match self.entries.iter_mut().find(|(name, _)| *name == key) {
            Some((_, XmlValue::List(items))) => items.push(value),
            Some((_, existing)) => {
                let first = std::mem::replace(existing, XmlValue::List(Vec::new()));
                *existing = XmlValue::List(vec![first, value]);
            }
            None => self.entries.push((key, value)),
        }
    }

    fn finish(self) -> (String, XmlValue) {
        let text = self.text.trim();
        if self.entries.is_empty() {
            return (self.name, XmlValue::Text(text.to_string()));
        }

        let mut entries = self.entries;
        if !text.is_empty() {
            entries.push((TEXT_KEY.to_string(), XmlValue::Text(text.to_string())));
        }
        (self.name, XmlValue::Map(entries))
    }
}

/// Parses a document into a tree rooted at an unnamed mapping whose keys are
/// the top-level elements (`rss`, `rdf:RDF`, `feed`, ...).
///
/// Entity references are decoded with HTML rules so feeds that leak `&nbsp;`
/// and friends into XML still parse.
pub fn parse(xml: &str) -> Result<XmlValue, XmlError> {
    let mut reader = Reader::from_str(xml);
    let mut stack = vec![Frame::new(String::new())];
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if stack.len() > MAX_DEPTH {
                    return Err(XmlError::TooDeep(MAX_DEPTH));
                }
                stack.push(Frame::open(&e));
            }
            Ok(Event::Empty(e)) => {
                let (name, value) = Frame::open(&e).finish();
                if let Some(parent) = stack.last_mut() {
                    parent.insert(name, value);
                }
            }
            Ok(Event::End(_)) => {
                if stack.len() < 2 {
                    return Err(XmlError::Malformed("unmatched closing tag".to_string()));
                }
                if let Some(frame) = stack.pop() {
                    let (name, value) = frame.finish();
                    if let Some(parent) = stack.last_mut() {
                        parent.insert(name, value);
                    }
                }
            }
            Ok(Event::Text(e)) => {
                let raw = String::from_utf8_lossy(&e);
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&html_escape::decode_html_entities(&raw));
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(XmlError::Malformed(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    match stack.pop() {
        Some(root) if stack.is_empty() => Ok(root.finish().1),
        _ => Err(XmlError::UnexpectedEof),
    }
}
