//! Minimal XML tokenizer used as a well-formedness probe.
//!
//! The converter never reads XML as input. This reader exists to answer one
//! question: does a small document parse? Name validation feeds it
//! `<key>foo</key>` probes, and the tests use it to check that converted
//! output is a single well-formed element tree.

use crate::escape::unescape;
use memchr::memchr;
use std::borrow::Cow;
use std::fmt;

static IS_WHITESPACE: [bool; 256] = {
    let mut lut = [false; 256];
    lut[b' ' as usize] = true;
    lut[b'\t' as usize] = true;
    lut[b'\n' as usize] = true;
    lut[b'\r' as usize] = true;
    lut
};

/// Name start character lookup table.
static IS_NAME_START: [bool; 256] = {
    let mut lut = [false; 256];
    let mut i = b'A';
    while i <= b'Z' {
        lut[i as usize] = true;
        i += 1;
    }
    let mut i = b'a';
    while i <= b'z' {
        lut[i as usize] = true;
        i += 1;
    }
    lut[b'_' as usize] = true;
    lut[b':' as usize] = true;
    // Allow high bytes for UTF-8
    let mut i: usize = 0x80;
    while i < 256 {
        lut[i] = true;
        i += 1;
    }
    lut
};

/// Name character lookup table.
static IS_NAME_CHAR: [bool; 256] = {
    let mut lut = IS_NAME_START;
    let mut i = b'0';
    while i <= b'9' {
        lut[i as usize] = true;
        i += 1;
    }
    lut[b'-' as usize] = true;
    lut[b'.' as usize] = true;
    lut
};

/// Error produced when a probe document is not well formed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// What went wrong.
    pub message: String,
    /// Byte offset in the input.
    pub offset: usize,
}

impl ParseError {
    fn new<S: Into<String>>(message: S, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at offset {}", self.message, self.offset)
    }
}

impl std::error::Error for ParseError {}

/// An XML event produced by the reader.
#[allow(dead_code)]
#[derive(Debug, Clone, PartialEq)]
pub enum XmlEvent<'a> {
    /// XML declaration: `<?xml version="1.0" encoding="UTF-8" ?>`
    XmlDecl {
        /// XML version.
        version: Cow<'a, str>,
        /// Declared encoding, if any.
        encoding: Option<Cow<'a, str>>,
    },
    /// Start of an element.
    StartElement {
        /// Element name.
        name: &'a str,
        /// Attributes as (name, unescaped value) pairs.
        attributes: Vec<(&'a str, Cow<'a, str>)>,
    },
    /// End of an element.
    EndElement {
        /// Element name.
        name: &'a str,
    },
    /// Self-closing element.
    EmptyElement {
        /// Element name.
        name: &'a str,
        /// Attributes as (name, unescaped value) pairs.
        attributes: Vec<(&'a str, Cow<'a, str>)>,
    },
    /// Unescaped text content.
    Text(Cow<'a, str>),
    /// Raw CDATA section content.
    CData(&'a str),
    /// End of document.
    Eof,
}

/// A zero-copy XML event reader.
pub struct XmlReader<'a> {
    input: &'a str,
    pos: usize,
    /// Stack of open element names for validation.
    element_stack: Vec<&'a str>,
}

impl<'a> XmlReader<'a> {
    /// Creates a new reader over a string.
    #[inline]
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            element_stack: Vec::with_capacity(8),
        }
    }

    /// Returns the number of currently open elements.
    #[inline]
    pub fn depth(&self) -> usize {
        self.element_stack.len()
    }

    #[inline]
    fn bytes(&self) -> &'a [u8] {
        self.input.as_bytes()
    }

    fn error<S: Into<String>>(&self, message: S) -> ParseError {
        ParseError::new(message, self.pos)
    }

    /// Reads the next XML event.
    pub fn next_event(&mut self) -> Result<XmlEvent<'a>, ParseError> {
        if self.element_stack.is_empty() {
            self.skip_whitespace();
        }

        if self.pos >= self.input.len() {
            if let Some(tag) = self.element_stack.last() {
                return Err(self.error(format!("unclosed tag: <{}>", tag)));
            }
            return Ok(XmlEvent::Eof);
        }

        if self.bytes()[self.pos] == b'<' {
            self.read_tag()
        } else {
            self.read_text()
        }
    }

    #[inline]
    fn skip_whitespace(&mut self) {
        while self.pos < self.input.len() && IS_WHITESPACE[self.bytes()[self.pos] as usize] {
            self.pos += 1;
        }
    }

    fn read_text(&mut self) -> Result<XmlEvent<'a>, ParseError> {
        let start = self.pos;
        self.pos = match memchr(b'<', &self.bytes()[start..]) {
            Some(offset) => start + offset,
            None => self.input.len(),
        };

        let text = &self.input[start..self.pos];
        if self.element_stack.is_empty() {
            return Err(ParseError::new("text outside of root element", start));
        }
        unescape(text)
            .map(XmlEvent::Text)
            .map_err(|e| ParseError::new(e.to_string(), start + e.position))
    }

    fn read_tag(&mut self) -> Result<XmlEvent<'a>, ParseError> {
        self.pos += 1;
        match self.bytes().get(self.pos) {
            None => Err(self.error("unexpected end of input")),
            Some(b'/') => self.read_end_element(),
            Some(b'?') => self.read_declaration(),
            Some(b'!') => self.read_cdata(),
            Some(_) => self.read_start_element(),
        }
    }

    fn read_start_element(&mut self) -> Result<XmlEvent<'a>, ParseError> {
        let name = self.read_name()?;
        let attributes = self.read_attributes()?;
        self.skip_whitespace();

        if self.input[self.pos..].starts_with("/>") {
            self.pos += 2;
            Ok(XmlEvent::EmptyElement { name, attributes })
        } else if self.input[self.pos..].starts_with('>') {
            self.pos += 1;
            self.element_stack.push(name);
            Ok(XmlEvent::StartElement { name, attributes })
        } else {
            Err(self.error("expected '>' or '/>'"))
        }
    }

    fn read_end_element(&mut self) -> Result<XmlEvent<'a>, ParseError> {
        self.pos += 1;
        let name = self.read_name()?;
        self.skip_whitespace();
        self.expect_char(b'>')?;

        match self.element_stack.pop() {
            Some(expected) if expected == name => Ok(XmlEvent::EndElement { name }),
            Some(expected) => Err(self.error(format!(
                "mismatched closing tag: expected </{}>, found </{}>",
                expected, name
            ))),
            None => Err(self.error(format!("unexpected closing tag: {}", name))),
        }
    }

    fn read_declaration(&mut self) -> Result<XmlEvent<'a>, ParseError> {
        self.pos += 1;
        if !(self.pos == 2 && self.read_name()? == "xml") {
            return Err(self.error("only a leading XML declaration is supported"));
        }

        let attributes = self.read_attributes()?;
        self.skip_whitespace();
        if !self.input[self.pos..].starts_with("?>") {
            return Err(self.error("expected '?>'"));
        }
        self.pos += 2;

        let mut version = None;
        let mut encoding = None;
        for (name, value) in attributes {
            match name {
                "version" => version = Some(value),
                "encoding" => encoding = Some(value),
                other => return Err(self.error(format!("unknown declaration field: {}", other))),
            }
        }

        let version = version.ok_or_else(|| self.error("declaration without version"))?;
        Ok(XmlEvent::XmlDecl { version, encoding })
    }

    fn read_cdata(&mut self) -> Result<XmlEvent<'a>, ParseError> {
        if !self.input[self.pos..].starts_with("![CDATA[") {
            return Err(self.error("unknown construct after '<!'"));
        }
        if self.element_stack.is_empty() {
            return Err(self.error("CDATA outside of root element"));
        }
        let start = self.pos + "![CDATA[".len();
        match memchr::memmem::find(&self.bytes()[start..], b"]]>") {
            Some(len) => {
                self.pos = start + len + 3;
                Ok(XmlEvent::CData(&self.input[start..start + len]))
            }
            None => Err(self.error("unterminated CDATA section")),
        }
    }

    fn read_name(&mut self) -> Result<&'a str, ParseError> {
        let start = self.pos;
        match self.bytes().get(start) {
            None => return Err(self.error("unexpected end of input")),
            Some(&b) if !IS_NAME_START[b as usize] => {
                return Err(self.error(format!("invalid name start character: {:?}", b as char)))
            }
            Some(_) => self.pos += 1,
        }

        while self.pos < self.input.len() && IS_NAME_CHAR[self.bytes()[self.pos] as usize] {
            self.pos += 1;
        }

        self.input
            .get(start..self.pos)
            .ok_or_else(|| ParseError::new("name splits a UTF-8 sequence", start))
    }

    fn read_attributes(&mut self) -> Result<Vec<(&'a str, Cow<'a, str>)>, ParseError> {
        let mut attributes: Vec<(&'a str, Cow<'a, str>)> = Vec::new();

        loop {
            let before = self.pos;
            self.skip_whitespace();
            match self.bytes().get(self.pos) {
                None | Some(b'>' | b'/' | b'?') => break,
                Some(_) if before == self.pos => {
                    return Err(self.error("expected whitespace before attribute"))
                }
                Some(_) => {}
            }

            let name = self.read_name()?;
            if attributes.iter().any(|(existing, _)| *existing == name) {
                return Err(self.error(format!("duplicate attribute: {}", name)));
            }
            self.skip_whitespace();
            self.expect_char(b'=')?;
            self.skip_whitespace();
            let value = self.read_attribute_value()?;
            attributes.push((name, value));
        }

        Ok(attributes)
    }

    fn read_attribute_value(&mut self) -> Result<Cow<'a, str>, ParseError> {
        let quote = match self.bytes().get(self.pos) {
            Some(&q) if q == b'"' || q == b'\'' => q,
            Some(_) => return Err(self.error("expected quote")),
            None => return Err(self.error("unexpected end of input")),
        };
        self.pos += 1;
        let start = self.pos;

        let offset = memchr(quote, &self.bytes()[start..])
            .ok_or_else(|| self.error("unterminated attribute value"))?;
        let raw = &self.input[start..start + offset];
        if raw.contains('<') {
            return Err(ParseError::new("'<' in attribute value", start));
        }
        self.pos = start + offset + 1;

        unescape(raw).map_err(|e| ParseError::new(e.to_string(), start + e.position))
    }

    fn expect_char(&mut self, expected: u8) -> Result<(), ParseError> {
        match self.bytes().get(self.pos) {
            Some(&b) if b == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(&b) => Err(self.error(format!(
                "expected '{}', found '{}'",
                expected as char, b as char
            ))),
            None => Err(self.error("unexpected end of input")),
        }
    }
}

/// Parses a complete document, requiring exactly one root element.
///
/// Returns every event except the trailing [`XmlEvent::Eof`].
pub fn parse_document(input: &str) -> Result<Vec<XmlEvent<'_>>, ParseError> {
    let mut reader = XmlReader::new(input);
    let mut events = Vec::new();
    let mut roots = 0;

    loop {
        let event = reader.next_event()?;
        let opens_root = match &event {
            XmlEvent::Eof => break,
            XmlEvent::StartElement { .. } => reader.depth() == 1,
            XmlEvent::EmptyElement { .. } => reader.depth() == 0,
            _ => false,
        };
        if opens_root {
            roots += 1;
            if roots > 1 {
                return Err(ParseError::new("multiple root elements", input.len()));
            }
        }
        events.push(event);
    }

    if roots == 0 {
        return Err(ParseError::new("no root element", input.len()));
    }
    Ok(events)
}
