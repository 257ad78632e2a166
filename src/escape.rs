//! XML escaping and CDATA wrapping.
//!
//! Leaf text, attribute values and element names all go through [`escape`].
//! [`wrap_cdata`] is the alternative for leaf text when CDATA output is enabled.

use memchr::{memchr2, memchr3, memmem};
use std::borrow::Cow;

const CDATA_OPEN: &str = "<![CDATA[";
const CDATA_CLOSE: &str = "]]>";
/// Replacement for a literal `]]>` inside CDATA: ends the section after `]]`
/// and opens a new one holding the `>`.
const CDATA_SPLIT: &str = "]]]]><![CDATA[>";

/// Escapes XML special characters in a string.
///
/// Returns a `Cow<str>` to avoid allocation when no escaping is needed.
///
/// Only `& " ' < >` are replaced. Characters XML 1.0 forbids outright, such as
/// U+0000 and most other C0 controls, pass through unchanged, so text holding
/// them does not produce a well-formed document.
#[inline]
pub fn escape(s: &str) -> Cow<'_, str> {
    if !needs_escape(s.as_bytes()) {
        return Cow::Borrowed(s);
    }

    let mut result = String::with_capacity(s.len() + s.len() / 8);
    escape_to(s, &mut result);
    Cow::Owned(result)
}

#[inline]
fn needs_escape(bytes: &[u8]) -> bool {
    memchr3(b'<', b'>', b'&', bytes).is_some() || memchr2(b'"', b'\'', bytes).is_some()
}

/// Escapes XML special characters and appends to the given string.
///
/// Single left-to-right pass: entities written by an earlier substitution are
/// never scanned again, so `&lt;` in the input becomes `&amp;lt;` exactly once.
#[inline]
pub fn escape_to(s: &str, out: &mut String) {
    let mut start = 0;

    for (i, byte) in s.bytes().enumerate() {
        let escaped = match byte {
            b'&' => "&amp;",
            b'"' => "&quot;",
            b'\'' => "&apos;",
            b'<' => "&lt;",
            b'>' => "&gt;",
            _ => continue,
        };

        // Only ASCII bytes are replaced, so `i` is always a char boundary.
        out.push_str(&s[start..i]);
        out.push_str(escaped);
        start = i + 1;
    }

    out.push_str(&s[start..]);
}

/// Wraps text in a CDATA section, splitting any embedded `]]>` terminator.
pub fn wrap_cdata(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + CDATA_OPEN.len() + CDATA_CLOSE.len());
    cdata_to(s, &mut out);
    out
}

/// Appends `s` as a CDATA section to the given string.
pub fn cdata_to(s: &str, out: &mut String) {
    out.push_str(CDATA_OPEN);
    let mut start = 0;
    for hit in memmem::find_iter(s.as_bytes(), CDATA_CLOSE) {
        out.push_str(&s[start..hit]);
        out.push_str(CDATA_SPLIT);
        start = hit + CDATA_CLOSE.len();
    }
    out.push_str(&s[start..]);
    out.push_str(CDATA_CLOSE);
}

/// Unescapes XML entities in a string.
///
/// Returns a `Cow<str>` to avoid allocation when no unescaping is needed.
#[inline]
pub(crate) fn unescape(s: &str) -> Result<Cow<'_, str>, UnescapeError> {
    if !s.contains('&') {
        return Ok(Cow::Borrowed(s));
    }

    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    let mut offset = 0;

    while let Some(amp) = rest.find('&') {
        result.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let end = match after.find(';') {
            Some(end) if end > 0 => end,
            _ => {
                return Err(UnescapeError {
                    entity: String::from("&"),
                    position: offset + amp,
                })
            }
        };

        let entity = &after[..end];
        match decode_entity(entity) {
            Some(c) => result.push(c),
            None => {
                return Err(UnescapeError {
                    entity: format!("&{};", entity),
                    position: offset + amp,
                })
            }
        }

        let consumed = amp + 1 + end + 1;
        offset += consumed;
        rest = &rest[consumed..];
    }

    result.push_str(rest);
    Ok(Cow::Owned(result))
}

/// Error type for unescape operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UnescapeError {
    /// The invalid entity that caused the error.
    pub(crate) entity: String,
    /// Byte offset in the input where the error occurred.
    pub(crate) position: usize,
}

impl std::fmt::Display for UnescapeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid XML entity '{}' at position {}", self.entity, self.position)
    }
}

impl std::error::Error for UnescapeError {}

/// Decodes a named entity or a numeric character reference (`#NNN`, `#xHHH`).
fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let numeric = entity.strip_prefix('#')?;
            let code = match numeric.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => numeric.parse::<u32>().ok()?,
            };
            char::from_u32(code)
        }
    }
}
