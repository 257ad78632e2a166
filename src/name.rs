//! Element name validation and repair.
//!
//! Every key becomes an element name. A key is used verbatim when it is a
//! valid XML name; otherwise it is repaired by the first rule that works:
//!
//! 1. numeric keys (`123`, `1.5`) get an `n` prefix,
//! 2. spaces are replaced by underscores,
//! 3. the element is named `key` and the original key moves to a `name` attribute.

use crate::escape::escape;
use crate::reader::{parse_document, ParseError, XmlEvent};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Element name used when a key cannot be repaired.
pub const FALLBACK_NAME: &str = "key";

/// Answers whether a string may be used as an element name.
///
/// Implementations must be pure: the same input always yields the same answer.
pub trait NameValidator: Send + Sync {
    /// Returns true if `name` is a valid element name.
    fn is_valid(&self, name: &str) -> bool;
}

static GLOBAL_CACHE: Lazy<Arc<NameCache>> = Lazy::new(|| Arc::new(NameCache::new()));

/// Memoizing name validator.
///
/// A name is valid when it matches `[a-zA-Z_][a-zA-Z0-9._-]*` and the probe
/// document `<?xml version="1.0" encoding="UTF-8" ?><name>foo</name>` parses.
/// Results are cached for the lifetime of the cache and never evicted.
#[derive(Debug, Default)]
pub struct NameCache {
    entries: RwLock<HashMap<String, bool>>,
    checks: AtomicUsize,
}

impl NameCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the process-wide cache shared by converters that were not given their own.
    pub fn global() -> Arc<NameCache> {
        Arc::clone(&GLOBAL_CACHE)
    }

    /// Number of distinct names cached so far.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing has been cached yet.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Number of times the underlying grammar and parser check actually ran.
    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::Relaxed)
    }
}

impl NameValidator for NameCache {
    fn is_valid(&self, name: &str) -> bool {
        if let Some(&valid) = self.entries.read().get(name) {
            tracing::trace!(name, valid, "name cache hit");
            return valid;
        }

        self.checks.fetch_add(1, Ordering::Relaxed);
        let valid = check_name(name);
        // A concurrent miss may have stored the same answer first; keep whichever landed.
        *self.entries.write().entry(name.to_string()).or_insert(valid)
    }
}

fn check_name(name: &str) -> bool {
    if !matches_name_grammar(name) {
        return false;
    }

    match probe(name) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(name, error = %e, "probe document rejected candidate name");
            false
        }
    }
}

/// Checks `name` against `[a-zA-Z_][a-zA-Z0-9._-]*`.
pub fn matches_name_grammar(name: &str) -> bool {
    let mut bytes = name.bytes();
    match bytes.next() {
        Some(b) if b.is_ascii_alphabetic() || b == b'_' => {}
        _ => return false,
    }
    bytes.all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
}

fn probe(name: &str) -> Result<(), ParseError> {
    let doc = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" ?><{0}>foo</{0}>",
        name
    );
    let events = parse_document(&doc)?;
    match events.as_slice() {
        [XmlEvent::XmlDecl { .. }, XmlEvent::StartElement { name: open, .. }, XmlEvent::Text(text), XmlEvent::EndElement { .. }]
            if *open == name && text == "foo" =>
        {
            Ok(())
        }
        _ => Err(ParseError {
            message: format!("probe for <{}> produced unexpected events", name),
            offset: 0,
        }),
    }
}

/// A repaired element name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedName {
    /// The element name to emit.
    pub name: String,
    /// The escaped original key, set only when the fallback name was used.
    ///
    /// The caller emits it as a `name` attribute.
    pub original: Option<String>,
}

impl SanitizedName {
    fn verbatim(name: String) -> Self {
        Self {
            name,
            original: None,
        }
    }
}

/// Turns a key into a valid element name.
pub fn sanitize(key: &str, validator: &dyn NameValidator) -> SanitizedName {
    let key = escape(key);

    if validator.is_valid(&key) {
        return SanitizedName::verbatim(key.into_owned());
    }

    if is_numeric_key(&key) {
        let name = format!("n{}", key);
        tracing::debug!(key = %key, name = %name, "prefixed numeric key");
        return SanitizedName::verbatim(name);
    }

    if key.contains(' ') {
        let underscored = key.replace(' ', "_");
        if validator.is_valid(&underscored) {
            tracing::debug!(key = %key, name = %underscored, "replaced spaces in key");
            return SanitizedName::verbatim(underscored);
        }
    }

    tracing::debug!(key = %key, "falling back to generic element name");
    SanitizedName {
        name: FALLBACK_NAME.to_string(),
        original: Some(key.into_owned()),
    }
}

/// Digits with at most one decimal point, e.g. `123`, `1.5`, `.5`.
fn is_numeric_key(key: &str) -> bool {
    let mut seen_point = false;
    let mut digits = 0;
    for b in key.bytes() {
        match b {
            b'0'..=b'9' => digits += 1,
            b'.' if !seen_point => seen_point = true,
            _ => return false,
        }
    }
    digits > 0
}
