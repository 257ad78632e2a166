//! The conversion engine.
//!
//! A [`Value`] is walked depth first and written into a single output buffer.
//! Mapping keys become element names, sequences repeat an item element, and
//! scalars become text content:
//!
//! ```rust
//! use dict_xml::{to_string_with_options, Options};
//! use serde_json::json;
//!
//! let xml = to_string_with_options(&json!({"a": 1, "b": [1, 2]}), &Options::new()).unwrap();
//! assert_eq!(
//!     xml,
//!     "<?xml version=\"1.0\" encoding=\"UTF-8\" ?><root><a type=\"int\">1</a>\
//!      <b type=\"list\"><b type=\"int\">1</b><b type=\"int\">2</b></b></root>"
//! );
//! ```

use crate::error::{Error, Result};
use crate::escape::{cdata_to, escape_to};
use crate::id::{IdAllocator, IdRegistry};
use crate::name::{sanitize, NameCache, NameValidator, SanitizedName};
use crate::ser::to_value_with_limit;
use crate::value::{Map, Number, TypeTag, Value};
use serde::Serialize;
use std::borrow::Cow;
use std::fmt;
use std::io::Write;
use std::sync::Arc;

/// Default maximum container nesting depth.
pub const DEFAULT_MAX_DEPTH: usize = 128;

/// Default root element name.
pub const DEFAULT_ROOT: &str = "root";

/// Default encoding named in the XML declaration.
pub const DEFAULT_ENCODING: &str = "UTF-8";

/// Function deriving a list item's element name from its parent's name.
pub type ItemNameFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// How list items are named.
#[derive(Clone, Default)]
pub enum ItemNaming {
    /// Items reuse the parent element's name. Nested lists are wrapped in
    /// their own `type="list"` element.
    #[default]
    Default,
    /// Items are named by the function. Nested lists are flattened into the
    /// parent's output, since the naming scheme already tells siblings apart.
    Custom(ItemNameFn),
}

impl ItemNaming {
    /// Creates a custom naming scheme.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        ItemNaming::Custom(Arc::new(f))
    }

    /// Returns the item element name for a list whose element is `parent`.
    pub fn item_name<'a>(&self, parent: &'a str) -> Cow<'a, str> {
        match self {
            ItemNaming::Default => Cow::Borrowed(parent),
            ItemNaming::Custom(f) => Cow::Owned(f(parent)),
        }
    }
}

impl fmt::Debug for ItemNaming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemNaming::Default => f.write_str("Default"),
            ItemNaming::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Conversion options.
#[derive(Debug, Clone)]
pub struct Options {
    root: bool,
    root_name: String,
    declaration: bool,
    include_encoding: bool,
    encoding: String,
    ids: bool,
    type_attributes: bool,
    item_naming: ItemNaming,
    cdata: bool,
    return_bytes: bool,
    max_depth: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            root: true,
            root_name: DEFAULT_ROOT.to_string(),
            declaration: true,
            include_encoding: true,
            encoding: DEFAULT_ENCODING.to_string(),
            ids: false,
            type_attributes: true,
            item_naming: ItemNaming::Default,
            cdata: false,
            return_bytes: true,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl Options {
    /// Creates the default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps the output in a root element (default: on).
    ///
    /// Without the root wrapper no XML declaration is written either.
    pub fn with_root(mut self, root: bool) -> Self {
        self.root = root;
        self
    }

    /// Sets the root element name (default: `root`).
    pub fn with_root_name<S: Into<String>>(mut self, name: S) -> Self {
        self.root_name = name.into();
        self
    }

    /// Writes the XML declaration before the root element (default: on).
    pub fn with_declaration(mut self, declaration: bool) -> Self {
        self.declaration = declaration;
        self
    }

    /// Names the encoding in the declaration (default: on).
    pub fn with_encoding_in_declaration(mut self, include: bool) -> Self {
        self.include_encoding = include;
        self
    }

    /// Sets the encoding named in the declaration (default: `UTF-8`).
    ///
    /// Output bytes are always UTF-8; this only changes the declaration.
    pub fn with_encoding<S: Into<String>>(mut self, encoding: S) -> Self {
        self.encoding = encoding.into();
        self
    }

    /// Gives every element a unique `id` attribute (default: off).
    pub fn with_ids(mut self, ids: bool) -> Self {
        self.ids = ids;
        self
    }

    /// Adds `type` attributes describing the original data kind (default: on).
    pub fn with_type_attributes(mut self, type_attributes: bool) -> Self {
        self.type_attributes = type_attributes;
        self
    }

    /// Sets how list items are named.
    pub fn with_item_naming(mut self, naming: ItemNaming) -> Self {
        self.item_naming = naming;
        self
    }

    /// Names list items with `f(parent_name)`.
    pub fn with_item_name_fn<F>(self, f: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.with_item_naming(ItemNaming::custom(f))
    }

    /// Wraps text and number content in CDATA sections instead of escaping it (default: off).
    pub fn with_cdata(mut self, cdata: bool) -> Self {
        self.cdata = cdata;
        self
    }

    /// Returns [`Output::Bytes`] instead of [`Output::Text`] (default: on).
    pub fn with_return_bytes(mut self, return_bytes: bool) -> Self {
        self.return_bytes = return_bytes;
        self
    }

    /// Sets the maximum container nesting depth (default: 128).
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Returns the maximum container nesting depth.
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }
}

/// A converted document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// The document as text.
    Text(String),
    /// The document as UTF-8 bytes.
    Bytes(Vec<u8>),
}

impl Output {
    /// Returns the document bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Output::Text(text) => text.as_bytes(),
            Output::Bytes(bytes) => bytes,
        }
    }

    /// Returns the document as bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Output::Text(text) => text.into_bytes(),
            Output::Bytes(bytes) => bytes,
        }
    }

    /// Returns the document as text.
    pub fn into_string(self) -> String {
        match self {
            Output::Text(text) => text,
            Output::Bytes(bytes) => String::from_utf8(bytes)
                .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned()),
        }
    }
}

/// Converts a value with the given options, using the process-wide name cache and id registry.
pub fn convert(value: &Value, options: &Options) -> Result<Output> {
    Converter::new(options.clone()).convert(value)
}

/// Serializes a value to an XML string with default options.
///
/// ```
/// use std::collections::BTreeMap;
///
/// let mut flags = BTreeMap::new();
/// flags.insert("enabled", true);
/// let xml = dict_xml::to_string(&flags).unwrap();
/// assert!(xml.ends_with("<root><enabled type=\"bool\">true</enabled></root>"));
/// ```
pub fn to_string<T>(value: &T) -> Result<String>
where
    T: Serialize + ?Sized,
{
    to_string_with_options(value, &Options::default())
}

/// Serializes a value to an XML string with the given options.
pub fn to_string_with_options<T>(value: &T, options: &Options) -> Result<String>
where
    T: Serialize + ?Sized,
{
    Ok(Converter::new(options.clone())
        .convert_serialize(value)?
        .into_string())
}

/// Serializes a value to XML bytes with default options.
pub fn to_vec<T>(value: &T) -> Result<Vec<u8>>
where
    T: Serialize + ?Sized,
{
    Ok(Converter::new(Options::default())
        .convert_serialize(value)?
        .into_bytes())
}

/// Serializes a value to a writer with default options.
pub fn to_writer<W, T>(mut writer: W, value: &T) -> Result<()>
where
    W: Write,
    T: Serialize + ?Sized,
{
    let xml = to_vec(value)?;
    writer.write_all(&xml)?;
    Ok(())
}

/// Converts values with fixed options and injectable name/id services.
///
/// ```
/// use std::sync::Arc;
/// use dict_xml::{Converter, IdRegistry, NameCache, Options, Value};
///
/// let converter = Converter::new(Options::new().with_root(false).with_return_bytes(false))
///     .with_name_validator(Arc::new(NameCache::new()))
///     .with_id_allocator(Arc::new(IdRegistry::new()));
///
/// let value: Value = vec![("my key", 1)].into_iter().collect();
/// let xml = converter.convert(&value).unwrap().into_string();
/// assert_eq!(xml, "<my_key type=\"int\">1</my_key>");
/// ```
#[derive(Clone)]
pub struct Converter {
    options: Options,
    names: Arc<dyn NameValidator>,
    ids: Arc<dyn IdAllocator>,
}

impl Converter {
    /// Creates a converter sharing the process-wide name cache and id registry.
    pub fn new(options: Options) -> Self {
        Self {
            options,
            names: NameCache::global(),
            ids: IdRegistry::global(),
        }
    }

    /// Replaces the name validator.
    pub fn with_name_validator(mut self, names: Arc<dyn NameValidator>) -> Self {
        self.names = names;
        self
    }

    /// Replaces the id allocator.
    pub fn with_id_allocator(mut self, ids: Arc<dyn IdAllocator>) -> Self {
        self.ids = ids;
        self
    }

    /// Returns the options.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Converts a value into a document.
    ///
    /// Nothing is returned on failure, although names validated and ids
    /// allocated before the failure stay in their caches.
    pub fn convert(&self, value: &Value) -> Result<Output> {
        let mut emitter = Emitter {
            converter: self,
            out: String::new(),
        };
        emitter.document(value)?;

        let xml = emitter.out;
        tracing::debug!(len = xml.len(), "converted value to XML");
        Ok(if self.options.return_bytes {
            Output::Bytes(xml.into_bytes())
        } else {
            Output::Text(xml)
        })
    }

    /// Converts any serializable value into a document.
    pub fn convert_serialize<T>(&self, value: &T) -> Result<Output>
    where
        T: Serialize + ?Sized,
    {
        let value = to_value_with_limit(value, self.options.max_depth)?;
        self.convert(&value)
    }
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Converter")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Attributes of one element, values already escaped.
type Attrs<'a> = Vec<(&'static str, Cow<'a, str>)>;

/// Shape of a value as far as the emitter is concerned.
enum Node<'v> {
    Null,
    Bool(bool),
    Number(&'v Number),
    Text(&'v str),
    Map(&'v Map),
    Seq(&'v [Value]),
}

impl<'v> Node<'v> {
    fn of(value: &'v Value) -> Self {
        match value {
            Value::Null => Node::Null,
            Value::Bool(b) => Node::Bool(*b),
            Value::Number(n) => Node::Number(n),
            Value::String(s) | Value::Temporal(s) => Node::Text(s),
            Value::Map(map) => Node::Map(map),
            Value::Seq(items) => Node::Seq(items),
        }
    }
}

struct Emitter<'c> {
    converter: &'c Converter,
    out: String,
}

impl<'c> Emitter<'c> {
    fn options(&self) -> &'c Options {
        &self.converter.options
    }

    fn sanitize(&self, key: &str) -> SanitizedName {
        sanitize(key, self.converter.names.as_ref())
    }

    fn allocate_id(&self, element: &str) -> Result<String> {
        self.converter.ids.allocate(element)
    }

    fn document(&mut self, value: &Value) -> Result<()> {
        let options = self.options();
        if !options.root {
            let root = self.sanitize(&options.root_name);
            return self.body(value, &root.name);
        }

        if options.declaration {
            if options.include_encoding {
                self.out.push_str("<?xml version=\"1.0\" encoding=\"");
                escape_to(&options.encoding, &mut self.out);
                self.out.push_str("\" ?>");
            } else {
                self.out.push_str("<?xml version=\"1.0\" ?>");
            }
        }

        let root = self.sanitize(&options.root_name);
        let mut attrs = Attrs::new();
        push_original(&mut attrs, &root);
        self.start_tag(&root.name, &attrs);
        self.body(value, &root.name)?;
        self.end_tag(&root.name);
        Ok(())
    }

    /// Converts a top-level value whose enclosing element is `parent`.
    fn body(&mut self, value: &Value, parent: &str) -> Result<()> {
        match Node::of(value) {
            Node::Null => Ok(()),
            Node::Map(map) => self.map(map, parent, 1),
            Node::Seq(items) => self.seq(items, parent, 1),
            leaf => {
                let naming = &self.options().item_naming;
                let name = self.sanitize(&naming.item_name(parent));
                let mut attrs = Attrs::new();
                push_original(&mut attrs, &name);
                self.leaf(&name.name, attrs, leaf, value);
                Ok(())
            }
        }
    }

    fn enter(&self, depth: usize) -> Result<()> {
        let limit = self.options().max_depth;
        if depth > limit {
            return Err(Error::depth_limit(limit));
        }
        Ok(())
    }

    /// Converts the entries of a mapping held by the element `parent`.
    fn map(&mut self, map: &Map, parent: &str, depth: usize) -> Result<()> {
        self.enter(depth)?;
        for (key, value) in map {
            self.map_entry(key, value, parent, depth)
                .map_err(|e| e.within(key.as_str()))?;
        }
        Ok(())
    }

    fn map_entry(&mut self, key: &str, value: &Value, parent: &str, depth: usize) -> Result<()> {
        let options = self.options();
        let name = self.sanitize(key);

        // Entry ids are drawn under the enclosing element's name.
        let mut attrs = Attrs::new();
        if options.ids {
            attrs.push(("id", Cow::Owned(self.allocate_id(parent)?)));
        }
        push_original(&mut attrs, &name);

        match Node::of(value) {
            Node::Map(map) => {
                if options.type_attributes {
                    attrs.push(("type", Cow::Borrowed(TypeTag::Dict.as_str())));
                }
                self.start_tag(&name.name, &attrs);
                self.map(map, &name.name, depth + 1)?;
                self.end_tag(&name.name);
            }
            Node::Seq(items) => {
                if options.type_attributes {
                    attrs.push(("type", Cow::Borrowed(TypeTag::List.as_str())));
                }
                self.start_tag(&name.name, &attrs);
                self.seq(items, &name.name, depth + 1)?;
                self.end_tag(&name.name);
            }
            leaf => self.leaf(&name.name, attrs, leaf, value),
        }
        Ok(())
    }

    fn seq(&mut self, items: &[Value], parent: &str, depth: usize) -> Result<()> {
        self.enter(depth)?;
        let options = self.options();
        let item = self.sanitize(&options.item_naming.item_name(parent));
        let list_id = if options.ids {
            Some(self.allocate_id(parent)?)
        } else {
            None
        };

        for (index, value) in items.iter().enumerate() {
            let mut attrs = Attrs::new();
            if let Some(list_id) = &list_id {
                attrs.push(("id", Cow::Owned(format!("{}_{}", list_id, index + 1))));
            }
            push_original(&mut attrs, &item);

            self.seq_item(&item.name, parent, attrs, value, depth)
                .map_err(|e| e.within(format!("[{}]", index)))?;
        }
        Ok(())
    }

    fn seq_item(
        &mut self,
        name: &str,
        parent: &str,
        mut attrs: Attrs<'_>,
        value: &Value,
        depth: usize,
    ) -> Result<()> {
        let options = self.options();
        match Node::of(value) {
            Node::Map(map) => {
                self.start_tag(name, &attrs);
                self.map(map, parent, depth + 1)?;
                self.end_tag(name);
            }
            Node::Seq(items) => match options.item_naming {
                ItemNaming::Default => {
                    if options.type_attributes {
                        attrs.push(("type", Cow::Borrowed(TypeTag::List.as_str())));
                    }
                    self.start_tag(name, &attrs);
                    self.seq(items, name, depth + 1)?;
                    self.end_tag(name);
                }
                ItemNaming::Custom(_) => self.seq(items, name, depth + 1)?,
            },
            leaf => self.leaf(name, attrs, leaf, value),
        }
        Ok(())
    }

    /// Writes a scalar element. `node` must not be a container.
    fn leaf(&mut self, name: &str, mut attrs: Attrs<'_>, node: Node<'_>, value: &Value) {
        let options = self.options();
        if options.type_attributes {
            attrs.push(("type", Cow::Borrowed(value.type_tag().as_str())));
        }
        self.start_tag(name, &attrs);

        match node {
            Node::Null | Node::Map(_) | Node::Seq(_) => {}
            Node::Bool(b) => self.out.push_str(if b { "true" } else { "false" }),
            Node::Number(n) => {
                if options.cdata {
                    let mut text = String::new();
                    n.write_to(&mut text);
                    cdata_to(&text, &mut self.out);
                } else {
                    n.write_to(&mut self.out);
                }
            }
            Node::Text(text) => {
                if options.cdata {
                    cdata_to(text, &mut self.out);
                } else {
                    escape_to(text, &mut self.out);
                }
            }
        }

        self.end_tag(name);
    }

    fn start_tag(&mut self, name: &str, attrs: &[(&'static str, Cow<'_, str>)]) {
        self.out.push('<');
        self.out.push_str(name);
        for (attr_name, attr_value) in attrs {
            self.out.push(' ');
            self.out.push_str(attr_name);
            self.out.push_str("=\"");
            self.out.push_str(attr_value);
            self.out.push('"');
        }
        self.out.push('>');
    }

    fn end_tag(&mut self, name: &str) {
        self.out.push_str("</");
        self.out.push_str(name);
        self.out.push('>');
    }
}

/// Adds the `name` attribute when the sanitizer fell back to the generic element name.
fn push_original<'a>(attrs: &mut Attrs<'a>, name: &'a SanitizedName) {
    if let Some(original) = &name.original {
        attrs.push(("name", Cow::Borrowed(original.as_str())));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::reader::{parse_document, XmlEvent, XmlReader};
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DECL: &str = r#"<?xml version="1.0" encoding="UTF-8" ?>"#;

    /// Deterministic allocator: `{element}_{n}` with a shared counter.
    #[derive(Default)]
    struct SequentialIds(AtomicUsize);

    impl IdAllocator for SequentialIds {
        fn allocate(&self, element: &str) -> Result<String> {
            let n = self.0.fetch_add(1, Ordering::Relaxed) + 1;
            Ok(format!("{}_{}", element, n))
        }
    }

    fn isolated(options: Options) -> Converter {
        Converter::new(options.with_return_bytes(false))
            .with_name_validator(Arc::new(NameCache::new()))
            .with_id_allocator(Arc::new(SequentialIds::default()))
    }

    fn xml(value: serde_json::Value) -> String {
        xml_with(value, Options::new())
    }

    fn xml_with(value: serde_json::Value, options: Options) -> String {
        isolated(options)
            .convert_serialize(&value)
            .unwrap()
            .into_string()
    }

    fn body(value: serde_json::Value, options: Options) -> String {
        xml_with(value, options.with_root(false))
    }

    #[test]
    fn test_reference_document() {
        assert_eq!(
            xml(json!({"a": 1, "b": [1, 2, 3]})),
            format!(
                "{}<root><a type=\"int\">1</a><b type=\"list\"><b type=\"int\">1</b>\
                 <b type=\"int\">2</b><b type=\"int\">3</b></b></root>",
                DECL
            )
        );
    }

    #[test]
    fn test_empty_map() {
        assert_eq!(xml(json!({})), format!("{}<root></root>", DECL));
    }

    #[test]
    fn test_null_document() {
        assert_eq!(xml(json!(null)), format!("{}<root></root>", DECL));
    }

    #[test]
    fn test_top_level_scalar_uses_item_name() {
        assert_eq!(
            xml(json!(5)),
            format!("{}<root><root type=\"int\">5</root></root>", DECL)
        );
    }

    #[test]
    fn test_top_level_list() {
        assert_eq!(
            xml(json!(["x", "y"])),
            format!(
                "{}<root><root type=\"str\">x</root><root type=\"str\">y</root></root>",
                DECL
            )
        );
    }

    #[test]
    fn test_declaration_without_encoding() {
        let out = xml_with(json!({}), Options::new().with_encoding_in_declaration(false));
        assert_eq!(out, "<?xml version=\"1.0\" ?><root></root>");
    }

    #[test]
    fn test_custom_encoding_and_root() {
        let out = xml_with(
            json!({}),
            Options::new().with_encoding("ISO-8859-1").with_root_name("data"),
        );
        assert_eq!(out, "<?xml version=\"1.0\" encoding=\"ISO-8859-1\" ?><data></data>");
    }

    #[test]
    fn test_no_declaration() {
        let out = xml_with(json!({"a": true}), Options::new().with_declaration(false));
        assert_eq!(out, "<root><a type=\"bool\">true</a></root>");
    }

    #[test]
    fn test_no_root() {
        assert_eq!(body(json!({"a": 1}), Options::new()), "<a type=\"int\">1</a>");
    }

    #[test]
    fn test_no_root_scalar_uses_root_name() {
        assert_eq!(
            body(json!("hi"), Options::new().with_root_name("doc")),
            "<doc type=\"str\">hi</doc>"
        );
        assert_eq!(body(json!(null), Options::new()), "");
    }

    #[test]
    fn test_scalar_kinds() {
        assert_eq!(
            body(
                json!({"t": true, "f": false, "n": null, "pi": 3.14159, "s": "hi"}),
                Options::new()
            ),
            "<t type=\"bool\">true</t><f type=\"bool\">false</f><n type=\"null\"></n>\
             <pi type=\"float\">3.14159</pi><s type=\"str\">hi</s>"
        );
    }

    #[test]
    fn test_without_type_attributes() {
        assert_eq!(
            body(
                json!({"a": 1, "b": [null], "c": {"d": "e"}}),
                Options::new().with_type_attributes(false)
            ),
            "<a>1</a><b><b></b></b><c><d>e</d></c>"
        );
    }

    #[test]
    fn test_nested_dict_keeps_key() {
        assert_eq!(
            body(json!({"address": {"zip_code": 10001}}), Options::new()),
            "<address type=\"dict\"><zip_code type=\"int\">10001</zip_code></address>"
        );
    }

    #[test]
    fn test_list_of_dicts() {
        assert_eq!(
            body(json!({"friends": [{"name": "Alice"}, {"name": "Bob"}]}), Options::new()),
            "<friends type=\"list\"><friends><name type=\"str\">Alice</name></friends>\
             <friends><name type=\"str\">Bob</name></friends></friends>"
        );
    }

    #[test]
    fn test_nested_lists_wrapped_by_default() {
        assert_eq!(
            body(json!({"m": [[1, 2], [3]]}), Options::new()),
            "<m type=\"list\"><m type=\"list\"><m type=\"int\">1</m><m type=\"int\">2</m></m>\
             <m type=\"list\"><m type=\"int\">3</m></m></m>"
        );
    }

    #[test]
    fn test_nested_lists_flattened_with_custom_naming() {
        assert_eq!(
            body(
                json!({"m": [[1, 2], [3]]}),
                Options::new().with_item_name_fn(|_| "item".to_string())
            ),
            "<m type=\"list\"><item type=\"int\">1</item><item type=\"int\">2</item>\
             <item type=\"int\">3</item></m>"
        );
    }

    #[test]
    fn test_custom_item_names() {
        assert_eq!(
            xml_with(
                json!([1]),
                Options::new()
                    .with_declaration(false)
                    .with_item_name_fn(|parent| format!("{}_item", parent))
            ),
            "<root><root_item type=\"int\">1</root_item></root>"
        );
    }

    #[test]
    fn test_invalid_custom_item_name_falls_back() {
        assert_eq!(
            body(
                json!({"l": ["v"]}),
                Options::new().with_item_name_fn(|_| "1 bad name".to_string())
            ),
            "<l type=\"list\"><key name=\"1 bad name\" type=\"str\">v</key></l>"
        );
    }

    #[test]
    fn test_key_repair() {
        assert_eq!(
            body(json!({"123": 1, "my key": 2, "9 lives": 3}), Options::new()),
            "<n123 type=\"int\">1</n123><my_key type=\"int\">2</my_key>\
             <key name=\"9 lives\" type=\"int\">3</key>"
        );
    }

    #[test]
    fn test_key_with_specials_goes_to_name_attribute() {
        assert_eq!(
            body(json!({"a<b": 1}), Options::new()),
            "<key name=\"a&lt;b\" type=\"int\">1</key>"
        );
    }

    #[test]
    fn test_text_escaped() {
        assert_eq!(
            body(json!({"t": "<a & 'b' \"c\">"}), Options::new()),
            "<t type=\"str\">&lt;a &amp; &apos;b&apos; &quot;c&quot;&gt;</t>"
        );
    }

    #[test]
    fn test_cdata_text() {
        assert_eq!(
            body(json!({"s": "a]]>b", "n": 7, "b": true}), Options::new().with_cdata(true)),
            "<s type=\"str\"><![CDATA[a]]]]><![CDATA[>b]]></s>\
             <n type=\"int\"><![CDATA[7]]></n><b type=\"bool\">true</b>"
        );
    }

    #[test]
    fn test_temporal_values() {
        let date = chrono::NaiveDate::from_ymd_opt(2024, 5, 17).unwrap();
        let value: Value = vec![("when", Value::from(date))].into_iter().collect();
        let out = isolated(Options::new().with_root(false))
            .convert(&value)
            .unwrap()
            .into_string();
        assert_eq!(out, "<when type=\"str\">2024-05-17</when>");
    }

    #[test]
    fn test_ids() {
        assert_eq!(
            body(json!({"a": 1, "b": [true]}), Options::new().with_ids(true)),
            "<a id=\"root_1\" type=\"int\">1</a><b id=\"root_2\" type=\"list\">\
             <b id=\"b_3_1\" type=\"bool\">true</b></b>"
        );
    }

    #[test]
    fn test_entry_ids_use_enclosing_name() {
        assert_eq!(
            xml_with(
                json!({"a": 1, "p": {"c": 2}}),
                Options::new().with_ids(true).with_declaration(false)
            ),
            "<root><a id=\"root_1\" type=\"int\">1</a><p id=\"root_2\" type=\"dict\">\
             <c id=\"p_3\" type=\"int\">2</c></p></root>"
        );
    }

    #[test]
    fn test_ids_for_mappings_inside_lists() {
        assert_eq!(
            body(
                json!({"rows": [{"x": 1}]}),
                Options::new().with_ids(true).with_type_attributes(false)
            ),
            "<rows id=\"root_1\"><rows id=\"rows_2_1\"><x id=\"rows_3\">1</x></rows></rows>"
        );
    }

    #[test]
    fn test_exhausted_ids_abort_conversion() {
        let registry = Arc::new(IdRegistry::with_max_attempts(1));
        registry.exhaust("root");
        let converter = Converter::new(Options::new().with_ids(true))
            .with_name_validator(Arc::new(NameCache::new()))
            .with_id_allocator(registry.clone());

        let result = converter.convert_serialize(&json!({"a": 1}));
        let err = result.unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::IdSpaceExhausted { prefix, attempts: 1 } if prefix == "root"
        ));
        assert_eq!(err.path(), "a");
    }

    #[test]
    fn test_ids_with_fallback_name() {
        assert_eq!(
            body(json!({"x y!": null}), Options::new().with_ids(true)),
            "<key id=\"root_1\" name=\"x y!\" type=\"null\"></key>"
        );
    }

    #[test]
    fn test_random_ids_unique_across_documents() {
        let registry = Arc::new(IdRegistry::new());
        let converter = Converter::new(Options::new().with_ids(true).with_return_bytes(false))
            .with_id_allocator(registry.clone());

        let mut seen = HashSet::new();
        for _ in 0..50 {
            let out = converter
                .convert_serialize(&json!({"row": 1}))
                .unwrap()
                .into_string();
            for event in parse_document(&out).unwrap() {
                if let XmlEvent::StartElement { attributes, .. } = event {
                    for (name, value) in attributes {
                        if name == "id" {
                            assert!(seen.insert(value.into_owned()));
                        }
                    }
                }
            }
        }
        assert_eq!(seen.len(), 50);
        assert_eq!(registry.len(), 50);
    }

    #[test]
    fn test_bytes_by_default() {
        let out = convert(&Value::Null, &Options::new()).unwrap();
        assert!(matches!(out, Output::Bytes(_)));
        assert_eq!(out.as_bytes(), format!("{}<root></root>", DECL).as_bytes());

        let out = convert(&Value::Null, &Options::new().with_return_bytes(false)).unwrap();
        assert!(matches!(out, Output::Text(_)));
    }

    #[test]
    fn test_child_count_matches_key_count() {
        let value = json!({
            "person": {"name": "John Doe", "grades": [90, 85, 88]},
            "pi": 3.14159,
            "colors": ["red", "green", "blue"],
            "nested_lists": [[1, 2, 3], [4, 5, 6]],
            "empty_dict": {},
            "empty_list": [],
            "1st place": "gold",
        });
        let out = xml(value);

        let mut reader = XmlReader::new(&out);
        let mut children = 0;
        loop {
            match reader.next_event().unwrap() {
                XmlEvent::Eof => break,
                XmlEvent::StartElement { .. } if reader.depth() == 2 => children += 1,
                _ => {}
            }
        }
        assert_eq!(children, 7);
    }

    #[test]
    fn test_output_is_well_formed() {
        let out = xml_with(
            json!({
                "weird keys": {"a&b": [1, [2, [3]]], "": null, "0.5": "<x>"},
                "text": "]]> & more",
            }),
            Options::new().with_ids(true),
        );
        parse_document(&out).unwrap();

        let cdata = xml_with(json!({"text": "]]>]]>"}), Options::new().with_cdata(true));
        parse_document(&cdata).unwrap();
    }

    #[test]
    fn test_unsupported_value_produces_no_output() {
        #[derive(serde::Serialize)]
        struct Payload<'a> {
            name: &'a str,
            #[serde(with = "raw_bytes")]
            blob: &'a [u8],
        }

        mod raw_bytes {
            pub fn serialize<S: serde::Serializer>(v: &&[u8], s: S) -> Result<S::Ok, S::Error> {
                s.serialize_bytes(v)
            }
        }

        let err = to_string(&Payload {
            name: "x",
            blob: &[0xde, 0xad],
        })
        .unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::UnsupportedType { type_name, .. } if type_name == "bytes"
        ));
        assert_eq!(err.path(), "blob");
    }

    fn deep_value(levels: usize) -> Value {
        let mut value = Value::from(1);
        for _ in 0..levels {
            value = Value::Seq(vec![value]);
        }
        value
    }

    #[test]
    fn test_depth_limit() {
        let converter = isolated(Options::new().with_max_depth(8));
        assert!(converter.convert(&deep_value(8)).is_ok());

        let err = converter.convert(&deep_value(9)).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::DepthLimitExceeded { limit: 8 }));
        assert!(err.is_resource_exhaustion());
    }

    #[test]
    fn test_default_depth_limit() {
        let err = isolated(Options::new())
            .convert(&deep_value(DEFAULT_MAX_DEPTH + 1))
            .unwrap_err();
        assert!(err.is_resource_exhaustion());
    }

    #[test]
    fn test_name_cache_hits_across_conversions() {
        let cache = Arc::new(NameCache::new());
        let converter = Converter::new(Options::new()).with_name_validator(cache.clone());

        converter.convert_serialize(&json!({"person": 1})).unwrap();
        let checks = cache.checks();
        converter.convert_serialize(&json!({"person": 2})).unwrap();
        assert_eq!(cache.checks(), checks);
    }

    #[test]
    fn test_concurrent_conversions_share_services() {
        let registry = Arc::new(IdRegistry::new());
        let converter = Converter::new(Options::new().with_ids(true).with_return_bytes(false))
            .with_id_allocator(registry.clone());

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let converter = converter.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        converter
                            .convert_serialize(&json!({"thread": t, "i": i}))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.len(), 200);
    }

    #[test]
    fn test_to_writer_and_to_vec() {
        let mut buffer = Vec::new();
        to_writer(&mut buffer, &json!({"k": "v"})).unwrap();
        assert_eq!(buffer, to_vec(&json!({"k": "v"})).unwrap());
        assert!(String::from_utf8(buffer)
            .unwrap()
            .ends_with("<root><k type=\"str\">v</k></root>"));
    }
}
