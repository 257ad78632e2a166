//! # dict_xml
//!
//! Converts dynamically-typed nested values (maps, sequences, scalars, null,
//! dates) into well-formed XML documents.
//!
//! ## Features
//!
//! - Any `serde::Serialize` value, or a hand-built [`Value`] tree
//! - Invalid keys repaired into valid element names, with the original kept in a `name` attribute
//! - Optional `type` attributes (`int`, `float`, `str`, `bool`, `null`, `number`, `dict`, `list`)
//! - Optional unique `id` attributes
//! - Escaped text or CDATA sections
//! - Shared, thread-safe name cache and id registry that can be swapped per converter
//!
//! ## Quick Start
//!
//! ```rust
//! use serde_json::json;
//!
//! let xml = dict_xml::to_string(&json!({"name": "Alice", "age": 30})).unwrap();
//! assert_eq!(
//!     xml,
//!     "<?xml version=\"1.0\" encoding=\"UTF-8\" ?><root>\
//!      <name type=\"str\">Alice</name><age type=\"int\">30</age></root>"
//! );
//! ```
//!
//! ## Options
//!
//! ```rust
//! use dict_xml::{to_string_with_options, Options};
//! use serde_json::json;
//!
//! let options = Options::new()
//!     .with_root_name("library")
//!     .with_declaration(false)
//!     .with_type_attributes(false)
//!     .with_item_name_fn(|_| "book".to_string());
//!
//! let xml = to_string_with_options(&json!({"books": ["Dune", "Emma"]}), &options).unwrap();
//! assert_eq!(
//!     xml,
//!     "<library><books><book>Dune</book><book>Emma</book></books></library>"
//! );
//! ```
//!
//! ## Building values by hand
//!
//! ```rust
//! use chrono::NaiveDate;
//! use dict_xml::{convert, Options, Value};
//!
//! let value: Value = vec![
//!     ("released", Value::from(NaiveDate::from_ymd_opt(2015, 5, 15).unwrap())),
//!     ("tags", Value::from(vec!["rust", "xml"])),
//! ]
//! .into_iter()
//! .collect();
//!
//! let xml = convert(&value, &Options::new().with_root(false)).unwrap().into_string();
//! assert_eq!(
//!     xml,
//!     "<released type=\"str\">2015-05-15</released>\
//!      <tags type=\"list\"><tags type=\"str\">rust</tags><tags type=\"str\">xml</tags></tags>"
//! );
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod convert;
pub mod error;
pub mod escape;
pub mod id;
pub mod name;
mod reader;
pub mod ser;
pub mod value;

// Re-export main types and functions
pub use convert::{
    convert, to_string, to_string_with_options, to_vec, to_writer, Converter, ItemNaming,
    Options, Output,
};
pub use error::{Error, ErrorKind, Result};
pub use escape::{escape, wrap_cdata};
pub use id::{IdAllocator, IdRegistry};
pub use name::{sanitize, NameCache, NameValidator, SanitizedName};
pub use ser::{to_value, Serializer};
pub use value::{Map, Number, Temporal, TypeTag, Value};

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use serde_json::json;

    fn sample() -> serde_json::Value {
        json!({
            "person": {
                "name": "John Doe",
                "age": 30,
                "is_student": true,
                "grades": [90, 85, 88],
                "address": {"street": "123 Main St", "zip_code": 10001},
                "friends": [{"name": "Alice", "age": 28}, {"name": "Bob", "age": 32}],
            },
            "pi": 3.14159,
            "nested_lists": [[1, 2], [3]],
            "empty_dict": {},
            "empty_list": [],
        })
    }

    #[test]
    fn test_sample_document() {
        let xml = to_string_with_options(&sample(), &Options::new().with_declaration(false)).unwrap();
        assert_eq!(
            xml,
            concat!(
                "<root>",
                "<person type=\"dict\">",
                "<name type=\"str\">John Doe</name>",
                "<age type=\"int\">30</age>",
                "<is_student type=\"bool\">true</is_student>",
                "<grades type=\"list\"><grades type=\"int\">90</grades>",
                "<grades type=\"int\">85</grades><grades type=\"int\">88</grades></grades>",
                "<address type=\"dict\"><street type=\"str\">123 Main St</street>",
                "<zip_code type=\"int\">10001</zip_code></address>",
                "<friends type=\"list\">",
                "<friends><name type=\"str\">Alice</name><age type=\"int\">28</age></friends>",
                "<friends><name type=\"str\">Bob</name><age type=\"int\">32</age></friends>",
                "</friends>",
                "</person>",
                "<pi type=\"float\">3.14159</pi>",
                "<nested_lists type=\"list\">",
                "<nested_lists type=\"list\"><nested_lists type=\"int\">1</nested_lists>",
                "<nested_lists type=\"int\">2</nested_lists></nested_lists>",
                "<nested_lists type=\"list\"><nested_lists type=\"int\">3</nested_lists></nested_lists>",
                "</nested_lists>",
                "<empty_dict type=\"dict\"></empty_dict>",
                "<empty_list type=\"list\"></empty_list>",
                "</root>",
            )
        );
    }

    #[test]
    fn test_sample_is_well_formed() {
        let xml = to_string_with_options(&sample(), &Options::new().with_ids(true)).unwrap();
        reader::parse_document(&xml).unwrap();
    }

    #[test]
    fn test_derived_struct() {
        #[derive(Serialize)]
        struct Book {
            title: String,
            year: u32,
            rating: Option<f32>,
        }

        #[derive(Serialize)]
        struct Library {
            name: String,
            book: Vec<Book>,
        }

        let library = Library {
            name: "My Library".to_string(),
            book: vec![
                Book {
                    title: "Programming Rust".to_string(),
                    year: 2021,
                    rating: None,
                },
            ],
        };

        let xml = to_string_with_options(
            &library,
            &Options::new().with_root_name("Library").with_declaration(false),
        )
        .unwrap();
        assert_eq!(
            xml,
            "<Library><name type=\"str\">My Library</name><book type=\"list\"><book>\
             <title type=\"str\">Programming Rust</title><year type=\"int\">2021</year>\
             <rating type=\"null\"></rating></book></book></Library>"
        );
    }

    #[test]
    fn test_booleans_are_lowercase() {
        let xml = to_string(&json!([true, false])).unwrap();
        assert!(xml.contains(">true<"));
        assert!(xml.contains(">false<"));
        assert!(!xml.contains("True") && !xml.contains("False"));
    }

    #[test]
    fn test_error_reporting() {
        struct Opaque;
        impl Serialize for Opaque {
            fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
                s.serialize_bytes(&[0x00])
            }
        }

        #[derive(Serialize)]
        struct Holder {
            items: Vec<Opaque>,
        }

        let err = to_string(&Holder {
            items: vec![Opaque],
        })
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "unsupported data type: [0] (bytes) at items[0]"
        );
    }
}
