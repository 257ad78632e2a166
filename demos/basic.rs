//! Basic example converting serde values and hand-built values into XML.

use dict_xml::{to_string, Converter, IdRegistry, NameCache, Options, Value};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Serialize)]
struct Person {
    name: String,
    age: u32,
    email: String,
    tags: Vec<String>,
}

fn main() {
    // Serialize a struct with the default options
    let person = Person {
        name: "Alice Smith".to_string(),
        age: 30,
        email: "alice@example.com".to_string(),
        tags: vec!["admin".to_string(), "ops".to_string()],
    };

    let xml = to_string(&person).expect("Failed to convert");
    println!("Struct:");
    println!("{}", xml);
    println!();

    // Keys that are not valid element names are repaired
    let messy = json!({
        "first name": "Bob",
        "2fa": false,
        "a&b": "<tag> & 'quote'",
    });
    let xml = to_string(&messy).expect("Failed to convert");
    println!("Repaired names:");
    println!("{}", xml);
    println!();

    // Ids, CDATA and custom item names, with services owned by this converter
    let converter = Converter::new(
        Options::new()
            .with_root_name("inventory")
            .with_ids(true)
            .with_cdata(true)
            .with_item_name_fn(|parent| format!("{}_item", parent))
            .with_return_bytes(false),
    )
    .with_name_validator(Arc::new(NameCache::new()))
    .with_id_allocator(Arc::new(IdRegistry::new()));

    let stock: Value = vec![
        ("fruit", Value::from(vec!["apple", "pear"])),
        ("count", Value::from(12)),
        ("note", Value::from("fresh ]]> today")),
    ]
    .into_iter()
    .collect();

    let xml = converter
        .convert(&stock)
        .expect("Failed to convert")
        .into_string();
    println!("Converter with ids and CDATA:");
    println!("{}", xml);
}
