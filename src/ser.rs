//! Serde serializer producing [`Value`] trees.
//!
//! This is the boundary where foreign data enters the converter. Anything
//! serde can describe maps onto [`Value`] except:
//!
//! - byte strings used as values (`type_name = "bytes"`),
//! - map keys that are not scalars (`type_name = "seq"`, `"map"`, ...),
//!
//! which fail with [`ErrorKind::UnsupportedType`](crate::ErrorKind::UnsupportedType).
//!
//! ```rust
//! use serde::Serialize;
//! use dict_xml::{to_value, Value};
//!
//! #[derive(Serialize)]
//! struct Point {
//!     x: i32,
//!     y: i32,
//! }
//!
//! let value = to_value(&Point { x: 1, y: 2 }).unwrap();
//! assert_eq!(value.as_map().unwrap()["x"], Value::from(1));
//! ```

use crate::convert::DEFAULT_MAX_DEPTH;
use crate::error::{Error, ErrorKind, Result};
use crate::value::{Map, Number, Value};
use serde::ser::{self, Serialize};

/// Converts any serializable value into a [`Value`] tree.
pub fn to_value<T>(value: &T) -> Result<Value>
where
    T: Serialize + ?Sized,
{
    to_value_with_limit(value, DEFAULT_MAX_DEPTH)
}

/// Converts a serializable value, failing once containers nest deeper than `max_depth`.
///
/// Self-referential `Serialize` implementations end with
/// [`ErrorKind::DepthLimitExceeded`] instead of overflowing the stack.
pub fn to_value_with_limit<T>(value: &T, max_depth: usize) -> Result<Value>
where
    T: Serialize + ?Sized,
{
    value.serialize(Serializer::new(max_depth))
}

/// Serializer whose output is a [`Value`].
#[derive(Debug, Clone, Copy)]
pub struct Serializer {
    depth: usize,
    max_depth: usize,
}

impl Serializer {
    /// Creates a serializer that rejects nesting deeper than `max_depth`.
    pub fn new(max_depth: usize) -> Self {
        Self {
            depth: 0,
            max_depth,
        }
    }

    /// Returns the serializer for the contents of a container one level down.
    fn nested(self) -> Result<Self> {
        let depth = self.depth + 1;
        if depth > self.max_depth {
            return Err(Error::depth_limit(self.max_depth));
        }
        Ok(Self { depth, ..self })
    }
}

fn single_entry(key: &str, value: Value) -> Value {
    let mut map = Map::with_capacity(1);
    map.insert(key.to_string(), value);
    Value::Map(map)
}

impl ser::Serializer for Serializer {
    type Ok = Value;
    type Error = Error;

    type SerializeSeq = SeqSerializer;
    type SerializeTuple = SeqSerializer;
    type SerializeTupleStruct = SeqSerializer;
    type SerializeTupleVariant = SeqSerializer;
    type SerializeMap = MapSerializer;
    type SerializeStruct = MapSerializer;
    type SerializeStructVariant = MapSerializer;

    fn serialize_bool(self, v: bool) -> Result<Value> {
        Ok(Value::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Value> {
        self.serialize_i64(v as i64)
    }

    fn serialize_i16(self, v: i16) -> Result<Value> {
        self.serialize_i64(v as i64)
    }

    fn serialize_i32(self, v: i32) -> Result<Value> {
        self.serialize_i64(v as i64)
    }

    fn serialize_i64(self, v: i64) -> Result<Value> {
        Ok(Value::Number(v.into()))
    }

    fn serialize_i128(self, v: i128) -> Result<Value> {
        Ok(Value::Number(v.into()))
    }

    fn serialize_u8(self, v: u8) -> Result<Value> {
        self.serialize_u64(v as u64)
    }

    fn serialize_u16(self, v: u16) -> Result<Value> {
        self.serialize_u64(v as u64)
    }

    fn serialize_u32(self, v: u32) -> Result<Value> {
        self.serialize_u64(v as u64)
    }

    fn serialize_u64(self, v: u64) -> Result<Value> {
        Ok(Value::Number(v.into()))
    }

    fn serialize_u128(self, v: u128) -> Result<Value> {
        Ok(Value::Number(v.into()))
    }

    fn serialize_f32(self, v: f32) -> Result<Value> {
        self.serialize_f64(v as f64)
    }

    fn serialize_f64(self, v: f64) -> Result<Value> {
        Ok(Value::Number(Number::from(v)))
    }

    fn serialize_char(self, v: char) -> Result<Value> {
        Ok(Value::String(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<Value> {
        Ok(Value::String(v.to_string()))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Value> {
        Err(Error::unsupported_type("bytes", format!("{:?}", v)))
    }

    fn serialize_none(self) -> Result<Value> {
        Ok(Value::Null)
    }

    fn serialize_some<T>(self, value: &T) -> Result<Value>
    where
        T: Serialize + ?Sized,
    {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Value> {
        Ok(Value::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Value> {
        Ok(Value::Null)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Value> {
        Ok(Value::String(variant.to_string()))
    }

    fn serialize_newtype_struct<T>(self, _name: &'static str, value: &T) -> Result<Value>
    where
        T: Serialize + ?Sized,
    {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Value>
    where
        T: Serialize + ?Sized,
    {
        let inner = value
            .serialize(self.nested()?)
            .map_err(|e| e.within(variant))?;
        Ok(single_entry(variant, inner))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SeqSerializer> {
        Ok(SeqSerializer {
            ser: self.nested()?,
            items: Vec::with_capacity(len.unwrap_or(0)),
            variant: None,
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<SeqSerializer> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(self, _name: &'static str, len: usize) -> Result<SeqSerializer> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<SeqSerializer> {
        Ok(SeqSerializer {
            ser: self.nested()?.nested()?,
            items: Vec::with_capacity(len),
            variant: Some(variant),
        })
    }

    fn serialize_map(self, len: Option<usize>) -> Result<MapSerializer> {
        Ok(MapSerializer {
            ser: self.nested()?,
            map: Map::with_capacity(len.unwrap_or(0)),
            pending_key: None,
            variant: None,
        })
    }

    fn serialize_struct(self, _name: &'static str, len: usize) -> Result<MapSerializer> {
        self.serialize_map(Some(len))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<MapSerializer> {
        Ok(MapSerializer {
            ser: self.nested()?.nested()?,
            map: Map::with_capacity(len),
            pending_key: None,
            variant: Some(variant),
        })
    }
}

/// Sequence serializer. Tuple variants wrap the sequence in `{variant: [...]}`.
pub struct SeqSerializer {
    ser: Serializer,
    items: Vec<Value>,
    variant: Option<&'static str>,
}

impl SeqSerializer {
    fn push<T>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let index = self.items.len();
        let item = value
            .serialize(self.ser)
            .map_err(|e| e.within(format!("[{}]", index)))?;
        self.items.push(item);
        Ok(())
    }

    fn finish(self) -> Value {
        let seq = Value::Seq(self.items);
        match self.variant {
            Some(variant) => single_entry(variant, seq),
            None => seq,
        }
    }
}

impl ser::SerializeSeq for SeqSerializer {
    type Ok = Value;
    type Error = Error;

    fn serialize_element<T>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.push(value)
    }

    fn end(self) -> Result<Value> {
        Ok(self.finish())
    }
}

impl ser::SerializeTuple for SeqSerializer {
    type Ok = Value;
    type Error = Error;

    fn serialize_element<T>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.push(value)
    }

    fn end(self) -> Result<Value> {
        Ok(self.finish())
    }
}

impl ser::SerializeTupleStruct for SeqSerializer {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.push(value)
    }

    fn end(self) -> Result<Value> {
        Ok(self.finish())
    }
}

impl ser::SerializeTupleVariant for SeqSerializer {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.push(value)
    }

    fn end(self) -> Result<Value> {
        Ok(self.finish())
    }
}

/// Map and struct serializer. Struct variants wrap the fields in `{variant: {...}}`.
pub struct MapSerializer {
    ser: Serializer,
    map: Map,
    pending_key: Option<String>,
    variant: Option<&'static str>,
}

impl MapSerializer {
    fn insert<T>(&mut self, key: String, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let value = match value.serialize(self.ser) {
            Ok(value) => value,
            Err(e) => return Err(e.within(key)),
        };
        self.map.insert(key, value);
        Ok(())
    }

    fn finish(self) -> Value {
        let map = Value::Map(self.map);
        match self.variant {
            Some(variant) => single_entry(variant, map),
            None => map,
        }
    }
}

impl ser::SerializeMap for MapSerializer {
    type Ok = Value;
    type Error = Error;

    fn serialize_key<T>(&mut self, key: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.pending_key = Some(key.serialize(MapKeySerializer)?);
        Ok(())
    }

    fn serialize_value<T>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let key = self
            .pending_key
            .take()
            .ok_or_else(|| Error::custom("serialize_value called before serialize_key"))?;
        self.insert(key, value)
    }

    fn end(self) -> Result<Value> {
        Ok(self.finish())
    }
}

impl ser::SerializeStruct for MapSerializer {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T>(&mut self, key: &'static str, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.insert(key.to_string(), value)
    }

    fn end(self) -> Result<Value> {
        Ok(self.finish())
    }
}

impl ser::SerializeStructVariant for MapSerializer {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T>(&mut self, key: &'static str, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.insert(key.to_string(), value)
    }

    fn end(self) -> Result<Value> {
        Ok(self.finish())
    }
}

/// Renders scalar map keys as strings; byte strings are decoded as UTF-8.
struct MapKeySerializer;

fn key_must_be_scalar(type_name: &str) -> Error {
    Error::unsupported_type(type_name, "map key")
}

impl ser::Serializer for MapKeySerializer {
    type Ok = String;
    type Error = Error;

    type SerializeSeq = ser::Impossible<String, Error>;
    type SerializeTuple = ser::Impossible<String, Error>;
    type SerializeTupleStruct = ser::Impossible<String, Error>;
    type SerializeTupleVariant = ser::Impossible<String, Error>;
    type SerializeMap = ser::Impossible<String, Error>;
    type SerializeStruct = ser::Impossible<String, Error>;
    type SerializeStructVariant = ser::Impossible<String, Error>;

    fn serialize_bool(self, v: bool) -> Result<String> {
        Ok(if v { "true" } else { "false" }.to_string())
    }

    fn serialize_i8(self, v: i8) -> Result<String> { self.serialize_i64(v as i64) }
    fn serialize_i16(self, v: i16) -> Result<String> { self.serialize_i64(v as i64) }
    fn serialize_i32(self, v: i32) -> Result<String> { self.serialize_i64(v as i64) }
    fn serialize_i64(self, v: i64) -> Result<String> {
        Ok(itoa::Buffer::new().format(v).to_string())
    }
    fn serialize_i128(self, v: i128) -> Result<String> {
        Ok(itoa::Buffer::new().format(v).to_string())
    }

    fn serialize_u8(self, v: u8) -> Result<String> { self.serialize_u64(v as u64) }
    fn serialize_u16(self, v: u16) -> Result<String> { self.serialize_u64(v as u64) }
    fn serialize_u32(self, v: u32) -> Result<String> { self.serialize_u64(v as u64) }
    fn serialize_u64(self, v: u64) -> Result<String> {
        Ok(itoa::Buffer::new().format(v).to_string())
    }
    fn serialize_u128(self, v: u128) -> Result<String> {
        Ok(itoa::Buffer::new().format(v).to_string())
    }

    fn serialize_f32(self, v: f32) -> Result<String> { self.serialize_f64(v as f64) }
    fn serialize_f64(self, v: f64) -> Result<String> {
        Ok(Number::from(v).to_string())
    }

    fn serialize_char(self, v: char) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_str(self, v: &str) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<String> {
        std::str::from_utf8(v)
            .map(str::to_string)
            .map_err(|_| Error::new(ErrorKind::InvalidUtf8))
    }

    fn serialize_none(self) -> Result<String> { Err(key_must_be_scalar("null")) }
    fn serialize_some<T: ?Sized + Serialize>(self, v: &T) -> Result<String> { v.serialize(self) }
    fn serialize_unit(self) -> Result<String> { Err(key_must_be_scalar("null")) }
    fn serialize_unit_struct(self, name: &'static str) -> Result<String> {
        Err(key_must_be_scalar(name))
    }
    fn serialize_unit_variant(self, _name: &'static str, _idx: u32, variant: &'static str) -> Result<String> {
        Ok(variant.to_string())
    }
    fn serialize_newtype_struct<T: ?Sized + Serialize>(self, _name: &'static str, v: &T) -> Result<String> {
        v.serialize(self)
    }
    fn serialize_newtype_variant<T: ?Sized + Serialize>(self, _name: &'static str, _idx: u32, variant: &'static str, _v: &T) -> Result<String> {
        Err(key_must_be_scalar(variant))
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq> {
        Err(key_must_be_scalar("seq"))
    }
    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple> {
        Err(key_must_be_scalar("tuple"))
    }
    fn serialize_tuple_struct(self, name: &'static str, _len: usize) -> Result<Self::SerializeTupleStruct> {
        Err(key_must_be_scalar(name))
    }
    fn serialize_tuple_variant(self, _name: &'static str, _idx: u32, variant: &'static str, _len: usize) -> Result<Self::SerializeTupleVariant> {
        Err(key_must_be_scalar(variant))
    }
    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap> {
        Err(key_must_be_scalar("map"))
    }
    fn serialize_struct(self, name: &'static str, _len: usize) -> Result<Self::SerializeStruct> {
        Err(key_must_be_scalar(name))
    }
    fn serialize_struct_variant(self, _name: &'static str, _idx: u32, variant: &'static str, _len: usize) -> Result<Self::SerializeStructVariant> {
        Err(key_must_be_scalar(variant))
    }
}
