//! The dynamically-typed value tree accepted by the converter.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeZone};
use indexmap::IndexMap;
use std::fmt::{self, Display};

/// Insertion-ordered mapping from key to value.
pub type Map = IndexMap<String, Value>;

/// A dynamically-typed value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent value.
    Null,
    /// A boolean.
    Bool(bool),
    /// An integer, float or other numeric value.
    Number(Number),
    /// Text.
    String(String),
    /// A date or time, already rendered in ISO-8601 form.
    Temporal(String),
    /// An ordered sequence.
    Seq(Vec<Value>),
    /// An ordered mapping.
    Map(Map),
}

/// A numeric value.
#[derive(Debug, Clone, PartialEq)]
pub struct Number {
    n: N,
}

#[derive(Debug, Clone, PartialEq)]
enum N {
    PosInt(u64),
    NegInt(i64),
    Float(f64),
    /// Numeric value outside the native ranges, kept as its decimal text.
    Other(String),
}

impl Number {
    /// Creates a number from decimal text that does not fit a native type,
    /// e.g. a 128-bit integer or a fixed-point decimal.
    pub fn from_decimal_text<S: Into<String>>(text: S) -> Self {
        Self {
            n: N::Other(text.into()),
        }
    }

    /// Returns true for integer values.
    pub fn is_integer(&self) -> bool {
        matches!(self.n, N::PosInt(_) | N::NegInt(_))
    }

    /// Returns true for float values.
    pub fn is_float(&self) -> bool {
        matches!(self.n, N::Float(_))
    }

    /// Returns the value as an `i64` if it is an integer in range.
    pub fn as_i64(&self) -> Option<i64> {
        match self.n {
            N::PosInt(n) => i64::try_from(n).ok(),
            N::NegInt(n) => Some(n),
            _ => None,
        }
    }

    /// Returns the value as an `f64` if it is a float.
    pub fn as_f64(&self) -> Option<f64> {
        match self.n {
            N::Float(f) => Some(f),
            _ => None,
        }
    }

    /// Appends the textual form of the number to `out`.
    pub(crate) fn write_to(&self, out: &mut String) {
        match &self.n {
            N::PosInt(n) => out.push_str(itoa::Buffer::new().format(*n)),
            N::NegInt(n) => out.push_str(itoa::Buffer::new().format(*n)),
            N::Float(f) if f.is_nan() => out.push_str("nan"),
            N::Float(f) if f.is_infinite() => {
                out.push_str(if *f > 0.0 { "inf" } else { "-inf" })
            }
            N::Float(f) => out.push_str(ryu::Buffer::new().format_finite(*f)),
            N::Other(text) => out.push_str(text),
        }
    }
}

impl Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut text = String::new();
        self.write_to(&mut text);
        f.write_str(&text)
    }
}

macro_rules! from_unsigned {
    ($($ty:ty)*) => {$(
        impl From<$ty> for Number {
            fn from(n: $ty) -> Self {
                Number { n: N::PosInt(n as u64) }
            }
        }
    )*};
}

macro_rules! from_signed {
    ($($ty:ty)*) => {$(
        impl From<$ty> for Number {
            fn from(n: $ty) -> Self {
                let n = n as i64;
                if n < 0 {
                    Number { n: N::NegInt(n) }
                } else {
                    Number { n: N::PosInt(n as u64) }
                }
            }
        }
    )*};
}

from_unsigned!(u8 u16 u32 u64 usize);
from_signed!(i8 i16 i32 i64 isize);

impl From<f32> for Number {
    fn from(f: f32) -> Self {
        Self::from(f as f64)
    }
}

impl From<f64> for Number {
    fn from(f: f64) -> Self {
        Number { n: N::Float(f) }
    }
}

impl From<i128> for Number {
    fn from(n: i128) -> Self {
        match i64::try_from(n) {
            Ok(n) => Self::from(n),
            Err(_) => match u64::try_from(n) {
                Ok(n) => Self::from(n),
                Err(_) => Self::from_decimal_text(n.to_string()),
            },
        }
    }
}

impl From<u128> for Number {
    fn from(n: u128) -> Self {
        match u64::try_from(n) {
            Ok(n) => Self::from(n),
            Err(_) => Self::from_decimal_text(n.to_string()),
        }
    }
}

/// Semantic type tag emitted in `type` attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    /// `null`
    Null,
    /// `bool`
    Bool,
    /// `str`
    Str,
    /// `int`
    Int,
    /// `float`
    Float,
    /// `number`: numeric, but neither a native integer nor a float.
    Number,
    /// `dict`
    Dict,
    /// `list`
    List,
}

impl TypeTag {
    /// Returns the attribute text for this tag.
    pub fn as_str(self) -> &'static str {
        match self {
            TypeTag::Null => "null",
            TypeTag::Bool => "bool",
            TypeTag::Str => "str",
            TypeTag::Int => "int",
            TypeTag::Float => "float",
            TypeTag::Number => "number",
            TypeTag::Dict => "dict",
            TypeTag::List => "list",
        }
    }
}

impl Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Value {
    /// Classifies the value.
    ///
    /// Booleans are never reported as numbers; temporal values are reported
    /// as `str` since they are emitted as text.
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Value::Null => TypeTag::Null,
            Value::Bool(_) => TypeTag::Bool,
            Value::String(_) | Value::Temporal(_) => TypeTag::Str,
            Value::Number(n) if n.is_integer() => TypeTag::Int,
            Value::Number(n) if n.is_float() => TypeTag::Float,
            Value::Number(_) => TypeTag::Number,
            Value::Map(_) => TypeTag::Dict,
            Value::Seq(_) => TypeTag::List,
        }
    }

    /// Creates a temporal value from anything with an ISO-8601 form.
    pub fn from_temporal<T: Temporal + ?Sized>(value: &T) -> Self {
        Value::Temporal(value.to_iso8601())
    }

    /// Returns true for `Value::Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the mapping if this is a `Value::Map`.
    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Returns the sequence if this is a `Value::Seq`.
    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Value::Seq(items) => Some(items),
            _ => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

/// A value with a standard ISO-8601 textual representation.
pub trait Temporal {
    /// Renders the value in ISO-8601 form.
    fn to_iso8601(&self) -> String;
}

impl Temporal for NaiveDate {
    fn to_iso8601(&self) -> String {
        self.format("%Y-%m-%d").to_string()
    }
}

impl Temporal for NaiveTime {
    fn to_iso8601(&self) -> String {
        self.format("%H:%M:%S%.f").to_string()
    }
}

impl Temporal for NaiveDateTime {
    fn to_iso8601(&self) -> String {
        self.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
    }
}

impl<Tz: TimeZone> Temporal for DateTime<Tz>
where
    Tz::Offset: Display,
{
    fn to_iso8601(&self) -> String {
        self.to_rfc3339_opts(SecondsFormat::AutoSi, false)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::from_temporal(&d)
    }
}

impl From<NaiveTime> for Value {
    fn from(t: NaiveTime) -> Self {
        Value::from_temporal(&t)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(dt: NaiveDateTime) -> Self {
        Value::from_temporal(&dt)
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for Value
where
    Tz::Offset: Display,
{
    fn from(dt: DateTime<Tz>) -> Self {
        Value::from_temporal(&dt)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

macro_rules! from_number {
    ($($ty:ty)*) => {$(
        impl From<$ty> for Value {
            fn from(n: $ty) -> Self {
                Value::Number(Number::from(n))
            }
        }
    )*};
}

from_number!(u8 u16 u32 u64 usize u128 i8 i16 i32 i64 isize i128 f32 f64);

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<char> for Value {
    fn from(c: char) -> Self {
        Value::String(c.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Seq(items.into_iter().map(Into::into).collect())
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Value::Map(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Value {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Value::Map(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
