//! Native (in-memory) values produced by property coercion.
//!
//! Raw field values and storage values are plain [`Bson`]. A [`Value`] is what a
//! property hands back from `to_native`: the typed, comparable form used for
//! validation, sorting and typed field access.

use bson::Bson;
use chrono::{NaiveDate, NaiveDateTime};
use std::{cmp::Ordering, fmt};

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";
pub(crate) const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// A native field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view used by value-bound validators.
    pub(crate) fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Total ordering used by the query engine's sort.
    ///
    /// Nulls sort first, integers and floats compare numerically, and values of
    /// unrelated kinds compare as equal so a stable sort leaves them in place.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
                _ => Ordering::Equal,
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::String(s) => write!(f, "{s}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            Value::DateTime(dt) => write!(f, "{}", dt.format(DATETIME_FORMAT)),
        }
    }
}

/// Uncoerced view of a raw value, used when a property cannot coerce it so the
/// validator chain can report the type mismatch.
impl From<&Bson> for Value {
    fn from(bson: &Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Value::Null,
            Bson::String(s) => Value::String(s.clone()),
            Bson::Int32(i) => Value::Integer(i64::from(*i)),
            Bson::Int64(i) => Value::Integer(*i),
            Bson::Double(x) => Value::Float(*x),
            Bson::Boolean(b) => Value::Boolean(*b),
            Bson::DateTime(dt) => Value::DateTime(dt.to_chrono().naive_utc()),
            other => Value::String(other.to_string()),
        }
    }
}

/// Raw representation written into a document's data by typed setters.
impl From<Value> for Bson {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Bson::Null,
            Value::String(s) => Bson::String(s),
            Value::Integer(i) => Bson::Int64(i),
            Value::Float(x) => Bson::Double(x),
            Value::Boolean(b) => Bson::Boolean(b),
            Value::Date(d) => Bson::String(d.format(DATE_FORMAT).to_string()),
            Value::DateTime(dt) => Bson::String(dt.format(DATETIME_FORMAT).to_string()),
        }
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Value::DateTime(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Rust types a typed field handle can read back out of a [`Value`].
pub trait NativeType: Into<Value> + Sized {
    fn from_value(value: Value) -> Option<Self>;
}

impl NativeType for String {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl NativeType for i64 {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Integer(i) => Some(i),
            _ => None,
        }
    }
}

impl NativeType for f64 {
    fn from_value(value: Value) -> Option<Self> {
        value.as_f64()
    }
}

impl NativeType for bool {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Boolean(b) => Some(b),
            _ => None,
        }
    }
}

impl NativeType for NaiveDate {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Date(d) => Some(d),
            _ => None,
        }
    }
}

impl NativeType for NaiveDateTime {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::DateTime(dt) => Some(dt),
            _ => None,
        }
    }
}

/// Renders a storage value the way index keys and string-only stores expect it.
pub fn render_storage(value: &Bson) -> String {
    match value {
        Bson::String(s) => s.clone(),
        Bson::Int32(i) => i.to_string(),
        Bson::Int64(i) => i.to_string(),
        Bson::Double(x) => x.to_string(),
        Bson::Boolean(b) => u8::from(*b).to_string(),
        Bson::Null | Bson::Undefined => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_cmp_orders_nulls_first() {
        assert_eq!(Value::Null.sort_cmp(&Value::from("a")), Ordering::Less);
        assert_eq!(Value::from(3).sort_cmp(&Value::Null), Ordering::Greater);
    }

    #[test]
    fn test_sort_cmp_mixes_integers_and_floats() {
        assert_eq!(Value::from(3).sort_cmp(&Value::from(3.5)), Ordering::Less);
        assert_eq!(Value::from(4.0).sort_cmp(&Value::from(4)), Ordering::Equal);
    }

    #[test]
    fn test_render_storage() {
        assert_eq!(render_storage(&Bson::String("Durham".into())), "Durham");
        assert_eq!(render_storage(&Bson::Int64(7)), "7");
        assert_eq!(render_storage(&Bson::Double(3.5)), "3.5");
        assert_eq!(render_storage(&Bson::Boolean(true)), "1");
    }

    #[test]
    fn test_raw_date_written_as_iso_string() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(Bson::from(Value::from(date)), Bson::String("2024-02-29".into()));
    }
}
