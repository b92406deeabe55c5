//! Typed field descriptors.
//!
//! A [`Property`] describes one declared field of a document schema: how raw
//! values are coerced to native values (`to_native`) and back to their storage
//! shape (`to_storage`), which validators guard it, what its default is, and
//! whether it is indexed or unique.
//!
//! ```ignore
//! use kevlayer::property::Property;
//!
//! let name = Property::char()
//!     .required()
//!     .unique()
//!     .min_length(5)
//!     .max_length(20);
//!
//! assert!(name.is_indexed());
//! ```

use bson::Bson;
use chrono::{NaiveDate, NaiveDateTime, Timelike, Utc};
use std::{fmt, sync::Arc};

use crate::{
    error::{DocumentStoreError, DocumentStoreResult, ValidationError},
    validator::Validator,
    value::{DATE_FORMAT, DATETIME_FORMAT, Value},
};

/// The native type a property coerces to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    Char,
    Slug,
    Email,
    Integer,
    Float,
    Boolean,
    Date,
    DateTime,
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PropertyKind::Char => "char",
            PropertyKind::Slug => "slug",
            PropertyKind::Email => "email",
            PropertyKind::Integer => "integer",
            PropertyKind::Float => "float",
            PropertyKind::Boolean => "boolean",
            PropertyKind::Date => "date",
            PropertyKind::DateTime => "datetime",
        };
        write!(f, "{name}")
    }
}

/// A property's default: a literal or a zero-argument producer.
#[derive(Clone)]
pub enum DefaultValue {
    Literal(Value),
    Producer(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl DefaultValue {
    fn produce(&self) -> Value {
        match self {
            DefaultValue::Literal(value) => value.clone(),
            DefaultValue::Producer(f) => f(),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            DefaultValue::Producer(_) => write!(f, "Producer(..)"),
        }
    }
}

/// A field descriptor. Immutable once it is part of a schema.
///
/// Invariant: `unique` implies `index`.
#[derive(Debug, Clone)]
pub struct Property {
    kind: PropertyKind,
    default: Option<DefaultValue>,
    required: bool,
    index: bool,
    unique: bool,
    auto_now: bool,
    auto_now_add: bool,
    min_length: Option<usize>,
    max_length: Option<usize>,
    min_value: Option<Value>,
    max_value: Option<Value>,
    index_name: Option<String>,
    validators: Vec<Validator>,
}

impl Property {
    pub fn new(kind: PropertyKind) -> Self {
        Self {
            kind,
            default: None,
            required: false,
            index: false,
            unique: false,
            auto_now: false,
            auto_now_add: false,
            min_length: None,
            max_length: None,
            min_value: None,
            max_value: None,
            index_name: None,
            validators: Vec::new(),
        }
    }

    pub fn char() -> Self {
        Self::new(PropertyKind::Char)
    }

    pub fn slug() -> Self {
        Self::new(PropertyKind::Slug)
    }

    pub fn email() -> Self {
        Self::new(PropertyKind::Email)
    }

    pub fn integer() -> Self {
        Self::new(PropertyKind::Integer)
    }

    pub fn float() -> Self {
        Self::new(PropertyKind::Float)
    }

    pub fn boolean() -> Self {
        Self::new(PropertyKind::Boolean)
    }

    pub fn date() -> Self {
        Self::new(PropertyKind::Date)
    }

    pub fn datetime() -> Self {
        Self::new(PropertyKind::DateTime)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn index(mut self) -> Self {
        self.index = true;
        self
    }

    /// Marks the property unique. Unique properties are always indexed.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self.index = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Literal(value.into()));
        self
    }

    /// Sets a producer invoked each time a default is needed.
    pub fn default_with<F>(mut self, producer: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.default = Some(DefaultValue::Producer(Arc::new(producer)));
        self
    }

    /// Date and datetime properties only: recompute the value on every save.
    pub fn auto_now(mut self) -> Self {
        self.auto_now = true;
        self
    }

    /// Date and datetime properties only: stamp the value once, when absent.
    pub fn auto_now_add(mut self) -> Self {
        self.auto_now_add = true;
        self
    }

    pub fn min_length(mut self, length: usize) -> Self {
        self.min_length = Some(length);
        self
    }

    pub fn max_length(mut self, length: usize) -> Self {
        self.max_length = Some(length);
        self
    }

    pub fn min_value(mut self, value: impl Into<Value>) -> Self {
        self.min_value = Some(value.into());
        self
    }

    pub fn max_value(mut self, value: impl Into<Value>) -> Self {
        self.max_value = Some(value.into());
        self
    }

    /// Names the backing secondary index on stores that index natively.
    pub fn index_name(mut self, name: impl Into<String>) -> Self {
        self.index_name = Some(name.into());
        self
    }

    /// Appends a validator that runs after the built-in chain.
    pub fn validator(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    pub fn kind(&self) -> PropertyKind {
        self.kind
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn is_indexed(&self) -> bool {
        self.index
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn is_auto_now(&self) -> bool {
        self.auto_now && self.is_temporal()
    }

    pub fn is_auto_now_add(&self) -> bool {
        self.auto_now_add && self.is_temporal()
    }

    pub fn custom_index_name(&self) -> Option<&str> {
        self.index_name.as_deref()
    }

    fn is_temporal(&self) -> bool {
        matches!(self.kind, PropertyKind::Date | PropertyKind::DateTime)
    }

    /// The full validator chain in evaluation order: required, type check,
    /// length bounds, value bounds, then custom validators.
    pub fn validators(&self) -> Vec<Validator> {
        let mut chain = Vec::new();

        if self.required {
            chain.push(Validator::Required);
        }

        chain.push(match self.kind {
            PropertyKind::Char => Validator::String,
            PropertyKind::Slug => Validator::Slug,
            PropertyKind::Email => Validator::Email,
            PropertyKind::Integer => Validator::Integer,
            PropertyKind::Float => Validator::Float,
            PropertyKind::Boolean => Validator::Boolean,
            PropertyKind::Date => Validator::Date,
            PropertyKind::DateTime => Validator::DateTime,
        });

        if let Some(length) = self.min_length {
            chain.push(Validator::MinLength(length));
        }
        if let Some(length) = self.max_length {
            chain.push(Validator::MaxLength(length));
        }
        if let Some(bound) = &self.min_value {
            chain.push(Validator::MinValue(bound.clone()));
        }
        if let Some(bound) = &self.max_value {
            chain.push(Validator::MaxValue(bound.clone()));
        }

        chain.extend(self.validators.iter().cloned());
        chain
    }

    /// Runs the validator chain, stopping at the first failure.
    pub fn validate(&self, value: &Value, field: &str) -> Result<(), ValidationError> {
        self.validators()
            .iter()
            .try_for_each(|validator| validator.validate(value, field))
    }

    /// Returns the default for this property, or [`Value::Null`] if it has none.
    ///
    /// `auto_now` and `auto_now_add` properties produce the current UTC date or
    /// datetime (truncated to whole seconds).
    pub fn default_for(&self) -> Value {
        if self.is_auto_now() || self.is_auto_now_add() {
            return self.now();
        }

        self.default
            .as_ref()
            .map(DefaultValue::produce)
            .unwrap_or(Value::Null)
    }

    pub(crate) fn now(&self) -> Value {
        let now = Utc::now().naive_utc();

        match self.kind {
            PropertyKind::Date => Value::Date(now.date()),
            _ => Value::DateTime(now.with_nanosecond(0).unwrap_or(now)),
        }
    }

    /// Parses a raw or storage-shaped value into its native form.
    ///
    /// Storage-shaped strings are accepted for every kind. Datetimes have any
    /// fractional seconds and timezone suffix stripped before parsing.
    pub fn to_native(&self, raw: &Bson) -> DocumentStoreResult<Value> {
        if matches!(raw, Bson::Null | Bson::Undefined) {
            return Ok(Value::Null);
        }

        let mismatch = || DocumentStoreError::Parse(format!("Invalid {} value {raw}", self.kind));

        match self.kind {
            PropertyKind::Char | PropertyKind::Slug | PropertyKind::Email => match raw {
                Bson::String(s) => Ok(Value::String(s.clone())),
                _ => Err(mismatch()),
            },
            PropertyKind::Integer => match raw {
                Bson::Int32(i) => Ok(Value::Integer(i64::from(*i))),
                Bson::Int64(i) => Ok(Value::Integer(*i)),
                Bson::String(s) => s.trim().parse().map(Value::Integer).map_err(|_| mismatch()),
                _ => Err(mismatch()),
            },
            PropertyKind::Float => match raw {
                Bson::Double(x) => Ok(Value::Float(*x)),
                Bson::Int32(i) => Ok(Value::Float(f64::from(*i))),
                Bson::Int64(i) => Ok(Value::Float(*i as f64)),
                Bson::String(s) => s.trim().parse().map(Value::Float).map_err(|_| mismatch()),
                _ => Err(mismatch()),
            },
            PropertyKind::Boolean => match raw {
                Bson::Boolean(b) => Ok(Value::Boolean(*b)),
                Bson::Int32(0) | Bson::Int64(0) => Ok(Value::Boolean(false)),
                Bson::Int32(1) | Bson::Int64(1) => Ok(Value::Boolean(true)),
                Bson::String(s) => match s.to_ascii_lowercase().as_str() {
                    "0" | "false" => Ok(Value::Boolean(false)),
                    "1" | "true" => Ok(Value::Boolean(true)),
                    _ => Err(mismatch()),
                },
                _ => Err(mismatch()),
            },
            PropertyKind::Date => match raw {
                Bson::String(s) => NaiveDate::parse_from_str(s, DATE_FORMAT)
                    .map(Value::Date)
                    .map_err(|e| DocumentStoreError::Parse(format!("Invalid ISO date '{s}' [{e}]"))),
                Bson::DateTime(dt) => Ok(Value::Date(dt.to_chrono().date_naive())),
                _ => Err(mismatch()),
            },
            PropertyKind::DateTime => match raw {
                Bson::String(s) => parse_datetime(s).map(Value::DateTime),
                Bson::DateTime(dt) => Ok(Value::DateTime(dt.to_chrono().naive_utc())),
                _ => Err(mismatch()),
            },
        }
    }

    /// Serializes a native value into its storage shape.
    ///
    /// Dates become `YYYY-MM-DD`, datetimes `YYYY-MM-DDTHH:MM:SSZ` (UTC), and
    /// booleans the integers `0`/`1`.
    pub fn to_storage(&self, native: &Value) -> DocumentStoreResult<Bson> {
        let mismatch = || DocumentStoreError::InvalidDocument(format!("Cannot store {native:?} as {}", self.kind));

        Ok(match (self.kind, native) {
            (_, Value::Null) => Bson::Null,
            (PropertyKind::Char | PropertyKind::Slug | PropertyKind::Email, Value::String(s)) => Bson::String(s.clone()),
            (PropertyKind::Integer, Value::Integer(i)) => Bson::Int64(*i),
            (PropertyKind::Float, Value::Float(x)) => Bson::Double(*x),
            (PropertyKind::Float, Value::Integer(i)) => Bson::Double(*i as f64),
            (PropertyKind::Boolean, Value::Boolean(b)) => Bson::Int32(i32::from(*b)),
            (PropertyKind::Date, Value::Date(d)) => Bson::String(d.format(DATE_FORMAT).to_string()),
            (PropertyKind::DateTime, Value::DateTime(dt)) => {
                Bson::String(format!("{}Z", dt.format(DATETIME_FORMAT)))
            }
            _ => return Err(mismatch()),
        })
    }

    /// Coerces a raw value for validation, falling back to its uncoerced view
    /// so the type check reports the mismatch.
    pub(crate) fn coerce(&self, raw: &Bson) -> Value {
        self.to_native(raw).unwrap_or_else(|_| Value::from(raw))
    }
}

fn parse_datetime(raw: &str) -> DocumentStoreResult<NaiveDateTime> {
    let without_fraction = raw.split('.').next().unwrap_or(raw);
    let trimmed = without_fraction.get(..19).unwrap_or(without_fraction);

    NaiveDateTime::parse_from_str(trimmed, DATETIME_FORMAT)
        .map_err(|e| DocumentStoreError::Parse(format!("Invalid ISO date/time '{raw}' [{e}]")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_property_required() {
        let prop = Property::char().required();
        let err = prop.validate(&Value::Null, "first_name").unwrap_err();
        assert_eq!(err.message, "first_name: This value is required");
        assert_eq!(err.field, "first_name");
    }

    #[test]
    fn test_base_property_not_required() {
        let prop = Property::char();
        assert!(!prop.is_required());
        assert!(prop.validate(&Value::Null, "first_name").is_ok());
    }

    #[test]
    fn test_default_values() {
        assert_eq!(Property::char().default_for(), Value::Null);
        assert_eq!(Property::char().default_value("Redis").default_for(), Value::from("Redis"));

        let producer = Property::integer().default_with(|| Value::from(42));
        assert_eq!(producer.default_for(), Value::from(42));
    }

    #[test]
    fn test_unique_implies_index() {
        let prop = Property::char().unique();
        assert!(prop.is_unique());
        assert!(prop.is_indexed());
    }

    #[test]
    fn test_char_validator_chain() {
        assert_eq!(Property::char().validators().len(), 1);
        let chain = Property::char()
            .max_length(20)
            .required()
            .min_length(2)
            .validators();
        assert_eq!(chain.len(), 4);
        assert!(matches!(chain[0], Validator::Required));
        assert!(matches!(chain[1], Validator::String));
        assert!(matches!(chain[2], Validator::MinLength(2)));
        assert!(matches!(chain[3], Validator::MaxLength(20)));
    }

    #[test]
    fn test_integer_validator_chain() {
        assert_eq!(Property::integer().validators().len(), 1);
        assert_eq!(Property::integer().required().validators().len(), 2);
    }

    #[test]
    fn test_required_is_checked_before_type() {
        let prop = Property::integer().required();
        let err = prop.validate(&Value::Null, "no_packages").unwrap_err();
        assert_eq!(err.message, "no_packages: This value is required");
        let err = prop.validate(&Value::from("brains"), "no_packages").unwrap_err();
        assert_eq!(err.message, "no_packages: This value should be an integer");
    }

    #[test]
    fn test_date_parse_and_serialize() {
        let prop = Property::date();
        let value = prop.to_native(&Bson::String("2015-04-21".into())).unwrap();
        assert_eq!(value, Value::Date(NaiveDate::from_ymd_opt(2015, 4, 21).unwrap()));
        assert_eq!(prop.to_storage(&value).unwrap(), Bson::String("2015-04-21".into()));

        let err = prop.to_native(&Bson::String("today".into())).unwrap_err();
        assert!(matches!(err, DocumentStoreError::Parse(msg) if msg.starts_with("Invalid ISO date 'today'")));
    }

    #[test]
    fn test_datetime_strips_fraction_and_timezone() {
        let prop = Property::datetime();
        let expected = NaiveDate::from_ymd_opt(2015, 4, 21)
            .unwrap()
            .and_hms_opt(13, 5, 9)
            .unwrap();

        for raw in ["2015-04-21T13:05:09", "2015-04-21T13:05:09.123456", "2015-04-21T13:05:09Z", "2015-04-21T13:05:09+02:00"] {
            assert_eq!(prop.to_native(&Bson::String(raw.into())).unwrap(), Value::DateTime(expected));
        }

        assert_eq!(
            prop.to_storage(&Value::DateTime(expected)).unwrap(),
            Bson::String("2015-04-21T13:05:09Z".into())
        );
        assert!(prop.to_native(&Bson::String("today".into())).is_err());
    }

    #[test]
    fn test_boolean_storage_is_integer() {
        let prop = Property::boolean();
        assert_eq!(prop.to_storage(&Value::Boolean(true)).unwrap(), Bson::Int32(1));
        assert_eq!(prop.to_storage(&Value::Boolean(false)).unwrap(), Bson::Int32(0));
        assert_eq!(prop.to_native(&Bson::Int32(1)).unwrap(), Value::Boolean(true));
        assert_eq!(prop.to_native(&Bson::String("0".into())).unwrap(), Value::Boolean(false));
        assert!(prop.to_native(&Bson::Int32(2)).is_err());
        assert!(prop.to_native(&Bson::String("Gone".into())).is_err());
    }

    #[test]
    fn test_boolean_rejects_non_boolean_input() {
        let prop = Property::boolean();
        let value = prop.coerce(&Bson::String("Gone".into()));
        let err = prop.validate(&value, "is_active").unwrap_err();
        assert_eq!(err.message, "is_active: This value should be True or False.");
    }

    #[test]
    fn test_round_trip_every_kind() {
        let date = NaiveDate::from_ymd_opt(2020, 1, 31).unwrap();
        let cases = [
            (Property::char(), Value::from("Goo and Sons")),
            (Property::slug(), Value::from("goo-sons")),
            (Property::email(), Value::from("goo@sons.com")),
            (Property::integer(), Value::from(-17)),
            (Property::float(), Value::from(3.25)),
            (Property::boolean(), Value::from(true)),
            (Property::boolean(), Value::from(false)),
            (Property::date(), Value::from(date)),
            (Property::datetime(), Value::from(date.and_hms_opt(23, 59, 1).unwrap())),
            (Property::integer(), Value::Null),
        ];

        for (prop, value) in cases {
            let stored = prop.to_storage(&value).unwrap();
            assert_eq!(prop.to_native(&stored).unwrap(), value, "{} round trip", prop.kind());
        }
    }

    #[test]
    fn test_string_storage_values_are_accepted() {
        assert_eq!(Property::integer().to_native(&Bson::String("7".into())).unwrap(), Value::from(7));
        assert_eq!(Property::float().to_native(&Bson::String("3.1".into())).unwrap(), Value::from(3.1));
    }

    #[test]
    fn test_auto_now_produces_current_date() {
        let prop = Property::date().auto_now_add();
        assert_eq!(prop.default_for(), Value::Date(Utc::now().date_naive()));
        assert!(!Property::char().auto_now().is_auto_now());
    }
}
