//! Field validators run by [`Property::validate`](crate::property::Property::validate).

use std::{fmt, sync::Arc};

use crate::{error::ValidationError, value::Value};

type CustomFn = dyn Fn(&Value, &str) -> Result<(), ValidationError> + Send + Sync;

/// A single check in a property's validator chain.
///
/// Type checks ignore null values; absence is the business of [`Validator::Required`].
#[derive(Clone)]
pub enum Validator {
    Required,
    String,
    Slug,
    Email,
    Integer,
    Float,
    Boolean,
    Date,
    DateTime,
    MinLength(usize),
    MaxLength(usize),
    MinValue(Value),
    MaxValue(Value),
    Custom(Arc<CustomFn>),
}

impl Validator {
    /// Wraps a closure as a custom validator.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&Value, &str) -> Result<(), ValidationError> + Send + Sync + 'static,
    {
        Validator::Custom(Arc::new(f))
    }

    pub fn validate(&self, value: &Value, field: &str) -> Result<(), ValidationError> {
        let fail = |message: String| Err(ValidationError::new(field, message));

        match self {
            Validator::Required => match value {
                Value::Null => fail(format!("{field}: This value is required")),
                Value::String(s) if s.is_empty() => fail(format!("{field}: This value is required")),
                _ => Ok(()),
            },
            Validator::String => match value {
                Value::Null | Value::String(_) => Ok(()),
                _ => fail(format!("{field}: This value should be a string")),
            },
            Validator::Slug => match value {
                Value::Null => Ok(()),
                Value::String(s) if is_slug(s) => Ok(()),
                _ => fail(format!("{field}: This value should be a valid slug")),
            },
            Validator::Email => match value {
                Value::Null => Ok(()),
                Value::String(s) if is_email(s) => Ok(()),
                _ => fail(format!("{field}: This value should be a valid email address")),
            },
            Validator::Integer => match value {
                Value::Null | Value::Integer(_) => Ok(()),
                _ => fail(format!("{field}: This value should be an integer")),
            },
            Validator::Float => match value {
                Value::Null | Value::Float(_) => Ok(()),
                _ => fail(format!("{field}: This value should be a float.")),
            },
            Validator::Boolean => match value {
                Value::Null | Value::Boolean(_) => Ok(()),
                _ => fail(format!("{field}: This value should be True or False.")),
            },
            Validator::Date => match value {
                Value::Null | Value::Date(_) => Ok(()),
                _ => fail(format!("{field}: This value should be a valid date object.")),
            },
            Validator::DateTime => match value {
                Value::Null | Value::DateTime(_) => Ok(()),
                _ => fail(format!("{field}: This value should be a valid datetime object.")),
            },
            Validator::MinLength(length) => match value {
                Value::String(s) if s.chars().count() < *length => fail(format!(
                    "{field}: This value should have a length greater than {length}. Currently {s}"
                )),
                _ => Ok(()),
            },
            Validator::MaxLength(length) => match value {
                Value::String(s) if s.chars().count() > *length => fail(format!(
                    "{field}: This value should have a length lesser than {length}. Currently {s}"
                )),
                _ => Ok(()),
            },
            Validator::MinValue(bound) => match (value.as_f64(), bound.as_f64()) {
                (Some(v), Some(b)) if v < b => fail(format!(
                    "{field}: This value should have a value greater than {bound}. Currently {value}"
                )),
                _ => Ok(()),
            },
            Validator::MaxValue(bound) => match (value.as_f64(), bound.as_f64()) {
                (Some(v), Some(b)) if v > b => fail(format!(
                    "{field}: This value should have a value lesser than {bound}. Currently {value}"
                )),
                _ => Ok(()),
            },
            Validator::Custom(f) => f(value, field),
        }
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Validator::Required => write!(f, "Required"),
            Validator::String => write!(f, "String"),
            Validator::Slug => write!(f, "Slug"),
            Validator::Email => write!(f, "Email"),
            Validator::Integer => write!(f, "Integer"),
            Validator::Float => write!(f, "Float"),
            Validator::Boolean => write!(f, "Boolean"),
            Validator::Date => write!(f, "Date"),
            Validator::DateTime => write!(f, "DateTime"),
            Validator::MinLength(n) => f.debug_tuple("MinLength").field(n).finish(),
            Validator::MaxLength(n) => f.debug_tuple("MaxLength").field(n).finish(),
            Validator::MinValue(v) => f.debug_tuple("MinValue").field(v).finish(),
            Validator::MaxValue(v) => f.debug_tuple("MaxValue").field(v).finish(),
            Validator::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

fn is_slug(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
}

fn is_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .split_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
                && !value.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(validator: Validator, value: Value, field: &str) -> String {
        validator
            .validate(&value, field)
            .unwrap_err()
            .message
    }

    #[test]
    fn test_required_validator() {
        assert_eq!(message(Validator::Required, Value::Null, "first_name"), "first_name: This value is required");
        assert_eq!(message(Validator::Required, Value::from(""), "first_name"), "first_name: This value is required");
        assert!(Validator::Required.validate(&Value::from(0), "n").is_ok());
    }

    #[test]
    fn test_type_validators_skip_null() {
        for validator in [Validator::String, Validator::Integer, Validator::Float, Validator::Boolean, Validator::Date] {
            assert!(validator.validate(&Value::Null, "field").is_ok());
        }
    }

    #[test]
    fn test_type_validator_messages() {
        assert_eq!(message(Validator::String, Value::from(34), "first_name"), "first_name: This value should be a string");
        assert_eq!(message(Validator::Integer, Value::from("brains"), "no_packages"), "no_packages: This value should be an integer");
        assert_eq!(message(Validator::Float, Value::from("seven"), "gpa"), "gpa: This value should be a float.");
        assert_eq!(message(Validator::Boolean, Value::from("Gone"), "is_active"), "is_active: This value should be True or False.");
        assert_eq!(message(Validator::Date, Value::from("today"), "d"), "d: This value should be a valid date object.");
        assert_eq!(message(Validator::DateTime, Value::from("today"), "dt"), "dt: This value should be a valid datetime object.");
    }

    #[test]
    fn test_length_validators() {
        assert_eq!(
            message(Validator::MaxLength(5), Value::from("Brian Jinwright"), "name"),
            "name: This value should have a length lesser than 5. Currently Brian Jinwright"
        );
        assert_eq!(
            message(Validator::MinLength(5), Value::from("Bob"), "name"),
            "name: This value should have a length greater than 5. Currently Bob"
        );
        assert!(Validator::MaxLength(5).validate(&Value::from("Brian"), "name").is_ok());
    }

    #[test]
    fn test_value_validators() {
        assert_eq!(
            message(Validator::MaxValue(Value::from(20)), Value::from(21), "no_subscriptions"),
            "no_subscriptions: This value should have a value lesser than 20. Currently 21"
        );
        assert_eq!(
            message(Validator::MinValue(Value::from(1)), Value::from(0), "no_subscriptions"),
            "no_subscriptions: This value should have a value greater than 1. Currently 0"
        );
        assert!(Validator::MinValue(Value::from(1.5)).validate(&Value::from(2), "x").is_ok());
    }

    #[test]
    fn test_slug_and_email() {
        assert!(Validator::Slug.validate(&Value::from("goo-sons_2"), "slug").is_ok());
        assert_eq!(message(Validator::Slug, Value::from("goo sons"), "slug"), "slug: This value should be a valid slug");
        assert!(Validator::Email.validate(&Value::from("goo@sons.com"), "email").is_ok());
        assert!(Validator::Email.validate(&Value::from("goo@sons"), "email").is_err());
        assert!(Validator::Email.validate(&Value::from("goo@@sons.com"), "email").is_err());
    }

    #[test]
    fn test_custom_validator() {
        let validator = Validator::custom(|value, field| match value.as_str() {
            Some(s) if s.starts_with('x') => Err(ValidationError::new(field, format!("{field}: no x"))),
            _ => Ok(()),
        });
        assert_eq!(message(validator.clone(), Value::from("xylophone"), "name"), "name: no x");
        assert!(validator.validate(&Value::from("piano"), "name").is_ok());
    }
}
