//! Post-filters applied by the table store after a key-condition read.
//!
//! Filters are flat conjunctions of attribute equalities; the first filter of a
//! lookup becomes the key condition and the rest land here.

use bson::Bson;
use std::fmt;

use kevlayer_core::backend::Record;

/// A conjunction of `attribute = value` terms.
///
/// ```ignore
/// use kevlayer_table::condition::Condition;
///
/// let filter = Condition::eq("city", "Durham").and(Condition::eq("name", "Goo"));
/// assert_eq!(filter.to_string(), "#city = :v0 AND #name = :v1");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Condition {
    terms: Vec<(String, Bson)>,
}

impl Condition {
    pub fn eq(attribute: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self {
            terms: vec![(attribute.into(), value.into())],
        }
    }

    pub fn and(mut self, other: Condition) -> Self {
        self.terms.extend(other.terms);
        self
    }

    /// Conjunction of every term, `None` when there are none.
    pub fn all(terms: impl IntoIterator<Item = (String, Bson)>) -> Option<Self> {
        let terms: Vec<_> = terms.into_iter().collect();
        (!terms.is_empty()).then_some(Self { terms })
    }

    pub fn terms(&self) -> &[(String, Bson)] {
        &self.terms
    }

    /// Whether the item holds every term. A missing attribute never matches.
    pub fn matches(&self, item: &Record) -> bool {
        self.terms.iter().all(|(attribute, value)| {
            item.get(attribute)
                .is_some_and(|actual| attribute_eq(actual, value))
        })
    }
}

/// Renders as a filter expression with `#name` and `:vN` placeholders.
impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (position, (attribute, _)) in self.terms.iter().enumerate() {
            if position > 0 {
                f.write_str(" AND ")?;
            }
            write!(f, "#{attribute} = :v{position}")?;
        }
        Ok(())
    }
}

fn as_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

/// Attribute equality. Numbers compare by value regardless of width.
pub fn attribute_eq(left: &Bson, right: &Bson) -> bool {
    match (as_number(left), as_number(right)) {
        (Some(left), Some(right)) => left == right,
        _ => left == right,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_matching() {
        let item = doc! { "city": "Durham", "gpa": 3.0, "is_active": 1 };

        assert!(Condition::eq("city", "Durham").matches(&item));
        assert!(!Condition::eq("city", "durham").matches(&item));
        assert!(Condition::eq("gpa", 3_i64).matches(&item));
        assert!(Condition::eq("is_active", 1_i64).matches(&item));
        assert!(!Condition::eq("name", "Goo").matches(&item));
        assert!(
            !Condition::eq("city", "Durham")
                .and(Condition::eq("gpa", 3.1))
                .matches(&item)
        );
    }

    #[test]
    fn test_all_and_rendering() {
        let condition = Condition::all([
            ("city".to_string(), Bson::from("Durham")),
            ("name".to_string(), Bson::from("Goo")),
        ]);
        assert_eq!(condition.as_ref().map(|c| c.terms().len()), Some(2));
        assert_eq!(condition.map(|c| c.to_string()).as_deref(), Some("#city = :v0 AND #name = :v1"));
        assert_eq!(Condition::all([]), None);
    }
}
