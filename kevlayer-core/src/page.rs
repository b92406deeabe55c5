//! Pagination parameters for full-collection enumeration.

use serde::{Deserialize, Serialize};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// A validated `skip`/`limit` window.
///
/// Built through [`Pagination::new`], which rejects a negative `skip` or a
/// non-positive `limit` before any backend is touched.
///
/// ```ignore
/// use kevlayer::page::Pagination;
///
/// let window = Pagination::new(2, Some(10))?;
/// assert_eq!(window.apply((0..20).collect::<Vec<_>>()), (2..12).collect::<Vec<_>>());
/// assert!(Pagination::new(-1, None).is_err());
/// assert!(Pagination::new(0, Some(0)).is_err());
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pagination {
    /// Number of leading records to skip.
    pub skip: usize,
    /// Maximum number of records to return, unbounded when `None`.
    pub limit: Option<usize>,
}

impl Pagination {
    pub fn new(skip: i64, limit: Option<i64>) -> DocumentStoreResult<Self> {
        let skip = usize::try_from(skip)
            .map_err(|_| DocumentStoreError::Usage(format!("skip must be a non-negative offset, got {skip}")))?;

        let limit = match limit {
            Some(limit) if limit <= 0 => {
                return Err(DocumentStoreError::Usage(format!(
                    "limit must be a positive cap, got {limit}"
                )));
            }
            Some(limit) => Some(usize::try_from(limit).unwrap_or(usize::MAX)),
            None => None,
        };

        Ok(Self { skip, limit })
    }

    /// Everything, from the start.
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn is_unbounded(&self) -> bool {
        self.skip == 0 && self.limit.is_none()
    }

    /// Applies the window to an already materialized list.
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        items
            .into_iter()
            .skip(self.skip)
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_windows() {
        assert!(matches!(Pagination::new(-1, None), Err(DocumentStoreError::Usage(_))));
        assert!(matches!(Pagination::new(0, Some(0)), Err(DocumentStoreError::Usage(_))));
        assert!(matches!(Pagination::new(0, Some(-3)), Err(DocumentStoreError::Usage(_))));
    }

    #[test]
    fn test_apply() {
        let window = Pagination::new(1, Some(2)).unwrap();
        assert_eq!(window.apply(vec!['a', 'b', 'c', 'd']), vec!['b', 'c']);
        assert_eq!(Pagination::new(5, None).unwrap().apply(vec![1, 2]), Vec::<i32>::new());
        assert_eq!(Pagination::unbounded().apply(vec![1, 2]), vec![1, 2]);
    }
}
