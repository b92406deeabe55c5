//! Lazy, chainable queries over a document collection.
//!
//! A [`QuerySet`] is an immutable constraint set (`field -> values`), an ordered
//! list of [`SortParam`]s and an optional [`Pagination`] window. Chaining with
//! [`filter`](QuerySet::filter), [`sort_by`](QuerySet::sort_by) or
//! [`all`](QuerySet::all) returns a new query; nothing touches the backend
//! until one of the async accessors ([`fetch`](QuerySet::fetch),
//! [`len`](QuerySet::len), [`first`](QuerySet::first), ...) is awaited. The
//! first evaluation caches its results for the lifetime of that query.
//!
//! # Example
//!
//! ```ignore
//! use kevlayer::prelude::*;
//!
//! let mut durham = companies
//!     .objects()
//!     .filter([("city", "Durham")])
//!     .sort_by("name", false);
//!
//! for company in durham.fetch().await? {
//!     println!("{:?}", company.get(Company::name)?);
//! }
//! ```

use bson::Bson;
use futures::TryStreamExt;
use std::{cmp::Ordering, fmt};
use tracing::debug;

use crate::{
    backend::{DynStoreBackend, IndexKey, Record},
    document::{Document, DocumentType},
    error::{DocumentStoreError, DocumentStoreResult},
    page::Pagination,
    schema::Schema,
    value::Value,
};

/// One sort directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortParam {
    pub key: String,
    pub reverse: bool,
}

impl SortParam {
    pub fn new(key: impl Into<String>, reverse: bool) -> Self {
        Self {
            key: key.into(),
            reverse,
        }
    }
}

/// Ordered field constraints. A field constrained more than once holds every
/// value it was given.
pub type Constraints = Vec<(String, Vec<Bson>)>;

/// Merges `child` into `parent`. A key present in both gets the child's values
/// appended to the parent's list instead of replacing it.
pub fn merge_constraints(parent: &Constraints, child: Constraints) -> Constraints {
    let mut merged = parent.clone();
    for (key, values) in child {
        match merged
            .iter_mut()
            .find(|(existing, _)| *existing == key)
        {
            Some((_, existing)) => existing.extend(values),
            None => merged.push((key, values)),
        }
    }
    merged
}

/// Sorts rows by their precomputed sort keys.
///
/// Directives that all share one direction sort once on the key tuple. Mixed
/// directions sort stably once per directive, last directive first.
fn sort_rows<T>(rows: &mut [(Vec<Value>, T)], params: &[SortParam]) {
    let compare_at = |a: &[Value], b: &[Value], index: usize| a[index].sort_cmp(&b[index]);

    let uniform = params
        .first()
        .map(|first| params.iter().all(|param| param.reverse == first.reverse));

    match uniform {
        None => {}
        Some(true) => {
            let reverse = params[0].reverse;
            rows.sort_by(|(a, _), (b, _)| {
                let ordering = (0..params.len())
                    .map(|index| compare_at(a, b, index))
                    .find(|ordering| *ordering != Ordering::Equal)
                    .unwrap_or(Ordering::Equal);
                if reverse { ordering.reverse() } else { ordering }
            });
        }
        Some(false) => {
            for (index, param) in params.iter().enumerate().rev() {
                rows.sort_by(|(a, _), (b, _)| {
                    let ordering = compare_at(a, b, index);
                    if param.reverse { ordering.reverse() } else { ordering }
                });
            }
        }
    }
}

/// A lazily evaluated query over documents of type `D`.
pub struct QuerySet<'a, D: DocumentType> {
    backend: &'a dyn DynStoreBackend,
    constraints: Constraints,
    patterns: Vec<(String, String)>,
    sort: Vec<SortParam>,
    window: Option<(i64, Option<i64>)>,
    cache: Option<Vec<Document<'a, D>>>,
}

impl<'a, D: DocumentType> QuerySet<'a, D> {
    /// An unconstrained query. Evaluating it enumerates the whole collection.
    pub fn new(backend: &'a dyn DynStoreBackend) -> Self {
        Self {
            backend,
            constraints: Vec::new(),
            patterns: Vec::new(),
            sort: Vec::new(),
            window: None,
            cache: None,
        }
    }

    fn derive(&self) -> Self {
        Self {
            backend: self.backend,
            constraints: self.constraints.clone(),
            patterns: self.patterns.clone(),
            sort: self.sort.clone(),
            window: self.window,
            cache: None,
        }
    }

    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    /// Glob constraints added through [`matching`](Self::matching).
    pub fn patterns(&self) -> &[(String, String)] {
        &self.patterns
    }

    pub fn sort_params(&self) -> &[SortParam] {
        &self.sort
    }

    pub fn is_evaluated(&self) -> bool {
        self.cache.is_some()
    }

    /// Returns a new query constrained by `field = value` pairs. An array value
    /// constrains the field by each of its elements.
    pub fn filter<I, K, V>(&self, constraints: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Bson>,
    {
        let child = constraints
            .into_iter()
            .map(|(key, value)| {
                let values = match value.into() {
                    Bson::Array(values) => values,
                    value => vec![value],
                };
                (key.into(), values)
            })
            .collect::<Vec<_>>();

        let mut next = self.derive();
        next.constraints = merge_constraints(&self.constraints, child);
        next
    }

    /// Returns a new query constrained by glob patterns (`*`, `?`) on indexed
    /// fields. Values passed to [`filter`](Self::filter) always match
    /// literally; only these are expanded, and only by backends that can scan
    /// their index keys.
    pub fn matching<I, K, V>(&self, patterns: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut next = self.derive();
        next.patterns
            .extend(patterns.into_iter().map(|(key, pattern)| (key.into(), pattern.into())));
        next
    }

    /// Returns a new query with one more sort directive.
    pub fn sort_by(&self, key: impl Into<String>, reverse: bool) -> Self {
        let mut next = self.derive();
        next.sort.push(SortParam::new(key, reverse));
        next
    }

    /// Returns a query over the full collection, ignoring field constraints.
    ///
    /// A negative `skip` or a non-positive `limit` fails on evaluation, before
    /// any backend call.
    pub fn all(&self, skip: i64, limit: Option<i64>) -> Self {
        let mut next = self.derive();
        next.constraints.clear();
        next.patterns.clear();
        next.window = Some((skip, limit));
        next
    }

    /// Evaluates a filtered query that must match exactly one document.
    pub async fn get<I, K, V>(&self, constraints: I) -> DocumentStoreResult<Document<'a, D>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Bson>,
    {
        let mut query = self.filter(constraints);
        let mut results = query.take_results().await?;

        match results.len() {
            0 => Err(DocumentStoreError::Query("This query did not return a result.".into())),
            1 => Ok(results.remove(0)),
            n => Err(DocumentStoreError::Query(format!(
                "This query should return exactly one result. Your query returned {n}"
            ))),
        }
    }

    /// Evaluates the query if needed and returns the cached results.
    pub async fn fetch(&mut self) -> DocumentStoreResult<&[Document<'a, D>]> {
        if self.cache.is_none() {
            let results = self.evaluate().await?;
            self.cache = Some(results);
        }
        Ok(self.cache.as_deref().unwrap_or_default())
    }

    pub async fn len(&mut self) -> DocumentStoreResult<usize> {
        Ok(self.fetch().await?.len())
    }

    pub async fn is_empty(&mut self) -> DocumentStoreResult<bool> {
        Ok(self.fetch().await?.is_empty())
    }

    pub async fn count(&mut self) -> DocumentStoreResult<usize> {
        self.len().await
    }

    pub async fn first(&mut self) -> DocumentStoreResult<Option<&Document<'a, D>>> {
        Ok(self.fetch().await?.first())
    }

    pub async fn nth(&mut self, index: usize) -> DocumentStoreResult<Option<&Document<'a, D>>> {
        Ok(self.fetch().await?.get(index))
    }

    /// Consumes the query, returning its documents.
    pub async fn into_vec(mut self) -> DocumentStoreResult<Vec<Document<'a, D>>> {
        self.take_results().await
    }

    async fn take_results(&mut self) -> DocumentStoreResult<Vec<Document<'a, D>>> {
        match self.cache.take() {
            Some(results) => Ok(results),
            None => self.evaluate().await,
        }
    }

    /// Compiles the constraints into index keys, resolving declared property
    /// values to their storage shape. Fails before any I/O on an unknown sort
    /// field or a field constrained to several distinct values.
    fn compile(&self, schema: &Schema) -> DocumentStoreResult<Vec<IndexKey>> {
        for param in &self.sort {
            if !schema.has_field(&param.key) {
                return Err(DocumentStoreError::Query(format!(
                    "Field '{}' doesn't exist in a document",
                    param.key
                )));
            }
        }

        let mut keys = Vec::with_capacity(self.constraints.len());
        for (field, values) in &self.constraints {
            let mut distinct: Vec<Bson> = Vec::new();
            for value in values {
                let stored = match schema.property(field) {
                    Some(prop) => prop.to_storage(&prop.to_native(value)?)?,
                    None => value.clone(),
                };
                if !distinct.contains(&stored) {
                    distinct.push(stored);
                }
            }

            match distinct.as_slice() {
                [value] => keys.push(self.backend.index_key(schema, field, value)),
                [] => {
                    return Err(DocumentStoreError::Usage(format!("Field '{field}' was filtered without a value")));
                }
                _ => {
                    return Err(DocumentStoreError::Usage(format!(
                        "Field '{field}' was filtered by {} different values; a conjunction over one field cannot match",
                        distinct.len()
                    )));
                }
            }
        }

        for (field, pattern) in &self.patterns {
            keys.push(
                self.backend
                    .index_key(schema, field, &Bson::String(pattern.clone()))
                    .into_pattern(),
            );
        }

        Ok(keys)
    }

    async fn evaluate(&self) -> DocumentStoreResult<Vec<Document<'a, D>>> {
        let schema = D::schema();
        let keys = self.compile(schema)?;
        let window = self
            .window
            .map(|(skip, limit)| Pagination::new(skip, limit))
            .transpose()?;

        debug!(
            collection = schema.collection(),
            filters = keys.len(),
            sorted = !self.sort.is_empty(),
            "evaluating query"
        );

        // An unsorted enumeration hands its window to the backend; every other
        // shape windows the final list.
        let pushed = keys.is_empty() && self.sort.is_empty();
        let records: Vec<Record> = if keys.is_empty() {
            let backend_window = match window {
                Some(window) if pushed => window,
                _ => Pagination::unbounded(),
            };
            self.backend
                .all(schema, backend_window)
                .try_collect()
                .await?
        } else {
            self.backend
                .evaluate(schema, keys)
                .try_collect()
                .await?
        };

        let mut documents: Vec<Document<'a, D>> = records
            .into_iter()
            .map(|record| Document::from_record(self.backend, record))
            .collect();

        if !self.sort.is_empty() {
            let mut rows: Vec<(Vec<Value>, Document<'a, D>)> = documents
                .into_iter()
                .map(|document| {
                    let keys = self
                        .sort
                        .iter()
                        .map(|param| {
                            document
                                .value(&param.key)
                                .unwrap_or(Value::Null)
                        })
                        .collect();
                    (keys, document)
                })
                .collect();
            sort_rows(&mut rows, &self.sort);

            documents = rows
                .into_iter()
                .map(|(_, document)| document)
                .collect();
        }

        Ok(match window {
            Some(window) if !pushed => window.apply(documents),
            _ => documents,
        })
    }
}

impl<D: DocumentType> fmt::Debug for QuerySet<'_, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySet")
            .field("type", &D::schema().type_name())
            .field("constraints", &self.constraints)
            .field("patterns", &self.patterns)
            .field("sort", &self.sort)
            .field("window", &self.window)
            .field("evaluated", &self.cache.is_some())
            .finish()
    }
}
