//! Storage backend abstraction for the document mapper.
//!
//! This module defines the capability interface every storage variant
//! implements. A backend owns the physical record layout and the maintenance of
//! its secondary indexes; the document model and query engine only ever talk to
//! it through [`StoreBackend`] (or its object-safe mirror [`DynStoreBackend`]).
//!
//! # Overview
//!
//! | Operation | Contract |
//! |---|---|
//! | [`create_id`](StoreBackend::create_id) | mint a new fully-qualified id, using the backend's [`IdStrategy`] |
//! | [`save`](StoreBackend::save) | upsert the record, drop `stale` index entries, add entries for its current indexed values |
//! | [`get`](StoreBackend::get) | fetch one record or fail with `DocumentNotFound` |
//! | [`delete`](StoreBackend::delete) | remove the record, its all-ids membership and every index entry it owns |
//! | [`all`](StoreBackend::all) | lazily enumerate the collection in backend-native order |
//! | [`evaluate`](StoreBackend::evaluate) | lazily resolve a conjunction of index keys to the exact matching records |
//! | [`flush`](StoreBackend::flush) | drop everything this backend wrote |
//! | [`ensure_indexes`](StoreBackend::ensure_indexes) | provision native secondary indexes, where the store has them |
//!
//! `all` and `evaluate` return streams that perform no I/O until polled.
//! Backends whose store paginates listings hide the continuation tokens behind
//! those streams.
//!
//! # Examples
//!
//! ```ignore
//! use kevlayer::backend::StoreBackend;
//! use futures::TryStreamExt;
//!
//! let key = backend.index_key(schema, "city", &"Durham".into());
//! let records: Vec<_> = backend.evaluate(schema, vec![key]).try_collect().await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use async_trait::async_trait;
use bson::Bson;
use futures::stream::BoxStream;
use std::{any::Any, fmt::Debug};

use crate::{
    error::DocumentStoreResult,
    identity::{self, IdStrategy},
    page::Pagination,
    schema::Schema,
    value::render_storage,
};

/// A stored record: storage-shaped field values plus the reserved `_id` and
/// `_doc_type` keys.
pub type Record = bson::Document;

/// Reserved record key holding the fully-qualified id.
pub const ID_FIELD: &str = "_id";
/// Reserved record key holding the logical type tag.
pub const DOC_TYPE_FIELD: &str = "_doc_type";

/// One `(property, value)` lookup, already formatted for a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexKey {
    /// The indexed property name.
    pub property: String,
    /// The storage-shaped value.
    pub value: Bson,
    /// `{backend}:{collection}:indexes:{property}:{value}`.
    pub key: String,
    /// Set for glob lookups (`*`, `?`). Every other key matches literally,
    /// whatever characters its value holds.
    pub wildcard: bool,
}

impl IndexKey {
    /// Turns this key into a glob pattern lookup.
    pub fn into_pattern(mut self) -> Self {
        self.wildcard = true;
        self
    }

    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }
}

/// Abstract interface for document storage backends.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`. Safety of concurrent use is deferred
/// to the wrapped store client.
///
/// # Error Handling
///
/// Operations return [`DocumentStoreResult<T>`](crate::error::DocumentStoreResult).
/// Nothing is retried; a partial failure between a record write and its index
/// writes is not detected or repaired.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// The backend id embedded in every key this backend writes.
    fn backend_id(&self) -> &str;

    fn id_strategy(&self) -> IdStrategy;

    /// Whether index values keep their case. Stores keyed by partition value
    /// need exact keys.
    fn preserves_index_case(&self) -> bool {
        false
    }

    /// Formats a fully-qualified id from a short or fully-qualified one.
    fn doc_id(&self, schema: &Schema, id: &str) -> String {
        identity::doc_id(self.id_strategy(), self.backend_id(), schema.collection(), id)
    }

    /// Extracts the short id (`pk`) from a fully-qualified one.
    fn parse_id<'i>(&self, doc_id: &'i str) -> &'i str {
        identity::parse_id(self.id_strategy(), doc_id)
    }

    fn index_key(&self, schema: &Schema, property: &str, value: &Bson) -> IndexKey {
        IndexKey {
            property: property.to_string(),
            value: value.clone(),
            key: identity::index_key(
                self.backend_id(),
                schema.collection(),
                property,
                &render_storage(value),
                self.preserves_index_case(),
            ),
            wildcard: false,
        }
    }

    /// Index keys owned by a prepared record. Null values are never indexed.
    fn index_keys(&self, schema: &Schema, record: &Record) -> Vec<IndexKey> {
        schema
            .indexed()
            .filter_map(|(name, _)| match record.get(name) {
                None | Some(Bson::Null) => None,
                Some(value) => Some(self.index_key(schema, name, value)),
            })
            .collect()
    }

    /// Mints a new fully-qualified id for a record that has none.
    async fn create_id(&self, schema: &Schema, record: &Record) -> DocumentStoreResult<String>;

    /// Upserts a prepared record and reconciles its index entries.
    ///
    /// `stale` names index keys the record no longer owns. They are removed
    /// before entries for the record's current values are added.
    async fn save(&self, schema: &Schema, record: &Record, stale: &[String]) -> DocumentStoreResult<()>;

    /// Fetches a record by fully-qualified id.
    async fn get(&self, schema: &Schema, doc_id: &str) -> DocumentStoreResult<Record>;

    /// Removes a record, its all-ids membership and the given index entries.
    async fn delete(&self, schema: &Schema, doc_id: &str, indexes: &[String]) -> DocumentStoreResult<()>;

    /// Lazily enumerates the collection.
    fn all<'a>(&'a self, schema: &'a Schema, pagination: Pagination) -> BoxStream<'a, DocumentStoreResult<Record>>;

    /// Lazily resolves a conjunction of index lookups.
    fn evaluate<'a>(&'a self, schema: &'a Schema, filters: Vec<IndexKey>) -> BoxStream<'a, DocumentStoreResult<Record>>;

    /// Removes every key this backend wrote.
    async fn flush(&self) -> DocumentStoreResult<()>;

    /// Provisions whatever native index structures the schema's indexed
    /// properties need. Backends that maintain their own index entries have
    /// nothing to provision.
    async fn ensure_indexes(&self, _schema: &Schema) -> DocumentStoreResult<()> {
        Ok(())
    }

    /// Cleanly shuts down the backend, releasing all resources.
    ///
    /// The default implementation is a no-op.
    async fn shutdown(self) -> DocumentStoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

/// Object-safe mirror of [`StoreBackend`], implemented for every backend.
#[async_trait]
pub trait DynStoreBackend: Send + Sync + Debug {
    fn backend_id(&self) -> &str;
    fn id_strategy(&self) -> IdStrategy;
    fn preserves_index_case(&self) -> bool;
    fn doc_id(&self, schema: &Schema, id: &str) -> String;
    fn parse_id<'i>(&self, doc_id: &'i str) -> &'i str;
    fn index_key(&self, schema: &Schema, property: &str, value: &Bson) -> IndexKey;
    fn index_keys(&self, schema: &Schema, record: &Record) -> Vec<IndexKey>;
    async fn create_id(&self, schema: &Schema, record: &Record) -> DocumentStoreResult<String>;
    async fn save(&self, schema: &Schema, record: &Record, stale: &[String]) -> DocumentStoreResult<()>;
    async fn get(&self, schema: &Schema, doc_id: &str) -> DocumentStoreResult<Record>;
    async fn delete(&self, schema: &Schema, doc_id: &str, indexes: &[String]) -> DocumentStoreResult<()>;
    fn all<'a>(&'a self, schema: &'a Schema, pagination: Pagination) -> BoxStream<'a, DocumentStoreResult<Record>>;
    fn evaluate<'a>(&'a self, schema: &'a Schema, filters: Vec<IndexKey>) -> BoxStream<'a, DocumentStoreResult<Record>>;
    async fn flush(&self) -> DocumentStoreResult<()>;
    async fn ensure_indexes(&self, schema: &Schema) -> DocumentStoreResult<()>;
    async fn shutdown_boxed(self: Box<Self>) -> DocumentStoreResult<()>;

    fn as_any(&self) -> &dyn Any;
}

#[async_trait]
impl<B: StoreBackend + 'static> DynStoreBackend for B {
    fn backend_id(&self) -> &str {
        StoreBackend::backend_id(self)
    }

    fn id_strategy(&self) -> IdStrategy {
        StoreBackend::id_strategy(self)
    }

    fn preserves_index_case(&self) -> bool {
        StoreBackend::preserves_index_case(self)
    }

    fn doc_id(&self, schema: &Schema, id: &str) -> String {
        StoreBackend::doc_id(self, schema, id)
    }

    fn parse_id<'i>(&self, doc_id: &'i str) -> &'i str {
        StoreBackend::parse_id(self, doc_id)
    }

    fn index_key(&self, schema: &Schema, property: &str, value: &Bson) -> IndexKey {
        StoreBackend::index_key(self, schema, property, value)
    }

    fn index_keys(&self, schema: &Schema, record: &Record) -> Vec<IndexKey> {
        StoreBackend::index_keys(self, schema, record)
    }

    async fn create_id(&self, schema: &Schema, record: &Record) -> DocumentStoreResult<String> {
        StoreBackend::create_id(self, schema, record).await
    }

    async fn save(&self, schema: &Schema, record: &Record, stale: &[String]) -> DocumentStoreResult<()> {
        StoreBackend::save(self, schema, record, stale).await
    }

    async fn get(&self, schema: &Schema, doc_id: &str) -> DocumentStoreResult<Record> {
        StoreBackend::get(self, schema, doc_id).await
    }

    async fn delete(&self, schema: &Schema, doc_id: &str, indexes: &[String]) -> DocumentStoreResult<()> {
        StoreBackend::delete(self, schema, doc_id, indexes).await
    }

    fn all<'a>(&'a self, schema: &'a Schema, pagination: Pagination) -> BoxStream<'a, DocumentStoreResult<Record>> {
        StoreBackend::all(self, schema, pagination)
    }

    fn evaluate<'a>(&'a self, schema: &'a Schema, filters: Vec<IndexKey>) -> BoxStream<'a, DocumentStoreResult<Record>> {
        StoreBackend::evaluate(self, schema, filters)
    }

    async fn flush(&self) -> DocumentStoreResult<()> {
        StoreBackend::flush(self).await
    }

    async fn ensure_indexes(&self, schema: &Schema) -> DocumentStoreResult<()> {
        StoreBackend::ensure_indexes(self, schema).await
    }

    async fn shutdown_boxed(self: Box<Self>) -> DocumentStoreResult<()> {
        StoreBackend::shutdown(*self).await
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Factory trait for creating backend instances.
#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_patterns_are_wildcards() {
        let key = |value: &str| IndexKey {
            property: "city".into(),
            value: Bson::String(value.into()),
            key: format!("redis:company:indexes:city:{}", value.to_lowercase()),
            wildcard: false,
        };
        assert!(!key("Who?").is_wildcard());
        assert!(!key("Goo*").is_wildcard());
        assert!(key("Dur*").into_pattern().is_wildcard());
    }
}
