use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use futures::stream::{self, BoxStream, StreamExt};

use crate::{
    backend::{IndexKey, Record, StoreBackend},
    error::{DocumentStoreError, DocumentStoreResult},
    identity::IdStrategy,
    page::Pagination,
    schema::Schema,
};

/// A backend that stores nothing. Lookups come back empty.
#[derive(Debug)]
pub(crate) struct NullBackend;

#[async_trait]
impl StoreBackend for NullBackend {
    fn backend_id(&self) -> &str {
        "null"
    }

    fn id_strategy(&self) -> IdStrategy {
        IdStrategy::Counter
    }

    async fn create_id(&self, schema: &Schema, _record: &Record) -> DocumentStoreResult<String> {
        Ok(crate::identity::counter_id("null", schema.collection(), 1))
    }

    async fn save(&self, _schema: &Schema, _record: &Record, _stale: &[String]) -> DocumentStoreResult<()> {
        Ok(())
    }

    async fn get(&self, schema: &Schema, doc_id: &str) -> DocumentStoreResult<Record> {
        Err(DocumentStoreError::DocumentNotFound(doc_id.to_string(), schema.collection().to_string()))
    }

    async fn delete(&self, _schema: &Schema, _doc_id: &str, _indexes: &[String]) -> DocumentStoreResult<()> {
        Ok(())
    }

    fn all<'a>(&'a self, _schema: &'a Schema, _pagination: Pagination) -> BoxStream<'a, DocumentStoreResult<Record>> {
        stream::empty().boxed()
    }

    fn evaluate<'a>(&'a self, _schema: &'a Schema, _filters: Vec<IndexKey>) -> BoxStream<'a, DocumentStoreResult<Record>> {
        stream::empty().boxed()
    }

    async fn flush(&self) -> DocumentStoreResult<()> {
        Ok(())
    }
}

/// A read-only backend over a fixed list of records that counts its lookups.
#[derive(Debug, Default)]
pub(crate) struct FixedBackend {
    pub records: Vec<Record>,
    pub lookups: AtomicUsize,
}

impl FixedBackend {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoreBackend for FixedBackend {
    fn backend_id(&self) -> &str {
        "fixed"
    }

    fn id_strategy(&self) -> IdStrategy {
        IdStrategy::Counter
    }

    async fn create_id(&self, schema: &Schema, _record: &Record) -> DocumentStoreResult<String> {
        Ok(crate::identity::counter_id("fixed", schema.collection(), self.records.len() as i64 + 1))
    }

    async fn save(&self, _schema: &Schema, _record: &Record, _stale: &[String]) -> DocumentStoreResult<()> {
        Ok(())
    }

    async fn get(&self, schema: &Schema, doc_id: &str) -> DocumentStoreResult<Record> {
        self.records
            .iter()
            .find(|record| record.get_str("_id").ok() == Some(doc_id))
            .cloned()
            .ok_or_else(|| DocumentStoreError::DocumentNotFound(doc_id.to_string(), schema.collection().to_string()))
    }

    async fn delete(&self, _schema: &Schema, _doc_id: &str, _indexes: &[String]) -> DocumentStoreResult<()> {
        Ok(())
    }

    fn all<'a>(&'a self, _schema: &'a Schema, pagination: Pagination) -> BoxStream<'a, DocumentStoreResult<Record>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        stream::iter(pagination.apply(self.records.clone()).into_iter().map(Ok)).boxed()
    }

    fn evaluate<'a>(&'a self, _schema: &'a Schema, filters: Vec<IndexKey>) -> BoxStream<'a, DocumentStoreResult<Record>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if filters.iter().any(IndexKey::is_wildcard) {
            return stream::once(async { Err(DocumentStoreError::Usage("no pattern lookups".into())) }).boxed();
        }
        let matching: Vec<_> = self
            .records
            .iter()
            .filter(|record| {
                filters
                    .iter()
                    .all(|filter| record.get(&filter.property) == Some(&filter.value))
            })
            .cloned()
            .collect();
        stream::iter(matching.into_iter().map(Ok)).boxed()
    }

    async fn flush(&self) -> DocumentStoreResult<()> {
        Ok(())
    }
}
