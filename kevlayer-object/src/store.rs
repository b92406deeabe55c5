//! Prefix-index backend over an object store.
//!
//! | Object key | Body |
//! |---|---|
//! | `{backend}:{collection}:all/{id}` | the record as JSON |
//! | `{backend}:{collection}:indexes:{property}:{value}/{id}` | empty marker |
//!
//! `/` and `%` inside an index key are percent-encoded, so one value's marker
//! prefix never lists the markers of a longer value (`a/` against `a/b/{id}`).
//!
//! Ids are content-derived (`{hash}:id:{backend}:{collection}`) since object
//! stores have no atomic counter. Writes are issued one object at a time with
//! no rollback.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::{debug, trace, warn};

use kevlayer_core::{
    backend::{ID_FIELD, IndexKey, Record, StoreBackend, StoreBackendBuilder},
    error::{DocumentStoreError, DocumentStoreResult},
    identity::{self, IdStrategy},
    page::Pagination,
    schema::Schema,
};

use crate::client::ObjectClient;

/// The backend id used when none is configured.
pub const DEFAULT_BACKEND_ID: &str = "s3";

/// Prefix-index backend over an [`ObjectClient`] bucket.
#[derive(Debug, Clone)]
pub struct PrefixIndexBackend {
    client: Arc<dyn ObjectClient>,
    bucket: String,
    backend_id: String,
}

impl PrefixIndexBackend {
    pub fn builder(client: impl ObjectClient + 'static, bucket: impl Into<String>) -> PrefixIndexBackendBuilder {
        PrefixIndexBackendBuilder::new(client, bucket)
    }

    pub fn client(&self) -> &Arc<dyn ObjectClient> {
        &self.client
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn all_prefix(&self, schema: &Schema) -> String {
        format!("{}/", identity::all_key(&self.backend_id, schema.collection()))
    }

    /// The listing prefix of every marker under one index key.
    fn marker_prefix(index: &str) -> String {
        let mut prefix = String::with_capacity(index.len() + 1);
        for c in index.chars() {
            match c {
                '%' => prefix.push_str("%25"),
                '/' => prefix.push_str("%2F"),
                c => prefix.push(c),
            }
        }
        prefix.push('/');
        prefix
    }

    fn marker(index: &str, doc_id: &str) -> String {
        format!("{}{doc_id}", Self::marker_prefix(index))
    }

    /// Lists every key under `prefix`, following continuation tokens lazily.
    fn list_keys<'a>(&'a self, prefix: String) -> BoxStream<'a, DocumentStoreResult<String>> {
        stream::try_unfold(Some(None::<String>), move |state| {
            let prefix = prefix.clone();
            async move {
                let Some(continuation) = state else {
                    return Ok::<_, DocumentStoreError>(None);
                };

                let page = self
                    .client
                    .list_objects(&self.bucket, &prefix, continuation)
                    .await?;
                trace!(prefix = %prefix, keys = page.keys.len(), more = page.next_token.is_some(), "listed page");

                let next = page.next_token.map(Some);
                Ok(Some((stream::iter(page.keys.into_iter().map(Ok)), next)))
            }
        })
        .try_flatten()
        .boxed()
    }

    async fn load(&self, key: &str) -> DocumentStoreResult<Option<Record>> {
        match self.client.get_object(&self.bucket, key).await? {
            Some(body) => Ok(Some(serde_json::from_slice(&body)?)),
            None => Ok(None),
        }
    }

    /// Loads a listed record. Keys removed since the listing are skipped.
    async fn load_listed(&self, schema: &Schema, key: String) -> DocumentStoreResult<Option<Record>> {
        let record = self.load(&key).await?;
        if record.is_none() {
            warn!(key = %key, collection = schema.collection(), "skipping listed key without a record");
        }
        Ok(record)
    }

    fn usage_error<'a>(message: String) -> BoxStream<'a, DocumentStoreResult<Record>> {
        stream::once(async move { Err(DocumentStoreError::Usage(message)) }).boxed()
    }
}

#[async_trait]
impl StoreBackend for PrefixIndexBackend {
    fn backend_id(&self) -> &str {
        &self.backend_id
    }

    fn id_strategy(&self) -> IdStrategy {
        IdStrategy::Content
    }

    async fn create_id(&self, schema: &Schema, record: &Record) -> DocumentStoreResult<String> {
        let hash = identity::content_hash(record)?;
        Ok(identity::content_id(&self.backend_id, schema.collection(), &hash))
    }

    async fn save(&self, schema: &Schema, record: &Record, stale: &[String]) -> DocumentStoreResult<()> {
        let doc_id = record
            .get_str(ID_FIELD)
            .map_err(|_| DocumentStoreError::InvalidDocument("Record has no _id".into()))?;

        debug!(id = %doc_id, stale = stale.len(), "writing record blob");
        self.client
            .put_object(
                &self.bucket,
                &format!("{}{doc_id}", self.all_prefix(schema)),
                serde_json::to_vec(record)?,
            )
            .await?;

        for key in stale {
            trace!(key = %key, id = %doc_id, "removing stale index marker");
            self.client
                .delete_object(&self.bucket, &Self::marker(key, doc_id))
                .await?;
        }

        for index in self.index_keys(schema, record) {
            trace!(key = %index.key, id = %doc_id, "writing index marker");
            self.client
                .put_object(&self.bucket, &Self::marker(&index.key, doc_id), Vec::new())
                .await?;
        }

        Ok(())
    }

    async fn get(&self, schema: &Schema, doc_id: &str) -> DocumentStoreResult<Record> {
        self.load(&format!("{}{doc_id}", self.all_prefix(schema)))
            .await?
            .ok_or_else(|| DocumentStoreError::DocumentNotFound(doc_id.to_string(), schema.collection().to_string()))
    }

    async fn delete(&self, schema: &Schema, doc_id: &str, indexes: &[String]) -> DocumentStoreResult<()> {
        debug!(id = %doc_id, indexes = indexes.len(), "deleting record blob");
        self.client
            .delete_object(&self.bucket, &format!("{}{doc_id}", self.all_prefix(schema)))
            .await?;

        for key in indexes {
            trace!(key = %key, id = %doc_id, "removing index marker");
            self.client
                .delete_object(&self.bucket, &Self::marker(key, doc_id))
                .await?;
        }

        Ok(())
    }

    fn all<'a>(&'a self, schema: &'a Schema, pagination: Pagination) -> BoxStream<'a, DocumentStoreResult<Record>> {
        self.list_keys(self.all_prefix(schema))
            .skip(pagination.skip)
            .take(pagination.limit.unwrap_or(usize::MAX))
            .try_filter_map(move |key| self.load_listed(schema, key))
            .boxed()
    }

    fn evaluate<'a>(&'a self, schema: &'a Schema, filters: Vec<IndexKey>) -> BoxStream<'a, DocumentStoreResult<Record>> {
        let filter = match filters.as_slice() {
            [] => return self.all(schema, Pagination::unbounded()),
            [filter] if filter.is_wildcard() => {
                return Self::usage_error(format!(
                    "Wildcard lookups are not supported by the {} backend",
                    self.backend_id
                ));
            }
            [filter] => filter,
            _ => {
                return Self::usage_error(format!(
                    "There should only be one filter for {} backends, got {}",
                    self.backend_id,
                    filters.len()
                ));
            }
        };

        debug!(collection = schema.collection(), key = %filter.key, "listing index markers");
        let all_prefix = self.all_prefix(schema);

        self.list_keys(Self::marker_prefix(&filter.key))
            .map_ok(move |marker| {
                let doc_id = marker
                    .rsplit_once('/')
                    .map_or(marker.as_str(), |(_, id)| id);
                format!("{all_prefix}{doc_id}")
            })
            .try_filter_map(move |key| self.load_listed(schema, key))
            .boxed()
    }

    async fn flush(&self) -> DocumentStoreResult<()> {
        let keys: Vec<String> = self
            .list_keys(format!("{}:", self.backend_id))
            .try_collect()
            .await?;

        debug!(backend = %self.backend_id, bucket = %self.bucket, keys = keys.len(), "flushing backend");
        for key in keys {
            self.client.delete_object(&self.bucket, &key).await?;
        }
        Ok(())
    }
}

/// Builder for constructing [`PrefixIndexBackend`] instances.
pub struct PrefixIndexBackendBuilder {
    client: Arc<dyn ObjectClient>,
    bucket: String,
    backend_id: String,
}

impl PrefixIndexBackendBuilder {
    pub fn new(client: impl ObjectClient + 'static, bucket: impl Into<String>) -> Self {
        Self {
            client: Arc::new(client),
            bucket: bucket.into(),
            backend_id: DEFAULT_BACKEND_ID.to_string(),
        }
    }

    pub fn backend_id(mut self, backend_id: impl Into<String>) -> Self {
        self.backend_id = backend_id.into();
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for PrefixIndexBackendBuilder {
    type Backend = PrefixIndexBackend;

    /// Fails with a resource error when the bucket does not exist.
    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        if self.backend_id.is_empty() || self.backend_id.contains(':') {
            return Err(DocumentStoreError::Initialization(format!(
                "Invalid backend id '{}'",
                self.backend_id
            )));
        }

        if !self.client.bucket_exists(&self.bucket).await? {
            return Err(DocumentStoreError::Resource(format!(
                "Bucket '{}' does not exist",
                self.bucket
            )));
        }

        Ok(PrefixIndexBackend {
            client: self.client,
            bucket: self.bucket,
            backend_id: self.backend_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryObjectClient;
    use bson::{Bson, doc};
    use kevlayer_core::property::Property;

    fn schema() -> Schema {
        Schema::builder("Company")
            .property("name", Property::char().unique())
            .property("city", Property::char().index())
            .build()
    }

    async fn backend(page_size: usize) -> (PrefixIndexBackend, MemoryObjectClient) {
        let client = MemoryObjectClient::new().with_page_size(page_size);
        client.create_bucket("kev").await;
        let backend = PrefixIndexBackend::builder(client.clone(), "kev")
            .build()
            .await
            .unwrap();
        (backend, client)
    }

    async fn put(backend: &PrefixIndexBackend, schema: &Schema, name: &str, city: &str) -> String {
        let mut record = doc! { "name": name, "city": city };
        let id = backend.create_id(schema, &record).await.unwrap();
        record.insert(ID_FIELD, id.clone());
        backend.save(schema, &record, &[]).await.unwrap();
        id
    }

    fn names(records: &[Record]) -> Vec<&str> {
        let mut names: Vec<&str> = records
            .iter()
            .filter_map(|r| r.get_str("name").ok())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_content_ids_and_markers() {
        let schema = schema();
        let (backend, client) = backend(10).await;
        let id = put(&backend, &schema, "Goo and Sons", "Durham").await;

        assert!(id.ends_with(":id:s3:company"));
        assert_eq!(StoreBackend::parse_id(&backend, &id).len(), 10);

        let marker = format!("s3:company:indexes:city:durham/{id}");
        assert_eq!(client.get_object("kev", &marker).await.unwrap(), Some(Vec::new()));
        assert_eq!(backend.get(&schema, &id).await.unwrap().get_str("name").ok(), Some("Goo and Sons"));
    }

    #[tokio::test]
    async fn test_listing_follows_continuation_tokens() {
        let schema = schema();
        let (backend, _) = backend(2).await;
        for name in ["Goo and Sons", "Great Mountain", "Lakewoood YMCA", "Acme Rockets", "Zed"] {
            put(&backend, &schema, name, "Durham").await;
        }

        let all: Vec<Record> = backend.all(&schema, Pagination::unbounded()).try_collect().await.unwrap();
        assert_eq!(all.len(), 5);

        let window: Vec<Record> = backend
            .all(&schema, Pagination::new(1, Some(3)).unwrap())
            .try_collect()
            .await
            .unwrap();
        assert_eq!(window.len(), 3);

        let key = backend.index_key(&schema, "city", &Bson::from("Durham"));
        let durham: Vec<Record> = backend.evaluate(&schema, vec![key]).try_collect().await.unwrap();
        assert_eq!(durham.len(), 5);
    }

    #[tokio::test]
    async fn test_single_filter_only() {
        let schema = schema();
        let (backend, _) = backend(10).await;
        put(&backend, &schema, "Goo and Sons", "Durham").await;

        let keys = vec![
            backend.index_key(&schema, "city", &Bson::from("Durham")),
            backend.index_key(&schema, "name", &Bson::from("Goo and Sons")),
        ];
        let result: DocumentStoreResult<Vec<Record>> = backend.evaluate(&schema, keys).try_collect().await;
        assert!(matches!(result, Err(DocumentStoreError::Usage(_))));

        let wildcard = vec![backend.index_key(&schema, "city", &Bson::from("Dur*")).into_pattern()];
        let result: DocumentStoreResult<Vec<Record>> = backend.evaluate(&schema, wildcard).try_collect().await;
        assert!(matches!(result, Err(DocumentStoreError::Usage(_))));
    }

    #[tokio::test]
    async fn test_stale_markers_and_delete() {
        let schema = schema();
        let (backend, client) = backend(10).await;
        let id = put(&backend, &schema, "Goo and Sons", "Durham").await;
        put(&backend, &schema, "Great Mountain", "Charlotte").await;

        let old = backend.index_key(&schema, "city", &Bson::from("Durham"));
        let record = doc! { "name": "Goo and Sons", "city": "Charlotte", ID_FIELD: id.as_str() };
        backend.save(&schema, &record, &[old.key.clone()]).await.unwrap();

        let durham: Vec<Record> = backend.evaluate(&schema, vec![old]).try_collect().await.unwrap();
        assert!(durham.is_empty());

        let charlotte = backend.index_key(&schema, "city", &Bson::from("Charlotte"));
        let found: Vec<Record> = backend.evaluate(&schema, vec![charlotte.clone()]).try_collect().await.unwrap();
        assert_eq!(names(&found), ["Goo and Sons", "Great Mountain"]);

        let owned: Vec<String> = backend
            .index_keys(&schema, &record)
            .into_iter()
            .map(|k| k.key)
            .collect();
        backend.delete(&schema, &id, &owned).await.unwrap();

        let found: Vec<Record> = backend.evaluate(&schema, vec![charlotte]).try_collect().await.unwrap();
        assert_eq!(names(&found), ["Great Mountain"]);
        assert!(matches!(
            backend.get(&schema, &id).await,
            Err(DocumentStoreError::DocumentNotFound(..))
        ));

        backend.flush().await.unwrap();
        assert_eq!(client.object_count("kev").await, 0);
    }

    #[tokio::test]
    async fn test_markers_match_values_exactly() {
        let schema = schema();
        let (backend, client) = backend(10).await;
        let plain = put(&backend, &schema, "Goo and Sons", "a").await;
        let nested = put(&backend, &schema, "Great Mountain", "a/b").await;
        put(&backend, &schema, "Lakewoood YMCA", "a%2Fb").await;

        let marker = format!("s3:company:indexes:city:a%2Fb/{nested}");
        assert_eq!(client.get_object("kev", &marker).await.unwrap(), Some(Vec::new()));

        let a = backend.index_key(&schema, "city", &Bson::from("a"));
        let found: Vec<Record> = backend.evaluate(&schema, vec![a]).try_collect().await.unwrap();
        assert_eq!(names(&found), ["Goo and Sons"]);
        assert_eq!(found[0].get_str(ID_FIELD).ok(), Some(plain.as_str()));

        let nested_key = backend.index_key(&schema, "city", &Bson::from("a/b"));
        let found: Vec<Record> = backend.evaluate(&schema, vec![nested_key]).try_collect().await.unwrap();
        assert_eq!(names(&found), ["Great Mountain"]);

        put(&backend, &schema, "Who?", "Durham?").await;
        let literal = backend.index_key(&schema, "city", &Bson::from("Durham?"));
        let found: Vec<Record> = backend.evaluate(&schema, vec![literal]).try_collect().await.unwrap();
        assert_eq!(names(&found), ["Who?"]);
    }

    #[tokio::test]
    async fn test_builder_requires_bucket() {
        let result = PrefixIndexBackend::builder(MemoryObjectClient::new(), "missing").build().await;
        assert!(matches!(result, Err(DocumentStoreError::Resource(_))));
    }
}
