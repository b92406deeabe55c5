//! Hybrid backend: record blobs in an object store, index sets in a hash store.
//!
//! | Store | Key | Holds |
//! |---|---|---|
//! | object | `{backend}:{collection}:id:{n}` | the record as JSON |
//! | hash | `{backend}:{collection}:id._pk` | last issued `n` |
//! | hash | `{backend}:{collection}:all` | every record id |
//! | hash | `{backend}:{collection}:indexes:{property}:{value}` | ids holding that value |
//!
//! The blob is written first, then the all-ids set and every index set change
//! in one pipeline. Lookups resolve ids exactly like the set-index backend and
//! then load each blob.

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
use kevlayer_hash::{HashClient, HashCommand, SetIndexBackend, SetIndexBackendBuilder};
use kevlayer_object::ObjectClient;

/// The backend id used when none is configured.
pub const DEFAULT_BACKEND_ID: &str = "s3redis";

/// Hybrid backend over a [`HashClient`] and an [`ObjectClient`] bucket.
#[derive(Debug, Clone)]
pub struct HybridIndexBackend {
    index: SetIndexBackend,
    objects: Arc<dyn ObjectClient>,
    bucket: String,
}

impl HybridIndexBackend {
    pub fn builder(
        hash: impl HashClient + 'static,
        objects: impl ObjectClient + 'static,
        bucket: impl Into<String>,
    ) -> HybridIndexBackendBuilder {
        HybridIndexBackendBuilder::new(hash, objects, bucket)
    }

    pub fn hash_client(&self) -> &Arc<dyn HashClient> {
        self.index.client()
    }

    pub fn object_client(&self) -> &Arc<dyn ObjectClient> {
        &self.objects
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn all_key(&self, schema: &Schema) -> String {
        identity::all_key(self.backend_id(), schema.collection())
    }

    async fn load(&self, doc_id: &str) -> DocumentStoreResult<Option<Record>> {
        match self.objects.get_object(&self.bucket, doc_id).await? {
            Some(body) => Ok(Some(serde_json::from_slice(&body)?)),
            None => Ok(None),
        }
    }

    /// Loads an indexed id. Ids whose blob is gone are skipped.
    async fn load_member(&self, schema: &Schema, doc_id: String) -> DocumentStoreResult<Option<Record>> {
        let record = self.load(&doc_id).await?;
        if record.is_none() {
            warn!(id = %doc_id, collection = schema.collection(), "skipping index member without a blob");
        }
        Ok(record)
    }

    /// Every object key under `prefix`, across continuation tokens.
    async fn list_all(&self, prefix: &str) -> DocumentStoreResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation = None;
        loop {
            let page = self
                .objects
                .list_objects(&self.bucket, prefix, continuation)
                .await?;
            keys.extend(page.keys);
            match page.next_token {
                Some(token) => continuation = Some(token),
                None => return Ok(keys),
            }
        }
    }
}

#[async_trait]
impl StoreBackend for HybridIndexBackend {
    fn backend_id(&self) -> &str {
        self.index.backend_id()
    }

    fn id_strategy(&self) -> IdStrategy {
        IdStrategy::Counter
    }

    async fn create_id(&self, schema: &Schema, record: &Record) -> DocumentStoreResult<String> {
        self.index.create_id(schema, record).await
    }

    async fn save(&self, schema: &Schema, record: &Record, stale: &[String]) -> DocumentStoreResult<()> {
        let doc_id = record
            .get_str(ID_FIELD)
            .map_err(|_| DocumentStoreError::InvalidDocument("Record has no _id".into()))?
            .to_string();

        debug!(id = %doc_id, "writing record blob");
        self.objects
            .put_object(&self.bucket, &doc_id, serde_json::to_vec(record)?)
            .await?;

        let members = vec![doc_id.clone()];
        let mut commands = vec![HashCommand::SAdd {
            key: self.all_key(schema),
            members: members.clone(),
        }];

        for key in stale {
            trace!(key = %key, id = %doc_id, "removing stale index entry");
            commands.push(HashCommand::SRem {
                key: key.clone(),
                members: members.clone(),
            });
        }

        for index in self.index_keys(schema, record) {
            trace!(key = %index.key, id = %doc_id, "adding index entry");
            commands.push(HashCommand::SAdd {
                key: index.key,
                members: members.clone(),
            });
        }

        debug!(id = %doc_id, commands = commands.len(), "pipelining index update");
        self.hash_client().pipeline(commands).await
    }

    async fn get(&self, schema: &Schema, doc_id: &str) -> DocumentStoreResult<Record> {
        self.load(doc_id)
            .await?
            .ok_or_else(|| DocumentStoreError::DocumentNotFound(doc_id.to_string(), schema.collection().to_string()))
    }

    async fn delete(&self, schema: &Schema, doc_id: &str, indexes: &[String]) -> DocumentStoreResult<()> {
        debug!(id = %doc_id, indexes = indexes.len(), "deleting record blob");
        self.objects.delete_object(&self.bucket, doc_id).await?;

        let members = vec![doc_id.to_string()];
        let mut commands = vec![HashCommand::SRem {
            key: self.all_key(schema),
            members: members.clone(),
        }];
        commands.extend(indexes.iter().map(|key| HashCommand::SRem {
            key: key.clone(),
            members: members.clone(),
        }));

        self.hash_client().pipeline(commands).await
    }

    fn all<'a>(&'a self, schema: &'a Schema, pagination: Pagination) -> BoxStream<'a, DocumentStoreResult<Record>> {
        let key = self.all_key(schema);

        stream::once(async move { self.hash_client().smembers(&key).await })
            .map_ok(move |ids| stream::iter(pagination.apply(ids).into_iter().map(Ok)))
            .try_flatten()
            .try_filter_map(move |id| self.load_member(schema, id))
            .boxed()
    }

    fn evaluate<'a>(&'a self, schema: &'a Schema, filters: Vec<IndexKey>) -> BoxStream<'a, DocumentStoreResult<Record>> {
        stream::once(async move {
            debug!(collection = schema.collection(), filters = filters.len(), "intersecting index sets");
            self.index.matching_ids(schema, &filters).await
        })
        .map_ok(|ids| stream::iter(ids.into_iter().map(Ok)))
        .try_flatten()
        .try_filter_map(move |id| self.load_member(schema, id))
        .boxed()
    }

    /// Clears this backend's keys from both stores.
    async fn flush(&self) -> DocumentStoreResult<()> {
        self.index.flush().await?;

        let blobs = self.list_all(&format!("{}:", self.backend_id())).await?;
        debug!(backend = %self.backend_id(), bucket = %self.bucket, blobs = blobs.len(), "flushing blobs");
        for key in blobs {
            self.objects.delete_object(&self.bucket, &key).await?;
        }
        Ok(())
    }
}

/// Builder for constructing [`HybridIndexBackend`] instances.
pub struct HybridIndexBackendBuilder {
    index: SetIndexBackendBuilder,
    objects: Arc<dyn ObjectClient>,
    bucket: String,
}

impl HybridIndexBackendBuilder {
    pub fn new(hash: impl HashClient + 'static, objects: impl ObjectClient + 'static, bucket: impl Into<String>) -> Self {
        Self {
            index: SetIndexBackend::builder(hash).backend_id(DEFAULT_BACKEND_ID),
            objects: Arc::new(objects),
            bucket: bucket.into(),
        }
    }

    /// Sets the backend id embedded in every key of both stores.
    pub fn backend_id(mut self, backend_id: impl Into<String>) -> Self {
        self.index = self.index.backend_id(backend_id);
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for HybridIndexBackendBuilder {
    type Backend = HybridIndexBackend;

    /// Fails on an invalid backend id or a missing bucket.
    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        let index = self.index.build().await?;

        if !self.objects.bucket_exists(&self.bucket).await? {
            return Err(DocumentStoreError::Resource(format!(
                "Bucket '{}' does not exist",
                self.bucket
            )));
        }

        Ok(HybridIndexBackend {
            index,
            objects: self.objects,
            bucket: self.bucket,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{Bson, doc};
    use kevlayer_core::property::Property;
    use kevlayer_hash::MemoryHashClient;
    use kevlayer_object::MemoryObjectClient;

    fn schema() -> Schema {
        Schema::builder("Company")
            .property("name", Property::char().unique())
            .property("city", Property::char().index())
            .build()
    }

    async fn backend() -> (HybridIndexBackend, MemoryHashClient, MemoryObjectClient) {
        let hash = MemoryHashClient::new();
        let objects = MemoryObjectClient::new().with_page_size(2);
        objects.create_bucket("kev").await;
        let backend = HybridIndexBackend::builder(hash.clone(), objects.clone(), "kev")
            .build()
            .await
            .unwrap();
        (backend, hash, objects)
    }

    async fn put(backend: &HybridIndexBackend, schema: &Schema, name: &str, city: &str) -> String {
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
    async fn test_blob_and_index_sets() {
        let schema = schema();
        let (backend, hash, objects) = backend().await;
        let id = put(&backend, &schema, "Goo and Sons", "Durham").await;

        assert_eq!(id, "s3redis:company:id:1");
        assert!(objects.get_object("kev", &id).await.unwrap().is_some());
        assert!(hash.hgetall(&id).await.unwrap().is_empty());
        assert_eq!(hash.smembers("s3redis:company:all").await.unwrap(), [id.clone()]);
        assert_eq!(
            hash.smembers("s3redis:company:indexes:city:durham").await.unwrap(),
            [id.clone()]
        );
        assert_eq!(backend.get(&schema, &id).await.unwrap().get_str("city").ok(), Some("Durham"));
    }

    #[tokio::test]
    async fn test_evaluate_intersects_and_expands_patterns() {
        let schema = schema();
        let (backend, _, _) = backend().await;
        put(&backend, &schema, "Goo and Sons", "Durham").await;
        put(&backend, &schema, "Lakewood", "Durham").await;
        put(&backend, &schema, "Great Mountain", "Dur*").await;

        let both = vec![
            backend.index_key(&schema, "city", &Bson::from("Durham")),
            backend.index_key(&schema, "name", &Bson::from("Lakewood")),
        ];
        let found: Vec<Record> = backend.evaluate(&schema, both).try_collect().await.unwrap();
        assert_eq!(names(&found), ["Lakewood"]);

        let literal = vec![backend.index_key(&schema, "city", &Bson::from("Dur*"))];
        let found: Vec<Record> = backend.evaluate(&schema, literal).try_collect().await.unwrap();
        assert_eq!(names(&found), ["Great Mountain"]);

        let pattern = vec![backend.index_key(&schema, "city", &Bson::from("Dur*")).into_pattern()];
        let found: Vec<Record> = backend.evaluate(&schema, pattern).try_collect().await.unwrap();
        assert_eq!(names(&found), ["Goo and Sons", "Great Mountain", "Lakewood"]);
    }

    #[tokio::test]
    async fn test_stale_entries_delete_and_flush() {
        let schema = schema();
        let (backend, hash, objects) = backend().await;
        let id = put(&backend, &schema, "Goo and Sons", "Durham").await;
        put(&backend, &schema, "Great Mountain", "Charlotte").await;
        put(&backend, &schema, "Lakewood", "Charlotte").await;

        let old = backend.index_key(&schema, "city", &Bson::from("Durham"));
        let record = doc! { "name": "Goo and Sons", "city": "Charlotte", ID_FIELD: id.as_str() };
        backend.save(&schema, &record, &[old.key.clone()]).await.unwrap();
        assert!(hash.smembers(&old.key).await.unwrap().is_empty());

        let window: Vec<Record> = backend
            .all(&schema, Pagination::new(1, Some(1)).unwrap())
            .try_collect()
            .await
            .unwrap();
        assert_eq!(window.len(), 1);

        let owned: Vec<String> = backend
            .index_keys(&schema, &record)
            .into_iter()
            .map(|k| k.key)
            .collect();
        backend.delete(&schema, &id, &owned).await.unwrap();
        assert!(matches!(
            backend.get(&schema, &id).await,
            Err(DocumentStoreError::DocumentNotFound(..))
        ));
        assert_eq!(hash.smembers("s3redis:company:all").await.unwrap().len(), 2);

        objects.put_object("kev", "other:key", Vec::new()).await.unwrap();
        backend.flush().await.unwrap();
        assert_eq!(hash.key_count().await, 0);
        assert_eq!(objects.object_count("kev").await, 1);
    }

    #[tokio::test]
    async fn test_builder_validation() {
        let missing = HybridIndexBackend::builder(MemoryHashClient::new(), MemoryObjectClient::new(), "nope")
            .build()
            .await;
        assert!(matches!(missing, Err(DocumentStoreError::Resource(_))));

        let objects = MemoryObjectClient::new();
        objects.create_bucket("kev").await;
        let invalid = HybridIndexBackend::builder(MemoryHashClient::new(), objects, "kev")
            .backend_id("a:b")
            .build()
            .await;
        assert!(matches!(invalid, Err(DocumentStoreError::Initialization(_))));
    }
}
