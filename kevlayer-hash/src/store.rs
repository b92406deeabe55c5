//! Set-index backend over a hash-table store.
//!
//! Each record is one hash keyed by its fully-qualified id, with every value
//! stored as a string. Each `(property, value)` pair owns one unordered set of
//! record ids, and the collection keeps an all-ids set alongside.
//!
//! | Key | Kind | Holds |
//! |---|---|---|
//! | `{backend}:{collection}:id:{n}` | hash | the record |
//! | `{backend}:{collection}:id._pk` | counter | last issued `n` |
//! | `{backend}:{collection}:all` | set | every record id |
//! | `{backend}:{collection}:indexes:{property}:{value}` | set | ids holding that value |
//!
//! Saves and deletes go out as one pipeline. Lookups intersect index sets.
//! Pattern keys (see [`IndexKey::into_pattern`]) are expanded through a key
//! scan into the union of every matching index set first; all other values
//! match literally, `*` and `?` included.

use async_trait::async_trait;
use bson::Bson;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::{collections::BTreeSet, sync::Arc};
use tracing::{debug, trace, warn};

use kevlayer_core::{
    backend::{ID_FIELD, DOC_TYPE_FIELD, IndexKey, Record, StoreBackend, StoreBackendBuilder},
    error::{DocumentStoreError, DocumentStoreResult},
    identity::{self, IdStrategy},
    page::Pagination,
    schema::Schema,
    value::render_storage,
};

use crate::client::{HashClient, HashCommand};

/// The backend id used when none is configured.
pub const DEFAULT_BACKEND_ID: &str = "redis";

/// Set-index backend over a [`HashClient`].
///
/// Cloning shares the wrapped client.
///
/// # Example
///
/// ```ignore
/// use kevlayer_hash::{MemoryHashClient, SetIndexBackend};
/// use kevlayer::backend::StoreBackendBuilder;
///
/// let backend = SetIndexBackend::builder(MemoryHashClient::new())
///     .backend_id("redis")
///     .build()
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct SetIndexBackend {
    client: Arc<dyn HashClient>,
    backend_id: String,
}

impl SetIndexBackend {
    pub fn new(client: impl HashClient + 'static, backend_id: impl Into<String>) -> Self {
        Self {
            client: Arc::new(client),
            backend_id: backend_id.into(),
        }
    }

    pub fn builder(client: impl HashClient + 'static) -> SetIndexBackendBuilder {
        SetIndexBackendBuilder::new(client)
    }

    pub fn client(&self) -> &Arc<dyn HashClient> {
        &self.client
    }

    fn all_key(&self, schema: &Schema) -> String {
        identity::all_key(&self.backend_id, schema.collection())
    }

    /// Loads one record, rebuilding it in schema order.
    async fn load(&self, schema: &Schema, doc_id: &str) -> DocumentStoreResult<Option<Record>> {
        let mut fields = self.client.hgetall(doc_id).await?;
        if fields.is_empty() {
            return Ok(None);
        }

        let mut record = Record::new();
        for name in schema.field_names() {
            if let Some(value) = fields.remove(name) {
                record.insert(name, value);
            }
        }
        for reserved in [ID_FIELD, DOC_TYPE_FIELD] {
            if let Some(value) = fields.remove(reserved) {
                record.insert(reserved, value);
            }
        }
        for (key, value) in fields {
            record.insert(key, value);
        }

        Ok(Some(record))
    }

    /// Loads a set member. Ids whose hash is gone are skipped.
    async fn load_member(&self, schema: &Schema, doc_id: String) -> DocumentStoreResult<Option<Record>> {
        let record = self.load(schema, &doc_id).await?;
        if record.is_none() {
            warn!(id = %doc_id, collection = schema.collection(), "skipping index member without a record");
        }
        Ok(record)
    }

    /// Resolves the ids matching every filter. No filters means every id in
    /// the collection.
    pub async fn matching_ids(&self, schema: &Schema, filters: &[IndexKey]) -> DocumentStoreResult<Vec<String>> {
        if filters.is_empty() {
            return self.client.smembers(&self.all_key(schema)).await;
        }

        let (wildcards, exact): (Vec<&IndexKey>, Vec<&IndexKey>) = filters
            .iter()
            .partition(|filter| filter.is_wildcard());

        let mut candidates: Option<BTreeSet<String>> = None;

        if !exact.is_empty() {
            let keys: Vec<String> = exact
                .iter()
                .map(|filter| filter.key.clone())
                .collect();
            candidates = Some(self.client.sinter(&keys).await?.into_iter().collect());
        }

        for filter in wildcards {
            let mut union = BTreeSet::new();
            for key in self.client.keys(&filter.key).await? {
                trace!(pattern = %filter.key, key = %key, "expanding wildcard index");
                union.extend(self.client.smembers(&key).await?);
            }
            candidates = Some(match candidates {
                Some(current) => current
                    .intersection(&union)
                    .cloned()
                    .collect(),
                None => union,
            });
        }

        Ok(candidates
            .unwrap_or_default()
            .into_iter()
            .collect())
    }
}

#[async_trait]
impl StoreBackend for SetIndexBackend {
    fn backend_id(&self) -> &str {
        &self.backend_id
    }

    fn id_strategy(&self) -> IdStrategy {
        IdStrategy::Counter
    }

    async fn create_id(&self, schema: &Schema, _record: &Record) -> DocumentStoreResult<String> {
        let counter = self
            .client
            .incr(&identity::counter_key(&self.backend_id, schema.collection()))
            .await?;
        Ok(identity::counter_id(&self.backend_id, schema.collection(), counter))
    }

    async fn save(&self, schema: &Schema, record: &Record, stale: &[String]) -> DocumentStoreResult<()> {
        let doc_id = record
            .get_str(ID_FIELD)
            .map_err(|_| DocumentStoreError::InvalidDocument("Record has no _id".into()))?
            .to_string();
        let members = vec![doc_id.clone()];

        let fields = record
            .iter()
            .filter(|(_, value)| !matches!(value, Bson::Null))
            .map(|(key, value)| (key.clone(), render_storage(value)))
            .collect();

        let mut commands = vec![
            HashCommand::Del { keys: members.clone() },
            HashCommand::HSet {
                key: doc_id.clone(),
                fields,
            },
            HashCommand::SAdd {
                key: self.all_key(schema),
                members: members.clone(),
            },
        ];

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

        debug!(id = %doc_id, commands = commands.len(), "pipelining save");
        self.client.pipeline(commands).await
    }

    async fn get(&self, schema: &Schema, doc_id: &str) -> DocumentStoreResult<Record> {
        self.load(schema, doc_id)
            .await?
            .ok_or_else(|| DocumentStoreError::DocumentNotFound(doc_id.to_string(), schema.collection().to_string()))
    }

    async fn delete(&self, schema: &Schema, doc_id: &str, indexes: &[String]) -> DocumentStoreResult<()> {
        let members = vec![doc_id.to_string()];

        let mut commands = vec![
            HashCommand::Del { keys: members.clone() },
            HashCommand::SRem {
                key: self.all_key(schema),
                members: members.clone(),
            },
        ];
        commands.extend(indexes.iter().map(|key| HashCommand::SRem {
            key: key.clone(),
            members: members.clone(),
        }));

        debug!(id = %doc_id, indexes = indexes.len(), "pipelining delete");
        self.client.pipeline(commands).await
    }

    fn all<'a>(&'a self, schema: &'a Schema, pagination: Pagination) -> BoxStream<'a, DocumentStoreResult<Record>> {
        let key = self.all_key(schema);

        stream::once(async move { self.client.smembers(&key).await })
            .map_ok(move |ids| stream::iter(pagination.apply(ids).into_iter().map(Ok)))
            .try_flatten()
            .try_filter_map(move |id| self.load_member(schema, id))
            .boxed()
    }

    fn evaluate<'a>(&'a self, schema: &'a Schema, filters: Vec<IndexKey>) -> BoxStream<'a, DocumentStoreResult<Record>> {
        stream::once(async move {
            debug!(collection = schema.collection(), filters = filters.len(), "intersecting index sets");
            self.matching_ids(schema, &filters).await
        })
        .map_ok(|ids| stream::iter(ids.into_iter().map(Ok)))
        .try_flatten()
        .try_filter_map(move |id| self.load_member(schema, id))
        .boxed()
    }

    async fn flush(&self) -> DocumentStoreResult<()> {
        let keys = self
            .client
            .keys(&format!("{}:*", self.backend_id))
            .await?;
        debug!(backend = %self.backend_id, keys = keys.len(), "flushing backend");
        self.client.del(&keys).await?;
        Ok(())
    }
}

/// Builder for constructing [`SetIndexBackend`] instances.
pub struct SetIndexBackendBuilder {
    client: Arc<dyn HashClient>,
    backend_id: String,
}

impl SetIndexBackendBuilder {
    pub fn new(client: impl HashClient + 'static) -> Self {
        Self {
            client: Arc::new(client),
            backend_id: DEFAULT_BACKEND_ID.to_string(),
        }
    }

    /// Sets the backend id embedded in every key.
    pub fn backend_id(mut self, backend_id: impl Into<String>) -> Self {
        self.backend_id = backend_id.into();
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for SetIndexBackendBuilder {
    type Backend = SetIndexBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        if self.backend_id.is_empty() || self.backend_id.contains(':') {
            return Err(DocumentStoreError::Initialization(format!(
                "Invalid backend id '{}'",
                self.backend_id
            )));
        }

        Ok(SetIndexBackend {
            client: self.client,
            backend_id: self.backend_id,
        })
    }
}
