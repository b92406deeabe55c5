//! Native-index backend over a partitioned table store.
//!
//! Every document type bound to the backend shares one table keyed by `_id`.
//! Indexed properties are served by the table's own secondary indexes, one per
//! property, named `{property}-index` unless the property sets a custom index
//! name. [`StoreBackend::ensure_indexes`] provisions them.
//!
//! A lookup reads the first filter's index with a key condition and applies the
//! remaining filters as a post-filter expression. Independent indexes are never
//! intersected. The store maintains its indexes itself, so the stale key list
//! handed to [`save`](StoreBackend::save) is ignored.

use async_trait::async_trait;
use futures::{
    future,
    stream::{self, BoxStream, StreamExt, TryStreamExt},
};
use std::{future::Future, sync::Arc};
use tracing::{debug, trace};

use kevlayer_core::{
    backend::{ID_FIELD, IndexKey, Record, StoreBackend, StoreBackendBuilder},
    error::{DocumentStoreError, DocumentStoreResult},
    identity::{self, IdStrategy},
    page::Pagination,
    schema::Schema,
};

use crate::{
    client::{ItemPage, KeyCondition, QueryRequest, SecondaryIndex, TableClient, TableDescription},
    condition::Condition,
};

/// The backend id used when none is configured.
pub const DEFAULT_BACKEND_ID: &str = "dynamodb";

/// Native-index backend over a [`TableClient`] table.
#[derive(Debug, Clone)]
pub struct NativeIndexBackend {
    client: Arc<dyn TableClient>,
    table: String,
    backend_id: String,
}

/// Flattens paginated reads into one lazy stream of items.
fn paginate<'a, F, Fut>(mut fetch: F) -> BoxStream<'a, DocumentStoreResult<Record>>
where
    F: FnMut(Option<String>) -> Fut + Send + 'a,
    Fut: Future<Output = DocumentStoreResult<ItemPage>> + Send + 'a,
{
    stream::try_unfold(Some(None::<String>), move |state| {
        let page = state.map(&mut fetch);
        async move {
            let Some(page) = page else {
                return Ok::<_, DocumentStoreError>(None);
            };
            let page = page.await?;
            trace!(items = page.items.len(), more = page.last_key.is_some(), "read page");

            let next = page.last_key.map(Some);
            Ok(Some((stream::iter(page.items.into_iter().map(Ok)), next)))
        }
    })
    .try_flatten()
    .boxed()
}

impl NativeIndexBackend {
    pub fn builder(client: impl TableClient + 'static, table: impl Into<String>) -> NativeIndexBackendBuilder {
        NativeIndexBackendBuilder::new(client, table)
    }

    pub fn client(&self) -> &Arc<dyn TableClient> {
        &self.client
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// The secondary index serving `property`.
    pub fn index_name(schema: &Schema, property: &str) -> String {
        schema
            .property(property)
            .and_then(|property| property.custom_index_name())
            .map_or_else(|| format!("{property}-index"), str::to_string)
    }

    /// Id suffix shared by every record of the collection.
    fn id_suffix(&self, schema: &Schema) -> String {
        format!(":id:{}:{}", self.backend_id, schema.collection())
    }

    /// Keeps only the items belonging to `schema`'s collection.
    fn owned_by<'a>(
        &'a self,
        schema: &'a Schema,
        items: BoxStream<'a, DocumentStoreResult<Record>>,
    ) -> BoxStream<'a, DocumentStoreResult<Record>> {
        let suffix = self.id_suffix(schema);
        items
            .try_filter(move |item| {
                future::ready(
                    item.get_str(ID_FIELD)
                        .is_ok_and(|id| id.ends_with(&suffix)),
                )
            })
            .boxed()
    }

    fn scan_table(&self) -> BoxStream<'_, DocumentStoreResult<Record>> {
        paginate(move |start_key| async move { self.client.scan(&self.table, start_key).await })
    }
}

#[async_trait]
impl StoreBackend for NativeIndexBackend {
    fn backend_id(&self) -> &str {
        &self.backend_id
    }

    fn id_strategy(&self) -> IdStrategy {
        IdStrategy::Content
    }

    fn preserves_index_case(&self) -> bool {
        true
    }

    async fn create_id(&self, schema: &Schema, record: &Record) -> DocumentStoreResult<String> {
        let hash = identity::content_hash(record)?;
        Ok(identity::content_id(&self.backend_id, schema.collection(), &hash))
    }

    async fn save(&self, _schema: &Schema, record: &Record, _stale: &[String]) -> DocumentStoreResult<()> {
        debug!(id = ?record.get(ID_FIELD), table = %self.table, "putting item");
        self.client.put_item(&self.table, record.clone()).await
    }

    async fn get(&self, schema: &Schema, doc_id: &str) -> DocumentStoreResult<Record> {
        self.client
            .get_item(&self.table, doc_id)
            .await?
            .ok_or_else(|| DocumentStoreError::DocumentNotFound(doc_id.to_string(), schema.collection().to_string()))
    }

    async fn delete(&self, _schema: &Schema, doc_id: &str, _indexes: &[String]) -> DocumentStoreResult<()> {
        debug!(id = %doc_id, table = %self.table, "deleting item");
        self.client.delete_item(&self.table, doc_id).await
    }

    fn all<'a>(&'a self, schema: &'a Schema, pagination: Pagination) -> BoxStream<'a, DocumentStoreResult<Record>> {
        self.owned_by(schema, self.scan_table())
            .skip(pagination.skip)
            .take(pagination.limit.unwrap_or(usize::MAX))
            .boxed()
    }

    fn evaluate<'a>(&'a self, schema: &'a Schema, filters: Vec<IndexKey>) -> BoxStream<'a, DocumentStoreResult<Record>> {
        if let Some(wildcard) = filters.iter().find(|filter| filter.is_wildcard()) {
            let message = format!(
                "Wildcard lookups are not supported by the {} backend: {}",
                self.backend_id, wildcard.key
            );
            return stream::once(async move { Err(DocumentStoreError::Usage(message)) }).boxed();
        }

        let mut filters = filters.into_iter();
        let Some(first) = filters.next() else {
            return self.all(schema, Pagination::unbounded());
        };

        let index = Self::index_name(schema, &first.property);
        let key = KeyCondition {
            attribute: first.property,
            value: first.value,
        };
        let filter = Condition::all(filters.map(|rest| (rest.property, rest.value)));

        debug!(
            table = %self.table,
            index = %index,
            filter = %filter.as_ref().map(ToString::to_string).unwrap_or_default(),
            "querying secondary index"
        );

        let pages = paginate(move |start_key| {
            let request = QueryRequest {
                index: Some(index.clone()),
                key: key.clone(),
                filter: filter.clone(),
                start_key,
            };
            async move { self.client.query(&self.table, request).await }
        });
        self.owned_by(schema, pages)
    }

    async fn flush(&self) -> DocumentStoreResult<()> {
        let marker = format!(":id:{}:", self.backend_id);
        let ids: Vec<String> = self
            .scan_table()
            .try_filter_map(|item| {
                future::ready(Ok(item
                    .get_str(ID_FIELD)
                    .ok()
                    .filter(|id| id.contains(&marker))
                    .map(str::to_string)))
            })
            .try_collect()
            .await?;

        debug!(table = %self.table, items = ids.len(), "flushing backend");
        for id in ids {
            self.client.delete_item(&self.table, &id).await?;
        }
        Ok(())
    }

    async fn ensure_indexes(&self, schema: &Schema) -> DocumentStoreResult<()> {
        let description = self
            .client
            .describe_table(&self.table)
            .await?
            .ok_or_else(|| DocumentStoreError::Resource(format!("Table '{}' does not exist", self.table)))?;

        for (property, _) in schema.indexed() {
            let name = Self::index_name(schema, property);
            if description.index(&name).is_some() {
                continue;
            }
            debug!(table = %self.table, index = %name, "creating secondary index");
            self.client
                .create_index(
                    &self.table,
                    SecondaryIndex {
                        name,
                        attribute: property.to_string(),
                    },
                )
                .await?;
        }
        Ok(())
    }
}

/// Builder for constructing [`NativeIndexBackend`] instances.
pub struct NativeIndexBackendBuilder {
    client: Arc<dyn TableClient>,
    table: String,
    backend_id: String,
    create_table: bool,
}

impl NativeIndexBackendBuilder {
    pub fn new(client: impl TableClient + 'static, table: impl Into<String>) -> Self {
        Self {
            client: Arc::new(client),
            table: table.into(),
            backend_id: DEFAULT_BACKEND_ID.to_string(),
            create_table: false,
        }
    }

    pub fn backend_id(mut self, backend_id: impl Into<String>) -> Self {
        self.backend_id = backend_id.into();
        self
    }

    /// Creates the table at build time when it does not exist yet.
    pub fn create_table(mut self, create: bool) -> Self {
        self.create_table = create;
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for NativeIndexBackendBuilder {
    type Backend = NativeIndexBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        if self.backend_id.is_empty() || self.backend_id.contains(':') {
            return Err(DocumentStoreError::Initialization(format!(
                "Invalid backend id '{}'",
                self.backend_id
            )));
        }

        if self.client.describe_table(&self.table).await?.is_none() {
            if !self.create_table {
                return Err(DocumentStoreError::Resource(format!(
                    "Table '{}' does not exist",
                    self.table
                )));
            }
            debug!(table = %self.table, "creating table");
            self.client
                .create_table(TableDescription {
                    name: self.table.clone(),
                    key_attribute: ID_FIELD.to_string(),
                    indexes: Vec::new(),
                })
                .await?;
        }

        Ok(NativeIndexBackend {
            client: self.client,
            table: self.table,
            backend_id: self.backend_id,
        })
    }
}
