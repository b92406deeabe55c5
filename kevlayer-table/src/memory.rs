//! In-process [`TableClient`] with maintained secondary indexes.

use async_trait::async_trait;
use mea::rwlock::RwLock;
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    ops::Bound,
    sync::Arc,
};

use kevlayer_core::{
    backend::Record,
    error::{DocumentStoreError, DocumentStoreResult},
    value::render_storage,
};

use crate::client::{ItemPage, QueryRequest, SecondaryIndex, TableClient, TableDescription};

/// Items read per page unless configured otherwise.
pub const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Debug)]
struct MemoryTable {
    description: TableDescription,
    items: BTreeMap<String, Record>,
    /// index name -> partition value -> item keys
    indexes: HashMap<String, BTreeMap<String, BTreeSet<String>>>,
}

impl MemoryTable {
    fn new(description: TableDescription) -> Self {
        let indexes = description
            .indexes
            .iter()
            .map(|index| (index.name.clone(), BTreeMap::new()))
            .collect();
        Self {
            description,
            items: BTreeMap::new(),
            indexes,
        }
    }

    fn partition_values<'i>(&'i self, item: &'i Record) -> impl Iterator<Item = (&'i str, String)> + 'i {
        self.description
            .indexes
            .iter()
            .filter_map(|index| match item.get(&index.attribute) {
                None | Some(bson::Bson::Null) => None,
                Some(value) => Some((index.name.as_str(), render_storage(value))),
            })
    }

    fn unindex(&mut self, key: &str) {
        let Some(item) = self.items.get(key) else {
            return;
        };
        let entries: Vec<(String, String)> = self
            .partition_values(item)
            .map(|(name, value)| (name.to_string(), value))
            .collect();

        for (name, value) in entries {
            let Some(partitions) = self.indexes.get_mut(&name) else {
                continue;
            };
            if let Some(keys) = partitions.get_mut(&value) {
                keys.remove(key);
                if keys.is_empty() {
                    partitions.remove(&value);
                }
            }
        }
    }

    fn index_item(&mut self, key: &str, item: &Record) {
        let entries: Vec<(String, String)> = self
            .partition_values(item)
            .map(|(name, value)| (name.to_string(), value))
            .collect();

        for (name, value) in entries {
            self.indexes
                .entry(name)
                .or_default()
                .entry(value)
                .or_default()
                .insert(key.to_string());
        }
    }

    fn key_of(&self, item: &Record) -> DocumentStoreResult<String> {
        item.get_str(&self.description.key_attribute)
            .map(str::to_string)
            .map_err(|_| {
                DocumentStoreError::InvalidDocument(format!(
                    "Item is missing key attribute '{}'",
                    self.description.key_attribute
                ))
            })
    }
}

/// Cuts an ordered key list into one page after `start_key`.
fn page_keys<'k>(keys: impl Iterator<Item = &'k String>, start_key: Option<&str>, page_size: usize) -> (Vec<String>, Option<String>) {
    let mut keys: Vec<String> = keys
        .filter(|key| start_key.is_none_or(|start| key.as_str() > start))
        .take(page_size + 1)
        .cloned()
        .collect();

    if keys.len() > page_size {
        keys.truncate(page_size);
        let last = keys.last().cloned();
        (keys, last)
    } else {
        (keys, None)
    }
}

/// A partitioned table store held in process memory.
///
/// Cloning shares the underlying tables.
#[derive(Debug, Clone)]
pub struct MemoryTableClient {
    tables: Arc<RwLock<HashMap<String, MemoryTable>>>,
    page_size: usize,
}

impl Default for MemoryTableClient {
    fn default() -> Self {
        Self {
            tables: Arc::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl MemoryTableClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how many items a page reads. Zero is treated as one.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub async fn item_count(&self, table: &str) -> usize {
        self.tables
            .read()
            .await
            .get(table)
            .map_or(0, |table| table.items.len())
    }
}

fn missing_table(table: &str) -> DocumentStoreError {
    DocumentStoreError::Resource(format!("Table '{table}' does not exist"))
}

#[async_trait]
impl TableClient for MemoryTableClient {
    async fn create_table(&self, description: TableDescription) -> DocumentStoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.contains_key(&description.name) {
            return Err(DocumentStoreError::Resource(format!(
                "Table '{}' already exists",
                description.name
            )));
        }
        tables.insert(description.name.clone(), MemoryTable::new(description));
        Ok(())
    }

    async fn describe_table(&self, table: &str) -> DocumentStoreResult<Option<TableDescription>> {
        Ok(self
            .tables
            .read()
            .await
            .get(table)
            .map(|table| table.description.clone()))
    }

    async fn create_index(&self, table: &str, index: SecondaryIndex) -> DocumentStoreResult<()> {
        let mut tables = self.tables.write().await;
        let table = tables
            .get_mut(table)
            .ok_or_else(|| missing_table(table))?;

        if let Some(existing) = table.description.index(&index.name) {
            if existing.attribute == index.attribute {
                return Ok(());
            }
            return Err(DocumentStoreError::Resource(format!(
                "Index '{}' already exists on attribute '{}'",
                index.name, existing.attribute
            )));
        }

        table.description.indexes.push(index);
        let items: Vec<(String, Record)> = table
            .items
            .iter()
            .map(|(key, item)| (key.clone(), item.clone()))
            .collect();
        for (key, item) in items {
            table.index_item(&key, &item);
        }
        Ok(())
    }

    async fn put_item(&self, table: &str, item: Record) -> DocumentStoreResult<()> {
        let mut tables = self.tables.write().await;
        let table = tables
            .get_mut(table)
            .ok_or_else(|| missing_table(table))?;

        let key = table.key_of(&item)?;
        table.unindex(&key);
        table.index_item(&key, &item);
        table.items.insert(key, item);
        Ok(())
    }

    async fn get_item(&self, table: &str, key: &str) -> DocumentStoreResult<Option<Record>> {
        Ok(self
            .tables
            .read()
            .await
            .get(table)
            .ok_or_else(|| missing_table(table))?
            .items
            .get(key)
            .cloned())
    }

    async fn delete_item(&self, table: &str, key: &str) -> DocumentStoreResult<()> {
        let mut tables = self.tables.write().await;
        let table = tables
            .get_mut(table)
            .ok_or_else(|| missing_table(table))?;

        table.unindex(key);
        table.items.remove(key);
        Ok(())
    }

    async fn query(&self, table: &str, request: QueryRequest) -> DocumentStoreResult<ItemPage> {
        let tables = self.tables.read().await;
        let table = tables
            .get(table)
            .ok_or_else(|| missing_table(table))?;

        let (keys, last_key) = match &request.index {
            Some(name) => {
                let index = table.description.index(name).ok_or_else(|| {
                    DocumentStoreError::Resource(format!(
                        "Table '{}' has no index '{name}'",
                        table.description.name
                    ))
                })?;
                if index.attribute != request.key.attribute {
                    return Err(DocumentStoreError::Usage(format!(
                        "Index '{name}' is partitioned on '{}', not '{}'",
                        index.attribute, request.key.attribute
                    )));
                }

                let partition = render_storage(&request.key.value);
                let empty = BTreeSet::new();
                let members = table
                    .indexes
                    .get(name)
                    .and_then(|partitions| partitions.get(&partition))
                    .unwrap_or(&empty);
                page_keys(members.iter(), request.start_key.as_deref(), self.page_size)
            }
            None => {
                if request.key.attribute != table.description.key_attribute {
                    return Err(DocumentStoreError::Usage(format!(
                        "'{}' is not the key attribute of table '{}'",
                        request.key.attribute, table.description.name
                    )));
                }
                let key = render_storage(&request.key.value);
                let found: Vec<String> = table
                    .items
                    .contains_key(&key)
                    .then_some(key)
                    .into_iter()
                    .collect();
                page_keys(found.iter(), request.start_key.as_deref(), self.page_size)
            }
        };

        let items = keys
            .iter()
            .filter_map(|key| table.items.get(key))
            .filter(|item| {
                request
                    .filter
                    .as_ref()
                    .is_none_or(|filter| filter.matches(item))
            })
            .cloned()
            .collect();

        Ok(ItemPage { items, last_key })
    }

    async fn scan(&self, table: &str, start_key: Option<String>) -> DocumentStoreResult<ItemPage> {
        let tables = self.tables.read().await;
        let table = tables
            .get(table)
            .ok_or_else(|| missing_table(table))?;

        let start = match start_key {
            Some(key) => Bound::Excluded(key),
            None => Bound::Unbounded,
        };

        let mut items: Vec<(String, Record)> = table
            .items
            .range((start, Bound::Unbounded))
            .take(self.page_size + 1)
            .map(|(key, item)| (key.clone(), item.clone()))
            .collect();

        let last_key = if items.len() > self.page_size {
            items.truncate(self.page_size);
            items.last().map(|(key, _)| key.clone())
        } else {
            None
        };

        Ok(ItemPage {
            items: items.into_iter().map(|(_, item)| item).collect(),
            last_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        client::KeyCondition,
        condition::Condition,
    };
    use bson::doc;

    async fn client() -> MemoryTableClient {
        let client = MemoryTableClient::new().with_page_size(2);
        client
            .create_table(TableDescription {
                name: "kev".into(),
                key_attribute: "_id".into(),
                indexes: vec![SecondaryIndex {
                    name: "city-index".into(),
                    attribute: "city".into(),
                }],
            })
            .await
            .unwrap();
        client
    }

    fn request(city: &str, filter: Option<Condition>, start_key: Option<String>) -> QueryRequest {
        QueryRequest {
            index: Some("city-index".into()),
            key: KeyCondition {
                attribute: "city".into(),
                value: city.into(),
            },
            filter,
            start_key,
        }
    }

    #[tokio::test]
    async fn test_index_maintenance() {
        let client = client().await;
        client.put_item("kev", doc! { "_id": "a", "city": "Durham" }).await.unwrap();
        client.put_item("kev", doc! { "_id": "b", "city": "Durham" }).await.unwrap();
        client.put_item("kev", doc! { "_id": "a", "city": "Charlotte" }).await.unwrap();

        let durham = client.query("kev", request("Durham", None, None)).await.unwrap();
        assert_eq!(durham.items.len(), 1);
        assert_eq!(durham.items[0].get_str("_id").ok(), Some("b"));

        client.delete_item("kev", "b").await.unwrap();
        let durham = client.query("kev", request("Durham", None, None)).await.unwrap();
        assert!(durham.items.is_empty());
    }

    #[tokio::test]
    async fn test_query_pages_and_filters() {
        let client = client().await;
        for (id, name) in [("a", "Goo"), ("b", "Lakewood"), ("c", "Goo")] {
            client.put_item("kev", doc! { "_id": id, "city": "Durham", "name": name }).await.unwrap();
        }

        let filter = Some(Condition::eq("name", "Goo"));
        let first = client.query("kev", request("Durham", filter.clone(), None)).await.unwrap();
        assert_eq!(first.items.len(), 1);
        assert_eq!(first.last_key.as_deref(), Some("b"));

        let second = client.query("kev", request("Durham", filter, first.last_key)).await.unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.last_key, None);

        let scanned = client.scan("kev", None).await.unwrap();
        assert_eq!(scanned.items.len(), 2);
        assert!(scanned.last_key.is_some());
    }

    #[tokio::test]
    async fn test_create_index_backfills() {
        let client = client().await;
        client.put_item("kev", doc! { "_id": "a", "city": "Durham", "name": "Goo" }).await.unwrap();
        client
            .create_index("kev", SecondaryIndex { name: "name-index".into(), attribute: "name".into() })
            .await
            .unwrap();

        let request = QueryRequest {
            index: Some("name-index".into()),
            key: KeyCondition { attribute: "name".into(), value: "Goo".into() },
            filter: None,
            start_key: None,
        };
        assert_eq!(client.query("kev", request).await.unwrap().items.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_resources() {
        let client = client().await;
        assert!(matches!(
            client.get_item("nope", "a").await,
            Err(DocumentStoreError::Resource(_))
        ));

        let mut missing_index = request("Durham", None, None);
        missing_index.index = Some("gpa-index".into());
        assert!(matches!(
            client.query("kev", missing_index).await,
            Err(DocumentStoreError::Resource(_))
        ));
    }
}
