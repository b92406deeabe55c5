//! The partitioned table store interface wrapped by
//! [`NativeIndexBackend`](crate::store::NativeIndexBackend).
//!
//! The interface mirrors a DynamoDB-like store: one table keyed by a single
//! string attribute, global secondary indexes partitioned on one attribute
//! each, key-condition queries with an optional post-filter, and paginated
//! reads that hand back the last evaluated key.

use async_trait::async_trait;
use bson::Bson;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use kevlayer_core::{backend::Record, error::DocumentStoreResult};

use crate::condition::Condition;

/// A secondary index partitioned on one attribute.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SecondaryIndex {
    pub name: String,
    pub attribute: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TableDescription {
    pub name: String,
    /// The attribute holding each item's primary key.
    pub key_attribute: String,
    pub indexes: Vec<SecondaryIndex>,
}

impl TableDescription {
    pub fn index(&self, name: &str) -> Option<&SecondaryIndex> {
        self.indexes
            .iter()
            .find(|index| index.name == name)
    }
}

/// Equality on the partition attribute of the table or of an index.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyCondition {
    pub attribute: String,
    pub value: Bson,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    /// Secondary index to read; the table's own key when `None`.
    pub index: Option<String>,
    pub key: KeyCondition,
    /// Applied to each page after it is read.
    pub filter: Option<Condition>,
    /// Exclusive start, taken from a previous page.
    pub start_key: Option<String>,
}

/// One page of a query or scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemPage {
    pub items: Vec<Record>,
    /// Set when more pages follow.
    pub last_key: Option<String>,
}

/// A partitioned table store client.
///
/// Operations against a table or index that does not exist fail with
/// [`DocumentStoreError::Resource`](kevlayer_core::error::DocumentStoreError::Resource).
#[async_trait]
pub trait TableClient: Send + Sync + Debug {
    async fn create_table(&self, description: TableDescription) -> DocumentStoreResult<()>;

    async fn describe_table(&self, table: &str) -> DocumentStoreResult<Option<TableDescription>>;

    /// Adds a secondary index, backfilling it from existing items.
    async fn create_index(&self, table: &str, index: SecondaryIndex) -> DocumentStoreResult<()>;

    /// Writes an item, replacing any item with the same key.
    async fn put_item(&self, table: &str, item: Record) -> DocumentStoreResult<()>;

    async fn get_item(&self, table: &str, key: &str) -> DocumentStoreResult<Option<Record>>;

    async fn delete_item(&self, table: &str, key: &str) -> DocumentStoreResult<()>;

    async fn query(&self, table: &str, request: QueryRequest) -> DocumentStoreResult<ItemPage>;

    async fn scan(&self, table: &str, start_key: Option<String>) -> DocumentStoreResult<ItemPage>;
}
