//! In-process [`ObjectClient`] with paginated listings.

use async_trait::async_trait;
use mea::rwlock::RwLock;
use std::{
    collections::{BTreeMap, HashMap},
    ops::Bound,
    sync::Arc,
};

use kevlayer_core::error::{DocumentStoreError, DocumentStoreResult};

use crate::client::{ListPage, ObjectClient};

/// Keys returned per listing page unless configured otherwise.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

type Bucket = BTreeMap<String, Vec<u8>>;

/// An object store held in process memory.
///
/// Buckets must be created before use. Listings are cut into pages of
/// `page_size` keys; the continuation token is the last key of the previous
/// page. Cloning shares the underlying data.
#[derive(Debug, Clone)]
pub struct MemoryObjectClient {
    buckets: Arc<RwLock<HashMap<String, Bucket>>>,
    page_size: usize,
}

impl Default for MemoryObjectClient {
    fn default() -> Self {
        Self {
            buckets: Arc::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl MemoryObjectClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how many keys a listing page holds. Zero is treated as one.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Creates an empty bucket. Existing buckets are left untouched.
    pub async fn create_bucket(&self, bucket: &str) {
        self.buckets
            .write()
            .await
            .entry(bucket.to_string())
            .or_default();
    }

    /// Number of objects in a bucket, zero when it does not exist.
    pub async fn object_count(&self, bucket: &str) -> usize {
        self.buckets
            .read()
            .await
            .get(bucket)
            .map_or(0, BTreeMap::len)
    }
}

fn missing_bucket(bucket: &str) -> DocumentStoreError {
    DocumentStoreError::Resource(format!("Bucket '{bucket}' does not exist"))
}

#[async_trait]
impl ObjectClient for MemoryObjectClient {
    async fn bucket_exists(&self, bucket: &str) -> DocumentStoreResult<bool> {
        Ok(self.buckets.read().await.contains_key(bucket))
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> DocumentStoreResult<()> {
        self.buckets
            .write()
            .await
            .get_mut(bucket)
            .ok_or_else(|| missing_bucket(bucket))?
            .insert(key.to_string(), body);
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> DocumentStoreResult<Option<Vec<u8>>> {
        Ok(self
            .buckets
            .read()
            .await
            .get(bucket)
            .ok_or_else(|| missing_bucket(bucket))?
            .get(key)
            .cloned())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> DocumentStoreResult<()> {
        self.buckets
            .write()
            .await
            .get_mut(bucket)
            .ok_or_else(|| missing_bucket(bucket))?
            .remove(key);
        Ok(())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> DocumentStoreResult<ListPage> {
        let buckets = self.buckets.read().await;
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| missing_bucket(bucket))?;

        let start = match continuation {
            Some(token) => Bound::Excluded(token),
            None => Bound::Included(prefix.to_string()),
        };

        let mut keys: Vec<String> = objects
            .range((start, Bound::Unbounded))
            .map(|(key, _)| key)
            .take_while(|key| key.starts_with(prefix))
            .take(self.page_size + 1)
            .cloned()
            .collect();

        let next_token = if keys.len() > self.page_size {
            keys.truncate(self.page_size);
            keys.last().cloned()
        } else {
            None
        };

        Ok(ListPage { keys, next_token })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_bucket_is_resource_error() {
        let client = MemoryObjectClient::new();
        let result = client.put_object("nope", "key", Vec::new()).await;
        assert!(matches!(result, Err(DocumentStoreError::Resource(_))));
        assert!(!client.bucket_exists("nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_paginated_listing() {
        let client = MemoryObjectClient::new().with_page_size(2);
        client.create_bucket("b").await;
        for key in ["a/1", "a/2", "a/3", "b/1", "a0"] {
            client.put_object("b", key, Vec::new()).await.unwrap();
        }

        let first = client.list_objects("b", "a/", None).await.unwrap();
        assert_eq!(first.keys, ["a/1", "a/2"]);
        assert_eq!(first.next_token.as_deref(), Some("a/2"));

        let second = client.list_objects("b", "a/", first.next_token).await.unwrap();
        assert_eq!(second.keys, ["a/3"]);
        assert_eq!(second.next_token, None);
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let client = MemoryObjectClient::new();
        client.create_bucket("b").await;
        client.put_object("b", "k", b"body".to_vec()).await.unwrap();
        assert_eq!(client.get_object("b", "k").await.unwrap().as_deref(), Some(&b"body"[..]));

        client.delete_object("b", "k").await.unwrap();
        client.delete_object("b", "k").await.unwrap();
        assert_eq!(client.get_object("b", "k").await.unwrap(), None);
        assert_eq!(client.object_count("b").await, 0);
    }
}
