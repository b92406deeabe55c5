//! The object store interface wrapped by [`PrefixIndexBackend`](crate::store::PrefixIndexBackend).

use async_trait::async_trait;
use std::fmt::Debug;

use kevlayer_core::error::DocumentStoreResult;

/// One page of a prefix listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Keys in lexicographic order.
    pub keys: Vec<String>,
    /// Token to pass back for the next page, `None` on the last page.
    pub next_token: Option<String>,
}

/// A blob store client.
///
/// Operations against a bucket that does not exist fail with
/// [`DocumentStoreError::Resource`](kevlayer_core::error::DocumentStoreError::Resource).
#[async_trait]
pub trait ObjectClient: Send + Sync + Debug {
    async fn bucket_exists(&self, bucket: &str) -> DocumentStoreResult<bool>;

    /// Writes an object, replacing any previous body.
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> DocumentStoreResult<()>;

    /// Reads an object body; `None` when the key does not exist.
    async fn get_object(&self, bucket: &str, key: &str) -> DocumentStoreResult<Option<Vec<u8>>>;

    /// Deletes an object. Deleting a missing key is not an error.
    async fn delete_object(&self, bucket: &str, key: &str) -> DocumentStoreResult<()>;

    /// Lists one page of keys starting with `prefix`.
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> DocumentStoreResult<ListPage>;
}
