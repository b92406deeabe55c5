//! The hash-table store interface wrapped by [`SetIndexBackend`](crate::store::SetIndexBackend).
//!
//! The interface mirrors the subset of a Redis-like store the backend needs:
//! string-valued hashes, unordered string sets, glob key scans, an atomic
//! counter, and a pipeline that applies a batch of writes as one unit.

use async_trait::async_trait;
use std::{collections::BTreeMap, fmt::Debug};

use kevlayer_core::error::DocumentStoreResult;

/// One write in a pipelined batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashCommand {
    /// Sets fields on the hash at `key`, creating it if needed.
    HSet { key: String, fields: Vec<(String, String)> },
    /// Deletes whole keys of any kind.
    Del { keys: Vec<String> },
    /// Adds members to the set at `key`.
    SAdd { key: String, members: Vec<String> },
    /// Removes members from the set at `key`. Emptied sets disappear.
    SRem { key: String, members: Vec<String> },
}

/// A hash-table-like store client.
#[async_trait]
pub trait HashClient: Send + Sync + Debug {
    async fn hset(&self, key: &str, fields: Vec<(String, String)>) -> DocumentStoreResult<()>;

    /// All fields of the hash at `key`; empty when the key does not exist.
    async fn hgetall(&self, key: &str) -> DocumentStoreResult<BTreeMap<String, String>>;

    /// Deletes keys, returning how many existed.
    async fn del(&self, keys: &[String]) -> DocumentStoreResult<usize>;

    async fn sadd(&self, key: &str, members: &[String]) -> DocumentStoreResult<()>;

    async fn srem(&self, key: &str, members: &[String]) -> DocumentStoreResult<()>;

    /// Members of the set at `key`; empty when the key does not exist.
    async fn smembers(&self, key: &str) -> DocumentStoreResult<Vec<String>>;

    /// Members present in every one of the given sets.
    async fn sinter(&self, keys: &[String]) -> DocumentStoreResult<Vec<String>>;

    /// Key names matching a glob pattern (`*`, `?`).
    async fn keys(&self, pattern: &str) -> DocumentStoreResult<Vec<String>>;

    /// Atomically increments the counter at `key`, returning the new value.
    async fn incr(&self, key: &str) -> DocumentStoreResult<i64>;

    /// Applies a batch of writes as one unit.
    async fn pipeline(&self, commands: Vec<HashCommand>) -> DocumentStoreResult<()>;
}
