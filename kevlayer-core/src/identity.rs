//! Identity and index-key string formats shared by every backend.
//!
//! These formats are part of the on-store layout and must stay bit-exact:
//!
//! | Item | Format |
//! |---|---|
//! | counter key | `{backend}:{collection}:id._pk` |
//! | counter id | `{backend}:{collection}:id:{n}` |
//! | content id | `{10 hex chars}:id:{backend}:{collection}` |
//! | index key | `{backend}:{collection}:indexes:{property}:{value}` |
//! | all-ids key | `{backend}:{collection}:all` |

use bson::Document as Record;
use chrono::Utc;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::DocumentStoreResult;

/// How a backend mints new record ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdStrategy {
    /// An atomically incremented integer counter per collection.
    Counter,
    /// A hash over a timestamp, a random token and the record itself.
    Content,
}

pub fn counter_key(backend: &str, collection: &str) -> String {
    format!("{backend}:{collection}:id._pk")
}

pub fn counter_id(backend: &str, collection: &str, counter: i64) -> String {
    format!("{backend}:{collection}:id:{counter}")
}

pub fn content_id(backend: &str, collection: &str, hash: &str) -> String {
    format!("{hash}:id:{backend}:{collection}")
}

pub fn all_key(backend: &str, collection: &str) -> String {
    format!("{backend}:{collection}:all")
}

pub fn index_prefix(backend: &str, collection: &str) -> String {
    format!("{backend}:{collection}:indexes")
}

/// Formats an index key, lower-casing the value unless `preserve_case` is set.
pub fn index_key(backend: &str, collection: &str, property: &str, value: &str, preserve_case: bool) -> String {
    let value = if preserve_case {
        value.to_string()
    } else {
        value.to_lowercase()
    };
    format!("{}:{property}:{value}", index_prefix(backend, collection))
}

/// Hashes a record into the 10 hex character prefix used by content ids.
pub fn content_hash(record: &Record) -> DocumentStoreResult<String> {
    let snapshot = serde_json::to_string(&record)?;

    let mut hasher = Sha256::new();
    hasher.update(Utc::now().to_rfc3339().as_bytes());
    hasher.update(Uuid::new_v4().simple().to_string().as_bytes());
    hasher.update(snapshot.as_bytes());

    Ok(hasher
        .finalize()
        .iter()
        .take(5)
        .map(|byte| format!("{byte:02x}"))
        .collect())
}

/// Extracts the short id (`pk`) out of a fully-qualified id of either format.
pub fn parse_id(strategy: IdStrategy, doc_id: &str) -> &str {
    match strategy {
        IdStrategy::Counter => doc_id
            .rsplit_once(":id:")
            .map_or(doc_id, |(_, pk)| pk),
        IdStrategy::Content => doc_id
            .split_once(":id:")
            .map_or(doc_id, |(pk, _)| pk),
    }
}

/// Rebuilds the fully-qualified id from a short or fully-qualified one.
pub fn doc_id(strategy: IdStrategy, backend: &str, collection: &str, id: &str) -> String {
    if id.contains(":id:") {
        return id.to_string();
    }
    match strategy {
        IdStrategy::Counter => format!("{backend}:{collection}:id:{id}"),
        IdStrategy::Content => content_id(backend, collection, id),
    }
}
