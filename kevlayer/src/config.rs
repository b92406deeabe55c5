//! Declarative database configuration.
//!
//! Maps logical database labels to backend kinds and builds a
//! [`DocumentStore`] from them once, at startup. Every database is backed by an
//! in-process client of its kind, which makes the configuration suitable for
//! development and tests; production deployments register backends over real
//! clients through [`DocumentStore::builder`].
//!
//! ```json
//! {
//!     "default": { "backend": "set_index", "backend_id": "redis" },
//!     "s3": { "backend": "prefix_index", "bucket": "kev-test" },
//!     "dynamodb": { "backend": "native_index", "table": "kev" },
//!     "s3redis": { "backend": "hybrid_index", "bucket": "kev-test" }
//! }
//! ```

use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::debug;

use kevlayer_core::{
    backend::DynStoreBackend,
    error::{DocumentStoreError, DocumentStoreResult},
    store::DocumentStore,
};

#[cfg(any(feature = "hash", feature = "object", feature = "table", feature = "hybrid"))]
use kevlayer_core::backend::StoreBackendBuilder;

/// One logical database.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum DatabaseConfig {
    /// Set-index backend over a hash-table store.
    #[cfg(feature = "hash")]
    SetIndex {
        #[serde(default)]
        backend_id: Option<String>,
    },
    /// Prefix-index backend over an object store bucket.
    #[cfg(feature = "object")]
    PrefixIndex {
        #[serde(default)]
        backend_id: Option<String>,
        bucket: String,
    },
    /// Native-index backend over a partitioned table.
    #[cfg(feature = "table")]
    NativeIndex {
        #[serde(default)]
        backend_id: Option<String>,
        table: String,
    },
    /// Hybrid backend: blobs in an object store bucket, index sets in a hash store.
    #[cfg(feature = "hybrid")]
    HybridIndex {
        #[serde(default)]
        backend_id: Option<String>,
        bucket: String,
    },
}

impl DatabaseConfig {
    /// Builds the backend over a fresh in-process client.
    pub async fn build(self) -> DocumentStoreResult<Box<dyn DynStoreBackend>> {
        match self {
            #[cfg(feature = "hash")]
            DatabaseConfig::SetIndex { backend_id } => {
                use kevlayer_hash::{MemoryHashClient, SetIndexBackend};

                let mut builder = SetIndexBackend::builder(MemoryHashClient::new());
                if let Some(backend_id) = backend_id {
                    builder = builder.backend_id(backend_id);
                }
                Ok(Box::new(builder.build().await?))
            }
            #[cfg(feature = "object")]
            DatabaseConfig::PrefixIndex { backend_id, bucket } => {
                use kevlayer_object::{MemoryObjectClient, PrefixIndexBackend};

                let client = MemoryObjectClient::new();
                client.create_bucket(&bucket).await;

                let mut builder = PrefixIndexBackend::builder(client, bucket);
                if let Some(backend_id) = backend_id {
                    builder = builder.backend_id(backend_id);
                }
                Ok(Box::new(builder.build().await?))
            }
            #[cfg(feature = "table")]
            DatabaseConfig::NativeIndex { backend_id, table } => {
                use kevlayer_table::{MemoryTableClient, NativeIndexBackend};

                let mut builder = NativeIndexBackend::builder(MemoryTableClient::new(), table).create_table(true);
                if let Some(backend_id) = backend_id {
                    builder = builder.backend_id(backend_id);
                }
                Ok(Box::new(builder.build().await?))
            }
            #[cfg(feature = "hybrid")]
            DatabaseConfig::HybridIndex { backend_id, bucket } => {
                use kevlayer_hash::MemoryHashClient;
                use kevlayer_hybrid::HybridIndexBackend;
                use kevlayer_object::MemoryObjectClient;

                let objects = MemoryObjectClient::new();
                objects.create_bucket(&bucket).await;

                let mut builder = HybridIndexBackend::builder(MemoryHashClient::new(), objects, bucket);
                if let Some(backend_id) = backend_id {
                    builder = builder.backend_id(backend_id);
                }
                Ok(Box::new(builder.build().await?))
            }
        }
    }
}

/// Every logical database, keyed by label.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct DatabasesConfig {
    pub databases: BTreeMap<String, DatabaseConfig>,
}

impl DatabasesConfig {
    /// Parses a JSON configuration object.
    ///
    /// # Errors
    ///
    /// Returns an `Initialization` error for malformed JSON or an unknown
    /// backend kind.
    pub fn from_json(json: &str) -> DocumentStoreResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| DocumentStoreError::Initialization(format!("Invalid database configuration: {e}")))
    }

    /// Builds every configured backend and registers it under its label.
    pub async fn build(self) -> DocumentStoreResult<DocumentStore> {
        let mut builder = DocumentStore::builder();
        for (label, database) in self.databases {
            debug!(database = %label, config = ?database, "building backend");
            builder = builder.boxed_database(label, database.build().await?);
        }
        Ok(builder.build())
    }
}

#[cfg(all(test, feature = "hash", feature = "object", feature = "table", feature = "hybrid"))]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let config = DatabasesConfig::from_json(
            r#"{
                "default": { "backend": "set_index" },
                "s3": { "backend": "prefix_index", "backend_id": "s3", "bucket": "kev-test" },
                "dynamodb": { "backend": "native_index", "table": "kev" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.databases.len(), 3);
        assert_eq!(
            config.databases.get("default"),
            Some(&DatabaseConfig::SetIndex { backend_id: None })
        );
        assert_eq!(
            config.databases.get("s3"),
            Some(&DatabaseConfig::PrefixIndex {
                backend_id: Some("s3".into()),
                bucket: "kev-test".into(),
            })
        );
    }

    #[test]
    fn test_unknown_backend() {
        let result = DatabasesConfig::from_json(r#"{ "default": { "backend": "cloudant" } }"#);
        assert!(matches!(result, Err(DocumentStoreError::Initialization(_))));
    }

    #[tokio::test]
    async fn test_build_registers_labels() {
        let store = DatabasesConfig::from_json(
            r#"{
                "default": { "backend": "set_index", "backend_id": "redis" },
                "s3": { "backend": "prefix_index", "bucket": "kev-test" },
                "dynamodb": { "backend": "native_index", "table": "kev" },
                "s3redis": { "backend": "hybrid_index", "bucket": "kev-test" }
            }"#,
        )
        .unwrap()
        .build()
        .await
        .unwrap();

        assert_eq!(store.labels().collect::<Vec<_>>(), ["default", "dynamodb", "s3", "s3redis"]);
        assert_eq!(store.backend("default").unwrap().backend_id(), "redis");
        assert_eq!(store.backend("s3").unwrap().backend_id(), "s3");
        assert_eq!(store.backend("dynamodb").unwrap().backend_id(), "dynamodb");
        assert_eq!(store.backend("s3redis").unwrap().backend_id(), "s3redis");
    }

    #[tokio::test]
    async fn test_invalid_backend_id() {
        let result = DatabasesConfig::from_json(r#"{ "default": { "backend": "set_index", "backend_id": "a:b" } }"#)
            .unwrap()
            .build()
            .await;
        assert!(matches!(result, Err(DocumentStoreError::Initialization(_))));
    }
}
