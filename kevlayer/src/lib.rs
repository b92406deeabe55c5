//! A schema-typed document mapper with emulated secondary indexes over
//! key-value stores.
//!
//! This crate is the entry point of the kevlayer workspace. It re-exports the
//! core document model and the storage backends, and adds declarative database
//! configuration and backup/restore helpers.
//!
//! # Features
//!
//! - **Typed documents** - declare properties once with [`document!`], read and
//!   write them through typed field handles
//! - **Validation** - required, type, length, value and uniqueness checks run on
//!   every save
//! - **Emulated indexes** - equality lookups on indexed properties over stores
//!   that have no secondary indexes of their own
//! - **Lazy queries** - chain `filter`, `sort_by` and `all(skip, limit)`; nothing
//!   touches the store until the results are read
//!
//! # Quick Start
//!
//! ```ignore
//! use kevlayer::{prelude::*, hash::{MemoryHashClient, SetIndexBackend}};
//!
//! document! {
//!     pub struct Company {
//!         name: String = Property::char().required().unique().min_length(5).max_length(20),
//!         city: String = Property::char().index(),
//!         gpa: f64 = Property::float(),
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> DocumentStoreResult<()> {
//!     let backend = SetIndexBackend::builder(MemoryHashClient::new()).build().await?;
//!     let store = DocumentStore::builder().database("default", backend).build();
//!
//!     let companies = store.collection::<Company>()?;
//!     companies.create(doc! { "name": "Goo and Sons", "city": "Durham", "gpa": 3.0 }).await?;
//!     companies.create(doc! { "name": "Lakewoood YMCA", "city": "Durham", "gpa": 3.2 }).await?;
//!
//!     let durham = companies
//!         .filter([("city", "durham")])
//!         .sort_by("gpa", true)
//!         .into_vec()
//!         .await?;
//!     assert_eq!(durham[0].get(Company::name)?.as_deref(), Some("Lakewoood YMCA"));
//!
//!     store.shutdown().await
//! }
//! ```
//!
//! # Configuration
//!
//! A [`DatabasesConfig`](config::DatabasesConfig) describes every logical
//! database in JSON and builds the matching [`DocumentStore`](store::DocumentStore):
//!
//! ```ignore
//! let store = DatabasesConfig::from_json(r#"{
//!     "default": { "backend": "set_index", "backend_id": "redis" },
//!     "s3": { "backend": "prefix_index", "bucket": "kev-test" }
//! }"#)?
//! .build()
//! .await?;
//! ```
//!
//! # Backends
//!
//! - [`hash`] - set-index backend over hash-table stores (requires `hash` feature)
//! - [`object`] - prefix-index backend over object stores (requires `object` feature)
//! - [`table`] - native-index backend over partitioned table stores (requires `table` feature)
//! - [`hybrid`] - object-store blobs with hash-store index sets (requires `hybrid` feature)

pub mod backup;
pub mod config;
pub mod prelude;

pub use kevlayer_core::{
    backend, collection, document, error, identity, page, property, query, schema, store, validator, value,
};

// Re-export BSON types for convenience
pub use bson;

/// Set-index backend over hash-table stores.
#[cfg(feature = "hash")]
pub mod hash {
    pub use kevlayer_hash::{HashClient, HashCommand, MemoryHashClient, SetIndexBackend, SetIndexBackendBuilder};
}

/// Prefix-index backend over object stores.
#[cfg(feature = "object")]
pub mod object {
    pub use kevlayer_object::{ListPage, MemoryObjectClient, ObjectClient, PrefixIndexBackend, PrefixIndexBackendBuilder};
}

/// Native-index backend over partitioned table stores.
#[cfg(feature = "table")]
pub mod table {
    pub use kevlayer_table::{MemoryTableClient, NativeIndexBackend, NativeIndexBackendBuilder, TableClient, TableDescription};
}

/// Hybrid backend: object-store blobs indexed through hash-store sets.
#[cfg(feature = "hybrid")]
pub mod hybrid {
    pub use kevlayer_hybrid::{HybridIndexBackend, HybridIndexBackendBuilder};
}
