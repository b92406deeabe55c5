//! Prefix-index storage backend for kevlayer.
//!
//! Records are JSON blobs in an object store (S3 and friends). Secondary
//! indexes are zero-byte marker objects whose key is the index key followed by
//! the record id, so resolving a lookup is a prefix listing.
//!
//! Only one `(property, value)` filter can be resolved per query. Listings are
//! paginated by the store; the continuation tokens stay inside the streams
//! returned by the backend.
//!
//! # Example
//!
//! ```ignore
//! use kevlayer_object::{MemoryObjectClient, PrefixIndexBackend};
//! use kevlayer::backend::StoreBackendBuilder;
//!
//! let client = MemoryObjectClient::new();
//! client.create_bucket("kev-test").await;
//!
//! let backend = PrefixIndexBackend::builder(client, "kev-test")
//!     .backend_id("s3")
//!     .build()
//!     .await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as kevlayer_object;

pub mod client;
pub mod memory;
pub mod store;

pub use client::{ListPage, ObjectClient};
pub use memory::MemoryObjectClient;
pub use store::{PrefixIndexBackend, PrefixIndexBackendBuilder};
