//! Hybrid storage backend for kevlayer.
//!
//! Records live as JSON blobs in an object store bucket while their index sets
//! live in a hash-table store. Lookups get the set-index backend's
//! intersections and pattern expansion, and large records stay out of the hash
//! store.
//!
//! ```ignore
//! use kevlayer_hash::MemoryHashClient;
//! use kevlayer_hybrid::HybridIndexBackend;
//! use kevlayer_object::MemoryObjectClient;
//!
//! let objects = MemoryObjectClient::new();
//! objects.create_bucket("kev-test").await;
//!
//! let backend = HybridIndexBackend::builder(MemoryHashClient::new(), objects, "kev-test")
//!     .backend_id("s3redis")
//!     .build()
//!     .await?;
//! ```

pub mod store;

pub use store::{HybridIndexBackend, HybridIndexBackendBuilder};
