//! Native-index storage backend for kevlayer.
//!
//! This crate maps documents onto a partitioned table store (DynamoDB and
//! friends) whose own secondary indexes serve indexed properties. Index keys
//! keep their case because the store matches partition values exactly.
//!
//! # Features
//!
//! - **Native secondary indexes** - one per indexed property, provisioned by
//!   [`StoreBackend::ensure_indexes`](kevlayer_core::backend::StoreBackend::ensure_indexes)
//! - **Key condition plus post-filter** - the first filter reads an index, the
//!   rest narrow each page through a [`Condition`]
//! - **Paginated reads** - last-evaluated keys stay inside the returned streams
//! - **In-process client** - [`MemoryTableClient`] for development and tests
//!
//! # Example
//!
//! ```ignore
//! use kevlayer_table::{MemoryTableClient, NativeIndexBackend};
//! use kevlayer::backend::StoreBackendBuilder;
//!
//! let backend = NativeIndexBackend::builder(MemoryTableClient::new(), "kev")
//!     .create_table(true)
//!     .build()
//!     .await?;
//!
//! let store = DocumentStore::builder().database("default", backend).build();
//! store.collection::<Company>()?.ensure_indexes().await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as kevlayer_table;

pub mod client;
pub mod condition;
pub mod memory;
pub mod store;

pub use client::{ItemPage, KeyCondition, QueryRequest, SecondaryIndex, TableClient, TableDescription};
pub use condition::Condition;
pub use memory::MemoryTableClient;
pub use store::{NativeIndexBackend, NativeIndexBackendBuilder};
