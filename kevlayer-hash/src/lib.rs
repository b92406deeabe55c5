//! Set-index storage backend for kevlayer.
//!
//! This crate maps documents onto a hash-table-like store (Redis and friends)
//! that has no secondary indexes of its own. Records are hashes; every
//! `(property, value)` pair gets an unordered set of record ids, kept in sync on
//! each save and delete through a single pipelined batch.
//!
//! # Features
//!
//! - **Counter ids** - `{backend}:{collection}:id:{n}` from an atomic counter
//! - **Set intersection** - multi-field filters intersect index sets
//! - **Wildcards** - `*`/`?` values expand through a key scan into a union
//! - **In-process client** - [`MemoryHashClient`] for development and tests
//!
//! # Quick Start
//!
//! ```ignore
//! use kevlayer::prelude::*;
//! use kevlayer_hash::{MemoryHashClient, SetIndexBackend};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = SetIndexBackend::builder(MemoryHashClient::new())
//!         .backend_id("redis")
//!         .build()
//!         .await?;
//!
//!     let store = DocumentStore::builder()
//!         .database("default", backend)
//!         .build();
//!
//!     let companies = store.collection::<Company>()?;
//!     companies.create(doc! { "name": "Goo and Sons", "city": "Durham" }).await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as kevlayer_hash;

pub mod client;
pub mod memory;
pub mod store;

pub use client::{HashClient, HashCommand};
pub use memory::MemoryHashClient;
pub use store::{SetIndexBackend, SetIndexBackendBuilder};
