//! A schema-typed document mapper over key-value stores that have no secondary
//! indexes of their own.
//!
//! This crate is the core of the kevlayer project and provides:
//!
//! - **Property system** ([`property`], [`validator`], [`value`]) - Typed field descriptors with coercion, validation and defaults
//! - **Schemas** ([`schema`]) - Ordered, inherited property mappings per document type
//! - **Document model** ([`document`]) - Typed instances with index-change tracking and the save/delete pipelines
//! - **Query engine** ([`query`]) - Lazy, chainable filter/sort/pagination over a backend
//! - **Store backend abstraction** ([`backend`]) - The capability interface every storage variant implements
//! - **Identity formats** ([`identity`]) - Record id and index key layouts shared by every backend
//! - **Collections and registry** ([`collection`], [`store`]) - Label-based backend lookup and typed collection handles
//! - **Error handling** ([`error`]) - The error taxonomy and result type
//!
//! # Example
//!
//! ```ignore
//! use kevlayer::prelude::*;
//!
//! document! {
//!     pub struct TestDocument {
//!         name: String = Property::char().required().unique().min_length(5).max_length(20),
//!         is_active: bool = Property::boolean().default_value(true),
//!     }
//! }
//!
//! let docs = store.collection::<TestDocument>()?;
//! let doc = docs.create(doc! { "name": "Goo and Sons" }).await?;
//! assert_eq!(doc.get(TestDocument::is_active)?, Some(true));
//! ```

#[allow(unused_extern_crates)]
extern crate self as kevlayer_core;

pub mod backend;
pub mod collection;
pub mod document;
pub mod error;
pub mod identity;
pub mod page;
pub mod property;
pub mod query;
pub mod schema;
pub mod store;
pub mod validator;
pub mod value;

#[cfg(test)]
mod test_support;
