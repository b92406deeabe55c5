//! Convenient re-exports of commonly used types from kevlayer.
//!
//! ```ignore
//! use kevlayer::prelude::*;
//! ```
//!
//! This brings in the `document!` and `doc!` macros, the property builder, the
//! document store and collection handles, and the error types.

pub use kevlayer_core::{
    backend::{Record, StoreBackend, StoreBackendBuilder},
    collection::Collection,
    document,
    document::{Document, DocumentType, Field},
    error::{DocumentStoreError, DocumentStoreResult, ValidationError},
    property::{Property, PropertyKind},
    query::QuerySet,
    schema::Schema,
    store::DocumentStore,
    validator::Validator,
    value::Value,
};

pub use bson::doc;
