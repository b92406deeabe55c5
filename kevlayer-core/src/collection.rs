//! Typed collection handles.
//!
//! A [`Collection`] binds a document type to the backend registered for its
//! database label. It is the entry point for creating, fetching and querying
//! documents of that type.
//!
//! # Example
//!
//! ```ignore
//! use kevlayer::prelude::*;
//!
//! # async fn example(store: &DocumentStore) -> DocumentStoreResult<()> {
//! let companies = store.collection::<Company>()?;
//!
//! let goo = companies
//!     .create(doc! { "name": "Goo and Sons", "city": "Durham" })
//!     .await?;
//!
//! let same = companies.get(goo.pk().unwrap_or_default()).await?;
//! let durham = companies.objects().filter([("city", "Durham")]).into_vec().await?;
//! # Ok(())
//! # }
//! ```

use bson::Bson;
use std::{fmt, marker::PhantomData};

use crate::{
    backend::{DynStoreBackend, Record},
    document::{Document, DocumentType},
    error::DocumentStoreResult,
    query::QuerySet,
};

/// A handle to the collection of one document type.
pub struct Collection<'a, D: DocumentType> {
    backend: &'a dyn DynStoreBackend,
    _marker: PhantomData<D>,
}

impl<'a, D: DocumentType> Collection<'a, D> {
    pub fn new(backend: &'a dyn DynStoreBackend) -> Self {
        Self {
            backend,
            _marker: PhantomData,
        }
    }

    /// Returns the collection name.
    pub fn name(&self) -> &'static str {
        D::schema().collection()
    }

    pub fn backend(&self) -> &'a dyn DynStoreBackend {
        self.backend
    }

    /// Builds an unsaved document. Absent declared fields take their defaults.
    pub fn new_document(&self, fields: Record) -> Document<'a, D> {
        Document::new(self.backend, fields)
    }

    /// Builds and saves a document.
    ///
    /// # Errors
    ///
    /// Returns the first validation or uniqueness failure, or the backend error.
    pub async fn create(&self, fields: Record) -> DocumentStoreResult<Document<'a, D>> {
        let mut document = self.new_document(fields);
        document.save().await?;
        Ok(document)
    }

    /// Fetches a document by short or fully-qualified id.
    ///
    /// # Errors
    ///
    /// Returns `DocumentNotFound` when no record exists under that id.
    pub async fn get(&self, id: &str) -> DocumentStoreResult<Document<'a, D>> {
        let schema = D::schema();
        let doc_id = self.backend.doc_id(schema, id);
        let record = self.backend.get(schema, &doc_id).await?;
        Ok(Document::from_record(self.backend, record))
    }

    /// An unconstrained query over this collection.
    pub fn objects(&self) -> QuerySet<'a, D> {
        QuerySet::new(self.backend)
    }

    pub fn filter<I, K, V>(&self, constraints: I) -> QuerySet<'a, D>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Bson>,
    {
        self.objects().filter(constraints)
    }

    /// Glob lookups on indexed fields. See [`QuerySet::matching`].
    pub fn matching<I, K, V>(&self, patterns: I) -> QuerySet<'a, D>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.objects().matching(patterns)
    }

    /// Enumerates the collection through a `skip`/`limit` window.
    pub fn all(&self, skip: i64, limit: Option<i64>) -> QuerySet<'a, D> {
        self.objects().all(skip, limit)
    }

    /// Provisions the backend's native indexes for this document type.
    pub async fn ensure_indexes(&self) -> DocumentStoreResult<()> {
        self.backend.ensure_indexes(D::schema()).await
    }

    /// Removes every key written by this collection's backend.
    pub async fn flush(&self) -> DocumentStoreResult<()> {
        self.backend.flush().await
    }
}

impl<D: DocumentType> fmt::Debug for Collection<'_, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name())
            .field("backend", &self.backend.backend_id())
            .finish()
    }
}
