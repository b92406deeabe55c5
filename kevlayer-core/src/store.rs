//! The document store registry.
//!
//! A [`DocumentStore`] maps logical database labels to backend instances. It is
//! built once at startup and passed by reference to whoever needs a
//! [`Collection`]; each document type picks its backend through the label in
//! its schema (`"default"` unless declared otherwise).
//!
//! # Example
//!
//! ```ignore
//! use kevlayer::prelude::*;
//!
//! let store = DocumentStore::builder()
//!     .database("default", redis_backend)
//!     .database("s3", s3_backend)
//!     .build();
//!
//! let companies = store.collection::<Company>()?;
//! store.shutdown().await?;
//! ```

use std::collections::BTreeMap;
use tracing::debug;

use crate::{
    backend::{DynStoreBackend, StoreBackend},
    collection::Collection,
    document::DocumentType,
    error::{DocumentStoreError, DocumentStoreResult},
};

/// Logical database labels mapped to backends.
#[derive(Debug, Default)]
pub struct DocumentStore {
    databases: BTreeMap<String, Box<dyn DynStoreBackend>>,
}

impl DocumentStore {
    pub fn builder() -> DocumentStoreBuilder {
        DocumentStoreBuilder::default()
    }

    /// The backend registered under `label`.
    ///
    /// # Errors
    ///
    /// Returns an `Initialization` error when no backend carries that label.
    pub fn backend(&self, label: &str) -> DocumentStoreResult<&dyn DynStoreBackend> {
        self.databases
            .get(label)
            .map(|backend| &**backend)
            .ok_or_else(|| DocumentStoreError::Initialization(format!("No database registered under '{label}'")))
    }

    /// Downcasts the backend registered under `label` to its concrete type.
    pub fn backend_as<B: StoreBackend + 'static>(&self, label: &str) -> Option<&B> {
        self.databases
            .get(label)
            .and_then(|backend| backend.as_any().downcast_ref::<B>())
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.databases.keys().map(String::as_str)
    }

    /// A collection handle for `D`, bound to the backend its schema names.
    pub fn collection<D: DocumentType>(&self) -> DocumentStoreResult<Collection<'_, D>> {
        let backend = self.backend(D::schema().database())?;
        Ok(Collection::new(backend))
    }

    /// Flushes every registered backend.
    pub async fn flush_all(&self) -> DocumentStoreResult<()> {
        for (label, backend) in &self.databases {
            debug!(database = %label, "flushing backend");
            backend.flush().await?;
        }
        Ok(())
    }

    /// Shuts every backend down, consuming the store.
    pub async fn shutdown(self) -> DocumentStoreResult<()> {
        for (label, backend) in self.databases {
            debug!(database = %label, "shutting down backend");
            backend.shutdown_boxed().await?;
        }
        Ok(())
    }
}

/// Builds a [`DocumentStore`].
#[derive(Debug, Default)]
pub struct DocumentStoreBuilder {
    databases: BTreeMap<String, Box<dyn DynStoreBackend>>,
}

impl DocumentStoreBuilder {
    /// Registers a backend under `label`, replacing any earlier registration.
    pub fn database<B: StoreBackend + 'static>(self, label: impl Into<String>, backend: B) -> Self {
        self.boxed_database(label, Box::new(backend))
    }

    pub fn boxed_database(mut self, label: impl Into<String>, backend: Box<dyn DynStoreBackend>) -> Self {
        self.databases.insert(label.into(), backend);
        self
    }

    pub fn build(self) -> DocumentStore {
        DocumentStore {
            databases: self.databases,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{property::Property, test_support::NullBackend};

    crate::document! {
        pub struct Widget {
            name: String = Property::char(),
        }
    }

    crate::document! {
        pub struct Archived in "archive" {
            name: String = Property::char(),
        }
    }

    #[test]
    fn test_collection_resolves_by_label() {
        let store = DocumentStore::builder()
            .database("default", NullBackend)
            .build();

        let widgets = store.collection::<Widget>().unwrap();
        assert_eq!(widgets.name(), "widget");
        assert_eq!(widgets.backend().backend_id(), "null");

        let err = store.collection::<Archived>().unwrap_err();
        assert!(matches!(err, DocumentStoreError::Initialization(_)));
    }

    #[test]
    fn test_backend_downcast() {
        let store = DocumentStore::builder()
            .database("default", NullBackend)
            .build();
        assert!(store.backend_as::<NullBackend>("default").is_some());
        assert_eq!(store.labels().collect::<Vec<_>>(), ["default"]);
    }

    #[tokio::test]
    async fn test_shutdown_consumes_backends() {
        let store = DocumentStore::builder()
            .database("default", NullBackend)
            .database("archive", NullBackend)
            .build();
        store.flush_all().await.unwrap();
        store.shutdown().await.unwrap();
    }
}
