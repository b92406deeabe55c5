//! Error types and result types for document mapper operations.
//!
//! Every fallible operation in the workspace returns [`DocumentStoreResult<T>`].
//! None of these errors are retried or recovered locally; they propagate
//! unchanged to the caller.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// A per-field validation failure raised by the save pipeline.
///
/// The message is already templated with the field name, e.g.
/// `"name: This value is required"`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ValidationError {
    /// The name of the property that failed validation.
    pub field: String,
    /// The human readable, deterministic message.
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Represents all possible errors that can occur when interacting with a document store.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// A property rejected its value during the save pipeline.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// A query returned zero or several results where exactly one was expected,
    /// or referenced a field the document does not declare.
    #[error("{0}")]
    Query(String),
    /// The requested document was not found in the collection.
    /// The first argument is the document ID, the second is the collection name.
    #[error("Document not found {0} in collection {1}")]
    DocumentNotFound(String, String),
    /// The wrapped store reported a missing or unusable resource (table, bucket).
    #[error("Resource error: {0}")]
    Resource(String),
    /// The caller asked for something the backend cannot express.
    /// Always raised before any I/O takes place.
    #[error("Usage error: {0}")]
    Usage(String),
    /// A storage-shaped value could not be parsed into its native type.
    #[error("Parse error: {0}")]
    Parse(String),
    /// Serialization/deserialization error when converting between record formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during store initialization or configuration.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// The record has an invalid structure.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// An error occurred in the underlying storage client.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// A specialized `Result` type for document store operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_displays_message_only() {
        let err: DocumentStoreError = ValidationError::new("name", "name: This value is required").into();
        assert_eq!(err.to_string(), "name: This value is required");
    }

    #[test]
    fn test_query_error_displays_message_only() {
        let err = DocumentStoreError::Query("This query did not return a result.".into());
        assert_eq!(err.to_string(), "This query did not return a result.");
    }
}
