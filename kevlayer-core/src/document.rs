//! The document model: typed instances over a schema, bound to a backend.
//!
//! A [`Document`] holds raw field values (`data`), the last persisted prepared
//! record, its identity once saved, and the list of index keys it owes removal
//! of on its next save. Field writes route through [`Document::set_raw`], which
//! compares the new value against the last *persisted* value of an indexed
//! property and tracks the stale index key.
//!
//! Document types are declared with the [`document!`](crate::document!) macro,
//! which builds the schema once and generates a typed [`Field`] handle per
//! property:
//!
//! ```ignore
//! use kevlayer::prelude::*;
//!
//! document! {
//!     pub struct Company {
//!         name: String = Property::char().required().unique(),
//!         city: String = Property::char().index(),
//!     }
//! }
//!
//! let companies = store.collection::<Company>()?;
//! let mut goo = companies.create(doc! { "name": "Goo and Sons", "city": "Durham" }).await?;
//! goo.set(Company::city, "Charlotte");
//! goo.save().await?;
//! ```

use bson::Bson;
use std::{fmt, marker::PhantomData};
use tracing::debug;

use crate::{
    backend::{DOC_TYPE_FIELD, DynStoreBackend, ID_FIELD, Record},
    error::{DocumentStoreError, DocumentStoreResult, ValidationError},
    query::QuerySet,
    schema::Schema,
    value::{NativeType, Value},
};

/// A declared document type. Implemented by the [`document!`](crate::document!) macro.
pub trait DocumentType: Send + Sync + 'static {
    /// The type's schema, built once on first access.
    fn schema() -> &'static Schema;
}

/// A typed handle to one declared field.
pub struct Field<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Field<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for Field<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Field<T> {}

impl<T> fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Field").field(&self.name).finish()
    }
}

/// Declares a document type.
///
/// ```ignore
/// document! {
///     /// A company listing.
///     pub struct Company: BaseDocument as "company" in "s3" {
///         slug: String = Property::slug().unique(),
///         city: String = Property::char().index(),
///     }
/// }
/// ```
///
/// `: Parent` inherits the parent's properties, `as "..."` overrides the
/// `_doc_type` tag and `in "..."` binds the type to a logical database label.
#[macro_export]
macro_rules! document {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident $(: $parent:ident)? $(as $doc_type:literal)? $(in $db:literal)? {
            $($field:ident : $ty:ty = $prop:expr),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default)]
        $vis struct $name;

        impl $crate::document::DocumentType for $name {
            fn schema() -> &'static $crate::schema::Schema {
                static SCHEMA: ::std::sync::LazyLock<$crate::schema::Schema> = ::std::sync::LazyLock::new(|| {
                    let builder = $crate::schema::Schema::builder(stringify!($name));
                    $(let builder = builder.extends(<$parent as $crate::document::DocumentType>::schema());)?
                    $(let builder = builder.doc_type($doc_type);)?
                    $(let builder = builder.use_db($db);)?
                    $(let builder = builder.property(stringify!($field), $prop);)*
                    builder.build()
                });
                &SCHEMA
            }
        }

        #[allow(non_upper_case_globals, dead_code)]
        impl $name {
            $(pub const $field: $crate::document::Field<$ty> = $crate::document::Field::new(stringify!($field));)*
        }
    };
}

/// A document instance bound to a backend.
pub struct Document<'a, D: DocumentType> {
    backend: &'a dyn DynStoreBackend,
    data: Record,
    persisted: Record,
    id: Option<String>,
    pending: Vec<String>,
    _marker: PhantomData<D>,
}

impl<'a, D: DocumentType> Document<'a, D> {
    /// Builds an unsaved instance from raw field values, filling declared
    /// properties that are absent with their defaults.
    pub fn new(backend: &'a dyn DynStoreBackend, fields: Record) -> Self {
        let mut data = fields;
        for (name, prop) in D::schema().properties() {
            if matches!(data.get(name), None | Some(Bson::Null)) {
                data.insert(name, Bson::from(prop.default_for()));
            }
        }

        Self {
            backend,
            data,
            persisted: Record::new(),
            id: None,
            pending: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Rehydrates an instance from a stored record.
    pub fn from_record(backend: &'a dyn DynStoreBackend, record: Record) -> Self {
        let id = record
            .get_str(ID_FIELD)
            .ok()
            .map(str::to_string);
        let data = strip_reserved(&record);

        Self {
            backend,
            data,
            persisted: record,
            id,
            pending: Vec::new(),
            _marker: PhantomData,
        }
    }

    pub fn schema(&self) -> &'static Schema {
        D::schema()
    }

    /// The fully-qualified id, present once saved.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// The short id, present once saved.
    pub fn pk(&self) -> Option<&str> {
        self.id
            .as_deref()
            .map(|id| self.backend.parse_id(id))
    }

    pub fn is_saved(&self) -> bool {
        self.id.is_some()
    }

    /// Raw field values as last written.
    pub fn data(&self) -> &Record {
        &self.data
    }

    /// Index keys owed removal on the next save.
    pub fn pending_index_changes(&self) -> &[String] {
        &self.pending
    }

    pub fn get_raw(&self, name: &str) -> Option<&Bson> {
        self.data.get(name)
    }

    /// Reads a field as its native value. Undeclared fields are returned
    /// uncoerced.
    pub fn value(&self, name: &str) -> DocumentStoreResult<Value> {
        let raw = self.data.get(name).unwrap_or(&Bson::Null);
        match D::schema().property(name) {
            Some(prop) => prop.to_native(raw),
            None => Ok(Value::from(raw)),
        }
    }

    /// Reads a typed field. `None` when the field is null.
    pub fn get<T: NativeType>(&self, field: Field<T>) -> DocumentStoreResult<Option<T>> {
        match self.value(field.name())? {
            Value::Null => Ok(None),
            value => T::from_value(value.clone())
                .map(Some)
                .ok_or_else(|| {
                    DocumentStoreError::InvalidDocument(format!(
                        "Field '{}' holds {value:?}, which does not fit the requested type",
                        field.name()
                    ))
                }),
        }
    }

    /// Writes a typed field.
    pub fn set<T: NativeType>(&mut self, field: Field<T>, value: impl Into<T>) {
        let value: Value = value.into().into();
        self.set_raw(field.name(), Bson::from(value));
    }

    /// Writes a raw field value, tracking the stale index key when an indexed
    /// property moves away from its last persisted value.
    pub fn set_raw(&mut self, name: &str, value: impl Into<Bson>) {
        let value = value.into();

        if let Some(prop) = D::schema()
            .property(name)
            .filter(|prop| prop.is_indexed())
        {
            let persisted = self
                .persisted
                .get(name)
                .filter(|old| !matches!(old, Bson::Null));

            if let Some(old) = persisted {
                let schema = D::schema();
                let old_key = self.backend.index_key(schema, name, old).key;
                let new_key = prop
                    .to_native(&value)
                    .and_then(|native| prop.to_storage(&native))
                    .ok()
                    .filter(|stored| !matches!(stored, Bson::Null))
                    .map(|stored| self.backend.index_key(schema, name, &stored).key);

                if new_key.as_deref() == Some(old_key.as_str()) {
                    self.pending.retain(|key| *key != old_key);
                } else if !self.pending.contains(&old_key) {
                    self.pending.push(old_key);
                }
            }
        }

        self.data.insert(name, value);
    }

    /// The last persisted prepared record, including `_id` and `_doc_type`.
    pub fn prepared_record(&self) -> &Record {
        &self.persisted
    }

    /// The prepared record with `_id` stripped, as consumed by backups.
    pub fn to_backup_record(&self) -> Record {
        let mut record = self.persisted.clone();
        record.remove(ID_FIELD);
        record
    }

    /// Runs every declared property through coerce, validate, uniqueness check
    /// and serialize, then upserts the record and reconciles its indexes.
    pub async fn save(&mut self) -> DocumentStoreResult<()> {
        let schema = D::schema();
        let mut record = Record::new();

        for (name, prop) in schema.properties() {
            let native = if prop.is_auto_now() {
                prop.now()
            } else {
                match self.data.get(name) {
                    None | Some(Bson::Null) => prop.coerce(&Bson::from(prop.default_for())),
                    Some(raw) => prop.coerce(raw),
                }
            };

            prop.validate(&native, name)?;

            if prop.is_unique() && !native.is_null() {
                self.check_unique(name, &native).await?;
            }

            record.insert(name, prop.to_storage(&native)?);
        }

        let doc_id = match &self.id {
            Some(id) => id.clone(),
            None => self.backend.create_id(schema, &record).await?,
        };
        record.insert(ID_FIELD, doc_id.as_str());
        record.insert(DOC_TYPE_FIELD, schema.doc_type());

        let owned: Vec<String> = self
            .backend
            .index_keys(schema, &record)
            .into_iter()
            .map(|index| index.key)
            .collect();

        let mut stale: Vec<String> = Vec::new();
        let previous = self
            .backend
            .index_keys(schema, &self.persisted)
            .into_iter()
            .map(|index| index.key);
        for key in self.pending.iter().cloned().chain(previous) {
            if !owned.contains(&key) && !stale.contains(&key) {
                stale.push(key);
            }
        }

        debug!(
            collection = schema.collection(),
            id = %doc_id,
            stale = stale.len(),
            "saving document"
        );
        self.backend
            .save(schema, &record, &stale)
            .await?;

        self.id = Some(doc_id);
        self.pending.clear();
        self.data = strip_reserved(&record);
        self.persisted = record;

        Ok(())
    }

    /// Deletes the record and every index entry it owns.
    pub async fn delete(&mut self) -> DocumentStoreResult<()> {
        let schema = D::schema();
        let doc_id = self
            .id
            .clone()
            .ok_or_else(|| DocumentStoreError::InvalidDocument("Cannot delete a document that was never saved".into()))?;

        let mut keys: Vec<String> = self
            .backend
            .index_keys(schema, &self.persisted)
            .into_iter()
            .map(|index| index.key)
            .collect();
        keys.extend(self.pending.iter().cloned());
        keys.extend(
            self.backend
                .index_keys(schema, &self.live_record())
                .into_iter()
                .map(|index| index.key),
        );
        keys.sort();
        keys.dedup();

        debug!(collection = schema.collection(), id = %doc_id, indexes = keys.len(), "deleting document");
        self.backend
            .delete(schema, &doc_id, &keys)
            .await?;

        self.id = None;
        self.pending.clear();
        self.persisted = Record::new();

        Ok(())
    }

    /// The in-memory data in storage shape, for index keys that were written
    /// but never saved. Values that do not coerce are left out.
    fn live_record(&self) -> Record {
        let mut live = Record::new();
        for (name, prop) in D::schema().indexed() {
            let stored = self
                .data
                .get(name)
                .and_then(|raw| prop.to_native(raw).ok())
                .and_then(|native| prop.to_storage(&native).ok());
            if let Some(stored) = stored {
                live.insert(name, stored);
            }
        }
        live
    }

    async fn check_unique(&self, name: &str, native: &Value) -> DocumentStoreResult<()> {
        let mut matches = QuerySet::<D>::new(self.backend).filter([(name, Bson::from(native.clone()))]);

        let conflict = match matches.fetch().await? {
            [] => false,
            [only] => only.id() != self.id(),
            _ => true,
        };

        if conflict {
            return Err(ValidationError::new(
                name,
                format!("{name}: There is already a {name} with the value of {native}"),
            )
            .into());
        }

        Ok(())
    }
}

impl<D: DocumentType> fmt::Debug for Document<'_, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("type", &D::schema().type_name())
            .field("id", &self.id)
            .field("data", &self.data)
            .field("pending", &self.pending)
            .finish()
    }
}

fn strip_reserved(record: &Record) -> Record {
    record
        .iter()
        .filter(|(key, _)| key.as_str() != ID_FIELD && key.as_str() != DOC_TYPE_FIELD)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{property::Property, test_support::NullBackend};
    use bson::doc;

    crate::document! {
        pub struct Listing {
            name: String = Property::char().required().unique(),
            city: String = Property::char().index(),
            is_active: bool = Property::boolean().default_value(true),
            gpa: f64 = Property::float(),
        }
    }

    crate::document! {
        pub struct SluggedListing: Listing as "Slugged" in "s3" {
            slug: String = Property::slug().unique(),
        }
    }

    fn persisted<'a>(backend: &'a NullBackend, city: &str) -> Document<'a, Listing> {
        Document::from_record(
            backend,
            doc! {
                "_id": "redis:listing:id:1",
                "_doc_type": "Listing",
                "name": "Goo and Sons",
                "city": city,
                "is_active": 1,
                "gpa": 3.0,
            },
        )
    }

    #[test]
    fn test_macro_schema() {
        let schema = SluggedListing::schema();
        assert_eq!(schema.field_names().collect::<Vec<_>>(), ["name", "city", "is_active", "gpa", "slug"]);
        assert_eq!(schema.doc_type(), "Slugged");
        assert_eq!(schema.database(), "s3");
        assert_eq!(schema.collection(), "sluggedlisting");
        assert_eq!(SluggedListing::slug.name(), "slug");
    }

    #[test]
    fn test_defaults_applied_at_construction() {
        let backend = NullBackend;
        let listing = Document::<Listing>::new(&backend, doc! { "name": "Goo and Sons" });
        assert_eq!(listing.get(Listing::is_active).unwrap(), Some(true));
        assert_eq!(listing.get(Listing::gpa).unwrap(), None);
        assert!(!listing.is_saved());
    }

    #[test]
    fn test_typed_access_from_storage_shape() {
        let backend = NullBackend;
        let listing = persisted(&backend, "Durham");
        assert_eq!(listing.get(Listing::name).unwrap().as_deref(), Some("Goo and Sons"));
        assert_eq!(listing.get(Listing::is_active).unwrap(), Some(true));
        assert_eq!(listing.get(Listing::gpa).unwrap(), Some(3.0));
        assert_eq!(listing.pk(), Some("1"));
        assert!(listing.data().get("_id").is_none());
    }

    #[test]
    fn test_set_tracks_old_index_key_once() {
        let backend = NullBackend;
        let mut listing = persisted(&backend, "Durham");

        listing.set(Listing::city, "Charlotte");
        listing.set(Listing::city, "Raleigh");
        assert_eq!(listing.pending_index_changes(), ["null:listing:indexes:city:durham"]);
    }

    #[test]
    fn test_writing_back_persisted_value_cancels_change() {
        let backend = NullBackend;
        let mut listing = persisted(&backend, "Durham");

        listing.set(Listing::city, "Charlotte");
        listing.set(Listing::city, "DURHAM");
        assert!(listing.pending_index_changes().is_empty());
    }

    #[test]
    fn test_unindexed_and_unsaved_fields_are_not_tracked() {
        let backend = NullBackend;
        let mut listing = persisted(&backend, "Durham");
        listing.set(Listing::gpa, 3.9);
        assert!(listing.pending_index_changes().is_empty());

        let mut fresh = Document::<Listing>::new(&backend, doc! { "name": "Great Mountain" });
        fresh.set(Listing::city, "Charlotte");
        assert!(fresh.pending_index_changes().is_empty());
    }

    #[test]
    fn test_backup_record_strips_id() {
        let backend = NullBackend;
        let listing = persisted(&backend, "Durham");
        let backup = listing.to_backup_record();
        assert!(backup.get("_id").is_none());
        assert_eq!(backup.get_str("_doc_type").unwrap(), "Listing");
    }
}
