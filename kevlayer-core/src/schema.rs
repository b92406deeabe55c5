//! Per-type document schemas.
//!
//! A [`Schema`] is the fixed, ordered mapping of declared properties for one
//! document type. It is assembled once through a [`SchemaBuilder`], merging the
//! type's own properties over those of an optional parent schema: inherited
//! properties come first, and an own property with an inherited name replaces
//! it in place.
//!
//! ```ignore
//! use kevlayer::{property::Property, schema::Schema};
//!
//! let base = Schema::builder("BaseDocument")
//!     .property("name", Property::char().required())
//!     .build();
//!
//! let company = Schema::builder("Company")
//!     .extends(&base)
//!     .property("city", Property::char().index())
//!     .build();
//!
//! assert_eq!(company.field_names().collect::<Vec<_>>(), ["name", "city"]);
//! assert_eq!(company.collection(), "company");
//! ```

use crate::property::Property;

/// The logical database label used when a schema does not name one.
pub const DEFAULT_DATABASE: &str = "default";

/// The declared shape of a document type. Immutable once built.
#[derive(Debug, Clone)]
pub struct Schema {
    type_name: String,
    collection: String,
    doc_type: String,
    database: String,
    properties: Vec<(String, Property)>,
}

impl Schema {
    pub fn builder(type_name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(type_name)
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The collection name, the lower-cased type name.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// The `_doc_type` tag written into every record.
    pub fn doc_type(&self) -> &str {
        &self.doc_type
    }

    /// The logical database label this type is bound to.
    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, prop)| prop)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.property(name).is_some()
    }

    /// Declared properties in declaration order, ancestors first.
    pub fn properties(&self) -> impl Iterator<Item = (&str, &Property)> {
        self.properties
            .iter()
            .map(|(name, prop)| (name.as_str(), prop))
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.properties
            .iter()
            .map(|(name, _)| name.as_str())
    }

    pub fn indexed(&self) -> impl Iterator<Item = (&str, &Property)> {
        self.properties()
            .filter(|(_, prop)| prop.is_indexed())
    }
}

/// Builds a [`Schema`].
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    type_name: String,
    doc_type: Option<String>,
    database: Option<String>,
    properties: Vec<(String, Property)>,
}

impl SchemaBuilder {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            doc_type: None,
            database: None,
            properties: Vec::new(),
        }
    }

    /// Inherits the parent's properties and database label. Properties already
    /// declared on this builder are re-applied on top of the inherited ones.
    pub fn extends(mut self, parent: &Schema) -> Self {
        let own = std::mem::take(&mut self.properties);
        self.properties = parent.properties.clone();
        for (name, prop) in own {
            self = self.property(name, prop);
        }
        if self.database.is_none() && parent.database != DEFAULT_DATABASE {
            self.database = Some(parent.database.clone());
        }
        self
    }

    /// Declares a property. Redeclaring a name replaces the earlier property
    /// without moving it.
    pub fn property(mut self, name: impl Into<String>, property: Property) -> Self {
        let name = name.into();
        match self
            .properties
            .iter_mut()
            .find(|(field, _)| *field == name)
        {
            Some(slot) => slot.1 = property,
            None => self.properties.push((name, property)),
        }
        self
    }

    pub fn doc_type(mut self, doc_type: impl Into<String>) -> Self {
        self.doc_type = Some(doc_type.into());
        self
    }

    pub fn use_db(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn build(self) -> Schema {
        Schema {
            collection: self.type_name.to_lowercase(),
            doc_type: self
                .doc_type
                .unwrap_or_else(|| self.type_name.clone()),
            database: self
                .database
                .unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            type_name: self.type_name,
            properties: self.properties,
        }
    }
}
