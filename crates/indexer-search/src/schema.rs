//! Schema handle with the key field used for updates and deletes.
//!
//! The field layout itself belongs to the caller; this module only pins down
//! which field addresses a document by key. A small default layout is
//! provided for the bundled source routine and tests:
//! - id: STRING | STORED - document key
//! - body: TEXT | STORED - searchable content
//! - tags: STRING | STORED - exact-match labels (multi-valued)

use tantivy::schema::{Field, Schema, STORED, STRING, TEXT};

use crate::SearchError;

/// Name of the key field in the default schema.
pub const DEFAULT_KEY_FIELD: &str = "id";

/// Tantivy schema plus the field that keys documents.
#[derive(Debug, Clone)]
pub struct IndexSchema {
    schema: Schema,
    /// Key field (must be indexed, typically STRING | STORED)
    pub key: Field,
}

impl IndexSchema {
    /// Wrap a schema, resolving its key field.
    ///
    /// # Errors
    ///
    /// Returns `SearchError::SchemaMismatch` if the field is missing or not
    /// indexed (deletes by key would silently match nothing).
    pub fn from_schema(schema: Schema, key_field: &str) -> Result<Self, SearchError> {
        let key = schema
            .get_field(key_field)
            .map_err(|_| SearchError::SchemaMismatch(format!("missing {} field", key_field)))?;

        if !schema.get_field_entry(key).is_indexed() {
            return Err(SearchError::SchemaMismatch(format!(
                "key field {} is not indexed",
                key_field
            )));
        }

        Ok(Self { schema, key })
    }

    /// Get the underlying Tantivy schema
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Result<Field, SearchError> {
        self.schema
            .get_field(name)
            .map_err(|_| SearchError::SchemaMismatch(format!("missing {} field", name)))
    }

    pub fn key_name(&self) -> &str {
        self.schema.get_field_name(self.key)
    }
}

/// Build the default schema.
pub fn default_schema() -> IndexSchema {
    let mut schema_builder = Schema::builder();

    let key = schema_builder.add_text_field(DEFAULT_KEY_FIELD, STRING | STORED);
    schema_builder.add_text_field("body", TEXT | STORED);
    schema_builder.add_text_field("tags", STRING | STORED);

    IndexSchema {
        schema: schema_builder.build(),
        key,
    }
}
