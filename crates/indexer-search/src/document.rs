//! Document mapping from source records to Tantivy documents.
//!
//! Works against the default schema layout (`id`, `body`, `tags`).

use serde::{Deserialize, Serialize};
use tantivy::doc;
use tantivy::TantivyDocument;

use crate::error::SearchError;
use crate::schema::IndexSchema;

/// One record of a JSON-lines source feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Document key
    pub id: String,

    #[serde(default)]
    pub body: String,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Tombstone: remove the document with this key
    #[serde(default)]
    pub deleted: bool,
}

impl SourceRecord {
    pub fn new(id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            body: body.into(),
            tags: Vec::new(),
            deleted: false,
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn tombstone(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            body: String::new(),
            tags: Vec::new(),
            deleted: true,
        }
    }

    /// Convert to a Tantivy document.
    pub fn to_document(&self, schema: &IndexSchema) -> Result<TantivyDocument, SearchError> {
        build_document(schema, &self.id, &self.body, &self.tags)
    }
}

/// Build a document for the default layout.
///
/// Tags are added one value each so term filters match them exactly.
pub fn build_document(
    schema: &IndexSchema,
    id: &str,
    body: &str,
    tags: &[String],
) -> Result<TantivyDocument, SearchError> {
    let body_field = schema.field("body")?;
    let tags_field = schema.field("tags")?;

    let mut doc = doc!(
        schema.key => id,
        body_field => body
    );
    for tag in tags {
        doc.add_text(tags_field, tag);
    }
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::default_schema;
    use tantivy::schema::{Schema, Value, STRING};

    #[test]
    fn test_build_document() {
        let schema = default_schema();
        let tags = vec!["odd".to_string(), "small".to_string()];
        let doc = build_document(&schema, "doc-1", "hello world", &tags).unwrap();

        let id = doc.get_first(schema.key).unwrap();
        assert_eq!(id.as_str(), Some("doc-1"));

        let body = doc.get_first(schema.field("body").unwrap()).unwrap();
        assert_eq!(body.as_str(), Some("hello world"));

        let values: Vec<_> = doc
            .get_all(schema.field("tags").unwrap())
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
        assert_eq!(values, tags);
    }

    #[test]
    fn test_build_document_requires_default_layout() {
        let mut builder = Schema::builder();
        builder.add_text_field("id", STRING);
        let schema = IndexSchema::from_schema(builder.build(), "id").unwrap();

        let result = build_document(&schema, "x", "y", &[]);
        assert!(matches!(result, Err(SearchError::SchemaMismatch(_))));
    }

    #[test]
    fn test_source_record_defaults() {
        let record: SourceRecord = serde_json::from_str(r#"{"id":"7"}"#).unwrap();
        assert_eq!(record.id, "7");
        assert!(record.body.is_empty());
        assert!(record.tags.is_empty());
        assert!(!record.deleted);
    }

    #[test]
    fn test_source_record_tombstone() {
        let record: SourceRecord =
            serde_json::from_str(r#"{"id":"7","deleted":true}"#).unwrap();
        assert_eq!(record, SourceRecord::tombstone("7"));
    }
}
