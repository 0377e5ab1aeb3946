//! Document store abstraction
//!
//! The deal workflow only needs a handful of primitives from its database:
//! point reads, overwrite/merge writes, equality queries within one
//! collection, equality queries across every collection sharing a name
//! (collection-group queries) and atomic batches. Backends implement
//! [`DocumentStore`]; the workflow holds an `Arc<dyn DocumentStore>`.
//!
//! Documents are addressed Firestore-style by alternating collection and
//! document segments, e.g. `deals/abc123/stages/intake`.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use crate::types::StoreError;

/// Top-level fields of a stored document
pub type Fields = serde_json::Map<String, Value>;

/// Path to a single document: `col/id[/col/id...]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocPath(String);

/// Path to a collection: `col[/id/col...]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath(String);

fn valid_segment(segment: &str) -> bool {
    !segment.is_empty() && !segment.contains('/')
}

impl DocPath {
    /// Parse a document path. It must have an even, non-zero number of
    /// non-empty segments.
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        let segments: Vec<&str> = raw.split('/').collect();
        if segments.len() < 2 || segments.len() % 2 != 0 || segments.iter().any(|s| s.is_empty())
        {
            return Err(StoreError::InvalidPath(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    /// Document `id` in the root collection `collection`
    pub fn root(collection: &str, id: &str) -> Result<Self, StoreError> {
        CollectionPath::root(collection)?.doc(id)
    }

    /// Sub-collection of this document
    pub fn collection(&self, name: &str) -> Result<CollectionPath, StoreError> {
        if !valid_segment(name) {
            return Err(StoreError::InvalidPath(format!("{}/{}", self.0, name)));
        }
        Ok(CollectionPath(format!("{}/{}", self.0, name)))
    }

    /// Last segment: the document id
    pub fn id(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or_default()
    }

    /// Collection containing this document
    pub fn parent(&self) -> CollectionPath {
        let (parent, _) = self.0.rsplit_once('/').unwrap_or((self.0.as_str(), ""));
        CollectionPath(parent.to_string())
    }

    /// Name of the containing collection (the collection group)
    pub fn group(&self) -> &str {
        let mut segments = self.0.rsplit('/');
        segments.next();
        segments.next().unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl CollectionPath {
    /// A top-level collection
    pub fn root(name: &str) -> Result<Self, StoreError> {
        if !valid_segment(name) {
            return Err(StoreError::InvalidPath(name.to_string()));
        }
        Ok(Self(name.to_string()))
    }

    /// Document `id` inside this collection
    pub fn doc(&self, id: &str) -> Result<DocPath, StoreError> {
        if !valid_segment(id) {
            return Err(StoreError::InvalidPath(format!("{}/{}", self.0, id)));
        }
        Ok(DocPath(format!("{}/{}", self.0, id)))
    }

    /// Document owning this sub-collection, `None` for root collections
    pub fn parent_doc(&self) -> Option<DocPath> {
        self.0
            .rsplit_once('/')
            .map(|(parent, _)| DocPath(parent.to_string()))
    }

    /// Collection name (last segment)
    pub fn group(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a write combines with an existing document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetMode {
    /// Replace the whole document
    Overwrite,
    /// Overlay the given top-level fields, keeping the rest
    Merge,
}

/// Equality filter on one top-level field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub value: Value,
}

impl FieldFilter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, fields: &Fields) -> bool {
        fields.get(&self.field) == Some(&self.value)
    }
}

/// A document as read back from the store
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDoc {
    pub path: DocPath,
    pub fields: Fields,
}

impl StoredDoc {
    pub fn id(&self) -> &str {
        self.path.id()
    }

    /// Decode the fields into a typed entity
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        serde_json::from_value(Value::Object(self.fields.clone())).map_err(|e| {
            StoreError::Codec(format!("failed to decode {}: {}", self.path, e))
        })
    }
}

/// Encode a typed entity into top-level fields
pub fn to_fields<T: Serialize>(value: &T) -> Result<Fields, StoreError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Codec(format!(
            "expected an object, got {}",
            other
        ))),
    }
}

/// A single write inside a batch
#[derive(Debug, Clone)]
pub struct Write {
    pub path: DocPath,
    pub fields: Fields,
    pub mode: SetMode,
}

/// Set of writes applied all-or-nothing by [`DocumentStore::commit`]
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    writes: Vec<Write>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, path: DocPath, fields: Fields, mode: SetMode) -> &mut Self {
        self.writes.push(Write { path, fields, mode });
        self
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn into_writes(self) -> Vec<Write> {
        self.writes
    }
}

/// Overlay `update` onto `existing` (top-level merge)
pub fn merge_fields(existing: &mut Fields, update: Fields) {
    for (key, value) in update {
        existing.insert(key, value);
    }
}

/// Backend-agnostic document database
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Short backend name for logs and health output
    fn backend(&self) -> &'static str;

    /// Generate a fresh document id
    fn new_id(&self) -> String {
        Uuid::new_v4().simple().to_string()
    }

    /// Read one document; `StoreError::NotFound` when it does not exist
    async fn get(&self, path: &DocPath) -> Result<StoredDoc, StoreError>;

    /// Write one document
    async fn set(&self, path: &DocPath, fields: Fields, mode: SetMode) -> Result<(), StoreError>;

    /// Documents of one collection, optionally filtered by field equality.
    /// Results are ordered by path.
    async fn query(
        &self,
        collection: &CollectionPath,
        filter: Option<FieldFilter>,
        limit: Option<usize>,
    ) -> Result<Vec<StoredDoc>, StoreError>;

    /// Documents of every collection named `group`, filtered by field equality
    async fn collection_group(
        &self,
        group: &str,
        filter: FieldFilter,
    ) -> Result<Vec<StoredDoc>, StoreError>;

    /// Apply every write of the batch, or none of them
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_doc_path_parsing() {
        assert!(DocPath::parse("deals/abc").is_ok());
        assert!(DocPath::parse("deals/abc/stages/intake").is_ok());

        assert!(DocPath::parse("deals").is_err());
        assert!(DocPath::parse("deals/abc/stages").is_err());
        assert!(DocPath::parse("deals//stages/intake").is_err());
        assert!(DocPath::parse("").is_err());
    }

    #[test]
    fn test_path_navigation() {
        let deal = DocPath::root("deals", "abc").unwrap();
        let stages = deal.collection("stages").unwrap();
        let intake = stages.doc("intake").unwrap();

        assert_eq!(intake.as_str(), "deals/abc/stages/intake");
        assert_eq!(intake.id(), "intake");
        assert_eq!(intake.group(), "stages");
        assert_eq!(intake.parent(), stages);
        assert_eq!(stages.parent_doc(), Some(deal.clone()));
        assert_eq!(deal.group(), "deals");
        assert_eq!(deal.parent().parent_doc(), None);
    }

    #[test]
    fn test_segments_cannot_contain_slashes() {
        let deals = CollectionPath::root("deals").unwrap();
        assert!(deals.doc("a/b").is_err());
        assert!(deals.doc("").is_err());
        assert!(CollectionPath::root("deals/x").is_err());
    }

    #[test]
    fn test_merge_fields_overlays_top_level() {
        let mut existing = to_fields(&json!({"a": 1, "b": {"x": 1}})).unwrap();
        let update = to_fields(&json!({"b": {"y": 2}, "c": 3})).unwrap();
        merge_fields(&mut existing, update);

        assert_eq!(existing["a"], json!(1));
        assert_eq!(existing["b"], json!({"y": 2}));
        assert_eq!(existing["c"], json!(3));
    }

    #[test]
    fn test_to_fields_rejects_non_objects() {
        assert!(to_fields(&json!([1, 2, 3])).is_err());
        assert!(to_fields(&"plain").is_err());
    }

    #[test]
    fn test_field_filter() {
        let fields = to_fields(&json!({"userUid": "u1", "role": "buyer"})).unwrap();
        assert!(FieldFilter::eq("userUid", "u1").matches(&fields));
        assert!(!FieldFilter::eq("userUid", "u2").matches(&fields));
        assert!(!FieldFilter::eq("missing", "u1").matches(&fields));
    }
}
