//! In-memory document store
//!
//! Used in dev mode when MongoDB is unavailable, and by the test suite.
//! Documents live in a `DashMap` keyed by full path. Single-document writes
//! go straight to the map; batches hold the commit gate exclusively so no
//! reader observes half of a batch.

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use tokio::sync::RwLock;
use tracing::debug;

use super::store::{
    merge_fields, CollectionPath, DocPath, DocumentStore, FieldFilter, Fields, SetMode,
    StoredDoc, WriteBatch,
};
use crate::types::StoreError;

#[derive(Default)]
pub struct MemoryStore {
    docs: DashMap<DocPath, Fields>,
    commit_gate: RwLock<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents across all collections
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    fn apply(&self, path: &DocPath, fields: Fields, mode: SetMode) {
        match mode {
            SetMode::Overwrite => {
                self.docs.insert(path.clone(), fields);
            }
            SetMode::Merge => match self.docs.entry(path.clone()) {
                Entry::Occupied(mut existing) => merge_fields(existing.get_mut(), fields),
                Entry::Vacant(slot) => {
                    slot.insert(fields);
                }
            },
        }
    }

    fn collect_sorted<F>(&self, predicate: F, limit: Option<usize>) -> Vec<StoredDoc>
    where
        F: Fn(&DocPath, &Fields) -> bool,
    {
        let mut out: Vec<StoredDoc> = self
            .docs
            .iter()
            .filter(|entry| predicate(entry.key(), entry.value()))
            .map(|entry| StoredDoc {
                path: entry.key().clone(),
                fields: entry.value().clone(),
            })
            .collect();
        out.sort_by(|a, b| a.path.cmp(&b.path));
        if let Some(limit) = limit {
            out.truncate(limit);
        }
        out
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, path: &DocPath) -> Result<StoredDoc, StoreError> {
        let _gate = self.commit_gate.read().await;
        self.docs
            .get(path)
            .map(|entry| StoredDoc {
                path: path.clone(),
                fields: entry.value().clone(),
            })
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    async fn set(&self, path: &DocPath, fields: Fields, mode: SetMode) -> Result<(), StoreError> {
        let _gate = self.commit_gate.read().await;
        self.apply(path, fields, mode);
        Ok(())
    }

    async fn query(
        &self,
        collection: &CollectionPath,
        filter: Option<FieldFilter>,
        limit: Option<usize>,
    ) -> Result<Vec<StoredDoc>, StoreError> {
        let _gate = self.commit_gate.read().await;
        Ok(self.collect_sorted(
            |path, fields| {
                &path.parent() == collection
                    && filter.as_ref().map_or(true, |f| f.matches(fields))
            },
            limit,
        ))
    }

    async fn collection_group(
        &self,
        group: &str,
        filter: FieldFilter,
    ) -> Result<Vec<StoredDoc>, StoreError> {
        let _gate = self.commit_gate.read().await;
        Ok(self.collect_sorted(
            |path, fields| path.group() == group && filter.matches(fields),
            None,
        ))
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let _gate = self.commit_gate.write().await;
        debug!("Committing batch of {} writes", batch.len());
        for write in batch.into_writes() {
            self.apply(&write.path, write.fields, write.mode);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::to_fields;
    use serde_json::json;

    fn fields(value: serde_json::Value) -> Fields {
        to_fields(&value).unwrap()
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = MemoryStore::new();
        let path = DocPath::root("deals", "nope").unwrap();
        let err = store.get(&path).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_overwrite_and_merge() {
        let store = MemoryStore::new();
        let path = DocPath::root("deals", "d1").unwrap();

        store
            .set(&path, fields(json!({"a": 1, "b": 2})), SetMode::Overwrite)
            .await
            .unwrap();
        store
            .set(&path, fields(json!({"b": 3, "c": 4})), SetMode::Merge)
            .await
            .unwrap();
        let doc = store.get(&path).await.unwrap();
        assert_eq!(doc.fields, fields(json!({"a": 1, "b": 3, "c": 4})));

        store
            .set(&path, fields(json!({"z": 0})), SetMode::Overwrite)
            .await
            .unwrap();
        let doc = store.get(&path).await.unwrap();
        assert_eq!(doc.fields, fields(json!({"z": 0})));
    }

    #[tokio::test]
    async fn test_merge_creates_missing_document() {
        let store = MemoryStore::new();
        let path = DocPath::root("deals", "fresh").unwrap();
        store
            .set(&path, fields(json!({"stageStatus": "completed"})), SetMode::Merge)
            .await
            .unwrap();
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_query_is_scoped_to_collection() {
        let store = MemoryStore::new();
        let d1 = DocPath::root("deals", "d1").unwrap();
        let d2 = DocPath::root("deals", "d2").unwrap();
        let p1 = d1.collection("participants").unwrap().doc("p1").unwrap();
        let p2 = d2.collection("participants").unwrap().doc("p2").unwrap();

        for path in [&d1, &d2] {
            store
                .set(path, fields(json!({"creatorUid": "u1"})), SetMode::Overwrite)
                .await
                .unwrap();
        }
        for path in [&p1, &p2] {
            store
                .set(path, fields(json!({"userUid": "u9"})), SetMode::Overwrite)
                .await
                .unwrap();
        }

        let deals = CollectionPath::root("deals").unwrap();
        let all = store.query(&deals, None, None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id(), "d1");

        let parts = d1.collection("participants").unwrap();
        let found = store
            .query(&parts, Some(FieldFilter::eq("userUid", "u9")), Some(1))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, p1);

        let group = store
            .collection_group("participants", FieldFilter::eq("userUid", "u9"))
            .await
            .unwrap();
        assert_eq!(group.len(), 2);
        assert_eq!(group[1].path.parent().parent_doc(), Some(d2));
    }

    #[tokio::test]
    async fn test_commit_applies_all_writes() {
        let store = MemoryStore::new();
        let stages = DocPath::root("deals", "d1")
            .unwrap()
            .collection("stages")
            .unwrap();

        let mut batch = WriteBatch::new();
        for key in ["intake", "offer", "close"] {
            batch.set(
                stages.doc(key).unwrap(),
                fields(json!({"id": key})),
                SetMode::Overwrite,
            );
        }
        store.commit(batch).await.unwrap();

        let docs = store.query(&stages, None, None).await.unwrap();
        assert_eq!(docs.len(), 3);
    }
}
