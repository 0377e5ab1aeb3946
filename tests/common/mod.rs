//! Shared fixtures for the integration suite

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use dealroom::db::{
    CollectionPath, DocPath, DocumentStore, FieldFilter, Fields, MemoryStore, SetMode,
    StoredDoc, WriteBatch,
};
use dealroom::deals::UserContext;
use dealroom::StoreError;

/// Store operation that can be made to fail
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Fault {
    /// Every batch commit
    Commit,
    /// Collection-group queries over the named group
    CollectionGroup(String),
    /// Queries on collections of the named group
    Query(String),
    /// Collection queries filtering on the named field
    QueryField(String),
    /// Single-document writes into collections of the named group
    Set(String),
}

/// In-memory store with switchable failures
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    faults: Mutex<HashSet<Fault>>,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, fault: Fault) {
        self.faults.lock().unwrap().insert(fault);
    }

    pub fn heal(&self) {
        self.faults.lock().unwrap().clear();
    }

    fn check(&self, fault: Fault) -> Result<(), StoreError> {
        if self.faults.lock().unwrap().contains(&fault) {
            return Err(StoreError::Backend(format!("injected failure: {:?}", fault)));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    fn backend(&self) -> &'static str {
        "flaky"
    }

    async fn get(&self, path: &DocPath) -> Result<StoredDoc, StoreError> {
        self.inner.get(path).await
    }

    async fn set(&self, path: &DocPath, fields: Fields, mode: SetMode) -> Result<(), StoreError> {
        self.check(Fault::Set(path.group().to_string()))?;
        self.inner.set(path, fields, mode).await
    }

    async fn query(
        &self,
        collection: &CollectionPath,
        filter: Option<FieldFilter>,
        limit: Option<usize>,
    ) -> Result<Vec<StoredDoc>, StoreError> {
        self.check(Fault::Query(collection.group().to_string()))?;
        if let Some(filter) = &filter {
            self.check(Fault::QueryField(filter.field.clone()))?;
        }
        self.inner.query(collection, filter, limit).await
    }

    async fn collection_group(
        &self,
        group: &str,
        filter: FieldFilter,
    ) -> Result<Vec<StoredDoc>, StoreError> {
        self.check(Fault::CollectionGroup(group.to_string()))?;
        self.inner.collection_group(group, filter).await
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        self.check(Fault::Commit)?;
        self.inner.commit(batch).await
    }
}

pub fn user(uid: &str) -> UserContext {
    UserContext::new(uid, "user")
}

pub fn admin(uid: &str) -> UserContext {
    UserContext::new(uid, "admin")
}
