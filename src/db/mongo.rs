//! MongoDB document store
//!
//! Each collection group (`deals`, `stages`, `participants`, `documents`)
//! maps to one MongoDB collection. A stored document keeps its full path in
//! `_id` and its parent document path in `_parent`, so sub-collection scans
//! and collection-group queries are both plain filters:
//!
//! ```text
//! deals/abc/stages/intake  ->  stages { _id: "deals/abc/stages/intake",
//!                                       _parent: "deals/abc", ...fields }
//! ```

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use futures_util::TryStreamExt;
use mongodb::{options::IndexOptions, Client, ClientSession, Collection, IndexModel};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::store::{
    CollectionPath, DocPath, DocumentStore, FieldFilter, Fields, SetMode, StoredDoc, Write,
    WriteBatch,
};
use crate::types::StoreError;

const ID_FIELD: &str = "_id";
const PARENT_FIELD: &str = "_parent";

/// Collection groups that get a `_parent` index at startup
const KNOWN_GROUPS: &[&str] = &["deals", "stages", "participants", "documents", "properties"];

/// MongoDB-backed [`DocumentStore`]
#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    db_name: String,
}

impl MongoStore {
    /// Connect and verify the connection with a ping
    pub async fn connect(uri: &str, db_name: &str) -> Result<Self, StoreError> {
        info!("Connecting to MongoDB at {}", uri);

        // Use serverSelectionTimeoutMS to avoid hanging on unreachable MongoDB
        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to connect to MongoDB: {}", e)))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| StoreError::Backend(format!("MongoDB ping failed: {}", e)))?;

        let hello = client
            .database(db_name)
            .run_command(doc! { "hello": 1 })
            .await
            .map_err(|e| StoreError::Backend(format!("MongoDB hello failed: {}", e)))?;
        if !supports_transactions(&hello) {
            return Err(StoreError::Backend(
                "MongoDB is a standalone server; batch writes need a replica set or mongos"
                    .to_string(),
            ));
        }

        info!("Connected to MongoDB database '{}'", db_name);

        let store = Self {
            client,
            db_name: db_name.to_string(),
        };
        store.apply_indexes().await;
        Ok(store)
    }

    /// Create `_parent` and common lookup indexes. Failures are logged only.
    async fn apply_indexes(&self) {
        for group in KNOWN_GROUPS {
            let mut keys = vec![doc! { "_parent": 1 }];
            match *group {
                "deals" => {
                    keys.push(doc! { "creatorUid": 1 });
                    keys.push(doc! { "clientUid": 1 });
                }
                "participants" => keys.push(doc! { "userUid": 1 }),
                _ => {}
            }

            let indexes: Vec<IndexModel> = keys
                .into_iter()
                .map(|keys| {
                    IndexModel::builder()
                        .keys(keys)
                        .options(IndexOptions::builder().build())
                        .build()
                })
                .collect();

            if let Err(e) = self.collection(group).create_indexes(indexes).await {
                warn!("Failed to create indexes on '{}': {}", group, e);
            }
        }
    }

    fn collection(&self, group: &str) -> Collection<Document> {
        self.client.database(&self.db_name).collection::<Document>(group)
    }

    /// Get the database name
    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    async fn apply_write(
        &self,
        write: Write,
        session: Option<&mut ClientSession>,
    ) -> Result<(), StoreError> {
        let collection = self.collection(write.path.group());
        let filter = doc! { "_id": write.path.as_str() };
        let mut body = bson::to_document(&write.fields)?;
        body.insert(PARENT_FIELD, parent_of(&write.path));

        match (write.mode, session) {
            (SetMode::Overwrite, Some(session)) => {
                collection
                    .replace_one(filter, body)
                    .upsert(true)
                    .session(session)
                    .await?;
            }
            (SetMode::Overwrite, None) => {
                collection.replace_one(filter, body).upsert(true).await?;
            }
            (SetMode::Merge, Some(session)) => {
                collection
                    .update_one(filter, doc! { "$set": body })
                    .upsert(true)
                    .session(session)
                    .await?;
            }
            (SetMode::Merge, None) => {
                collection
                    .update_one(filter, doc! { "$set": body })
                    .upsert(true)
                    .await?;
            }
        }
        Ok(())
    }

    async fn find(
        &self,
        group: &str,
        filter: Document,
        limit: Option<usize>,
    ) -> Result<Vec<StoredDoc>, StoreError> {
        let collection = self.collection(group);
        let mut find = collection.find(filter).sort(doc! { "_id": 1 });
        if let Some(limit) = limit {
            find = find.limit(limit as i64);
        }
        let raw: Vec<Document> = find.await?.try_collect().await?;
        raw.into_iter().map(from_mongo).collect()
    }
}

/// Multi-document transactions need a replica set member or a mongos router
fn supports_transactions(hello: &Document) -> bool {
    hello.get_str("setName").is_ok() || matches!(hello.get_str("msg"), Ok("isdbgrid"))
}

fn parent_of(path: &DocPath) -> String {
    path.parent()
        .parent_doc()
        .map(|p| p.as_str().to_string())
        .unwrap_or_default()
}

fn filter_document(filter: &FieldFilter) -> Result<Document, StoreError> {
    let mut query = Document::new();
    query.insert(filter.field.clone(), bson::to_bson(&filter.value)?);
    Ok(query)
}

fn from_mongo(mut raw: Document) -> Result<StoredDoc, StoreError> {
    let id = match raw.remove(ID_FIELD) {
        Some(Bson::String(id)) => id,
        other => {
            return Err(StoreError::Codec(format!(
                "stored document has unexpected _id: {:?}",
                other
            )))
        }
    };
    raw.remove(PARENT_FIELD);

    let path = DocPath::parse(&id)?;
    match Bson::Document(raw).into_relaxed_extjson() {
        Value::Object(fields) => Ok(StoredDoc { path, fields }),
        other => Err(StoreError::Codec(format!(
            "document {} decoded to non-object {}",
            id, other
        ))),
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    fn backend(&self) -> &'static str {
        "mongodb"
    }

    async fn get(&self, path: &DocPath) -> Result<StoredDoc, StoreError> {
        let found = self
            .collection(path.group())
            .find_one(doc! { "_id": path.as_str() })
            .await?;
        match found {
            Some(raw) => from_mongo(raw),
            None => Err(StoreError::NotFound(path.to_string())),
        }
    }

    async fn set(&self, path: &DocPath, fields: Fields, mode: SetMode) -> Result<(), StoreError> {
        self.apply_write(
            Write {
                path: path.clone(),
                fields,
                mode,
            },
            None,
        )
        .await
    }

    async fn query(
        &self,
        collection: &CollectionPath,
        filter: Option<FieldFilter>,
        limit: Option<usize>,
    ) -> Result<Vec<StoredDoc>, StoreError> {
        let parent = collection
            .parent_doc()
            .map(|p| p.as_str().to_string())
            .unwrap_or_default();
        let mut query = match filter {
            Some(ref f) => filter_document(f)?,
            None => Document::new(),
        };
        query.insert(PARENT_FIELD, parent);
        self.find(collection.group(), query, limit).await
    }

    async fn collection_group(
        &self,
        group: &str,
        filter: FieldFilter,
    ) -> Result<Vec<StoredDoc>, StoreError> {
        self.find(group, filter_document(&filter)?, None).await
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        debug!("Committing batch of {} writes", batch.len());
        let mut session = self.client.start_session().await?;
        session.start_transaction().await?;

        for write in batch.into_writes() {
            if let Err(e) = self.apply_write(write, Some(&mut session)).await {
                if let Err(abort) = session.abort_transaction().await {
                    warn!("Failed to abort transaction: {}", abort);
                }
                return Err(e);
            }
        }

        session.commit_transaction().await?;
        Ok(())
    }
}
