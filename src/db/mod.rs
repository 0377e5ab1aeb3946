//! Database layer for Dealroom
//!
//! A small document-store abstraction with a MongoDB backend for production
//! and an in-memory backend for dev mode and tests.

pub mod memory;
pub mod mongo;
pub mod store;

pub use memory::MemoryStore;
pub use mongo::MongoStore;
pub use store::{
    to_fields, CollectionPath, DocPath, DocumentStore, FieldFilter, Fields, SetMode, StoredDoc,
    WriteBatch,
};
