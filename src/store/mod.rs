//! Document store contract the data-access layer is written against.
//!
//! Three logical collections addressed by name and string id. Supports point
//! reads, equality queries, field-level partial updates, array add/remove on a
//! named field and a store-side clock.

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::bson::{Bson, Document};

use crate::error::Result;

pub const TASKS: &str = "tasks";
pub const USERS: &str = "users";
pub const ACTIVITY_LOGS: &str = "activity_logs";

/// Key holding the document id in every collection.
pub const ID_FIELD: &str = "_id";

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Inserts `doc` under a freshly assigned id and returns that id.
    async fn insert(&self, collection: &str, doc: Document) -> Result<String>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Documents matching every `field == value` pair of `filter`, in insertion order.
    async fn find_eq(&self, collection: &str, filter: Document) -> Result<Vec<Document>>;

    /// Writes only the given fields. Fails with `NotFound` if `id` does not exist.
    async fn update_fields(&self, collection: &str, id: &str, fields: Document) -> Result<()>;

    /// Like `update_fields`, but only while `field != excluded`. A document
    /// that fails the guard is reported as `NotFound`.
    async fn update_fields_unless(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        excluded: Bson,
        fields: Document,
    ) -> Result<()>;

    /// Stores `doc` under `id` unless a document with that id already exists.
    /// Returns whether it was inserted.
    async fn insert_if_absent(&self, collection: &str, id: &str, doc: Document) -> Result<bool>;

    async fn delete(&self, collection: &str, id: &str) -> Result<()>;

    /// Adds `value` to the array `field` unless already present.
    async fn array_union(&self, collection: &str, id: &str, field: &str, value: Bson) -> Result<()>;

    /// Removes every occurrence of `value` from the array `field`.
    async fn array_remove(&self, collection: &str, id: &str, field: &str, value: Bson) -> Result<()>;

    /// Store clock. Never goes backwards between calls.
    fn server_timestamp(&self) -> DateTime<Utc>;
}

#[cfg(test)]
pub(crate) mod test_support;
