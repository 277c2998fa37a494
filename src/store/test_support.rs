use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::bson::{Bson, Document};

use super::{DocumentStore, MemoryStore};
use crate::error::{Error, Result};

struct FailRule {
    op: &'static str,
    collection: &'static str,
    id: Option<String>,
}

/// A write another client lands when the next insert into `trigger` arrives.
struct Interleaved {
    trigger: &'static str,
    collection: &'static str,
    id: String,
    fields: Document,
}

/// `MemoryStore` that fails selected operations on demand.
pub(crate) struct FlakyStore {
    inner: MemoryStore,
    rules: Mutex<Vec<FailRule>>,
    interleaved: Mutex<Option<Interleaved>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            rules: Mutex::new(Vec::new()),
            interleaved: Mutex::new(None),
        }
    }

    /// Applies `fields` to `collection/id` just before the next insert into `trigger`.
    pub fn interleave_before_insert(
        &self,
        trigger: &'static str,
        collection: &'static str,
        id: &str,
        fields: Document,
    ) {
        *self.interleaved.lock().unwrap() = Some(Interleaved {
            trigger,
            collection,
            id: id.to_string(),
            fields,
        });
    }

    /// Fail every `op` on `collection`, or only the ones addressing `id`.
    pub fn fail_on(&self, op: &'static str, collection: &'static str, id: Option<&str>) {
        self.rules.lock().unwrap().push(FailRule {
            op,
            collection,
            id: id.map(str::to_string),
        });
    }

    pub fn heal(&self) {
        self.rules.lock().unwrap().clear();
    }

    fn check(&self, op: &'static str, collection: &str, id: Option<&str>) -> Result<()> {
        let rules = self.rules.lock().unwrap();
        let hit = rules.iter().any(|r| {
            r.op == op
                && r.collection == collection
                && match (&r.id, id) {
                    (None, _) => true,
                    (Some(want), Some(got)) => want == got,
                    (Some(_), None) => false,
                }
        });
        if hit {
            return Err(Error::Store(format!("injected {} failure on {}", op, collection)));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn insert(&self, collection: &str, doc: Document) -> Result<String> {
        self.check("insert", collection, None)?;
        let pending = {
            let mut slot = self.interleaved.lock().unwrap();
            match slot.as_ref() {
                Some(w) if w.trigger == collection => slot.take(),
                _ => None,
            }
        };
        if let Some(w) = pending {
            self.inner.update_fields(w.collection, &w.id, w.fields).await?;
        }
        self.inner.insert(collection, doc).await
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        self.check("get", collection, Some(id))?;
        self.inner.get(collection, id).await
    }

    async fn find_eq(&self, collection: &str, filter: Document) -> Result<Vec<Document>> {
        self.check("find_eq", collection, None)?;
        self.inner.find_eq(collection, filter).await
    }

    async fn update_fields(&self, collection: &str, id: &str, fields: Document) -> Result<()> {
        self.check("update_fields", collection, Some(id))?;
        self.inner.update_fields(collection, id, fields).await
    }

    async fn update_fields_unless(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        excluded: Bson,
        fields: Document,
    ) -> Result<()> {
        self.check("update_fields", collection, Some(id))?;
        self.inner.update_fields_unless(collection, id, field, excluded, fields).await
    }

    async fn insert_if_absent(&self, collection: &str, id: &str, doc: Document) -> Result<bool> {
        self.check("insert_if_absent", collection, Some(id))?;
        self.inner.insert_if_absent(collection, id, doc).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        self.check("delete", collection, Some(id))?;
        self.inner.delete(collection, id).await
    }

    async fn array_union(&self, collection: &str, id: &str, field: &str, value: Bson) -> Result<()> {
        self.check("array_union", collection, Some(id))?;
        self.inner.array_union(collection, id, field, value).await
    }

    async fn array_remove(&self, collection: &str, id: &str, field: &str, value: Bson) -> Result<()> {
        self.check("array_remove", collection, Some(id))?;
        self.inner.array_remove(collection, id, field, value).await
    }

    fn server_timestamp(&self) -> DateTime<Utc> {
        self.inner.server_timestamp()
    }
}
