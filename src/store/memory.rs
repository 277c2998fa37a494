use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::bson::{Bson, Document};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{DocumentStore, ID_FIELD};
use crate::error::{Error, Result};

/// Process-local store. Collections keep insertion order.
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
    clock: Mutex<Option<DateTime<Utc>>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            clock: Mutex::new(None),
        }
    }

    fn not_found(id: &str) -> Error {
        Error::NotFound { kind: "Document", id: id.to_string() }
    }

    fn position(docs: &[Document], id: &str) -> Option<usize> {
        docs.iter().position(|d| d.get_str(ID_FIELD).map(|v| v == id).unwrap_or(false))
    }

    async fn with_doc_mut<F>(&self, collection: &str, id: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut Document) -> Result<()> + Send,
    {
        let mut guard = self.collections.write().await;
        let docs = guard.get_mut(collection).ok_or_else(|| Self::not_found(id))?;
        let idx = Self::position(docs, id).ok_or_else(|| Self::not_found(id))?;
        f(&mut docs[idx])
    }
}

fn array_field<'a>(doc: &'a mut Document, field: &str) -> Result<&'a mut Vec<Bson>> {
    if !doc.contains_key(field) {
        doc.insert(field, Bson::Array(Vec::new()));
    }
    match doc.get_mut(field) {
        Some(Bson::Array(items)) => Ok(items),
        _ => Err(Error::Store(format!("field '{}' is not an array", field))),
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(&self, collection: &str, mut doc: Document) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        doc.insert(ID_FIELD, id.clone());
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .push(doc);
        Ok(id)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let guard = self.collections.read().await;
        Ok(guard
            .get(collection)
            .and_then(|docs| Self::position(docs, id).map(|idx| docs[idx].clone())))
    }

    async fn find_eq(&self, collection: &str, filter: Document) -> Result<Vec<Document>> {
        let guard = self.collections.read().await;
        let matches = guard
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|doc| filter.iter().all(|(k, v)| doc.get(k) == Some(v)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(matches)
    }

    async fn update_fields(&self, collection: &str, id: &str, fields: Document) -> Result<()> {
        self.with_doc_mut(collection, id, move |doc| {
            for (key, value) in fields {
                if key != ID_FIELD {
                    doc.insert(key, value);
                }
            }
            Ok(())
        })
        .await
    }

    async fn update_fields_unless(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        excluded: Bson,
        fields: Document,
    ) -> Result<()> {
        self.with_doc_mut(collection, id, move |doc| {
            if doc.get(field) == Some(&excluded) {
                return Err(Self::not_found(id));
            }
            for (key, value) in fields {
                if key != ID_FIELD {
                    doc.insert(key, value);
                }
            }
            Ok(())
        })
        .await
    }

    async fn insert_if_absent(&self, collection: &str, id: &str, mut doc: Document) -> Result<bool> {
        doc.insert(ID_FIELD, id);
        let mut guard = self.collections.write().await;
        let docs = guard.entry(collection.to_string()).or_default();
        if Self::position(docs, id).is_some() {
            return Ok(false);
        }
        docs.push(doc);
        Ok(true)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        let mut guard = self.collections.write().await;
        if let Some(docs) = guard.get_mut(collection) {
            docs.retain(|d| d.get_str(ID_FIELD).map(|v| v != id).unwrap_or(true));
        }
        Ok(())
    }

    async fn array_union(&self, collection: &str, id: &str, field: &str, value: Bson) -> Result<()> {
        self.with_doc_mut(collection, id, move |doc| {
            let items = array_field(doc, field)?;
            if !items.contains(&value) {
                items.push(value);
            }
            Ok(())
        })
        .await
    }

    async fn array_remove(&self, collection: &str, id: &str, field: &str, value: Bson) -> Result<()> {
        self.with_doc_mut(collection, id, move |doc| {
            array_field(doc, field)?.retain(|item| item != &value);
            Ok(())
        })
        .await
    }

    fn server_timestamp(&self) -> DateTime<Utc> {
        let mut last = self.clock.lock().unwrap_or_else(PoisonError::into_inner);
        let now = match *last {
            Some(prev) => Utc::now().max(prev),
            None => Utc::now(),
        };
        *last = Some(now);
        now
    }
}
