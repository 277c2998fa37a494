use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::{options::ClientOptions, Client, Database};
use uuid::Uuid;

use super::{DocumentStore, ID_FIELD};
use crate::error::{Error, Result};

pub struct MongoStore {
    pub client: Client,
    pub db: Database,
}

impl MongoStore {
    pub async fn init(uri: &str, db_name: &str) -> Result<Self> {
        let client_options = ClientOptions::parse(uri).await?;
        let client = Client::with_options(client_options)?;
        let db = client.database(db_name);
        Ok(MongoStore { client, db })
    }

    fn coll(&self, name: &str) -> mongodb::Collection<Document> {
        self.db.collection::<Document>(name)
    }

    fn not_found(id: &str) -> Error {
        Error::NotFound { kind: "Document", id: id.to_string() }
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn insert(&self, collection: &str, mut doc: Document) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        doc.insert(ID_FIELD, id.clone());
        self.coll(collection).insert_one(doc).await?;
        Ok(id)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        Ok(self.coll(collection).find_one(doc! { ID_FIELD: id }).await?)
    }

    async fn find_eq(&self, collection: &str, filter: Document) -> Result<Vec<Document>> {
        let mut cursor = self.coll(collection).find(filter).await?;
        let mut docs = Vec::new();
        while let Some(result) = cursor.next().await {
            docs.push(result?);
        }
        Ok(docs)
    }

    async fn update_fields(&self, collection: &str, id: &str, mut fields: Document) -> Result<()> {
        fields.remove(ID_FIELD);
        let res = self
            .coll(collection)
            .update_one(doc! { ID_FIELD: id }, doc! { "$set": fields })
            .await?;
        if res.matched_count == 0 {
            return Err(Self::not_found(id));
        }
        Ok(())
    }

    async fn update_fields_unless(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        excluded: Bson,
        mut fields: Document,
    ) -> Result<()> {
        fields.remove(ID_FIELD);
        let res = self
            .coll(collection)
            .update_one(
                doc! { ID_FIELD: id, field: { "$ne": excluded } },
                doc! { "$set": fields },
            )
            .await?;
        if res.matched_count == 0 {
            return Err(Self::not_found(id));
        }
        Ok(())
    }

    async fn insert_if_absent(&self, collection: &str, id: &str, mut doc: Document) -> Result<bool> {
        // The upsert takes `_id` from the filter.
        doc.remove(ID_FIELD);
        let res = self
            .coll(collection)
            .update_one(doc! { ID_FIELD: id }, doc! { "$setOnInsert": doc })
            .upsert(true)
            .await?;
        Ok(res.upserted_id.is_some())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        self.coll(collection).delete_one(doc! { ID_FIELD: id }).await?;
        Ok(())
    }

    async fn array_union(&self, collection: &str, id: &str, field: &str, value: Bson) -> Result<()> {
        let res = self
            .coll(collection)
            .update_one(doc! { ID_FIELD: id }, doc! { "$addToSet": { field: value } })
            .await?;
        if res.matched_count == 0 {
            return Err(Self::not_found(id));
        }
        Ok(())
    }

    async fn array_remove(&self, collection: &str, id: &str, field: &str, value: Bson) -> Result<()> {
        let res = self
            .coll(collection)
            .update_one(doc! { ID_FIELD: id }, doc! { "$pull": { field: value } })
            .await?;
        if res.matched_count == 0 {
            return Err(Self::not_found(id));
        }
        Ok(())
    }

    fn server_timestamp(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
