use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    Set, TransactionTrait,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::{Collection, DocumentStore, ListQuery, StoreError};
use crate::entities::document::{self, ActiveModel, Entity as DocumentEntity, Model};
use crate::normalize::{merge_patch, parse_datetime, to_iso};

/// The authoritative document store, persisted through SeaORM.
#[derive(Clone)]
pub struct RemoteDocumentStore {
    db: Arc<DatabaseConnection>,
}

impl RemoteDocumentStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Renders a row as a document: the stored body with the server-owned
    /// columns layered on top.
    fn to_document(model: Model) -> Value {
        let mut doc = match model.data {
            Value::Object(map) => Value::Object(map),
            _ => Value::Object(Default::default()),
        };
        if let Some(map) = doc.as_object_mut() {
            map.insert("id".into(), Value::String(model.id));
            map.insert("created_at".into(), Value::String(to_iso(&model.created_at)));
            map.insert("updated_at".into(), Value::String(to_iso(&model.updated_at)));
        }
        doc
    }

    fn strip_server_fields(data: &mut Value) {
        if let Some(map) = data.as_object_mut() {
            map.remove("id");
            map.remove("created_at");
            map.remove("updated_at");
        }
    }

    async fn find(&self, collection: Collection, id: &str) -> Result<Option<Model>, StoreError> {
        Ok(DocumentEntity::find_by_id(id.to_string())
            .filter(document::Column::Collection.eq(collection.name()))
            .one(self.db.as_ref())
            .await?)
    }
}

#[async_trait]
impl DocumentStore for RemoteDocumentStore {
    fn backend_name(&self) -> &'static str {
        "remote"
    }

    async fn list(
        &self,
        collection: Collection,
        query: &ListQuery,
    ) -> Result<Vec<Value>, StoreError> {
        let mut select =
            DocumentEntity::find().filter(document::Column::Collection.eq(collection.name()));
        if query.newest_first {
            select = select.order_by_desc(document::Column::CreatedAt);
        }

        let rows = select.all(self.db.as_ref()).await?;
        debug!(collection = %collection, count = rows.len(), "read remote collection");

        let docs = rows.into_iter().map(Self::to_document).collect();
        Ok(query.apply(docs))
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.find(collection, id).await?.map(Self::to_document))
    }

    async fn insert(&self, collection: Collection, mut data: Value) -> Result<Value, StoreError> {
        if !data.is_object() {
            return Err(StoreError::InvalidDocument(
                "document must be an object".into(),
            ));
        }
        Self::strip_server_fields(&mut data);

        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        let model = ActiveModel {
            id: Set(id.clone()),
            collection: Set(collection.name().to_string()),
            data: Set(data),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db.as_ref())
        .await?;

        info!(collection = %collection, id = %id, "inserted remote document");
        Ok(Self::to_document(model))
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        mut patch: Value,
    ) -> Result<Value, StoreError> {
        let existing = self
            .find(collection, id)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                collection,
                id: id.to_string(),
            })?;

        Self::strip_server_fields(&mut patch);
        let mut data = existing.data.clone();
        merge_patch(&mut data, &patch);

        let mut active: ActiveModel = existing.into();
        active.data = Set(data);
        active.updated_at = Set(Utc::now());
        let model = active.update(self.db.as_ref()).await?;

        Ok(Self::to_document(model))
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
        let result = DocumentEntity::delete_many()
            .filter(document::Column::Id.eq(id))
            .filter(document::Column::Collection.eq(collection.name()))
            .exec(self.db.as_ref())
            .await?;

        if result.rows_affected == 0 {
            return Err(StoreError::NotFound {
                collection,
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn replace_all(
        &self,
        collection: Collection,
        docs: Vec<Value>,
    ) -> Result<(), StoreError> {
        let txn = self.db.begin().await?;

        DocumentEntity::delete_many()
            .filter(document::Column::Collection.eq(collection.name()))
            .exec(&txn)
            .await?;

        let now = Utc::now();
        for mut doc in docs {
            let id = doc
                .get("id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            let created_at = doc
                .get("created_at")
                .and_then(parse_datetime)
                .unwrap_or(now);
            let updated_at = doc
                .get("updated_at")
                .and_then(parse_datetime)
                .unwrap_or(created_at);
            Self::strip_server_fields(&mut doc);

            ActiveModel {
                id: Set(id),
                collection: Set(collection.name().to_string()),
                data: Set(doc),
                created_at: Set(created_at),
                updated_at: Set(updated_at),
            }
            .insert(&txn)
            .await?;
        }

        txn.commit().await?;
        Ok(())
    }
}
