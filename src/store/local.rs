use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{Collection, DocumentStore, ListQuery, StoreError};
use crate::cache::{read_json, write_json, CacheBackend};
use crate::normalize::{merge_patch, to_iso};

/// Cache key holding the JSON array of a collection.
pub fn collection_key(namespace: &str, collection: Collection) -> String {
    format!("{}_{}", namespace, collection.name())
}

/// Cache key holding one settings scope.
pub fn settings_key(namespace: &str, scope: &str) -> String {
    format!("{}_settings_{}", namespace, scope)
}

/// Cache key holding the last resolved session.
pub fn session_key(namespace: &str) -> String {
    format!("{}_session", namespace)
}

/// Document store over the local key-value cache.
#[derive(Clone)]
pub struct LocalDocumentStore {
    cache: Arc<dyn CacheBackend>,
    namespace: String,
}

impl LocalDocumentStore {
    pub fn new(cache: Arc<dyn CacheBackend>, namespace: impl Into<String>) -> Self {
        Self {
            cache,
            namespace: namespace.into(),
        }
    }

    pub fn cache(&self) -> Arc<dyn CacheBackend> {
        Arc::clone(&self.cache)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn load(&self, collection: Collection) -> Result<Vec<Value>, StoreError> {
        let key = collection_key(&self.namespace, collection);
        match read_json::<Value>(self.cache.as_ref(), &key).await? {
            Some(Value::Array(items)) => Ok(items),
            Some(_) => {
                warn!(key = %key, "local cache entry is not an array, treating as empty");
                Ok(Vec::new())
            }
            None => Ok(Vec::new()),
        }
    }

    async fn save(&self, collection: Collection, docs: &[Value]) -> Result<(), StoreError> {
        let key = collection_key(&self.namespace, collection);
        write_json(self.cache.as_ref(), &key, docs).await?;
        Ok(())
    }

    fn local_id(collection: Collection, existing: &[Value]) -> String {
        let mut millis = Utc::now().timestamp_millis();
        loop {
            let candidate = format!("{}-{}", collection.id_prefix(), millis);
            let taken = existing
                .iter()
                .any(|doc| doc.get("id").and_then(Value::as_str) == Some(candidate.as_str()));
            if !taken {
                return candidate;
            }
            millis += 1;
        }
    }
}

fn id_of(doc: &Value) -> Option<&str> {
    doc.get("id").and_then(Value::as_str)
}

#[async_trait]
impl DocumentStore for LocalDocumentStore {
    fn backend_name(&self) -> &'static str {
        "local"
    }

    async fn list(
        &self,
        collection: Collection,
        query: &ListQuery,
    ) -> Result<Vec<Value>, StoreError> {
        let docs = self.load(collection).await?;
        debug!(collection = %collection, count = docs.len(), "read local collection");
        Ok(query.apply(docs))
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>, StoreError> {
        let docs = self.load(collection).await?;
        Ok(docs.into_iter().find(|doc| id_of(doc) == Some(id)))
    }

    async fn insert(&self, collection: Collection, mut data: Value) -> Result<Value, StoreError> {
        let map = data
            .as_object_mut()
            .ok_or_else(|| StoreError::InvalidDocument("document must be an object".into()))?;

        let mut docs = self.load(collection).await?;
        let id = Self::local_id(collection, &docs);
        let now = to_iso(&Utc::now());
        map.insert("id".into(), Value::String(id));
        map.insert("created_at".into(), Value::String(now.clone()));
        map.insert("updated_at".into(), Value::String(now));

        docs.insert(0, data.clone());
        self.save(collection, &docs).await?;
        Ok(data)
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: Value,
    ) -> Result<Value, StoreError> {
        let mut docs = self.load(collection).await?;
        let doc = docs
            .iter_mut()
            .find(|doc| id_of(doc) == Some(id))
            .ok_or_else(|| StoreError::NotFound {
                collection,
                id: id.to_string(),
            })?;

        merge_patch(doc, &patch);
        if let Some(map) = doc.as_object_mut() {
            map.insert("id".into(), Value::String(id.to_string()));
            map.insert("updated_at".into(), Value::String(to_iso(&Utc::now())));
        }
        let updated = doc.clone();

        self.save(collection, &docs).await?;
        Ok(updated)
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
        let mut docs = self.load(collection).await?;
        let before = docs.len();
        docs.retain(|doc| id_of(doc) != Some(id));
        if docs.len() == before {
            return Err(StoreError::NotFound {
                collection,
                id: id.to_string(),
            });
        }
        self.save(collection, &docs).await
    }

    async fn replace_all(
        &self,
        collection: Collection,
        docs: Vec<Value>,
    ) -> Result<(), StoreError> {
        self.save(collection, &docs).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use serde_json::json;

    fn store() -> LocalDocumentStore {
        LocalDocumentStore::new(Arc::new(InMemoryCache::new()), "test")
    }

    #[tokio::test]
    async fn insert_prepends_with_prefixed_id() {
        let store = store();
        let first = store
            .insert(Collection::Customers, json!({"name": "Ana"}))
            .await
            .unwrap();
        let second = store
            .insert(Collection::Customers, json!({"name": "Bruno"}))
            .await
            .unwrap();

        assert!(first["id"].as_str().unwrap().starts_with("cust-"));
        assert_ne!(first["id"], second["id"]);

        let all = store.list(Collection::Customers, &ListQuery::all()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0]["name"], "Bruno");
    }

    #[tokio::test]
    async fn update_patches_in_place_and_stamps_updated_at() {
        let store = store();
        let created = store
            .insert(Collection::Products, json!({"name": "Camisa", "sku": "C1"}))
            .await
            .unwrap();
        let id = created["id"].as_str().unwrap();

        let updated = store
            .update(Collection::Products, id, json!({"sku": "C2", "id": "hijack"}))
            .await
            .unwrap();

        assert_eq!(updated["id"], id);
        assert_eq!(updated["sku"], "C2");
        assert_eq!(updated["name"], "Camisa");
        assert!(updated["updated_at"].as_str().unwrap() >= created["updated_at"].as_str().unwrap());
    }

    #[tokio::test]
    async fn update_and_delete_unknown_ids_fail() {
        let store = store();
        assert!(matches!(
            store.update(Collection::Orders, "nope", json!({})).await,
            Err(StoreError::NotFound { .. })
        ));
        assert!(matches!(
            store.delete(Collection::Orders, "nope").await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn keys_follow_namespace_layout() {
        let cache = Arc::new(InMemoryCache::new());
        let store = LocalDocumentStore::new(cache.clone(), "shop");
        store
            .replace_all(Collection::Orders, vec![json!({"id": "o1"})])
            .await
            .unwrap();

        assert_eq!(cache.keys().await.unwrap(), vec!["shop_orders"]);
        assert_eq!(settings_key("shop", "company"), "shop_settings_company");
        assert_eq!(session_key("shop"), "shop_session");
        assert!(store.get(Collection::Orders, "o1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn non_array_entries_read_as_empty() {
        let cache = Arc::new(InMemoryCache::new());
        cache.set("ns_users", "{\"oops\": true}").await.unwrap();
        let store = LocalDocumentStore::new(cache, "ns");
        assert!(store
            .list(Collection::Users, &ListQuery::all())
            .await
            .unwrap()
            .is_empty());
    }
}
