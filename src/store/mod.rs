/*!
 * # Document Stores
 *
 * Every persisted entity lives in a flat collection of JSON documents. The
 * [`DocumentStore`] trait is the single persistence interface; it has two
 * interchangeable implementations selected at startup:
 *
 * - [`RemoteDocumentStore`]: the authoritative backend (SeaORM `documents`
 *   table), which assigns ids and timestamps server-side.
 * - [`LocalDocumentStore`]: JSON arrays kept in the local cache, one key per
 *   collection.
 *
 * [`FallbackStore`] wraps both and applies the remote-first policy.
 */

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

mod fallback;
mod local;
mod remote;

pub use fallback::FallbackStore;
pub use local::{collection_key, session_key, settings_key, LocalDocumentStore};
pub use remote::RemoteDocumentStore;

use crate::cache::CacheError;
use crate::errors::ServiceError;

/// Collections known to the system.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Collection {
    Users,
    Customers,
    Products,
    Orders,
}

impl Collection {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Customers => "customers",
            Self::Products => "products",
            Self::Orders => "orders",
        }
    }

    /// Prefix of locally synthesized ids (`<prefix>-<millis>`).
    pub fn id_prefix(&self) -> &'static str {
        match self {
            Self::Users => "user",
            Self::Customers => "cust",
            Self::Products => "prod",
            Self::Orders => "order",
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Document {collection}/{id} not found")]
    NotFound { collection: Collection, id: String },
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { collection, id } => {
                ServiceError::NotFound(format!("{} {} not found", collection, id))
            }
            StoreError::InvalidDocument(msg) => ServiceError::ValidationError(msg),
            other => ServiceError::StoreError(other.to_string()),
        }
    }
}

/// Listing options understood by every store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    /// Keep only documents whose top-level field equals the value.
    pub filter_eq: Option<(String, Value)>,
    /// Order by `created_at` descending.
    pub newest_first: bool,
}

impl ListQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn newest_first(mut self) -> Self {
        self.newest_first = true;
        self
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter_eq = Some((field.into(), value.into()));
        self
    }

    /// Applies the query to an in-memory list of documents.
    pub fn apply(&self, docs: Vec<Value>) -> Vec<Value> {
        let mut docs: Vec<Value> = match &self.filter_eq {
            Some((field, expected)) => docs
                .into_iter()
                .filter(|doc| doc.get(field) == Some(expected))
                .collect(),
            None => docs,
        };
        if self.newest_first {
            // ISO-8601 strings in one canonical format sort chronologically
            docs.sort_by(|a, b| {
                let a = a.get("created_at").and_then(Value::as_str).unwrap_or("");
                let b = b.get("created_at").and_then(Value::as_str).unwrap_or("");
                b.cmp(a)
            });
        }
        docs
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Short label used in logs.
    fn backend_name(&self) -> &'static str;

    async fn list(&self, collection: Collection, query: &ListQuery)
        -> Result<Vec<Value>, StoreError>;

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>, StoreError>;

    /// Inserts a new document. The store assigns `id`, `created_at` and
    /// `updated_at` and returns the stored document.
    async fn insert(&self, collection: Collection, data: Value) -> Result<Value, StoreError>;

    /// Merges `patch` into the stored document and returns the result.
    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: Value,
    ) -> Result<Value, StoreError>;

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError>;

    /// Overwrites a whole collection with the given documents, verbatim.
    async fn replace_all(&self, collection: Collection, docs: Vec<Value>)
        -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;

    #[test]
    fn collection_names_and_prefixes() {
        assert_eq!(Collection::Orders.name(), "orders");
        assert_eq!(Collection::Customers.id_prefix(), "cust");
        assert_eq!(Collection::from_str("products").unwrap(), Collection::Products);
        assert_eq!(Collection::Users.to_string(), "users");
    }

    #[test]
    fn list_query_filters_and_sorts() {
        let docs = vec![
            json!({"id": "1", "seller_id": "a", "created_at": "2024-01-01T00:00:00.000Z"}),
            json!({"id": "2", "seller_id": "b", "created_at": "2024-01-03T00:00:00.000Z"}),
            json!({"id": "3", "seller_id": "a", "created_at": "2024-01-02T00:00:00.000Z"}),
        ];

        let ids: Vec<String> = ListQuery::all()
            .newest_first()
            .where_eq("seller_id", "a")
            .apply(docs)
            .iter()
            .map(|d| d["id"].as_str().unwrap().to_string())
            .collect();

        assert_eq!(ids, vec!["3", "1"]);
    }

    #[test]
    fn store_errors_map_to_service_errors() {
        let err: ServiceError = StoreError::NotFound {
            collection: Collection::Orders,
            id: "x".into(),
        }
        .into();
        assert!(matches!(err, ServiceError::NotFound(msg) if msg == "orders x not found"));

        let err: ServiceError = StoreError::Unavailable("down".into()).into();
        assert!(matches!(err, ServiceError::StoreError(_)));
    }
}
