//! Whole-dataset export and restore.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::auth::{Action, Module, Permission, Session};
use crate::errors::{Result, ServiceError};
use crate::events::{Event, EventBus};
use crate::store::{Collection, DocumentStore, ListQuery, LocalDocumentStore};

pub const BACKUP_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupMeta {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    /// Backend the records were read from.
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupDocument {
    pub meta: BackupMeta,
    #[serde(default)]
    pub users: Vec<Value>,
    #[serde(default)]
    pub customers: Vec<Value>,
    #[serde(default)]
    pub products: Vec<Value>,
    #[serde(default)]
    pub orders: Vec<Value>,
}

impl BackupDocument {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses a backup file. Only the top-level shape is checked; records
    /// are kept exactly as written.
    pub fn from_json(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        let Value::Object(mut map) = value else {
            return Err(ServiceError::ValidationError(
                "Backup file must be a JSON object".into(),
            ));
        };

        let meta = match map.remove("meta") {
            Some(meta) => serde_json::from_value(meta).unwrap_or_else(|e| {
                warn!(error = %e, "backup meta unreadable");
                unknown_meta()
            }),
            None => unknown_meta(),
        };

        let mut take = |key: &str| match map.remove(key) {
            Some(Value::Array(items)) => items,
            Some(_) => {
                warn!(key, "backup section is not an array, ignoring");
                Vec::new()
            }
            None => Vec::new(),
        };

        Ok(Self {
            meta,
            users: take("users"),
            customers: take("customers"),
            products: take("products"),
            orders: take("orders"),
        })
    }

    fn section(&self, collection: Collection) -> &[Value] {
        match collection {
            Collection::Users => &self.users,
            Collection::Customers => &self.customers,
            Collection::Products => &self.products,
            Collection::Orders => &self.orders,
        }
    }
}

fn unknown_meta() -> BackupMeta {
    BackupMeta {
        version: "unknown".into(),
        exported_at: Utc::now(),
        source: "unknown".into(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RestoreReport {
    pub users: usize,
    pub customers: usize,
    pub products: usize,
    pub orders: usize,
}

const COLLECTIONS: [Collection; 4] = [
    Collection::Users,
    Collection::Customers,
    Collection::Products,
    Collection::Orders,
];

#[derive(Clone)]
pub struct BackupService {
    store: Arc<dyn DocumentStore>,
    local: LocalDocumentStore,
    events: EventBus,
}

impl BackupService {
    pub fn new(store: Arc<dyn DocumentStore>, local: LocalDocumentStore, events: EventBus) -> Self {
        Self {
            store,
            local,
            events,
        }
    }

    #[instrument(skip(self, session))]
    pub async fn export(&self, session: &Session) -> Result<BackupDocument> {
        session.require(Permission::new(Module::Settings, Action::Export))?;

        let mut doc = BackupDocument {
            meta: BackupMeta {
                version: BACKUP_VERSION.into(),
                exported_at: Utc::now(),
                source: self.store.backend_name().into(),
            },
            users: Vec::new(),
            customers: Vec::new(),
            products: Vec::new(),
            orders: Vec::new(),
        };
        for collection in COLLECTIONS {
            let records = self.store.list(collection, &ListQuery::all()).await?;
            match collection {
                Collection::Users => doc.users = records,
                Collection::Customers => doc.customers = records,
                Collection::Products => doc.products = records,
                Collection::Orders => doc.orders = records,
            }
        }

        info!(
            users = doc.users.len(),
            customers = doc.customers.len(),
            products = doc.products.len(),
            orders = doc.orders.len(),
            "backup exported"
        );
        Ok(doc)
    }

    /// Overwrites the local copy of every collection with the backup's
    /// records, verbatim.
    #[instrument(skip(self, doc, session))]
    pub async fn restore(&self, doc: &BackupDocument, session: &Session) -> Result<RestoreReport> {
        session.require(Permission::new(Module::Settings, Action::Manage))?;

        for collection in COLLECTIONS {
            self.local
                .replace_all(collection, doc.section(collection).to_vec())
                .await?;
        }

        let report = RestoreReport {
            users: doc.users.len(),
            customers: doc.customers.len(),
            products: doc.products.len(),
            orders: doc.orders.len(),
        };
        info!(?report, version = %doc.meta.version, "backup restored");
        self.events.publish(Event::BackupRestored);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_json_tolerates_missing_and_malformed_sections() {
        let doc = BackupDocument::from_json(
            &json!({
                "users": [{"id": "u1"}],
                "orders": {"not": "an array"},
            })
            .to_string(),
        )
        .unwrap();

        assert_eq!(doc.users.len(), 1);
        assert!(doc.orders.is_empty());
        assert!(doc.customers.is_empty());
        assert_eq!(doc.meta.version, "unknown");
    }

    #[test]
    fn from_json_rejects_non_objects() {
        assert!(matches!(
            BackupDocument::from_json("[1, 2]"),
            Err(ServiceError::ValidationError(_))
        ));
        assert!(matches!(
            BackupDocument::from_json("{"),
            Err(ServiceError::SerializationError(_))
        ));
    }

    #[test]
    fn json_roundtrip_keeps_records_verbatim() {
        let doc = BackupDocument {
            meta: BackupMeta {
                version: BACKUP_VERSION.into(),
                exported_at: Utc::now(),
                source: "local".into(),
            },
            users: vec![],
            customers: vec![json!({"id": "c1", "weird": {"nested": [1, "2"]}})],
            products: vec![],
            orders: vec![],
        };
        let parsed = BackupDocument::from_json(&doc.to_json().unwrap()).unwrap();
        assert_eq!(parsed.customers, doc.customers);
        assert_eq!(parsed.meta.source, "local");
    }
}
