use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::errors::{Result, ServiceError};
use crate::events::{Event, EventBus};
use crate::models::Document;
use crate::normalize::normalize_document;
use crate::store::{Collection, DocumentStore, ListQuery};

/// Normalizes a raw document and deserializes it into `T`.
pub fn decode_document<T: Document>(mut raw: Value) -> Result<T> {
    normalize_document(&mut raw, T::FIELDS);
    serde_json::from_value(raw).map_err(|e| {
        ServiceError::SerializationError(format!("invalid {} document: {}", T::COLLECTION, e))
    })
}

/// Serializes a record for writing, dropping the fields the store owns.
fn encode_document<T: Document>(record: &T) -> Result<Value> {
    let mut value = serde_json::to_value(record)?;
    if let Some(map) = value.as_object_mut() {
        map.remove("id");
        map.remove("created_at");
        map.remove("updated_at");
    }
    Ok(value)
}

/// Typed gateway over one collection of a [`DocumentStore`].
pub struct Repository<T: Document> {
    store: Arc<dyn DocumentStore>,
    events: EventBus,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Document> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            events: self.events.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Document> Repository<T> {
    pub fn new(store: Arc<dyn DocumentStore>, events: EventBus) -> Self {
        Self {
            store,
            events,
            _marker: PhantomData,
        }
    }

    pub fn collection(&self) -> Collection {
        T::COLLECTION
    }

    /// Lists the collection. Documents that cannot be decoded are skipped.
    #[instrument(skip(self), fields(collection = %T::COLLECTION))]
    pub async fn list(&self, query: &ListQuery) -> Result<Vec<T>> {
        let raw = self.store.list(T::COLLECTION, query).await?;
        let total = raw.len();
        let records: Vec<T> = raw
            .into_iter()
            .filter_map(|doc| match decode_document::<T>(doc) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(error = %e, "skipping undecodable document");
                    None
                }
            })
            .collect();
        debug!(total, decoded = records.len(), "listed documents");
        Ok(records)
    }

    pub async fn find(&self, id: &str) -> Result<Option<T>> {
        match self.store.get(T::COLLECTION, id).await? {
            Some(doc) => decode_document(doc).map(Some),
            None => Ok(None),
        }
    }

    /// Like [`find`](Self::find) but a missing record is an error.
    pub async fn get(&self, id: &str) -> Result<T> {
        self.find(id).await?.ok_or_else(|| {
            ServiceError::NotFound(format!("{} {} not found", T::COLLECTION, id))
        })
    }

    /// Stores a new record; the store assigns id and timestamps.
    #[instrument(skip(self, record), fields(collection = %T::COLLECTION))]
    pub async fn create(&self, record: &T) -> Result<T> {
        let doc = self
            .store
            .insert(T::COLLECTION, encode_document(record)?)
            .await?;
        let event = created_event(T::COLLECTION, &doc);
        let created: T = decode_document(doc)?;

        info!(id = %created.id(), "created document");
        self.events.publish(event);
        Ok(created)
    }

    /// Merges a partial JSON patch into the stored record.
    #[instrument(skip(self, patch), fields(collection = %T::COLLECTION))]
    pub async fn update(&self, id: &str, patch: Value) -> Result<T> {
        let doc = self.store.update(T::COLLECTION, id, patch).await?;
        let updated: T = decode_document(doc)?;

        info!("updated document");
        self.events.publish(changed_event(T::COLLECTION, id));
        Ok(updated)
    }

    /// Writes every field of `record` over the stored copy.
    pub async fn save(&self, record: &T) -> Result<T> {
        let patch = encode_document(record)?;
        self.update(record.id(), patch).await
    }

    /// Removes a record. Never fails: the result only says whether a record
    /// was removed on either backend.
    #[instrument(skip(self), fields(collection = %T::COLLECTION))]
    pub async fn delete(&self, id: &str) -> bool {
        match self.store.delete(T::COLLECTION, id).await {
            Ok(()) => {
                info!("deleted document");
                self.events.publish(deleted_event(T::COLLECTION, id));
                true
            }
            Err(e) => {
                warn!(error = %e, "delete failed");
                false
            }
        }
    }

    /// Raw documents, un-normalized, as held by the store.
    pub async fn export_raw(&self) -> Result<Vec<Value>> {
        Ok(self.store.list(T::COLLECTION, &ListQuery::all()).await?)
    }
}

fn created_event(collection: Collection, doc: &Value) -> Event {
    let id = doc
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    match collection {
        Collection::Orders => Event::OrderCreated {
            order_id: id,
            order_number: doc
                .get("order_number")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        },
        _ => Event::RecordChanged { collection, id },
    }
}

fn changed_event(collection: Collection, id: &str) -> Event {
    match collection {
        Collection::Orders => Event::OrderUpdated(id.to_string()),
        _ => Event::RecordChanged {
            collection,
            id: id.to_string(),
        },
    }
}

fn deleted_event(collection: Collection, id: &str) -> Event {
    match collection {
        Collection::Orders => Event::OrderDeleted(id.to_string()),
        _ => Event::RecordDeleted {
            collection,
            id: id.to_string(),
        },
    }
}
