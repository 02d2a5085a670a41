use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{Collection, DocumentStore, ListQuery, LocalDocumentStore, StoreError};

/// Remote-first store that degrades to the local cache.
///
/// Reads go to the remote store and fall back to the local copy when the
/// remote call fails or comes back empty. Writes go to the remote store and
/// are replayed against the local copy on any remote error. Successful remote
/// order listings are mirrored into the local copy so a later outage still
/// shows recent orders.
///
/// Nothing is retried and nothing is rolled back: a remote write that
/// succeeds while the mirror write fails is kept as is.
#[derive(Clone)]
pub struct FallbackStore {
    remote: Option<Arc<dyn DocumentStore>>,
    local: LocalDocumentStore,
}

impl FallbackStore {
    pub fn new(remote: Option<Arc<dyn DocumentStore>>, local: LocalDocumentStore) -> Self {
        Self { remote, local }
    }

    /// A store with no remote backend at all.
    pub fn local_only(local: LocalDocumentStore) -> Self {
        Self::new(None, local)
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub fn local(&self) -> &LocalDocumentStore {
        &self.local
    }

    /// Merges a remote listing into the local copy by id. Records only the
    /// local copy holds, such as ones written during an outage, are kept.
    async fn mirror(&self, collection: Collection, docs: &[Value]) {
        if let Err(e) = self.merge_into_local(collection, docs).await {
            warn!(collection = %collection, error = %e, "failed to mirror remote read into local cache");
        }
    }

    async fn merge_into_local(
        &self,
        collection: Collection,
        docs: &[Value],
    ) -> Result<(), StoreError> {
        let mut cached = self.local.list(collection, &ListQuery::all()).await?;
        for doc in docs {
            let id = doc.get("id");
            match cached.iter_mut().find(|c| c.get("id") == id) {
                Some(slot) => *slot = doc.clone(),
                None => cached.push(doc.clone()),
            }
        }
        self.local.replace_all(collection, cached).await
    }
}

#[async_trait]
impl DocumentStore for FallbackStore {
    fn backend_name(&self) -> &'static str {
        match self.remote {
            Some(_) => "remote+local",
            None => "local",
        }
    }

    async fn list(
        &self,
        collection: Collection,
        query: &ListQuery,
    ) -> Result<Vec<Value>, StoreError> {
        if let Some(remote) = &self.remote {
            match remote.list(collection, query).await {
                Ok(docs) if !docs.is_empty() => {
                    if collection == Collection::Orders {
                        self.mirror(collection, &docs).await;
                    }
                    return Ok(docs);
                }
                Ok(_) => {
                    debug!(collection = %collection, "remote returned no documents, reading local cache");
                }
                Err(e) => {
                    warn!(collection = %collection, error = %e, "remote list failed, reading local cache");
                }
            }
        }
        self.local.list(collection, query).await
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>, StoreError> {
        if let Some(remote) = &self.remote {
            match remote.get(collection, id).await {
                Ok(Some(doc)) => return Ok(Some(doc)),
                Ok(None) => {}
                Err(e) => {
                    warn!(collection = %collection, id = %id, error = %e, "remote get failed, reading local cache");
                }
            }
        }
        self.local.get(collection, id).await
    }

    async fn insert(&self, collection: Collection, data: Value) -> Result<Value, StoreError> {
        if let Some(remote) = &self.remote {
            match remote.insert(collection, data.clone()).await {
                Ok(doc) => return Ok(doc),
                Err(e) => {
                    warn!(collection = %collection, error = %e, "remote insert failed, writing to local cache");
                }
            }
        }
        self.local.insert(collection, data).await
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: Value,
    ) -> Result<Value, StoreError> {
        if let Some(remote) = &self.remote {
            let written = match remote.update(collection, id, patch.clone()).await {
                Ok(doc) => Some(doc),
                Err(e) => {
                    warn!(collection = %collection, id = %id, error = %e, "remote update failed, patching local cache");
                    None
                }
            };
            if let Some(doc) = written {
                // re-read so the caller sees the stored record, not the echo
                return match remote.get(collection, id).await {
                    Ok(Some(fresh)) => Ok(fresh),
                    _ => Ok(doc),
                };
            }
        }
        self.local.update(collection, id, patch).await
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
        if let Some(remote) = &self.remote {
            match remote.delete(collection, id).await {
                Ok(()) => {
                    // the record may also sit in the mirror
                    let _ = self.local.delete(collection, id).await;
                    return Ok(());
                }
                Err(e) => {
                    warn!(collection = %collection, id = %id, error = %e, "remote delete failed, removing from local cache");
                }
            }
        }
        self.local.delete(collection, id).await
    }

    async fn replace_all(
        &self,
        collection: Collection,
        docs: Vec<Value>,
    ) -> Result<(), StoreError> {
        if let Some(remote) = &self.remote {
            if let Err(e) = remote.replace_all(collection, docs.clone()).await {
                warn!(collection = %collection, error = %e, "remote replace failed, writing local cache only");
            }
        }
        self.local.replace_all(collection, docs).await
    }
}
