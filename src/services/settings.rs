use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::auth::{Action, Module, Permission, Session};
use crate::cache::{read_json, write_json, CacheBackend};
use crate::errors::{Result, ServiceError};
use crate::events::{Event, EventBus};
use crate::normalize::merge_patch;
use crate::store::settings_key;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString, strum::EnumIter,
)]
#[strum(serialize_all = "snake_case")]
pub enum SettingsScope {
    Company,
    Production,
    Notifications,
}

/// Per-scope settings objects kept in the local cache.
#[derive(Clone)]
pub struct SettingsService {
    cache: Arc<dyn CacheBackend>,
    namespace: String,
    events: EventBus,
}

impl SettingsService {
    pub fn new(cache: Arc<dyn CacheBackend>, namespace: impl Into<String>, events: EventBus) -> Self {
        Self {
            cache,
            namespace: namespace.into(),
            events,
        }
    }

    /// The stored object, or `{}` when nothing was saved yet.
    pub async fn get(&self, scope: SettingsScope) -> Result<Value> {
        let key = settings_key(&self.namespace, &scope.to_string());
        match read_json::<Value>(self.cache.as_ref(), &key).await? {
            Some(value @ Value::Object(_)) => Ok(value),
            _ => Ok(Value::Object(Map::new())),
        }
    }

    #[instrument(skip(self, value, session), fields(scope = %scope))]
    pub async fn put(&self, scope: SettingsScope, value: Value, session: &Session) -> Result<Value> {
        session.require(Permission::new(Module::Settings, Action::Edit))?;
        if !value.is_object() {
            return Err(ServiceError::ValidationError(
                "Settings must be a JSON object".into(),
            ));
        }
        self.write(scope, &value).await?;
        Ok(value)
    }

    /// Shallow merge of `patch` into the stored object.
    #[instrument(skip(self, patch, session), fields(scope = %scope))]
    pub async fn merge(&self, scope: SettingsScope, patch: Value, session: &Session) -> Result<Value> {
        session.require(Permission::new(Module::Settings, Action::Edit))?;
        if !patch.is_object() {
            return Err(ServiceError::ValidationError(
                "Settings must be a JSON object".into(),
            ));
        }
        let mut current = self.get(scope).await?;
        merge_patch(&mut current, &patch);
        self.write(scope, &current).await?;
        Ok(current)
    }

    async fn write(&self, scope: SettingsScope, value: &Value) -> Result<()> {
        let key = settings_key(&self.namespace, &scope.to_string());
        write_json(self.cache.as_ref(), &key, value).await?;
        info!("settings saved");
        self.events.publish(Event::SettingsChanged(scope.to_string()));
        Ok(())
    }
}
