use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use super::permissions::{Permission, PermissionSet};
use crate::cache::{read_json, write_json, CacheBackend};
use crate::errors::{Result, ServiceError};
use crate::models::{User, UserRole};
use crate::repositories::Repository;
use crate::store::{session_key, ListQuery};

/// The signed-in user as cached locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    #[serde(default)]
    pub permissions: Vec<String>,
    pub signed_in_at: DateTime<Utc>,
}

impl Session {
    pub fn from_user(user: &User) -> Self {
        Self {
            user_id: user.id.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role,
            permissions: user.permissions.clone(),
            signed_in_at: Utc::now(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub fn permission_set(&self) -> PermissionSet {
        PermissionSet::new(self.role, &self.permissions)
    }

    pub fn can(&self, permission: Permission) -> bool {
        self.permission_set().allows(permission)
    }

    pub fn require(&self, permission: Permission) -> Result<()> {
        if self.can(permission) {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(format!(
                "{} lacks permission {}",
                self.email, permission
            )))
        }
    }
}

/// Resolves identities against the authoritative user directory.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The user the provider considers signed in, if any.
    async fn current_user(&self) -> Result<Option<User>>;

    async fn sign_in(&self, email: &str) -> Result<User>;

    async fn sign_out(&self) -> Result<()>;
}

/// Identity provider backed by the `users` collection.
pub struct DirectoryIdentityProvider {
    users: Repository<User>,
    current: RwLock<Option<User>>,
}

impl DirectoryIdentityProvider {
    pub fn new(users: Repository<User>) -> Self {
        Self {
            users,
            current: RwLock::new(None),
        }
    }
}

#[async_trait]
impl IdentityProvider for DirectoryIdentityProvider {
    async fn current_user(&self) -> Result<Option<User>> {
        Ok(self.current.read().await.clone())
    }

    async fn sign_in(&self, email: &str) -> Result<User> {
        let wanted = email.trim().to_lowercase();
        let user = self
            .users
            .list(&ListQuery::all())
            .await?
            .into_iter()
            .find(|u| u.email.to_lowercase() == wanted)
            .ok_or(ServiceError::Unauthenticated)?;

        if !user.active {
            return Err(ServiceError::Forbidden(format!(
                "{} is deactivated",
                user.email
            )));
        }

        *self.current.write().await = Some(user.clone());
        Ok(user)
    }

    async fn sign_out(&self) -> Result<()> {
        *self.current.write().await = None;
        Ok(())
    }
}

/// Resolves the current user: local cached session first, then the identity
/// provider, otherwise unauthenticated.
#[derive(Clone)]
pub struct SessionManager {
    cache: Arc<dyn CacheBackend>,
    key: String,
    provider: Option<Arc<dyn IdentityProvider>>,
}

impl SessionManager {
    pub fn new(
        cache: Arc<dyn CacheBackend>,
        namespace: &str,
        provider: Option<Arc<dyn IdentityProvider>>,
    ) -> Self {
        Self {
            cache,
            key: session_key(namespace),
            provider,
        }
    }

    #[instrument(skip(self))]
    pub async fn current_user(&self) -> Result<Option<Session>> {
        match read_json::<Session>(self.cache.as_ref(), &self.key).await {
            Ok(Some(session)) => {
                debug!(user_id = %session.user_id, "session resolved from local cache");
                return Ok(Some(session));
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "cached session unreadable, ignoring"),
        }

        let Some(provider) = &self.provider else {
            return Ok(None);
        };

        match provider.current_user().await {
            Ok(Some(user)) => {
                let session = Session::from_user(&user);
                self.remember(&session).await;
                Ok(Some(session))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                warn!(error = %e, "identity provider unavailable");
                Ok(None)
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn sign_in(&self, email: &str) -> Result<Session> {
        let provider = self
            .provider
            .as_ref()
            .ok_or_else(|| ServiceError::InternalError("no identity provider configured".into()))?;

        let user = provider.sign_in(email).await?;
        let session = Session::from_user(&user);
        self.remember(&session).await;

        info!(user_id = %session.user_id, role = %session.role, "signed in");
        Ok(session)
    }

    pub async fn sign_out(&self) -> Result<()> {
        self.cache.delete(&self.key).await?;
        if let Some(provider) = &self.provider {
            if let Err(e) = provider.sign_out().await {
                warn!(error = %e, "identity provider sign-out failed");
            }
        }
        info!("signed out");
        Ok(())
    }

    /// The current session, provided it holds `permission`.
    pub async fn require(&self, permission: Permission) -> Result<Session> {
        let session = self
            .current_user()
            .await?
            .ok_or(ServiceError::Unauthenticated)?;
        session.require(permission)?;
        Ok(session)
    }

    async fn remember(&self, session: &Session) {
        if let Err(e) = write_json(self.cache.as_ref(), &self.key, session).await {
            warn!(error = %e, "failed to cache session locally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::permissions::{Action, Module};
    use crate::cache::InMemoryCache;
    use crate::events::EventBus;
    use crate::store::{FallbackStore, LocalDocumentStore};

    async fn setup() -> (SessionManager, Arc<InMemoryCache>) {
        let cache = Arc::new(InMemoryCache::new());
        let local = LocalDocumentStore::new(cache.clone(), "t");
        let users: Repository<User> =
            Repository::new(Arc::new(FallbackStore::local_only(local)), EventBus::default());

        let mut seller = User::new("Vera@Shop.com", "Vera", UserRole::Seller);
        seller.permissions = vec!["orders:view".into()];
        users.create(&seller).await.unwrap();

        let provider: Arc<dyn IdentityProvider> = Arc::new(DirectoryIdentityProvider::new(users));
        (SessionManager::new(cache.clone(), "t", Some(provider)), cache)
    }

    #[tokio::test]
    async fn sign_in_caches_session_locally() {
        let (sessions, cache) = setup().await;
        assert!(sessions.current_user().await.unwrap().is_none());

        let session = sessions.sign_in("vera@shop.com").await.unwrap();
        assert_eq!(session.name, "Vera");
        assert!(cache.get("t_session").await.unwrap().is_some());

        // a fresh manager without a provider still sees the cached session
        let offline = SessionManager::new(cache, "t", None);
        assert_eq!(offline.current_user().await.unwrap().unwrap().user_id, session.user_id);
    }

    #[tokio::test]
    async fn require_checks_permissions() {
        let (sessions, _) = setup().await;
        assert!(matches!(
            sessions.require(Permission::new(Module::Orders, Action::View)).await,
            Err(ServiceError::Unauthenticated)
        ));

        sessions.sign_in("vera@shop.com").await.unwrap();
        assert!(sessions
            .require(Permission::new(Module::Orders, Action::View))
            .await
            .is_ok());
        assert!(matches!(
            sessions.require(Permission::new(Module::Users, Action::Create)).await,
            Err(ServiceError::Forbidden(_))
        ));

        sessions.sign_out().await.unwrap();
        assert!(sessions.current_user().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_email_is_unauthenticated() {
        let (sessions, _) = setup().await;
        assert!(matches!(
            sessions.sign_in("ghost@shop.com").await,
            Err(ServiceError::Unauthenticated)
        ));
    }
}
