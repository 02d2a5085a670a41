//! Production dashboard core
//!
//! Orders move through a fixed production pipeline, can be split into
//! scheduled fragments, and are persisted remote-first with a local JSON
//! fallback. The `prodboard` binary is a thin CLI over this library.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod backup;
pub mod cache;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod models;
pub mod normalize;
pub mod reports;
pub mod repositories;
pub mod services;
pub mod store;

use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::{DirectoryIdentityProvider, IdentityProvider, SessionManager};
use crate::backup::BackupService;
use crate::cache::{CacheBackend, CacheFactory};
use crate::config::AppConfig;
use crate::errors::Result;
use crate::events::EventBus;
use crate::models::{Customer, Order, Product, User};
use crate::repositories::Repository;
use crate::services::customers::CustomerService;
use crate::services::products::ProductService;
use crate::services::users::UserService;
use crate::services::{FragmentService, OrderService, OrderStatusService, SettingsService};
use crate::store::{DocumentStore, FallbackStore, LocalDocumentStore, RemoteDocumentStore};

/// Every service wired over one store, one cache and one event bus.
#[derive(Clone)]
pub struct AppContext {
    pub config: AppConfig,
    pub events: EventBus,
    pub store: Arc<FallbackStore>,
    pub sessions: SessionManager,
    pub orders: OrderService,
    pub order_status: OrderStatusService,
    pub fragments: FragmentService,
    pub customers: CustomerService,
    pub products: ProductService,
    pub users: UserService,
    pub settings: SettingsService,
    pub backup: BackupService,
}

impl AppContext {
    /// Opens the local cache, tries the remote store and wires the services.
    /// An unreachable remote is logged and the context runs local-only.
    pub async fn initialize(config: AppConfig) -> Result<Self> {
        let cache = CacheFactory::create_cache(config.local_dir.as_deref()).await?;

        let remote: Option<Arc<dyn DocumentStore>> = match db::DbConfig::from_app_config(&config)
            .filter(|_| config.has_remote())
        {
            Some(db_config) => match db::establish_connection_with_config(&db_config).await {
                Ok(pool) => {
                    let remote: Arc<dyn DocumentStore> =
                        Arc::new(RemoteDocumentStore::new(Arc::new(pool)));
                    Some(remote)
                }
                Err(e) => {
                    warn!(error = %e, "remote store unreachable, running on the local cache");
                    None
                }
            },
            None => None,
        };

        Ok(Self::with_parts(config, cache, remote))
    }

    /// Wires the services over an already opened cache and optional remote.
    pub fn with_parts(
        config: AppConfig,
        cache: Arc<dyn CacheBackend>,
        remote: Option<Arc<dyn DocumentStore>>,
    ) -> Self {
        let namespace = config.storage_namespace.clone();
        let events = EventBus::new(config.event_channel_capacity);
        let local = LocalDocumentStore::new(Arc::clone(&cache), namespace.clone());
        let store = Arc::new(FallbackStore::new(remote, local.clone()));
        let gateway: Arc<dyn DocumentStore> = store.clone();

        let orders_repo: Repository<Order> = Repository::new(Arc::clone(&gateway), events.clone());
        let customers_repo: Repository<Customer> =
            Repository::new(Arc::clone(&gateway), events.clone());
        let products_repo: Repository<Product> =
            Repository::new(Arc::clone(&gateway), events.clone());
        let users_repo: Repository<User> = Repository::new(Arc::clone(&gateway), events.clone());

        let provider: Arc<dyn IdentityProvider> =
            Arc::new(DirectoryIdentityProvider::new(users_repo.clone()));
        let sessions = SessionManager::new(Arc::clone(&cache), &namespace, Some(provider));

        let order_status = OrderStatusService::new(orders_repo.clone(), events.clone());
        let orders = OrderService::new(
            orders_repo.clone(),
            customers_repo.clone(),
            products_repo.clone(),
            order_status.clone(),
            config.order_number_attempts,
        );
        let fragments = FragmentService::new(
            orders_repo,
            order_status.clone(),
            events.clone(),
            config.auto_advance_fragments,
        );

        info!(
            remote = store.has_remote(),
            namespace = %namespace,
            "application context ready"
        );

        Self {
            events: events.clone(),
            sessions,
            orders,
            order_status,
            fragments,
            customers: CustomerService::new(customers_repo),
            products: ProductService::new(products_repo),
            users: UserService::new(users_repo),
            settings: SettingsService::new(Arc::clone(&cache), namespace, events.clone()),
            backup: BackupService::new(gateway, local, events),
            store,
            config,
        }
    }

    pub fn is_local_only(&self) -> bool {
        !self.store.has_remote()
    }
}
