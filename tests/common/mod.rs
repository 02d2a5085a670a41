#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;

use prodboard::{
    auth::Session,
    cache::{CacheBackend, InMemoryCache},
    config::AppConfig,
    models::{Customer, Order, Product, UserRole},
    services::{users::NewUser, NewOrder, NewOrderItem},
    store::{Collection, DocumentStore, ListQuery, StoreError},
    AppContext,
};

/// Remote store that is always down.
pub struct FailingStore;

fn down() -> StoreError {
    StoreError::Unavailable("connection refused".into())
}

#[async_trait]
impl DocumentStore for FailingStore {
    fn backend_name(&self) -> &'static str {
        "failing"
    }

    async fn list(&self, _: Collection, _: &ListQuery) -> Result<Vec<Value>, StoreError> {
        Err(down())
    }

    async fn get(&self, _: Collection, _: &str) -> Result<Option<Value>, StoreError> {
        Err(down())
    }

    async fn insert(&self, _: Collection, _: Value) -> Result<Value, StoreError> {
        Err(down())
    }

    async fn update(&self, _: Collection, _: &str, _: Value) -> Result<Value, StoreError> {
        Err(down())
    }

    async fn delete(&self, _: Collection, _: &str) -> Result<(), StoreError> {
        Err(down())
    }

    async fn replace_all(&self, _: Collection, _: Vec<Value>) -> Result<(), StoreError> {
        Err(down())
    }
}

/// Application context over an in-memory cache with an administrator
/// already signed in.
pub struct TestApp {
    pub ctx: AppContext,
    pub cache: Arc<dyn CacheBackend>,
    pub admin: Session,
}

impl TestApp {
    /// Local-only application.
    pub async fn new() -> Self {
        Self::build(AppConfig::local_only(), None).await
    }

    /// Application whose remote store fails every call.
    pub async fn with_failing_remote() -> Self {
        Self::build(AppConfig::local_only(), Some(Arc::new(FailingStore))).await
    }

    pub async fn with_config(config: AppConfig) -> Self {
        Self::build(config, None).await
    }

    pub async fn with_remote(remote: Arc<dyn DocumentStore>) -> Self {
        Self::build(AppConfig::local_only(), Some(remote)).await
    }

    async fn build(config: AppConfig, remote: Option<Arc<dyn DocumentStore>>) -> Self {
        let cache: Arc<dyn CacheBackend> = Arc::new(InMemoryCache::new());
        let ctx = AppContext::with_parts(config, Arc::clone(&cache), remote);
        let admin_user = ctx
            .users
            .bootstrap_admin("admin@oficina.com", "Admin")
            .await
            .expect("bootstrap admin");
        let admin = Session::from_user(&admin_user);
        Self { ctx, cache, admin }
    }

    /// Creates a user and returns a session for them.
    pub async fn session_for(&self, email: &str, role: UserRole, permissions: &[&str]) -> Session {
        let user = self
            .ctx
            .users
            .create_user(
                NewUser {
                    email: email.to_string(),
                    name: email.split('@').next().unwrap_or(email).to_string(),
                    role,
                    permissions: permissions.iter().map(|p| p.to_string()).collect(),
                },
                &self.admin,
            )
            .await
            .expect("create user");
        Session::from_user(&user)
    }

    pub async fn seed_customer(&self, name: &str) -> Customer {
        let mut customer = Customer::new(name);
        customer.phone = Some("(11) 99999-0000".into());
        self.ctx
            .customers
            .create_customer(customer, &self.admin)
            .await
            .expect("seed customer")
    }

    pub async fn seed_product(&self, name: &str, sku: &str, price: Decimal) -> Product {
        self.ctx
            .products
            .create_product(Product::new(name, sku, price), &self.admin)
            .await
            .expect("seed product")
    }

    /// One-line order of `quantity` units at `price`, sold by `session`.
    pub async fn seed_order(&self, session: &Session, quantity: i64, price: Decimal) -> Order {
        let customer = self.seed_customer("Maria Souza").await;
        let sku = format!("SKU-{}", uuid_suffix());
        let product = self.seed_product("Camiseta", &sku, price).await;
        self.ctx
            .orders
            .create_order(
                NewOrder {
                    customer_id: customer.id,
                    items: vec![NewOrderItem::new(product.id, quantity, None)],
                    ..Default::default()
                },
                session,
            )
            .await
            .expect("seed order")
    }
}

fn uuid_suffix() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}
