use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Schema, Statement,
};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::entities::Document;
use crate::errors::{Result, ServiceError};

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Configuration for the remote store connection
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Database connection URL
    pub url: String,
    /// Maximum number of connections
    pub max_connections: u32,
    /// Connection timeout duration
    pub connect_timeout: Duration,
    /// Acquire connection timeout
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 5,
            connect_timeout: Duration::from_secs(10),
            acquire_timeout: Duration::from_secs(8),
        }
    }
}

impl DbConfig {
    /// Remote store settings from the application config, if a remote is
    /// configured at all.
    pub fn from_app_config(cfg: &AppConfig) -> Option<Self> {
        cfg.remote_url.as_ref().map(|url| Self {
            url: url.clone(),
            max_connections: cfg.remote_max_connections,
            connect_timeout: Duration::from_secs(cfg.remote_connect_timeout_secs),
            ..Default::default()
        })
    }
}

/// Establishes a connection pool to the remote store and makes sure the
/// `documents` table exists.
///
/// # Errors
/// Returns a `ServiceError::DatabaseError` if the connection cannot be
/// established or the schema cannot be created.
pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool> {
    debug!("Configuring database connection with: {:?}", config);

    let mut opt = ConnectOptions::new(config.url.clone());
    opt.max_connections(config.max_connections)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .sqlx_logging(false);

    let db_pool = Database::connect(opt).await?;
    create_tables(&db_pool).await?;

    info!(
        max_connections = config.max_connections,
        "Remote store connection established"
    );
    Ok(db_pool)
}

/// Creates the document table from the entity definition.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut documents = schema.create_table_from_entity(Document);
    documents.if_not_exists();

    db.execute(builder.build(&documents)).await?;
    Ok(())
}

/// Cheap round trip used to decide whether the remote store is reachable.
pub async fn ping(db: &DatabaseConnection) -> Result<()> {
    let backend = db.get_database_backend();
    db.query_one(Statement::from_string(backend, "SELECT 1".to_string()))
        .await?
        .ok_or_else(|| ServiceError::StoreError("ping returned no row".to_string()))?;
    Ok(())
}
