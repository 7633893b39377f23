//! The callback endpoint registry backed by a MySQL table.

use crate::config::DatabaseConfig;
use crate::core::EndpointRegistry;
use async_trait::async_trait;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use sqlx::Connection;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument};

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("database connection failed: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("database query error: {0}")]
    Query(#[source] sqlx::Error),

    #[error("callback registry unavailable: {0}")]
    Unavailable(String),
}

/// Reads callback URLs from the database on every call; nothing is cached.
#[derive(Debug, Clone)]
pub struct SqlEndpointRegistry {
    pool: MySqlPool,
    query: String,
}

impl SqlEndpointRegistry {
    /// Opens the connection pool and pings the server.
    ///
    /// Failure here is a startup error: the service has no mode in which it
    /// runs without its registry.
    #[instrument(skip_all, fields(max_connections = config.max_connections))]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, RegistryError> {
        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(RegistryError::Connect)?;

        let mut conn = pool.acquire().await.map_err(RegistryError::Connect)?;
        conn.ping().await.map_err(RegistryError::Connect)?;
        drop(conn);

        info!("Connected to callback registry database");
        Ok(Self::from_pool(pool, config.callback_query.clone()))
    }

    /// Wraps an existing pool, e.g. one created lazily.
    pub fn from_pool(pool: MySqlPool, query: String) -> Self {
        Self { pool, query }
    }

    /// Closes every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
        debug!("Callback registry pool closed");
    }
}

#[async_trait]
impl EndpointRegistry for SqlEndpointRegistry {
    async fn callback_urls(&self) -> Result<Vec<String>, RegistryError> {
        let urls = sqlx::query_scalar::<_, String>(&self.query)
            .fetch_all(&self.pool)
            .await
            .map_err(RegistryError::Query)?;
        debug!(count = urls.len(), "Fetched callback URLs");
        Ok(urls)
    }
}
