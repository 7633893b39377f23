//! The main application logic, decoupled from the entry point.

use crate::{
    config::Config,
    core::{EndpointRegistry, MessageSource},
    delivery::DeliveryWorker,
    dispatcher::Dispatcher,
    internal_metrics::{Metrics, MetricsBuilder},
    listener::{Listener, RedisSubscription},
    registry::SqlEndpointRegistry,
    task_manager::TaskManager,
};
use anyhow::{Context, Result};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Cancels `shutdown` once `signal` resolves.
///
/// If the signal listener itself fails the token is left untouched and the
/// error is returned to the caller.
pub async fn cancel_on_signal<F>(signal: F, shutdown: CancellationToken) -> std::io::Result<()>
where
    F: Future<Output = std::io::Result<()>>,
{
    signal.await?;
    info!("Shutdown signal received. Shutting down gracefully...");
    shutdown.cancel();
    Ok(())
}

/// A fully wired application, ready to consume messages.
pub struct App {
    task_manager: TaskManager,
    listener: Listener,
    source: Box<dyn MessageSource>,
    sql_registry: Option<Arc<SqlEndpointRegistry>>,
    metrics_addr: Option<SocketAddr>,
}

impl App {
    /// Creates a new `AppBuilder` to construct an `App`.
    pub fn builder(config: Config) -> AppBuilder {
        AppBuilder::new(config)
    }

    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics_addr
    }

    /// Runs the listener until the shutdown token fires or the subscription
    /// closes, then stops background tasks and releases the database pool.
    pub async fn run(self) -> Result<()> {
        let App {
            task_manager,
            listener,
            mut source,
            sql_registry,
            ..
        } = self;

        let shutdown = task_manager.shutdown_token();
        let result = listener.run(source.as_mut(), &shutdown).await;

        info!("Listener stopped. Waiting for background tasks to complete...");
        task_manager.shutdown().await;
        if let Some(registry) = sql_registry {
            registry.close().await;
        }

        result.context("Subscription error")
    }
}

/// Builder for the main application.
///
/// Production collaborators are created from the `Config` unless a test
/// supplies an override.
pub struct AppBuilder {
    config: Config,
    registry_override: Option<Arc<dyn EndpointRegistry>>,
    source_override: Option<Box<dyn MessageSource>>,
    metrics_override: Option<Metrics>,
}

impl AppBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            registry_override: None,
            source_override: None,
            metrics_override: None,
        }
    }

    /// Replaces the SQL registry, skipping the database connection.
    pub fn registry_override(mut self, registry: Arc<dyn EndpointRegistry>) -> Self {
        self.registry_override = Some(registry);
        self
    }

    /// Replaces the Redis subscription, skipping the Redis connection.
    pub fn source_override(mut self, source: Box<dyn MessageSource>) -> Self {
        self.source_override = Some(source);
        self
    }

    /// Overrides the metrics system for testing.
    pub fn metrics_override(mut self, metrics: Metrics) -> Self {
        self.metrics_override = Some(metrics);
        self
    }

    /// Connects every collaborator and returns a runnable `App`.
    ///
    /// Any connection failure here is fatal: the caller should exit rather
    /// than run without a registry or a subscription.
    #[instrument(skip_all)]
    pub async fn build(self, shutdown: CancellationToken) -> Result<App> {
        let config = self.config;
        let task_manager = TaskManager::new(shutdown);

        // 1. Metrics
        let (metrics, metrics_server) = match self.metrics_override {
            Some(m) => (m, None),
            None => MetricsBuilder::new(config.metrics.clone()).build(task_manager.shutdown_token()),
        };
        let metrics_addr = if let Some((server, addr)) = metrics_server {
            info!(%addr, "Metrics server listening");
            task_manager.spawn("MetricsServer", server.run());
            Some(addr)
        } else {
            None
        };

        // 2. Endpoint registry
        let (registry, sql_registry): (Arc<dyn EndpointRegistry>, _) = match self.registry_override {
            Some(registry) => (registry, None),
            None => {
                let sql = Arc::new(
                    SqlEndpointRegistry::connect(&config.database)
                        .await
                        .context("Database initialization error")?,
                );
                info!("Connected to endpoint registry database");
                (sql.clone() as Arc<dyn EndpointRegistry>, Some(sql))
            }
        };

        // 3. Delivery
        let worker = DeliveryWorker::new(&config.delivery, metrics.clone())
            .context("Service initialization error")?;
        debug!(
            max_attempts = config.delivery.max_attempts,
            retry_delay_ms = config.delivery.retry_delay_ms,
            request_timeout_secs = config.delivery.request_timeout_secs,
            max_concurrent_deliveries = config.delivery.max_concurrent_deliveries,
            "Initialized delivery worker"
        );
        let dispatcher = Dispatcher::new(
            registry,
            worker,
            config.delivery.max_concurrent_deliveries,
            metrics.clone(),
        );

        // 4. Subscription
        let source = match self.source_override {
            Some(source) => source,
            None => Box::new(
                RedisSubscription::connect(&config.redis.url, &config.redis.channel)
                    .await
                    .context("Redis subscription error")?,
            ) as Box<dyn MessageSource>,
        };

        let listener = Listener::new(config.redis.channel.clone(), dispatcher, metrics);

        Ok(App {
            task_manager,
            listener,
            source,
            sql_registry,
            metrics_addr,
        })
    }
}
