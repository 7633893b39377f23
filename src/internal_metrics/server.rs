//! # Metrics Server
//!
//! An `axum` server exposing `/metrics` in the Prometheus exposition format.
//! It stops serving when the shutdown token is cancelled.

use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::future::Future;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, trace};

/// A server that exposes metrics to a Prometheus scraper.
pub struct MetricsServer {
    listener: TcpListener,
    prom_handle: PrometheusHandle,
    shutdown: CancellationToken,
}

impl MetricsServer {
    /// Creates a new `MetricsServer` but does not spawn it.
    ///
    /// # Arguments
    ///
    /// * `listener` - A `TcpListener` that has already been bound to an address.
    /// * `prom_handle` - A `PrometheusHandle` used to render the metrics.
    /// * `shutdown` - Cancelled when the service shuts down.
    pub fn new(
        listener: TcpListener,
        prom_handle: PrometheusHandle,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            listener,
            prom_handle,
            shutdown,
        }
    }

    /// Returns a future that runs the server until shutdown is requested.
    pub fn run(self) -> impl Future<Output = ()> {
        let prom_handle = self.prom_handle;
        let app = Router::new().route(
            "/metrics",
            get(move || {
                let prom_handle = prom_handle.clone();
                async move { prom_handle.render() }
            }),
        );
        let shutdown = self.shutdown;
        let listener = self.listener;

        async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await;
            if let Err(e) = result {
                error!("Metrics server error: {}", e);
            }
            trace!("Metrics server task finished.");
        }
    }
}
