//! # Internal Metrics Module
//!
//! Collection and exposure of service metrics.
//!
//! - **`MetricsBuilder`**: installs the Prometheus recorder, binds the
//!   metrics listener and constructs the `Metrics` handle.
//! - **`Metrics`**: a cloneable handle the dispatcher and delivery workers use
//!   to record events and delivery outcomes.
//! - **`MetricsServer`**: (Defined in `server.rs`) an `axum` server exposing
//!   `/metrics` for Prometheus to scrape.

use crate::config::MetricsConfig;
use crate::internal_metrics::server::MetricsServer;
use metrics::{Counter, Histogram, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::error;

pub mod server;

/// The public API for the metrics system.
///
/// This struct holds cloneable handles to the metrics collectors. Labelled
/// counters are created at the call site.
#[derive(Clone)]
pub struct Metrics {
    pub events_received_total: Counter,
    pub events_rejected_total: Counter,
    pub delivery_attempts_total: Counter,
    pub delivery_duration_seconds: Histogram,
    labelled: bool,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Metrics {
    /// Creates a new `Metrics` instance and registers descriptions for all
    /// supported metrics with the global recorder.
    pub fn new() -> Self {
        metrics::describe_counter!("events_received_total", Unit::Count, "Total number of messages received from the event channel.");
        metrics::describe_counter!("events_rejected_total", Unit::Count, "Total number of messages that could not be decoded into an event.");
        metrics::describe_counter!("dispatch_failures_total", Unit::Count, "Total number of events whose dispatch was aborted before any delivery, labeled by reason.");
        metrics::describe_counter!("delivery_attempts_total", Unit::Count, "Total number of HTTP callback attempts.");
        metrics::describe_counter!("deliveries_total", Unit::Count, "Total number of deliveries that reached a terminal outcome, labeled by outcome.");
        metrics::describe_histogram!("delivery_duration_seconds", Unit::Seconds, "Time from the first attempt to the terminal outcome of a delivery.");

        Self {
            events_received_total: metrics::counter!("events_received_total"),
            events_rejected_total: metrics::counter!("events_rejected_total"),
            delivery_attempts_total: metrics::counter!("delivery_attempts_total"),
            delivery_duration_seconds: metrics::histogram!("delivery_duration_seconds"),
            labelled: true,
        }
    }

    /// Creates a `Metrics` instance that performs no operations.
    /// Used when metrics are disabled in the configuration.
    pub fn disabled() -> Self {
        Self {
            events_received_total: Counter::noop(),
            events_rejected_total: Counter::noop(),
            delivery_attempts_total: Counter::noop(),
            delivery_duration_seconds: Histogram::noop(),
            labelled: false,
        }
    }

    /// Increments the counter for an aborted dispatch.
    pub fn increment_dispatch_failure(&self, reason: &'static str) {
        if self.labelled {
            metrics::counter!("dispatch_failures_total", "reason" => reason).increment(1);
        }
    }

    /// Records a delivery that reached a terminal outcome.
    pub fn record_delivery(&self, outcome: &'static str, elapsed: Duration) {
        if self.labelled {
            metrics::counter!("deliveries_total", "outcome" => outcome).increment(1);
        }
        self.delivery_duration_seconds.record(elapsed.as_secs_f64());
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Builder for the metrics system.
///
/// This builder is responsible for initializing the `PrometheusRecorder`,
/// binding the `MetricsServer` listener, and creating the `Metrics` handle.
pub struct MetricsBuilder {
    config: MetricsConfig,
}

impl MetricsBuilder {
    pub fn new(config: MetricsConfig) -> Self {
        Self { config }
    }

    /// Initializes the metrics system and returns a `Metrics` handle and an
    /// optional `MetricsServer` together with its bound address.
    ///
    /// Metrics are an optional surface: if the listener cannot be bound or the
    /// recorder cannot be installed, the error is logged and a disabled
    /// handle is returned instead of failing startup.
    pub fn build(
        self,
        shutdown: CancellationToken,
    ) -> (Metrics, Option<(MetricsServer, SocketAddr)>) {
        if !self.config.enabled {
            return (Metrics::disabled(), None);
        }

        let recorder = match PrometheusBuilder::new().set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0],
        ) {
            Ok(builder) => builder.build_recorder(),
            Err(e) => {
                error!("Failed to configure Prometheus buckets: {}", e);
                return (Metrics::disabled(), None);
            }
        };
        let handle = recorder.handle();

        // Bind before installing the recorder so a bind failure leaves no
        // global state behind.
        let listener = match std::net::TcpListener::bind(self.config.listen_address) {
            Ok(listener) => listener,
            Err(e) => {
                error!(
                    "Failed to bind metrics server to {}: {}",
                    self.config.listen_address, e
                );
                return (Metrics::disabled(), None);
            }
        };

        let (listener, addr) = match into_tokio_listener(listener) {
            Ok(bound) => bound,
            Err(e) => {
                error!("Failed to prepare metrics listener: {}", e);
                return (Metrics::disabled(), None);
            }
        };

        if let Err(e) = metrics::set_global_recorder(recorder) {
            error!("Failed to install Prometheus recorder: {}", e);
            return (Metrics::disabled(), None);
        }

        let metrics = Metrics::new();
        let server = MetricsServer::new(listener, handle, shutdown);

        (metrics, Some((server, addr)))
    }
}

/// The listener must be non-blocking to be used with Tokio.
fn into_tokio_listener(
    listener: std::net::TcpListener,
) -> std::io::Result<(TcpListener, SocketAddr)> {
    listener.set_nonblocking(true)?;
    let addr = listener.local_addr()?;
    Ok((TcpListener::from_std(listener)?, addr))
}
