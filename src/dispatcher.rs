//! Fans a single event out to every registered callback endpoint.
//!
//! ```text
//! dispatch(event)
//!   ├─ registry.callback_urls()        // fresh snapshot, may be empty
//!   ├─ serde_json::to_vec(event)       // once, shared as Bytes
//!   ├─ JoinSet: one task per endpoint
//!   │    ├─ acquire semaphore permit   // caps in-flight deliveries
//!   │    └─ DeliveryWorker::deliver()  // retry loop, never errors
//!   └─ join all → DispatchSummary
//! ```

use crate::core::{EndpointRegistry, SubscriptionEvent};
use crate::delivery::{DeliveryOutcome, DeliveryWorker};
use crate::internal_metrics::Metrics;
use crate::registry::RegistryError;
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

/// Reasons a dispatch was abandoned before any delivery started.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("failed to get callback URLs: {0}")]
    Registry(#[from] RegistryError),

    #[error("JSON marshaling error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("dispatch cancelled before deliveries started")]
    Cancelled,
}

/// Per-outcome tally of one event's deliveries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub endpoints: usize,
    pub delivered: usize,
    pub exhausted: usize,
    pub cancelled: usize,
    /// Delivery tasks that panicked.
    pub aborted: usize,
    /// Requests started across all endpoints, retries included.
    pub attempts: usize,
}

impl DispatchSummary {
    fn record(&mut self, outcome: DeliveryOutcome) {
        self.attempts += outcome.attempts() as usize;
        match outcome {
            DeliveryOutcome::Delivered { .. } => self.delivered += 1,
            DeliveryOutcome::Exhausted { .. } => self.exhausted += 1,
            DeliveryOutcome::Cancelled { .. } => self.cancelled += 1,
        }
    }
}

pub struct Dispatcher {
    registry: Arc<dyn EndpointRegistry>,
    worker: DeliveryWorker,
    limiter: Arc<Semaphore>,
    metrics: Metrics,
}

impl Dispatcher {
    /// Creates a dispatcher allowing at most `max_concurrent_deliveries`
    /// requests in flight at once.
    pub fn new(
        registry: Arc<dyn EndpointRegistry>,
        worker: DeliveryWorker,
        max_concurrent_deliveries: usize,
        metrics: Metrics,
    ) -> Self {
        Self {
            registry,
            worker,
            limiter: Arc::new(Semaphore::new(max_concurrent_deliveries.max(1))),
            metrics,
        }
    }

    /// Delivers `event` to every endpoint registered right now and waits for
    /// all of them to reach a terminal outcome.
    ///
    /// Errors are only returned when nothing was sent. Once deliveries are
    /// launched, their failures are reported through the summary.
    #[instrument(skip_all, fields(app_id = event.app_id, device_id = event.device_id))]
    pub async fn dispatch(
        &self,
        event: &SubscriptionEvent,
        cancel: &CancellationToken,
    ) -> Result<DispatchSummary, DispatchError> {
        info!(
            "New event received: AppID: {}, DeviceID: {}, Event: {}",
            event.app_id, event.device_id, event.event
        );

        let lookup = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DispatchError::Cancelled),
            result = self.registry.callback_urls() => result,
        };
        let endpoints =
            lookup.inspect_err(|_| self.metrics.increment_dispatch_failure("registry"))?;

        let payload = serde_json::to_vec(event)
            .map(Bytes::from)
            .inspect_err(|_| self.metrics.increment_dispatch_failure("serialization"))?;

        let mut summary = DispatchSummary {
            endpoints: endpoints.len(),
            ..Default::default()
        };
        if endpoints.is_empty() {
            debug!("No callback endpoints registered, nothing to deliver");
            return Ok(summary);
        }

        let mut deliveries = JoinSet::new();
        for endpoint in endpoints {
            let worker = self.worker.clone();
            let limiter = self.limiter.clone();
            let payload = payload.clone();
            let cancel = cancel.clone();

            deliveries.spawn(async move {
                let _permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return DeliveryOutcome::Cancelled { attempts: 0 },
                    permit = limiter.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return DeliveryOutcome::Cancelled { attempts: 0 },
                    },
                };
                worker.deliver(&endpoint, payload, &cancel).await
            });
        }

        while let Some(joined) = deliveries.join_next().await {
            match joined {
                Ok(outcome) => summary.record(outcome),
                Err(e) => {
                    error!(error = %e, "Delivery task failed to complete");
                    summary.aborted += 1;
                }
            }
        }

        debug!(
            endpoints = summary.endpoints,
            delivered = summary.delivered,
            exhausted = summary.exhausted,
            cancelled = summary.cancelled,
            attempts = summary.attempts,
            "Dispatch finished"
        );
        Ok(summary)
    }
}
