//! HTTP callback delivery with a fixed retry budget.
//!
//! One `DeliveryWorker` is shared by every delivery in the process; the
//! underlying `reqwest::Client` pools connections across endpoints and events.

use crate::config::DeliveryConfig;
use crate::internal_metrics::Metrics;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::{redirect, StatusCode};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Why a single attempt failed.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("failed to read response body: {0}")]
    Body(#[source] reqwest::Error),

    #[error("unexpected status code: {status}, body: {body}")]
    UnexpectedStatus { status: StatusCode, body: String },
}

impl DeliveryError {
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Request(e) | Self::Body(e) => e.is_timeout(),
            _ => false,
        }
    }
}

/// Terminal state of one endpoint's delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The endpoint answered 200 on attempt `attempts`.
    Delivered { attempts: u32 },
    /// Every attempt failed.
    Exhausted { attempts: u32 },
    /// Shutdown interrupted the delivery after `attempts` were started.
    Cancelled { attempts: u32 },
}

impl DeliveryOutcome {
    /// How many requests were started before reaching this outcome.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Delivered { attempts }
            | Self::Exhausted { attempts }
            | Self::Cancelled { attempts } => *attempts,
        }
    }

    /// The metric label for this outcome.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Delivered { .. } => "delivered",
            Self::Exhausted { .. } => "exhausted",
            Self::Cancelled { .. } => "cancelled",
        }
    }
}

/// Posts event payloads to callback endpoints.
#[derive(Debug, Clone)]
pub struct DeliveryWorker {
    client: reqwest::Client,
    max_attempts: u32,
    retry_delay: Duration,
    metrics: Metrics,
}

impl DeliveryWorker {
    /// Builds the shared HTTP client from the delivery settings.
    pub fn new(config: &DeliveryConfig, metrics: Metrics) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.as_str())
            // A redirect is a non-200 answer, not something to chase.
            .redirect(redirect::Policy::none())
            .build()
            .map_err(DeliveryError::Client)?;
        Ok(Self::with_client(client, config, metrics))
    }

    /// Uses a caller-supplied client; the retry settings still come from `config`.
    pub fn with_client(client: reqwest::Client, config: &DeliveryConfig, metrics: Metrics) -> Self {
        Self {
            client,
            max_attempts: config.max_attempts.max(1),
            retry_delay: config.retry_delay(),
            metrics,
        }
    }

    /// Delivers `payload` to `endpoint`, retrying failed attempts after a fixed delay.
    ///
    /// Never returns an error: every failure is logged here and folded into
    /// the returned outcome. Cancellation interrupts both an in-flight
    /// request and the retry delay.
    #[instrument(skip_all, fields(endpoint = %endpoint))]
    pub async fn deliver(
        &self,
        endpoint: &str,
        payload: Bytes,
        cancel: &CancellationToken,
    ) -> DeliveryOutcome {
        let started = Instant::now();
        let outcome = self.attempt_all(endpoint, payload, cancel).await;
        self.metrics.record_delivery(outcome.label(), started.elapsed());
        outcome
    }

    async fn attempt_all(
        &self,
        endpoint: &str,
        payload: Bytes,
        cancel: &CancellationToken,
    ) -> DeliveryOutcome {
        for attempt in 1..=self.max_attempts {
            self.metrics.delivery_attempts_total.increment(1);

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(attempt, "Delivery cancelled during request");
                    return DeliveryOutcome::Cancelled { attempts: attempt };
                }
                result = self.send_request(endpoint, payload.clone()) => result,
            };

            match result {
                Ok(()) => {
                    info!(
                        "Successfully sent notification to {} on attempt {}",
                        endpoint, attempt
                    );
                    return DeliveryOutcome::Delivered { attempts: attempt };
                }
                Err(e) => {
                    warn!(attempt, timeout = e.is_timeout(), error = %e, "Attempt {} failed for {}", attempt, endpoint);
                }
            }

            if attempt < self.max_attempts {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!(attempt, "Delivery cancelled during retry delay");
                        return DeliveryOutcome::Cancelled { attempts: attempt };
                    }
                    _ = sleep(self.retry_delay) => {}
                }
            }
        }

        error!(
            "Max retry attempts reached for endpoint {} after {} attempts",
            endpoint, self.max_attempts
        );
        DeliveryOutcome::Exhausted {
            attempts: self.max_attempts,
        }
    }

    /// Performs one POST. Only an exact 200 counts as success.
    async fn send_request(&self, endpoint: &str, payload: Bytes) -> Result<(), DeliveryError> {
        debug!(
            "[POST] Sending to {} - {}",
            endpoint,
            String::from_utf8_lossy(&payload)
        );

        let response = self
            .client
            .post(endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await
            .map_err(DeliveryError::Request)?;

        let status = response.status();
        // Drain the body even on failure so the connection can be reused.
        let body = response.bytes().await.map_err(DeliveryError::Body)?;

        if status != StatusCode::OK {
            return Err(DeliveryError::UnexpectedStatus {
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        Ok(())
    }
}
