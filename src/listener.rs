//! The top-level consume loop and its Redis pub/sub message source.
//!
//! Messages are handled strictly one at a time: the next message is not read
//! until every delivery for the current one has finished.

use crate::core::MessageSource;
use crate::decoder::{decode_event, DecodeError};
use crate::dispatcher::{DispatchError, DispatchSummary, Dispatcher};
use crate::internal_metrics::Metrics;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum ListenerError {
    #[error("failed to subscribe to channel {channel}: {source}")]
    Subscribe {
        channel: String,
        #[source]
        source: redis::RedisError,
    },

    #[error("subscription to channel {0} closed")]
    SubscriptionClosed(String),
}

/// Why a single message produced no deliveries.
#[derive(Error, Debug)]
pub enum MessageError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl MessageError {
    /// True when the dispatch was cut short by shutdown rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Dispatch(DispatchError::Cancelled))
    }
}

/// A live subscription to one Redis pub/sub channel.
pub struct RedisSubscription {
    channel: String,
    messages: BoxStream<'static, redis::Msg>,
}

impl RedisSubscription {
    /// Connects to Redis and subscribes to `channel`.
    pub async fn connect(url: &str, channel: &str) -> Result<Self, ListenerError> {
        let subscribe_error = |source| ListenerError::Subscribe {
            channel: channel.to_string(),
            source,
        };

        let client = redis::Client::open(url).map_err(subscribe_error)?;
        let mut pubsub = client.get_async_pubsub().await.map_err(subscribe_error)?;
        pubsub.subscribe(channel).await.map_err(subscribe_error)?;
        info!(channel, "Subscribed to Redis channel");

        Ok(Self {
            channel: channel.to_string(),
            messages: pubsub.into_on_message().boxed(),
        })
    }
}

#[async_trait]
impl MessageSource for RedisSubscription {
    async fn next_message(&mut self) -> Option<Vec<u8>> {
        let msg = self.messages.next().await?;
        if msg.get_channel_name() != self.channel {
            debug!(channel = msg.get_channel_name(), "Message from unexpected channel");
        }
        Some(msg.get_payload_bytes().to_vec())
    }
}

/// Pulls messages from a `MessageSource` and hands each to the dispatcher.
pub struct Listener {
    channel: String,
    dispatcher: Dispatcher,
    metrics: Metrics,
}

impl Listener {
    pub fn new(channel: String, dispatcher: Dispatcher, metrics: Metrics) -> Self {
        Self {
            channel,
            dispatcher,
            metrics,
        }
    }

    /// Consumes messages until the subscription closes or `cancel` fires.
    ///
    /// # Returns
    /// * `Ok(())` when stopped by cancellation
    /// * `Err(ListenerError::SubscriptionClosed)` when the transport ends the
    ///   subscription on its own; the caller decides whether that is fatal
    pub async fn run<S>(&self, source: &mut S, cancel: &CancellationToken) -> Result<(), ListenerError>
    where
        S: MessageSource + ?Sized,
    {
        info!(channel = %self.channel, "Service started. Listening to channel...");

        loop {
            let message = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Listener received shutdown signal.");
                    return Ok(());
                }
                message = source.next_message() => message,
            };

            let Some(payload) = message else {
                if cancel.is_cancelled() {
                    return Ok(());
                }
                error!(channel = %self.channel, "Subscription closed by the transport");
                return Err(ListenerError::SubscriptionClosed(self.channel.clone()));
            };

            self.metrics.events_received_total.increment(1);
            match self.process_message(&payload, cancel).await {
                Ok(summary) => debug!(?summary, "Message processed"),
                Err(MessageError::Decode(e)) => {
                    self.metrics.events_rejected_total.increment(1);
                    warn!(error = %e, "Dropping malformed message");
                }
                Err(e) if e.is_cancelled() => {
                    debug!("Dispatch interrupted by shutdown");
                }
                Err(MessageError::Dispatch(e)) => {
                    error!("Message processing error: {}", e);
                }
            }
        }
    }

    /// Decodes one payload and dispatches it, waiting for every delivery.
    pub async fn process_message(
        &self,
        payload: &[u8],
        cancel: &CancellationToken,
    ) -> Result<DispatchSummary, MessageError> {
        let event = decode_event(payload)?;
        Ok(self.dispatcher.dispatch(&event, cancel).await?)
    }
}
