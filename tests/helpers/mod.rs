#![allow(dead_code)]
//! Shared fixtures for the integration suites.

use notification_service::{
    config::{Config, DeliveryConfig},
    delivery::DeliveryWorker,
    dispatcher::Dispatcher,
    internal_metrics::Metrics,
    listener::Listener,
    testing::InMemoryRegistry,
    SubscriptionEvent,
};
use std::sync::Arc;
use std::time::Duration;
use wiremock::{matchers::method, matchers::path, Mock, MockServer, Request, ResponseTemplate};

pub const TEST_CHANNEL: &str = "notifications.subscription.updated";

/// Delivery settings with a short retry delay so exhausting retries stays fast.
pub fn fast_delivery() -> DeliveryConfig {
    DeliveryConfig {
        retry_delay_ms: 20,
        request_timeout_secs: 5,
        ..Default::default()
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.delivery = fast_delivery();
    config.redis.channel = TEST_CHANNEL.to_string();
    config
}

pub fn event(app_id: i64, device_id: i64, name: &str) -> SubscriptionEvent {
    SubscriptionEvent {
        app_id,
        device_id,
        event: name.to_string(),
    }
}

/// The wire form of an event, as published on the channel.
pub fn payload(app_id: i64, device_id: i64, name: &str) -> Vec<u8> {
    serde_json::to_vec(&event(app_id, device_id, name)).unwrap()
}

pub fn dispatcher(registry: Arc<InMemoryRegistry>, max_concurrent: usize) -> Dispatcher {
    let worker = DeliveryWorker::new(&fast_delivery(), Metrics::disabled()).unwrap();
    Dispatcher::new(registry, worker, max_concurrent, Metrics::disabled())
}

pub fn listener(registry: Arc<InMemoryRegistry>) -> Listener {
    Listener::new(
        TEST_CHANNEL.to_string(),
        dispatcher(registry, 64),
        Metrics::disabled(),
    )
}

/// Mounts a POST handler on `route` that answers with `status`, optionally
/// after `delay`, and expects exactly `expected` calls.
pub async fn mount_endpoint(
    server: &MockServer,
    route: &str,
    status: u16,
    delay: Option<Duration>,
    expected: u64,
) {
    let mut response = ResponseTemplate::new(status);
    if let Some(delay) = delay {
        response = response.set_delay(delay);
    }
    Mock::given(method("POST"))
        .and(path(route))
        .respond_with(response)
        .expect(expected)
        .mount(server)
        .await;
}

/// Decodes every request body `server` has seen so far.
pub async fn received_events(server: &MockServer) -> Vec<SubscriptionEvent> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|r: &Request| serde_json::from_slice(&r.body).unwrap())
        .collect()
}
