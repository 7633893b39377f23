use notification_service::testing::InMemoryRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[path = "../helpers/mod.rs"]
mod helpers;
use helpers::{dispatcher, event, mount_endpoint, received_events};

#[tokio::test]
async fn test_every_endpoint_receives_the_same_body() {
    let server = MockServer::start().await;
    let routes = ["/one", "/two", "/three", "/four", "/five"];
    for route in routes {
        mount_endpoint(&server, route, 200, None, 1).await;
    }
    let registry = Arc::new(InMemoryRegistry::new(
        routes.iter().map(|r| format!("{}{}", server.uri(), r)).collect(),
    ));
    let sent = event(7, 42, "subscription.renewed");

    let summary = dispatcher(registry, 64)
        .dispatch(&sent, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.delivered, routes.len());
    let received = received_events(&server).await;
    assert_eq!(received.len(), routes.len());
    assert!(received.iter().all(|e| *e == sent));
}

#[tokio::test]
async fn test_identical_events_are_delivered_twice() {
    let server = MockServer::start().await;
    mount_endpoint(&server, "/hook", 200, None, 2).await;
    let registry = Arc::new(InMemoryRegistry::new(vec![format!("{}/hook", server.uri())]));
    let dispatcher = dispatcher(registry, 64);
    let sent = event(1, 2, "expired");

    for _ in 0..2 {
        let summary = dispatcher
            .dispatch(&sent, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.delivered, 1);
    }
}

#[tokio::test]
async fn test_registry_is_read_fresh_for_each_event() {
    let server = MockServer::start().await;
    mount_endpoint(&server, "/old", 200, None, 1).await;
    mount_endpoint(&server, "/new", 200, None, 1).await;
    let registry = Arc::new(InMemoryRegistry::new(vec![format!("{}/old", server.uri())]));
    let dispatcher = dispatcher(registry.clone(), 64);

    dispatcher
        .dispatch(&event(1, 1, "a"), &CancellationToken::new())
        .await
        .unwrap();
    registry.set_urls(vec![format!("{}/new", server.uri())]);
    dispatcher
        .dispatch(&event(1, 1, "b"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(registry.calls(), 2);
}

#[tokio::test]
async fn test_transient_failures_are_retried_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    mount_endpoint(&server, "/flaky", 200, None, 1).await;
    let registry = Arc::new(InMemoryRegistry::new(vec![format!("{}/flaky", server.uri())]));

    let summary = dispatcher(registry, 64)
        .dispatch(&event(3, 4, "started"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.delivered, 1);
    assert_eq!(summary.exhausted, 0);
    assert_eq!(summary.attempts, 3);
}

#[tokio::test]
async fn test_unreachable_endpoint_is_exhausted_without_blocking_others() {
    let server = MockServer::start().await;
    mount_endpoint(&server, "/ok", 200, None, 1).await;
    let registry = Arc::new(InMemoryRegistry::new(vec![
        "http://127.0.0.1:1/closed".to_string(),
        format!("{}/ok", server.uri()),
    ]));

    let summary = dispatcher(registry, 64)
        .dispatch(&event(5, 6, "cancelled"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.endpoints, 2);
    assert_eq!(summary.delivered, 1);
    assert_eq!(summary.exhausted, 1);
}

#[tokio::test]
async fn test_cancellation_stops_in_flight_deliveries() {
    let server = MockServer::start().await;
    mount_endpoint(&server, "/slow", 200, Some(Duration::from_secs(5)), 1).await;
    let registry = Arc::new(InMemoryRegistry::new(vec![
        format!("{}/slow", server.uri()),
        format!("{}/slow", server.uri()),
    ]));
    // Only one permit, so the second delivery is still queued when we cancel.
    let dispatcher = dispatcher(registry, 1);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let summary = tokio::time::timeout(
        Duration::from_secs(2),
        dispatcher.dispatch(&event(1, 1, "x"), &cancel),
    )
    .await
    .expect("dispatch should return promptly once cancelled")
    .unwrap();

    assert_eq!(summary.cancelled, 2);
    assert_eq!(summary.delivered, 0);
}
