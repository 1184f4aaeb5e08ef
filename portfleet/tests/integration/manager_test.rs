//! End-to-end manager tests: listeners, shared routes, status

use super::{get, get_free_port, test_manager, wait_for_server};
use axum::Extension;
use portfleet::{ListenerContext, ListenerStatus, Method, RouteOptions, StopOutcome};
use std::collections::BTreeMap;
use std::time::Duration;

/// A route registered before any listener exists is served once one starts
#[tokio::test]
async fn test_route_added_before_start_is_reachable() {
    let manager = test_manager();
    let port = get_free_port();

    manager
        .add_route("/hello", || async { "Hello, World!" }, &[Method::GET], RouteOptions::default())
        .unwrap();
    manager.start(port).await;

    assert!(wait_for_server(port, Duration::from_secs(5)).await, "Server did not start");
    assert_eq!(get(port, "/hello").await, (200, "Hello, World!".to_string()));
    assert_eq!(get(port, "/nope").await.0, 404);

    manager.shutdown().await;
}

/// Routes added while listeners are serving show up on every port
#[tokio::test]
async fn test_route_added_after_start_is_shared() {
    let manager = test_manager();
    let (a, b) = (get_free_port(), get_free_port());

    manager.start(a).await;
    manager.start(b).await;
    assert!(wait_for_server(a, Duration::from_secs(5)).await);
    assert!(wait_for_server(b, Duration::from_secs(5)).await);
    assert_eq!(get(a, "/late").await.0, 404);

    manager
        .add_route("/late", || async { "late" }, &[], RouteOptions::default())
        .unwrap();

    assert_eq!(get(a, "/late").await, (200, "late".to_string()));
    assert_eq!(get(b, "/late").await, (200, "late".to_string()));

    manager.shutdown().await;
}

/// Handlers can see which listener served them
#[tokio::test]
async fn test_listener_context_extension() {
    let manager = test_manager();
    let port = get_free_port();

    manager
        .add_route(
            "/whoami",
            |Extension(ctx): Extension<ListenerContext>| async move {
                format!("{}:{}", ctx.host, ctx.port)
            },
            &[Method::GET],
            RouteOptions::default(),
        )
        .unwrap();
    manager.start(port).await;
    assert!(wait_for_server(port, Duration::from_secs(5)).await);

    assert_eq!(get(port, "/whoami").await.1, format!("127.0.0.1:{port}"));

    manager.shutdown().await;
}

/// Two configured ports; stopping one leaves the other running
#[tokio::test]
async fn test_two_port_scenario() {
    let manager = test_manager();
    let (first, second) = (get_free_port(), get_free_port());

    manager.start(first).await;
    manager.start(second).await;

    let expected: BTreeMap<u16, ListenerStatus> = [
        (first, ListenerStatus::Running),
        (second, ListenerStatus::Running),
    ]
    .into_iter()
    .collect();
    assert_eq!(manager.status(), expected);

    assert_eq!(manager.stop(first).await, StopOutcome::Stopped);

    let status = manager.status();
    assert!(!status.contains_key(&first));
    assert_eq!(status.get(&second), Some(&ListenerStatus::Running));
    assert!(wait_for_server(second, Duration::from_secs(5)).await);

    manager.shutdown().await;
    assert!(manager.status().is_empty());
}

/// A stopped listener stops accepting connections
#[tokio::test]
async fn test_stopped_port_refuses_connections() {
    let manager = test_manager();
    let port = get_free_port();

    manager.start(port).await;
    assert!(wait_for_server(port, Duration::from_secs(5)).await);

    manager.stop(port).await;
    assert!(
        !wait_for_server(port, Duration::from_millis(300)).await,
        "port should be closed after stop"
    );

    // The port can be reused.
    manager.start(port).await;
    assert!(wait_for_server(port, Duration::from_secs(5)).await);
    manager.shutdown().await;
}
