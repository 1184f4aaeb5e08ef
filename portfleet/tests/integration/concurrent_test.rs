//! Concurrency integration tests

use super::{get, get_free_port, test_manager, wait_for_server};
use portfleet::{RouteOptions, StartOutcome};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

/// Many tasks racing to start the same port leave exactly one listener
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_start_same_port() {
    let manager = Arc::new(test_manager());
    let port = get_free_port();
    let started = Arc::new(AtomicUsize::new(0));

    let mut handles = vec![];
    for _ in 0..20 {
        let manager = manager.clone();
        let started = started.clone();
        handles.push(tokio::spawn(async move {
            if manager.start(port).await == StartOutcome::Started {
                started.fetch_add(1, Ordering::Relaxed);
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    assert_eq!(started.load(Ordering::Relaxed), 1);
    assert_eq!(manager.ports(), vec![port]);

    manager.shutdown().await;
}

/// Concurrent start, status and stop across many ports
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_lifecycle_across_ports() {
    let manager = Arc::new(test_manager());
    let ports: Vec<u16> = (0..8).map(|_| get_free_port()).collect();

    let mut handles = vec![];
    for port in ports.clone() {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            manager.start(port).await;
            let _ = manager.status();
            manager.stop(port).await;
            manager.start(port).await
        }));
    }
    for h in handles {
        assert_eq!(h.await.unwrap(), StartOutcome::Started);
    }

    let mut expected = ports.clone();
    expected.sort_unstable();
    assert_eq!(manager.ports(), expected);

    manager.stop_all().await;
    assert!(manager.status().is_empty());
}

/// Concurrent requests to several ports share one route table
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_across_ports() {
    let manager = Arc::new(test_manager());
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    manager
        .add_route(
            "/count",
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::Relaxed);
                    "counted"
                }
            },
            &[],
            RouteOptions::default(),
        )
        .unwrap();

    let ports: Vec<u16> = (0..3).map(|_| get_free_port()).collect();
    for &port in &ports {
        manager.start(port).await;
        assert!(wait_for_server(port, Duration::from_secs(5)).await);
    }

    let mut handles = vec![];
    for i in 0..30 {
        let port = ports[i % ports.len()];
        handles.push(tokio::spawn(async move { get(port, "/count").await }));
    }
    for h in handles {
        assert_eq!(h.await.unwrap(), (200, "counted".to_string()));
    }
    assert_eq!(hits.load(Ordering::Relaxed), 30);

    manager.shutdown().await;
}
