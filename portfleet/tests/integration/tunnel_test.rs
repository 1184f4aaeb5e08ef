//! Tunnel lifespan tests against a fake agent API

use super::{get_free_port, wait_for_server};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get};
use axum::{Json, Router};
use portfleet::{
    AgentApiProvider, RouteOptions, ServerManager, StartOutcome, TunnelLifecycle, TunnelMode,
    TunnelProvider, TunnelRequest, TunnelSettings,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};

#[derive(Clone, Default)]
struct AgentLog {
    events: Arc<Mutex<Vec<String>>>,
    bodies: Arc<Mutex<Vec<Value>>>,
}

impl AgentLog {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

async fn list_tunnels(State(log): State<AgentLog>, headers: HeaderMap) -> StatusCode {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    log.events.lock().unwrap().push(format!("list {auth}"));
    if auth == "Bearer good-token" {
        StatusCode::OK
    } else {
        StatusCode::UNAUTHORIZED
    }
}

async fn start_tunnel(State(log): State<AgentLog>, Json(body): Json<Value>) -> Json<Value> {
    let name = body["name"].as_str().unwrap_or_default().to_string();
    log.events.lock().unwrap().push("start".to_string());
    log.bodies.lock().unwrap().push(body);
    Json(json!({ "name": name, "public_url": "https://edge.example.test" }))
}

async fn stop_tunnel(State(log): State<AgentLog>, Path(name): Path<String>) -> StatusCode {
    log.events.lock().unwrap().push(format!("stop {name}"));
    StatusCode::NO_CONTENT
}

/// Serve a fake agent API and return its base URL.
async fn start_fake_agent(log: AgentLog) -> String {
    let port = get_free_port();
    let app = Router::new()
        .route("/api/tunnels", get(list_tunnels).post(start_tunnel))
        .route("/api/tunnels/{name}", delete(stop_tunnel))
        .with_state(log);
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .expect("Failed to bind fake agent");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    assert!(wait_for_server(port, Duration::from_secs(5)).await);
    format!("http://127.0.0.1:{port}/api")
}

/// Wait for the tunnel lifespan, which begins in the background, to be active.
async fn wait_for_lifespan(tunnel: &TunnelLifecycle, limit: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < limit {
        if tunnel.is_active().await {
            return true;
        }
        sleep(Duration::from_millis(25)).await;
    }
    false
}

fn token_settings() -> TunnelSettings {
    TunnelSettings {
        auth_token: Some("good-token".into()),
        ..TunnelSettings::default()
    }
}

#[tokio::test]
async fn test_agent_provider_round_trip() {
    let log = AgentLog::default();
    let provider = AgentApiProvider::new(start_fake_agent(log.clone()).await).unwrap();

    provider.authenticate("good-token").await.unwrap();
    let handle = provider
        .open(&TunnelRequest {
            local_addr: "127.0.0.1:8443".into(),
            label: "edge:edghts_".into(),
            mode: TunnelMode::Labeled,
        })
        .await
        .unwrap();
    assert!(handle.id.starts_with("portfleet-"));
    assert_eq!(handle.public_url.as_deref(), Some("https://edge.example.test"));

    let body = log.bodies.lock().unwrap()[0].clone();
    assert_eq!(body["addr"], "127.0.0.1:8443");
    assert_eq!(body["proto"], "labeled");
    assert_eq!(body["labels"], json!(["edge:edghts_"]));

    provider.close(&handle).await.unwrap();
    assert_eq!(
        log.events(),
        vec![
            "list Bearer good-token".to_string(),
            "start".to_string(),
            format!("stop {}", handle.id),
        ]
    );
}

#[tokio::test]
async fn test_agent_provider_rejected_token() {
    let log = AgentLog::default();
    let provider = AgentApiProvider::new(start_fake_agent(log).await).unwrap();
    assert!(provider.authenticate("bad-token").await.is_err());
}

/// One tunnel for the whole application, however many ports are started
#[tokio::test]
async fn test_manager_opens_single_tunnel() {
    let log = AgentLog::default();
    let provider = Arc::new(AgentApiProvider::new(start_fake_agent(log.clone()).await).unwrap());
    let manager = ServerManager::builder()
        .tunnel(TunnelLifecycle::new(token_settings(), provider))
        .build()
        .unwrap();

    let (a, b) = (get_free_port(), get_free_port());
    manager.start(a).await;
    manager.start(b).await;
    let tunnel = manager.tunnel().unwrap();
    assert!(wait_for_lifespan(tunnel, Duration::from_secs(5)).await);
    manager.stop(a).await;
    manager.stop(b).await;

    // Stopping every listener does not end the lifespan.
    assert!(tunnel.handle().await.is_some());
    assert_eq!(log.events().iter().filter(|e| *e == "start").count(), 1);

    manager.shutdown().await;
    assert!(tunnel.handle().await.is_none());
    let events = log.events();
    assert_eq!(events.iter().filter(|e| e.starts_with("stop ")).count(), 1);
}

/// Without a token the application runs and no tunnel is touched
#[tokio::test]
async fn test_manager_without_token() {
    let log = AgentLog::default();
    let provider = Arc::new(AgentApiProvider::new(start_fake_agent(log.clone()).await).unwrap());

    let manager = ServerManager::builder()
        .tunnel(TunnelLifecycle::new(TunnelSettings::default(), provider))
        .build()
        .unwrap();

    let port = get_free_port();
    manager.start(port).await;
    assert!(wait_for_server(port, Duration::from_secs(5)).await);
    assert!(wait_for_lifespan(manager.tunnel().unwrap(), Duration::from_secs(5)).await);

    manager.shutdown().await;
    assert!(log.events().is_empty());
}

/// An unreachable agent does not prevent listeners from starting
#[tokio::test]
async fn test_unreachable_agent_is_contained() {
    let dead = format!("http://127.0.0.1:{}/api", get_free_port());
    let provider = Arc::new(AgentApiProvider::new(dead).unwrap());
    let manager = ServerManager::builder()
        .tunnel(TunnelLifecycle::new(token_settings(), provider))
        .build()
        .unwrap();

    let port = get_free_port();
    manager.start(port).await;
    assert!(wait_for_server(port, Duration::from_secs(5)).await);
    let tunnel = manager.tunnel().unwrap();
    assert!(wait_for_lifespan(tunnel, Duration::from_secs(5)).await);
    assert!(tunnel.handle().await.is_none());

    manager.shutdown().await;
}

/// An agent that accepts connections but never answers does not hold up
/// `start`; its requests time out and the lifespan runs without a tunnel
#[tokio::test]
async fn test_silent_agent_does_not_block_start() {
    let agent = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let agent_url = format!("http://{}/api", agent.local_addr().unwrap());
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = agent.accept().await {
            held.push(socket);
        }
    });

    let provider = AgentApiProvider::with_timeout(agent_url, Duration::from_millis(500)).unwrap();
    let manager = ServerManager::builder()
        .tunnel(TunnelLifecycle::new(token_settings(), Arc::new(provider)))
        .build()
        .unwrap();
    manager
        .add_route("/ok", || async { "ok" }, &[], RouteOptions::default())
        .unwrap();

    let (a, b) = (get_free_port(), get_free_port());
    let outcomes = timeout(Duration::from_secs(2), async {
        (manager.start(a).await, manager.start(b).await)
    })
    .await
    .expect("start should not wait on the tunnel agent");
    assert_eq!(outcomes, (StartOutcome::Started, StartOutcome::Started));

    assert!(wait_for_server(a, Duration::from_secs(5)).await);
    assert!(wait_for_server(b, Duration::from_secs(5)).await);
    assert_eq!(super::get(a, "/ok").await.0, 200);
    assert_eq!(manager.ports(), vec![a, b]);

    let tunnel = manager.tunnel().unwrap();
    assert!(wait_for_lifespan(tunnel, Duration::from_secs(5)).await);
    assert!(tunnel.handle().await.is_none());

    timeout(Duration::from_secs(5), manager.shutdown())
        .await
        .expect("shutdown should finish once the agent request times out");
    assert!(manager.status().is_empty());
}
