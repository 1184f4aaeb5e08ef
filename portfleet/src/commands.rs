//! Command facade: turns operator commands into [`ServerManager`] calls and
//! reports the outcome as status text.

use crate::app::RouteOptions;
use crate::manager::{ServerManager, StartOutcome, StopOutcome};
use axum::handler::Handler;
use axum::http::Method;
use portfleet_common::try_parse_port_range;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{info, warn};

/// Dispatches commands to a shared [`ServerManager`].
#[derive(Debug, Clone)]
pub struct CommandHandler {
    manager: Arc<ServerManager>,
}

impl CommandHandler {
    pub fn new(manager: Arc<ServerManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<ServerManager> {
        &self.manager
    }

    /// Start one listener. The manager's host wins over `host`.
    pub async fn start_server(&self, port: u16, host: Option<&str>) -> String {
        if let Some(host) = host.filter(|h| *h != self.manager.host()) {
            warn!(
                "Host {} ignored; server is bound to {}",
                host,
                self.manager.host()
            );
        }
        match self.manager.start(port).await {
            StartOutcome::Started => {
                format!("Starting server on {}:{}", self.manager.host(), port)
            }
            StartOutcome::AlreadyRunning => format!("Server already running on port {port}"),
        }
    }

    /// Start one listener per port in `spec` (`"8000"` or `"8000-8003"`).
    pub async fn start_servers(&self, spec: &str, host: Option<&str>) -> String {
        let ports = match try_parse_port_range(spec) {
            Ok(ports) => ports,
            Err(e) => {
                warn!("{}", e);
                return e.to_string();
            }
        };

        let mut lines = Vec::with_capacity(ports.len());
        for port in ports {
            lines.push(self.start_server(port, host).await);
        }
        lines.join("\n")
    }

    pub async fn stop_server(&self, port: u16) -> String {
        match self.manager.stop(port).await {
            StopOutcome::Stopped => format!("Server on port {port} stopped."),
            StopOutcome::NotRunning => {
                format!("Server on port {port} is not running or already stopped.")
            }
        }
    }

    pub async fn stop_all_servers(&self) -> String {
        let outcomes = self.manager.stop_all().await;
        if outcomes.is_empty() {
            return "No servers running".to_string();
        }
        outcomes
            .iter()
            .map(|(port, _)| format!("Server on port {port} stopped."))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn status_servers(&self) -> String {
        let status = self.manager.status();
        if status.is_empty() {
            return "No servers running".to_string();
        }

        let mut out = format!("Server initialized on host {}", self.manager.host());
        for (port, state) in status {
            let _ = write!(out, "\n  - Port {port}: {state}");
        }
        out
    }

    pub fn add_route<H, T>(&self, path: &str, handler: H, methods: &[Method]) -> String
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        match self
            .manager
            .add_route(path, handler, methods, RouteOptions::default())
        {
            Ok(()) => {
                let methods: Vec<&str> = if methods.is_empty() {
                    vec!["GET"]
                } else {
                    methods.iter().map(Method::as_str).collect()
                };
                info!("Route added: {}, methods={:?}", path, methods);
                format!("Route added: {path}, methods={methods:?}")
            }
            Err(e) => {
                warn!("{}", e);
                e.to_string()
            }
        }
    }

    pub fn routes(&self) -> String {
        let routes = self.manager.routes();
        if routes.is_empty() {
            return "No routes registered".to_string();
        }
        routes
            .iter()
            .map(|route| {
                let methods: Vec<&str> = route.methods.iter().map(Method::as_str).collect();
                match &route.name {
                    Some(name) => format!("{} {} ({name})", methods.join(","), route.path),
                    None => format!("{} {}", methods.join(","), route.path),
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
