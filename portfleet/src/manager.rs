//! Multi-port server lifecycle manager.
//!
//! # Example
//!
//! ```rust,no_run
//! use portfleet::{Method, RouteOptions, ServerManager};
//!
//! # async fn example() -> portfleet::Result<()> {
//! let manager = ServerManager::builder()
//!     .host("127.0.0.1")
//!     .title("demo")
//!     .build()?;
//!
//! manager.add_route("/hello", || async { "hello" }, &[Method::GET], RouteOptions::default())?;
//! manager.start(8000).await;
//! manager.start(9000).await;
//!
//! for (port, status) in manager.status() {
//!     println!("{port}: {status}");
//! }
//!
//! manager.shutdown().await;
//! # Ok(())
//! # }
//! ```

use crate::app::{Application, RouteInfo, RouteOptions};
use crate::listener::{ListenerHandle, ListenerStatus};
use crate::tunnel::TunnelLifecycle;
use axum::handler::Handler;
use axum::http::Method;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use portfleet_common::{Result, ServerError, DEFAULT_HOST, DEFAULT_STOP_TIMEOUT, DEFAULT_TITLE};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn, Instrument};

/// Result of [`ServerManager::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new listener was spawned.
    Started,
    /// A live listener already owns the port; nothing changed.
    AlreadyRunning,
}

/// Result of [`ServerManager::stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The listener was signalled and its entry removed.
    Stopped,
    /// No listener was registered for the port.
    NotRunning,
}

type ListenerMap = DashMap<u16, ListenerHandle>;

/// Runs one shared [`Application`] on any number of ports.
///
/// Use [`ServerManager::builder()`] to construct one. Each port gets its own
/// listener task; the manager only keeps bookkeeping and never blocks on a
/// listener except for the bounded wait in [`stop`](Self::stop).
#[derive(Debug)]
pub struct ServerManager {
    host: String,
    app: Application,
    listeners: Arc<ListenerMap>,
    tunnel: Option<Arc<TunnelLifecycle>>,
    /// Task running [`TunnelLifecycle::begin`] for the current lifespan.
    tunnel_task: Mutex<Option<JoinHandle<()>>>,
    stop_timeout: Duration,
}

/// Builder for constructing a [`ServerManager`].
#[derive(Debug)]
pub struct ServerManagerBuilder {
    host: String,
    title: String,
    stop_timeout: Duration,
    tunnel: Option<TunnelLifecycle>,
}

impl Default for ServerManagerBuilder {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            title: DEFAULT_TITLE.to_string(),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            tunnel: None,
        }
    }
}

impl ServerManagerBuilder {
    /// Host every listener binds to.
    ///
    /// Default: `127.0.0.1`
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// How long [`ServerManager::stop`] waits for a listener to finish.
    ///
    /// Default: 1 second
    #[must_use]
    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Attach a tunnel whose lifespan follows the application's.
    #[must_use]
    pub fn tunnel(mut self, tunnel: TunnelLifecycle) -> Self {
        self.tunnel = Some(tunnel);
        self
    }

    /// # Errors
    ///
    /// Returns [`ServerError::Config`] for an empty host or a zero stop timeout.
    pub fn build(self) -> Result<ServerManager> {
        if self.host.trim().is_empty() {
            return Err(ServerError::Config("host is required".into()));
        }
        if self.stop_timeout.is_zero() {
            return Err(ServerError::Config("stop timeout must be positive".into()));
        }

        info!(host = %self.host, title = %self.title, "Server manager created");
        Ok(ServerManager {
            host: self.host,
            app: Application::new(self.title),
            listeners: Arc::new(DashMap::new()),
            tunnel: self.tunnel.map(Arc::new),
            tunnel_task: Mutex::new(None),
            stop_timeout: self.stop_timeout,
        })
    }
}

impl ServerManager {
    pub fn builder() -> ServerManagerBuilder {
        ServerManagerBuilder::default()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn title(&self) -> &str {
        self.app.title()
    }

    pub fn app(&self) -> &Application {
        &self.app
    }

    pub fn stop_timeout(&self) -> Duration {
        self.stop_timeout
    }

    pub fn tunnel(&self) -> Option<&TunnelLifecycle> {
        self.tunnel.as_deref()
    }

    /// Register a route on the shared application.
    ///
    /// Takes effect on every listener, current and future.
    pub fn add_route<H, T>(
        &self,
        path: &str,
        handler: H,
        methods: &[Method],
        options: RouteOptions,
    ) -> Result<()>
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        self.app.add_route(path, handler, methods, options)
    }

    pub fn routes(&self) -> Vec<RouteInfo> {
        self.app.routes()
    }

    /// Start a listener on `port`.
    ///
    /// Returns once the listener task is spawned, before it is accepting
    /// connections. Bind and serve failures are logged by the task, which
    /// then removes its own entry. The first start also begins the tunnel
    /// lifespan in the background.
    pub async fn start(&self, port: u16) -> StartOutcome {
        if self.is_running(port) {
            info!("Server already running on port {}", port);
            return StartOutcome::AlreadyRunning;
        }

        match self.listeners.entry(port) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_running() {
                    info!("Server already running on port {}", port);
                    return StartOutcome::AlreadyRunning;
                }
                info!("Reaping finished listener on port {}", port);
                entry.insert(self.spawn_listener(port));
            }
            Entry::Vacant(entry) => {
                entry.insert(self.spawn_listener(port));
            }
        }

        info!("Starting server on {}:{}", self.host, port);
        self.begin_tunnel();
        StartOutcome::Started
    }

    fn begin_tunnel(&self) {
        let Some(tunnel) = &self.tunnel else {
            return;
        };
        let mut task = self
            .tunnel_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if task.is_none() {
            let tunnel = Arc::clone(tunnel);
            *task = Some(tokio::spawn(
                async move { tunnel.begin().await }.instrument(tracing::info_span!("tunnel")),
            ));
        }
    }

    fn spawn_listener(&self, port: u16) -> ListenerHandle {
        let listeners = Arc::downgrade(&self.listeners);
        ListenerHandle::spawn(&self.host, port, &self.app, move |id, _result| {
            // Only drop our own entry; the port may have been restarted since.
            if let Some(listeners) = listeners.upgrade() {
                listeners.remove_if(&port, |_, handle| handle.id() == id);
            }
        })
    }

    /// Stop the listener on `port`.
    ///
    /// Waits up to the stop timeout for it to finish. The entry is removed
    /// whether or not the wait succeeds.
    pub async fn stop(&self, port: u16) -> StopOutcome {
        let Some((_, handle)) = self.listeners.remove(&port) else {
            info!("Server on port {} is not running or already stopped.", port);
            return StopOutcome::NotRunning;
        };

        if let Err(e) = handle.shutdown(self.stop_timeout).await {
            warn!("Error stopping server on port {}: {}", port, e);
        }
        info!("Server on port {} stopped.", port);
        StopOutcome::Stopped
    }

    /// Stop every listener known at call time.
    pub async fn stop_all(&self) -> Vec<(u16, StopOutcome)> {
        let mut outcomes = Vec::new();
        for port in self.ports() {
            outcomes.push((port, self.stop(port).await));
        }
        outcomes
    }

    /// Liveness of every registered listener, keyed by port.
    pub fn status(&self) -> BTreeMap<u16, ListenerStatus> {
        self.listeners
            .iter()
            .map(|entry| (*entry.key(), entry.value().status()))
            .collect()
    }

    /// Registered ports in ascending order.
    pub fn ports(&self) -> Vec<u16> {
        let mut ports: Vec<u16> = self.listeners.iter().map(|entry| *entry.key()).collect();
        ports.sort_unstable();
        ports
    }

    pub fn is_running(&self, port: u16) -> bool {
        self.listeners
            .get(&port)
            .is_some_and(|handle| handle.is_running())
    }

    /// Stop all listeners, then end the application lifespan (closing the
    /// tunnel if one is open).
    ///
    /// A tunnel setup still in progress is awaited first so that it is never
    /// left open.
    pub async fn shutdown(&self) {
        self.stop_all().await;
        let pending = self
            .tunnel_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = pending {
            if let Err(e) = task.await {
                warn!("Tunnel setup task failed: {}", e);
            }
        }
        if let Some(tunnel) = &self.tunnel {
            tunnel.end().await;
        }
        info!("Server manager shut down");
    }
}
