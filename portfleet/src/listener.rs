//! One running HTTP server bound to `(host, port)`.

use crate::app::{Application, ListenerContext};
use portfleet_common::{Result, ServerError};
use std::fmt;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, Instrument};
use uuid::Uuid;

/// Liveness of a listener as reported by `status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerStatus {
    Running,
    Stopped,
}

impl fmt::Display for ListenerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenerStatus::Running => f.write_str("Running"),
            ListenerStatus::Stopped => f.write_str("Stopped"),
        }
    }
}

/// Handle to a listener task.
///
/// Dropping the handle signals the task to shut down but does not wait.
pub struct ListenerHandle {
    id: Uuid,
    host: String,
    port: u16,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("id", &self.id)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl ListenerHandle {
    /// Spawn a listener serving `app` on `(host, port)`.
    ///
    /// Returns immediately; binding happens inside the task. `on_exit` runs
    /// in the task once serving ends, with the serve result.
    pub(crate) fn spawn<F>(host: &str, port: u16, app: &Application, on_exit: F) -> Self
    where
        F: FnOnce(Uuid, Result<()>) + Send + 'static,
    {
        let id = Uuid::new_v4();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let router = app.listener_router(ListenerContext {
            host: host.to_string(),
            port,
        });
        let bind_host = host.to_string();
        let span = tracing::info_span!("listener", %port, %id);

        let task = tokio::spawn(
            async move {
                let result = serve(bind_host, port, router, shutdown_rx).await;
                if let Err(e) = &result {
                    error!("Error running server on port {}: {}", port, e);
                }
                on_exit(id, result);
            }
            .instrument(span),
        );

        Self {
            id,
            host: host.to_string(),
            port,
            shutdown_tx,
            task,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Check if the listener task is still alive.
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn status(&self) -> ListenerStatus {
        if self.is_running() {
            ListenerStatus::Running
        } else {
            ListenerStatus::Stopped
        }
    }

    /// Signal the listener to stop (non-blocking).
    pub fn signal_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Signal shutdown and wait up to `timeout` for the task to finish.
    ///
    /// On timeout the task is aborted and [`ServerError::Timeout`] returned.
    pub async fn shutdown(mut self, timeout: Duration) -> Result<()> {
        self.signal_shutdown();
        match tokio::time::timeout(timeout, &mut self.task).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ServerError::InvalidState(format!(
                "listener task on port {} failed: {e}",
                self.port
            ))),
            Err(_) => {
                self.task.abort();
                Err(ServerError::Timeout(format!(
                    "listener on port {} did not stop within {:?}",
                    self.port, timeout
                )))
            }
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        // Best-effort signal shutdown on drop
        let _ = self.shutdown_tx.send(true);
    }
}

async fn serve(
    host: String,
    port: u16,
    router: axum::Router,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<()> {
    let listener = TcpListener::bind((host.as_str(), port))
        .await
        .map_err(|e| ServerError::Listener {
            port,
            reason: e.to_string(),
        })?;
    info!("Server started on: {}:{}", host, port);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            // A closed channel means the handle is gone; stop as well.
            let _ = shutdown_rx.wait_for(|stop| *stop).await;
        })
        .await
        .map_err(|e| ServerError::Listener {
            port,
            reason: e.to_string(),
        })?;

    info!("Server on port {} stopped", port);
    Ok(())
}
