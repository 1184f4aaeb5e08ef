//! Optional outbound tunnel tied to the application lifespan.
//!
//! The tunnel is opened once when the lifespan begins and closed once when it
//! ends, however many listeners come and go in between. Without an auth token
//! the lifespan still runs, it just holds no tunnel.

use async_trait::async_trait;
use portfleet_common::{
    Result, ServerError, DEFAULT_TUNNEL_EDGE, DEFAULT_TUNNEL_LOCAL_ADDR, ENV_TUNNEL_EDGE,
    ENV_TUNNEL_TOKEN,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// How the provider routes public traffic to the tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TunnelMode {
    /// Traffic reaches the tunnel through a pre-configured labeled edge.
    Labeled,
}

impl fmt::Display for TunnelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunnelMode::Labeled => f.write_str("labeled"),
        }
    }
}

/// What to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelRequest {
    pub local_addr: String,
    pub label: String,
    pub mode: TunnelMode,
}

/// An open tunnel, as returned by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelHandle {
    pub id: String,
    pub public_url: Option<String>,
}

/// Client for an external tunnel service.
#[async_trait]
pub trait TunnelProvider: Send + Sync + fmt::Debug {
    /// Provider name (for logging)
    fn name(&self) -> &str;

    async fn authenticate(&self, token: &str) -> Result<()>;

    async fn open(&self, request: &TunnelRequest) -> Result<TunnelHandle>;

    async fn close(&self, handle: &TunnelHandle) -> Result<()>;
}

/// Tunnel credentials and target, usually read from the environment.
#[derive(Clone, PartialEq, Eq)]
pub struct TunnelSettings {
    pub auth_token: Option<String>,
    pub edge: String,
    pub local_addr: String,
}

impl fmt::Debug for TunnelSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TunnelSettings")
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("edge", &self.edge)
            .field("local_addr", &self.local_addr)
            .finish()
    }
}

impl Default for TunnelSettings {
    fn default() -> Self {
        Self {
            auth_token: None,
            edge: DEFAULT_TUNNEL_EDGE.to_string(),
            local_addr: DEFAULT_TUNNEL_LOCAL_ADDR.to_string(),
        }
    }
}

impl TunnelSettings {
    /// Read `NGROK_AUTH_TOKEN` and `NGROK_EDGE` from the process environment,
    /// falling back to a dotenv file for anything not set there. A missing
    /// file is fine.
    pub fn from_env_and_file(path: &Path) -> Self {
        Self::from_lookup_and_file(path, |key| std::env::var(key).ok())
    }

    fn from_lookup_and_file(path: &Path, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let file = read_dotenv(path);
        Self::from_lookup(|key| lookup(key).or_else(|| file.get(key).cloned()))
    }

    /// Build settings from a custom variable source. Empty values count as
    /// unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            auth_token: non_empty(ENV_TUNNEL_TOKEN),
            edge: non_empty(ENV_TUNNEL_EDGE).unwrap_or_else(|| DEFAULT_TUNNEL_EDGE.to_string()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_local_addr(mut self, local_addr: impl Into<String>) -> Self {
        self.local_addr = local_addr.into();
        self
    }

    fn request(&self) -> TunnelRequest {
        TunnelRequest {
            local_addr: self.local_addr.clone(),
            label: self.edge.clone(),
            mode: TunnelMode::Labeled,
        }
    }
}

fn read_dotenv(path: &Path) -> HashMap<String, String> {
    match dotenvy::from_path_iter(path) {
        Ok(entries) => entries
            .filter_map(|entry| match entry {
                Ok(pair) => Some(pair),
                Err(e) => {
                    warn!("Skipping invalid line in {}: {}", path.display(), e);
                    None
                }
            })
            .collect(),
        Err(e) if e.not_found() => {
            debug!("No dotenv file at {}", path.display());
            HashMap::new()
        }
        Err(e) => {
            warn!("Failed to read {}: {}", path.display(), e);
            HashMap::new()
        }
    }
}

/// Where the lifecycle gets its settings from.
#[derive(Debug)]
enum SettingsSource {
    Fixed(TunnelSettings),
    /// Read when the lifespan begins.
    Environment { local_addr: String, dotenv: PathBuf },
}

impl SettingsSource {
    fn resolve(&self) -> TunnelSettings {
        match self {
            SettingsSource::Fixed(settings) => settings.clone(),
            SettingsSource::Environment { local_addr, dotenv } => {
                TunnelSettings::from_env_and_file(dotenv).with_local_addr(local_addr.clone())
            }
        }
    }
}

#[derive(Debug)]
enum LifespanState {
    Idle,
    /// Lifespan begun; holds the tunnel if one was opened.
    Active(Option<TunnelHandle>),
}

/// Scoped tunnel: acquired by [`begin`](Self::begin), released by
/// [`end`](Self::end).
#[derive(Debug)]
pub struct TunnelLifecycle {
    source: SettingsSource,
    provider: Arc<dyn TunnelProvider>,
    state: Mutex<LifespanState>,
}

impl TunnelLifecycle {
    /// Lifecycle with fixed settings.
    pub fn new(settings: TunnelSettings, provider: Arc<dyn TunnelProvider>) -> Self {
        Self::with_source(SettingsSource::Fixed(settings), provider)
    }

    /// Lifecycle that reads `NGROK_AUTH_TOKEN` and `NGROK_EDGE` each time the
    /// lifespan begins, from the process environment and then `dotenv`.
    pub fn from_env(
        local_addr: impl Into<String>,
        dotenv: impl Into<PathBuf>,
        provider: Arc<dyn TunnelProvider>,
    ) -> Self {
        let source = SettingsSource::Environment {
            local_addr: local_addr.into(),
            dotenv: dotenv.into(),
        };
        Self::with_source(source, provider)
    }

    fn with_source(source: SettingsSource, provider: Arc<dyn TunnelProvider>) -> Self {
        Self {
            source,
            provider,
            state: Mutex::new(LifespanState::Idle),
        }
    }

    /// Begin the lifespan. A no-op if it has already begun.
    ///
    /// Provider failures are logged; the lifespan is still considered begun,
    /// without a tunnel.
    pub async fn begin(&self) {
        let mut state = self.state.lock().await;
        if matches!(*state, LifespanState::Active(_)) {
            return;
        }

        info!("Setting up tunnel");
        let settings = self.source.resolve();
        let Some(token) = settings.auth_token.as_deref() else {
            warn!("{} not found. Tunnel will not be enabled", ENV_TUNNEL_TOKEN);
            *state = LifespanState::Active(None);
            return;
        };

        let handle = match self.open(token, &settings).await {
            Ok(handle) => {
                info!(
                    provider = self.provider.name(),
                    id = %handle.id,
                    url = handle.public_url.as_deref().unwrap_or("-"),
                    "Tunnel established for {} via {}",
                    settings.local_addr,
                    settings.edge
                );
                Some(handle)
            }
            Err(e) => {
                error!("Failed to establish tunnel: {}", e);
                None
            }
        };
        *state = LifespanState::Active(handle);
    }

    async fn open(&self, token: &str, settings: &TunnelSettings) -> Result<TunnelHandle> {
        self.provider.authenticate(token).await?;
        self.provider.open(&settings.request()).await
    }

    /// End the lifespan, closing the tunnel if one was opened. A no-op if
    /// the lifespan is not active.
    pub async fn end(&self) {
        let mut state = self.state.lock().await;
        let previous = std::mem::replace(&mut *state, LifespanState::Idle);
        let LifespanState::Active(Some(handle)) = previous else {
            return;
        };

        info!("Tearing down tunnel {}", handle.id);
        if let Err(e) = self.provider.close(&handle).await {
            error!("Failed to disconnect tunnel {}: {}", handle.id, e);
        }
    }

    /// Whether the lifespan has begun and not yet ended.
    pub async fn is_active(&self) -> bool {
        matches!(*self.state.lock().await, LifespanState::Active(_))
    }

    /// The open tunnel, if any.
    pub async fn handle(&self) -> Option<TunnelHandle> {
        match &*self.state.lock().await {
            LifespanState::Active(handle) => handle.clone(),
            LifespanState::Idle => None,
        }
    }
}

/// Drives a local tunnel agent through its HTTP API.
///
/// Speaks the agent's `/api/tunnels` interface: `GET` to check the agent is
/// reachable, `POST` to start a tunnel, `DELETE /api/tunnels/{name}` to stop it.
#[derive(Debug)]
pub struct AgentApiProvider {
    base_url: String,
    client: reqwest::Client,
    token: Mutex<Option<String>>,
}

/// Default address of the local agent API.
pub const DEFAULT_AGENT_API: &str = "http://127.0.0.1:4040/api";

/// Default limit for connecting to the agent and for each agent request.
pub const DEFAULT_AGENT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct StartTunnel<'a> {
    name: String,
    addr: &'a str,
    proto: TunnelMode,
    labels: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct StartedTunnel {
    name: String,
    #[serde(default)]
    public_url: Option<String>,
}

impl AgentApiProvider {
    /// # Errors
    ///
    /// Returns [`ServerError::Tunnel`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, DEFAULT_AGENT_TIMEOUT)
    }

    /// Like [`new`](Self::new), giving up on connects and requests after
    /// `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Tunnel`] if the HTTP client cannot be built.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(agent_error)?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            token: Mutex::new(None),
        })
    }

    async fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token.lock().await.as_deref() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

fn agent_error(e: reqwest::Error) -> ServerError {
    ServerError::Tunnel(e.to_string())
}

#[async_trait]
impl TunnelProvider for AgentApiProvider {
    fn name(&self) -> &str {
        "agent-api"
    }

    async fn authenticate(&self, token: &str) -> Result<()> {
        *self.token.lock().await = Some(token.to_string());
        let request = self
            .authorized(self.client.get(format!("{}/tunnels", self.base_url)))
            .await;
        request
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(agent_error)?;
        Ok(())
    }

    async fn open(&self, request: &TunnelRequest) -> Result<TunnelHandle> {
        let body = StartTunnel {
            name: format!("portfleet-{}", uuid::Uuid::new_v4().simple()),
            addr: &request.local_addr,
            proto: request.mode,
            labels: vec![request.label.as_str()],
        };
        let started: StartedTunnel = self
            .authorized(self.client.post(format!("{}/tunnels", self.base_url)))
            .await
            .json(&body)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(agent_error)?
            .json()
            .await
            .map_err(agent_error)?;

        Ok(TunnelHandle {
            id: started.name,
            public_url: started.public_url,
        })
    }

    async fn close(&self, handle: &TunnelHandle) -> Result<()> {
        self.authorized(
            self.client
                .delete(format!("{}/tunnels/{}", self.base_url, handle.id)),
        )
        .await
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(agent_error)?;
        Ok(())
    }
}
