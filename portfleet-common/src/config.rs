//! Configuration file for `PortFleet`
//!
//! Loaded from a JSON document such as:
//!
//! ```json
//! { "host": "0.0.0.0", "ports": [8000, "9000-9002"] }
//! ```
//!
//! `ports` may also be a single number or a single range string.

use crate::constants::{DEFAULT_HOST, DEFAULT_STOP_TIMEOUT, DEFAULT_TITLE, DEFAULT_TUNNEL_LOCAL_ADDR};
use crate::error::{Result, ServerError};
use crate::ports::try_parse_port_range;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// One entry of the `ports` field: a port number or a range spec string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortEntry {
    Port(u16),
    Spec(String),
}

/// The `ports` field accepts a single entry or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortList {
    One(PortEntry),
    Many(Vec<PortEntry>),
}

impl Default for PortList {
    fn default() -> Self {
        PortList::Many(Vec::new())
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Host every listener binds to
    pub host: String,
    /// Application title, used in logs and the status banner
    pub title: String,
    /// Ports started at boot
    pub ports: PortList,
    /// Bounded wait for a listener to stop, in milliseconds
    pub stop_timeout_ms: u64,
    /// Local address exposed through the tunnel
    pub tunnel_local_addr: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            title: DEFAULT_TITLE.to_string(),
            ports: PortList::default(),
            stop_timeout_ms: DEFAULT_STOP_TIMEOUT.as_millis() as u64,
            tunnel_local_addr: DEFAULT_TUNNEL_LOCAL_ADDR.to_string(),
        }
    }
}

impl AppConfig {
    /// Load the configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| {
            ServerError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
            .map_err(|e| ServerError::Config(format!("failed to parse {}: {e}", path.display())))
    }

    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: AppConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(ServerError::Config("host is required".into()));
        }
        if self.stop_timeout_ms == 0 {
            return Err(ServerError::Config("stop_timeout_ms must be positive".into()));
        }
        self.port_list().map(|_| ())
    }

    /// Resolve `ports` into concrete port numbers, dropping duplicates while
    /// keeping first-seen order.
    pub fn port_list(&self) -> Result<Vec<u16>> {
        let entries: &[PortEntry] = match &self.ports {
            PortList::One(entry) => std::slice::from_ref(entry),
            PortList::Many(entries) => entries,
        };

        let mut ports = Vec::new();
        for entry in entries {
            let resolved = match entry {
                PortEntry::Port(port) => vec![*port],
                PortEntry::Spec(spec) => try_parse_port_range(spec)?,
            };
            for port in resolved {
                if !ports.contains(&port) {
                    ports.push(port);
                }
            }
        }
        Ok(ports)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}
