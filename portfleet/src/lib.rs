//! # `PortFleet`
//!
//! Run one HTTP application on many ports at once.
//!
//! ## Overview
//!
//! A [`ServerManager`] owns a single shared route table and any number of
//! listeners, one per TCP port. Listeners are started and stopped
//! independently; routes added at any time are visible on every port.
//! An optional outbound tunnel follows the application lifespan rather than
//! any single listener.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use portfleet::prelude::*;
//!
//! # async fn example() -> portfleet::Result<()> {
//! let manager = ServerManager::builder().host("127.0.0.1").build()?;
//! manager.add_route("/", || async { "hello" }, &[Method::GET], RouteOptions::default())?;
//! manager.start(8000).await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`app`] - the shared route table
//! - [`listener`] - one serving task per port
//! - [`manager`] - the lifecycle manager
//! - [`tunnel`] - optional tunnel scoped to the application lifespan
//! - [`commands`] - text command facade over the manager

pub mod app;
pub mod commands;
pub mod listener;
pub mod manager;
pub mod tunnel;

pub use portfleet_common as common;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::app::{Application, ListenerContext, RouteOptions};
    pub use crate::commands::CommandHandler;
    pub use crate::common::{Result, ServerError};
    pub use crate::listener::ListenerStatus;
    pub use crate::manager::{ServerManager, StartOutcome, StopOutcome};
    pub use crate::tunnel::{TunnelLifecycle, TunnelSettings};
    pub use axum::http::Method;
}

// Convenience re-exports at crate root
pub use app::{parse_methods, Application, ListenerContext, RouteInfo, RouteOptions};
pub use axum::http::Method;
pub use commands::CommandHandler;
pub use common::{AppConfig, Result, ServerError};
pub use listener::{ListenerHandle, ListenerStatus};
pub use manager::{ServerManager, ServerManagerBuilder, StartOutcome, StopOutcome};
pub use tunnel::{
    AgentApiProvider, TunnelHandle, TunnelLifecycle, TunnelMode, TunnelProvider, TunnelRequest,
    TunnelSettings,
};
