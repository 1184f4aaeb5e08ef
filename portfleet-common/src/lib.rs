//! Common utilities and types for `PortFleet`

pub mod config;
pub mod constants;
pub mod error;
pub mod ports;

pub use config::{AppConfig, PortEntry, PortList};
pub use constants::{
    DEFAULT_CONFIG_PATH, DEFAULT_DOTENV_PATH, DEFAULT_HOST, DEFAULT_STOP_TIMEOUT, DEFAULT_TITLE, DEFAULT_TUNNEL_EDGE,
    DEFAULT_TUNNEL_LOCAL_ADDR, ENV_CONFIG_PATH, ENV_TUNNEL_EDGE, ENV_TUNNEL_TOKEN,
};
pub use error::{Result, ServerError};
pub use ports::{parse_port_range, try_parse_port_range};
