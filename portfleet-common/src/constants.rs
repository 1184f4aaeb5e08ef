//! Default hosts, ports and environment keys for PortFleet.
//!
//! Use these constants instead of magic values so defaults stay consistent
//! across the library, CLI, and tests.

use std::time::Duration;

/// Default host listeners bind to.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default application title.
pub const DEFAULT_TITLE: &str = "PortFleet Server";

/// How long `stop` waits for a listener to wind down before abandoning it.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(1);

/// Local address the tunnel forwards to.
pub const DEFAULT_TUNNEL_LOCAL_ADDR: &str = "127.0.0.1:8443";

/// Edge label used when `NGROK_EDGE` is unset.
pub const DEFAULT_TUNNEL_EDGE: &str = "edge:edghts_";

/// Environment variable holding the tunnel auth token.
pub const ENV_TUNNEL_TOKEN: &str = "NGROK_AUTH_TOKEN";

/// Environment variable holding the tunnel edge label.
pub const ENV_TUNNEL_EDGE: &str = "NGROK_EDGE";

/// Environment variable pointing at the JSON config file.
pub const ENV_CONFIG_PATH: &str = "PORTFLEET_CONFIG";

/// Config file used when neither `--config` nor `PORTFLEET_CONFIG` is given.
pub const DEFAULT_CONFIG_PATH: &str = "portfleet.json";

/// Dotenv file consulted for tunnel variables missing from the environment.
pub const DEFAULT_DOTENV_PATH: &str = ".env";
