//! Interactive command console.
//!
//! Each stdin line is parsed as one command, e.g.
//! `start-server --port 8000-8002` or `add-route --path /echo --methods GET,POST`.

use axum::extract::Extension;
use axum::http::{Method, Uri};
use axum::Json;
use clap::{Parser, Subcommand};
use portfleet::{parse_methods, CommandHandler, ListenerContext};
use serde_json::{json, Value};
use tracing::warn;

#[derive(Parser, Debug)]
#[command(no_binary_name = true, disable_version_flag = true)]
struct ConsoleLine {
    #[command(subcommand)]
    command: ConsoleCommand,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum ConsoleCommand {
    /// Start one listener per port in the spec
    StartServer {
        /// Port or inclusive range, e.g. 8000 or 8000-8003
        #[arg(long)]
        port: String,
        /// Requested host (the manager's host is used)
        #[arg(long)]
        host: Option<String>,
    },
    /// Stop the listener on a port
    StopServer {
        #[arg(long)]
        port: u16,
    },
    /// Stop every listener
    StopAllServers,
    /// Show listener status
    StatusServers,
    /// Bind the echo handler at a path
    AddRoute {
        #[arg(long)]
        path: String,
        /// Comma-separated HTTP methods
        #[arg(long, value_delimiter = ',', default_value = "GET")]
        methods: Vec<String>,
    },
    /// List registered routes
    Routes,
    /// Stop everything and leave
    #[command(alias = "quit")]
    Exit,
}

/// What the console loop should do after a line.
#[derive(Debug, PartialEq, Eq)]
pub enum Flow {
    Continue(Option<String>),
    Exit,
}

/// Parse and run one console line.
pub async fn execute(commands: &CommandHandler, line: &str) -> Flow {
    let words: Vec<&str> = line.split_whitespace().collect();
    if words.is_empty() {
        return Flow::Continue(None);
    }

    let parsed = match ConsoleLine::try_parse_from(&words) {
        Ok(parsed) => parsed,
        // clap renders help and usage errors alike
        Err(e) => return Flow::Continue(Some(e.render().to_string().trim_end().to_string())),
    };

    let output = match parsed.command {
        ConsoleCommand::StartServer { port, host } => {
            commands.start_servers(&port, host.as_deref()).await
        }
        ConsoleCommand::StopServer { port } => commands.stop_server(port).await,
        ConsoleCommand::StopAllServers => commands.stop_all_servers().await,
        ConsoleCommand::StatusServers => commands.status_servers(),
        ConsoleCommand::AddRoute { path, methods } => match parse_methods(&methods) {
            Ok(methods) => commands.add_route(&path, echo_handler, &methods),
            Err(e) => {
                warn!("{}", e);
                e.to_string()
            }
        },
        ConsoleCommand::Routes => commands.routes(),
        ConsoleCommand::Exit => return Flow::Exit,
    };
    Flow::Continue(Some(output))
}

/// Routes every fleet serves from boot.
pub fn register_default_routes(commands: &CommandHandler) {
    commands.add_route("/health", || async { "OK" }, &[Method::GET]);
}

/// Handler bound by `add-route`: reports what was called and which
/// listener answered.
async fn echo_handler(
    Extension(listener): Extension<ListenerContext>,
    method: Method,
    uri: Uri,
) -> Json<Value> {
    Json(json!({
        "path": uri.path(),
        "method": method.as_str(),
        "host": listener.host,
        "port": listener.port,
    }))
}
