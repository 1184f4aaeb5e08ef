//! Serve subcommand implementation

use super::console;
use anyhow::Result;
use clap::Args;
use portfleet::common::{AppConfig, DEFAULT_CONFIG_PATH, DEFAULT_DOTENV_PATH, ENV_CONFIG_PATH};
use portfleet::tunnel::DEFAULT_AGENT_API;
use portfleet::{AgentApiProvider, CommandHandler, ServerManager, TunnelLifecycle};
use portfleet_observability::{init_basic_observability, shutdown_tracing, LogFormat};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Path to the JSON config file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH, env = ENV_CONFIG_PATH)]
    config: PathBuf,

    /// Override the host from the config file
    #[arg(long, env = "PORTFLEET_HOST")]
    host: Option<String>,

    /// Log output format (pretty or json)
    #[arg(long, default_value = "pretty", env = "PORTFLEET_LOG_FORMAT")]
    log_format: LogFormat,

    /// Enable OpenTelemetry trace export (uses OTEL_EXPORTER_OTLP_ENDPOINT)
    #[arg(long, env = "PORTFLEET_OBSERVABILITY")]
    observability: bool,

    /// Base URL of the tunnel agent API
    #[arg(long, default_value = DEFAULT_AGENT_API, env = "PORTFLEET_TUNNEL_AGENT")]
    tunnel_agent: String,

    /// Do not run the tunnel lifespan at all
    #[arg(long)]
    no_tunnel: bool,

    /// Do not read commands from stdin; run until Ctrl-C
    #[arg(long)]
    no_console: bool,
}

pub async fn run(args: ServeArgs) -> Result<()> {
    init_basic_observability("portfleet", args.observability, args.log_format);

    let config = match AppConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Config file not found or invalid: {}", e);
            std::process::exit(1);
        }
    };
    let ports = config.port_list()?;
    let host = args.host.unwrap_or_else(|| config.host.clone());

    info!("Starting PortFleet v{}", env!("CARGO_PKG_VERSION"));

    let mut builder = ServerManager::builder()
        .host(host)
        .title(config.title.clone())
        .stop_timeout(config.stop_timeout());

    if !args.no_tunnel {
        let provider = Arc::new(AgentApiProvider::new(args.tunnel_agent)?);
        builder = builder.tunnel(TunnelLifecycle::from_env(
            config.tunnel_local_addr.clone(),
            DEFAULT_DOTENV_PATH,
            provider,
        ));
    }

    let manager = Arc::new(builder.build()?);
    let commands = CommandHandler::new(manager.clone());

    console::register_default_routes(&commands);

    for port in ports {
        println!("{}", commands.start_server(port, None).await);
    }

    if args.no_console {
        tokio::signal::ctrl_c().await?;
        info!("Interrupt received");
    } else {
        run_console(&commands).await?;
    }

    info!("Shutting down");
    tokio::time::timeout(
        manager.stop_timeout() * (manager.ports().len() as u32 + 2),
        manager.shutdown(),
    )
    .await
    .unwrap_or_else(|_| error!("Shutdown did not finish in time"));
    shutdown_tracing();
    Ok(())
}

/// Read commands from stdin until `exit`, end of input, or Ctrl-C.
async fn run_console(commands: &CommandHandler) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("Type `help` for a list of commands.");

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupt received");
                break;
            }
        };
        let Some(line) = line else {
            break;
        };

        match console::execute(commands, &line).await {
            console::Flow::Continue(Some(output)) => println!("{output}"),
            console::Flow::Continue(None) => {}
            console::Flow::Exit => break,
        }
    }

    Ok(())
}
