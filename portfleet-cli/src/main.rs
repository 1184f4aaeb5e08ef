//! PortFleet CLI
//!
//! Runs one HTTP application on many ports and takes operator commands
//! on stdin.

// Use mimalloc as the global allocator for better performance
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "portfleet",
    author,
    version,
    about = "Run one HTTP application on many ports",
    long_about = "PortFleet serves a single shared route table on any number of TCP ports.\n\n\
                  Ports are started and stopped independently from an interactive console,\n\
                  and an optional tunnel can expose the application publicly.",
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the configured ports and run the command console
    Serve(commands::serve::ServeArgs),

    /// Expand a port spec such as 8000-8003 and print the ports
    Ports {
        /// Port or inclusive range
        spec: String,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => commands::serve::run(args).await,
        Commands::Ports { spec } => {
            let ports = portfleet::common::try_parse_port_range(&spec)?;
            for port in ports {
                println!("{port}");
            }
            Ok(())
        }
        Commands::Version => {
            commands::version::run();
            Ok(())
        }
    }
}
