use crate::config::load_config;
use crate::gateway::run_gateway;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "whatsrelay")]
#[command(about = "whatsrelay - WhatsApp webhook relay for Twilio")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the JSON config file (default: ~/.whatsrelay/config.json)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Run the webhook server (default)
    Serve {
        /// Port to listen on, overrides PORT and the config file
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Display version information
    Version,
}

impl Cli {
    /// The command to run; `serve` when none was given
    pub fn resolved_command(&self) -> Commands {
        match &self.command {
            Some(Commands::Version) => Commands::Version,
            Some(Commands::Serve { port }) => Commands::Serve { port: *port },
            None => Commands::Serve { port: None },
        }
    }
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.resolved_command() {
        Commands::Version => {
            print_version();
            Ok(())
        }
        Commands::Serve { port } => {
            let config = load_config(port, cli.config)?;
            let runtime = tokio::runtime::Runtime::new().context("Failed to start Tokio runtime")?;
            runtime.block_on(run_gateway(&config))
        }
    }
}

fn print_version() {
    println!("whatsrelay {}", env!("CARGO_PKG_VERSION"));
}
