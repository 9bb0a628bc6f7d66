//! `pubstead` command-line entry point.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use pubstead_server::config::{Config, StorageBackendKind, DEFAULT_CONFIG_FILE};
use pubstead_server::run_server;
use tracing::info;

#[derive(Parser)]
#[command(name = "pubstead")]
#[command(about = "Self-hosted pub package registry overlaying pub.dev")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the registry server
    Serve {
        /// JSON configuration file [default: ./pubstead.json if present]
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to [default: 4000]
        #[arg(long, short, env = "PUBSTEAD_PORT")]
        port: Option<u16>,

        /// Data directory for on-disk storage
        #[arg(long)]
        data: Option<PathBuf>,

        /// Keep everything in memory; nothing survives a restart
        #[arg(long, conflicts_with = "data")]
        memory: bool,

        /// Identity uploads act as when no tokens are configured
        #[arg(long)]
        uploader_email: Option<String>,

        /// Public base URL used in generated links
        #[arg(long)]
        addr: Option<String>,
    },

    /// Print the default configuration as JSON
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = pubstead_logging::init_subscriber();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            host,
            port,
            data,
            memory,
            uploader_email,
            addr,
        } => {
            let mut cfg = match &config {
                Some(path) => Config::load(path)?,
                None => Config::load_or_default(DEFAULT_CONFIG_FILE)?,
            };
            if let Some(host) = host {
                cfg.server.host = host;
            }
            if let Some(port) = port {
                cfg.server.port = port;
            }
            if let Some(data) = data {
                cfg.storage.backend = StorageBackendKind::Disk;
                cfg.storage.data_dir = data;
            }
            if memory {
                cfg.storage.backend = StorageBackendKind::Memory;
            }
            if let Some(email) = uploader_email {
                cfg.security.default_uploader = email;
            }
            if let Some(addr) = addr {
                cfg.server.public_url = Some(addr);
            }

            info!(port = cfg.server.port, "Starting pubstead");
            run_server(cfg).await
        }

        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&Config::default())?);
            Ok(())
        }
    }
}
