//! User API server
//!
//! Serves the user-account domain over HTTP (REST) and RPC from one process.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────────┐
//!                    │                    API SERVER                        │
//!                    │                                                      │
//!   HTTP client ─────┼─▶ http::server ─▶ auth (Basic/Token/Auto) ─▶ handlers│
//!                    │                                               │      │
//!                    │                                               ▼      │
//!                    │                                          UserStore   │
//!                    │                                               ▲      │
//!   RPC client ──────┼─▶ rpc::server ───────────────▶ UserService ───┘      │
//!                    │                                                      │
//!                    │  ┌────────────────────────────────────────────────┐  │
//!                    │  │ lifecycle: managers → coordinator → callbacks  │  │
//!                    │  │ config · observability · cache · net/tls       │  │
//!                    │  └────────────────────────────────────────────────┘  │
//!                    └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use user_apiserver::config::{check_config, read_config, ServerConfig};
use user_apiserver::observability::{init_logging, init_metrics};
use user_apiserver::store::{hash_password, MemoryUserStore, UserStore};
use user_apiserver::{ApiServer, ServerError};

#[derive(Parser)]
#[command(name = "user-apiserver", version)]
#[command(about = "User account API server (HTTP + RPC)", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP and RPC servers
    Serve {
        /// TOML configuration file; defaults are used when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Token signing key, overriding `auth.signing_key`
        #[arg(long, env = "APISERVER_SIGNING_KEY", hide_env_values = true)]
        signing_key: Option<String>,
    },
    /// Print an Argon2 hash suitable for `[[users]] password_hash`
    HashPassword { password: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Command::HashPassword { password } => match hash_password(&password) {
            Ok(hash) => {
                println!("{hash}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("error: {e}");
                ExitCode::FAILURE
            }
        },
        Command::Serve { config, signing_key } => serve(config, signing_key).await,
    }
}

async fn serve(path: Option<PathBuf>, signing_key: Option<String>) -> ExitCode {
    let config = match resolve_config(path, signing_key) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(2);
        }
    };

    init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "user-apiserver starting");

    tracing::info!(
        http = %config.http.bind_address,
        rpc = %config.rpc.bind_address,
        strategy = %config.auth.strategy,
        seed_users = config.users.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let store: Arc<dyn UserStore> = Arc::new(MemoryUserStore::with_seed_users(&config.users));
    match run(config, store).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Server exited with error");
            ExitCode::FAILURE
        }
    }
}

/// File (or defaults), then the key override, then validation.
fn resolve_config(
    path: Option<PathBuf>,
    signing_key: Option<String>,
) -> Result<ServerConfig, user_apiserver::config::ConfigError> {
    let mut config = match path {
        Some(path) => read_config(&path)?,
        None => ServerConfig::default(),
    };
    if let Some(key) = signing_key {
        config.auth.signing_key = key;
    }
    check_config(&config)?;
    Ok(config)
}

async fn run(config: ServerConfig, store: Arc<dyn UserStore>) -> Result<(), ServerError> {
    ApiServer::new(config, store).await?.prepare_run()?.run().await
}
