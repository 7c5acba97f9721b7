//! frec-server - speech recording session service
//!
//! Receives recording sessions from field devices, issues prompts and
//! serves evaluation sets to graders.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use frec_common::config::{resolve_root_folder, ServiceConfig, ROOT_FOLDER_ENV};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use frec_server::AppState;

/// Command-line arguments for frec-server
#[derive(Parser, Debug)]
#[command(name = "frec-server")]
#[command(about = "Speech recording session service")]
#[command(version)]
struct Args {
    /// Recordings root folder (overrides FREC_ROOT_FOLDER and config)
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Config file (default: ~/.config/frec/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on (overrides config)
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config is read before the subscriber exists so its log level applies
    let config = ServiceConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting frec-server");
    info!(
        "Version: {} (git {}, built {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP")
    );

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), ROOT_FOLDER_ENV, &config);
    tokio::fs::create_dir_all(&root_folder)
        .await
        .with_context(|| format!("Failed to create root folder {}", root_folder.display()))?;
    info!("Root folder: {}", root_folder.display());

    let db_path = config.database_path_for(&root_folder);
    info!("Database: {}", db_path.display());
    let db = frec_common::db::init_database(&db_path)
        .await
        .context("Failed to initialize database")?;
    info!("Database connection established");

    let state = AppState::new(db, root_folder, &config);
    let app = frec_server::build_router(state);

    let bind = args.bind.unwrap_or_else(|| config.bind_address.clone());
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind to {}", bind))?;
    info!("Listening on http://{}", bind);
    info!("Recordings served under {}", config.public_recordings_base);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
