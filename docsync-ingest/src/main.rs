//! docsync-ingest - JSON upload reconciliation service
//!
//! Accepts MongoDB-export JSON files on POST /upload-json and upserts each
//! record into the document store by its `_id`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use docsync_common::config::{
    CompiledDefaults, RootFolderInitializer, RootFolderResolver, TomlConfig,
};
use tokio::signal;
use tracing::{error, info, warn};

use docsync_ingest::db::{self, SqliteDocumentStore};
use docsync_ingest::{build_router, AppState, UploadSettings};

/// Command-line arguments for docsync-ingest
#[derive(Parser, Debug)]
#[command(name = "docsync-ingest")]
#[command(about = "JSON upload reconciliation service")]
#[command(version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "DOCSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Root folder holding the database and staged uploads
    #[arg(short, long, env = "DOCSYNC_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Port to listen on (overrides TOML)
    #[arg(short, long, env = "DOCSYNC_PORT")]
    port: Option<u16>,

    /// Address to bind (overrides TOML)
    #[arg(short, long, env = "DOCSYNC_BIND")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| CompiledDefaults::for_current_platform().config_file);
    let config = TomlConfig::load_or_default(&config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;

    docsync_common::logging::init_tracing(&config.logging)?;

    info!(
        "Starting docsync-ingest v{}",
        env!("CARGO_PKG_VERSION")
    );
    if config_path.exists() {
        info!("Configuration: {}", config_path.display());
    } else {
        warn!(
            "Config file not found at {}, using built-in defaults",
            config_path.display()
        );
    }

    let root_folder = RootFolderResolver::new()
        .with_cli_arg(args.root_folder)
        .with_toml(&config)
        .resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;

    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let pool = match db::init_database_pool(&db_path).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to open database: {}", e);
            return Err(e.into());
        }
    };

    let settings = UploadSettings {
        collection: config.collection.clone(),
        upload_dir: initializer.upload_dir(),
        max_upload_bytes: config.max_upload_bytes,
    };
    info!(
        collection = %settings.collection,
        upload_dir = %settings.upload_dir.display(),
        "Upload settings"
    );

    let state = AppState::new(SqliteDocumentStore::new(pool, config.lock_wait_ms), settings);
    let app = build_router(state);

    let addr = format!(
        "{}:{}",
        args.bind.unwrap_or(config.bind),
        args.port.unwrap_or(config.port)
    );
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Upload endpoint: POST http://{}/upload-json", addr);

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
            error!("Failed to install Ctrl+C handler: {}", e);
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
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
