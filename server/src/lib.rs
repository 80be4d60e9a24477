//! Speechgate Server
//!
//! HTTP front end that validates text-to-speech requests, runs them on the
//! synthesis worker pool and serves the generated audio.

pub mod config;
pub mod error;
pub mod handler;
pub mod routes;
pub mod state;

pub use config::ServerConfig;
pub use error::ApiError;
pub use routes::create_router;
pub use state::{AppState, HandlerSettings};

use std::sync::Arc;

use speechgate_core::{CommandSynthesizer, JobDispatcher};
use tracing::{info, warn};

/// Server startup errors
#[derive(thiserror::Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("server error: {0}")]
    Serve(String),
}

pub type Result<T> = std::result::Result<T, ServerError>;

/// Build the worker pool and state, bind, and serve until Ctrl-C.
pub async fn start_server(cfg: ServerConfig) -> Result<()> {
    let settings = HandlerSettings::from_config(&cfg)?;
    tokio::fs::create_dir_all(&settings.output_dir).await?;

    let command = cfg.command_config()?;
    if command.working_dir.is_dir() {
        info!(target: "server", dir = ?command.working_dir, "Inference directory found");
    } else {
        warn!(
            target: "server",
            dir = ?command.working_dir,
            "Inference directory not found - models need to be uploaded"
        );
    }

    let dispatcher = Arc::new(JobDispatcher::start(
        Arc::new(CommandSynthesizer::new(command)),
        cfg.dispatcher_config(),
    ));
    let app = create_router(AppState::new(dispatcher, settings));

    let addr = cfg.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(target: "server", url = %format!("http://{}", addr), debug = cfg.debug, "Speechgate server ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ServerError::Serve(e.to_string()))?;

    info!(target: "server", "Speechgate server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(target: "server", error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!(target: "server", "Shutdown requested");
}
