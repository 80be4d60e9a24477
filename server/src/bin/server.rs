use speechgate_server::config::debug_enabled;
use speechgate_server::{start_server, ServerConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Logging / tracing
    let default_filter = if debug_enabled(|k| std::env::var(k).ok()) {
        "debug,hyper=info"
    } else {
        "info,tower_http=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .compact()
        .init();

    tracing::info!("Starting speechgate...");
    let cfg = ServerConfig::load();

    start_server(cfg).await.map_err(|e| e.into())
}
