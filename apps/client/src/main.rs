//! pulselink client entry point.

mod app;
mod config;

use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,pulselink=debug")),
        )
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting pulselink client"
    );

    let path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = config::Config::load(path)?;
    tracing::info!(
        host = %config.host,
        port = config.port,
        client_id = config.client_id,
        "configuration loaded"
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(config))?;

    tracing::info!("client shut down cleanly");
    Ok(())
}
