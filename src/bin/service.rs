use netcheck::*;
use std::sync::Arc;
use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // Load config
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.json".to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Using default configuration ({}: {})", config_path, e);
            Config::default()
        }
    };

    // Setup logging
    env_logger::Builder::from_default_env()
        .filter_level(config.log_filter())
        .init();

    log::info!("Initializing NetCheck service...");

    let prober = Arc::new(Prober::new());
    let server = Arc::new(CheckServer::new(config, prober));
    let addr = server.start().await?;

    log::info!("NetCheck service started on http://{}", addr);

    tokio::signal::ctrl_c().await?;
    log::info!("Shutting down...");

    Ok(())
}
