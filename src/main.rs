//! line-tally server
//!
//! Listens for TCP connections and answers every line with the total number
//! of lines received from all clients since startup.
//!
//! Configuration via CLI arguments or TOML file; see `--help`.

use line_tally::config::Config;
use line_tally::counter::MessageCounter;
use line_tally::server::Server;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        listen = %config.listen,
        workers = ?config.workers,
        "Starting line-tally server"
    );

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    if let Some(workers) = config.workers {
        builder.worker_threads(workers);
    }
    let runtime = builder.enable_all().build()?;

    runtime.block_on(async {
        let counter = Arc::new(MessageCounter::new());
        let server = Server::bind(&config, counter).inspect_err(|e| {
            error!(error = %e, "Cannot start server");
        })?;
        server.run().await?;
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}
