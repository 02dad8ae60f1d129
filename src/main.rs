use log::*;
use service::{config::Config, logging::Logger};
use std::process;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    let config = Config::new();

    Logger::init_logger(&config);

    info!(
        "Starting up SaaS starter ({}, route prefix {:?})",
        config.runtime_env(),
        config.route_prefix
    );

    // Cancelled on Ctrl-C; closes every open SSE stream before the server exits
    let shutdown = CancellationToken::new();

    let app = match web::app(&config, &shutdown) {
        Ok(app) => app,
        Err(e) => {
            error!("Failed to mount modules: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = web::init_server(&config, app, shutdown).await {
        error!("Server error: {e}");
        process::exit(1);
    }
}
