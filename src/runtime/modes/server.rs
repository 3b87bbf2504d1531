//! Server mode
//!
//! Opens the stores, kicks off the initial load and the daily schedule, then
//! serves the lookup API until Ctrl+C.

use std::time::Duration;

use actix_web::{
    App, HttpServer,
    middleware::{Compress, DefaultHeaders},
    web,
};
use anyhow::Result;
use tracing::{error, warn};

use crate::api::{self, ApiKey};
use crate::config::AppConfig;
use crate::runtime::lifetime;

/// Run the HTTP server
///
/// **Note**: Logging system must be initialized before calling this function
pub async fn run_server(config: AppConfig) -> Result<()> {
    let host = config.server.host.clone();
    let port = config.server.port;
    let cpu_count = config.server.cpu_count.clamp(1, 32);
    let api_key = ApiKey::new(config.api.key());

    if api_key.is_set() {
        warn!("API key configured; /ip requires the API-KEY header");
    } else {
        warn!("No API key configured; /random, /benchmark and /refresh are disabled");
    }

    let startup = lifetime::startup::prepare_server_startup(config)
        .await
        .map_err(|e| {
            error!("Server startup failed: {:#}", e);
            e
        })?;

    let app = startup.app.clone();
    let resolver = app.resolver.clone();
    let orchestrator = app.orchestrator.clone();
    let registry = app.registry.clone();

    warn!("Using {} CPU cores for the server", cpu_count);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(Compress::default())
            .wrap(DefaultHeaders::new().add(("Cache-Control", "no-cache, no-store")))
            .app_data(web::Data::new(resolver.clone()))
            .app_data(web::Data::new(orchestrator.clone()))
            .app_data(web::Data::new(registry.clone()))
            .app_data(web::Data::new(api_key.clone()))
            .configure(api::configure)
    })
    .keep_alive(Duration::from_secs(30))
    .client_request_timeout(Duration::from_millis(5000))
    .workers(cpu_count)
    .disable_signals();

    let bind_address = format!("{}:{}", host, port);
    warn!("Starting server at http://{}", bind_address);
    let server = server.bind(bind_address)?.run();
    let handle = server.handle();

    // Wait for server or shutdown signal
    tokio::select! {
        res = server => {
            res?;
        }
        _ = lifetime::shutdown::wait_for_signal() => {
            handle.stop(true).await;
        }
    }

    lifetime::shutdown::shutdown(&startup.app, &startup.shutdown_tx, startup.scheduler).await;
    warn!("Graceful shutdown: all tasks completed");
    Ok(())
}
