mod config;
mod exec;
mod routes;

use std::sync::Arc;

use tokio::net::TcpListener;

use config::Config;
use exec::ExecutionProxy;
use pairpad_collab::identity::RoomId;
use pairpad_collab::server::{RelayServer, ServerConfig};
use routes::{create_routes, AppState};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting pairpad server...");

    let config = Config::load().unwrap_or_else(|e| {
        log::error!("Failed to load configuration: {e}");
        log::warn!("Using default configuration");
        Config::default()
    });

    let proxy = match ExecutionProxy::new(
        config.judge_url.clone(),
        config.judge_host.clone(),
        config.rapidapi_key.clone(),
        config.exec_timeout(),
    ) {
        Ok(proxy) => proxy,
        Err(e) => {
            log::error!("{e}");
            std::process::exit(1);
        }
    };
    if !proxy.has_key() {
        log::warn!("RAPIDAPI_KEY is not set; /api/run will answer 500");
    }
    let app = match create_routes(AppState { proxy: Arc::new(proxy) }, &config.cors_origin) {
        Ok(app) => app,
        Err(e) => {
            log::error!("Invalid CORS_ORIGIN {:?}: {e}", config.cors_origin);
            std::process::exit(1);
        }
    };

    let (http_listener, relay_listener) = match bind_listeners(&config).await {
        Ok(listeners) => listeners,
        Err(e) => {
            log::error!("{e}");
            std::process::exit(1);
        }
    };

    // Relay on its own port
    let relay = RelayServer::new(ServerConfig {
        bind_addr: config.ws_address(),
        default_room: RoomId::new(config.room.clone()),
        ..ServerConfig::default()
    });
    tokio::spawn(async move {
        if let Err(e) = relay.serve(relay_listener).await {
            log::error!("Relay server error: {e}");
        }
    });

    log::info!("HTTP server running on http://{}", config.server_address());
    log::info!("Relay available at ws://{}", config.ws_address());

    if let Err(e) = axum::serve(http_listener, app).await {
        log::error!("HTTP server error: {e}");
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Failed to bind {addr}: {source}")]
struct BindError {
    addr: String,
    source: std::io::Error,
}

/// Bind the HTTP and relay listeners before anything is served.
async fn bind_listeners(config: &Config) -> Result<(TcpListener, TcpListener), BindError> {
    let bind = |addr: String| async move {
        TcpListener::bind(&addr).await.map_err(|source| BindError { addr, source })
    };
    let http = bind(config.server_address()).await?;
    let relay = bind(config.ws_address()).await?;
    Ok((http, relay))
}
