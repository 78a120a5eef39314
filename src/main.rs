mod alert;
mod config;
mod engine;
mod model;
mod probe;
mod stats;
mod store;
mod web;

use engine::Engine;
use probe::HttpProbe;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use store::{FileStore, StoreGateway};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut config_path = "config.json".to_string();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-d" => {
                if i + 1 < args.len() {
                    let dir = &args[i + 1];
                    if let Err(e) = env::set_current_dir(dir) {
                        eprintln!("Failed to change directory to {}: {}", dir, e);
                        std::process::exit(1);
                    }
                    i += 1;
                } else {
                    eprintln!("Missing argument for -d");
                    std::process::exit(1);
                }
            }
            "-c" => {
                if i + 1 < args.len() {
                    config_path = args[i + 1].clone();
                    i += 1;
                } else {
                    eprintln!("Missing argument for -c");
                    std::process::exit(1);
                }
            }
            _ => {}
        }
        i += 1;
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "upwatch=info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 1. Load configuration
    let app_config = match config::load_config(&config_path) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return;
        }
    };

    // 2. Open the target store
    let store = match FileStore::open(&app_config.store_path, app_config.monitor.flush_every) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            tracing::error!("Failed to open target store: {}", e);
            return;
        }
    };
    let gateway: Arc<dyn StoreGateway> = store.clone();

    // 3. Build the engine
    let http_probe = Arc::new(HttpProbe::new(
        Duration::from_secs(app_config.monitor.probe_timeout_secs),
        app_config.monitor.slow_threshold_ms,
    ));
    let engine = Arc::new(Engine::new(
        gateway.clone(),
        http_probe,
        app_config.monitor.clone(),
        app_config.alert.clone(),
    ));

    // 4. Start the sweep and retention loops
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(engine.clone().run(shutdown_rx.clone()));
    tokio::spawn(engine.clone().run_retention(shutdown_rx));

    // 5. Start the web server
    let app = web::app(web::AppState {
        engine,
        store: gateway,
    });
    let listener = match tokio::net::TcpListener::bind(&app_config.bind_addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", app_config.bind_addr, e);
            return;
        }
    };
    tracing::info!("Web server listening on http://{}", app_config.bind_addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(store, shutdown_tx))
        .await
    {
        tracing::error!("Web server failed: {}", e);
    }
}

async fn shutdown_signal(store: Arc<FileStore>, shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, stopping engine...");
    let _ = shutdown_tx.send(true);
    if let Err(e) = store.flush().await {
        tracing::error!("Failed to flush target store: {}", e);
    }
    tracing::info!("Goodbye!");
}
