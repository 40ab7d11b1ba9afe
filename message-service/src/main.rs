use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

mod config;
mod db;
mod handlers;
mod middleware;
mod models;
mod routes;
mod utils;

#[cfg(test)]
mod test_support;

use config::Config;
use db::MessageStore;
use shared::messaging::{Broker, Publisher};

// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MessageStore>,
    pub publisher: Publisher,
}

// Pick the broker backend this binary was built with
#[cfg(feature = "kafka")]
fn connect_broker(config: &Config) -> Arc<dyn Broker> {
    use shared::messaging::{KafkaBroker, KafkaConfig};

    info!("Using Kafka broker at {}", config.broker.bootstrap_servers);
    Arc::new(KafkaBroker::new(KafkaConfig {
        bootstrap_servers: config.broker.bootstrap_servers.clone(),
        client_id: config.broker.client_id.clone(),
        message_timeout_ms: config.broker.message_timeout_ms,
    }))
}

#[cfg(not(feature = "kafka"))]
fn connect_broker(config: &Config) -> Arc<dyn Broker> {
    warn!(
        "Built without the `kafka` feature; messages for {} are kept in process only",
        config.broker.bootstrap_servers
    );
    Arc::new(shared::messaging::InMemoryBroker::new())
}

// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    // Initialize tracing for logging
    shared::observability::init_logging(config.log_config()?)
        .context("Failed to initialize logging")?;

    info!("Starting Message Service v{}", env!("CARGO_PKG_VERSION"));

    // Open the store; a failure here is fatal
    let store = Arc::new(
        MessageStore::open(&config.store_config())
            .await
            .context("Failed to initialize message store")?,
    );
    info!("Message store ready at {}", config.database.url);

    let publisher = Publisher::new(connect_broker(&config)).with_flush_timeout(config.flush_timeout());

    let state = AppState {
        store: store.clone(),
        publisher,
    };
    let app = routes::create_router(state);

    let addr = config.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Message Service listening on {}", addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error");

    // The router (and its state clones) is gone once serve returns
    match Arc::try_unwrap(store) {
        Ok(store) => store.close().await.context("Failed to close message store")?,
        Err(_) => warn!("Message store still referenced at shutdown; dropping connection"),
    }

    served?;
    info!("Message Service shut down gracefully");
    Ok(())
}
