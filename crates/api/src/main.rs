use std::net::{AddrParseError, SocketAddr};
use std::sync::Arc;

use ingestion_api::config::AppConfig;
use ingestion_api::connector::{connector, KafkaUnavailable};
use ingestion_api::router::{build_app_router, InvalidOrigin};
use ingestion_api::state::AppState;
use ingestion_core::config::ConfigError;
use ingestion_events::{EventPublisher, Lifecycle, StartError};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Fatal errors before or while serving.
#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cors(#[from] InvalidOrigin),

    #[error("failed to start Kafka producer: {0}")]
    Producer(#[from] StartError),

    #[error("invalid HOST address: {0}")]
    Address(#[from] AddrParseError),

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Transport(#[from] KafkaUnavailable),
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "Ingestion service failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), StartupError> {
    // --- Configuration ---
    let config = AppConfig::from_env()?;
    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        environment = %config.service.environment,
        "Loaded server configuration",
    );

    // --- Producer ---
    let connector = connector(config.producer.transport)?;
    let lifecycle = Arc::new(Lifecycle::new(config.producer.clone()));
    let producer = lifecycle.start(connector.as_ref()).await?;

    let publisher = EventPublisher::new(producer, config.service.clone())
        .with_max_attempts(config.producer.retries);

    // --- App state ---
    let shutdown = CancellationToken::new();
    let state = AppState {
        config: Arc::new(config.server.clone()),
        lifecycle: Arc::clone(&lifecycle),
        publisher,
        service: Arc::new(config.service.clone()),
        shutdown: shutdown.clone(),
    };

    let app = build_app_router(state, &config.server)?;

    // --- Start server ---
    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown.cancel();
        })
        .await?;

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    if let Err(e) = lifecycle.shutdown(config.server.shutdown_timeout()).await {
        tracing::error!(error = %e, "Kafka producer did not shut down cleanly");
    }

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise `LOG_LEVEL=debug` raises the crate
/// targets from `info` to `debug`. `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let level = match std::env::var("LOG_LEVEL").as_deref() {
        Ok("debug") => "debug",
        _ => "info",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "ingestion_api={level},ingestion_events={level},ingestion_core={level},tower_http={level}"
        )
        .into()
    });
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
