//! # Memory Call Bridge - Main Application Entry Point
//!
//! Relays phone calls between a telephony provider's media stream and a
//! conversational-AI agent, personalizing each call from the caller's
//! stored memories and saving the conversation when it ends.
//!
//! ## Application Architecture:
//! - **config**: Configuration (optional config file + environment variables)
//! - **state**: Shared metrics, call capacity, and collaborator clients
//! - **health**: Health and metrics endpoints
//! - **middleware**: Request logging and metrics
//! - **telephony**: Call-setup webhook and the media stream actor
//! - **bridge**: Per-call state machine
//! - **ai**: Conversational-AI session client
//! - **memory**: Memory search, personalization, and transcript persistence
//! - **signaling**: Automated-system detection and DTMF synthesis
//! - **audio**: μ-law codec and framing
//! - **error**: Error types and HTTP error responses

mod ai;          // Conversational-AI session (ai/ directory)
mod audio;       // Audio codec (audio/ directory)
mod bridge;      // Per-call bridge (bridge/ directory)
mod config;      // Configuration management (config.rs)
mod error;       // Error handling types (error.rs)
mod health;      // Health check endpoints (health.rs)
mod memory;      // Memory collaborator (memory/ directory)
mod middleware;  // Custom middleware (middleware/ directory)
mod signaling;   // In-band signaling (signaling/ directory)
mod state;       // Application state management (state.rs)
mod telephony;   // Telephony webhook and media stream (telephony/ directory)

use actix_web::{web, App, HttpServer};
use ai::session::{AiConnector, ElevenLabsConnector};
use anyhow::Result;
use bridge::session::BridgeSettings;
use bridge::setup::BridgeServices;
use config::AppConfig;
use memory::client::Mem0Client;
use memory::context::ContextProvider;
use memory::persistence::TranscriptPersister;
use memory::{DisabledMemoryStore, MemoryStore};
use state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Set once a termination signal arrives.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

#[actix_web::main]
async fn main() -> Result<()> {
    // a missing .env file is fine
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;
    config.ensure_credentials()?;

    info!("Starting memory-call-bridge v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);

    let (services, memory_enabled) = build_services(&config)?;
    let stream_path = config.telephony.stream_path.clone();
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let app_state = AppState::new(config, services, memory_enabled);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            // response order is the reverse of registration
            .wrap(TracingLogger::default())
            .wrap(middleware::MetricsMiddleware)
            .wrap(middleware::RequestLogging)
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics)),
            )
            .route("/", web::get().to(health::root))
            .route("/health", web::get().to(health::health_check))
            .route("/twilio/inbound_call", web::route().to(telephony::twiml::inbound_call))
            .route(&stream_path, web::get().to(telephony::stream::media_stream))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Wire the collaborators every call shares.
///
/// Without a memory API key calls still work, just never personalized.
fn build_services(config: &AppConfig) -> Result<(Arc<BridgeServices>, bool)> {
    let store: Arc<dyn MemoryStore> = if config.memory.is_enabled() {
        info!(api_base = %config.memory.api_base, "Memory service enabled");
        Arc::new(Mem0Client::new(&config.memory)?)
    } else {
        warn!("No memory API key configured; calls will not be personalized");
        Arc::new(DisabledMemoryStore)
    };

    let memory_enabled = store.is_enabled();
    let connector: Arc<dyn AiConnector> = Arc::new(ElevenLabsConnector::new(&config.ai)?);

    let services = BridgeServices {
        context: ContextProvider::new(
            store.clone(),
            Duration::from_millis(config.memory.fetch_timeout_ms),
            config.memory.search_limit,
            config.memory.search_query.clone(),
        ),
        connector,
        persister: TranscriptPersister::new(store),
        settings: BridgeSettings::from(&config.bridge),
    };

    Ok((Arc::new(services), memory_enabled))
}

/// `RUST_LOG` controls filtering; defaults to debug for this crate.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "memory_call_bridge=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Listen for SIGTERM and SIGINT and raise the shutdown flag.
fn setup_signal_handlers() {
    tokio::spawn(async {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                (Err(e), _) | (_, Err(e)) => {
                    error!("Failed to install signal handlers: {}", e);
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
