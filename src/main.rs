//! # Media Transcriber - Main Application Entry Point
//!
//! A small web service: upload a video or audio file through a form, get back
//! a transcript of its speech.
//!
//! ## Application Architecture:
//! - **config**: Application configuration (TOML file + environment variables)
//! - **state**: Shared state, metrics, and the pipeline collaborators
//! - **transcriber**: Allow-list, ffmpeg extraction, remote recognition, per-request job
//! - **handlers**: The upload form (`GET /`, `POST /`)
//! - **page**: HTML rendering
//! - **health**: Health and metrics endpoints
//! - **middleware**: Request logging and metrics collection
//! - **error**: Error taxonomy and HTTP error responses

mod config;
mod error;
mod handlers;
mod health;
mod middleware;
mod page;
mod state;
mod transcriber;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use crate::config::AppConfig;
use crate::state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Set once SIGINT or SIGTERM arrives.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

/// The main application entry point.
///
/// 1. Loads configuration from files and environment variables
/// 2. Sets up logging
/// 3. Builds the shared state (ffmpeg extractor, HTTP recognizer, page renderer)
/// 4. Serves until the server stops or a shutdown signal arrives
#[actix_web::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);
    if config.recognizer.api_key.is_empty() {
        warn!("No recognizer API key configured; requests are sent unauthenticated");
    }

    std::fs::create_dir_all(&config.uploads.dir).with_context(|| {
        format!("creating upload directory {}", config.uploads.dir.display())
    })?;
    std::fs::create_dir_all(&config.media.scratch_dir).with_context(|| {
        format!("creating scratch directory {}", config.media.scratch_dir.display())
    })?;

    let app_state = AppState::new(config.clone())?;
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allowed_methods(vec!["GET", "POST"])
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            // Middleware runs in reverse order of registration for responses
            .wrap(cors)
            .wrap(TracingLogger::default())
            .wrap(middleware::MetricsMiddleware)
            .wrap(middleware::RequestLogging)
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics)),
            )
            .route("/health", web::get().to(health::health_check))
            .route("/", web::get().to(handlers::index))
            .route("/", web::post().to(handlers::upload))
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

/// Initialize tracing.
///
/// `RUST_LOG` controls what gets logged; without it the default is
/// `media_transcriber=debug,actix_web=info`.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "media_transcriber=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .context("initializing tracing")?;

    Ok(())
}

/// Flip `SHUTDOWN_SIGNAL` on SIGTERM or SIGINT.
///
/// Stopping through the server handle lets in-flight transcriptions finish,
/// and with them their file cleanup.
#[cfg(unix)]
fn setup_signal_handlers() {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async {
        let (mut sigterm, mut sigint) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
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

#[cfg(not(unix))]
fn setup_signal_handlers() {
    tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C");
            SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
        }
    });
}

/// Resolve once the shutdown flag is set, polling every 100ms.
async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
