//! HTTP surface of the converter.
//!
//! [`router`] assembles the application:
//! - `POST /api/convert`: upload or URL in, download link out
//! - `GET /output/<file>`: produced artifacts, never cached
//! - `GET /health`: directory and dependency report
//! - everything else: JSON 404

pub mod config;
pub mod error;
pub mod routes;
pub mod upload;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use config::{Config, Mode};
pub use error::ApiError;

use crate::convert::Converter;
use crate::encoder::GifEncoder;
use crate::render::RenderDriver;
use crate::{EngineConfig, Launcher};

/// Multipart framing on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Shared state handed to every handler.
pub struct AppState {
    pub config: Arc<Config>,
    pub converter: Arc<Converter>,
}

impl AppState {
    /// Wire a converter to the directories and binaries named in `config`.
    pub fn from_config(config: Config, launcher: Arc<dyn Launcher>) -> Self {
        let engine = EngineConfig {
            executable: config.chrome_path.clone(),
            ..Default::default()
        };
        let driver = RenderDriver::new(launcher, engine).with_limit(config.max_renders);
        let encoder = GifEncoder::from_override(config.ffmpeg_path.as_deref());
        let converter = Converter::new(driver, encoder, config.frames_dir());

        Self {
            config: Arc::new(config),
            converter: Arc::new(converter),
        }
    }
}

/// Create every working directory, logging each one.
pub fn ensure_directories(config: &Config) -> std::io::Result<()> {
    for dir in config.directories() {
        if !dir.is_dir() {
            std::fs::create_dir_all(&dir)?;
            info!(path = %dir.display(), "Created directory");
        }
    }
    Ok(())
}

/// Build the complete [`Router`] for the application.
pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD);

    let output = ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .service(ServeDir::new(state.config.output_dir()));

    Router::new()
        .route(
            "/api/convert",
            post(routes::convert).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/health", get(routes::health))
        .nest_service("/output", output)
        .fallback(routes::not_found)
        .layer(cors_layer(&state.config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .as_deref()
        .unwrap_or("")
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(origins)
    }
}

/// Bind, serve until SIGINT/SIGTERM, then return.
pub async fn serve(state: Arc<AppState>) -> anyhow::Result<()> {
    let addr = state.config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, mode = state.config.mode.as_str(), "HTTP server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

/// Resolves when SIGINT (Ctrl-C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received; starting graceful shutdown");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_directories_creates_all() {
        let root = tempfile::tempdir().unwrap();
        let config = Config::default().with_data_dir(root.path());
        ensure_directories(&config).unwrap();
        for dir in config.directories() {
            assert!(dir.is_dir(), "{} missing", dir.display());
        }
        ensure_directories(&config).unwrap();
    }
}
