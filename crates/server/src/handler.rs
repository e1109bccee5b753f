//! Axum request handlers: translate export HTTP requests into orchestrator calls.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use framestitch_common::config::ServerConfig;
use framestitch_common::error::ExportError;
use framestitch_session::{ExportOrchestrator, FrameOutcome, SessionSnapshot};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{debug, info};

use crate::error::ApiError;

/// Shared handler state.
pub struct AppState {
    pub orchestrator: ExportOrchestrator,
    /// Base for artifact URLs; derived from the `Host` header when `None`.
    pub public_base_url: Option<String>,
    /// Answer frames for unknown tokens with 404.
    pub strict_unknown_tokens: bool,
    /// Host used when a request carries no `Host` header.
    pub fallback_host: String,
}

/// Running HTTP server handle.
pub struct ExportServer {
    addr: SocketAddr,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ExportServer {
    /// Bind `config.bind` and serve the export API plus `/output` downloads
    /// from `output_dir`.
    pub async fn start(
        config: &ServerConfig,
        output_dir: &Path,
        orchestrator: ExportOrchestrator,
    ) -> Result<Self> {
        let listener = TcpListener::bind(&config.bind)
            .await
            .with_context(|| format!("Failed to bind to {}", config.bind))?;
        let addr = listener.local_addr()?;

        let state = Arc::new(AppState {
            orchestrator,
            public_base_url: config.public_base_url.clone(),
            strict_unknown_tokens: config.strict_unknown_tokens,
            fallback_host: addr.to_string(),
        });
        let app = router(state, output_dir, config.max_frame_bytes);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
            {
                tracing::error!(error = %err, "HTTP server error");
            }
        });

        info!("Export server listening on http://{}", addr);
        Ok(Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    /// Address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// `http://<addr>` for this server.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop accepting connections and wait for in-flight requests.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

/// Build the export router.
pub fn router(state: Arc<AppState>, output_dir: &Path, max_frame_bytes: usize) -> Router {
    Router::new()
        .route("/start", post(start_export))
        .route("/frame", post(upload_frame))
        .route("/finish", post(finish_export))
        .route("/status", get(session_status))
        .nest_service("/output", ServeDir::new(output_dir))
        .layer(DefaultBodyLimit::max(max_frame_bytes))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("cross-origin-opener-policy"),
            HeaderValue::from_static("same-origin"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("cross-origin-embedder-policy"),
            HeaderValue::from_static("require-corp"),
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn required_header<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, ApiError> {
    header_value(headers, name)
        .ok_or_else(|| ApiError::bad_request(format!("missing {name} header")))
}

/// POST /start: register a session.
async fn start_export(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let token = header_value(&headers, "token").map(str::to_string);
    let frames_raw = required_header(&headers, "frames")?;
    let frames = frames_raw
        .parse::<u32>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| ExportError::invalid_frame_count(frames_raw))?;

    let token = state.orchestrator.start(token, frames).await?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain")],
        token,
    )
        .into_response())
}

/// POST /frame: store one frame.
async fn upload_frame(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let token = required_header(&headers, "token")?;
    let index_raw = required_header(&headers, "index")?;
    let index = index_raw
        .parse::<u32>()
        .map_err(|_| ApiError::bad_request(format!("invalid frame index: {index_raw}")))?;

    match state.orchestrator.frame(token, index, &body).await? {
        FrameOutcome::Ignored if state.strict_unknown_tokens => {
            Err(ApiError::UnknownToken(token.to_string()))
        }
        outcome => {
            debug!(token, index, ?outcome, "Frame handled");
            Ok(StatusCode::OK)
        }
    }
}

/// POST /finish: wait for all frames, encode, and return the artifact URL.
async fn finish_export(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let token = required_header(&headers, "token")?;
    let location = state.orchestrator.finish(token).await?;

    let base = match &state.public_base_url {
        Some(base) => base.clone(),
        None => {
            let host = header_value(&headers, header::HOST.as_str())
                .unwrap_or(state.fallback_host.as_str());
            format!("http://{host}")
        }
    };
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain")],
        location.url(&base),
    )
        .into_response())
}

/// GET /status: progress of a live session.
async fn session_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let token = required_header(&headers, "token")?;
    Ok(Json(state.orchestrator.status(token).await?))
}
