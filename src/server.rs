//! HTTP surface of the relay: `/analyze`, `/download` and `/health`.
//!
//! Each request runs end-to-end on its own task: compile, run the extractor,
//! then normalize or dispatch. Nothing is cached or queued between requests.

use std::{
    io,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use tower_http::{
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use crate::{
    compiler::{FALLBACK_STEM, compile_analyze, compile_download},
    config::RelayConfig,
    dispatch::{DispatchFailure, dispatch},
    extractor::Extractor,
    metadata::{self, AnalyzeReport},
    request::{AnalyzePayload, DownloadPayload, DownloadRequest, RequestError, analyze_url},
};

const ANALYZE_FAILED: &str = "Failed to analyze video";
const PARSE_FAILED: &str = "Failed to parse video information";
const DOWNLOAD_FAILED: &str = "Download failed";
const DOWNLOAD_ACKNOWLEDGED: &str = "Download completed successfully";

#[derive(Clone)]
pub struct AppState {
    extractor: Arc<Extractor>,
    download_dir: Arc<PathBuf>,
}

impl AppState {
    pub fn new(extractor: Extractor, download_dir: PathBuf) -> Self {
        Self {
            extractor: Arc::new(extractor),
            download_dir: Arc::new(download_dir),
        }
    }
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<RequestError> for ApiError {
    fn from(err: RequestError) -> Self {
        Self::bad_request(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Builds the router. When `static_dir` is set, unknown paths are served from
/// it with `index.html` as the single-page-app fallback.
pub fn router(state: AppState, static_dir: Option<&Path>) -> Router {
    let mut app: Router<AppState> = Router::new()
        .route("/analyze", post(analyze))
        .route("/download", post(download))
        .route("/health", get(health));

    if let Some(dir) = static_dir {
        let index = dir.join("index.html");
        app = app.fallback_service(ServeDir::new(dir).fallback(ServeFile::new(index)));
    }

    app.layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Empty bodies decode to the payload's default so that a missing `url` is
/// reported as such rather than as a JSON error.
fn parse_body<T: DeserializeOwned + Default>(body: &[u8]) -> ApiResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|err| ApiError::bad_request(format!("Invalid JSON body: {err}")))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "OK",
        "message": "Server is running",
    }))
}

async fn analyze(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<AnalyzeReport>> {
    let payload: AnalyzePayload = parse_body(&body)?;
    let url = analyze_url(payload)?;

    let output = state
        .extractor
        .run(&compile_analyze(&url))
        .await
        .map_err(|err| {
            error!(%url, error = %err, stderr = err.stderr(), "analyze failed");
            ApiError::internal(ANALYZE_FAILED)
        })?;

    let report = metadata::normalize(&output.stdout).map_err(|err| {
        error!(%url, error = %err, "extractor metadata could not be parsed");
        ApiError::internal(PARSE_FAILED)
    })?;

    info!(
        %url,
        formats = report.formats.len(),
        audio_only = report.formats.iter().filter(|f| f.is_audio_only()).count(),
        video_only = report.formats.iter().filter(|f| f.is_video_only()).count(),
        "analyzed video"
    );
    Ok(Json(report))
}

async fn download(State(state): State<AppState>, body: Bytes) -> ApiResult<Response> {
    let payload: DownloadPayload = parse_body(&body)?;
    let request = DownloadRequest::from_payload(payload)?;
    let command = compile_download(&request, &state.download_dir);

    let output = state.extractor.run(&command).await.map_err(|err| {
        error!(
            url = %request.source_url,
            error = %err,
            stderr = err.stderr(),
            "download failed"
        );
        ApiError::internal(DOWNLOAD_FAILED)
    })?;

    let stem = command.stem().unwrap_or(FALLBACK_STEM);
    match dispatch(stem, &state.download_dir).await {
        Ok(delivery) => {
            info!(
                file = %delivery.display_filename,
                size = delivery.size_bytes,
                mime = delivery.mime_type,
                "sending download"
            );
            delivery.stream().await.map_err(|err| {
                error!(error = %err, "could not open produced file");
                ApiError::internal(DOWNLOAD_FAILED)
            })
        }
        Err(DispatchFailure::FileNotProduced { stem, dir }) => {
            // Exit status was 0, so the run is acknowledged even though no file
            // can be sent back.
            warn!(%stem, dir = %dir.display(), "extractor produced no matching file");
            Ok(Json(json!({
                "success": true,
                "message": DOWNLOAD_ACKNOWLEDGED,
                "output": output.stdout,
            }))
            .into_response())
        }
        Err(err) => {
            error!(error = %err, "could not resolve produced file");
            Err(ApiError::internal(DOWNLOAD_FAILED))
        }
    }
}

/// Running relay. Obtained from [`start`], shut down with [`RelayHandle::stop`].
pub struct RelayHandle {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<io::Result<()>>,
}

impl RelayHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting connections and waits for in-flight ones to finish.
    pub async fn stop(self) -> Result<()> {
        let _ = self.shutdown.send(());
        self.task
            .await
            .context("joining relay server task")?
            .context("running relay server")?;
        info!(addr = %self.local_addr, "relay stopped");
        Ok(())
    }
}

/// Prepares the download directory, probes the extractor and starts serving.
pub async fn start(config: &RelayConfig) -> Result<RelayHandle> {
    tokio::fs::create_dir_all(&config.download_dir)
        .await
        .with_context(|| format!("creating download directory {}", config.download_dir.display()))?;

    let extractor = Extractor::new(config.extractor());
    match extractor.version().await {
        Ok(version) => info!(binary = %extractor.binary().display(), %version, "extractor ready"),
        Err(err) => warn!(
            binary = %extractor.binary().display(),
            error = %err,
            "extractor version probe failed; requests will fail until it is installed"
        ),
    }

    let state = AppState::new(extractor, config.download_dir.clone());
    let app = router(state, config.static_dir.as_deref());

    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;
    let local_addr = listener.local_addr().context("reading bound address")?;

    let (shutdown, signal) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = signal.await;
            })
            .await
    });

    info!(addr = %local_addr, "relay listening on http://{}", local_addr);
    Ok(RelayHandle {
        local_addr,
        shutdown,
        task,
    })
}
