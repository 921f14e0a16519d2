// Main entry point for the handwriting transcription backend

use handscript::{
    core::{types::ErrorBody, Config, TranscribeResponse},
    pipeline::Transcriber,
    utils::{
        scratch::{is_allowed_extension, sanitize_filename, words_dir_for, ScratchGuard},
        Metrics,
    },
};

use anyhow::Result;
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    transcriber: Arc<Transcriber>,
    metrics: Metrics,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Arc::new(Config::new().expect("Failed to load configuration"));

    // Initialize logging
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::new(format!(
        "handscript={},ort=off",
        match config.log_level() {
            tracing::Level::TRACE => "trace",
            tracing::Level::DEBUG => "debug",
            tracing::Level::INFO => "info",
            tracing::Level::WARN => "warn",
            tracing::Level::ERROR => "error",
        }
    ));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("=== HANDWRITING TRANSCRIPTION BACKEND ===");

    // Scratch directories exist for the lifetime of the process; their
    // contents are per-request and removed when each request ends
    std::fs::create_dir_all(config.upload_dir())?;
    std::fs::create_dir_all(config.output_dir())?;

    // Initialize metrics
    let metrics = Metrics::new();

    // Load both recognition sessions up front so the first request pays no
    // model-loading cost
    info!("Loading models...");
    let transcriber = Arc::new(Transcriber::new(config.clone(), metrics.clone())?);
    let state = AppState {
        config: config.clone(),
        transcriber,
        metrics,
    };

    // Setup CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Create router with monitoring endpoints
    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/stats", get(stats_endpoint))
        .route("/transcribe", post(transcribe))
        .with_state(state)
        .layer(DefaultBodyLimit::max(config.max_upload_bytes()))
        .layer(cors);

    let addr = format!("{}:{}", config.server_host(), config.server_port());
    info!("{}", "=".repeat(70));
    info!("Server starting on http://{}", addr);
    info!("{}", "-".repeat(70));
    info!("Endpoints:");
    info!("  GET  /            - Root endpoint");
    info!("  GET  /health      - Health check");
    info!("  GET  /metrics     - Prometheus metrics");
    info!("  GET  /stats       - Detailed statistics");
    info!("  POST /transcribe  - Transcribe one image (multipart/form-data)");
    info!("{}", "=".repeat(70));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn root() -> &'static str {
    "Handwriting Transcription Backend"
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Prometheus metrics endpoint
async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        state.metrics.to_prometheus(),
    )
}

/// Detailed statistics endpoint (JSON)
async fn stats_endpoint(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let snapshot = state.metrics.snapshot();
    serde_json::to_value(snapshot).map(Json).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to serialize metrics: {}", e),
        )
    })
}

fn bad_request(message: impl Into<String>) -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

fn internal_error(message: impl Into<String>) -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

/// Transcribe one uploaded handwriting image
///
/// # Request Format:
/// - multipart/form-data
/// - Field "image": one image file (png/jpg/jpeg)
///
/// # Response:
/// - 200: `{"transcribedText": ..., "correctedText": ...}`
/// - 400: missing field, empty filename, or disallowed extension
/// - 500: any pipeline failure, with the stage error message
async fn transcribe(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<TranscribeResponse>, (StatusCode, Json<ErrorBody>)> {
    let start_time = std::time::Instant::now();
    state.metrics.record_endpoint_request("/transcribe");

    let mut upload: Option<(String, axum::body::Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("Multipart error: {}", e)))?
    {
        if field.name() == Some("image") {
            let filename = field.file_name().unwrap_or("").to_string();
            let data = field
                .bytes()
                .await
                .map_err(|e| bad_request(format!("Read error: {}", e)))?;
            upload = Some((filename, data));
        }
    }

    // Validation happens before anything touches disk: a rejected request
    // must leave no scratch files behind
    let Some((filename, data)) = upload else {
        return Err(bad_request("No image provided"));
    };
    if filename.is_empty() {
        return Err(bad_request("No selected file"));
    }
    if !is_allowed_extension(&filename) {
        return Err(bad_request("Invalid file type"));
    }

    let safe_name = sanitize_filename(&filename);
    let upload_path = Path::new(state.config.upload_dir()).join(&safe_name);
    tokio::fs::write(&upload_path, &data)
        .await
        .map_err(|e| internal_error(format!("Failed to save upload: {}", e)))?;

    // Removes the upload and the crop directory on every exit path below
    let _scratch = ScratchGuard::new(
        upload_path.clone(),
        words_dir_for(&upload_path, Path::new(state.config.output_dir())),
    );

    let outcome = state
        .transcriber
        .transcribe(&upload_path)
        .await
        .map_err(|e| {
            state.metrics.record_request(false);
            error!("Transcription failed for {}: {:?}", safe_name, e);
            internal_error(e.to_string())
        })?;

    state.metrics.record_request(true);
    info!(
        "Transcribed {} in {:.2}s ({} chars)",
        safe_name,
        start_time.elapsed().as_secs_f64(),
        outcome.transcription.len()
    );

    Ok(Json(TranscribeResponse {
        transcribed_text: outcome.transcription,
        corrected_text: outcome.corrected,
    }))
}
