//! HTTP Server for the webinput API.
//!
//! Provides REST endpoints for batch upload and stage previews.
//!
//! # API Endpoints
//!
//! | Method | Path                               | Description                          |
//! |--------|------------------------------------|--------------------------------------|
//! | GET    | `/health`                          | Health check                         |
//! | GET    | `/api/version`                     | Backend version                      |
//! | GET    | `/api/harmonization/event/fields`  | Known fields with type and description |
//! | GET    | `/api/classification/types`        | Taxonomy to classification types     |
//! | GET    | `/api/custom/required_fields`      | Configured required fields           |
//! | POST   | `/api/upload`                      | Process a batch, report per line     |
//! | POST   | `/api/bots/process`                | Preview stage output, never submits  |
//! | GET    | `/api/logs`                        | SSE stream for real-time logs        |

use axum::{
    extract::State,
    http::{header, HeaderMap, Method},
    response::{sse::Event, Json, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::{log_error, log_info, log_success, log_warning, LOG_BROADCASTER};
use super::types::{UploadRequest, UploadResponse};
use crate::batch::{self, BatchContext, BatchRequest, PreviewResult};
use crate::config::AppConfig;
use crate::error::{BatchError, ServerError, ServerResult};
use crate::queue;
use crate::stages::StageRegistry;
use crate::validation::{taxonomy, FieldSpec, Harmonization};

/// Shared, read-only server state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub schema: Arc<Harmonization>,
    pub registry: Arc<StageRegistry>,
}

impl AppState {
    pub fn new(config: AppConfig, schema: Harmonization, registry: StageRegistry) -> Self {
        Self {
            config: Arc::new(config),
            schema: Arc::new(schema),
            registry: Arc::new(registry),
        }
    }
}

/// Build the router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION])
        .expose_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/version", get(version))
        .route("/api/harmonization/event/fields", get(harmonization_fields))
        .route("/api/classification/types", get(classification_types))
        .route("/api/custom/required_fields", get(required_fields))
        .route("/api/upload", post(upload))
        .route("/api/bots/process", post(process))
        .route("/api/logs", get(sse_logs))
        .layer(cors)
        .with_state(state)
}

/// Configuration problems worth reporting when the server starts.
pub fn startup_warnings(config: &AppConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    if !config.destination.is_persistent() {
        warnings.push(
            "Destination is the in-memory queue: submitted records are discarded after each batch"
                .to_string(),
        );
    }
    if config.api_token.is_none() {
        warnings.push("No API token configured: submissions are not authenticated".to_string());
    }
    warnings
}

/// Start the HTTP server
pub async fn start_server(port: u16, state: AppState) -> Result<(), Box<dyn std::error::Error>> {
    let warnings = startup_warnings(&state.config);
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    println!("🚀 Webinput server running on http://localhost:{}", port);
    println!("   POST /api/upload        - Process a batch");
    println!("   POST /api/bots/process  - Preview stage output");
    println!("   GET  /api/logs          - SSE log stream");
    println!("   GET  /health            - Health check");
    println!();
    for warning in warnings {
        println!("⚠️  {}", warning);
        log_warning(warning);
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "webinput",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "upload": "POST /api/upload",
            "preview": "POST /api/bots/process",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

async fn version() -> Json<Value> {
    Json(json!({ "webinput": env!("CARGO_PKG_VERSION") }))
}

async fn harmonization_fields(State(state): State<AppState>) -> Json<BTreeMap<String, FieldSpec>> {
    Json(
        state
            .schema
            .fields()
            .map(|(name, spec)| (name.to_string(), spec.clone()))
            .collect(),
    )
}

async fn classification_types() -> Json<BTreeMap<&'static str, Vec<&'static str>>> {
    Json(taxonomy::taxonomy_map())
}

async fn required_fields(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.config.required_fields.clone())
}

/// Submissions need the configured bearer token.
fn authorize(config: &AppConfig, headers: &HeaderMap, submit: bool) -> ServerResult<()> {
    let Some(expected) = config.api_token.as_deref() else {
        return Ok(());
    };
    if !submit {
        return Ok(());
    }
    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    match provided {
        Some(token) if token == expected => Ok(()),
        _ => Err(ServerError::Unauthorized),
    }
}

/// Upload endpoint
async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<UploadRequest>,
) -> ServerResult<Json<UploadResponse>> {
    if let Err(err) = authorize(&state.config, &headers, body.submit) {
        log_warning("Rejected submission without valid token");
        return Err(err);
    }

    let request = BatchRequest::from(body);
    log_info(format!("📄 New batch: {} lines", request.rows.len()));

    let result = tokio::task::spawn_blocking(move || {
        let mut destination = queue::connect(&state.config.destination).map_err(BatchError::from)?;
        let context = BatchContext::new(&state.config, &state.schema, &state.registry);
        batch::run_batch(&context, &request, destination.as_mut())
    })
    .await
    .map_err(|e| ServerError::Internal(e.to_string()))?;

    match result {
        Ok(report) => {
            log_success(format!(
                "Batch done: {} of {} lines invalid",
                report.input_lines_invalid, report.input_lines
            ));
            Ok(Json(UploadResponse::from(report)))
        }
        Err(err) => {
            log_error(format!("Batch aborted: {}", err));
            Err(err.into())
        }
    }
}

/// Preview endpoint
async fn process(
    State(state): State<AppState>,
    Json(body): Json<UploadRequest>,
) -> ServerResult<Json<PreviewResult>> {
    let request = BatchRequest::from(body);

    let preview = tokio::task::spawn_blocking(move || {
        let context = BatchContext::new(&state.config, &state.schema, &state.registry);
        batch::preview(&context, &request)
    })
    .await
    .map_err(|e| ServerError::Internal(e.to_string()))?;

    Ok(Json(preview))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
