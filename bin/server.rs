// Entity Canonicalization - Admin API Server
// REST surface over detect / merge / undo / resolve with Axum

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use entity_canon::{
    CanonConfig, Canonicalizer, DetectionSummary, DuplicatePair, EntityStore, EntityType,
    MergeError, MergeResult, MergeStrategy, Redirect, SqliteStore,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

/// Shared application state
#[derive(Clone)]
struct AppState {
    canon: Canonicalizer,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Response {
        (
            StatusCode::OK,
            Json(Self {
                success: true,
                data: Some(data),
                error: None,
                code: None,
            }),
        )
            .into_response()
    }

    fn err(status: StatusCode, code: &'static str, message: String) -> Response {
        (
            status,
            Json(Self {
                success: false,
                data: None,
                error: Some(message),
                code: Some(code),
            }),
        )
            .into_response()
    }
}

fn internal_error(e: impl std::fmt::Display) -> Response {
    tracing::error!(error = %e, "request failed");
    ApiResponse::<()>::err(StatusCode::INTERNAL_SERVER_ERROR, "internal", e.to_string())
}

fn bad_request(e: impl std::fmt::Display) -> Response {
    ApiResponse::<()>::err(StatusCode::BAD_REQUEST, "invalid_input", e.to_string())
}

fn merge_error(e: MergeError) -> Response {
    let status = match &e {
        MergeError::NotFound { .. } => StatusCode::NOT_FOUND,
        MergeError::Store(_) => return internal_error(e),
        _ => StatusCode::CONFLICT,
    };
    ApiResponse::<()>::err(status, e.code(), e.to_string())
}

#[derive(Serialize)]
struct ScanResponse {
    entity_type: EntityType,
    summary: DetectionSummary,
    pairs: Vec<DuplicatePair>,
}

#[derive(Deserialize)]
struct MergeRequest {
    source_id: String,
    target_id: String,
    #[serde(default = "default_strategy")]
    strategy: MergeStrategy,
    actor: String,
}

fn default_strategy() -> MergeStrategy {
    MergeStrategy::KeepTarget
}

#[derive(Deserialize)]
struct ActorRequest {
    actor: String,
}

#[derive(Serialize)]
struct UndoResponse {
    redirect_id: String,
    undone: bool,
}

#[derive(Serialize)]
struct ResolveResponse {
    id: String,
    canonical_id: String,
    chain: Vec<String>,
}

#[derive(Deserialize)]
struct DismissRequest {
    entity_a: String,
    entity_b: String,
    actor: String,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> Response {
    ApiResponse::ok("OK")
}

/// GET /api/duplicates/:type - Scan one entity type
async fn get_duplicates(State(state): State<AppState>, Path(raw_type): Path<String>) -> Response {
    let entity_type: EntityType = match raw_type.parse() {
        Ok(t) => t,
        Err(e) => return bad_request(e),
    };

    match state.canon.scan(entity_type) {
        Ok(pairs) => ApiResponse::ok(ScanResponse {
            entity_type,
            summary: DetectionSummary::from_pairs(&pairs),
            pairs,
        }),
        Err(e) => internal_error(e),
    }
}

/// POST /api/merge - Merge source into target
async fn post_merge(State(state): State<AppState>, Json(req): Json<MergeRequest>) -> Response {
    let result: Result<MergeResult, MergeError> =
        state
            .canon
            .merge(&req.source_id, &req.target_id, req.strategy, &req.actor);

    match result {
        Ok(result) => ApiResponse::ok(result),
        Err(e) => merge_error(e),
    }
}

/// POST /api/redirects/:id/undo - Reverse a merge
async fn post_undo(
    State(state): State<AppState>,
    Path(redirect_id): Path<String>,
    Json(req): Json<ActorRequest>,
) -> Response {
    match state.canon.undo(&redirect_id, &req.actor) {
        Ok(undone) => ApiResponse::ok(UndoResponse { redirect_id, undone }),
        Err(e) => merge_error(e),
    }
}

/// GET /api/redirects - Merge history
async fn get_redirects(State(state): State<AppState>) -> Response {
    let result: Result<Vec<Redirect>, MergeError> = state.canon.history().list(None);
    match result {
        Ok(redirects) => ApiResponse::ok(redirects),
        Err(e) => merge_error(e),
    }
}

/// GET /api/resolve/:id - Follow redirects to the canonical id
async fn get_resolve(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let chain = state.canon.resolve_chain(&id);
    let canonical_id = chain.last().cloned().unwrap_or_else(|| id.clone());

    ApiResponse::ok(ResolveResponse {
        id,
        canonical_id,
        chain,
    })
}

/// POST /api/dismissals - Mark a pair as not a duplicate
async fn post_dismissal(State(state): State<AppState>, Json(req): Json<DismissRequest>) -> Response {
    match state.canon.dismiss(&req.entity_a, &req.entity_b, &req.actor) {
        Ok(()) => ApiResponse::ok("dismissed"),
        Err(e) => internal_error(e),
    }
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,entity_canon=debug,tower_http=debug")),
        )
        .init();

    let config = CanonConfig::from_env()?;

    let store: Arc<dyn EntityStore> = Arc::new(SqliteStore::open(&config.db_path)?);
    let state = AppState {
        canon: Canonicalizer::from_config(store, &config)?,
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/duplicates/:type", get(get_duplicates))
        .route("/merge", post(post_merge))
        .route("/redirects", get(get_redirects))
        .route("/redirects/:id/undo", post(post_undo))
        .route("/resolve/:id", get(get_resolve))
        .route("/dismissals", post(post_dismissal))
        .with_state(state);

    let app = Router::new().nest("/api", api_routes).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    );

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(addr = %addr, db = %config.db_path.display(), "🌐 canon server listening");

    axum::serve(listener, app).await?;
    Ok(())
}
