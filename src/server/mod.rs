//! HTTP API.
//!
//! Every route except `/health` requires the caller's user id in the
//! `x-user-id` header; authentication itself happens in front of this server.

mod error;
mod routes;

pub use error::ApiError;

use crate::orchestrator::Orchestrator;
use axum::extract::{DefaultBodyLimit, FromRequestParts};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Shared application state.
pub struct AppState {
    pub orchestrator: Orchestrator,
}

/// Authenticated user id taken from [`USER_ID_HEADER`].
pub struct UserId(pub String);

impl<S: Send + Sync> FromRequestParts<S> for UserId {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| UserId(v.to_string()))
            .ok_or_else(|| {
                ApiError::new(
                    StatusCode::UNAUTHORIZED,
                    format!("Missing {} header", USER_ID_HEADER),
                )
            })
    }
}

/// Build the router.
pub fn router(orchestrator: Orchestrator) -> Router {
    let upload_limit = orchestrator.settings().server.max_upload_mb * 1024 * 1024;
    let state = Arc::new(AppState { orchestrator });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(routes::health))
        .route("/index", get(routes::index_status))
        .route("/sources", get(routes::list_sources))
        .route(
            "/sources/{id}",
            get(routes::get_source)
                .patch(routes::update_source)
                .delete(routes::delete_source),
        )
        .route("/sources/video", post(routes::import_video))
        .route("/sources/playlist", post(routes::import_playlist))
        .route("/sources/text", post(routes::import_text))
        .route("/sources/document", post(routes::import_document))
        .route("/sources/audio", post(routes::import_audio))
        .route("/chat", post(routes::chat))
        .route(
            "/conversations",
            get(routes::list_conversations).post(routes::create_conversation),
        )
        .route(
            "/conversations/{id}",
            get(routes::get_conversation)
                .patch(routes::update_conversation)
                .delete(routes::delete_conversation),
        )
        .route(
            "/preferences",
            get(routes::get_preferences).patch(routes::update_preferences),
        )
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(cors)
        .with_state(state)
}

/// Serve the API until the process is stopped.
pub async fn serve(orchestrator: Orchestrator, addr: &str) -> crate::error::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", addr);
    axum::serve(listener, router(orchestrator)).await?;
    Ok(())
}

/// Routes and the paths they are mounted at, for startup output.
pub const ENDPOINTS: &[(&str, &str)] = &[
    ("Health", "GET    /health"),
    ("Index status", "GET    /index"),
    ("Sources", "GET    /sources"),
    ("Source", "GET|PATCH|DELETE /sources/{id}"),
    ("Import", "POST   /sources/{video|playlist|text|document|audio}"),
    ("Chat", "POST   /chat"),
    ("Conversations", "GET|POST /conversations"),
    ("Conversation", "GET|PATCH|DELETE /conversations/{id}"),
    ("Preferences", "GET|PATCH /preferences"),
];
