//! HTTP route handlers for the presentation layer.

pub mod generate;
pub mod providers;
pub mod runs;
pub mod status;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::{Json, Router};
use genarena_core::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the main Axum router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", api_routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(providers::routes())
        .merge(generate::routes())
        .merge(runs::routes())
        .merge(status::routes())
}

/// Map a crate error to a status code and `{"error": …}` body.
pub(crate) fn error_response(err: &Error) -> (StatusCode, Json<serde_json::Value>) {
    let status = match err {
        Error::Validation(_) | Error::UnknownProvider(_) | Error::UnknownModel { .. } => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(serde_json::json!({ "error": err.to_string() })))
}
