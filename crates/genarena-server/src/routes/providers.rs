//! Provider and aspect-ratio listing.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use genarena_core::AspectRatio;

use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/providers", get(list_providers))
        .route("/aspect-ratios", get(list_aspect_ratios))
}

/// GET /api/providers: provider slots with their models.
async fn list_providers(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let providers = state.registry().list();
    Json(serde_json::json!({
        "providers": providers,
        "total": providers.len(),
    }))
}

/// GET /api/aspect-ratios
async fn list_aspect_ratios() -> Json<serde_json::Value> {
    let presets: Vec<String> = AspectRatio::PRESETS.iter().map(|r| r.to_string()).collect();
    Json(serde_json::json!({
        "presets": presets,
        "default": AspectRatio::default().to_string(),
    }))
}
