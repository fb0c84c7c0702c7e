//! Starting a generation run.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use genarena_core::{AspectRatio, Result};
use genarena_providers::SlotSelection;
use genarena_runtime::RunTicket;
use serde::Deserialize;
use tracing::warn;

use super::error_response;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/generate", post(generate))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateBody {
    pub prompt: String,
    #[serde(default)]
    pub aspect_ratio: Option<String>,
    #[serde(default)]
    pub slots: Vec<SlotSelection>,
}

/// POST /api/generate: supersede the current run and start a new one.
async fn generate(
    State(state): State<Arc<AppState>>,
    Json(body): Json<GenerateBody>,
) -> impl IntoResponse {
    match start_run(&state, &body) {
        Ok(ticket) => (StatusCode::OK, Json(serde_json::json!(ticket))),
        Err(e) => {
            warn!("Rejected generate request: {}", e);
            error_response(&e)
        }
    }
}

fn start_run(state: &AppState, body: &GenerateBody) -> Result<RunTicket> {
    let aspect_ratio = match body.aspect_ratio.as_deref() {
        Some(raw) => AspectRatio::parse(raw)?,
        None => AspectRatio::default(),
    };
    let request = state
        .registry()
        .build_request(&body.prompt, aspect_ratio, &body.slots)?;
    state.controller.start(request)
}

#[cfg(test)]
mod tests {
    use crate::routes::test_support::{app, get, post_json};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_generate_returns_ticket() {
        let app = app();
        let (status, json) = post_json(
            &app,
            "/api/generate",
            json!({
                "prompt": "a red fox",
                "aspectRatio": "16:9",
                "slots": [{"provider": "fal", "enabled": false}],
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["generation"], 1);
        let request_id = json["requestId"].as_str().unwrap().to_string();

        let (_, snap) = get(&app, "/api/runs/current").await;
        assert_eq!(snap["requestId"], request_id);
        assert_eq!(snap["aspectRatio"], "16:9");
        assert_eq!(snap["slots"][0]["status"], "job");
        assert_eq!(snap["slots"][1]["status"], "disabled");
    }

    #[tokio::test]
    async fn test_generate_validation_errors() {
        let app = app();
        let cases = [
            json!({"prompt": "   "}),
            json!({"prompt": "a fox", "aspectRatio": "wide"}),
            json!({"prompt": "a fox", "aspectRatio": "0:9"}),
            json!({"prompt": "a fox", "slots": [{"provider": "midjourney"}]}),
            json!({"prompt": "a fox", "slots": [{"provider": "fal", "model": "dall-e-3"}]}),
            json!({"prompt": "a fox", "slots": [{"provider": "fal"}, {"provider": "fal"}]}),
        ];
        for body in cases {
            let (status, json) = post_json(&app, "/api/generate", body.clone()).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "body: {}", body);
            assert!(json["error"].is_string());
        }

        let (_, status) = get(&app, "/api/status").await;
        assert_eq!(status["generation"], 0);
    }
}
