//! Run snapshot reads: current run, per-slot status, live stream.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, KeepAliveStream, Sse};
use axum::routing::get;
use axum::{Json, Router};
use futures::Stream;
use genarena_runtime::{RunSnapshot, SlotStatus};
use serde::Serialize;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt;
use tracing::error;
use uuid::Uuid;

use crate::state::AppState;

type SseStream = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/runs/current", get(current_run))
        .route("/runs/stream", get(stream_runs))
        .route("/runs/{request_id}/slots/{provider}", get(slot_status))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SlotResponse {
    request_id: String,
    provider: String,
    #[serde(flatten)]
    status: SlotStatus,
}

/// GET /api/runs/current: the published snapshot.
async fn current_run(State(state): State<Arc<AppState>>) -> Json<RunSnapshot> {
    Json(state.controller.snapshot().as_ref().clone())
}

/// GET /api/runs/:requestId/slots/:provider: never 404s; anything the
/// published run does not carry reports `unknown`.
async fn slot_status(
    State(state): State<Arc<AppState>>,
    Path((request_id, provider)): Path<(String, String)>,
) -> Json<SlotResponse> {
    let status = match Uuid::parse_str(&request_id) {
        Ok(id) => state.controller.slot(id, &provider),
        Err(_) => SlotStatus::Unknown,
    };
    Json(SlotResponse {
        request_id,
        provider,
        status,
    })
}

// ---------------------------------------------------------------
// Snapshot stream (SSE)
// ---------------------------------------------------------------

/// GET /api/runs/stream: one `snapshot` event per publish, starting with
/// the current one. Bursts of publishes may coalesce into the latest.
async fn stream_runs(State(state): State<Arc<AppState>>) -> Sse<KeepAliveStream<SseStream>> {
    let mut snapshots = WatchStream::new(state.controller.subscribe());

    let sse_stream: SseStream = Box::pin(async_stream::stream! {
        while let Some(snapshot) = snapshots.next().await {
            match Event::default().event("snapshot").json_data(snapshot.as_ref()) {
                Ok(event) => yield Ok::<_, Infallible>(event),
                Err(e) => {
                    error!("Failed to encode snapshot event: {}", e);
                    return;
                }
            }
        }
    });

    Sse::new(sse_stream).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use crate::routes::test_support::{app, get, post_json};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use futures::StreamExt;
    use serde_json::json;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_current_run_before_any_request() {
        let app = app();
        let (status, json) = get(&app, "/api/runs/current").await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["requestId"].is_null());
        assert_eq!(json["generation"], 0);
        assert_eq!(json["slots"], json!([]));
    }

    #[tokio::test]
    async fn test_slot_status_never_404() {
        let app = app();
        let (_, ticket) = post_json(
            &app,
            "/api/generate",
            json!({"prompt": "a red fox", "slots": [{"provider": "fal", "enabled": false}]}),
        )
        .await;
        let id = ticket["requestId"].as_str().unwrap();

        let (status, json) = get(&app, &format!("/api/runs/{}/slots/fal", id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "disabled");
        assert_eq!(json["provider"], "fal");

        let (_, json) = get(&app, &format!("/api/runs/{}/slots/fireworks1", id)).await;
        assert_eq!(json["status"], "job");
        assert!(json["state"].is_string());

        let (_, json) = get(&app, &format!("/api/runs/{}/slots/midjourney", id)).await;
        assert_eq!(json["status"], "unknown");

        let other = uuid::Uuid::new_v4();
        let (status, json) = get(&app, &format!("/api/runs/{}/slots/fal", other)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "unknown");

        let (status, json) = get(&app, "/api/runs/not-a-uuid/slots/fal").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "unknown");
    }

    #[tokio::test]
    async fn test_stream_starts_with_current_snapshot() {
        let app = app();
        let req = Request::get("/api/runs/stream").body(Body::empty()).unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()["content-type"].to_str().unwrap(),
            "text/event-stream"
        );

        let mut body = resp.into_body().into_data_stream();
        let chunk = body.next().await.unwrap().unwrap();
        let text = String::from_utf8(chunk.to_vec()).unwrap();
        assert!(text.starts_with("event: snapshot\n"));
        assert!(text.contains("\"generation\":0"));
    }
}
