//! Response shape tests: the JSON the gallery frontend reads from the run
//! endpoints.
//!
//! These build runtime values directly (no HTTP server) and check field
//! names and types.

use std::time::Duration;

use genarena_core::{AspectRatio, GenerationRequest, SlotConfig};
use genarena_providers::{GeneratedImage, JobHandle, ProviderInfo};
use genarena_runtime::{Job, RunSnapshot, RunTicket, SlotStatus};
use uuid::Uuid;

fn request() -> GenerationRequest {
    GenerationRequest::new(
        "a lighthouse at dusk",
        AspectRatio::PORTRAIT,
        vec![
            SlotConfig::enabled("fireworks1", "flux-1-schnell-fp8"),
            SlotConfig::disabled("fireworks2", "flux-kontext-pro"),
        ],
    )
    .unwrap()
}

/// A finished slot carries image url, provider timing and elapsed time:
/// { status: "job", state: "succeeded", image: { url, providerElapsedMs }, elapsedMs }
#[tokio::test(start_paused = true)]
async fn test_succeeded_slot_shape() {
    let id = Uuid::new_v4();
    let req = request();
    let mut job = Job::new(id, 1, &req.slots()[0]);
    job.begin_submit().unwrap();
    job.mark_queued(JobHandle::new("req-123")).unwrap();
    tokio::time::advance(Duration::from_millis(1800)).await;
    job.succeed(GeneratedImage {
        url: "https://cdn.example/fox.png".into(),
        provider_elapsed_ms: Some(1200),
    })
    .unwrap();

    let mut snap = RunSnapshot::for_request(id, 1, 1, &req);
    assert!(snap.apply(&job.event()));

    let json = serde_json::to_value(&snap).unwrap();
    assert_eq!(json["requestId"], id.to_string());
    assert_eq!(json["prompt"], "a lighthouse at dusk");
    assert_eq!(json["aspectRatio"], "2:3");
    assert_eq!(json["version"], 2);

    let slot = &json["slots"][0];
    assert_eq!(slot["provider"], "fireworks1");
    assert_eq!(slot["model"], "flux-1-schnell-fp8");
    assert_eq!(slot["status"], "job");
    assert_eq!(slot["state"], "succeeded");
    assert_eq!(slot["handle"], "req-123");
    assert_eq!(slot["elapsedMs"], 1800);
    assert_eq!(slot["image"]["url"], "https://cdn.example/fox.png");
    assert_eq!(slot["image"]["providerElapsedMs"], 1200);
    assert!(slot["submittedAt"].is_string());
    assert!(slot["finishedAt"].is_string());
    assert!(slot.get("error").is_none());

    assert_eq!(json["slots"][1]["status"], "disabled");
    assert!(json["slots"][1].get("state").is_none());
}

/// A timed-out slot distinguishes itself from a failure by its state.
#[tokio::test(start_paused = true)]
async fn test_timed_out_slot_shape() {
    let id = Uuid::new_v4();
    let req = request();
    let mut job = Job::new(id, 1, &req.slots()[0]);
    job.begin_submit().unwrap();
    job.mark_queued(JobHandle::new("req-9")).unwrap();
    tokio::time::advance(Duration::from_secs(90)).await;
    job.time_out("no result within 90s").unwrap();

    let json = serde_json::to_value(SlotStatus::Job(job.view())).unwrap();
    assert_eq!(json["state"], "timedOut");
    assert_eq!(json["error"], "no result within 90s");
    assert_eq!(json["elapsedMs"], 90_000);
    assert!(json.get("image").is_none());
}

#[test]
fn test_ticket_and_unknown_shape() {
    let ticket = RunTicket {
        request_id: Uuid::new_v4(),
        generation: 3,
    };
    let json = serde_json::to_value(ticket).unwrap();
    assert!(json["requestId"].is_string());
    assert_eq!(json["generation"], 3);

    let json = serde_json::to_value(SlotStatus::Unknown).unwrap();
    assert_eq!(json, serde_json::json!({"status": "unknown"}));
}

#[test]
fn test_provider_info_shape() {
    let info = ProviderInfo {
        id: "fireworks3".into(),
        label: "Stability".into(),
        backend: "fireworks".into(),
        models: vec!["stable-diffusion-xl-1024-v1-0".into()],
        default_model: "stable-diffusion-xl-1024-v1-0".into(),
    };
    let json = serde_json::to_value(info).unwrap();
    assert_eq!(json["defaultModel"], "stable-diffusion-xl-1024-v1-0");
    assert!(json["models"].is_array());
    assert_eq!(json["label"], "Stability");
}
