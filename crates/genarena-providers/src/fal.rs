//! fal.ai queue adapter.
//!
//! Submission goes to `POST {base}/{model}`; the returned `response_url` is
//! used as the job handle, and polling is a single `GET` of that URL.

use async_trait::async_trait;
use genarena_core::{AspectRatio, SubmitError, TransportError};
use reqwest::Client;
use serde_json::json;
use tracing::debug;

use crate::adapter::{
    error_detail, is_transient_status, GeneratedImage, JobHandle, PollResult, ProviderAdapter,
    SubmitParams,
};

pub const DEFAULT_FAL_QUEUE_URL: &str = "https://queue.fal.run";

/// Long edge of generated images, in pixels.
const LONG_EDGE: u32 = 1024;

pub struct FalAdapter {
    client: Client,
    base_url: String,
    api_key: String,
}

impl FalAdapter {
    pub fn new(client: Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn auth_header(&self) -> String {
        format!("Key {}", self.api_key)
    }
}

#[async_trait]
impl ProviderAdapter for FalAdapter {
    fn backend(&self) -> &'static str {
        "fal"
    }

    async fn submit(&self, params: &SubmitParams) -> Result<JobHandle, SubmitError> {
        let url = format!("{}/{}", self.base_url, params.model);
        let (width, height) = image_size(params.aspect_ratio, LONG_EDGE);
        let body = json!({
            "prompt": params.prompt,
            "image_size": { "width": width, "height": height },
            "num_images": 1,
        });

        debug!("Submitting to fal model {}", params.model);

        let response = self
            .client
            .post(&url)
            .header("Authorization", self.auth_header())
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::new(format!("fal submit failed: {}", e)))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| TransportError::new(format!("fal submit body unreadable: {}", e)))?;

        parse_submit_response(&self.base_url, &params.model, status, &text)
    }

    async fn poll(&self, _model: &str, handle: &JobHandle) -> Result<PollResult, TransportError> {
        let response = self
            .client
            .get(handle.as_str())
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| TransportError::new(format!("fal poll failed: {}", e)))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| TransportError::new(format!("fal poll body unreadable: {}", e)))?;

        classify_result(status, &text)
    }
}

/// Width and height for `ratio` with the longer side fixed at `long_edge`,
/// rounded down to a multiple of 8.
pub fn image_size(ratio: AspectRatio, long_edge: u32) -> (u32, u32) {
    let round = |v: f64| ((v as u32) / 8).max(1) * 8;
    if ratio.width >= ratio.height {
        let h = long_edge as f64 * ratio.height as f64 / ratio.width as f64;
        (long_edge, round(h))
    } else {
        let w = long_edge as f64 * ratio.width as f64 / ratio.height as f64;
        (round(w), long_edge)
    }
}

fn parse_submit_response(
    base_url: &str,
    model: &str,
    status: u16,
    body: &str,
) -> Result<JobHandle, SubmitError> {
    if is_transient_status(status) {
        return Err(TransportError::new(format!("fal returned {}: {}", status, error_detail(body))).into());
    }
    if !(200..300).contains(&status) {
        return Err(SubmitError::rejected(error_detail(body)));
    }

    let parsed: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| SubmitError::rejected(format!("unreadable fal response: {}", e)))?;

    if let Some(url) = parsed["response_url"].as_str() {
        return Ok(JobHandle::new(url));
    }
    match parsed["request_id"].as_str() {
        Some(id) => Ok(JobHandle::new(format!("{}/{}/requests/{}", base_url, model, id))),
        None => Err(SubmitError::rejected("fal response carried no request id")),
    }
}

/// Map a result-endpoint response onto a poll outcome.
pub fn classify_result(status: u16, body: &str) -> Result<PollResult, TransportError> {
    if status == 202 {
        return Ok(PollResult::Pending);
    }
    if is_transient_status(status) {
        return Err(TransportError::new(format!(
            "fal returned {}: {}",
            status,
            error_detail(body)
        )));
    }
    if !(200..300).contains(&status) {
        let detail = error_detail(body);
        if still_running(&detail) {
            return Ok(PollResult::Pending);
        }
        return Ok(PollResult::failed(detail));
    }

    let parsed: serde_json::Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => return Ok(PollResult::failed(format!("unreadable fal result: {}", e))),
    };

    if let Some(s) = parsed["status"].as_str() {
        if matches!(s, "IN_QUEUE" | "IN_PROGRESS") {
            return Ok(PollResult::Pending);
        }
    }

    let Some(url) = parsed["images"][0]["url"].as_str() else {
        return Ok(PollResult::failed("fal result contained no images"));
    };
    let provider_elapsed_ms = parsed["timings"]["inference"]
        .as_f64()
        .map(|secs| (secs * 1000.0).round() as u64);

    Ok(PollResult::Succeeded(GeneratedImage {
        url: url.to_string(),
        provider_elapsed_ms,
    }))
}

fn still_running(detail: &str) -> bool {
    let lower = detail.to_ascii_lowercase();
    lower.contains("in progress") || lower.contains("in_progress") || lower.contains("in_queue")
}
