//! Fireworks AI workflow adapter (asynchronous text-to-image).

use async_trait::async_trait;
use genarena_core::{SubmitError, TransportError};
use reqwest::Client;
use serde_json::json;
use tracing::debug;

use crate::adapter::{
    error_detail, is_transient_status, GeneratedImage, JobHandle, PollResult, ProviderAdapter,
    SubmitParams,
};

pub const DEFAULT_FIREWORKS_URL: &str =
    "https://api.fireworks.ai/inference/v1/workflows/accounts/fireworks/models";

pub struct FireworksAdapter {
    client: Client,
    base_url: String,
    api_key: String,
}

impl FireworksAdapter {
    pub fn new(client: Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl ProviderAdapter for FireworksAdapter {
    fn backend(&self) -> &'static str {
        "fireworks"
    }

    async fn submit(&self, params: &SubmitParams) -> Result<JobHandle, SubmitError> {
        let url = format!("{}/{}", self.base_url, params.model);
        let body = json!({
            "prompt": params.prompt,
            "aspect_ratio": params.aspect_ratio.to_string(),
        });

        debug!("Submitting to Fireworks model {}", params.model);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::new(format!("Fireworks submit failed: {}", e)))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| TransportError::new(format!("Fireworks submit body unreadable: {}", e)))?;

        parse_submit_response(status, &text)
    }

    async fn poll(&self, model: &str, handle: &JobHandle) -> Result<PollResult, TransportError> {
        let url = format!("{}/{}/get_result", self.base_url, model);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Accept", "application/json")
            .json(&json!({ "id": handle.as_str() }))
            .send()
            .await
            .map_err(|e| TransportError::new(format!("Fireworks poll failed: {}", e)))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| TransportError::new(format!("Fireworks poll body unreadable: {}", e)))?;

        classify_result(status, &text)
    }
}

fn parse_submit_response(status: u16, body: &str) -> Result<JobHandle, SubmitError> {
    if is_transient_status(status) {
        return Err(TransportError::new(format!(
            "Fireworks returned {}: {}",
            status,
            error_detail(body)
        ))
        .into());
    }
    if !(200..300).contains(&status) {
        return Err(SubmitError::rejected(error_detail(body)));
    }

    let parsed: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| SubmitError::rejected(format!("unreadable Fireworks response: {}", e)))?;

    parsed["request_id"]
        .as_str()
        .or_else(|| parsed["id"].as_str())
        .map(JobHandle::new)
        .ok_or_else(|| SubmitError::rejected("Fireworks response carried no request id"))
}

/// Map a `get_result` response onto a poll outcome.
pub fn classify_result(status: u16, body: &str) -> Result<PollResult, TransportError> {
    if is_transient_status(status) {
        return Err(TransportError::new(format!(
            "Fireworks returned {}: {}",
            status,
            error_detail(body)
        )));
    }
    if !(200..300).contains(&status) {
        return Ok(PollResult::failed(error_detail(body)));
    }

    let parsed: serde_json::Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => return Ok(PollResult::failed(format!("unreadable Fireworks result: {}", e))),
    };

    match parsed["status"].as_str().unwrap_or("") {
        "Ready" => {
            let url = parsed["result"]["sample"]
                .as_str()
                .or_else(|| parsed["result"]["url"].as_str());
            match url {
                Some(url) => Ok(PollResult::Succeeded(GeneratedImage {
                    url: url.to_string(),
                    provider_elapsed_ms: parsed["result"]["duration"]
                        .as_f64()
                        .map(|secs| (secs * 1000.0).round() as u64),
                })),
                None => Ok(PollResult::failed("Fireworks result contained no image")),
            }
        }
        "Pending" | "Queued" | "Processing" | "Task not found" => Ok(PollResult::Pending),
        "" => Ok(PollResult::failed("Fireworks result carried no status")),
        other => {
            let detail = parsed["details"]
                .as_str()
                .map(|d| format!("{}: {}", other, d))
                .unwrap_or_else(|| other.to_string());
            Ok(PollResult::failed(detail))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_response() {
        assert_eq!(
            parse_submit_response(200, r#"{"request_id":"req-1"}"#).unwrap(),
            JobHandle::new("req-1")
        );
        assert_eq!(
            parse_submit_response(400, r#"{"error":{"message":"invalid model"}}"#).unwrap_err(),
            SubmitError::rejected("invalid model")
        );
        assert!(parse_submit_response(200, "{}").is_err());
        assert!(parse_submit_response(500, "").unwrap_err().is_transient());
    }

    #[test]
    fn test_classify_ready() {
        let body = r#"{"id":"req-1","status":"Ready","result":{"sample":"https://cdn.fireworks.ai/x.jpg","duration":3.5}}"#;
        assert_eq!(
            classify_result(200, body).unwrap(),
            PollResult::Succeeded(GeneratedImage {
                url: "https://cdn.fireworks.ai/x.jpg".into(),
                provider_elapsed_ms: Some(3500),
            })
        );
    }

    #[test]
    fn test_classify_pending_and_failures() {
        assert_eq!(
            classify_result(200, r#"{"status":"Pending"}"#).unwrap(),
            PollResult::Pending
        );
        assert_eq!(
            classify_result(200, r#"{"status":"Content Moderated","details":"flagged"}"#).unwrap(),
            PollResult::failed("Content Moderated: flagged")
        );
        assert_eq!(
            classify_result(200, r#"{"status":"Ready","result":{}}"#).unwrap(),
            PollResult::failed("Fireworks result contained no image")
        );
        assert!(classify_result(503, "").is_err());
    }
}
