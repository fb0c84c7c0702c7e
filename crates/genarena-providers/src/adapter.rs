//! The capability every provider queue exposes: submit once, poll by handle.

use std::fmt;

use async_trait::async_trait;
use genarena_core::{AspectRatio, SubmitError, TransportError};
use serde::{Deserialize, Serialize};

/// Opaque handle returned by a provider when a submission is queued.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Already-validated inputs for one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitParams {
    pub prompt: String,
    pub aspect_ratio: AspectRatio,
    pub model: String,
}

/// A finished generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedImage {
    /// Where the provider put the image.
    pub url: String,
    /// Inference time as reported by the provider, when it reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_elapsed_ms: Option<u64>,
}

/// Outcome of a single status check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollResult {
    Pending,
    Succeeded(GeneratedImage),
    Failed { reason: String },
}

impl PollResult {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

/// Adapter over one provider queue API.
///
/// Each call performs exactly one network request. Adapters never wait for
/// a job to finish; repeated polling belongs to the scheduler.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Short backend name, e.g. `fal` or `fireworks`.
    fn backend(&self) -> &'static str;

    async fn submit(&self, params: &SubmitParams) -> Result<JobHandle, SubmitError>;

    async fn poll(&self, model: &str, handle: &JobHandle) -> Result<PollResult, TransportError>;
}

/// Pull a human-readable message out of a provider error body.
pub(crate) fn error_detail(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["detail", "error", "message"] {
            match &parsed[key] {
                serde_json::Value::String(s) if !s.is_empty() => return s.clone(),
                serde_json::Value::Object(obj) => {
                    if let Some(msg) = obj.get("message").and_then(|m| m.as_str()) {
                        return msg.to_string();
                    }
                }
                serde_json::Value::Array(items) => {
                    if let Some(msg) = items
                        .first()
                        .and_then(|item| item.get("msg").or_else(|| item.get("message")))
                        .and_then(|m| m.as_str())
                    {
                        return msg.to_string();
                    }
                }
                _ => {}
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "no details provided".to_string()
    } else {
        trimmed.chars().take(300).collect()
    }
}

/// Server errors and rate limiting are worth retrying; other statuses are answers.
pub(crate) fn is_transient_status(status: u16) -> bool {
    status >= 500 || status == 429 || status == 408
}
