//! Per-slot job lifecycle.
//!
//! `Created → Submitting → Queued → {Succeeded | Failed | TimedOut}`, plus
//! `Submitting → Failed` when the submission itself fails. Terminal states
//! are final: a second terminal transition is dropped, not applied.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use genarena_core::{Error, Result, SlotConfig};
use genarena_providers::{GeneratedImage, JobHandle};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobState {
    Created,
    Submitting,
    Queued,
    Succeeded,
    Failed,
    TimedOut,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::TimedOut)
    }

    /// Position along the lifecycle; all terminal states share the last rank.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Created => 0,
            Self::Submitting => 1,
            Self::Queued => 2,
            Self::Succeeded | Self::Failed | Self::TimedOut => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Submitting => "submitting",
            Self::Queued => "queued",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::TimedOut => "timedOut",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one job: the request it belongs to plus its slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobKey {
    pub request_id: Uuid,
    pub generation: u64,
    pub provider: String,
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.provider, self.generation)
    }
}

/// Outward view of a job, built from the whole job in one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    pub state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<JobHandle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<GeneratedImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A job transition reported to the run controller.
#[derive(Debug, Clone)]
pub struct JobEvent {
    pub key: JobKey,
    pub view: JobView,
}

#[derive(Debug, Clone)]
pub struct Job {
    key: JobKey,
    model: String,
    state: JobState,
    handle: Option<JobHandle>,
    submitted_at: Option<Instant>,
    submitted_wall: Option<DateTime<Utc>>,
    finished_at: Option<Instant>,
    finished_wall: Option<DateTime<Utc>>,
    image: Option<GeneratedImage>,
    error: Option<String>,
}

impl Job {
    pub fn new(request_id: Uuid, generation: u64, slot: &SlotConfig) -> Self {
        Self {
            key: JobKey {
                request_id,
                generation,
                provider: slot.provider.clone(),
            },
            model: slot.model.clone(),
            state: JobState::Created,
            handle: None,
            submitted_at: None,
            submitted_wall: None,
            finished_at: None,
            finished_wall: None,
            image: None,
            error: None,
        }
    }

    pub fn key(&self) -> &JobKey {
        &self.key
    }

    pub fn provider(&self) -> &str {
        &self.key.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn handle(&self) -> Option<&JobHandle> {
        self.handle.as_ref()
    }

    pub fn submitted_at(&self) -> Option<Instant> {
        self.submitted_at
    }

    pub fn image(&self) -> Option<&GeneratedImage> {
        self.image.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Terminal minus submission; `None` until terminal.
    pub fn elapsed(&self) -> Option<Duration> {
        if !self.state.is_terminal() {
            return None;
        }
        match (self.submitted_at, self.finished_at) {
            (Some(start), Some(end)) => Some(end.saturating_duration_since(start)),
            _ => None,
        }
    }

    /// `Created → Submitting`. Stamps and returns the submission instant.
    pub fn begin_submit(&mut self) -> Result<Instant> {
        self.expect_state(JobState::Created, JobState::Submitting)?;
        let now = Instant::now();
        self.state = JobState::Submitting;
        self.submitted_at = Some(now);
        self.submitted_wall = Some(Utc::now());
        Ok(now)
    }

    /// `Submitting → Queued` once the provider hands back a job handle.
    pub fn mark_queued(&mut self, handle: JobHandle) -> Result<()> {
        self.expect_state(JobState::Submitting, JobState::Queued)?;
        self.state = JobState::Queued;
        self.handle = Some(handle);
        Ok(())
    }

    /// `Queued → Succeeded`. Returns `false` if the job was already terminal.
    pub fn succeed(&mut self, image: GeneratedImage) -> Result<bool> {
        if self.state.is_terminal() {
            return Ok(false);
        }
        self.expect_state(JobState::Queued, JobState::Succeeded)?;
        self.image = Some(image);
        self.finish(JobState::Succeeded);
        Ok(true)
    }

    /// `Submitting | Queued → Failed`. Returns `false` if already terminal.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<bool> {
        if self.state.is_terminal() {
            return Ok(false);
        }
        if !matches!(self.state, JobState::Submitting | JobState::Queued) {
            return Err(self.invalid(JobState::Failed));
        }
        self.error = Some(reason.into());
        self.finish(JobState::Failed);
        Ok(true)
    }

    /// `Queued → TimedOut`. Returns `false` if already terminal.
    pub fn time_out(&mut self, reason: impl Into<String>) -> Result<bool> {
        if self.state.is_terminal() {
            return Ok(false);
        }
        self.expect_state(JobState::Queued, JobState::TimedOut)?;
        self.error = Some(reason.into());
        self.finish(JobState::TimedOut);
        Ok(true)
    }

    pub fn view(&self) -> JobView {
        JobView {
            state: self.state,
            handle: self.handle.clone(),
            submitted_at: self.submitted_wall,
            finished_at: self.finished_wall,
            elapsed_ms: self.elapsed().map(|d| d.as_millis() as u64),
            image: self.image.clone(),
            error: self.error.clone(),
        }
    }

    pub fn event(&self) -> JobEvent {
        JobEvent {
            key: self.key.clone(),
            view: self.view(),
        }
    }

    fn finish(&mut self, state: JobState) {
        self.state = state;
        self.finished_at = Some(Instant::now());
        self.finished_wall = Some(Utc::now());
    }

    fn expect_state(&self, expected: JobState, to: JobState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(self.invalid(to))
        }
    }

    fn invalid(&self, to: JobState) -> Error {
        Error::InvalidTransition {
            from: self.state.to_string(),
            to: to.to_string(),
        }
    }
}
