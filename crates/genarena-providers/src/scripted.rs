//! In-process adapter that plays back a fixed script.
//!
//! Used as the `dryrun` backend for providers without credentials and as the
//! provider double in tests. All waiting goes through `tokio::time`, so a
//! paused test clock drives it deterministically.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use genarena_core::{AspectRatio, SubmitError, TransportError};
use parking_lot::Mutex;

use crate::adapter::{GeneratedImage, JobHandle, PollResult, ProviderAdapter, SubmitParams};
use crate::fal::image_size;

/// One scripted poll response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedPoll {
    Pending,
    Succeed,
    Fail(String),
    Transport(String),
    /// Never answer.
    Hang,
}

/// One scripted submit response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedSubmit {
    Accept,
    Reject(String),
    Transport(String),
    Hang,
}

/// Per-handle state, dropped once the handle reaches a terminal poll.
#[derive(Debug, Clone, Copy)]
struct HandleState {
    ratio: AspectRatio,
    pending_left: usize,
}

pub struct ScriptedAdapter {
    submit_script: Mutex<VecDeque<ScriptedSubmit>>,
    /// Shared across handles, consumed before any per-handle countdown.
    poll_script: Mutex<VecDeque<ScriptedPoll>>,
    /// Response once the poll script and the handle's countdown are exhausted.
    poll_fallback: ScriptedPoll,
    /// Pending polls every accepted handle reports before the fallback.
    pending_per_handle: usize,
    submit_delay: Duration,
    poll_delay: Duration,
    provider_elapsed_ms: Option<u64>,
    handles: Mutex<HashMap<String, HandleState>>,
    submit_calls: AtomicUsize,
    poll_calls: AtomicUsize,
}

impl ScriptedAdapter {
    /// Accepts every submission and succeeds on the first poll.
    pub fn new() -> Self {
        Self {
            submit_script: Mutex::new(VecDeque::new()),
            poll_script: Mutex::new(VecDeque::new()),
            poll_fallback: ScriptedPoll::Succeed,
            pending_per_handle: 0,
            submit_delay: Duration::ZERO,
            poll_delay: Duration::ZERO,
            provider_elapsed_ms: None,
            handles: Mutex::new(HashMap::new()),
            submit_calls: AtomicUsize::new(0),
            poll_calls: AtomicUsize::new(0),
        }
    }

    /// Each accepted handle stays pending for `pending_polls` of its own
    /// polls, then succeeds.
    pub fn dry_run(pending_polls: usize) -> Self {
        Self {
            pending_per_handle: pending_polls,
            ..Self::new()
        }
    }

    /// Submit outcomes, consumed in order; `Accept` once exhausted.
    pub fn with_submits(self, script: Vec<ScriptedSubmit>) -> Self {
        *self.submit_script.lock() = script.into();
        self
    }

    /// Poll outcomes, consumed in order; the fallback once exhausted.
    pub fn with_polls(self, script: Vec<ScriptedPoll>) -> Self {
        *self.poll_script.lock() = script.into();
        self
    }

    pub fn with_poll_fallback(mut self, fallback: ScriptedPoll) -> Self {
        self.poll_fallback = fallback;
        self
    }

    /// Every poll reports pending, forever.
    pub fn never_completes(self) -> Self {
        self.with_poll_fallback(ScriptedPoll::Pending)
    }

    pub fn with_submit_delay(mut self, delay: Duration) -> Self {
        self.submit_delay = delay;
        self
    }

    pub fn with_poll_delay(mut self, delay: Duration) -> Self {
        self.poll_delay = delay;
        self
    }

    pub fn with_provider_elapsed_ms(mut self, ms: u64) -> Self {
        self.provider_elapsed_ms = Some(ms);
        self
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn poll_calls(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }

    /// Accepted handles that have not reached a terminal poll.
    pub fn open_handles(&self) -> usize {
        self.handles.lock().len()
    }

    fn next_poll_step(&self, handle: &JobHandle) -> ScriptedPoll {
        if let Some(step) = self.poll_script.lock().pop_front() {
            return step;
        }
        if let Some(state) = self.handles.lock().get_mut(handle.as_str()) {
            if state.pending_left > 0 {
                state.pending_left -= 1;
                return ScriptedPoll::Pending;
            }
        }
        self.poll_fallback.clone()
    }
}

impl Default for ScriptedAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    fn backend(&self) -> &'static str {
        "dryrun"
    }

    async fn submit(&self, params: &SubmitParams) -> Result<JobHandle, SubmitError> {
        let n = self.submit_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let step = self
            .submit_script
            .lock()
            .pop_front()
            .unwrap_or(ScriptedSubmit::Accept);

        if !self.submit_delay.is_zero() {
            tokio::time::sleep(self.submit_delay).await;
        }

        match step {
            ScriptedSubmit::Accept => {
                let handle = format!("dryrun-{}-{}", params.model.replace('/', "_"), n);
                self.handles.lock().insert(
                    handle.clone(),
                    HandleState {
                        ratio: params.aspect_ratio,
                        pending_left: self.pending_per_handle,
                    },
                );
                Ok(JobHandle::new(handle))
            }
            ScriptedSubmit::Reject(reason) => Err(SubmitError::rejected(reason)),
            ScriptedSubmit::Transport(msg) => Err(TransportError::new(msg).into()),
            ScriptedSubmit::Hang => std::future::pending().await,
        }
    }

    async fn poll(&self, _model: &str, handle: &JobHandle) -> Result<PollResult, TransportError> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        let step = self.next_poll_step(handle);

        if !self.poll_delay.is_zero() {
            tokio::time::sleep(self.poll_delay).await;
        }

        match step {
            ScriptedPoll::Pending => Ok(PollResult::Pending),
            ScriptedPoll::Succeed => {
                let ratio = self
                    .handles
                    .lock()
                    .remove(handle.as_str())
                    .map(|state| state.ratio)
                    .unwrap_or_default();
                let (w, h) = image_size(ratio, 512);
                Ok(PollResult::Succeeded(GeneratedImage {
                    url: format!("https://placehold.co/{}x{}/png?text={}", w, h, handle),
                    provider_elapsed_ms: self.provider_elapsed_ms,
                }))
            }
            ScriptedPoll::Fail(reason) => {
                self.handles.lock().remove(handle.as_str());
                Ok(PollResult::failed(reason))
            }
            ScriptedPoll::Transport(msg) => Err(TransportError::new(msg)),
            ScriptedPoll::Hang => std::future::pending().await,
        }
    }
}
