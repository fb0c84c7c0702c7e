//! Poll scheduler: drives each job from dispatch to a terminal state.
//!
//! Every job runs on its own task and its own timer, so a slow or hung
//! provider never delays a sibling. All waits are bounded by the job's
//! deadline (`submitted_at + job_timeout`).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use genarena_core::{RuntimeConfig, SubmitError};
use genarena_providers::{GeneratedImage, JobHandle, PollResult, ProviderAdapter, SubmitParams};
use parking_lot::Mutex;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{debug, error, info, warn};

use crate::job::{Job, JobEvent, JobKey};

enum Outcome {
    Succeeded(GeneratedImage),
    Failed(String),
    TimedOut,
}

pub struct PollScheduler {
    config: RuntimeConfig,
    permits: Semaphore,
    active: Mutex<HashSet<JobKey>>,
}

/// Keeps a job in the active set while it is `Queued`.
struct ActiveGuard<'a> {
    active: &'a Mutex<HashSet<JobKey>>,
    key: JobKey,
}

impl<'a> ActiveGuard<'a> {
    fn register(active: &'a Mutex<HashSet<JobKey>>, key: &JobKey) -> Self {
        active.lock().insert(key.clone());
        Self {
            active,
            key: key.clone(),
        }
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.active.lock().remove(&self.key);
    }
}

impl PollScheduler {
    pub fn new(config: RuntimeConfig) -> Self {
        let permits = Semaphore::new(config.max_in_flight);
        Self {
            config,
            permits,
            active: Mutex::new(HashSet::new()),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Jobs currently `Queued` and being polled.
    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    pub fn active_jobs(&self) -> Vec<JobKey> {
        self.active.lock().iter().cloned().collect()
    }

    /// Jobs holding an in-flight permit (submitting or queued).
    pub fn in_flight(&self) -> usize {
        self.config
            .max_in_flight
            .saturating_sub(self.permits.available_permits())
    }

    pub fn max_in_flight(&self) -> usize {
        self.config.max_in_flight
    }

    /// Drive `job` to a terminal state, reporting every transition on
    /// `events`. Returns the finished job.
    pub async fn drive(
        self: Arc<Self>,
        mut job: Job,
        adapter: Arc<dyn ProviderAdapter>,
        params: SubmitParams,
        events: mpsc::UnboundedSender<JobEvent>,
    ) -> Job {
        // Waits in Created until a permit frees up.
        let permit = match self.permits.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                error!("In-flight semaphore closed; job {} not dispatched", job.key());
                return job;
            }
        };

        let submitted_at = match job.begin_submit() {
            Ok(at) => at,
            Err(e) => {
                warn!("Job {} not dispatched: {}", job.key(), e);
                return job;
            }
        };
        emit(&events, &job);
        let deadline = submitted_at + self.config.job_timeout;

        let submitted = timeout_at(
            deadline,
            self.submit_with_retry(adapter.as_ref(), &params, job.key()),
        )
        .await;
        let handle = match submitted {
            Ok(Ok(handle)) => handle,
            Ok(Err(reason)) => {
                self.finish(&mut job, Outcome::Failed(reason));
                drop(permit);
                emit(&events, &job);
                return job;
            }
            Err(_) => {
                let reason = format!(
                    "submission did not complete within {}",
                    format_secs(self.config.job_timeout)
                );
                self.finish(&mut job, Outcome::Failed(reason));
                drop(permit);
                emit(&events, &job);
                return job;
            }
        };

        if let Err(e) = job.mark_queued(handle.clone()) {
            error!("Job {} could not be queued: {}", job.key(), e);
            return job;
        }
        emit(&events, &job);
        debug!("Job {} queued as {}", job.key(), handle);

        let guard = ActiveGuard::register(&self.active, job.key());
        let outcome = self
            .poll_until_done(adapter.as_ref(), &params.model, &handle, job.key(), deadline)
            .await;
        self.finish(&mut job, outcome);
        drop(guard);
        drop(permit);
        emit(&events, &job);
        job
    }

    async fn submit_with_retry(
        &self,
        adapter: &dyn ProviderAdapter,
        params: &SubmitParams,
        key: &JobKey,
    ) -> Result<JobHandle, String> {
        let mut failures = 0u32;
        loop {
            match adapter.submit(params).await {
                Ok(handle) => return Ok(handle),
                Err(SubmitError::Rejected { reason }) => return Err(reason),
                Err(SubmitError::Transport(e)) => {
                    failures += 1;
                    if failures > self.config.max_transport_retries {
                        return Err(format!("transport error after {} attempts: {}", failures, e.message()));
                    }
                    let backoff = self.config.backoff_for(failures);
                    warn!(
                        "Submit for {} failed ({}), retry {} in {:?}",
                        key, e, failures, backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    async fn poll_until_done(
        &self,
        adapter: &dyn ProviderAdapter,
        model: &str,
        handle: &JobHandle,
        key: &JobKey,
        deadline: Instant,
    ) -> Outcome {
        let mut failures = 0u32;
        let mut wait = self.config.poll_interval;

        loop {
            sleep_until((Instant::now() + wait).min(deadline)).await;
            if Instant::now() >= deadline {
                return Outcome::TimedOut;
            }

            debug!("Polling {} ({})", key, handle);
            match timeout_at(deadline, adapter.poll(model, handle)).await {
                Err(_) => return Outcome::TimedOut,
                Ok(Ok(PollResult::Pending)) => {
                    failures = 0;
                    wait = self.config.poll_interval;
                }
                Ok(Ok(PollResult::Succeeded(image))) => return Outcome::Succeeded(image),
                Ok(Ok(PollResult::Failed { reason })) => return Outcome::Failed(reason),
                Ok(Err(e)) => {
                    failures += 1;
                    if failures > self.config.max_transport_retries {
                        return Outcome::Failed(format!(
                            "transport error after {} attempts: {}",
                            failures,
                            e.message()
                        ));
                    }
                    wait = self.config.backoff_for(failures);
                    warn!("Poll for {} failed ({}), retry {} in {:?}", key, e, failures, wait);
                }
            }
        }
    }

    fn finish(&self, job: &mut Job, outcome: Outcome) {
        let applied = match outcome {
            Outcome::Succeeded(image) => job.succeed(image),
            Outcome::Failed(reason) => job.fail(reason),
            Outcome::TimedOut => job.time_out(format!(
                "no result within {}",
                format_secs(self.config.job_timeout)
            )),
        };
        match applied {
            Ok(true) => info!(
                "Job {} finished: {} after {:?}",
                job.key(),
                job.state(),
                job.elapsed().unwrap_or_default()
            ),
            Ok(false) => debug!("Job {} already terminal, outcome dropped", job.key()),
            Err(e) => error!("Job {}: {}", job.key(), e),
        }
    }
}

fn emit(events: &mpsc::UnboundedSender<JobEvent>, job: &Job) {
    if events.send(job.event()).is_err() {
        error!("Run controller gone; dropped {} event for {}", job.state(), job.key());
    }
}

fn format_secs(d: Duration) -> String {
    if d.subsec_millis() == 0 {
        format!("{}s", d.as_secs())
    } else {
        format!("{:.1}s", d.as_secs_f64())
    }
}
