//! Aggregate run controller: owns the single published [`RunSnapshot`].
//!
//! Starting a run supersedes the previous one. Superseded jobs keep running
//! until terminal, but the event loop drops their transitions because their
//! generation no longer matches the published snapshot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use genarena_core::{Error, GenerationRequest, Result, RuntimeConfig};
use genarena_providers::{ProviderRegistry, SubmitParams};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::job::{Job, JobEvent, JobKey};
use crate::scheduler::PollScheduler;
use crate::snapshot::{RunSnapshot, SlotStatus};

/// Identifies a started run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunTicket {
    pub request_id: Uuid,
    pub generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerStatus {
    pub generation: u64,
    pub request_id: Option<Uuid>,
    pub version: u64,
    pub settled: bool,
    pub active_jobs: usize,
    pub in_flight: usize,
    pub max_in_flight: usize,
}

struct Inner {
    registry: Arc<ProviderRegistry>,
    scheduler: Arc<PollScheduler>,
    generation: AtomicU64,
    snapshot: Arc<watch::Sender<Arc<RunSnapshot>>>,
    events: mpsc::UnboundedSender<JobEvent>,
}

#[derive(Clone)]
pub struct RunController {
    inner: Arc<Inner>,
}

impl RunController {
    /// Create the controller and spawn its event loop.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(registry: Arc<ProviderRegistry>, config: RuntimeConfig) -> Result<Self> {
        config.validate()?;
        let (snapshot, _) = watch::channel(Arc::new(RunSnapshot::default()));
        let snapshot = Arc::new(snapshot);
        let (events, rx) = mpsc::unbounded_channel();

        tokio::spawn(apply_events(snapshot.clone(), rx));

        Ok(Self {
            inner: Arc::new(Inner {
                registry,
                scheduler: Arc::new(PollScheduler::new(config)),
                generation: AtomicU64::new(0),
                snapshot,
                events,
            }),
        })
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.inner.registry
    }

    pub fn scheduler(&self) -> &PollScheduler {
        &self.inner.scheduler
    }

    /// Start a run for `request`, superseding whatever run was published.
    pub fn start(&self, request: GenerationRequest) -> Result<RunTicket> {
        let mut dispatch = Vec::new();
        for slot in request.slots() {
            let entry = self.inner.registry.validate_slot(slot)?;
            if slot.enabled {
                dispatch.push((slot.clone(), entry.adapter.clone()));
            }
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let request_id = Uuid::new_v4();

        if !self.publish(request_id, generation, &request) {
            warn!("Run {} superseded before it was published", request_id);
            return Err(Error::Internal(format!(
                "run {} was superseded before it was published",
                request_id
            )));
        }
        info!(
            "Run {} (generation {}) started: {} of {} slots enabled",
            request_id,
            generation,
            dispatch.len(),
            request.slots().len()
        );

        for (slot, adapter) in dispatch {
            let params = SubmitParams {
                prompt: request.prompt().to_string(),
                aspect_ratio: request.aspect_ratio(),
                model: slot.model.clone(),
            };
            let job = Job::new(request_id, generation, &slot);
            tokio::spawn(self.inner.scheduler.clone().drive(
                job,
                adapter,
                params,
                self.inner.events.clone(),
            ));
        }

        Ok(RunTicket {
            request_id,
            generation,
        })
    }

    /// Replace the published snapshot with a fresh one for `request`.
    /// Declines, leaving the snapshot untouched, if a newer generation is
    /// already published.
    fn publish(&self, request_id: Uuid, generation: u64, request: &GenerationRequest) -> bool {
        let mut superseded = None;
        let published = self.inner.snapshot.send_if_modified(|current| {
            if current.generation > generation {
                return false;
            }
            if current.request_id.is_some() && !current.is_settled() {
                superseded = current.request_id;
            }
            let version = current.version + 1;
            *current = Arc::new(RunSnapshot::for_request(
                request_id, generation, version, request,
            ));
            true
        });
        if let Some(old) = superseded {
            info!("Run {} superseded by {}", old, request_id);
        }
        published
    }

    pub fn snapshot(&self) -> Arc<RunSnapshot> {
        self.inner.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<RunSnapshot>> {
        self.inner.snapshot.subscribe()
    }

    /// Status of one slot. `Unknown` for providers or request ids the
    /// published run does not carry.
    pub fn slot(&self, request_id: Uuid, provider: &str) -> SlotStatus {
        let snapshot = self.snapshot();
        if snapshot.request_id != Some(request_id) {
            return SlotStatus::Unknown;
        }
        snapshot
            .slot(provider)
            .map(|entry| entry.status.clone())
            .unwrap_or(SlotStatus::Unknown)
    }

    /// Resolve once every enabled job of `request_id` is terminal. `None` if
    /// the run is not (or no longer) the published one.
    pub async fn wait_settled(&self, request_id: Uuid) -> Option<Arc<RunSnapshot>> {
        let mut rx = self.subscribe();
        let snapshot = rx
            .wait_for(|s| s.request_id != Some(request_id) || s.is_settled())
            .await
            .ok()?
            .clone();
        (snapshot.request_id == Some(request_id)).then_some(snapshot)
    }

    pub fn status(&self) -> ControllerStatus {
        let snapshot = self.snapshot();
        let scheduler = &self.inner.scheduler;
        ControllerStatus {
            generation: snapshot.generation,
            request_id: snapshot.request_id,
            version: snapshot.version,
            settled: snapshot.is_settled(),
            active_jobs: scheduler.active_count(),
            in_flight: scheduler.in_flight(),
            max_in_flight: scheduler.max_in_flight(),
        }
    }

    pub fn active_jobs(&self) -> Vec<JobKey> {
        self.inner.scheduler.active_jobs()
    }
}

/// Applies job events to the published snapshot, one at a time.
async fn apply_events(
    snapshot: Arc<watch::Sender<Arc<RunSnapshot>>>,
    mut rx: mpsc::UnboundedReceiver<JobEvent>,
) {
    while let Some(event) = rx.recv().await {
        let mut current_generation = 0;
        let applied = snapshot.send_if_modified(|current| {
            current_generation = current.generation;
            if !current.accepts(&event) {
                return false;
            }
            Arc::make_mut(current).apply(&event)
        });

        if applied {
            debug!("Slot {} -> {}", event.key, event.view.state);
        } else if event.key.generation != current_generation {
            debug!(
                "Dropped {} event from superseded job {}",
                event.view.state, event.key
            );
        } else {
            warn!("Dropped out-of-order {} event for {}", event.view.state, event.key);
        }
    }
    debug!("Run event loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobState;
    use genarena_core::{AspectRatio, SlotConfig};
    use genarena_providers::{ProviderAdapter, ProviderEntry, ScriptedAdapter};
    use std::time::Duration;

    fn controller(adapter: Arc<dyn ProviderAdapter>) -> RunController {
        let registry = ProviderRegistry::new(vec![
            ProviderEntry::new("fireworks1", "Fireworks", vec!["flux-1-schnell-fp8".into()], adapter.clone())
                .unwrap(),
            ProviderEntry::new("fal", "fal", vec!["fal-ai/flux/schnell".into()], adapter).unwrap(),
        ])
        .unwrap();
        let config = RuntimeConfig {
            poll_interval: Duration::from_millis(250),
            job_timeout: Duration::from_secs(30),
            ..RuntimeConfig::default()
        };
        RunController::new(Arc::new(registry), config).unwrap()
    }

    fn request(slots: Vec<SlotConfig>) -> GenerationRequest {
        GenerationRequest::new("a red fox", AspectRatio::SQUARE, slots).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_publishes_created_slots() {
        let ctl = controller(Arc::new(ScriptedAdapter::new()));
        let ticket = ctl
            .start(request(vec![
                SlotConfig::enabled("fireworks1", "flux-1-schnell-fp8"),
                SlotConfig::disabled("fal", "fal-ai/flux/schnell"),
            ]))
            .unwrap();

        let snap = ctl.snapshot();
        assert_eq!(snap.request_id, Some(ticket.request_id));
        assert_eq!(snap.generation, 1);
        assert_eq!(snap.states(), vec![("fireworks1".to_string(), JobState::Created)]);
        assert_eq!(ctl.slot(ticket.request_id, "fal"), SlotStatus::Disabled);
        assert_eq!(ctl.slot(ticket.request_id, "stability"), SlotStatus::Unknown);
        assert_eq!(ctl.slot(Uuid::new_v4(), "fireworks1"), SlotStatus::Unknown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_model_rejected_before_supersession() {
        let ctl = controller(Arc::new(ScriptedAdapter::new()));
        let first = ctl
            .start(request(vec![SlotConfig::enabled("fireworks1", "flux-1-schnell-fp8")]))
            .unwrap();

        let err = ctl
            .start(request(vec![SlotConfig::enabled("fireworks1", "dall-e-3")]))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownModel { .. }));
        assert_eq!(ctl.snapshot().request_id, Some(first.request_id));
        assert_eq!(ctl.status().generation, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_settled_and_status() {
        let adapter = Arc::new(ScriptedAdapter::dry_run(1));
        let ctl = controller(adapter);
        let ticket = ctl
            .start(request(vec![
                SlotConfig::enabled("fireworks1", "flux-1-schnell-fp8"),
                SlotConfig::enabled("fal", "fal-ai/flux/schnell"),
            ]))
            .unwrap();

        let settled = ctl.wait_settled(ticket.request_id).await.unwrap();
        assert!(settled.is_settled());
        assert!(settled
            .states()
            .iter()
            .all(|(_, state)| *state == JobState::Succeeded));

        let status = ctl.status();
        assert!(status.settled);
        assert_eq!(status.max_in_flight, 16);
        assert_eq!(status.active_jobs, 0);
        assert!(ctl.wait_settled(Uuid::new_v4()).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_generation_not_published() {
        let ctl = controller(Arc::new(ScriptedAdapter::new()));
        let current = ctl
            .start(request(vec![SlotConfig::enabled("fireworks1", "flux-1-schnell-fp8")]))
            .unwrap();
        let before = ctl.snapshot();

        let stale = request(vec![SlotConfig::enabled("fal", "fal-ai/flux/schnell")]);
        assert!(!ctl.publish(Uuid::new_v4(), current.generation - 1, &stale));
        assert!(Arc::ptr_eq(&before, &ctl.snapshot()));
        assert_eq!(ctl.snapshot().request_id, Some(current.request_id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_fails_when_outrun_by_newer_generation() {
        let adapter = Arc::new(ScriptedAdapter::new());
        let ctl = controller(adapter.clone());
        // A newer run published between this start's generation bump and
        // its publish.
        let newer = Uuid::new_v4();
        let pending = request(vec![SlotConfig::enabled("fal", "fal-ai/flux/schnell")]);
        assert!(ctl.publish(newer, 5, &pending));

        let err = ctl
            .start(request(vec![SlotConfig::enabled("fireworks1", "flux-1-schnell-fp8")]))
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
        assert_eq!(ctl.snapshot().request_id, Some(newer));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(adapter.submit_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_disabled_run_is_settled() {
        let ctl = controller(Arc::new(ScriptedAdapter::new()));
        let ticket = ctl
            .start(request(vec![SlotConfig::disabled("fal", "fal-ai/flux/schnell")]))
            .unwrap();
        assert!(ctl.snapshot().is_settled());
        assert!(ctl.wait_settled(ticket.request_id).await.is_some());
    }
}
