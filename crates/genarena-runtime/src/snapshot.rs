//! The aggregate per-slot view published to the presentation layer.

use genarena_core::{AspectRatio, GenerationRequest};
use serde::Serialize;
use uuid::Uuid;

use crate::job::{JobEvent, JobState, JobView};

/// What a slot currently shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum SlotStatus {
    /// No such slot in the published run, or the run was superseded.
    Unknown,
    Disabled,
    Job(JobView),
}

impl SlotStatus {
    pub fn job(&self) -> Option<&JobView> {
        match self {
            SlotStatus::Job(view) => Some(view),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotEntry {
    pub provider: String,
    pub model: String,
    #[serde(flatten)]
    pub status: SlotStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSnapshot {
    pub request_id: Option<Uuid>,
    pub generation: u64,
    /// Bumped on every publish.
    pub version: u64,
    pub prompt: String,
    pub aspect_ratio: Option<AspectRatio>,
    pub slots: Vec<SlotEntry>,
}

impl RunSnapshot {
    /// Initial snapshot for a new run: enabled slots start `Created`,
    /// disabled ones are marked as such.
    pub fn for_request(
        request_id: Uuid,
        generation: u64,
        version: u64,
        request: &GenerationRequest,
    ) -> Self {
        let slots = request
            .slots()
            .iter()
            .map(|slot| SlotEntry {
                provider: slot.provider.clone(),
                model: slot.model.clone(),
                status: if slot.enabled {
                    SlotStatus::Job(created_view())
                } else {
                    SlotStatus::Disabled
                },
            })
            .collect();

        Self {
            request_id: Some(request_id),
            generation,
            version,
            prompt: request.prompt().to_string(),
            aspect_ratio: Some(request.aspect_ratio()),
            slots,
        }
    }

    pub fn slot(&self, provider: &str) -> Option<&SlotEntry> {
        self.slots.iter().find(|s| s.provider == provider)
    }

    /// Every enabled slot has reached a terminal state.
    ///
    /// The empty snapshot (no run started yet) is not settled.
    pub fn is_settled(&self) -> bool {
        self.request_id.is_some()
            && self.slots.iter().all(|s| match &s.status {
                SlotStatus::Job(view) => view.state.is_terminal(),
                _ => true,
            })
    }

    /// Whether `event` may update this snapshot: same run, a job slot, and
    /// the slot moves forward (never out of a terminal state).
    pub fn accepts(&self, event: &JobEvent) -> bool {
        if event.key.generation != self.generation
            || self.request_id != Some(event.key.request_id)
        {
            return false;
        }
        match self.slot(&event.key.provider).map(|s| &s.status) {
            Some(SlotStatus::Job(current)) => {
                !current.state.is_terminal() && event.view.state.rank() >= current.state.rank()
            }
            _ => false,
        }
    }

    /// Apply an accepted event. Returns `false` and leaves the snapshot
    /// untouched otherwise.
    pub fn apply(&mut self, event: &JobEvent) -> bool {
        if !self.accepts(event) {
            return false;
        }
        let Some(entry) = self
            .slots
            .iter_mut()
            .find(|s| s.provider == event.key.provider)
        else {
            return false;
        };
        entry.status = SlotStatus::Job(event.view.clone());
        self.version += 1;
        true
    }

    /// Job states in slot order; disabled slots are skipped.
    pub fn states(&self) -> Vec<(String, JobState)> {
        self.slots
            .iter()
            .filter_map(|s| s.status.job().map(|v| (s.provider.clone(), v.state)))
            .collect()
    }
}

fn created_view() -> JobView {
    JobView {
        state: JobState::Created,
        handle: None,
        submitted_at: None,
        finished_at: None,
        elapsed_ms: None,
        image: None,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobKey;
    use genarena_core::SlotConfig;

    fn request() -> GenerationRequest {
        GenerationRequest::new(
            "a red fox",
            AspectRatio::SQUARE,
            vec![
                SlotConfig::enabled("fireworks1", "flux-1-schnell-fp8"),
                SlotConfig::disabled("fireworks2", "flux-kontext-pro"),
            ],
        )
        .unwrap()
    }

    fn event(id: Uuid, generation: u64, provider: &str, state: JobState) -> JobEvent {
        JobEvent {
            key: JobKey {
                request_id: id,
                generation,
                provider: provider.into(),
            },
            view: JobView {
                state,
                ..created_view()
            },
        }
    }

    #[test]
    fn test_initial_snapshot() {
        let id = Uuid::new_v4();
        let snap = RunSnapshot::for_request(id, 1, 1, &request());
        assert_eq!(snap.slots.len(), 2);
        assert_eq!(snap.slot("fireworks2").unwrap().status, SlotStatus::Disabled);
        assert_eq!(
            snap.slot("fireworks1").unwrap().status.job().unwrap().state,
            JobState::Created
        );
        assert!(!snap.is_settled());
        assert!(!RunSnapshot::default().is_settled());
    }

    #[test]
    fn test_apply_bumps_version() {
        let id = Uuid::new_v4();
        let mut snap = RunSnapshot::for_request(id, 1, 1, &request());
        assert!(snap.apply(&event(id, 1, "fireworks1", JobState::Submitting)));
        assert_eq!(snap.version, 2);
        assert!(snap.apply(&event(id, 1, "fireworks1", JobState::Succeeded)));
        assert!(snap.is_settled());
    }

    #[test]
    fn test_stale_and_backward_events_rejected() {
        let id = Uuid::new_v4();
        let mut snap = RunSnapshot::for_request(id, 2, 1, &request());
        assert!(!snap.apply(&event(id, 1, "fireworks1", JobState::Queued)));
        assert!(!snap.apply(&event(Uuid::new_v4(), 2, "fireworks1", JobState::Queued)));
        assert!(!snap.apply(&event(id, 2, "fireworks2", JobState::Queued)));
        assert!(!snap.apply(&event(id, 2, "missing", JobState::Queued)));

        assert!(snap.apply(&event(id, 2, "fireworks1", JobState::Queued)));
        assert!(!snap.apply(&event(id, 2, "fireworks1", JobState::Submitting)));
        assert!(snap.apply(&event(id, 2, "fireworks1", JobState::Failed)));
        assert!(!snap.apply(&event(id, 2, "fireworks1", JobState::Succeeded)));
        assert_eq!(
            snap.slot("fireworks1").unwrap().status.job().unwrap().state,
            JobState::Failed
        );
        assert_eq!(snap.version, 3);
    }

    #[test]
    fn test_slot_entry_json_shape() {
        let id = Uuid::new_v4();
        let snap = RunSnapshot::for_request(id, 1, 1, &request());
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["aspectRatio"], "1:1");
        assert_eq!(json["slots"][0]["provider"], "fireworks1");
        assert_eq!(json["slots"][0]["status"], "job");
        assert_eq!(json["slots"][0]["state"], "created");
        assert_eq!(json["slots"][1]["status"], "disabled");
        assert_eq!(json["requestId"], id.to_string());
    }
}
