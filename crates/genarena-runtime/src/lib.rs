//! GenArena Runtime: job lifecycle, polling and the aggregate run view.
//!
//! [`RunController`] turns a validated [`genarena_core::GenerationRequest`]
//! into one [`Job`] per enabled slot, drives each on its own task through the
//! [`PollScheduler`], and folds every transition into the published
//! [`RunSnapshot`].

pub mod controller;
pub mod job;
pub mod scheduler;
pub mod snapshot;

pub use controller::{ControllerStatus, RunController, RunTicket};
pub use job::{Job, JobEvent, JobKey, JobState, JobView};
pub use scheduler::PollScheduler;
pub use snapshot::{RunSnapshot, SlotEntry, SlotStatus};
