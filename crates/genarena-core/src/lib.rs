//! GenArena Core: configuration, error taxonomy, generation request types.

pub mod config;
pub mod error;
pub mod request;

pub use config::{GenArenaConfig, RuntimeConfig};
pub use error::{Error, Result, SubmitError, TransportError};
pub use request::{AspectRatio, GenerationRequest, SlotConfig};
