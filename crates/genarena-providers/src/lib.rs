//! GenArena Providers: image-generation queue adapters and the registry.
//!
//! Every provider implements [`ProviderAdapter`]: one `submit` call yields a
//! [`JobHandle`], one `poll` call reports pending, success or failure. The
//! [`ProviderRegistry`] maps slot ids to adapters so callers never branch on
//! the provider name.

pub mod adapter;
pub mod config;
pub mod fal;
pub mod fireworks;
pub mod registry;
pub mod scripted;

pub use adapter::{GeneratedImage, JobHandle, PollResult, ProviderAdapter, SubmitParams};
pub use config::{create_registry, Backend, ProviderSettings, SlotSettings};
pub use fal::FalAdapter;
pub use fireworks::FireworksAdapter;
pub use registry::{ProviderEntry, ProviderInfo, ProviderRegistry, SlotSelection};
pub use scripted::{ScriptedAdapter, ScriptedPoll, ScriptedSubmit};
