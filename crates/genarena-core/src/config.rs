//! Configuration for the server and the orchestration runtime.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1500;
pub const DEFAULT_JOB_TIMEOUT_SECS: u64 = 90;
pub const DEFAULT_MAX_TRANSPORT_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;
pub const DEFAULT_MAX_IN_FLIGHT: usize = 16;
pub const DEFAULT_PROVIDERS_FILE: &str = "providers.json";

/// Timing and resource policy for job orchestration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Delay between consecutive polls of one job.
    pub poll_interval: Duration,
    /// Per-job bound measured from submission.
    pub job_timeout: Duration,
    /// Transport failures tolerated in a row before a job fails.
    pub max_transport_retries: u32,
    /// Base delay for exponential backoff after a transport failure.
    pub retry_backoff: Duration,
    /// Jobs allowed in flight across all requests, superseded ones included.
    pub max_in_flight: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            job_timeout: Duration::from_secs(DEFAULT_JOB_TIMEOUT_SECS),
            max_transport_retries: DEFAULT_MAX_TRANSPORT_RETRIES,
            retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

impl RuntimeConfig {
    /// Reject values that would stall or never bound a run.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(Error::Config("poll interval must be positive".into()));
        }
        if self.job_timeout.is_zero() {
            return Err(Error::Config("job timeout must be positive".into()));
        }
        if self.max_in_flight == 0 {
            return Err(Error::Config("max in-flight jobs must be positive".into()));
        }
        Ok(())
    }

    /// Backoff before retry number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.retry_backoff.saturating_mul(1u32 << exp)
    }
}

/// Top-level GenArena configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenArenaConfig {
    /// HTTP server port.
    pub port: u16,
    /// Provider settings file (models, API keys).
    pub providers_file: PathBuf,
    pub runtime: RuntimeConfig,
}

impl GenArenaConfig {
    /// Create configuration from environment and defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = parse_or(&lookup, "PORT", DEFAULT_PORT);
        let providers_file = lookup("GENARENA_PROVIDERS_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PROVIDERS_FILE));

        let runtime = RuntimeConfig {
            poll_interval: Duration::from_millis(parse_or(
                &lookup,
                "GENARENA_POLL_INTERVAL_MS",
                DEFAULT_POLL_INTERVAL_MS,
            )),
            job_timeout: Duration::from_secs(parse_or(
                &lookup,
                "GENARENA_JOB_TIMEOUT_SECS",
                DEFAULT_JOB_TIMEOUT_SECS,
            )),
            max_transport_retries: parse_or(
                &lookup,
                "GENARENA_MAX_TRANSPORT_RETRIES",
                DEFAULT_MAX_TRANSPORT_RETRIES,
            ),
            retry_backoff: Duration::from_millis(parse_or(
                &lookup,
                "GENARENA_RETRY_BACKOFF_MS",
                DEFAULT_RETRY_BACKOFF_MS,
            )),
            max_in_flight: parse_or(&lookup, "GENARENA_MAX_IN_FLIGHT", DEFAULT_MAX_IN_FLIGHT),
        };
        runtime.validate()?;

        Ok(Self {
            port,
            providers_file,
            runtime,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("Ignoring unparseable {}={:?}, using default", key, raw);
                default
            }
        },
        None => default,
    }
}
