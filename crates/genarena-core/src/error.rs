//! Error types for GenArena.
//!
//! `Error` covers the orchestrator and its configuration surface. The
//! provider-facing kinds (`SubmitError`, `TransportError`) are kept apart so a
//! job can tell "the provider said no" from "we could not reach the provider".

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Model '{model}' is not offered by provider '{provider}'")]
    UnknownModel { provider: String, model: String },

    #[error("Invalid job transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Network-level failure talking to a provider queue.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

/// Failure of a submit call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    /// The provider refused the request before queuing it.
    #[error("submission rejected: {reason}")]
    Rejected { reason: String },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl SubmitError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
