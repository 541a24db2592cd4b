//! Error types for event loop operations.

use thiserror::Error;

use crate::core::cancel::TokenId;

/// Errors produced by the worker, the event loop and their adapters.
#[derive(Debug, Error)]
pub enum LoopError {
    /// A required argument was missing or out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The named component has already been disposed.
    #[error("{0} has been disposed")]
    Disposed(&'static str),
    /// A resource was tracked under a key that is already present.
    #[error("resource key {0} is already tracked")]
    DuplicateRegistration(TokenId),
    /// A worker or adapter thread could not be spawned.
    #[error("failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl LoopError {
    /// Returns `true` if this error reports use after disposal.
    #[must_use]
    pub const fn is_disposed(&self) -> bool {
        matches!(self, Self::Disposed(_))
    }
}

/// Result type for loop operations.
pub type LoopResult<T> = Result<T, LoopError>;

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
