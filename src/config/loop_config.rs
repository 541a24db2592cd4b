//! Event loop configuration.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::LoopError;

/// Default name given to the worker thread.
pub const DEFAULT_THREAD_NAME: &str = "nloop-worker";

/// Default grace period granted to the worker thread on disposal.
pub const DEFAULT_DISPOSE_TIMEOUT_MS: u64 = 10_000;

/// What the worker does when a callback panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanicPolicy {
    /// Catch the panic, log it and continue with the next callback.
    #[default]
    Continue,
    /// Let the panic unwind the worker thread.
    Propagate,
}

impl FromStr for PanicPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "continue" => Ok(Self::Continue),
            "propagate" => Ok(Self::Propagate),
            other => Err(format!("unknown panic policy `{other}`")),
        }
    }
}

/// Worker and event loop configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Name of the worker thread.
    pub thread_name: String,
    /// Stack size of the worker thread in bytes (platform default if `None`).
    pub stack_size: Option<usize>,
    /// How long disposal waits for the worker thread to finish, in milliseconds.
    pub dispose_timeout_ms: u64,
    /// Behavior when a callback panics.
    pub panic_policy: PanicPolicy,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            thread_name: DEFAULT_THREAD_NAME.to_string(),
            stack_size: None,
            dispose_timeout_ms: DEFAULT_DISPOSE_TIMEOUT_MS,
            panic_policy: PanicPolicy::default(),
        }
    }
}

impl LoopConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker thread name.
    #[must_use]
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Set the worker thread stack size.
    #[must_use]
    pub const fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    /// Set the disposal grace period.
    #[must_use]
    pub fn with_dispose_timeout(mut self, timeout: Duration) -> Self {
        self.dispose_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the callback panic policy.
    #[must_use]
    pub const fn with_panic_policy(mut self, policy: PanicPolicy) -> Self {
        self.panic_policy = policy;
        self
    }

    /// Disposal grace period as a [`Duration`].
    #[must_use]
    pub const fn dispose_timeout(&self) -> Duration {
        Duration::from_millis(self.dispose_timeout_ms)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `LoopError::InvalidConfig` naming the first offending field.
    pub fn validate(&self) -> Result<(), LoopError> {
        if self.thread_name.trim().is_empty() {
            return Err(LoopError::InvalidConfig("thread_name must not be empty".into()));
        }
        if self.thread_name.contains('\0') {
            return Err(LoopError::InvalidConfig("thread_name must not contain NUL".into()));
        }
        if self.stack_size == Some(0) {
            return Err(LoopError::InvalidConfig("stack_size must be greater than 0".into()));
        }
        if self.dispose_timeout_ms == 0 {
            return Err(LoopError::InvalidConfig(
                "dispose_timeout_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns `LoopError::InvalidConfig` on parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, LoopError> {
        let cfg: Self = serde_json::from_str(input)
            .map_err(|e| LoopError::InvalidConfig(format!("parse error: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from the environment.
    ///
    /// Loads a `.env` file if present, then overlays `NLOOP_THREAD_NAME`,
    /// `NLOOP_STACK_SIZE`, `NLOOP_DISPOSE_TIMEOUT_MS` and `NLOOP_PANIC_POLICY`
    /// on the defaults.
    ///
    /// # Errors
    ///
    /// Returns `LoopError::InvalidConfig` if a variable cannot be parsed or the
    /// result fails validation.
    pub fn from_env() -> Result<Self, LoopError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, LoopError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(name) = lookup("NLOOP_THREAD_NAME") {
            cfg.thread_name = name;
        }
        if let Some(raw) = lookup("NLOOP_STACK_SIZE") {
            let bytes = raw
                .trim()
                .parse::<usize>()
                .map_err(|e| LoopError::InvalidConfig(format!("NLOOP_STACK_SIZE: {e}")))?;
            cfg.stack_size = Some(bytes);
        }
        if let Some(raw) = lookup("NLOOP_DISPOSE_TIMEOUT_MS") {
            cfg.dispose_timeout_ms = raw
                .trim()
                .parse::<u64>()
                .map_err(|e| LoopError::InvalidConfig(format!("NLOOP_DISPOSE_TIMEOUT_MS: {e}")))?;
        }
        if let Some(raw) = lookup("NLOOP_PANIC_POLICY") {
            cfg.panic_policy = raw
                .parse()
                .map_err(|e| LoopError::InvalidConfig(format!("NLOOP_PANIC_POLICY: {e}")))?;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}
