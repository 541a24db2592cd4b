//! Configuration models for the worker thread and the event loop.

pub mod loop_config;

pub use loop_config::{LoopConfig, PanicPolicy};
