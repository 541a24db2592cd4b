//! File adapters whose results are delivered as promises on a scheduler.

mod file;

pub use file::{read_all_bytes, read_all_bytes_cancelable};
