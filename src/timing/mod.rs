//! Timer adapters built on resource tracking.
//!
//! Each timer is a tracked resource of the scheduler it was created on: it is
//! disposed when it fires (one-shot), when it is cancelled, or when the owning
//! loop is disposed, whichever comes first.

mod timer;

pub use timer::{set_interval, set_timeout, Timer};
