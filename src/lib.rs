//! # nloop
//!
//! A single-threaded event loop with resource tracking and promises.
//!
//! An [`EventLoop`](crate::core::EventLoop) owns one worker thread that runs scheduled
//! callbacks one at a time, in the order they were scheduled. The loop doubles as
//! the lifetime owner of the resources registered on it: timers, file reads and
//! anything else implementing [`Disposable`](crate::core::Disposable) are disposed
//! exactly once, when their cancellation key is untracked or when the loop is
//! disposed, whichever comes first.
//!
//! ## Key Features
//!
//! - **Serial execution**: callbacks never overlap and run in FIFO order
//! - **No lost wakeups**: producers on any thread wake an idle worker
//! - **Bounded disposal**: a stuck callback cannot hang shutdown forever
//! - **Resource tracking**: keyed by cancellation tokens, disposed exactly once
//! - **Promises**: single-assignment, continuations always delivered on the loop
//! - **Adapters**: timers, whole-file reads and a tokio bridge
//!
//! ## Quick Start
//!
//! ```rust
//! use nloop::core::EventLoop;
//! use std::time::Duration;
//!
//! let event_loop = EventLoop::new();
//! let (tx, rx) = crossbeam_channel::unbounded();
//!
//! for i in 0..3 {
//!     let tx = tx.clone();
//!     event_loop.schedule(move || { let _ = tx.send(i); });
//! }
//! event_loop.start(|| {})?;
//!
//! let seen: Vec<_> = (0..3)
//!     .filter_map(|_| rx.recv_timeout(Duration::from_secs(1)).ok())
//!     .collect();
//! assert_eq!(seen, vec![0, 1, 2]);
//! # Ok::<(), nloop::core::LoopError>(())
//! ```
//!
//! ## Promises
//!
//! ```rust
//! use nloop::core::EventLoop;
//! use std::time::Duration;
//!
//! let event_loop = EventLoop::new();
//! event_loop.start(|| {})?;
//!
//! let deferred = event_loop.defer::<String>();
//! let (tx, rx) = crossbeam_channel::bounded(1);
//! deferred.promise().then_or_else(
//!     move |value| { let _ = tx.send(value); },
//!     |reason| eprintln!("failed: {reason}"),
//! );
//!
//! std::thread::spawn(move || deferred.resolve("done".to_string()));
//! assert_eq!(rx.recv_timeout(Duration::from_secs(1)).ok().as_deref(), Some("done"));
//! # Ok::<(), nloop::core::LoopError>(())
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Worker thread, event loop, cancellation and resource tracking.
pub mod core;
/// Configuration for the worker and event loop.
pub mod config;
/// Promises, cancelable promises and deferreds.
pub mod promise;
/// Timers scheduled on an event loop.
pub mod timing;
/// File adapters producing promises.
pub mod io;
/// Bridge from promises to async runtimes.
#[cfg(feature = "tokio-runtime")]
pub mod runtime;
/// Shared utilities.
pub mod util;

pub use crate::core::{EventLoop, LoopError, LoopResult};
pub use crate::promise::{CancelablePromise, Deferred, Promise, PromiseState, Settlement};
