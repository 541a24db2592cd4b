//! Bridge from scheduler-bound promises to async runtimes.
//!
//! `Promise<T>` and `CancelablePromise<T>` implement [`IntoFuture`], so they can
//! be awaited directly from a tokio task. The awaited value is the promise's
//! [`Settlement`](crate::promise::Settlement); it is still delivered through the
//! promise's scheduler, so an event loop that never runs reports `Cancelled`
//! once it is disposed.
//!
//! [`IntoFuture`]: std::future::IntoFuture

mod promise_future;

pub use promise_future::PromiseFuture;
