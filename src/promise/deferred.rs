//! Producer-side capability over a promise.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::core::Scheduler;

use super::{CancelablePromise, Promise};

/// Write capability for a promise: the only way to resolve or reject it.
///
/// Cloneable so several producers can race; at most one settles the promise.
pub struct Deferred<T, P = Promise<T>> {
    promise: P,
    _value: PhantomData<fn(T)>,
}

impl<T, P: Clone> Clone for Deferred<T, P> {
    fn clone(&self) -> Self {
        Self {
            promise: self.promise.clone(),
            _value: PhantomData,
        }
    }
}

impl<T, P> Deferred<T, P>
where
    T: Clone + Send + 'static,
    P: AsRef<Promise<T>> + Clone,
{
    fn new(promise: P) -> Self {
        Self {
            promise,
            _value: PhantomData,
        }
    }

    /// The promise consumers observe.
    pub fn promise(&self) -> P {
        self.promise.clone()
    }

    /// Resolve with `value`. Returns `false` if the promise had already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.promise.as_ref().resolve(value)
    }

    /// Reject with `reason`. Returns `false` if the promise had already settled.
    pub fn reject<E>(&self, reason: E) -> bool
    where
        E: Into<anyhow::Error>,
    {
        self.promise.as_ref().reject(reason.into())
    }
}

impl<T, P: fmt::Debug> fmt::Debug for Deferred<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("promise", &self.promise)
            .finish()
    }
}

/// Create a deferred whose continuations are delivered through `scheduler`.
pub fn defer<T, S>(scheduler: S) -> Deferred<T>
where
    T: Clone + Send + 'static,
    S: Scheduler + 'static,
{
    Deferred::new(Promise::new(Arc::new(scheduler)))
}

/// Create a deferred over a [`CancelablePromise`]; `cancel` runs once if the
/// promise is cancelled before it settles.
pub fn defer_cancelable<T, S, F>(scheduler: S, cancel: F) -> Deferred<T, CancelablePromise<T>>
where
    T: Clone + Send + 'static,
    S: Scheduler + 'static,
    F: FnOnce() + Send + 'static,
{
    let promise = Promise::new(Arc::new(scheduler));
    Deferred::new(CancelablePromise::new(promise, Box::new(cancel)))
}
