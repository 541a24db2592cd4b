//! Promise whose pending value can be abandoned by the consumer.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::Callback;

use super::Promise;

/// A [`Promise`] that can be cancelled while it is still unfulfilled.
///
/// Cancelling runs the action supplied at creation exactly once, after the
/// state change has been committed, and suppresses any later resolve or reject.
pub struct CancelablePromise<T> {
    promise: Promise<T>,
    on_cancel: Arc<Mutex<Option<Callback>>>,
}

impl<T> Clone for CancelablePromise<T> {
    fn clone(&self) -> Self {
        Self {
            promise: self.promise.clone(),
            on_cancel: Arc::clone(&self.on_cancel),
        }
    }
}

impl<T> CancelablePromise<T>
where
    T: Clone + Send + 'static,
{
    pub(crate) fn new(promise: Promise<T>, on_cancel: Callback) -> Self {
        Self {
            promise,
            on_cancel: Arc::new(Mutex::new(Some(on_cancel))),
        }
    }

    /// Try to cancel. Returns `false` if the promise had already settled.
    pub fn cancel(&self) -> bool {
        if !self.promise.cancel() {
            return false;
        }
        let action = self.on_cancel.lock().take();
        if let Some(action) = action {
            action();
        }
        tracing::debug!("promise cancelled");
        true
    }

    /// The underlying promise, without the ability to cancel.
    pub fn promise(&self) -> Promise<T> {
        self.promise.clone()
    }
}

impl<T> Deref for CancelablePromise<T> {
    type Target = Promise<T>;

    fn deref(&self) -> &Self::Target {
        &self.promise
    }
}

impl<T> AsRef<Promise<T>> for CancelablePromise<T> {
    fn as_ref(&self) -> &Promise<T> {
        &self.promise
    }
}

impl<T> fmt::Debug for CancelablePromise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CancelablePromise").field(&self.promise).finish()
    }
}
