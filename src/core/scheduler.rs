//! Scheduler capabilities shared by the worker, the event loop and adapters.
//!
//! Adapters (timers, file reads) and promises depend only on these traits, never
//! on the concrete [`EventLoop`](crate::core::EventLoop).

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::cancel::CancellationToken;
use crate::core::error::LoopResult;
use crate::core::tracker::UntrackHandle;

/// A zero-argument unit of work submitted for serial execution.
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Factory invoked by [`ResourceTrackingScheduler::track_resource_with`].
///
/// The factory receives the handle that untracks the resource it is about to
/// produce, so the resource's own completion path can release itself.
pub type ResourceFactory = Box<dyn FnOnce(UntrackHandle) -> Arc<dyn Disposable> + Send + 'static>;

/// Capability to accept callbacks for eventual serial execution.
pub trait Scheduler: Send + Sync {
    /// Enqueue a boxed callback.
    ///
    /// Never fails: once the scheduler has been disposed the callback is dropped
    /// without running.
    fn schedule_boxed(&self, callback: Callback);
}

/// Convenience methods for every [`Scheduler`].
pub trait SchedulerExt: Scheduler {
    /// Enqueue a closure for execution on the scheduler's thread.
    fn schedule<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule_boxed(Box::new(callback));
    }
}

impl<S: Scheduler + ?Sized> SchedulerExt for S {}

impl<S: Scheduler + ?Sized> Scheduler for Arc<S> {
    fn schedule_boxed(&self, callback: Callback) {
        (**self).schedule_boxed(callback);
    }
}

/// An idempotent release action.
pub trait Disposable: Send + Sync {
    /// Release owned resources. Calling it again has no effect.
    fn dispose(&self);
}

/// A scheduler that also binds external resources to its own lifetime.
pub trait ResourceTrackingScheduler: Scheduler {
    /// Track an already constructed `resource` under `key`.
    ///
    /// Cancelling `key` untracks and disposes the resource. The returned handle
    /// does the same on demand.
    ///
    /// # Errors
    ///
    /// - `LoopError::DuplicateRegistration` if `key` is already tracked
    /// - `LoopError::Disposed` if the scheduler has been disposed
    fn track_resource(
        &self,
        key: &CancellationToken,
        resource: Arc<dyn Disposable>,
    ) -> LoopResult<UntrackHandle>;

    /// Track the resource produced by `factory` under `key`.
    ///
    /// The key is reserved before the factory runs and the factory runs outside
    /// every tracker lock. If the resource untracks itself before the factory
    /// has returned, it is disposed as soon as it is produced.
    ///
    /// # Errors
    ///
    /// - `LoopError::DuplicateRegistration` if `key` is already tracked
    /// - `LoopError::Disposed` if the scheduler has been disposed
    fn track_resource_with(
        &self,
        key: &CancellationToken,
        factory: ResourceFactory,
    ) -> LoopResult<UntrackHandle>;
}

/// Runs a closure the first time it is disposed.
pub struct DisposeAction {
    action: Mutex<Option<Callback>>,
}

impl DisposeAction {
    /// Wrap `action` as a [`Disposable`].
    pub fn new<F>(action: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            action: Mutex::new(Some(Box::new(action))),
        }
    }

    /// Wrap `action` as a shared [`Disposable`] ready to be tracked.
    pub fn shared<F>(action: F) -> Arc<dyn Disposable>
    where
        F: FnOnce() + Send + 'static,
    {
        Arc::new(Self::new(action))
    }

    /// Whether the action has already run.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.action.lock().is_none()
    }
}

impl Disposable for DisposeAction {
    fn dispose(&self) {
        let action = self.action.lock().take();
        if let Some(action) = action {
            action();
        }
    }
}

impl fmt::Debug for DisposeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisposeAction")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
