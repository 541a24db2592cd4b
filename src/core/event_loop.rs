//! The event loop: one [`Worker`] plus a [`ResourceTracker`] behind the
//! [`Scheduler`] and [`ResourceTrackingScheduler`] capabilities.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tracing::{debug, info};

use crate::config::LoopConfig;
use crate::core::cancel::CancellationToken;
use crate::core::error::{LoopError, LoopResult};
use crate::core::scheduler::{
    Callback, Disposable, ResourceFactory, ResourceTrackingScheduler, Scheduler,
};
use crate::core::tracker::{ResourceTracker, UntrackHandle};
use crate::core::worker::{Worker, WorkerHandle};
use crate::promise::{defer, defer_cancelable, CancelablePromise, Deferred};

/// Serial callback executor whose lifetime bounds every resource tracked on it.
///
/// Callbacks may be scheduled before [`start`](Self::start); they run in FIFO
/// order once the loop is started. Dropping the loop disposes it.
///
/// # Example
///
/// ```
/// use nloop::core::EventLoop;
/// use std::time::Duration;
///
/// let event_loop = EventLoop::new();
/// let (tx, rx) = crossbeam_channel::bounded(1);
///
/// event_loop.schedule(|| println!("queued before start"));
/// event_loop.start(move || { let _ = tx.send("started"); })?;
///
/// assert_eq!(rx.recv_timeout(Duration::from_secs(1)).ok(), Some("started"));
/// event_loop.dispose();
/// # Ok::<(), nloop::core::LoopError>(())
/// ```
pub struct EventLoop {
    worker: Worker,
    tracker: Arc<ResourceTracker>,
    started: AtomicBool,
    disposed: AtomicBool,
}

impl EventLoop {
    /// Create an event loop with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::from_worker(Worker::new())
    }

    /// Create an event loop with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `LoopError::InvalidConfig` if the configuration is invalid.
    pub fn with_config(config: LoopConfig) -> LoopResult<Self> {
        Ok(Self::from_worker(Worker::with_config(config)?))
    }

    fn from_worker(worker: Worker) -> Self {
        Self {
            worker,
            tracker: ResourceTracker::new(),
            started: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        }
    }

    fn ensure_live(&self) -> LoopResult<()> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(LoopError::Disposed("event loop"));
        }
        Ok(())
    }

    /// Enqueue `callback`. Legal before `start`; silently dropped after disposal.
    pub fn schedule<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.worker.schedule(callback);
    }

    /// Schedule `callback` and make sure the loop is running.
    ///
    /// The first call flips the loop into the started state; later calls only
    /// schedule their callback and resume a stopped worker.
    ///
    /// # Errors
    ///
    /// - `LoopError::Disposed` if the loop has been disposed
    /// - `LoopError::Spawn` if the worker thread could not be created
    pub fn start<F>(&self, callback: F) -> LoopResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.ensure_live()?;
        self.worker.schedule(callback);

        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            info!(pending = self.worker.pending(), "event loop started");
        }
        self.worker.start()
    }

    /// Stop the worker after its current callback. No-op if never started.
    ///
    /// # Errors
    ///
    /// Returns `LoopError::Disposed` if the loop has been disposed.
    pub fn stop(&self) -> LoopResult<()> {
        self.ensure_live()?;
        if !self.is_started() {
            return Ok(());
        }
        self.worker.stop()
    }

    /// Whether `start` has ever been called.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Whether the worker thread is alive and not asked to stop.
    ///
    /// # Errors
    ///
    /// Returns `LoopError::Disposed` if the loop has been disposed.
    pub fn is_running(&self) -> LoopResult<bool> {
        self.ensure_live()?;
        self.worker.is_running()
    }

    /// Whether the worker thread is blocked waiting for work.
    ///
    /// # Errors
    ///
    /// Returns `LoopError::Disposed` if the loop has been disposed.
    pub fn is_idling(&self) -> LoopResult<bool> {
        self.ensure_live()?;
        self.worker.is_idling()
    }

    /// Whether the loop has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Number of callbacks waiting to run.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.worker.pending()
    }

    /// Number of resources currently tracked.
    #[must_use]
    pub fn tracked_resources(&self) -> usize {
        self.tracker.len()
    }

    /// Weak, cloneable scheduler handle for promises and adapters.
    #[must_use]
    pub fn handle(&self) -> LoopHandle {
        LoopHandle {
            worker: self.worker.handle(),
            tracker: Arc::downgrade(&self.tracker),
        }
    }

    /// Create a deferred whose continuations run on this loop.
    #[must_use]
    pub fn defer<T>(&self) -> Deferred<T>
    where
        T: Clone + Send + 'static,
    {
        defer(self.handle())
    }

    /// Create a deferred over a cancelable promise whose continuations run on
    /// this loop. `cancel` runs once if the promise is cancelled.
    #[must_use]
    pub fn defer_cancelable<T, F>(&self, cancel: F) -> Deferred<T, CancelablePromise<T>>
    where
        T: Clone + Send + 'static,
        F: FnOnce() + Send + 'static,
    {
        defer_cancelable(self.handle(), cancel)
    }

    /// Stop the worker, dispose every tracked resource once, then dispose the
    /// worker. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("disposing event loop");

        if self.is_started() {
            let _ = self.worker.stop();
        }
        self.tracker.dispose();
        self.worker.dispose();
        info!("event loop disposed");
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("started", &self.is_started())
            .field("disposed", &self.is_disposed())
            .field("worker", &self.worker)
            .field("tracker", &self.tracker)
            .finish()
    }
}

impl Scheduler for EventLoop {
    fn schedule_boxed(&self, callback: Callback) {
        self.worker.schedule_boxed(callback);
    }
}

impl ResourceTrackingScheduler for EventLoop {
    fn track_resource(
        &self,
        key: &CancellationToken,
        resource: Arc<dyn Disposable>,
    ) -> LoopResult<UntrackHandle> {
        self.ensure_live()?;
        self.tracker.track(key, resource)
    }

    fn track_resource_with(
        &self,
        key: &CancellationToken,
        factory: ResourceFactory,
    ) -> LoopResult<UntrackHandle> {
        self.ensure_live()?;
        self.tracker.track_with(key, factory)
    }
}

impl Disposable for EventLoop {
    fn dispose(&self) {
        Self::dispose(self);
    }
}

/// Weak, cloneable handle onto an [`EventLoop`].
///
/// Holds neither the worker nor the tracker alive: scheduling through a handle
/// whose loop is gone is a no-op and tracking reports `LoopError::Disposed`.
#[derive(Debug, Clone)]
pub struct LoopHandle {
    worker: WorkerHandle,
    tracker: Weak<ResourceTracker>,
}

impl LoopHandle {
    fn tracker(&self) -> LoopResult<Arc<ResourceTracker>> {
        self.tracker
            .upgrade()
            .ok_or(LoopError::Disposed("event loop"))
    }
}

impl Scheduler for LoopHandle {
    fn schedule_boxed(&self, callback: Callback) {
        self.worker.schedule_boxed(callback);
    }
}

impl ResourceTrackingScheduler for LoopHandle {
    fn track_resource(
        &self,
        key: &CancellationToken,
        resource: Arc<dyn Disposable>,
    ) -> LoopResult<UntrackHandle> {
        self.tracker()?.track(key, resource)
    }

    fn track_resource_with(
        &self,
        key: &CancellationToken,
        factory: ResourceFactory,
    ) -> LoopResult<UntrackHandle> {
        self.tracker()?.track_with(key, factory)
    }
}
