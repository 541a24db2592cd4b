//! Single background thread that drains a callback queue in FIFO order.
//!
//! # Design
//!
//! - **No polling**: an idle worker blocks on a `Condvar` until more work is
//!   signalled or a stop is requested.
//! - **No lost wakeups**: producers enqueue and raise the `more_work` flag under
//!   the same lock the worker holds while it decides to block.
//! - **Bounded shutdown**: disposal joins the thread for at most the configured
//!   grace period, then detaches it.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};

use crate::config::{LoopConfig, PanicPolicy};
use crate::core::error::{LoopError, LoopResult};
use crate::core::scheduler::{Callback, Scheduler};

/// State guarded by the wake mutex.
#[derive(Debug, Default)]
struct WakeState {
    /// Set by producers when a callback has been enqueued.
    more_work: bool,
    /// Set by `stop`/`dispose`; the loop exits at its next check.
    stop_requested: bool,
    /// Whether a worker thread is inside its loop.
    thread_alive: bool,
    /// Whether the worker thread is blocked waiting for work.
    idling: bool,
    /// Set once by `dispose`.
    disposed: bool,
}

/// State shared between the worker thread, the owner and scheduler handles.
struct WorkerShared {
    sender: Sender<Callback>,
    state: Mutex<WakeState>,
    wake: Condvar,
}

impl WorkerShared {
    fn enqueue(&self, callback: Callback) {
        let mut state = self.state.lock();
        if state.disposed {
            debug!("worker disposed, dropping scheduled callback");
            return;
        }
        // The owning Worker keeps a receiver until disposal, so send only fails
        // after the channel has been torn down.
        if self.sender.send(callback).is_err() {
            return;
        }
        state.more_work = true;
        drop(state);
        self.wake.notify_one();
    }

    fn signal_more_work(&self) {
        let mut state = self.state.lock();
        if state.disposed {
            return;
        }
        state.more_work = true;
        drop(state);
        self.wake.notify_one();
    }

    /// Next callback to run, or `None` once the loop must exit.
    fn next_callback(&self, receiver: &Receiver<Callback>) -> Option<Callback> {
        let mut state = self.state.lock();
        loop {
            if state.stop_requested {
                state.thread_alive = false;
                state.idling = false;
                return None;
            }
            match receiver.try_recv() {
                Ok(callback) => return Some(callback),
                Err(TryRecvError::Disconnected) => {
                    state.thread_alive = false;
                    state.idling = false;
                    return None;
                }
                Err(TryRecvError::Empty) => {
                    if state.more_work {
                        state.more_work = false;
                        continue;
                    }
                    state.idling = true;
                    self.wake.wait(&mut state);
                    state.idling = false;
                }
            }
        }
    }
}

/// Marks the worker as gone if its thread unwinds out of a callback.
struct UnwindGuard<'a> {
    shared: &'a WorkerShared,
}

impl Drop for UnwindGuard<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            let mut state = self.shared.state.lock();
            state.thread_alive = false;
            state.idling = false;
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

fn run_worker(shared: &WorkerShared, receiver: &Receiver<Callback>, policy: PanicPolicy) {
    let _guard = UnwindGuard { shared };
    debug!("worker thread started");

    while let Some(callback) = shared.next_callback(receiver) {
        match policy {
            PanicPolicy::Continue => {
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(callback)) {
                    error!(panic = %panic_message(payload.as_ref()), "callback panicked");
                }
            }
            PanicPolicy::Propagate => callback(),
        }
    }

    debug!("worker thread exiting");
}

/// Join `handle`, giving up after `timeout`.
///
/// The join happens on a helper thread so the caller is never blocked for longer
/// than the grace period; a worker stuck in a callback is detached.
fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration) {
    let (tx, rx) = crossbeam_channel::bounded(1);
    let joiner = thread::Builder::new()
        .name("nloop-joiner".into())
        .spawn(move || {
            let _ = tx.send(handle.join().is_ok());
        });
    if let Err(e) = joiner {
        warn!(error = %e, "could not spawn joiner thread, detaching worker");
        return;
    }

    match rx.recv_timeout(timeout) {
        Ok(true) => debug!("worker thread joined"),
        Ok(false) => warn!("worker thread panicked"),
        Err(_) => warn!(
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            "worker thread did not exit within timeout - detaching"
        ),
    }
}

/// Owns the callback queue and the single thread that executes it.
///
/// Callbacks scheduled before [`start`](Self::start) stay queued and run once the
/// thread is up.
pub struct Worker {
    config: LoopConfig,
    shared: Arc<WorkerShared>,
    receiver: Receiver<Callback>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Worker {
    /// Create a worker with default configuration. No thread is spawned yet.
    #[must_use]
    pub fn new() -> Self {
        Self::build(LoopConfig::default())
    }

    /// Create a worker with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `LoopError::InvalidConfig` if the configuration is invalid.
    pub fn with_config(config: LoopConfig) -> LoopResult<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: LoopConfig) -> Self {
        let (sender, receiver) = unbounded();
        Self {
            config,
            shared: Arc::new(WorkerShared {
                sender,
                state: Mutex::new(WakeState::default()),
                wake: Condvar::new(),
            }),
            receiver,
            thread: Mutex::new(None),
        }
    }

    /// Enqueue `callback`. Silently dropped once the worker is disposed.
    pub fn schedule<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.enqueue(Box::new(callback));
    }

    /// Weak scheduler handle that does not keep the worker alive.
    #[must_use]
    pub fn handle(&self) -> WorkerHandle {
        WorkerHandle {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Start the worker thread, or resume it after [`stop`](Self::stop).
    ///
    /// Idempotent: calling it on a running worker only re-arms the stop gate.
    ///
    /// # Errors
    ///
    /// - `LoopError::Disposed` if the worker has been disposed
    /// - `LoopError::Spawn` if the thread could not be created
    pub fn start(&self) -> LoopResult<()> {
        let mut state = self.shared.state.lock();
        if state.disposed {
            return Err(LoopError::Disposed("worker"));
        }
        state.stop_requested = false;
        if state.thread_alive {
            drop(state);
            self.shared.wake.notify_one();
            return Ok(());
        }
        state.thread_alive = true;
        drop(state);

        let mut thread = self.thread.lock();
        if let Some(previous) = thread.take() {
            // The previous thread has already left its loop.
            let _ = previous.join();
        }

        let shared = Arc::clone(&self.shared);
        let receiver = self.receiver.clone();
        let policy = self.config.panic_policy;
        let mut builder = thread::Builder::new().name(self.config.thread_name.clone());
        if let Some(bytes) = self.config.stack_size {
            builder = builder.stack_size(bytes);
        }

        match builder.spawn(move || run_worker(&shared, &receiver, policy)) {
            Ok(handle) => {
                *thread = Some(handle);
                info!(
                    thread = %self.config.thread_name,
                    pending = self.receiver.len(),
                    "worker started"
                );
                Ok(())
            }
            Err(e) => {
                self.shared.state.lock().thread_alive = false;
                error!(error = %e, "failed to spawn worker thread");
                Err(LoopError::Spawn(e))
            }
        }
    }

    /// Ask the worker to exit after its current callback. Does not block.
    ///
    /// # Errors
    ///
    /// Returns `LoopError::Disposed` if the worker has been disposed.
    pub fn stop(&self) -> LoopResult<()> {
        let mut state = self.shared.state.lock();
        if state.disposed {
            return Err(LoopError::Disposed("worker"));
        }
        state.stop_requested = true;
        drop(state);
        self.shared.wake.notify_all();
        debug!("worker stop requested");
        Ok(())
    }

    /// Wake the worker if it is idling. No-op once disposed.
    pub fn signal_more_work(&self) {
        self.shared.signal_more_work();
    }

    /// Whether a worker thread is alive and not asked to stop.
    ///
    /// # Errors
    ///
    /// Returns `LoopError::Disposed` if the worker has been disposed.
    pub fn is_running(&self) -> LoopResult<bool> {
        let state = self.shared.state.lock();
        if state.disposed {
            return Err(LoopError::Disposed("worker"));
        }
        Ok(state.thread_alive && !state.stop_requested)
    }

    /// Whether the worker thread is blocked waiting for work.
    ///
    /// # Errors
    ///
    /// Returns `LoopError::Disposed` if the worker has been disposed.
    pub fn is_idling(&self) -> LoopResult<bool> {
        let state = self.shared.state.lock();
        if state.disposed {
            return Err(LoopError::Disposed("worker"));
        }
        Ok(state.idling)
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.shared.state.lock().disposed
    }

    /// Number of queued callbacks that have not started yet.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Stop the worker, join its thread within the grace period and drop every
    /// callback that never ran. Idempotent.
    ///
    /// Called from a callback on the worker thread itself, this requests the stop
    /// and returns without joining.
    pub fn dispose(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.stop_requested = true;
        }
        self.shared.wake.notify_all();

        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                debug!("worker disposed from its own thread, not joining");
            } else {
                join_with_timeout(handle, self.config.dispose_timeout());
            }
        }

        let abandoned = self.receiver.try_iter().count();
        if abandoned > 0 {
            warn!(abandoned = abandoned, "dropped callbacks that never ran");
        }
        info!(thread = %self.config.thread_name, "worker disposed");
    }
}

impl Default for Worker {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for Worker {
    fn schedule_boxed(&self, callback: Callback) {
        self.shared.enqueue(callback);
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Worker")
            .field("thread", &self.config.thread_name)
            .field("alive", &state.thread_alive)
            .field("idling", &state.idling)
            .field("disposed", &state.disposed)
            .field("pending", &self.receiver.len())
            .finish()
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        // Signal the thread but don't join it here; `dispose` is the graceful path.
        let mut state = self.shared.state.lock();
        if !state.disposed {
            state.disposed = true;
            state.stop_requested = true;
            drop(state);
            self.shared.wake.notify_all();
            debug!("worker dropped without dispose - thread will be detached");
        }
    }
}

/// Weak, cloneable scheduler handle onto a [`Worker`].
///
/// Scheduling through a handle whose worker is gone is a silent no-op.
#[derive(Clone)]
pub struct WorkerHandle {
    shared: Weak<WorkerShared>,
}

impl WorkerHandle {
    /// Whether the worker behind this handle still exists and accepts work.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.shared
            .upgrade()
            .is_some_and(|shared| !shared.state.lock().disposed)
    }
}

impl Scheduler for WorkerHandle {
    fn schedule_boxed(&self, callback: Callback) {
        if let Some(shared) = self.shared.upgrade() {
            shared.enqueue(callback);
        }
    }
}

impl fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("alive", &self.is_alive())
            .finish()
    }
}
