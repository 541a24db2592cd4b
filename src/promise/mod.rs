//! Single-assignment promises whose continuations run on a [`Scheduler`].
//!
//! A [`Promise`] reaches exactly one terminal state: resolved, rejected or (for a
//! [`CancelablePromise`]) cancelled. The first transition wins; later attempts
//! report `false` and change nothing. Continuations are never invoked on the
//! thread that settles the promise or registers them: each one is handed to the
//! owning scheduler as its own callback, in registration order.
//!
//! Producers settle promises through a [`Deferred`]; consumers only see the
//! promise and cannot settle it.
//!
//! ```
//! use nloop::core::EventLoop;
//! use std::time::Duration;
//!
//! let event_loop = EventLoop::new();
//! event_loop.start(|| {})?;
//!
//! let deferred = event_loop.defer::<u32>();
//! let (tx, rx) = crossbeam_channel::bounded(1);
//! deferred.promise().then(move |value| { let _ = tx.send(value); });
//!
//! assert!(deferred.resolve(42));
//! assert!(!deferred.resolve(7));
//! assert_eq!(rx.recv_timeout(Duration::from_secs(1)).ok(), Some(42));
//! # Ok::<(), nloop::core::LoopError>(())
//! ```

mod cancelable;
mod deferred;

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::{Scheduler, SchedulerExt};

pub use cancelable::CancelablePromise;
pub use deferred::{defer, defer_cancelable, Deferred};

/// Reason a promise was rejected, shared by every rejected continuation.
pub type Rejection = Arc<anyhow::Error>;

type ResolvedCallback<T> = Box<dyn FnOnce(T) + Send + 'static>;
type RejectedCallback = Box<dyn FnOnce(Rejection) + Send + 'static>;

/// Observable state of a promise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromiseState {
    /// Waiting to be resolved, rejected or cancelled.
    Unfulfilled,
    /// A value is available.
    Resolved,
    /// An error occurred.
    Rejected,
    /// No value will ever be produced.
    Cancelled,
}

/// Terminal outcome of a promise.
#[derive(Debug, Clone)]
pub enum Settlement<T> {
    /// Resolved with a value.
    Resolved(T),
    /// Rejected with a reason.
    Rejected(Rejection),
    /// Cancelled before it was settled.
    Cancelled,
}

impl<T> Settlement<T> {
    /// The resolved value, if any.
    pub fn resolved(self) -> Option<T> {
        match self {
            Self::Resolved(value) => Some(value),
            _ => None,
        }
    }

    /// State this outcome corresponds to.
    pub const fn state(&self) -> PromiseState {
        match self {
            Self::Resolved(_) => PromiseState::Resolved,
            Self::Rejected(_) => PromiseState::Rejected,
            Self::Cancelled => PromiseState::Cancelled,
        }
    }
}

enum Slot<T> {
    Unfulfilled {
        on_resolved: Vec<ResolvedCallback<T>>,
        on_rejected: Vec<RejectedCallback>,
    },
    Settled(Settlement<T>),
}

struct PromiseInner<T> {
    scheduler: Arc<dyn Scheduler>,
    slot: Mutex<Slot<T>>,
}

/// Placeholder for a value that may not be known yet.
///
/// Cheap to clone; every clone observes the same state.
pub struct Promise<T> {
    inner: Arc<PromiseInner<T>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> AsRef<Self> for Promise<T> {
    fn as_ref(&self) -> &Self {
        self
    }
}

impl<T> Promise<T>
where
    T: Clone + Send + 'static,
{
    pub(crate) fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            inner: Arc::new(PromiseInner {
                scheduler,
                slot: Mutex::new(Slot::Unfulfilled {
                    on_resolved: Vec::new(),
                    on_rejected: Vec::new(),
                }),
            }),
        }
    }

    /// Current state.
    pub fn state(&self) -> PromiseState {
        match &*self.inner.slot.lock() {
            Slot::Unfulfilled { .. } => PromiseState::Unfulfilled,
            Slot::Settled(settlement) => settlement.state(),
        }
    }

    /// Whether the promise has reached a terminal state.
    pub fn is_settled(&self) -> bool {
        self.state() != PromiseState::Unfulfilled
    }

    /// Terminal outcome, if the promise has settled.
    pub fn settlement(&self) -> Option<Settlement<T>> {
        match &*self.inner.slot.lock() {
            Slot::Unfulfilled { .. } => None,
            Slot::Settled(settlement) => Some(settlement.clone()),
        }
    }

    /// Register a continuation for the resolved value.
    ///
    /// If the promise has already resolved, the continuation is scheduled right
    /// away. It runs at most once, on the scheduler's thread.
    pub fn then<F>(&self, on_resolved: F) -> &Self
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.register(Box::new(on_resolved), None);
        self
    }

    /// Register continuations for both the resolved value and the rejection reason.
    ///
    /// Exactly one of them runs, once, unless the promise is cancelled, in which
    /// case neither does.
    pub fn then_or_else<F, R>(&self, on_resolved: F, on_rejected: R) -> &Self
    where
        F: FnOnce(T) + Send + 'static,
        R: FnOnce(Rejection) + Send + 'static,
    {
        self.register(Box::new(on_resolved), Some(Box::new(on_rejected)));
        self
    }

    fn register(&self, on_resolved: ResolvedCallback<T>, on_rejected: Option<RejectedCallback>) {
        let ready = {
            let mut slot = self.inner.slot.lock();
            match &mut *slot {
                Slot::Unfulfilled {
                    on_resolved: resolved,
                    on_rejected: rejected,
                } => {
                    resolved.push(on_resolved);
                    if let Some(callback) = on_rejected {
                        rejected.push(callback);
                    }
                    return;
                }
                Slot::Settled(settlement) => settlement.clone(),
            }
        };

        match ready {
            Settlement::Resolved(value) => {
                self.inner.scheduler.schedule(move || on_resolved(value));
            }
            Settlement::Rejected(reason) => {
                if let Some(callback) = on_rejected {
                    self.inner.scheduler.schedule(move || callback(reason));
                }
            }
            Settlement::Cancelled => {}
        }
    }

    /// Move from unfulfilled to `outcome`, handing back the queued continuations.
    fn try_change_state(
        &self,
        outcome: Settlement<T>,
    ) -> Option<(Vec<ResolvedCallback<T>>, Vec<RejectedCallback>)> {
        let mut slot = self.inner.slot.lock();
        if matches!(*slot, Slot::Settled(_)) {
            return None;
        }
        match std::mem::replace(&mut *slot, Slot::Settled(outcome)) {
            Slot::Unfulfilled {
                on_resolved,
                on_rejected,
            } => Some((on_resolved, on_rejected)),
            Slot::Settled(_) => None,
        }
    }

    pub(crate) fn resolve(&self, value: T) -> bool {
        let Some((on_resolved, _)) = self.try_change_state(Settlement::Resolved(value.clone()))
        else {
            return false;
        };
        tracing::trace!(continuations = on_resolved.len(), "promise resolved");
        for callback in on_resolved {
            let value = value.clone();
            self.inner.scheduler.schedule(move || callback(value));
        }
        true
    }

    pub(crate) fn reject(&self, reason: anyhow::Error) -> bool {
        let reason: Rejection = Arc::new(reason);
        let Some((_, on_rejected)) = self.try_change_state(Settlement::Rejected(Arc::clone(&reason)))
        else {
            return false;
        };
        tracing::trace!(continuations = on_rejected.len(), "promise rejected");
        for callback in on_rejected {
            let reason = Arc::clone(&reason);
            self.inner.scheduler.schedule(move || callback(reason));
        }
        true
    }

    /// Drops every queued continuation without running it.
    pub(crate) fn cancel(&self) -> bool {
        self.try_change_state(Settlement::Cancelled).is_some()
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.inner.slot.lock() {
            Slot::Unfulfilled { .. } => PromiseState::Unfulfilled,
            Slot::Settled(settlement) => settlement.state(),
        };
        f.debug_struct("Promise").field("state", &state).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Callback;

    /// Collects scheduled callbacks so tests can run them explicitly.
    #[derive(Default)]
    struct ManualScheduler {
        queue: Mutex<Vec<Callback>>,
    }

    impl ManualScheduler {
        fn run_all(&self) -> usize {
            let callbacks = std::mem::take(&mut *self.queue.lock());
            let count = callbacks.len();
            for callback in callbacks {
                callback();
            }
            count
        }
    }

    impl Scheduler for ManualScheduler {
        fn schedule_boxed(&self, callback: Callback) {
            self.queue.lock().push(callback);
        }
    }

    fn promise_on(scheduler: &Arc<ManualScheduler>) -> Promise<i32> {
        Promise::new(Arc::clone(scheduler) as Arc<dyn Scheduler>)
    }

    #[test]
    fn test_continuations_are_never_inline() {
        let scheduler = Arc::new(ManualScheduler::default());
        let promise = promise_on(&scheduler);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = Arc::clone(&seen);
        promise.then(move |v| seen_clone.lock().push(v));
        assert!(promise.resolve(5));
        assert!(seen.lock().is_empty());

        let seen_clone = Arc::clone(&seen);
        promise.then(move |v| seen_clone.lock().push(v * 10));
        assert!(seen.lock().is_empty());

        assert_eq!(scheduler.run_all(), 2);
        assert_eq!(*seen.lock(), vec![5, 50]);
    }

    #[test]
    fn test_first_transition_wins() {
        let scheduler = Arc::new(ManualScheduler::default());
        let promise = promise_on(&scheduler);

        assert!(promise.reject(anyhow::anyhow!("boom")));
        assert!(!promise.resolve(1));
        assert!(!promise.reject(anyhow::anyhow!("again")));
        assert!(!promise.cancel());
        assert_eq!(promise.state(), PromiseState::Rejected);

        match promise.settlement() {
            Some(Settlement::Rejected(reason)) => assert_eq!(reason.to_string(), "boom"),
            other => panic!("unexpected settlement: {other:?}"),
        }
    }

    #[test]
    fn test_cancel_drops_continuations() {
        let scheduler = Arc::new(ManualScheduler::default());
        let promise = promise_on(&scheduler);

        promise.then_or_else(|_| panic!("resolved"), |_| panic!("rejected"));
        assert!(promise.cancel());
        promise.then(|_| panic!("late"));

        assert_eq!(scheduler.run_all(), 0);
        assert_eq!(promise.state(), PromiseState::Cancelled);
        assert!(promise.settlement().is_some_and(|s| s.resolved().is_none()));
    }

    #[test]
    fn test_rejected_only_reaches_rejection_handlers() {
        let scheduler = Arc::new(ManualScheduler::default());
        let promise = promise_on(&scheduler);
        let reasons = Arc::new(Mutex::new(Vec::new()));

        promise.then(|_| panic!("resolved"));
        let reasons_clone = Arc::clone(&reasons);
        promise.then_or_else(
            |_| panic!("resolved"),
            move |reason| reasons_clone.lock().push(reason.to_string()),
        );
        promise.reject(anyhow::anyhow!("disk on fire"));

        assert_eq!(scheduler.run_all(), 1);
        assert_eq!(*reasons.lock(), vec!["disk on fire".to_string()]);
    }
}
