//! `set_timeout` / `set_interval` and the [`Timer`] control handle.

use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::core::{
    CancellationSource, Disposable, LoopError, LoopResult, ResourceTrackingScheduler,
    SchedulerExt, UntrackHandle,
};

struct TimerState {
    /// `None` when the period overflows the clock; such a timer never fires.
    deadline: Option<Instant>,
    disposed: bool,
}

/// Countdown shared by a timer thread and its [`Timer`] handle.
struct TimerControl {
    period: Duration,
    state: Mutex<TimerState>,
    wake: Condvar,
}

impl TimerControl {
    fn new(period: Duration) -> Self {
        Self {
            period,
            state: Mutex::new(TimerState {
                deadline: Instant::now().checked_add(period),
                disposed: false,
            }),
            wake: Condvar::new(),
        }
    }

    /// Block until the deadline passes (`true`) or the timer is disposed (`false`).
    ///
    /// With `rearm`, the next deadline is set before returning.
    fn wait_elapsed(&self, rearm: bool) -> bool {
        let mut state = self.state.lock();
        loop {
            if state.disposed {
                return false;
            }
            let Some(deadline) = state.deadline else {
                self.wake.wait(&mut state);
                continue;
            };
            let now = Instant::now();
            if now >= deadline {
                if rearm {
                    state.deadline = match deadline.checked_add(self.period) {
                        Some(next) if next > now => Some(next),
                        _ => now.checked_add(self.period),
                    };
                }
                return true;
            }
            self.wake.wait_until(&mut state, deadline);
        }
    }

    fn reset(&self) {
        let mut state = self.state.lock();
        if state.disposed {
            return;
        }
        state.deadline = Instant::now().checked_add(self.period);
        drop(state);
        self.wake.notify_all();
    }

    fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }
}

impl Disposable for TimerControl {
    fn dispose(&self) {
        let mut state = self.state.lock();
        if state.disposed {
            return;
        }
        state.disposed = true;
        drop(state);
        self.wake.notify_all();
    }
}

/// Handle controlling a timer created by [`set_timeout`] or [`set_interval`].
#[derive(Clone)]
pub struct Timer {
    control: Arc<TimerControl>,
    source: CancellationSource,
}

impl Timer {
    /// Cancel the timer. Its callback will not be scheduled again.
    ///
    /// Racing a one-shot timer that is firing, exactly one of the two wins.
    pub fn cancel(&self) {
        self.source.cancel();
    }

    /// Restart the countdown from now. Useful for watchdogs.
    pub fn reset(&self) {
        self.control.reset();
    }

    /// Whether the timer can still fire.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.control.is_disposed()
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("period", &self.control.period)
            .field("active", &self.is_active())
            .finish()
    }
}

fn arm<S>(scheduler: &S, period: Duration) -> LoopResult<(Timer, UntrackHandle)>
where
    S: ResourceTrackingScheduler,
{
    let source = CancellationSource::new();
    let control = Arc::new(TimerControl::new(period));
    let untrack = scheduler.track_resource(&source.token(), Arc::clone(&control) as Arc<dyn Disposable>)?;
    Ok((Timer { control, source }, untrack))
}

fn spawn_timer<F>(untrack: &UntrackHandle, body: F) -> LoopResult<()>
where
    F: FnOnce() + Send + 'static,
{
    match thread::Builder::new().name("nloop-timer".into()).spawn(body) {
        Ok(_) => Ok(()),
        Err(e) => {
            untrack.untrack();
            Err(LoopError::Spawn(e))
        }
    }
}

/// Schedule `callback` on `scheduler` once `delay` has elapsed.
///
/// # Errors
///
/// - `LoopError::Disposed` if the scheduler has been disposed
/// - `LoopError::Spawn` if the timer thread could not be created
pub fn set_timeout<S, F>(scheduler: &S, callback: F, delay: Duration) -> LoopResult<Timer>
where
    S: ResourceTrackingScheduler + Clone + 'static,
    F: FnOnce() + Send + 'static,
{
    let (timer, untrack) = arm(scheduler, delay)?;
    let control = Arc::clone(&timer.control);
    let scheduler = scheduler.clone();
    let untrack_on_fire = untrack.clone();

    spawn_timer(&untrack, move || {
        if !control.wait_elapsed(false) {
            return;
        }
        // Untracking disposes the timer; losing the race means it was cancelled.
        if untrack_on_fire.untrack() {
            debug!(key = %untrack_on_fire.key(), "timeout elapsed");
            scheduler.schedule(callback);
        }
    })?;
    Ok(timer)
}

/// Schedule `callback` on `scheduler` every `period` until the timer is
/// cancelled or the scheduler is disposed.
///
/// # Errors
///
/// - `LoopError::InvalidArgument` if `period` is zero
/// - `LoopError::Disposed` if the scheduler has been disposed
/// - `LoopError::Spawn` if the timer thread could not be created
pub fn set_interval<S, F>(scheduler: &S, callback: F, period: Duration) -> LoopResult<Timer>
where
    S: ResourceTrackingScheduler + Clone + 'static,
    F: Fn() + Send + Sync + 'static,
{
    if period.is_zero() {
        return Err(LoopError::InvalidArgument("interval period must be non-zero".into()));
    }

    let (timer, untrack) = arm(scheduler, period)?;
    let control = Arc::clone(&timer.control);
    let scheduler = scheduler.clone();
    let callback = Arc::new(callback);

    spawn_timer(&untrack, move || {
        while control.wait_elapsed(true) {
            let callback = Arc::clone(&callback);
            scheduler.schedule(move || (*callback)());
        }
    })?;
    Ok(timer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispose_releases_waiter() {
        let control = Arc::new(TimerControl::new(Duration::from_secs(60)));
        let waiter = {
            let control = Arc::clone(&control);
            thread::spawn(move || control.wait_elapsed(false))
        };

        thread::sleep(Duration::from_millis(10));
        control.dispose();
        assert!(!waiter.join().unwrap());
        assert!(control.is_disposed());
    }

    #[test]
    fn test_rearm_moves_deadline_forward() {
        let control = TimerControl::new(Duration::from_millis(5));
        assert!(control.wait_elapsed(true));
        let next = control.state.lock().deadline.unwrap();
        assert!(next > Instant::now() - Duration::from_millis(1));

        assert!(control.wait_elapsed(true));
        assert!(control.state.lock().deadline.unwrap() > next);
    }

    #[test]
    fn test_unreachable_deadline_waits_until_disposed() {
        let control = Arc::new(TimerControl::new(Duration::MAX));
        assert!(control.state.lock().deadline.is_none());

        let waiter = {
            let control = Arc::clone(&control);
            thread::spawn(move || control.wait_elapsed(true))
        };
        thread::sleep(Duration::from_millis(10));
        control.reset();
        assert!(control.state.lock().deadline.is_none());

        control.dispose();
        assert!(!waiter.join().unwrap());
    }

    #[test]
    fn test_reset_after_dispose_is_ignored() {
        let control = TimerControl::new(Duration::from_millis(5));
        control.dispose();
        let before = control.state.lock().deadline;
        control.reset();
        assert_eq!(control.state.lock().deadline, before);
        assert!(!control.wait_elapsed(false));
    }
}
