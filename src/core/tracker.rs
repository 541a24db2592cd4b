//! Resource tracking: binds disposable resources to cancellation keys and to the
//! lifetime of the owning event loop.
//!
//! Every tracked resource is disposed exactly once, either when its key is
//! untracked (explicitly or by cancelling the key's token) or when the tracker is
//! disposed, whichever happens first.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::core::cancel::{CancelRegistration, CancellationToken, TokenId};
use crate::core::error::{LoopError, LoopResult};
use crate::core::scheduler::{Disposable, ResourceFactory};

enum Resource {
    /// Key reserved while a factory builds the resource.
    Pending,
    Ready(Arc<dyn Disposable>),
}

/// One registration of a key. The serial tells registrations of the same key
/// apart, so a stale handle or a late factory never touches a newer one.
struct Entry {
    serial: u64,
    resource: Resource,
    hook: Option<CancelRegistration>,
}

#[derive(Default)]
struct Table {
    entries: HashMap<TokenId, Entry>,
    next_serial: u64,
    disposed: bool,
}

/// Map from cancellation key to disposer, owned by an event loop.
#[derive(Default)]
pub struct ResourceTracker {
    table: Mutex<Table>,
}

fn dispose_logged(key: TokenId, resource: &Arc<dyn Disposable>) {
    if panic::catch_unwind(AssertUnwindSafe(|| resource.dispose())).is_err() {
        error!(key = %key, "tracked resource panicked while disposing");
    }
}

/// Release a removed entry outside the table lock.
fn release(key: TokenId, entry: Entry) -> bool {
    if let Some(hook) = entry.hook {
        hook.unregister();
    }
    match entry.resource {
        Resource::Ready(resource) => {
            debug!(key = %key, "resource untracked");
            dispose_logged(key, &resource);
        }
        // The factory is still running; it disposes the resource once produced.
        Resource::Pending => {}
    }
    true
}

impl ResourceTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn reserve(&self, key: TokenId, resource: Resource) -> LoopResult<u64> {
        let mut table = self.table.lock();
        if table.disposed {
            return Err(LoopError::Disposed("event loop"));
        }
        if table.entries.contains_key(&key) {
            return Err(LoopError::DuplicateRegistration(key));
        }
        let serial = table.next_serial;
        table.next_serial += 1;
        table.entries.insert(
            key,
            Entry {
                serial,
                resource,
                hook: None,
            },
        );
        Ok(serial)
    }

    fn handle(self: &Arc<Self>, key: TokenId, serial: u64) -> UntrackHandle {
        UntrackHandle {
            key,
            serial,
            tracker: Arc::downgrade(self),
        }
    }

    /// Untrack the registration behind `handle` when its token is cancelled.
    ///
    /// The hook is stored on the entry and removed from the token when the entry
    /// is untracked first.
    fn bind_cancellation(&self, token: &CancellationToken, handle: &UntrackHandle) {
        let on_cancel = handle.clone();
        let Some(registration) = token.register(move || {
            on_cancel.untrack();
        }) else {
            return;
        };

        let stale = {
            let mut table = self.table.lock();
            match table.entries.get_mut(&handle.key) {
                Some(entry) if entry.serial == handle.serial => {
                    entry.hook = Some(registration);
                    None
                }
                _ => Some(registration),
            }
        };
        if let Some(stale) = stale {
            stale.unregister();
        }
    }

    /// Track an already constructed resource under `token`.
    ///
    /// # Errors
    ///
    /// - `LoopError::DuplicateRegistration` if the key is already tracked
    /// - `LoopError::Disposed` if the tracker has been disposed
    pub fn track(
        self: &Arc<Self>,
        token: &CancellationToken,
        resource: Arc<dyn Disposable>,
    ) -> LoopResult<UntrackHandle> {
        let key = token.id();
        let serial = self.reserve(key, Resource::Ready(resource))?;
        debug!(key = %key, "resource tracked");

        let handle = self.handle(key, serial);
        self.bind_cancellation(token, &handle);
        Ok(handle)
    }

    /// Track the resource produced by `factory` under `token`.
    ///
    /// The factory runs with no tracker lock held, so the resource it builds may
    /// untrack itself from any thread without deadlocking.
    ///
    /// # Errors
    ///
    /// - `LoopError::DuplicateRegistration` if the key is already tracked
    /// - `LoopError::Disposed` if the tracker has been disposed
    pub fn track_with(
        self: &Arc<Self>,
        token: &CancellationToken,
        factory: ResourceFactory,
    ) -> LoopResult<UntrackHandle> {
        let key = token.id();
        let serial = self.reserve(key, Resource::Pending)?;
        let handle = self.handle(key, serial);

        let resource = factory(handle.clone());

        let orphaned = {
            let mut table = self.table.lock();
            match table.entries.get_mut(&key) {
                Some(entry) if entry.serial == serial => {
                    entry.resource = Resource::Ready(Arc::clone(&resource));
                    false
                }
                _ => true,
            }
        };

        if orphaned {
            // Untracked (or swept by disposal) while the factory was running.
            debug!(key = %key, "resource released before registration completed");
            dispose_logged(key, &resource);
            return Ok(handle);
        }

        debug!(key = %key, "resource tracked via factory");
        self.bind_cancellation(token, &handle);
        Ok(handle)
    }

    /// Remove `key` and dispose its resource. Returns `false` if it was not tracked.
    pub fn untrack(&self, key: TokenId) -> bool {
        let removed = self.table.lock().entries.remove(&key);
        removed.is_some_and(|entry| release(key, entry))
    }

    /// Remove `key` only while it still holds registration `serial`.
    fn untrack_registration(&self, key: TokenId, serial: u64) -> bool {
        let removed = {
            let mut table = self.table.lock();
            match table.entries.get(&key) {
                Some(entry) if entry.serial == serial => table.entries.remove(&key),
                _ => None,
            }
        };
        removed.is_some_and(|entry| release(key, entry))
    }

    fn is_registered(&self, key: TokenId, serial: u64) -> bool {
        self.table
            .lock()
            .entries
            .get(&key)
            .is_some_and(|entry| entry.serial == serial)
    }

    /// Whether `key` is currently tracked.
    #[must_use]
    pub fn is_tracked(&self, key: TokenId) -> bool {
        self.table.lock().entries.contains_key(&key)
    }

    /// Number of tracked resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.lock().entries.len()
    }

    /// Whether nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.table.lock().disposed
    }

    /// Dispose every tracked resource once and refuse further registrations.
    /// Idempotent.
    pub fn dispose(&self) {
        let entries = {
            let mut table = self.table.lock();
            if table.disposed {
                return;
            }
            table.disposed = true;
            std::mem::take(&mut table.entries)
        };

        let count = entries.len();
        for (key, entry) in entries {
            release(key, entry);
        }
        info!(resources = count, "resource tracker disposed");
    }
}

impl fmt::Debug for ResourceTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table.lock();
        f.debug_struct("ResourceTracker")
            .field("tracked", &table.entries.len())
            .field("disposed", &table.disposed)
            .finish()
    }
}

/// Removes one tracked registration from its tracker and disposes it.
///
/// Cloneable; only the first successful [`untrack`](Self::untrack) across all
/// clones (and the key's cancellation hook) disposes the resource. A handle
/// never affects a later registration of the same key.
#[derive(Debug, Clone)]
pub struct UntrackHandle {
    key: TokenId,
    serial: u64,
    tracker: Weak<ResourceTracker>,
}

impl UntrackHandle {
    /// Key the resource is tracked under.
    #[must_use]
    pub const fn key(&self) -> TokenId {
        self.key
    }

    /// Whether the resource is still tracked.
    #[must_use]
    pub fn is_tracked(&self) -> bool {
        self.tracker
            .upgrade()
            .is_some_and(|tracker| tracker.is_registered(self.key, self.serial))
    }

    /// Untrack and dispose the resource. Returns `false` if it was not tracked.
    pub fn untrack(&self) -> bool {
        self.tracker
            .upgrade()
            .is_some_and(|tracker| tracker.untrack_registration(self.key, self.serial))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cancel::CancellationSource;
    use crate::core::scheduler::DisposeAction;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_resource(hits: &Arc<AtomicUsize>) -> Arc<dyn Disposable> {
        let hits = Arc::clone(hits);
        DisposeAction::shared(move || {
            hits.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_untrack_disposes_once() {
        let tracker = ResourceTracker::new();
        let source = CancellationSource::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let handle = tracker.track(&source.token(), counting_resource(&hits)).unwrap();
        assert!(handle.is_tracked());
        assert!(handle.untrack());
        assert!(!handle.untrack());
        assert!(!handle.is_tracked());

        tracker.dispose();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stale_handle_leaves_new_registration_alone() {
        let tracker = ResourceTracker::new();
        let source = CancellationSource::new();
        let first_hits = Arc::new(AtomicUsize::new(0));
        let second_hits = Arc::new(AtomicUsize::new(0));

        let first = tracker.track(&source.token(), counting_resource(&first_hits)).unwrap();
        assert!(first.untrack());

        let second = tracker.track(&source.token(), counting_resource(&second_hits)).unwrap();
        assert!(!first.untrack());
        assert!(!first.is_tracked());
        assert!(second.is_tracked());
        assert_eq!(second_hits.load(Ordering::SeqCst), 0);

        assert!(second.untrack());
        assert_eq!(first_hits.load(Ordering::SeqCst), 1);
        assert_eq!(second_hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_untrack_removes_cancellation_hook() {
        let tracker = ResourceTracker::new();
        let source = CancellationSource::new();
        let token = source.token();
        let hits = Arc::new(AtomicUsize::new(0));

        for _ in 0..50 {
            let handle = tracker.track(&token, counting_resource(&hits)).unwrap();
            assert_eq!(token.hooks(), 1);
            assert!(handle.untrack());
        }
        assert_eq!(token.hooks(), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 50);

        // Only the live registration reacts to cancellation.
        let live_hits = Arc::new(AtomicUsize::new(0));
        tracker.track(&token, counting_resource(&live_hits)).unwrap();
        source.cancel();
        assert_eq!(live_hits.load(Ordering::SeqCst), 1);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_duplicate_key_is_rejected() {
        let tracker = ResourceTracker::new();
        let source = CancellationSource::new();
        let hits = Arc::new(AtomicUsize::new(0));

        tracker.track(&source.token(), counting_resource(&hits)).unwrap();
        let err = tracker
            .track(&source.token(), counting_resource(&hits))
            .unwrap_err();
        assert!(matches!(err, LoopError::DuplicateRegistration(key) if key == source.token().id()));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_factory_untracking_itself_disposes_after_registration() {
        let tracker = ResourceTracker::new();
        let source = CancellationSource::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let hits_clone = Arc::clone(&hits);
        let handle = tracker
            .track_with(
                &source.token(),
                Box::new(move |untrack| {
                    // Completes before the factory even returns.
                    assert!(untrack.untrack());
                    counting_resource(&hits_clone)
                }),
            )
            .unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!handle.is_tracked());
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_dispose_sweeps_and_refuses() {
        let tracker = ResourceTracker::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let sources: Vec<_> = (0..5).map(|_| CancellationSource::new()).collect();

        for source in &sources {
            tracker.track(&source.token(), counting_resource(&hits)).unwrap();
        }
        assert_eq!(tracker.len(), 5);

        tracker.dispose();
        tracker.dispose();
        assert_eq!(hits.load(Ordering::SeqCst), 5);

        let late = CancellationSource::new();
        let err = tracker.track(&late.token(), counting_resource(&hits)).unwrap_err();
        assert!(err.is_disposed());

        // Cancelling after disposal finds nothing to dispose.
        for source in &sources {
            source.cancel();
        }
        assert_eq!(hits.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_cancelled_token_disposes_immediately() {
        let tracker = ResourceTracker::new();
        let source = CancellationSource::new();
        source.cancel();
        let hits = Arc::new(AtomicUsize::new(0));

        let handle = tracker.track(&source.token(), counting_resource(&hits)).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!handle.is_tracked());
    }
}
