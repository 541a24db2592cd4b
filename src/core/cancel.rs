//! Cancellation sources and tokens.
//!
//! A [`CancellationToken`] doubles as the key under which an event loop tracks a
//! resource. Every token carries a [`TokenId`] issued from a process-wide counter,
//! so keys compare as plain integers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::scheduler::Callback;

static NEXT_TOKEN_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier of a cancellation token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenId(u64);

impl TokenId {
    fn next() -> Self {
        Self(NEXT_TOKEN_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value of this id.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct TokenState {
    cancelled: bool,
    next_hook: u64,
    callbacks: Vec<(u64, Callback)>,
}

struct TokenInner {
    id: TokenId,
    state: Mutex<TokenState>,
}

/// Read side of a cancellation signal.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl CancellationToken {
    /// Identifier used as the tracking key.
    #[must_use]
    pub fn id(&self) -> TokenId {
        self.inner.id
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.state.lock().cancelled
    }

    /// Registers `callback` to run once when the token is cancelled.
    ///
    /// If the token is already cancelled the callback runs immediately on the
    /// calling thread.
    pub fn on_cancel<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let _ = self.register(callback);
    }

    /// Like [`on_cancel`](Self::on_cancel), but returns a registration that can
    /// remove the callback again before the token is cancelled.
    ///
    /// Returns `None` when the token was already cancelled and the callback ran
    /// inline.
    pub fn register<F>(&self, callback: F) -> Option<CancelRegistration>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.inner.state.lock();
        if state.cancelled {
            drop(state);
            callback();
            return None;
        }
        let hook = state.next_hook;
        state.next_hook += 1;
        state.callbacks.push((hook, Box::new(callback)));
        Some(CancelRegistration {
            token: self.clone(),
            hook,
        })
    }

    #[cfg(test)]
    pub(crate) fn hooks(&self) -> usize {
        self.inner.state.lock().callbacks.len()
    }
}

/// A callback registered on a [`CancellationToken`].
pub struct CancelRegistration {
    token: CancellationToken,
    hook: u64,
}

impl CancelRegistration {
    /// Remove the callback without running it. A no-op once the token has been
    /// cancelled.
    pub fn unregister(self) {
        let removed = {
            let mut state = self.token.inner.state.lock();
            state
                .callbacks
                .iter()
                .position(|(hook, _)| *hook == self.hook)
                .map(|index| state.callbacks.swap_remove(index))
        };
        // Dropped outside the lock; the callback may own other tokens.
        drop(removed);
    }
}

impl fmt::Debug for CancelRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelRegistration")
            .field("key", &self.token.id())
            .field("hook", &self.hook)
            .finish()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("id", &self.inner.id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Write side of a cancellation signal.
///
/// Cancelling runs every callback registered on the token exactly once, after the
/// token's lock has been released.
#[derive(Debug, Clone)]
pub struct CancellationSource {
    token: CancellationToken,
}

impl CancellationSource {
    /// Creates a source with a freshly issued token id.
    #[must_use]
    pub fn new() -> Self {
        Self {
            token: CancellationToken {
                inner: Arc::new(TokenInner {
                    id: TokenId::next(),
                    state: Mutex::new(TokenState {
                        cancelled: false,
                        next_hook: 0,
                        callbacks: Vec::new(),
                    }),
                }),
            },
        }
    }

    /// Token observing this source.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Requests cancellation. Returns `true` only for the call that flipped the state.
    pub fn cancel(&self) -> bool {
        let callbacks = {
            let mut state = self.token.inner.state.lock();
            if state.cancelled {
                return false;
            }
            state.cancelled = true;
            std::mem::take(&mut state.callbacks)
        };

        tracing::debug!(key = %self.token.id(), hooks = callbacks.len(), "token cancelled");
        for (_, callback) in callbacks {
            callback();
        }
        true
    }
}

impl Default for CancellationSource {
    fn default() -> Self {
        Self::new()
    }
}
