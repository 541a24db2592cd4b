//! Tests for cancellation tokens, dispose actions and telemetry

use nloop::core::{CancellationSource, Disposable, DisposeAction};
use nloop::util::{init_tracing, DEFAULT_FILTER};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn test_token_ids_are_unique() {
    let a = CancellationSource::new();
    let b = CancellationSource::new();
    assert_ne!(a.token().id(), b.token().id());
    assert_eq!(a.token().id(), a.token().id());
}

#[test]
fn test_cancel_runs_hooks_once() {
    let source = CancellationSource::new();
    let token = source.token();
    let hits = Arc::new(AtomicUsize::new(0));

    let hits_clone = Arc::clone(&hits);
    token.on_cancel(move || {
        hits_clone.fetch_add(1, Ordering::SeqCst);
    });

    assert!(source.cancel());
    assert!(!source.cancel());
    assert!(token.is_cancelled());
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    // Registered after cancellation: runs immediately.
    let hits_clone = Arc::clone(&hits);
    token.on_cancel(move || {
        hits_clone.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[test]
fn test_dispose_action_runs_once() {
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_clone = Arc::clone(&hits);
    let action = DisposeAction::new(move || {
        hits_clone.fetch_add(1, Ordering::SeqCst);
    });

    assert!(!action.is_disposed());
    action.dispose();
    action.dispose();
    assert!(action.is_disposed());
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_init_tracing_is_idempotent() {
    assert_eq!(DEFAULT_FILTER, "nloop=info");
    init_tracing();
    init_tracing();
    tracing::info!("tracing initialised twice without panicking");
}
