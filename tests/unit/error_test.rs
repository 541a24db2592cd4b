//! Tests for error types

use nloop::core::{CancellationSource, LoopError};

#[test]
fn test_invalid_argument_error() {
    let err = LoopError::InvalidArgument("interval period must be non-zero".to_string());
    assert_eq!(
        format!("{}", err),
        "invalid argument: interval period must be non-zero"
    );
    assert!(!err.is_disposed());
}

#[test]
fn test_disposed_error() {
    let err = LoopError::Disposed("event loop");
    assert_eq!(format!("{}", err), "event loop has been disposed");
    assert!(err.is_disposed());
}

#[test]
fn test_duplicate_registration_error() {
    let source = CancellationSource::new();
    let id = source.token().id();
    let err = LoopError::DuplicateRegistration(id);
    assert_eq!(
        format!("{}", err),
        format!("resource key #{} is already tracked", id.as_u64())
    );
}

#[test]
fn test_spawn_error_from_io() {
    let io = std::io::Error::new(std::io::ErrorKind::OutOfMemory, "no threads left");
    let err: LoopError = io.into();
    assert!(matches!(err, LoopError::Spawn(_)));
    assert_eq!(format!("{}", err), "failed to spawn thread: no threads left");
}

#[test]
fn test_invalid_config_error() {
    let err = LoopError::InvalidConfig("thread_name must not be empty".to_string());
    assert_eq!(
        format!("{}", err),
        "invalid configuration: thread_name must not be empty"
    );
}

#[test]
fn test_loop_error_converts_to_anyhow() {
    fn fallible() -> nloop::core::AppResult<()> {
        let result: Result<(), LoopError> = Err(LoopError::Disposed("worker"));
        result?;
        Ok(())
    }
    let err = fallible().unwrap_err();
    assert!(err.downcast_ref::<LoopError>().is_some_and(LoopError::is_disposed));
}
