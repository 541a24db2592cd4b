//! Tests for configuration validation

use nloop::config::{LoopConfig, PanicPolicy};
use std::time::Duration;

#[test]
fn test_default_config_is_valid() {
    let config = LoopConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.thread_name, "nloop-worker");
    assert_eq!(config.dispose_timeout(), Duration::from_secs(10));
    assert_eq!(config.panic_policy, PanicPolicy::Continue);
    assert_eq!(config.stack_size, None);
}

#[test]
fn test_builder_methods() {
    let config = LoopConfig::new()
        .with_thread_name("ui-loop")
        .with_stack_size(1 << 20)
        .with_dispose_timeout(Duration::from_millis(1500))
        .with_panic_policy(PanicPolicy::Propagate);

    assert!(config.validate().is_ok());
    assert_eq!(config.thread_name, "ui-loop");
    assert_eq!(config.stack_size, Some(1 << 20));
    assert_eq!(config.dispose_timeout_ms, 1500);
    assert_eq!(config.panic_policy, PanicPolicy::Propagate);
}

#[test]
fn test_config_invalid_thread_name() {
    assert!(LoopConfig::new().with_thread_name("").validate().is_err());
    assert!(LoopConfig::new().with_thread_name("bad\0name").validate().is_err());
}

#[test]
fn test_config_invalid_dispose_timeout() {
    let invalid = LoopConfig::new().with_dispose_timeout(Duration::ZERO);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_config_invalid_stack_size() {
    let invalid = LoopConfig::new().with_stack_size(0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_config_from_json() {
    let config = LoopConfig::from_json_str(
        r#"{ "thread_name": "json-loop", "dispose_timeout_ms": 250, "panic_policy": "propagate" }"#,
    )
    .unwrap();

    assert_eq!(config.thread_name, "json-loop");
    assert_eq!(config.dispose_timeout_ms, 250);
    assert_eq!(config.panic_policy, PanicPolicy::Propagate);
    assert_eq!(config.stack_size, None);
}

#[test]
fn test_config_from_json_rejects_invalid() {
    let err = LoopConfig::from_json_str(r#"{ "dispose_timeout_ms": 0 }"#).unwrap_err();
    assert!(err.to_string().contains("dispose_timeout_ms"));

    let err = LoopConfig::from_json_str("not json").unwrap_err();
    assert!(err.to_string().contains("parse error"));
}

#[test]
fn test_config_json_roundtrip() {
    let config = LoopConfig::new().with_thread_name("roundtrip");
    let json = serde_json::to_string(&config).unwrap();
    assert_eq!(LoopConfig::from_json_str(&json).unwrap(), config);
}

#[test]
fn test_panic_policy_parse() {
    assert_eq!("continue".parse::<PanicPolicy>(), Ok(PanicPolicy::Continue));
    assert_eq!(" PROPAGATE ".parse::<PanicPolicy>(), Ok(PanicPolicy::Propagate));
    assert!("abort".parse::<PanicPolicy>().is_err());
}
