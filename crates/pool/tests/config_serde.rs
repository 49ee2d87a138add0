//! Loading `PoolConfig` from configuration documents.
#![cfg(feature = "serde")]

use std::time::Duration;

use nebula_pool::{Error, PoolConfig};
use pretty_assertions::assert_eq;

#[test]
fn partial_document_fills_in_defaults() {
    let config: PoolConfig = serde_json::from_str(
        r#"{
            "name": "reporting",
            "min_size": 1,
            "max_size": 8,
            "idle_timeout": "5m",
            "acquire_timeout": "1m 30s"
        }"#,
    )
    .unwrap();

    assert_eq!(
        config,
        PoolConfig {
            name: "reporting".to_string(),
            min_size: 1,
            max_size: 8,
            idle_timeout: Some(Duration::from_secs(300)),
            acquire_timeout: Some(Duration::from_secs(90)),
            ..Default::default()
        }
    );
    assert!(config.validate().is_ok());
}

#[test]
fn null_timeouts_disable_them() {
    let config: PoolConfig =
        serde_json::from_str(r#"{ "idle_timeout": null, "acquire_timeout": null }"#).unwrap();
    assert_eq!(config.idle_timeout, None);
    assert_eq!(config.effective_acquire_timeout(), None);
}

#[test]
fn zero_idle_timeout_parses_but_fails_validation() {
    let config: PoolConfig = serde_json::from_str(r#"{ "idle_timeout": "0s" }"#).unwrap();
    assert!(matches!(config.validate(), Err(Error::Configuration { .. })));
}

#[test]
fn malformed_duration_is_rejected() {
    let result = serde_json::from_str::<PoolConfig>(r#"{ "retry_delay": "soon" }"#);
    assert!(result.is_err());
}

#[test]
fn serialized_config_uses_human_readable_durations() {
    let value = serde_json::to_value(PoolConfig::default()).unwrap();
    assert_eq!(value["retry_delay"], "5s");
    assert_eq!(value["idle_timeout"], "5m");
}
