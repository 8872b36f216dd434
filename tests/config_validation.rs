//! Integration tests for configuration validation

#![allow(clippy::expect_used)]

use gateway_protocol::config::GatewayConfig;
use std::time::Duration;

#[test]
fn test_default_config_validates() {
    let config = GatewayConfig::default();
    let errors = config.validate();
    assert!(
        errors.is_empty(),
        "Default config should be valid, but got errors: {:?}",
        errors
    );
}

#[test]
fn test_invalid_bind_address() {
    let mut config = GatewayConfig::default();
    config.network.bind_address = "not_an_address".to_string();

    let errors = config.validate();
    assert!(!errors.is_empty(), "Should have validation errors");
    assert!(errors.iter().any(|e| e.contains("invalid bind address")));
}

#[test]
fn test_empty_bind_address() {
    let mut config = GatewayConfig::default();
    config.network.bind_address = String::new();

    let errors = config.validate();
    assert!(!errors.is_empty());
    assert!(errors.iter().any(|e| e.contains("cannot be empty")));
}

#[test]
fn test_short_read_timeout() {
    let mut config = GatewayConfig::default();
    config.network.read_timeout = Duration::from_millis(50);

    let errors = config.validate();
    assert!(!errors.is_empty());
    assert!(errors.iter().any(|e| e.contains("read timeout too short")));
}

#[test]
fn test_long_write_timeout() {
    let mut config = GatewayConfig::default();
    config.network.write_timeout = Duration::from_secs(600);

    let errors = config.validate();
    assert!(!errors.is_empty());
    assert!(errors.iter().any(|e| e.contains("write timeout too long")));
}

#[test]
fn test_zero_packet_rate_cap() {
    let mut config = GatewayConfig::default();
    config.network.max_packets_per_second = 0;

    let errors = config.validate();
    assert!(!errors.is_empty());
    assert!(errors
        .iter()
        .any(|e| e.contains("packet rate cap must be greater than 0")));
}

#[test]
fn test_very_high_packet_rate_cap() {
    let mut config = GatewayConfig::default();
    config.network.max_packets_per_second = 1_000_000;

    let errors = config.validate();
    assert!(!errors.is_empty());
    assert!(errors.iter().any(|e| e.contains("packet rate cap very high")));
}

#[test]
fn test_zero_max_connections() {
    let mut config = GatewayConfig::default();
    config.network.max_connections = 0;

    let errors = config.validate();
    assert!(!errors.is_empty());
    assert!(errors
        .iter()
        .any(|e| e.contains("max connections must be greater than 0")));
}

#[test]
fn test_empty_app_name() {
    let mut config = GatewayConfig::default();
    config.logging.app_name = String::new();

    let errors = config.validate();
    assert!(!errors.is_empty());
    assert!(errors.iter().any(|e| e.contains("application name cannot be empty")));
}

#[test]
fn test_validate_strict_collects_all_errors() {
    let mut config = GatewayConfig::default();
    config.network.bind_address = String::new();
    config.network.max_packets_per_second = 0;

    let err = config
        .validate_strict()
        .expect_err("two invalid settings must fail strict validation");
    let message = err.to_string();
    assert!(message.contains("cannot be empty"));
    assert!(message.contains("greater than 0"));
}

#[test]
fn test_toml_roundtrip() {
    let example = GatewayConfig::example_config();
    let parsed = GatewayConfig::from_toml(&example).expect("example config must parse");
    assert!(parsed.validate().is_empty());
    assert_eq!(parsed.network.bind_address, "127.0.0.1:7171");
    assert_eq!(parsed.network.max_packets_per_second, 250);
}

#[test]
fn test_partial_toml_uses_defaults() {
    let config = GatewayConfig::from_toml(
        r#"
        [network]
        bind_address = "0.0.0.0:7172"
        read_timeout = 5000
        write_timeout = 5000
        max_packets_per_second = 100
        shutdown_timeout = 5000
        max_connections = 64
        "#,
    )
    .expect("toml must parse");

    assert_eq!(config.network.bind_address, "0.0.0.0:7172");
    assert_eq!(config.network.read_timeout, Duration::from_secs(5));
    assert_eq!(config.network.max_packets_per_second, 100);
    // Unspecified logging section falls back to defaults.
    assert_eq!(config.logging.app_name, "gateway-protocol");
}

#[test]
fn test_default_with_overrides() {
    let config = GatewayConfig::default_with_overrides(|c| {
        c.network.max_packets_per_second = 10;
    });
    assert_eq!(config.network.max_packets_per_second, 10);
    assert_eq!(config.network.max_connections, 1000);
}
