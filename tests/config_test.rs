//! Integration tests for configuration loading.

use std::time::Duration;

use l2mps_bsa::config::BridgeConfig;
use l2mps_bsa::TimestampPolicy;

/// Loading the shipped file, then overriding it from the environment.
///
/// Kept in one test because environment variables are process-wide.
#[test]
fn test_shipped_config_and_env_override() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/l2mps_bsa.toml");

    let config = BridgeConfig::load_from(path).unwrap();
    config.validate().unwrap();
    assert_eq!(config.application.name, "l2mps-bsa");
    assert_eq!(config.archive.backend, "csv");

    let streams = config.stream_configs().unwrap();
    assert_eq!(streams.len(), 1);
    assert_eq!(streams[0].stream_name, "udp://0.0.0.0:8198");
    assert_eq!(streams[0].record_prefix, "MPLN:LI21:MP01");
    assert_eq!(streams[0].read_timeout, Duration::from_secs(1));
    assert_eq!(streams[0].timestamp_policy, TimestampPolicy::SwappedWords);
    assert_eq!(streams[0].debug_interval, 360);

    std::env::set_var("L2MPS_BSA_APPLICATION__LOG_LEVEL", "debug");
    std::env::set_var("L2MPS_BSA_ARCHIVE__BACKEND", "log");
    let overridden = BridgeConfig::load_from(path);
    std::env::remove_var("L2MPS_BSA_APPLICATION__LOG_LEVEL");
    std::env::remove_var("L2MPS_BSA_ARCHIVE__BACKEND");

    let overridden = overridden.unwrap();
    assert_eq!(overridden.application.log_level, "debug");
    assert_eq!(overridden.archive.backend, "log");
    assert_eq!(overridden.streams, config.streams);
}

#[test]
fn test_invalid_stream_rejected_by_validation() {
    let config: BridgeConfig = toml::from_str(
        r#"
        [[streams]]
        name = "udp://0.0.0.0:8198"
        record_prefix = "MPLN:LI21:MP01"
        read_timeout_ms = 0
        "#,
    )
    .unwrap();

    let err = config.validate().unwrap_err();
    assert!(err.contains("read_timeout_ms"));
    assert!(config.stream_configs().is_err());
}
