//! deploycheck.toml integration tests
//!
//! - parsing the shipped example file
//! - partial configuration loading
//! - environment variable precedence
//! - empty / malformed file errors

use std::path::PathBuf;

use deploycheck_core::config::DeploycheckConfig;
use deploycheck_core::error::{ConfigError, DeploycheckError};
use serial_test::serial;

const EXAMPLE: &str = include_str!("../../../deploycheck.toml.example");

#[test]
fn example_config_parses_successfully() {
    let config = DeploycheckConfig::parse(EXAMPLE).expect("example config should parse");
    assert_eq!(config.general.log_level, "info");
    assert_eq!(config.general.log_format, "pretty");
    assert_eq!(config.cluster.context(), None);
}

#[test]
fn example_config_passes_validation() {
    let config = DeploycheckConfig::parse(EXAMPLE).expect("should parse");
    config
        .validate()
        .expect("example config should pass validation");
}

#[test]
fn example_config_matches_load_defaults() {
    let config = DeploycheckConfig::parse(EXAMPLE).expect("should parse");
    assert_eq!(config.load.requests, 50);
    assert_eq!(config.load.local_port, 3000);
    assert_eq!(config.load.remote_port, 80);
    assert_eq!(config.load.endpoint, "/generate");
    assert_eq!(config.load.request_timeout_secs, 5);
}

#[test]
fn example_config_values_file_is_relative() {
    let config = DeploycheckConfig::parse(EXAMPLE).expect("should parse");
    assert_eq!(
        config.chart.values_file,
        PathBuf::from("tests/serve/pipeline-values.yaml")
    );
}

#[test]
fn partial_config_keeps_other_sections_default() {
    let config = DeploycheckConfig::parse("[scaling]\nscale_up_replicas = 5\n").expect("should parse");
    assert_eq!(config.scaling.scale_up_replicas, 5);
    assert_eq!(config.scaling.scale_down_replicas, 1);
    assert_eq!(config.wait.timeout_secs, 180);
}

#[test]
fn unknown_type_is_parse_error() {
    let err = DeploycheckConfig::parse("[load]\nrequests = \"many\"\n").unwrap_err();
    assert!(matches!(
        err,
        DeploycheckError::Config(ConfigError::ParseFailed { .. })
    ));
}

#[tokio::test]
#[serial]
async fn env_override_takes_precedence_over_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("deploycheck.toml");
    tokio::fs::write(&path, "[wait]\ntimeout_secs = 30\n")
        .await
        .expect("write config");

    // SAFETY: env tests are serialized.
    unsafe { std::env::set_var("DEPLOYCHECK_WAIT_TIMEOUT_SECS", "45") };
    let result = DeploycheckConfig::load(&path).await;
    unsafe { std::env::remove_var("DEPLOYCHECK_WAIT_TIMEOUT_SECS") };

    let config = result.expect("config should load");
    assert_eq!(config.wait.timeout_secs, 45);
}

#[tokio::test]
#[serial]
async fn invalid_env_override_fails_validation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("deploycheck.toml");
    tokio::fs::write(&path, "").await.expect("write config");

    // SAFETY: env tests are serialized.
    unsafe { std::env::set_var("DEPLOYCHECK_LOAD_MIN_SUCCESS_RATIO", "2.0") };
    let result = DeploycheckConfig::load(&path).await;
    unsafe { std::env::remove_var("DEPLOYCHECK_LOAD_MIN_SUCCESS_RATIO") };

    let err = result.expect_err("ratio above 1.0 must be rejected");
    assert!(err.to_string().contains("min_success_ratio"));
}

#[tokio::test]
#[serial]
async fn empty_file_loads_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("deploycheck.toml");
    tokio::fs::write(&path, "").await.expect("write config");

    let config = DeploycheckConfig::load(&path).await.expect("should load");
    assert_eq!(config.chart.release_prefix, "test-release");
}

#[tokio::test]
async fn malformed_file_is_parse_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("bad.toml");
    tokio::fs::write(&path, "[general\nlog_level = 1").await.expect("write");

    let err = DeploycheckConfig::from_file(&path).await.unwrap_err();
    assert!(matches!(
        err,
        DeploycheckError::Config(ConfigError::ParseFailed { .. })
    ));
}
