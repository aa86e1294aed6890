//! Integration tests for loading client settings.

#![allow(unsafe_code)] // For env var manipulation in tests

use consul_kv_config::prelude::*;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_load_yaml_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("consul.yaml");
    fs::write(
        &path,
        r#"
nodes:
  - 10.10.28.2:8500
  - 10.10.28.3:8500
scheme: https
token: secret-token
datacenter: dc2
wait_time_secs: 30
"#,
    )
    .unwrap();

    let settings =
        ClientSettings::load_with_env_prefix(Some(&path), "CONSUL_KV_IT_YAML").unwrap();

    assert_eq!(settings.nodes, vec!["10.10.28.2:8500", "10.10.28.3:8500"]);
    assert_eq!(settings.scheme, "https");
    assert_eq!(settings.token.as_deref(), Some("secret-token"));
    assert_eq!(settings.datacenter.as_deref(), Some("dc2"));
    assert_eq!(settings.wait_time(), Duration::from_secs(30));
    // Unset fields keep their defaults.
    assert_eq!(settings.request_timeout(), Duration::from_secs(10));
    assert_eq!(settings.retry_delay(), Duration::from_secs(2));
}

#[test]
fn test_load_toml_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("consul.toml");
    fs::write(
        &path,
        r#"
nodes = ["127.0.0.1:8500"]
retry_delay_ms = 500
"#,
    )
    .unwrap();

    let settings =
        ClientSettings::load_with_env_prefix(Some(&path), "CONSUL_KV_IT_TOML").unwrap();

    assert_eq!(settings.nodes, vec!["127.0.0.1:8500"]);
    assert_eq!(settings.scheme, "http");
    assert_eq!(settings.retry_delay(), Duration::from_millis(500));
}

#[test]
fn test_env_overrides_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("consul.yaml");
    fs::write(
        &path,
        r#"
nodes:
  - 10.10.28.2:8500
scheme: http
wait_time_secs: 30
"#,
    )
    .unwrap();

    unsafe {
        std::env::set_var("CONSUL_KV_IT_ENV_SCHEME", "https");
        std::env::set_var("CONSUL_KV_IT_ENV_NODES", "a.internal:8500,b.internal:8500");
        std::env::set_var("CONSUL_KV_IT_ENV_RETRY_DELAY_MS", "750");
    }

    let settings = ClientSettings::load_with_env_prefix(Some(&path), "CONSUL_KV_IT_ENV").unwrap();

    assert_eq!(settings.scheme, "https");
    assert_eq!(settings.nodes, vec!["a.internal:8500", "b.internal:8500"]);
    assert_eq!(settings.retry_delay(), Duration::from_millis(750));
    assert_eq!(settings.wait_time(), Duration::from_secs(30));

    unsafe {
        std::env::remove_var("CONSUL_KV_IT_ENV_SCHEME");
        std::env::remove_var("CONSUL_KV_IT_ENV_NODES");
        std::env::remove_var("CONSUL_KV_IT_ENV_RETRY_DELAY_MS");
    }
}

#[test]
fn test_malformed_value_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("consul.yaml");
    fs::write(&path, "wait_time_secs: soon\n").unwrap();

    let err = ClientSettings::load_with_env_prefix(Some(&path), "CONSUL_KV_IT_BAD").unwrap_err();
    assert!(matches!(err, KvError::Config(_)));
}

#[test]
fn test_settings_drive_client_builder() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("consul.yaml");
    fs::write(&path, "retry_delay_ms: 100\n").unwrap();

    let settings =
        ClientSettings::load_with_env_prefix(Some(&path), "CONSUL_KV_IT_BUILD").unwrap();
    let client = KvClient::builder()
        .with_settings(&settings)
        .with_store(MemoryStore::new())
        .build()
        .unwrap();

    let watcher = client.watcher(|_| {});
    assert_eq!(watcher.retry_delay(), Duration::from_millis(100));
}
