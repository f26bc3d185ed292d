#![allow(clippy::unwrap_used, clippy::expect_used)]

//! File-backed tests for the toklens-config crate.
//!
//! Covers: load_config, load_env_file, merge_server_env and envFile confinement.

use std::collections::HashMap;
use std::path::Path;
use toklens_config::{load_config, load_env_file, merge_server_env, ServerConfig, Transport};
use toklens_core::ToklensError;

fn server_with_env_file(env_file: &str) -> ServerConfig {
    ServerConfig {
        name: "svc".into(),
        env_file: env_file.into(),
        ..ServerConfig::default()
    }
}

#[test]
fn test_load_config_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mcp.json");
    std::fs::write(
        &path,
        r#"{"mcpServers": {"svc-a": {"command": "echo"}, "svc-b": {"url": "http://localhost:9/mcp"}}}"#,
    )
    .unwrap();

    let mut cfg = load_config(&path).unwrap();
    cfg.infer_defaults();
    cfg.validate().unwrap();

    let servers = cfg.merged_servers();
    assert_eq!(servers["svc-a"].transport, Some(Transport::Stdio));
    assert_eq!(servers["svc-b"].transport, Some(Transport::Http));
    assert!(cfg.warnings().is_empty());
}

#[test]
fn test_load_config_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_config(&dir.path().join("missing.json")).unwrap_err();
    assert!(matches!(err, ToklensError::Config(_)));
    assert!(err.to_string().contains("missing.json"));
}

#[test]
fn test_load_env_file_not_found() {
    let dir = tempfile::tempdir().unwrap();
    assert!(load_env_file(&dir.path().join("nope.env")).is_err());
}

#[test]
fn test_load_env_file_reports_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.env");
    std::fs::write(&path, "A=1\nB=2\nNOT_AN_ASSIGNMENT\n").unwrap();
    let err = load_env_file(&path).unwrap_err();
    assert!(err.to_string().contains("line 3"), "{err}");
}

#[test]
fn test_merge_inline_overrides_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(".env"),
        "FROM_FILE=file-value\nSHARED=x",
    )
    .unwrap();

    let srv = ServerConfig {
        env: HashMap::from([
            ("FROM_MAP".to_string(), "map-value".to_string()),
            ("SHARED".to_string(), "y".to_string()),
        ]),
        ..server_with_env_file(".env")
    };

    let env = merge_server_env(&srv, dir.path()).unwrap();
    assert_eq!(env["FROM_FILE"], "file-value");
    assert_eq!(env["FROM_MAP"], "map-value");
    assert_eq!(env["SHARED"], "y");
}

#[test]
fn test_relative_env_file_escaping_config_dir_rejected() {
    let config_dir = tempfile::tempdir().unwrap();
    let srv = server_with_env_file("../../etc/shadow");

    let err = merge_server_env(&srv, config_dir.path()).unwrap_err();
    assert!(matches!(err, ToklensError::PathConfinement { .. }));
    assert!(err.to_string().contains("outside the config directory"));
}

#[test]
fn test_relative_env_file_in_subdirectory() {
    let config_dir = tempfile::tempdir().unwrap();
    let sub = config_dir.path().join("subdir");
    std::fs::create_dir_all(&sub).unwrap();
    std::fs::write(sub.join("app.env"), "NESTED_KEY=nested-value").unwrap();

    let srv = server_with_env_file(&Path::new("subdir").join("app.env").to_string_lossy());
    let env = merge_server_env(&srv, config_dir.path()).unwrap();
    assert_eq!(env["NESTED_KEY"], "nested-value");
}

#[test]
fn test_absolute_env_file_bypasses_confinement() {
    let env_dir = tempfile::tempdir().unwrap();
    let config_dir = tempfile::tempdir().unwrap();
    let env_path = env_dir.path().join("external.env");
    std::fs::write(&env_path, "ABS_KEY=abs-value").unwrap();

    let srv = server_with_env_file(&env_path.to_string_lossy());
    let env = merge_server_env(&srv, config_dir.path()).unwrap();
    assert_eq!(env["ABS_KEY"], "abs-value");
}

#[test]
fn test_malformed_env_file_fails_merge() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("bad.env"), "=oops").unwrap();

    let err = merge_server_env(&server_with_env_file("bad.env"), dir.path()).unwrap_err();
    assert!(matches!(err, ToklensError::EnvFile(_)));
    assert!(err.to_string().contains("bad.env"));
    assert!(err.to_string().contains("empty key"));
}
