//! Integration tests for CLI commands

use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

/// Helper to run the sealpack binary with an isolated configuration
fn sealpack(config: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_sealpack"))
        .arg("--config")
        .arg(config)
        .args(args)
        .env_remove("SEALPACK_LOG")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute sealpack")
}

/// Config file pointing the key store into `dir`
fn write_config(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("config.yaml");
    std::fs::write(
        &path,
        format!("keyDir: {}\ntimeout: 30s\n", dir.join("keys").display()),
    )
    .unwrap();
    path
}

#[test]
fn test_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_sealpack"))
        .arg("--version")
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("sealpack"));
}

#[test]
fn test_keygen_then_seal() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path());
    let public_key = temp.path().join("key.pub");
    let public_key_arg = public_key.to_str().unwrap();

    let output = sealpack(
        &config,
        &["keygen", "--bits", "2048", "--public-out", public_key_arg],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(temp.path().join("keys/sealpack/default.pem").exists());
    assert!(std::fs::read_to_string(&public_key).unwrap().contains("PUBLIC KEY"));

    // A second run refuses to overwrite
    let output = sealpack(
        &config,
        &["keygen", "--bits", "2048", "--public-out", public_key_arg],
    );
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("--force"));

    let document = temp.path().join("app.yaml");
    std::fs::write(&document, "apiVersion: v1\nkind: ConfigMap\n").unwrap();
    let out_dir = temp.path().join("sealed");

    let output = sealpack(
        &config,
        &[
            "seal",
            "-k",
            public_key_arg,
            "-r",
            "ghcr.io/acme/pkg:^1",
            "-t",
            "local/acme:1",
            document.to_str().unwrap(),
            "-o",
            out_dir.to_str().unwrap(),
        ],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let sealed = std::fs::read_to_string(out_dir.join("package.yaml")).unwrap();
    assert!(!sealed.contains("ConfigMap"));

    let event: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out_dir.join("event.json")).unwrap())
            .unwrap();
    assert_eq!(event["target"], "local/acme:1");
    assert!(event["encryptedReference"].as_str().is_some());
    assert!(event["encryptedKey"].as_str().is_some());
}

#[test]
fn test_inspect_repackaged_archive() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path());

    let schema: serde_yaml::Mapping =
        serde_yaml::from_str("apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: app\n").unwrap();
    let archive = sealpack_engine::repackage(&[schema], "local/test:latest").unwrap();
    let path = temp.path().join("archive.tar");
    std::fs::write(&path, &archive.data).unwrap();

    let output = sealpack(&config, &["inspect", path.to_str().unwrap()]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("local/test:latest"));
    assert!(stdout.contains("ConfigMap/app (v1)"));

    let output = sealpack(&config, &["inspect", "--raw", path.to_str().unwrap()]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("kind: ConfigMap"));
}

#[test]
fn test_process_rejects_malformed_event() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path());
    let event = temp.path().join("event.json");
    std::fs::write(&event, r#"{"encryptedReference": "", "encryptedKey": "x", "target": "a"}"#)
        .unwrap();

    let output = sealpack(&config, &["process", event.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("encryptedReference"));
}

#[test]
fn test_missing_archive_is_io_error() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path());
    let output = sealpack(
        &config,
        &["inspect", temp.path().join("missing.tar").to_str().unwrap()],
    );
    assert_eq!(output.status.code(), Some(5));
}
