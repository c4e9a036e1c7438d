use std::fs;
use std::path::{Path, PathBuf};

use tempfile::tempdir;

#[allow(deprecated)]
fn cargo_bin() -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::cargo_bin("res_storage").expect("binary not built");
    cmd.env_remove("RES_STORAGE_PASSPHRASE");
    cmd
}

fn write_config(dir: &Path, passphrase: &str) -> PathBuf {
    let config = dir.join("res_storage.toml");
    let storage_dir = dir.join("rs").display().to_string();
    fs::write(
        &config,
        format!("storage_dir = {storage_dir:?}\npassphrase = {passphrase:?}\nhandler = \"encrypted\"\n"),
    )
    .unwrap();
    config
}

fn store(config: &Path, file: &Path) -> String {
    let assert = cargo_bin()
        .arg("--config")
        .arg(config)
        .arg("store")
        .arg(file)
        .assert()
        .success();
    String::from_utf8(assert.get_output().stdout.clone())
        .unwrap()
        .trim()
        .to_string()
}

#[test]
fn store_then_get_round_trips() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path(), "correct-key");
    let source = dir.path().join("report.txt");
    fs::write(&source, b"hello world  \n").unwrap();

    let id = store(&config, &source);
    assert_eq!(id.len(), 36);

    cargo_bin()
        .arg("--config")
        .arg(&config)
        .arg("get")
        .arg(&id)
        .assert()
        .success()
        .stdout("hello world  \n");

    let out = dir.path().join("out").join("copy.txt");
    cargo_bin()
        .arg("--config")
        .arg(&config)
        .arg("get")
        .arg(&id)
        .arg("--output")
        .arg(&out)
        .assert()
        .success();
    assert_eq!(fs::read(&out).unwrap(), b"hello world  \n");
}

#[test]
fn metadata_and_download_report_the_original_name() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path(), "correct-key");
    let source = dir.path().join("report.txt");
    fs::write(&source, b"hello world").unwrap();
    let id = store(&config, &source);

    let downloads = dir.path().join("downloads");
    let assert = cargo_bin()
        .arg("--config")
        .arg(&config)
        .arg("download")
        .arg(&id)
        .arg("--output-dir")
        .arg(&downloads)
        .assert()
        .success();
    let summary: serde_json::Value =
        serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(summary["mimetype"], "text/plain");
    assert_eq!(summary["bytes"], 11);
    assert_eq!(
        summary["content_disposition"],
        "attachment; filename=\"report.txt\""
    );
    assert_eq!(fs::read(downloads.join("report.txt")).unwrap(), b"hello world");

    let assert = cargo_bin()
        .arg("--config")
        .arg(&config)
        .arg("metadata")
        .arg(&id)
        .assert()
        .success();
    let record: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(record["id"], id.as_str());
    assert_eq!(record["filename"], "report.txt");
    assert_eq!(record["encrypted"], true);
    assert_eq!(record["access_count"], 1);
    assert!(record["last_accessed_at"].as_str().unwrap().ends_with('Z'));
}

#[test]
fn deleted_resource_is_gone() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path(), "correct-key");
    let source = dir.path().join("report.txt");
    fs::write(&source, b"hello world").unwrap();
    let id = store(&config, &source);

    cargo_bin()
        .arg("--config")
        .arg(&config)
        .arg("delete")
        .arg(&id)
        .assert()
        .success()
        .stdout(format!("{id} removed\n"));

    let assert = cargo_bin()
        .arg("--config")
        .arg(&config)
        .arg("get")
        .arg(&id)
        .assert()
        .failure();
    let stderr = String::from_utf8(assert.get_output().stderr.clone()).unwrap();
    assert!(stderr.contains("no matching record"), "{stderr}");

    cargo_bin()
        .arg("--config")
        .arg(&config)
        .arg("reconcile")
        .assert()
        .success();
}

#[test]
fn passphrase_can_come_from_the_environment() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path(), "");
    let source = dir.path().join("report.txt");
    fs::write(&source, b"hello world").unwrap();

    cargo_bin()
        .arg("--config")
        .arg(&config)
        .arg("store")
        .arg(&source)
        .assert()
        .failure();

    let assert = cargo_bin()
        .env("RES_STORAGE_PASSPHRASE", "from-env")
        .arg("--config")
        .arg(&config)
        .arg("store")
        .arg(&source)
        .assert()
        .success();
    let id = String::from_utf8(assert.get_output().stdout.clone()).unwrap();

    cargo_bin()
        .env("RES_STORAGE_PASSPHRASE", "from-env")
        .arg("--config")
        .arg(&config)
        .arg("get")
        .arg(id.trim())
        .assert()
        .success()
        .stdout("hello world");
}

#[test]
fn orphaned_blob_fails_reconcile_until_repaired() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path(), "correct-key");
    let source = dir.path().join("report.txt");
    fs::write(&source, b"hello world").unwrap();
    store(&config, &source);

    let orphan = dir
        .path()
        .join("rs/0b/ad/0badc0de-0000-4000-8000-000000000000");
    fs::create_dir_all(orphan.parent().unwrap()).unwrap();
    fs::write(&orphan, b"lost").unwrap();

    cargo_bin()
        .arg("--config")
        .arg(&config)
        .arg("reconcile")
        .assert()
        .failure();
    cargo_bin()
        .arg("--config")
        .arg(&config)
        .arg("reconcile")
        .arg("--repair")
        .assert()
        .success();
    assert!(!orphan.exists());
}
