//! End-to-end CLI tests.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn glot() -> Command {
    Command::cargo_bin("glot").unwrap()
}

fn write_plugin(base: &std::path::Path, name: &str, body: &str) {
    let dir = base.join("plugins").join(name);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(format!("{name}.gplugin")), body).unwrap();
}

fn write_module(base: &std::path::Path, name: &str, body: &str) {
    let dir = base.join("modules").join(name);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(format!("{name}.gmodule")), body).unwrap();
}

#[test]
fn help_lists_subcommands() {
    glot()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("install"))
        .stdout(predicate::str::contains("snapshot"))
        .stdout(predicate::str::contains("uninstall"));
}

#[test]
fn list_on_empty_directory_succeeds() {
    let tmp = TempDir::new().unwrap();
    glot()
        .args(["--base-dir"])
        .arg(tmp.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No packages installed"));
}

#[test]
fn list_shows_installed_packages() {
    let tmp = TempDir::new().unwrap();
    write_module(tmp.path(), "lua", r#"{ "version": 2, "language": "lua" }"#);
    write_plugin(
        tmp.path(),
        "hello",
        r#"{ "version": 1, "languageModule": { "name": "lua" } }"#,
    );

    glot()
        .args(["--base-dir"])
        .arg(tmp.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("hello"))
        .stdout(predicate::str::contains("lua"));
}

#[test]
fn snapshot_writes_a_manifest() {
    let tmp = TempDir::new().unwrap();
    write_plugin(
        tmp.path(),
        "hello",
        r#"{ "version": 4, "languageModule": { "name": "lua" },
             "downloadURL": "https://mirror/hello.zip" }"#,
    );
    let out = tmp.path().join("snap.gmanifest");

    glot()
        .args(["--base-dir"])
        .arg(tmp.path())
        .arg("snapshot")
        .arg(&out)
        .arg("--pretty")
        .assert()
        .success();

    let body = fs::read_to_string(&out).unwrap();
    assert!(body.contains("\"hello\""));
    assert!(body.contains("\"version\": 4"));
}

#[test]
fn snapshot_with_wrong_extension_fails() {
    let tmp = TempDir::new().unwrap();
    write_plugin(
        tmp.path(),
        "hello",
        r#"{ "version": 1, "languageModule": { "name": "lua" } }"#,
    );

    glot()
        .args(["--base-dir"])
        .arg(tmp.path())
        .arg("snapshot")
        .arg(tmp.path().join("snap.json"))
        .assert()
        .failure();
}

#[test]
fn uninstall_removes_the_package_directory() {
    let tmp = TempDir::new().unwrap();
    write_plugin(
        tmp.path(),
        "gone",
        r#"{ "version": 1, "languageModule": { "name": "lua" } }"#,
    );

    glot()
        .args(["--base-dir"])
        .arg(tmp.path())
        .arg("uninstall")
        .arg("gone")
        .assert()
        .success();

    assert!(!tmp.path().join("plugins").join("gone").exists());
}

#[test]
fn uninstall_unknown_package_fails() {
    let tmp = TempDir::new().unwrap();
    glot()
        .args(["--base-dir"])
        .arg(tmp.path())
        .arg("uninstall")
        .arg("never-installed")
        .assert()
        .failure();
}

#[test]
fn install_without_arguments_fails() {
    let tmp = TempDir::new().unwrap();
    glot()
        .args(["--base-dir"])
        .arg(tmp.path())
        .arg("install")
        .assert()
        .failure();
}
