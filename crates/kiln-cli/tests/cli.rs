//! End-to-end tests of the `kiln` binary.

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn write(root: &Path, path: &str, content: &str) {
    let path = root.join(path);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn kiln() -> Command {
    let mut cmd = Command::cargo_bin("kiln").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd
}

fn project() -> TempDir {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write(root, "src/a.js", "module.exports = 'a';");
    write(root, "src/b.js", "module.exports = require('./a');");
    write(root, "src/c.css", ".c { color: red; }");
    temp
}

#[test]
fn help_lists_build() {
    kiln()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("build"))
        .stdout(predicate::str::contains("__worker").not());
}

#[test]
fn build_with_worker_processes() {
    let temp = project();
    kiln()
        .args(["--no-color", "build", "--workers", "2", "--cwd"])
        .arg(temp.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("build finished"));

    let dist = temp.path().join("dist");
    assert_eq!(fs::read_to_string(dist.join("a.js")).unwrap(), "module.exports = 'a';");
    assert!(fs::read_to_string(dist.join("b.js")).unwrap().contains("require('./a.js')"));
    assert!(dist.join("c.wxss").is_file());
}

#[test]
fn second_build_is_served_from_cache() {
    let temp = project();
    kiln()
        .args(["--no-color", "build", "--inline-workers", "--cwd"])
        .arg(temp.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("0 from cache"));
    kiln()
        .args(["--no-color", "build", "--inline-workers", "--cwd"])
        .arg(temp.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("2 from cache"));
}

#[test]
fn compile_failure_exits_nonzero() {
    let temp = project();
    write(temp.path(), "src/d.js", "require('not-installed');");
    kiln()
        .args(["--no-color", "build", "--cwd"])
        .arg(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("not-installed"));
}

#[test]
fn missing_project_root() {
    kiln()
        .args(["build", "--cwd", "/definitely/not/a/project"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Directory not found"));
}

#[test]
fn quiet_hides_progress() {
    let temp = project();
    kiln()
        .args(["--quiet", "build", "--inline-workers", "--cwd"])
        .arg(temp.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("build finished").not());
}
