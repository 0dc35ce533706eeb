//! Shared fixtures for staged-fs integration tests.

use assert_cmd::cargo::cargo_bin_cmd;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

pub const SAMPLE_DATA: &str = "abc";

/// Temp directory holding `sample.txt` with [`SAMPLE_DATA`].
#[allow(unused)]
pub fn sample_file() -> TempDir {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("sample.txt"), SAMPLE_DATA).unwrap();
    temp
}

/// Temp directory holding a small `site/` tree.
#[allow(unused)]
pub fn sample_tree() -> TempDir {
    let temp = TempDir::new().unwrap();
    let site = temp.path().join("site");
    fs::create_dir_all(site.join("assets")).unwrap();
    fs::write(site.join("index.html"), "<h1>old</h1>").unwrap();
    fs::write(site.join("assets/app.js"), "console.log(1)").unwrap();
    temp
}

/// Names of leftover staging entries directly under `dir`.
#[allow(unused)]
pub fn staging_leftovers(dir: &Path) -> Vec<String> {
    fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with(".staged-"))
        .collect()
}

/// Runs the `staged` binary inside `dir`.
#[allow(unused)]
pub fn run_staged(dir: &Path, args: &[&str], stdin: &str) -> assert_cmd::assert::Assert {
    let mut cmd = cargo_bin_cmd!("staged");
    cmd.args(args).current_dir(dir).write_stdin(stdin);
    cmd.assert()
}
