//! CLI tests for `dirconv` commands.
//!
//! Spawns the binary and verifies stdout lines and exit codes.

#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use dirconv::exit_codes;
use dirconv::io::config::{CONFIG_FILE_NAME, write_config};
use dirconv::test_support::TestRoot;

const TXT_TO_EPUB: &str = "#!/bin/sh\nfor f in *.txt; do cp \"$f\" \"${f%.txt}.epub\"; done\n";

fn dirconv(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_dirconv"))
        .current_dir(root)
        .args(args)
        .output()
        .expect("run dirconv")
}

fn configured_root() -> TestRoot {
    let root = TestRoot::new().expect("root");
    fs::write(root.path().join(TestRoot::HELPER), TXT_TO_EPUB).expect("write helper");
    write_config(&root.path().join(CONFIG_FILE_NAME), &root.config()).expect("write config");
    root
}

#[test]
fn run_collects_outputs_and_exits_ok() {
    let root = configured_root();
    root.add_book("alpha").expect("book");
    root.add_book("beta").expect("book");

    let output = dirconv(root.path(), &["run"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert_eq!(output.status.code(), Some(exit_codes::OK), "stdout: {stdout}");
    assert!(stdout.contains("converted alpha -> alpha.epub"));
    assert!(stdout.contains("converted beta -> beta.epub"));
    assert!(stdout.contains("converted=2 skipped=0 failed=0 outputs=2"));
    assert!(root.path().join("alpha.epub").is_file());
    assert!(root.path().join("beta.epub").is_file());
}

#[test]
fn run_with_existing_output_exits_partial_unless_overwrite() {
    let root = configured_root();
    root.add_book("alpha").expect("book");
    fs::write(root.path().join("alpha.epub"), "stale").expect("write");

    let output = dirconv(root.path(), &["run"]);
    assert_eq!(output.status.code(), Some(exit_codes::PARTIAL));
    assert_eq!(
        fs::read_to_string(root.path().join("alpha.epub")).expect("read"),
        "stale"
    );

    let output = dirconv(root.path(), &["run", "--overwrite"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(
        fs::read_to_string(root.path().join("alpha.epub")).expect("read"),
        "alpha text\n"
    );
}

#[test]
fn plan_lists_ready_and_skipped_directories() {
    let root = configured_root();
    root.add_book("alpha").expect("book");
    fs::create_dir(root.dir("scans")).expect("mkdir");

    let output = dirconv(root.path(), &["plan"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(stdout.contains("ready alpha\n"));
    assert!(stdout.contains("skip scans (missing input *.txt)\n"));
    assert!(stdout.contains("plan: ready=1 skipped=1 failed=0\n"));
    assert!(!root.path().join(".dirconv").exists(), "plan must not write state");
}

#[test]
fn run_without_ready_directories_exits_empty() {
    let root = configured_root();

    let output = dirconv(root.path(), &["run"]);
    assert_eq!(output.status.code(), Some(exit_codes::EMPTY));
}

#[test]
fn missing_helper_exits_invalid() {
    let root = configured_root();
    root.add_book("alpha").expect("book");
    fs::remove_file(root.path().join(TestRoot::HELPER)).expect("remove helper");

    let output = dirconv(root.path(), &["run"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(stderr.contains("missing helper"));
}

#[test]
fn init_writes_config_once() {
    let temp = tempfile::tempdir().expect("tempdir");

    let output = dirconv(temp.path(), &["init"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(temp.path().join(CONFIG_FILE_NAME).is_file());

    let output = dirconv(temp.path(), &["init"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));

    let output = dirconv(temp.path(), &["init", "--force"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
}
