use std::path::Path;
use std::process::{Command, Output};

use crate::common::{assert_contains, init_test_logging};

/// Run the `dfk` binary against a config with one local worker rooted in
/// `dir`.
fn run_dfk(dir: &Path, args: &[&str]) -> Output {
    let config = dir.join("config.toml");
    std::fs::write(
        &config,
        format!(
            "[general]\nwork_root = \"{}\"\n\n[[workers]]\nname = \"local\"\nlabels = [\"test\"]\n",
            dir.join("work").display()
        ),
    )
    .expect("Failed to write config");

    Command::new(env!("CARGO_BIN_EXE_dfk"))
        .args(args)
        .current_dir(dir)
        .env("DFK_CONFIG", &config)
        .env_remove("DFK_LOG")
        .output()
        .expect("Failed to run dfk")
}

#[test]
fn test_dfk_help_includes_description() {
    init_test_logging();
    crate::test_log!("TEST START: test_dfk_help_includes_description");

    let output = Command::new(env!("CARGO_BIN_EXE_dfk"))
        .arg("--help")
        .output()
        .expect("Failed to run dfk --help");

    assert!(output.status.success(), "dfk --help failed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_contains(&stdout, "distfork");
    assert_contains(&stdout, "PORT:HOST:PORT");
    crate::test_log!("TEST PASS: test_dfk_help_includes_description");
}

#[test]
fn test_dfk_without_command_fails() {
    init_test_logging();
    let dir = tempfile::tempdir().unwrap();

    let output = run_dfk(dir.path(), &["-l", "test"]);

    assert_eq!(output.status.code(), Some(255));
    assert_contains(
        &String::from_utf8_lossy(&output.stderr),
        "No commands are specified",
    );
}

#[test]
fn test_dfk_relays_output_and_exit_status() {
    init_test_logging();
    crate::test_log!("TEST START: test_dfk_relays_output_and_exit_status");
    let dir = tempfile::tempdir().unwrap();

    let output = run_dfk(
        dir.path(),
        &["-l", "test", "-e", "WHO=world", "sh", "-c", "echo hello $WHO; exit 3"],
    );

    assert_eq!(output.status.code(), Some(3));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "hello world\n");
    assert_contains(&String::from_utf8_lossy(&output.stderr), "Executing on local");
    crate::test_log!("TEST PASS: test_dfk_relays_output_and_exit_status");
}

#[test]
fn test_dfk_unknown_label() {
    init_test_logging();
    let dir = tempfile::tempdir().unwrap();

    let output = run_dfk(dir.path(), &["-l", "nowhere", "true"]);

    assert_eq!(output.status.code(), Some(255));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_contains(&stderr, "No such label: nowhere");
    assert_contains(&stderr, "DFK-E102");
}

#[test]
fn test_dfk_copies_files_in_and_out() {
    init_test_logging();
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("input.txt"), "abc").unwrap();

    let output = run_dfk(
        dir.path(),
        &[
            "-f",
            "input.txt",
            "-F",
            "output.txt",
            "sh",
            "-c",
            "tr abc ABC < input.txt > output.txt",
        ],
    );

    assert_eq!(output.status.code(), Some(0), "{:?}", output);
    let shouted = std::fs::read_to_string(dir.path().join("output.txt")).unwrap();
    assert_eq!(shouted, "ABC");
}
