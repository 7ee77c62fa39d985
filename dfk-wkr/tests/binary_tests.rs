//! Tests of the `dfk-wkr` binary itself.

use std::path::Path;
use std::process::{Command, Output, Stdio};

fn run_worker(dir: &Path, args: &[&str], log_file: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_dfk-wkr"))
        .args(args)
        .current_dir(dir)
        .env("DFK_LOG", "info")
        .env("DFK_LOG_FILE", log_file)
        .stdin(Stdio::null())
        .output()
        .expect("Failed to run dfk-wkr")
}

/// Contents of every rolled file starting with `prefix` in `dir`.
fn log_contents(dir: &Path, prefix: &str) -> String {
    let mut out = String::new();
    for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        let rolled = path
            .file_name()
            .is_some_and(|n| n.to_string_lossy().starts_with(prefix));
        if rolled {
            out.push_str(&std::fs::read_to_string(&path).unwrap());
        }
    }
    out
}

#[test]
fn test_health_prints_ok() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_worker(dir.path(), &["health"], &dir.path().join("logs/wkr.log"));
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "OK\n");
}

#[test]
fn test_run_exits_with_command_status_and_flushes_log_file() {
    let dir = tempfile::tempdir().unwrap();
    let logs = dir.path().join("logs");
    let plan = r#"{"command": ["sh", "-c", "echo relayed; exit 2"]}"#;
    let root = dir.path().join("work");

    let output = run_worker(
        dir.path(),
        &[
            "run",
            "--plan",
            plan,
            "--root",
            root.to_str().unwrap(),
            "--name",
            "bin-test",
        ],
        &logs.join("wkr.log"),
    );

    assert_eq!(output.status.code(), Some(2), "{:?}", output);
    assert_eq!(String::from_utf8_lossy(&output.stdout), "relayed\n");
    assert!(String::from_utf8_lossy(&output.stderr).contains("Executing on bin-test"));

    let logged = log_contents(&logs, "wkr.log");
    assert!(
        logged.contains("Launching sh -c"),
        "log file missing launch line: {logged:?}"
    );
}
