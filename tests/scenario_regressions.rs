use std::io::Write;
use std::process::{Command, Stdio};

fn run_shell(lines: &[&str]) -> std::process::Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_cjsh"))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn cjsh");

    {
        let stdin = child.stdin.as_mut().expect("stdin");
        for line in lines {
            writeln!(stdin, "{line}").expect("write line");
        }
        writeln!(stdin, "exit").expect("write exit");
    }

    child.wait_with_output().expect("wait output")
}

// Scenario A — simple pipe and pipefail.
#[test]
fn pipefail_on_reports_failing_stage() {
    let output = run_shell(&["set -o pipefail", "false | true", "echo STATUS:$?"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("STATUS:1"), "stdout was: {stdout}");
}

#[test]
fn pipefail_off_reports_last_stage() {
    let output = run_shell(&["set +o pipefail", "false | true", "echo STATUS:$?"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("STATUS:0"), "stdout was: {stdout}");
}

// Scenario C — here-doc body fidelity with variable expansion.
#[test]
fn heredoc_expands_variables_and_preserves_body() {
    let output = run_shell(&["USER=alice", "cat <<EOF\nhello $USER\nEOF"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("hello alice"), "stdout was: {stdout}");
}

// Scenario E — command-not-found suggestion.
#[test]
fn typo_of_existing_builtin_is_suggested() {
    let output = run_shell(&["ehco hi"]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("command not found"), "stderr was: {stderr}");
    assert!(stderr.contains("Did you mean"), "stderr was: {stderr}");
    assert!(stderr.contains("echo"), "stderr was: {stderr}");
}

// Scenario F — errexit suppressed in an `if` condition, but fatal at top level.
#[test]
fn errexit_suppressed_inside_if_condition() {
    let output = run_shell(&["set -e", "if false; then :; fi", "echo ok"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("ok"), "stdout was: {stdout}");
    assert!(output.status.success(), "shell did not exit cleanly");
}

#[test]
fn errexit_aborts_at_top_level() {
    let output = run_shell(&["set -e", "false", "echo unreachable"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.contains("unreachable"), "stdout was: {stdout}");
}

// Invariant 2 — single-quoted text is never expanded.
#[test]
fn single_quotes_suppress_all_expansion() {
    let output = run_shell(&["HOME=/nonexistent", "echo '$HOME *{a,b}'"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("$HOME *{a,b}"), "stdout was: {stdout}");
}
