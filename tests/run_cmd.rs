use assert_cmd::Command;
use predicates::prelude::*;
use std::time::Duration;

fn cargo_bin() -> Command {
    Command::cargo_bin("pbrain").unwrap()
}

#[test]
fn run_prints_program_output() {
    cargo_bin()
        .timeout(Duration::from_secs(5))
        .args(["run", "+++++++[>++++++++<-]>++."])
        .assert()
        .success()
        .stdout(predicate::str::starts_with(":"));
}

#[test]
fn run_echoes_buffered_stdin() {
    cargo_bin()
        .timeout(Duration::from_secs(5))
        .args(["run", "--stdin", "Hi", ",.,."])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Hi"));
}

#[test]
fn runtime_fault_prints_an_operator_trace() {
    cargo_bin()
        .timeout(Duration::from_secs(5))
        .args(["run", "<"])
        .assert()
        .failure()
        .code(1)
        .stderr(
            predicate::str::contains("Runtime error")
                .and(predicate::str::contains("Operator trace")),
        );
}

#[test]
fn strict_mode_rejects_decrementing_zero() {
    cargo_bin()
        .timeout(Duration::from_secs(5))
        .args(["run", "+--"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("decremented"));
}

#[test]
fn wrap_mode_allows_decrementing_zero() {
    cargo_bin()
        .timeout(Duration::from_secs(5))
        .args(["run", "--wrap", "+--"])
        .assert()
        .success();
}

#[test]
fn runaway_loop_is_aborted_by_the_timeout() {
    cargo_bin()
        .timeout(Duration::from_secs(10))
        .args(["run", "--timeout", "200", "+[+-]"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("aborted"));
}

#[test]
fn syntax_error_exits_with_usage_code() {
    cargo_bin()
        .timeout(Duration::from_secs(5))
        .args(["run", "]"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Syntax error"));
}
