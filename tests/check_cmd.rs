use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use std::time::Duration;

fn cargo_bin() -> Command {
    Command::cargo_bin("pbrain").unwrap()
}

#[test]
fn check_reports_the_operator_count() {
    cargo_bin()
        .timeout(Duration::from_secs(5))
        .args(["check", "+++[-] decrement loop"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Syntax OK: 6 operators"));
}

#[test]
fn check_reports_unbalanced_bracket_with_offset() {
    cargo_bin()
        .timeout(Duration::from_secs(5))
        .args(["check", "]"])
        .assert()
        .failure()
        .code(2)
        .stderr(
            predicate::str::contains("unbalanced ']'").and(predicate::str::contains("offset 0")),
        );
}

#[test]
fn check_reports_unclosed_function_definition() {
    cargo_bin()
        .timeout(Duration::from_secs(5))
        .args(["check", "(+"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("unclosed '('"));
}

#[test]
fn check_validates_a_script_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "+[ a loop that never closes").unwrap();

    cargo_bin()
        .timeout(Duration::from_secs(5))
        .args(["check", "--file", file.path().to_str().unwrap()])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("unclosed '['"));
}
