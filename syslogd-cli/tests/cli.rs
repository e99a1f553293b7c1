use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;

fn syslogd() -> Command {
    cargo_bin_cmd!("syslogd")
}

#[test]
fn help_documents_dir_flag_and_default() {
    syslogd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--dir <PATH>"))
        .stdout(predicate::str::contains("/var/log/syslogd"));
}

#[test]
fn version_is_reported() {
    syslogd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn unknown_flag_exits_non_zero() {
    syslogd()
        .arg("--port")
        .arg("5514")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unexpected argument"));
}

#[test]
fn dir_flag_requires_a_value() {
    syslogd().arg("-dir").assert().failure();
}
