//! Behavioural smoke tests for the binaries.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::str::contains;
use rstest::rstest;
use tempfile::TempDir;

/// Command isolated from any ambient Scaleway configuration.
fn isolated(mut cmd: Command, home: &TempDir) -> Command {
    for var in [
        "SCW_ACCESS_KEY",
        "SCW_SECRET_KEY",
        "SCW_DEFAULT_PROJECT_ID",
        "SCW_DEFAULT_ORGANIZATION_ID",
        "SCW_DEFAULT_ZONE",
        "SCW_DEFAULT_REGION",
        "SCW_INSTANCE_TEST_RUN_ID",
    ] {
        cmd.env_remove(var);
    }
    cmd.env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path())
        .current_dir(home.path());
    cmd
}

#[rstest]
fn help_lists_the_actions() {
    cargo_bin_cmd!("scw-instance")
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("server-action"))
        .stdout(contains("create-snapshot"))
        .stdout(contains("user-data"));
}

#[rstest]
fn list_needs_no_credentials() {
    let home = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));

    isolated(cargo_bin_cmd!("scw-instance"), &home)
        .arg("list")
        .assert()
        .success()
        .stdout(contains("resource scaleway_instance_server\n"))
        .stdout(contains("data_source scaleway_instance_server_type\n"))
        .stdout(contains("action scaleway_instance_server_reboot\n"));
}

#[rstest]
fn actions_fail_without_credentials() {
    let home = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));

    isolated(cargo_bin_cmd!("scw-instance"), &home)
        .args([
            "server-reboot",
            "--server-id",
            "fr-par-1/11111111-1111-4111-8111-111111111111",
        ])
        .assert()
        .failure()
        .stdout("")
        .stderr(contains("configuration error"));
}

#[rstest]
fn sweeper_requires_a_project() {
    let home = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));

    isolated(cargo_bin_cmd!("scw-instance-sweeper"), &home)
        .args(["--test-run-id", "r1"])
        .assert()
        .failure()
        .stderr(contains("--project-id"));
}
