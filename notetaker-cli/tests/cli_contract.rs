//! Integration tests for core CLI contract behavior.

use {
    predicates::prelude::*,
    std::{fs, path::Path},
    tempfile::tempdir,
};

fn cli_cmd() -> assert_cmd::Command {
    assert_cmd::cargo::cargo_bin_cmd!("notetaker")
}

/// A command isolated from the user's config files and environment.
fn isolated_cmd(dir: &Path) -> assert_cmd::Command {
    let mut cmd = cli_cmd();
    cmd.current_dir(dir)
        .env("HOME", dir)
        .env("XDG_CONFIG_HOME", dir.join("config"))
        .env_remove("NOTETAKER_PRIMARY")
        .env_remove("NOTETAKER_SECONDARY")
        .env_remove("NOTETAKER_TIMEOUT_MS")
        .env_remove("NOTETAKER_NON_INTERACTIVE")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn help_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("notetaker"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn version_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("notetaker"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn subcommand_help_lists_options() {
    let mut cmd = cli_cmd();
    cmd.args(["download", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--force"));
}

#[test]
fn completions_bash_writes_script() {
    let mut cmd = cli_cmd();
    cmd.args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("_notetaker()"));
}

#[test]
fn list_devices_json_is_valid() {
    let dir = tempdir().expect("tempdir should be created");
    let output = isolated_cmd(dir.path())
        .args(["list-devices", "--json"])
        .output()
        .expect("command should execute");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let parsed: serde_json::Value =
        serde_json::from_str(&stdout).expect("stdout should be JSON");
    assert_eq!(parsed["ok"], true);
    assert!(parsed["data"]["interfaces"].is_array());
    assert!(parsed["data"]["devices"].is_array());
}

#[test]
fn invalid_local_config_warns_but_does_not_fail() {
    let dir = tempdir().expect("tempdir should be created");
    fs::write(dir.path().join("notetaker.toml"), "[device\nprimary = ").expect("write config");

    isolated_cmd(dir.path())
        .args(["list-devices", "--json"])
        .assert()
        .success()
        .stderr(predicate::str::contains("notetaker.toml"));
}

#[test]
fn info_json_error_keeps_stdout_clean() {
    let dir = tempdir().expect("tempdir should be created");
    isolated_cmd(dir.path())
        .args(["--primary", "missing0", "--secondary", "missing1", "info", "--json"])
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Error"));
}

// ============================================================================
// Exit codes
// ============================================================================

/// Exit code 2: usage errors
#[test]
fn exit_code_two_on_unknown_command() {
    let mut cmd = cli_cmd();
    cmd.arg("upload")
        .assert()
        .code(2);
}

#[test]
fn exit_code_two_when_download_output_missing() {
    let mut cmd = cli_cmd();
    cmd.arg("download")
        .assert()
        .code(2);
}

#[test]
fn exit_code_two_on_half_device_pair() {
    let dir = tempdir().expect("tempdir should be created");
    isolated_cmd(dir.path())
        .args(["--primary", "/dev/hidraw0", "info"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("secondary"));
}

#[test]
fn exit_code_two_on_zero_timeout() {
    let dir = tempdir().expect("tempdir should be created");
    isolated_cmd(dir.path())
        .args(["--timeout-ms", "0", "info"])
        .assert()
        .code(2);
}

#[test]
fn exit_code_two_on_non_interactive_delete_without_yes() {
    let dir = tempdir().expect("tempdir should be created");
    isolated_cmd(dir.path())
        .args(["--non-interactive", "delete"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--yes"));
}

#[test]
fn exit_code_two_when_download_would_overwrite() {
    let dir = tempdir().expect("tempdir should be created");
    fs::write(dir.path().join("notes.bin"), b"old").expect("write existing output");

    isolated_cmd(dir.path())
        .args(["download", "notes.bin"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--force"));

    let kept = fs::read(dir.path().join("notes.bin")).expect("read existing output");
    assert_eq!(kept, b"old");
}

/// Exit code 3: configuration errors
#[test]
fn exit_code_three_on_missing_config_file() {
    let dir = tempdir().expect("tempdir should be created");
    isolated_cmd(dir.path())
        .args(["--config", "absent.toml", "list-devices"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("absent.toml"));
}

#[test]
fn exit_code_three_on_invalid_config_file() {
    let dir = tempdir().expect("tempdir should be created");
    fs::write(dir.path().join("custom.toml"), "[transfer]\nread_timeout_ms = \"slow\"\n")
        .expect("write config");

    isolated_cmd(dir.path())
        .args(["--config", "custom.toml", "list-devices"])
        .assert()
        .code(3);
}

#[test]
fn exit_code_three_on_half_device_pair_in_config() {
    let dir = tempdir().expect("tempdir should be created");
    fs::write(dir.path().join("custom.toml"), "[device]\nprimary = \"/dev/hidraw0\"\n")
        .expect("write config");

    isolated_cmd(dir.path())
        .args(["--config", "custom.toml", "--non-interactive", "info"])
        .assert()
        .code(3);
}

#[test]
fn exit_code_three_on_zero_timeout_in_config() {
    let dir = tempdir().expect("tempdir should be created");
    fs::write(dir.path().join("custom.toml"), "[transfer]\nread_timeout_ms = 0\n")
        .expect("write config");

    isolated_cmd(dir.path())
        .args(["--config", "custom.toml", "info"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("read_timeout_ms"));
}

/// Exit code 4: device not found
#[cfg(target_os = "linux")]
#[test]
fn exit_code_four_on_missing_device_nodes() {
    let dir = tempdir().expect("tempdir should be created");
    let primary = dir
        .path()
        .join("hidraw-missing0");
    let secondary = dir
        .path()
        .join("hidraw-missing1");

    isolated_cmd(dir.path())
        .arg("--primary")
        .arg(&primary)
        .arg("--secondary")
        .arg(&secondary)
        .arg("info")
        .assert()
        .code(4)
        .stderr(predicate::str::contains("hidraw-missing0"));
}
