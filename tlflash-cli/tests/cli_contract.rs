//! Integration tests for core CLI contract behavior.

use {predicates::prelude::*, std::fs, tempfile::tempdir};

/// A serial device path that cannot exist.
const MISSING_PORT: &str = "/nonexistent/tlflash-test-port";

fn cli_cmd() -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("tlflash");
    cmd.env_remove("TLFLASH_PORT")
        .env_remove("TLFLASH_BAUD")
        .env_remove("TLFLASH_RESET");
    cmd
}

#[test]
fn help_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("tlflash"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn version_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("tlflash"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn help_lists_every_subcommand() {
    let mut cmd = cli_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("write-flash")
                .and(predicate::str::contains("read-flash"))
                .and(predicate::str::contains("erase-flash"))
                .and(predicate::str::contains("chip-info"))
                .and(predicate::str::contains("list-ports")),
        );
}

#[test]
fn help_includes_usage_examples() {
    let mut cmd = cli_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage").and(predicate::str::contains("Examples")));
}

// ============================================================================
// Exit Code Tests
// ============================================================================

/// Exit code 0: successful operations
#[test]
fn exit_code_zero_on_success() {
    let mut cmd = cli_cmd();
    cmd.args(["completions", "bash"])
        .assert()
        .success()
        .code(0);
}

/// Exit code 2: usage error (unknown command, invalid arguments)
#[test]
fn exit_code_two_for_unknown_command() {
    let mut cmd = cli_cmd();
    cmd.arg("unknown-command-xyz")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("unrecognized").or(predicate::str::contains("unknown")));
}

#[test]
fn exit_code_two_for_invalid_flag() {
    let mut cmd = cli_cmd();
    cmd.arg("--invalid-flag-xyz")
        .assert()
        .failure()
        .code(2);
}

#[test]
fn exit_code_two_for_missing_argument() {
    let mut cmd = cli_cmd();
    cmd.args(["read-flash", "0x1000"])
        .assert()
        .failure()
        .code(2)
        .stdout(predicate::str::is_empty());
}

#[test]
fn exit_code_two_for_bad_number() {
    let mut cmd = cli_cmd();
    cmd.args(["erase-flash", "0xNOPE", "1"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("invalid number"));
}

#[test]
fn exit_code_two_for_sector_count_out_of_range() {
    // Rejected before any port is touched
    let mut cmd = cli_cmd();
    cmd.args(["-p", MISSING_PORT, "erase-flash", "0x78000", "0"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Sector count"));

    let mut cmd = cli_cmd();
    cmd.args(["-p", MISSING_PORT, "erase-flash", "0x78000", "256"])
        .assert()
        .failure()
        .code(2);
}

/// Exit code 3: configuration error
#[test]
fn exit_code_three_for_invalid_explicit_config() {
    let dir = tempdir().expect("tempdir should be created");
    let config = dir
        .path()
        .join("custom.toml");
    fs::write(&config, "invalid toml [[[").expect("write invalid config");

    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .arg("--config")
        .arg(&config)
        .arg("list-ports")
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("custom.toml"));
}

#[test]
fn invalid_local_config_only_warns() {
    let dir = tempdir().expect("tempdir should be created");
    fs::write(dir.path().join("tlflash.toml"), "invalid toml [[[").expect("write invalid config");

    let output = cli_cmd()
        .current_dir(dir.path())
        .arg("list-ports")
        .output()
        .expect("command should execute");

    assert!(
        output
            .status
            .success(),
        "command should succeed despite config warning"
    );
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("TOML"), "should warn about invalid TOML");
}

/// Exit code 4: serial port cannot be opened
#[test]
fn exit_code_four_for_missing_port() {
    let dir = tempdir().expect("tempdir should be created");

    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .args(["-p", MISSING_PORT, "erase-flash", "0x78000", "1"])
        .assert()
        .failure()
        .code(4)
        .stderr(predicate::str::contains(MISSING_PORT));
}

#[test]
fn port_from_environment_is_used() {
    let dir = tempdir().expect("tempdir should be created");

    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .env("TLFLASH_PORT", MISSING_PORT)
        .arg("chip-info")
        .assert()
        .code(4)
        .stderr(predicate::str::contains(MISSING_PORT));
}

#[test]
fn port_from_local_config_is_used() {
    let dir = tempdir().expect("tempdir should be created");
    fs::write(
        dir.path().join("tlflash.toml"),
        format!("[port.connection]\nserial = \"{MISSING_PORT}\"\n"),
    )
    .expect("write config");

    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .arg("chip-info")
        .assert()
        .code(4)
        .stderr(predicate::str::contains(MISSING_PORT));
}

#[test]
fn read_flash_without_device_creates_no_file() {
    let dir = tempdir().expect("tempdir should be created");
    let dump = dir
        .path()
        .join("dump.bin");

    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .args(["-p", MISSING_PORT, "read-flash", "0x0", "0x100"])
        .arg(&dump)
        .assert()
        .code(4);

    assert!(!dump.exists());
}

/// Exit code 1: generic runtime failure
#[test]
fn exit_code_one_for_missing_input_file() {
    let dir = tempdir().expect("tempdir should be created");
    let missing = dir
        .path()
        .join("does_not_exist.bin");

    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .args(["-p", MISSING_PORT, "write-flash", "0x0"])
        .arg(&missing)
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("does_not_exist.bin"));
}

// ============================================================================
// Suggestions and option terminator
// ============================================================================

#[test]
fn unknown_command_suggests_similar() {
    let mut cmd = cli_cmd();
    cmd.arg("erase-flsh")
        .assert()
        .failure()
        .stderr(predicate::str::contains("erase-flash"));
}

#[test]
fn unknown_flag_suggests_similar() {
    let mut cmd = cli_cmd();
    cmd.arg("list-ports")
        .arg("--jason")
        .assert()
        .failure()
        .stderr(predicate::str::contains("json"));
}

#[test]
fn option_terminator_allows_dash_prefixed_file() {
    let dir = tempdir().expect("tempdir should be created");

    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .args(["-p", MISSING_PORT, "write-flash", "--", "0x0", "-image.bin"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("-image.bin"));
}

// ============================================================================
// Output channel tests
// ============================================================================

#[test]
fn completions_command_writes_to_stdout() {
    let mut cmd = cli_cmd();
    cmd.args(["completions", "bash"])
        .assert()
        .success()
        .stderr(predicate::str::is_empty())
        .stdout(predicate::str::contains("_tlflash()"));
}

#[test]
fn list_ports_json_is_valid_json_without_extra_output() {
    let dir = tempdir().expect("tempdir should be created");

    let output = cli_cmd()
        .current_dir(dir.path())
        .args(["list-ports", "--json"])
        .output()
        .expect("command should execute");

    if output
        .status
        .success()
    {
        let stdout = String::from_utf8(output.stdout).expect("stdout should be utf-8");
        let parsed: serde_json::Value =
            serde_json::from_str(&stdout).expect("list-ports --json should print JSON");
        assert_eq!(parsed["ok"], serde_json::Value::Bool(true));
        assert!(parsed["data"]["ports"].is_array());
        assert!(
            output
                .stderr
                .is_empty(),
            "JSON output should not have stderr"
        );
    }
}

#[test]
fn chip_info_json_error_keeps_stdout_clean() {
    let dir = tempdir().expect("tempdir should be created");

    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .args(["-p", MISSING_PORT, "chip-info", "--json"])
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn colors_disabled_when_not_tty() {
    let dir = tempdir().expect("tempdir should be created");

    let output = cli_cmd()
        .current_dir(dir.path())
        .args(["-p", MISSING_PORT, "chip-info"])
        .output()
        .expect("command should execute");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        !stderr.contains("\x1b["),
        "Colors should be disabled in non-TTY mode"
    );
}
