//! Integration tests for the `ctlprobe` binary.
//!
//! These exercise the binary via `assert_cmd`. Codec commands need no
//! hardware; device commands are checked for argument handling only.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

fn cli() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("ctlprobe");
    // Keep the user's real config file out of the tests.
    let dir = std::env::temp_dir().join("ctlprobe-cli-tests-missing");
    cmd.arg("--config").arg(dir.join("config.toml"));
    cmd
}

#[test]
fn cli_help_succeeds() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ctlprobe"));
}

#[test]
fn cli_version_prints_version() {
    cli()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

// ── decode / encode / known ──

#[test]
fn cli_decode_verbose_fixture() {
    cli()
        .args(["decode", "0x00070000"])
        .assert()
        .success()
        .stdout(predicate::str::contains("IOCTL Code: 0x00070000"))
        .stdout(predicate::str::contains(
            "Known Name: IOCTL_DISK_GET_DRIVE_GEOMETRY",
        ))
        .stdout(predicate::str::contains("  [13:2]  Function:    0x000"));
}

#[test]
fn cli_decode_compact_and_hex() {
    cli()
        .args(["decode", "--style", "compact", "0x70000"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "IOCTL_DISK_GET_DRIVE_GEOMETRY: DISK(function:0x0, method:BUFFERED, access:ANY)",
        ));
    cli()
        .args(["decode", "--style", "hex", "0x70000"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "0x00070000 [Device:0x0007 Access:0x0 Func:0x000 Method:0x0]",
        ));
}

#[test]
fn cli_decode_json_produces_valid_json() {
    let output = cli()
        .args(["--json", "decode", "0x2D1400", "0xFFFFFFFF"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let json: serde_json::Value =
        serde_json::from_slice(&output).expect("decode --json should produce valid JSON");
    let list = json.as_array().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["device_type_name"], "MASS_STORAGE");
    assert_eq!(list[0]["function"], 0x500);
    assert_eq!(list[0]["known_name"], "IOCTL_STORAGE_QUERY_PROPERTY");
    assert_eq!(list[1]["device_type_name"], "CUSTOM");
    assert!(list[1]["known_name"].is_null());
}

#[test]
fn cli_decode_rejects_bad_number() {
    cli()
        .args(["decode", "0xZZ"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn cli_encode_by_name() {
    cli()
        .args(["encode", "DISK", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0x00070000"));
}

#[test]
fn cli_encode_json() {
    let output = cli()
        .args([
            "--json", "encode", "0x22", "0x800", "--method", "NEITHER", "--access", "ANY",
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(json["code"], 0x0022_2003);
    assert_eq!(json["method"], "NEITHER");
}

#[test]
fn cli_encode_rejects_wide_function() {
    cli().args(["encode", "DISK", "0x1000"]).assert().failure();
}

#[test]
fn cli_known_lists_table() {
    cli()
        .arg("known")
        .assert()
        .success()
        .stdout(predicate::str::contains("IOCTL_VOLUME_GET_VOLUME_DISK_EXTENTS"));
}

// ── config ──

#[test]
fn cli_config_json_produces_valid_json() {
    let output = cli()
        .args(["--json", "config"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let json: serde_json::Value =
        serde_json::from_slice(&output).expect("config --json should produce valid JSON");
    assert!(json["settings"].is_object());
    assert_eq!(json["settings"]["input_len"], 16);
    assert_eq!(json["settings"]["output_len"], 256);
    assert_eq!(json["config_file_exists"], false);
}

#[test]
fn cli_config_reads_custom_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.toml");
    std::fs::write(&path, "device = \"PhysicalDrive3\"\nworkers = 2\n").unwrap();

    let output = cargo_bin_cmd!("ctlprobe")
        .arg("--config")
        .arg(&path)
        .args(["--json", "config"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(json["settings"]["device"], "PhysicalDrive3");
    assert_eq!(json["settings"]["workers"], 2);
    assert_eq!(json["config_file_exists"], true);
}

#[test]
fn cli_config_init_writes_file_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");

    cargo_bin_cmd!("ctlprobe")
        .arg("--config")
        .arg(&path)
        .args(["config", "--init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(loaded)"));
    assert!(path.exists());

    cargo_bin_cmd!("ctlprobe")
        .arg("--config")
        .arg(&path)
        .args(["config", "--init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

// ── --verbose flag ──

#[test]
fn cli_verbose_flag_accepted() {
    cli().args(["-v", "config"]).assert().success();
}

#[test]
fn cli_verbose_long_flag_accepted() {
    cli().args(["--verbose", "known"]).assert().success();
}

// ── Device commands ──

#[test]
fn cli_probe_without_device_fails() {
    cli()
        .args(["probe", "0x70000"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no device given"));
}

#[test]
fn cli_discover_rejects_bad_range() {
    cli()
        .args(["discover", "DISK", "--device", "C:", "--range", "0x900-0x800"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("start is after end"));
}

#[test]
fn cli_scan_help_succeeds() {
    cli()
        .args(["scan", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("inclusive"));
}

#[test]
fn cli_driver_help_succeeds() {
    cli()
        .args(["driver", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("load"));
}

#[cfg(not(windows))]
#[test]
fn cli_probe_reports_unsupported_platform() {
    cli()
        .args(["probe", "0x70000", "--device", "PhysicalDrive0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("requires Windows"));
}
