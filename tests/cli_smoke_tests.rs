//! CLI smoke tests - verify basic command-line interface functionality
//!
//! These tests run the actual compiled binary to ensure:
//! - Help and version flags work
//! - Commands parse correctly
//! - Error messages are helpful

use std::fs;
use std::process::Command;

/// Helper to get the path to the compiled posterwall binary
fn posterwall_bin() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_posterwall"));
    // Keep the user's config and PID file out of the way
    command.env("XDG_CONFIG_HOME", "/nonexistent-posterwall-test");
    command.env_remove("RUST_LOG");
    command
}

#[test]
fn cli_help_works() {
    let output = posterwall_bin()
        .arg("--help")
        .output()
        .expect("Failed to run posterwall --help");

    assert!(output.status.success(), "posterwall --help should exit successfully");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage"), "Help should show usage");
    for command in ["run", "download", "list", "validate", "display", "except-on"] {
        assert!(stdout.contains(command), "Help should list {command} command");
    }
}

#[test]
fn cli_version_works() {
    let output = posterwall_bin()
        .arg("--version")
        .output()
        .expect("Failed to run posterwall --version");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("posterwall"), "Version should mention posterwall");
    assert!(
        stdout.split_whitespace().count() >= 2,
        "Version should show name and version number"
    );
}

#[test]
fn cli_validate_prints_summary() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    fs::write(&config, "[kiosk]\nauto_page_switch = 12\n").unwrap();

    let output = posterwall_bin()
        .arg("validate")
        .arg("--config")
        .arg(&config)
        .output()
        .expect("Failed to run posterwall validate");

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Configuration valid"));
    assert!(stdout.contains("12s"), "override of the default interval shown: {stdout}");
}

#[test]
fn cli_validate_rejects_bad_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    fs::write(&config, "[kiosk]\nlog_level = \"loud\"\n").unwrap();

    let output = posterwall_bin()
        .args(["validate", "--config"])
        .arg(&config)
        .output()
        .expect("Failed to run posterwall validate");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("log_level"), "Error should name the field: {stderr}");
}

#[test]
fn cli_list_shows_indices() {
    let dir = tempfile::tempdir().unwrap();
    let pages = dir.path().join("pages");
    fs::create_dir(&pages).unwrap();
    fs::write(pages.join("a.pdf"), b"%PDF").unwrap();
    fs::write(pages.join("b.pdf"), b"%PDF").unwrap();

    // `echo` answers "query filetype <path>", which no rule matches
    let config = dir.path().join("config.toml");
    fs::write(
        &config,
        format!(
            "[kiosk]\npage_directory = \"{}\"\n[viewers]\nmime_query = \"echo\"\n",
            pages.display()
        ),
    )
    .unwrap();

    let output = posterwall_bin()
        .args(["list", "--config"])
        .arg(&config)
        .output()
        .expect("Failed to run posterwall list");

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("POSTERS"));
    assert!(stdout.contains("(none)"));
}

#[test]
fn cli_run_without_wayfire_fails_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    fs::write(
        &config,
        format!(
            "[kiosk]\ncache = \"{0}/cache\"\npage_directory = \"{0}/empty\"\n",
            dir.path().display()
        ),
    )
    .unwrap();
    fs::create_dir(dir.path().join("empty")).unwrap();

    let output = posterwall_bin()
        .args(["run", "--config"])
        .arg(&config)
        .env("XDG_RUNTIME_DIR", dir.path())
        .env_remove("WAYFIRE_SOCKET")
        .output()
        .expect("Failed to run posterwall run");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No displayable posters"), "{stderr}");
    assert!(!dir.path().join("posterwall.pid").exists(), "PID file removed on exit");
}

#[test]
fn cli_except_on_propagates_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let holidays = dir.path().join("holidays.txt");
    fs::write(&holidays, "# none today\n1999-01-01\n").unwrap();

    let status = posterwall_bin()
        .args(["except-on", "--holidays"])
        .arg(&holidays)
        .args(["--", "sh", "-c", "exit 7"])
        .status()
        .expect("Failed to run posterwall except-on");

    assert_eq!(status.code(), Some(7));
}

#[test]
fn cli_invalid_command_shows_error() {
    let output = posterwall_bin()
        .arg("nonexistent-command")
        .output()
        .expect("Failed to run posterwall with invalid command");

    assert!(!output.status.success(), "Invalid command should fail with non-zero exit");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("unrecognized") || stderr.contains("unexpected") || stderr.contains("error"),
        "Should show error for invalid command"
    );
}
