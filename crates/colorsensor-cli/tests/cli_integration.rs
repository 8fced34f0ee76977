//! CLI Integration Tests
//!
//! These tests run the colorsensor binary against a temporary config file.
//! None of them touch Bluetooth hardware.
//!
//! ```text
//! cargo test --package colorsensor-cli --test cli_integration
//! ```

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

/// Run colorsensor with `config` as its config file
fn run(config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_colorsensor"))
        .arg("--config")
        .arg(config)
        .args(args)
        .env_remove("COLORSENSOR_CONFIG")
        .env("NO_COLOR", "1")
        .output()
        .expect("Failed to run colorsensor binary")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_lists_commands() {
    let output = Command::new(env!("CARGO_BIN_EXE_colorsensor"))
        .arg("--help")
        .output()
        .expect("Failed to run colorsensor binary");

    assert!(output.status.success(), "Help should succeed");
    let stdout = stdout(&output);
    for command in ["list", "add", "remove", "watch"] {
        assert!(stdout.contains(command), "Help should list {command}");
    }
}

#[test]
fn test_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_colorsensor"))
        .arg("--version")
        .output()
        .expect("Failed to run colorsensor binary");

    assert!(output.status.success());
    assert!(stdout(&output).contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_watch_help_lists_options() {
    let output = Command::new(env!("CARGO_BIN_EXE_colorsensor"))
        .args(["watch", "--help"])
        .output()
        .expect("Failed to run colorsensor binary");

    let stdout = stdout(&output);
    for option in ["--sensor", "--stagger-ms", "--timeout", "--count", "--format"] {
        assert!(stdout.contains(option), "watch help should list {option}");
    }
}

// =============================================================================
// Directory Tests
// =============================================================================

#[test]
fn test_list_empty_directory() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.toml");

    let output = run(&config, &["list"]);

    assert!(output.status.success());
    assert!(stdout(&output).contains("No sensors registered"));
}

#[test]
fn test_add_list_remove() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.toml");

    assert!(run(&config, &["add", "S2"]).status.success());
    let output = run(&config, &["add", "S1"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("Added sensor 'S1'"));

    let output = run(&config, &["add", "S1"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("already registered"));

    let output = run(&config, &["list"]);
    assert_eq!(stdout(&output), "S1\nS2\n");

    let output = run(&config, &["remove", "S1"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("Removed sensor 'S1'"));

    let output = run(&config, &["list"]);
    assert_eq!(stdout(&output), "S2\n");

    let saved = std::fs::read_to_string(&config).unwrap();
    assert!(saved.contains("S2"));
    assert!(!saved.contains("S1"));
}

#[test]
fn test_add_empty_name_fails() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.toml");

    let output = run(&config, &["add", ""]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("must not be empty"));
    assert!(!config.exists());
}

#[test]
fn test_remove_unknown_fails() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.toml");

    let output = run(&config, &["remove", "S9"]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("not registered"));
}

#[test]
fn test_add_keeps_malformed_config_intact() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.toml");
    let original = "sensors = [\"Kitchen\", \"Desk\"]\nstagger_ms = \"oops\"\n";
    std::fs::write(&config, original).unwrap();

    let output = run(&config, &["add", "Garage"]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("Refusing to modify"));
    assert_eq!(std::fs::read_to_string(&config).unwrap(), original);
}

#[test]
fn test_list_warns_on_malformed_config() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.toml");
    std::fs::write(&config, "sensors = 42").unwrap();

    let output = run(&config, &["list"]);

    assert!(output.status.success());
    assert!(stderr(&output).contains("Failed to parse config"));
}

#[test]
fn test_quiet_add_prints_nothing() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.toml");

    let output = run(&config, &["--quiet", "add", "S1"]);

    assert!(output.status.success());
    assert!(stdout(&output).is_empty());
}

#[test]
fn test_config_from_env() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("env.toml");

    let output = Command::new(env!("CARGO_BIN_EXE_colorsensor"))
        .args(["add", "S1"])
        .env("COLORSENSOR_CONFIG", &config)
        .output()
        .expect("Failed to run colorsensor binary");

    assert!(output.status.success());
    assert!(config.exists());
}

// =============================================================================
// Watch Tests
// =============================================================================

#[test]
fn test_watch_empty_directory_prints_hint() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.toml");

    let output = run(&config, &["watch"]);

    assert!(output.status.success());
    let stdout = stdout(&output);
    assert!(stdout.contains("No sensors to watch"));
    assert!(stdout.contains("colorsensor add"));
}

#[test]
fn test_watch_rejects_bad_format() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.toml");

    let output = run(&config, &["watch", "--format", "csv"]);

    assert!(!output.status.success());
}
