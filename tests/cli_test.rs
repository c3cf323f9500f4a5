#![cfg(feature = "cli")]

use lsm_logger::utils::validation::Validate;
use lsm_logger::AppConfig;
use std::io::Write;
use std::process::Command;
use tempfile::NamedTempFile;

#[test]
fn test_list_ports_works_with_a_config_that_fails_validation() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        "[[classification.rules]]\nlabel = \"X\"\nlower = 3.0\nupper = 1.0"
    )
    .unwrap();
    assert!(AppConfig::from_file(file.path()).unwrap().validate().is_err());

    let output = Command::new(env!("CARGO_BIN_EXE_lsm-logger"))
        .arg("--config")
        .arg(file.path())
        .args(["--simulate", "--list-ports"])
        .output()
        .unwrap();

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout.contains("* SIM0"), "stdout: {}", stdout);
}

#[test]
fn test_invalid_config_still_fails_a_logging_run() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[serial]\nbaud_rate = 0").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_lsm-logger"))
        .arg("--config")
        .arg(file.path())
        .arg("--simulate")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
}
