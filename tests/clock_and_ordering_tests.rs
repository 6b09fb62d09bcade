//! Clock alignment and ordering anomalies through the CLI
#![allow(deprecated)] // suppress assert_cmd::Command::cargo_bin deprecation in tests

mod utils;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;
use utils::*;

fn mavmerge() -> Command {
    Command::cargo_bin("mavmerge").unwrap()
}

fn telemetry_with_boot_times(dir: &TempDir) -> std::path::PathBuf {
    write_log(
        dir.path(),
        "tlog.jsonl",
        None,
        &[
            tlog(1010.0, "SYSTEM_TIME", (1, 1), json!({"time_boot_ms": 10_000})),
            tlog(1025.0, "SYSTEM_TIME", (1, 1), json!({"time_boot_ms": 20_000})),
            tlog(1032.0, "SYSTEM_TIME", (1, 1), json!({"time_boot_ms": 30_000})),
        ],
    )
}

#[test]
fn test_boot_relative_log_is_shifted() {
    let dir = TempDir::new().unwrap();
    let tlog_path = telemetry_with_boot_times(&dir);
    let bin = write_log(
        dir.path(),
        "bin.jsonl",
        Some(boot_relative_header()),
        &[local(15.0, "ATT", json!({"Roll": 1.5}))],
    );
    let report = dir.path().join("report.json");

    mavmerge()
        .arg("--align-clocks")
        .arg("--types")
        .arg("SYSTEM_TIME,ATT")
        .arg("--report")
        .arg(&report)
        .arg(&tlog_path)
        .arg(&bin)
        .assert()
        .success()
        .stderr(predicate::str::contains("Clock: offset 1000.000s from 3 samples"));

    let (header, rows) = read_csv(&dir.path().join("tlog.csv"));
    assert_eq!(
        column(&header, &rows, "timestamp"),
        vec!["1010", "1015", "1025", "1032"]
    );
    assert_eq!(column(&header, &rows, "ATT.Roll"), vec!["", "1.5", "1.5", "1.5"]);

    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!(value["summary"]["clock"]["status"], "aligned");
    assert_eq!(value["summary"]["clock"]["detail"]["offset"], 1000.0);
}

#[test]
fn test_align_prefix_limits_scan() {
    let dir = TempDir::new().unwrap();
    let tlog_path = write_log(
        dir.path(),
        "tlog.jsonl",
        None,
        &[
            tlog(1010.0, "SYSTEM_TIME", (1, 1), json!({"time_boot_ms": 10_000})),
            tlog(1020.0, "SYSTEM_TIME", (1, 1), json!({"time_boot_ms": 30_000})),
        ],
    );
    let bin = write_log(
        dir.path(),
        "bin.jsonl",
        Some(boot_relative_header()),
        &[local(1.0, "ATT", json!({"Roll": 0}))],
    );

    mavmerge()
        .arg("--align-clocks")
        .arg("--align-prefix")
        .arg("1")
        .arg(&tlog_path)
        .arg(&bin)
        .assert()
        .success()
        .stderr(predicate::str::contains("offset 1000.000s from 1 samples"));
}

#[test]
fn test_alignment_without_reference_degrades() {
    let dir = TempDir::new().unwrap();
    let tlog_path = write_log(
        dir.path(),
        "tlog.jsonl",
        None,
        &[tlog(1010.0, "VFR_HUD", (1, 1), json!({"alt": 1.0}))],
    );
    let bin = write_log(
        dir.path(),
        "bin.jsonl",
        Some(boot_relative_header()),
        &[local(15.0, "ATT", json!({"Roll": 1.5}))],
    );

    mavmerge()
        .arg("--align-clocks")
        .arg(&tlog_path)
        .arg(&bin)
        .assert()
        .success()
        .stderr(predicate::str::contains("NOT aligned"));

    let (header, rows) = read_csv(&dir.path().join("tlog.csv"));
    assert_eq!(column(&header, &rows, "timestamp"), vec!["15", "1010"]);
}

#[test]
fn test_backwards_timestamp_is_reported_and_kept() {
    let dir = TempDir::new().unwrap();
    let log = write_log(
        dir.path(),
        "flight.jsonl",
        None,
        &[
            local(5.0, "ATT", json!({"Roll": 1})),
            local(4.0, "ATT", json!({"Roll": 2})),
        ],
    );

    mavmerge()
        .arg(&log)
        .assert()
        .success()
        .stderr(predicate::str::contains("Ordering violations: 1"))
        .stderr(predicate::str::contains("record 2: ATT from 0_0 at 4 after 5"));

    let (header, rows) = read_csv(&dir.path().join("flight.csv"));
    assert_eq!(column(&header, &rows, "timestamp"), vec!["5", "4"]);
    assert_eq!(column(&header, &rows, "ATT.Roll"), vec!["1", "2"]);
}

#[test]
fn test_overlapping_files_are_interleaved() {
    let dir = TempDir::new().unwrap();
    let a = write_log(
        dir.path(),
        "a.jsonl",
        None,
        &[local(1.0, "ATT", json!({"Roll": 1})), local(3.0, "ATT", json!({"Roll": 3}))],
    );
    let b = write_log(
        dir.path(),
        "b.jsonl",
        None,
        &[local(2.0, "BARO", json!({"I": 1, "Alt": 2}))],
    );

    mavmerge()
        .arg(&a)
        .arg(&b)
        .assert()
        .success()
        .stderr(predicate::str::contains("Ordering violations").not());

    let (header, rows) = read_csv(&dir.path().join("a.csv"));
    assert_eq!(column(&header, &rows, "timestamp"), vec!["1", "2", "3"]);
    assert_eq!(column(&header, &rows, "BARO.Alt"), vec!["", "2", "2"]);
}

#[test]
fn test_mixed_time_bases_without_alignment_warn() {
    let dir = TempDir::new().unwrap();
    let tlog_path = telemetry_with_boot_times(&dir);
    let bin = write_log(
        dir.path(),
        "bin.jsonl",
        Some(boot_relative_header()),
        &[local(15.0, "ATT", json!({"Roll": 1.5}))],
    );

    mavmerge()
        .env_remove("RUST_LOG")
        .arg(&tlog_path)
        .arg(&bin)
        .assert()
        .success()
        .stderr(predicate::str::contains("without --align-clocks"));
}

#[test]
fn test_boot_relative_log_alone_does_not_warn() {
    let dir = TempDir::new().unwrap();
    let bin = write_log(
        dir.path(),
        "bin.jsonl",
        Some(boot_relative_header()),
        &[local(15.0, "ATT", json!({"Roll": 1.5}))],
    );

    mavmerge()
        .arg(&bin)
        .assert()
        .success()
        .stderr(predicate::str::contains("without --align-clocks").not());
}
