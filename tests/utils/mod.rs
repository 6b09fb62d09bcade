// Shared fixtures for the CLI integration tests

#![allow(dead_code)]

use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// Write a JSON-lines log into `dir`
pub fn write_log(dir: &Path, name: &str, header: Option<Value>, records: &[Value]) -> PathBuf {
    let mut content = String::new();
    if let Some(header) = header {
        content.push_str(&header.to_string());
        content.push('\n');
    }
    for record in records {
        content.push_str(&record.to_string());
        content.push('\n');
    }
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

/// Telemetry record from `src`
pub fn tlog(t: f64, msg_type: &str, src: (u8, u8), fields: Value) -> Value {
    json!({"t": t, "type": msg_type, "src": [src.0, src.1], "fields": fields})
}

/// Single-sender record without a source key
pub fn local(t: f64, msg_type: &str, fields: Value) -> Value {
    json!({"t": t, "type": msg_type, "fields": fields})
}

pub fn boot_relative_header() -> Value {
    json!({"format": "dataflash", "time_base": "boot_relative"})
}

/// Parsed CSV: header plus rows
pub fn read_csv(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .unwrap();
    let header = rdr.headers().unwrap().iter().map(str::to_string).collect();
    let rows = rdr
        .records()
        .map(|record| record.unwrap().iter().map(str::to_string).collect())
        .collect();
    (header, rows)
}

/// Column lookup by header name
pub fn column<'a>(header: &[String], rows: &'a [Vec<String>], name: &str) -> Vec<&'a str> {
    let idx = header
        .iter()
        .position(|h| h == name)
        .unwrap_or_else(|| panic!("no column {name} in {header:?}"));
    rows.iter().map(|r| r[idx].as_str()).collect()
}
