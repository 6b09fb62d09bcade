//! Record source adapter
//!
//! Binary MAVLink/dataflash decoding lives outside this crate. A [`Decoder`]
//! opens one log and hands back a lazy sequence of [`Decoded`] items; the
//! merge pipeline only ever sees that shape.
//!
//! [`JsonLinesDecoder`] is the adapter shipped with the crate: one JSON object
//! per line, as produced by an external dump tool.
//!
//! ```text
//! {"format": "dataflash", "time_base": "boot_relative"}        <- optional header
//! {"t": 12.5, "type": "ATT", "fields": {"Roll": 0.1}}
//! {"t": 1700000000.2, "type": "HEARTBEAT", "src": [1, 1], "fields": {...}, "crc_ok": true}
//! ```

use crate::record::{LogFormat, Record, Scalar, SourceKey, TimeBase};
use serde::Deserialize;
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind, Lines};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::trace;

/// A single record that could not be used as-is
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("line {line}: malformed record: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("line {line}: checksum mismatch on {} record", .record.msg_type)]
    BadChecksum { line: usize, record: Box<Record> },
}

/// Failure to open a log; fatal for that file only
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("failed to open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("bad header in {}: {reason}", .path.display())]
    Header { path: PathBuf, reason: String },
}

impl SourceError {
    pub fn path(&self) -> &Path {
        match self {
            SourceError::Open { path, .. } | SourceError::Header { path, .. } => path,
        }
    }
}

/// Item produced by a decoder
pub type Decoded = Result<Record, DecodeError>;

/// Lazy record sequence; restartable only by reopening the file
pub type RecordIter = Box<dyn Iterator<Item = Decoded> + Send>;

/// An opened log
pub struct LogFile {
    pub path: PathBuf,
    pub format: LogFormat,
    pub time_base: TimeBase,
    pub records: RecordIter,
}

impl std::fmt::Debug for LogFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogFile")
            .field("path", &self.path)
            .field("format", &self.format)
            .field("time_base", &self.time_base)
            .finish_non_exhaustive()
    }
}

/// Opens logs and yields their records in file order
pub trait Decoder: Send + Sync {
    fn open(&self, path: &Path) -> Result<LogFile, SourceError>;
}

/// Decoder for newline-delimited JSON record dumps
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonLinesDecoder;

impl JsonLinesDecoder {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug, Deserialize)]
struct Header {
    #[serde(default)]
    format: LogFormat,
    #[serde(default)]
    time_base: TimeBase,
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    t: f64,
    #[serde(rename = "type")]
    msg_type: String,
    #[serde(default)]
    src: Option<(u8, u8)>,
    #[serde(default)]
    fields: serde_json::Map<String, Value>,
    #[serde(default = "default_crc_ok")]
    crc_ok: bool,
}

fn default_crc_ok() -> bool {
    true
}

impl Decoder for JsonLinesDecoder {
    fn open(&self, path: &Path) -> Result<LogFile, SourceError> {
        let file = File::open(path).map_err(|source| SourceError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let mut reader = JsonLinesReader::new(BufReader::new(file));
        let mut header = Header {
            format: LogFormat::default(),
            time_base: TimeBase::default(),
        };

        // Peek at the first non-blank line for a header object
        match reader.next_line_or_error() {
            Some(Ok((line_no, line))) => match serde_json::from_str::<Value>(&line) {
                Ok(Value::Object(map)) if is_header(&map) => {
                    header = serde_json::from_value(Value::Object(map)).map_err(|e| {
                        SourceError::Header {
                            path: path.to_path_buf(),
                            reason: e.to_string(),
                        }
                    })?;
                }
                _ => reader.pending = Some(Ok((line_no, line))),
            },
            Some(Err(e)) => reader.pending = Some(Err(e)),
            None => {}
        }

        Ok(LogFile {
            path: path.to_path_buf(),
            format: header.format,
            time_base: header.time_base,
            records: Box::new(reader),
        })
    }
}

fn is_header(map: &serde_json::Map<String, Value>) -> bool {
    !map.contains_key("type") && (map.contains_key("format") || map.contains_key("time_base"))
}

/// Line iterator over a JSON-lines file
struct JsonLinesReader<R: BufRead> {
    lines: Lines<R>,
    line_no: usize,
    pending: Option<Result<(usize, String), DecodeError>>,
    done: bool,
}

impl<R: BufRead> JsonLinesReader<R> {
    fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
            pending: None,
            done: false,
        }
    }

    /// Next non-blank line, or `None` at end of file / after a hard I/O error
    fn next_line_or_error(&mut self) -> Option<Result<(usize, String), DecodeError>> {
        if let Some(pending) = self.pending.take() {
            return Some(pending);
        }
        while !self.done {
            let line = self.lines.next()?;
            self.line_no += 1;
            match line {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => return Some(Ok((self.line_no, line))),
                Err(e) => {
                    // Invalid UTF-8 consumes the line; anything else may not make progress
                    if e.kind() != ErrorKind::InvalidData {
                        self.done = true;
                    }
                    return Some(Err(DecodeError::Malformed {
                        line: self.line_no,
                        reason: e.to_string(),
                    }));
                }
            }
        }
        None
    }
}

impl<R: BufRead> Iterator for JsonLinesReader<R> {
    type Item = Decoded;

    fn next(&mut self) -> Option<Decoded> {
        Some(match self.next_line_or_error()? {
            Ok((line_no, line)) => parse_line(line_no, &line),
            Err(e) => Err(e),
        })
    }
}

/// Decode one JSON line into a record
pub fn parse_line(line_no: usize, line: &str) -> Decoded {
    let raw: RawRecord = serde_json::from_str(line).map_err(|e| DecodeError::Malformed {
        line: line_no,
        reason: e.to_string(),
    })?;

    if !raw.t.is_finite() {
        return Err(DecodeError::Malformed {
            line: line_no,
            reason: format!("non-finite timestamp {}", raw.t),
        });
    }

    let source = raw
        .src
        .map(|(system, component)| SourceKey::new(system, component))
        .unwrap_or(SourceKey::LOCAL);
    let mut record = Record::new(raw.t, raw.msg_type, source);

    for (name, value) in raw.fields {
        match json_scalar(&value) {
            Some(scalar) => {
                record.fields.insert(name, scalar);
            }
            None => trace!(line = line_no, field = %name, "dropping non-scalar field"),
        }
    }

    if raw.crc_ok {
        Ok(record)
    } else {
        Err(DecodeError::BadChecksum {
            line: line_no,
            record: Box::new(record),
        })
    }
}

/// Arrays, objects and nulls do not fit in a table cell
fn json_scalar(value: &Value) -> Option<Scalar> {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(Scalar::Int(i)),
            None => n.as_f64().map(Scalar::Float),
        },
        Value::String(s) => Some(Scalar::Text(s.clone())),
        Value::Bool(b) => Some(Scalar::Int(i64::from(*b))),
        Value::Array(_) | Value::Object(_) | Value::Null => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_log(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_parse_line_basic() {
        let record = parse_line(
            1,
            r#"{"t": 1.5, "type": "ATTITUDE", "src": [1, 1], "fields": {"roll": 0.25, "seq": 3, "name": "x"}}"#,
        )
        .unwrap();
        assert_eq!(record.timestamp, 1.5);
        assert_eq!(record.msg_type, "ATTITUDE");
        assert_eq!(record.source, SourceKey::new(1, 1));
        assert_eq!(record.field("roll"), Some(&Scalar::Float(0.25)));
        assert_eq!(record.field("seq"), Some(&Scalar::Int(3)));
        assert_eq!(record.field("name"), Some(&Scalar::Text("x".to_string())));
    }

    #[test]
    fn test_parse_line_defaults_to_local_source() {
        let record = parse_line(1, r#"{"t": 2.0, "type": "ATT"}"#).unwrap();
        assert!(record.source.is_local());
        assert!(record.fields.is_empty());
    }

    #[test]
    fn test_parse_line_drops_arrays() {
        let record = parse_line(
            1,
            r#"{"t": 1.0, "type": "BATTERY_STATUS", "fields": {"voltages": [1, 2], "current": 5, "armed": true}}"#,
        )
        .unwrap();
        assert!(record.field("voltages").is_none());
        assert_eq!(record.field("armed"), Some(&Scalar::Int(1)));
    }

    #[test]
    fn test_parse_line_malformed() {
        let err = parse_line(7, "not json").unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { line: 7, .. }));
        assert!(err.to_string().contains("line 7"));
    }

    #[test]
    fn test_parse_line_bad_checksum_keeps_record() {
        let err = parse_line(3, r#"{"t": 1.0, "type": "VFR_HUD", "crc_ok": false}"#).unwrap_err();
        match err {
            DecodeError::BadChecksum { line, record } => {
                assert_eq!(line, 3);
                assert_eq!(record.msg_type, "VFR_HUD");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_open_missing_file() {
        let err = JsonLinesDecoder::new()
            .open(Path::new("/nonexistent/mavmerge/log.jsonl"))
            .unwrap_err();
        assert!(matches!(err, SourceError::Open { .. }));
    }

    #[test]
    fn test_open_reads_header() {
        let file = write_log(
            "{\"format\": \"dataflash\", \"time_base\": \"boot_relative\"}\n\
             {\"t\": 1.0, \"type\": \"ATT\"}\n",
        );
        let log = JsonLinesDecoder::new().open(file.path()).unwrap();
        assert_eq!(log.format, LogFormat::Dataflash);
        assert_eq!(log.time_base, TimeBase::BootRelative);
        assert_eq!(log.records.count(), 1);
    }

    #[test]
    fn test_open_without_header_keeps_first_record() {
        let file = write_log("\n{\"t\": 1.0, \"type\": \"A\"}\n\n{\"t\": 2.0, \"type\": \"B\"}\n");
        let log = JsonLinesDecoder::new().open(file.path()).unwrap();
        assert_eq!(log.time_base, TimeBase::WallClock);
        let types: Vec<String> = log.records.map(|r| r.unwrap().msg_type).collect();
        assert_eq!(types, vec!["A", "B"]);
    }

    #[test]
    fn test_bad_line_does_not_stop_file() {
        let file = write_log("{\"t\": 1.0, \"type\": \"A\"}\ngarbage\n{\"t\": 2.0, \"type\": \"B\"}\n");
        let log = JsonLinesDecoder::new().open(file.path()).unwrap();
        let items: Vec<Decoded> = log.records.collect();
        assert_eq!(items.len(), 3);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(DecodeError::Malformed { line: 2, .. })));
        assert!(items[2].is_ok());
    }

    #[test]
    fn test_bad_header_is_reported() {
        let file = write_log("{\"time_base\": \"sideways\"}\n");
        let err = JsonLinesDecoder::new().open(file.path()).unwrap_err();
        assert!(matches!(err, SourceError::Header { .. }));
    }
}
