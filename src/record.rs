//! Decoded telemetry records
//!
//! A [`Record`] is one observation handed over by a decoder: a timestamp, a
//! type tag, the sender that produced it, and an open-ended map of scalar
//! fields. The type universe is decided by the decoder, so fields stay dynamic.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifies the system/component that produced a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceKey {
    pub system: u8,
    pub component: u8,
}

impl SourceKey {
    /// Constant key for formats that carry a single sender (dataflash)
    pub const LOCAL: SourceKey = SourceKey {
        system: 0,
        component: 0,
    };

    pub fn new(system: u8, component: u8) -> Self {
        Self { system, component }
    }

    pub fn is_local(&self) -> bool {
        *self == Self::LOCAL
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.system, self.component)
    }
}

/// A single field value
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Float(f64),
    Int(i64),
    Text(String),
}

impl Scalar {
    /// Numeric view of the value, `None` for text
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Float(v) => Some(*v),
            Scalar::Int(v) => Some(*v as f64),
            Scalar::Text(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Int(v) => Some(*v),
            Scalar::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Float(v) => write!(f, "{}", v),
            Scalar::Int(v) => write!(f, "{}", v),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Text(v.to_string())
    }
}

/// Field name -> value, ordered by name so column creation is deterministic
pub type Fields = BTreeMap<String, Scalar>;

/// Which clock a log's record timestamps come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeBase {
    /// Receipt time from the log container (Unix seconds)
    #[default]
    WallClock,
    /// Seconds since the vehicle booted
    BootRelative,
}

/// Kind of log a file holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// MAVLink telemetry stream (tlog), many senders
    #[default]
    Telemetry,
    /// Onboard dataflash log (BIN), one sender
    Dataflash,
}

/// One decoded observation
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Seconds, in the time base of the file it came from
    pub timestamp: f64,
    /// Message/table name, e.g. `ATTITUDE`
    pub msg_type: String,
    pub source: SourceKey,
    pub fields: Fields,
}

impl Record {
    pub fn new(timestamp: f64, msg_type: impl Into<String>, source: SourceKey) -> Self {
        Self {
            timestamp,
            msg_type: msg_type.into(),
            source,
            fields: Fields::new(),
        }
    }

    /// Builder-style field setter, mostly for tests and synthetic streams
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&Scalar> {
        self.fields.get(name)
    }

    /// Numeric field value, `None` if missing or text
    pub fn number(&self, name: &str) -> Option<f64> {
        self.fields.get(name).and_then(Scalar::as_f64)
    }
}
