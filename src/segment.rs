//! Named time segments
//!
//! A segment is a closed window `[start, end]` in the same time base as the
//! merged stream (Unix seconds once clocks are aligned). Segments are parsed
//! from `START,END[,NAME]` strings and may overlap.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SegmentParseError {
    #[error("segment `{0}` must be \"start,end\" or \"start,end,name\"")]
    Shape(String),

    #[error("segment bound `{0}` is not a number")]
    Number(String),

    #[error("segment start {start} is after end {end}")]
    Inverted { start: f64, end: f64 },

    #[error("segment name must not be empty")]
    EmptyName,
}

/// A named time window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub name: String,
}

impl Segment {
    /// Build a segment; unnamed segments are called `START_END`
    pub fn new(start: f64, end: f64, name: Option<String>) -> Self {
        let name = name.unwrap_or_else(|| default_name(start, end));
        Self { start, end, name }
    }

    /// The window covering every timestamp
    pub fn whole(name: impl Into<String>) -> Self {
        Self {
            start: f64::NEG_INFINITY,
            end: f64::INFINITY,
            name: name.into(),
        }
    }

    pub fn contains(&self, timestamp: f64) -> bool {
        self.start <= timestamp && timestamp <= self.end
    }

    /// Fill in the default name if the segment came from a config file without one
    pub fn normalized(mut self) -> Self {
        if self.name.is_empty() {
            self.name = default_name(self.start, self.end);
        }
        self
    }
}

/// Used in file names, so no dots
fn default_name(start: f64, end: f64) -> String {
    format!("{:.0}_{:.0}", start, end)
}

impl FromStr for Segment {
    type Err = SegmentParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        let (start, end, name) = match parts.as_slice() {
            [start, end] => (*start, *end, None),
            [start, end, name] => {
                if name.is_empty() {
                    return Err(SegmentParseError::EmptyName);
                }
                (*start, *end, Some(name.to_string()))
            }
            _ => return Err(SegmentParseError::Shape(s.to_string())),
        };

        let start = parse_bound(start)?;
        let end = parse_bound(end)?;
        if start > end {
            return Err(SegmentParseError::Inverted { start, end });
        }

        Ok(Segment::new(start, end, name))
    }
}

fn parse_bound(s: &str) -> Result<f64, SegmentParseError> {
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(SegmentParseError::Number(s.to_string())),
    }
}

/// Parse a list of `-k` arguments
pub fn parse_segments<S: AsRef<str>>(specs: &[S]) -> Result<Vec<Segment>, SegmentParseError> {
    specs.iter().map(|s| Segment::from_str(s.as_ref())).collect()
}

/// Routes records to every segment whose window contains them
///
/// Single forward pass: once a record beyond a segment's end has been seen the
/// segment is closed and never revisited.
#[derive(Debug)]
pub struct SegmentFilter {
    segments: Vec<Segment>,
    closed: Vec<bool>,
    open_count: usize,
}

impl SegmentFilter {
    /// With no segments requested, everything lands in one implicit segment
    pub fn new(segments: Vec<Segment>, implicit_name: &str) -> Self {
        let segments = if segments.is_empty() {
            vec![Segment::whole(implicit_name)]
        } else {
            segments
        };
        let open_count = segments.len();
        Self {
            closed: vec![false; segments.len()],
            segments,
            open_count,
        }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Indices of the segments that admit `timestamp`, written into `matches`
    pub fn route(&mut self, timestamp: f64, matches: &mut Vec<usize>) {
        matches.clear();
        for (index, segment) in self.segments.iter().enumerate() {
            if self.closed[index] {
                continue;
            }
            if timestamp > segment.end {
                debug!(segment = %segment.name, timestamp, "segment closed");
                self.closed[index] = true;
                self.open_count -= 1;
                continue;
            }
            if timestamp >= segment.start {
                matches.push(index);
            }
        }
    }

    /// No segment can admit further records
    pub fn all_closed(&self) -> bool {
        self.open_count == 0
    }
}
