//! Arrival rate and gap analysis per (type, source)
//!
//! Runs alongside the merger. The rate is the number of intervals in a
//! trailing window divided by the window's span; a gap is an interval longer
//! than `gap_multiple` times the window's mean interval. Both a gap and a
//! backwards step restart the window.

use crate::record::SourceKey;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateConfig {
    /// Window holds `2 * half_window` intervals
    pub half_window: usize,
    /// Interval / mean interval ratio that counts as a gap
    pub gap_multiple: f64,
    /// Rates are clipped to this (also used for bursts with ~zero span)
    pub max_rate: f64,
    /// Write a `rate` field into each record before merging
    pub add_field: bool,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            half_window: 10,
            gap_multiple: 5.0,
            max_rate: 100.0,
            add_field: false,
        }
    }
}

/// Spans below this are treated as a burst
const MIN_SPAN: f64 = 0.01;

/// What the analyzer saw on one record
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    /// Messages per second over the trailing window
    pub rate: f64,
    pub gap: bool,
    pub backwards: bool,
}

#[derive(Debug, Clone)]
struct KeyHistory {
    window: VecDeque<f64>,
    count: u64,
    first: f64,
    last: f64,
    intervals: u64,
    interval_sum: f64,
    worst_gap: f64,
    gaps: u64,
    backwards: u64,
}

impl KeyHistory {
    fn new(timestamp: f64) -> Self {
        Self {
            window: VecDeque::from([timestamp]),
            count: 1,
            first: timestamp,
            last: timestamp,
            intervals: 0,
            interval_sum: 0.0,
            worst_gap: 0.0,
            gaps: 0,
            backwards: 0,
        }
    }

    fn mean_window_interval(&self) -> Option<f64> {
        let (front, back) = (self.window.front()?, self.window.back()?);
        let n = self.window.len();
        (n >= 2).then(|| (back - front) / (n - 1) as f64)
    }

    fn restart_window(&mut self, timestamp: f64) {
        self.window.clear();
        self.window.push_back(timestamp);
    }
}

#[derive(Debug, Clone, Default)]
pub struct RateAnalyzer {
    config: RateConfig,
    keys: HashMap<(String, SourceKey), KeyHistory>,
}

impl RateAnalyzer {
    pub fn new(config: RateConfig) -> Self {
        Self {
            config,
            keys: HashMap::new(),
        }
    }

    pub fn config(&self) -> &RateConfig {
        &self.config
    }

    pub fn observe(&mut self, msg_type: &str, source: SourceKey, timestamp: f64) -> Observation {
        let quiet = Observation {
            rate: 0.0,
            gap: false,
            backwards: false,
        };

        let Some(history) = self.keys.get_mut(&(msg_type.to_string(), source)) else {
            self.keys
                .insert((msg_type.to_string(), source), KeyHistory::new(timestamp));
            return quiet;
        };

        history.count += 1;
        let dt = timestamp - history.last;
        history.last = timestamp;

        if dt < 0.0 {
            history.backwards += 1;
            history.restart_window(timestamp);
            return Observation {
                backwards: true,
                ..quiet
            };
        }

        history.intervals += 1;
        history.interval_sum += dt;
        history.worst_gap = history.worst_gap.max(dt);

        let is_gap = history
            .mean_window_interval()
            .is_some_and(|mean| mean > 0.0 && dt > self.config.gap_multiple * mean);
        if is_gap {
            history.gaps += 1;
            debug!(msg_type, %source, timestamp, dt, "gap detected");
            history.restart_window(timestamp);
            return Observation { gap: true, ..quiet };
        }

        history.window.push_back(timestamp);
        let max_len = 2 * self.config.half_window.max(1) + 1;
        while history.window.len() > max_len {
            history.window.pop_front();
        }

        let span = match (history.window.front(), history.window.back()) {
            (Some(front), Some(back)) => back - front,
            _ => 0.0,
        };
        let intervals = (history.window.len() - 1) as f64;
        let rate = if span < MIN_SPAN {
            self.config.max_rate
        } else {
            (intervals / span).min(self.config.max_rate)
        };

        Observation { rate, ..quiet }
    }

    /// Snapshot of every key seen so far, sorted by type then source
    pub fn report(&self) -> RateReport {
        let mut entries: Vec<RateEntry> = self
            .keys
            .iter()
            .map(|((msg_type, source), h)| RateEntry {
                msg_type: msg_type.clone(),
                source: *source,
                count: h.count,
                first: h.first,
                last: h.last,
                mean_rate: if h.interval_sum > 0.0 {
                    h.intervals as f64 / h.interval_sum
                } else {
                    0.0
                },
                worst_gap: (h.intervals > 0).then_some(h.worst_gap),
                gaps: h.gaps,
                backwards: h.backwards,
            })
            .collect();
        entries.sort_by(|a, b| a.msg_type.cmp(&b.msg_type).then(a.source.cmp(&b.source)));
        RateReport { entries }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateEntry {
    pub msg_type: String,
    pub source: SourceKey,
    pub count: u64,
    pub first: f64,
    pub last: f64,
    /// Messages per second over all forward intervals
    pub mean_rate: f64,
    /// Largest forward interval, `None` with a single record
    pub worst_gap: Option<f64>,
    pub gaps: u64,
    pub backwards: u64,
}

impl fmt::Display for RateEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<28} {:>7} {:>8} {:>9.2} Hz",
            self.msg_type,
            self.source.to_string(),
            self.count,
            self.mean_rate
        )?;
        if let Some(worst) = self.worst_gap {
            write!(f, "  worst gap {:.3}s", worst)?;
        }
        if self.gaps > 0 {
            write!(f, "  {} gaps", self.gaps)?;
        }
        if self.backwards > 0 {
            write!(f, "  {} backwards", self.backwards)?;
        }
        Ok(())
    }
}

/// Side report: rate and worst gap per (type, source)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RateReport {
    pub entries: Vec<RateEntry>,
}

impl RateReport {
    pub fn get(&self, msg_type: &str, source: SourceKey) -> Option<&RateEntry> {
        self.entries
            .iter()
            .find(|e| e.msg_type == msg_type && e.source == source)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for RateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<28} {:>7} {:>8} {:>12}",
            "type", "source", "count", "rate"
        )?;
        for entry in &self.entries {
            writeln!(f, "{}", entry)?;
        }
        Ok(())
    }
}
