//! Boot-clock to wall-clock alignment
//!
//! Dataflash logs without a GPS fix are stamped with time since boot. Telemetry
//! logs carry the ground station's receipt time and, on many messages, the
//! vehicle's `time_boot_ms`. For every such record
//!
//! ```text
//! candidate = receipt_time - boot_time
//! ```
//!
//! Link and processing latency only ever delay the receipt, so the smallest
//! candidate is the least-biased estimate of the true offset. If the minimum
//! latency is never observed the estimate is late by that amount; the spread
//! between smallest and largest candidate is reported so this can be judged.

use crate::record::{Record, SourceKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Settings for the alignment pre-pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Shift boot-relative logs onto the wall clock
    pub align: bool,

    /// Field holding the vehicle's boot-relative time
    pub boot_field: String,

    /// Multiplier converting `boot_field` to seconds
    pub boot_scale: f64,

    /// Only scan this many records (`None` = whole stream)
    pub max_records: Option<u64>,

    /// Only trust records from this sender (e.g. the autopilot, 1/1)
    pub source: Option<SourceKey>,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            align: false,
            boot_field: "time_boot_ms".to_string(),
            boot_scale: 0.001,
            max_records: None,
            source: None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Serialize)]
pub enum ClockError {
    #[error("no record carries both a receipt time and `{field}` ({scanned} records scanned)")]
    NoReferenceAvailable { field: String, scanned: u64 },
}

/// Result of one alignment run; immutable once computed
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClockOffset {
    /// Seconds to add to boot-relative timestamps
    pub offset: f64,
    /// Number of qualifying records
    pub samples: u64,
    pub first_candidate: f64,
    pub max_candidate: f64,
}

impl ClockOffset {
    /// Map a boot-relative timestamp onto the wall clock
    pub fn apply(&self, boot_relative: f64) -> f64 {
        boot_relative + self.offset
    }

    /// Largest observed latency above the estimate
    pub fn spread(&self) -> f64 {
        self.max_candidate - self.offset
    }
}

/// Streaming minimum-candidate estimator
#[derive(Debug)]
pub struct OffsetEstimator<'a> {
    config: &'a ClockConfig,
    scanned: u64,
    samples: u64,
    min: f64,
    max: f64,
    first: Option<f64>,
}

impl<'a> OffsetEstimator<'a> {
    pub fn new(config: &'a ClockConfig) -> Self {
        Self {
            config,
            scanned: 0,
            samples: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            first: None,
        }
    }

    /// Feed one wall-clock stamped record
    pub fn observe(&mut self, record: &Record) {
        if self.is_saturated() {
            return;
        }
        self.scanned += 1;

        if let Some(source) = self.config.source {
            if record.source != source {
                return;
            }
        }

        let Some(boot) = record.number(&self.config.boot_field) else {
            return;
        };
        let candidate = record.timestamp - boot * self.config.boot_scale;
        if !candidate.is_finite() {
            return;
        }

        self.samples += 1;
        self.first.get_or_insert(candidate);
        self.min = self.min.min(candidate);
        self.max = self.max.max(candidate);
    }

    /// True once the configured prefix has been scanned
    pub fn is_saturated(&self) -> bool {
        self.config
            .max_records
            .is_some_and(|limit| self.scanned >= limit)
    }

    pub fn scanned(&self) -> u64 {
        self.scanned
    }

    pub fn finish(self) -> Result<ClockOffset, ClockError> {
        match self.first {
            Some(first_candidate) => {
                debug!(
                    offset = self.min,
                    samples = self.samples,
                    spread = self.max - self.min,
                    "clock offset estimated"
                );
                Ok(ClockOffset {
                    offset: self.min,
                    samples: self.samples,
                    first_candidate,
                    max_candidate: self.max,
                })
            }
            None => Err(ClockError::NoReferenceAvailable {
                field: self.config.boot_field.clone(),
                scanned: self.scanned,
            }),
        }
    }
}

/// Estimate the offset over a record sequence
pub fn estimate<'r, I>(config: &ClockConfig, records: I) -> Result<ClockOffset, ClockError>
where
    I: IntoIterator<Item = &'r Record>,
{
    let mut estimator = OffsetEstimator::new(config);
    for record in records {
        if estimator.is_saturated() {
            break;
        }
        estimator.observe(record);
    }
    estimator.finish()
}
