//! Run configuration
//!
//! Every tunable lives in [`MergeConfig`], loaded from an optional TOML file
//! and then overridden by command-line flags.
//!
//! ```toml
//! types = "surftrak,GPS_RAW_INT"
//! split_source = true
//!
//! [limits]
//! max_rows = 100000
//!
//! [clock]
//! align = true
//! max_records = 20000
//!
//! [[segments]]
//! start = 1700000000
//! end = 1700000600
//! name = "transect1"
//! ```

use crate::clock::ClockConfig;
use crate::enrich::Enricher;
use crate::limits::Limits;
use crate::rate::RateConfig;
use crate::router::OutputConfig;
use crate::segment::Segment;
use crate::selector::{RecordSelector, SourceFilter, TypeSelector};
use crate::stream::StreamOptions;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Environment toggle: pass checksum-invalid records through
pub const IGNORE_CRC_ENV: &str = "MAV_IGNORE_CRC";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Comma separated type names and classes
    pub types: String,
    /// Only keep this system id (0 = any)
    pub sysid: u8,
    /// Only keep this component id (0 = any)
    pub compid: u8,
    /// Keep forward-fill state and columns separate per sender
    pub split_source: bool,
    /// Surface-tracking analysis: one sender per rangefinder/HEARTBEAT type
    pub surftrak: bool,
    pub segments: Vec<Segment>,
    pub limits: Limits,
    pub clock: ClockConfig,
    pub rate: RateConfig,
    pub output: OutputConfig,
    /// Skip derived fields filtering (keep GPS warm-up, zero BARO, ...)
    pub raw: bool,
    /// GPS records with a worse hdop are treated as warm-up
    pub hdop_max: f64,
    pub decode_ahead: bool,
    pub tolerate_bad_checksum: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            types: "default".to_string(),
            sysid: 0,
            compid: 0,
            split_source: false,
            surftrak: false,
            segments: Vec::new(),
            limits: Limits::default(),
            clock: ClockConfig::default(),
            rate: RateConfig::default(),
            output: OutputConfig::default(),
            raw: false,
            hdop_max: 100.0,
            decode_ahead: false,
            tolerate_bad_checksum: false,
        }
    }
}

impl MergeConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: MergeConfig = toml::from_str(content).context("Failed to parse TOML")?;
        config.segments = config
            .segments
            .into_iter()
            .map(Segment::normalized)
            .collect();
        Ok(config)
    }

    /// Apply `MAV_IGNORE_CRC` from the process environment
    pub fn apply_env(&mut self) {
        let value = std::env::var(IGNORE_CRC_ENV).ok();
        self.apply_ignore_crc(value.as_deref());
    }

    /// Any value other than empty or `0` enables tolerance
    pub fn apply_ignore_crc(&mut self, value: Option<&str>) {
        if let Some(value) = value {
            let value = value.trim();
            if !value.is_empty() && value != "0" {
                self.tolerate_bad_checksum = true;
            }
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Err(e) = TypeSelector::from_spec(&self.types) {
            return Err(format!("types: {}", e));
        }

        if self.limits.max_msgs == 0 {
            return Err("limits.max_msgs must be > 0".to_string());
        }

        if self.limits.max_rows == 0 {
            return Err("limits.max_rows must be > 0".to_string());
        }

        if !(self.clock.boot_scale.is_finite() && self.clock.boot_scale > 0.0) {
            return Err(format!(
                "clock.boot_scale must be a positive number, got {}",
                self.clock.boot_scale
            ));
        }

        if self.clock.boot_field.is_empty() {
            return Err("clock.boot_field must not be empty".to_string());
        }

        if self.rate.half_window == 0 {
            return Err("rate.half_window must be >= 1".to_string());
        }

        if self.rate.gap_multiple.is_nan() || self.rate.gap_multiple <= 1.0 {
            return Err(format!(
                "rate.gap_multiple must be > 1, got {}",
                self.rate.gap_multiple
            ));
        }

        if self.rate.max_rate.is_nan() || self.rate.max_rate <= 0.0 {
            return Err(format!(
                "rate.max_rate must be positive, got {}",
                self.rate.max_rate
            ));
        }

        if self.hdop_max < 0.0 {
            return Err(format!("hdop_max must be non-negative, got {}", self.hdop_max));
        }

        for segment in &self.segments {
            if !(segment.start.is_finite() && segment.end.is_finite()) {
                return Err(format!("segment {} has a non-finite bound", segment.name));
            }
            if segment.start > segment.end {
                return Err(format!(
                    "segment {} starts after it ends ({} > {})",
                    segment.name, segment.start, segment.end
                ));
            }
        }

        if !self.output.merge && !self.output.explode {
            return Err("nothing to write: merged output disabled without --explode".to_string());
        }

        Ok(())
    }

    pub fn selector(&self) -> Result<RecordSelector> {
        Ok(RecordSelector::new(
            TypeSelector::from_spec(&self.types)?,
            SourceFilter::new(self.sysid, self.compid),
        )
        .with_surftrak(self.surftrak))
    }

    pub fn enricher(&self) -> Enricher {
        Enricher::new(self.raw, self.hdop_max)
    }

    pub fn stream_options(&self) -> StreamOptions {
        StreamOptions {
            tolerate_bad_checksum: self.tolerate_bad_checksum,
            decode_ahead: self.decode_ahead,
            max_records: Some(self.limits.max_msgs),
        }
    }
}
