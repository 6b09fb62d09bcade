//! One merge run, end to end
//!
//! ```text
//! open inputs -> clock pre-pass -> ordered stream -> segments -> selector
//!             -> enrichment -> rate/gap -> per-segment tables
//! ```
//!
//! Per-record and per-file problems are counted into [`RunSummary`]; the run
//! only fails when no input yields a single readable record.

use crate::clock::{ClockError, ClockOffset, OffsetEstimator};
use crate::config::MergeConfig;
use crate::limits::{CapReached, MessageBudget};
use crate::rate::{RateAnalyzer, RateReport};
use crate::record::{Record, Scalar, SourceKey, TimeBase};
use crate::router::SegmentTables;
use crate::segment::SegmentFilter;
use crate::source::{Decoder, LogFile, SourceError};
use crate::stream::{FileReport, LogStream, StreamRecord};
use anyhow::{bail, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Ordering violations listed individually; the rest are only counted
pub const MAX_LISTED_VIOLATIONS: usize = 20;

/// Timestamps this far past the run's wall clock are suspicious
pub const FUTURE_TOLERANCE_SECS: f64 = 86_400.0;

/// Outcome of the clock-alignment pre-pass
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum ClockStatus {
    NotRequested,
    /// Alignment requested but every input is already on the wall clock
    NotNeeded,
    Aligned(ClockOffset),
    /// Boot-relative inputs were left unshifted
    Degraded(ClockError),
}

/// A timestamp that went backwards within one sender of one file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderingViolation {
    pub file: usize,
    /// 1-based record index within the file
    pub position: u64,
    pub source: SourceKey,
    pub msg_type: String,
    pub previous: f64,
    pub timestamp: f64,
}

impl fmt::Display for OrderingViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "file {} record {}: {} from {} at {} after {}",
            self.file, self.position, self.msg_type, self.source, self.timestamp, self.previous
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSummary {
    pub segment: String,
    pub table: String,
    pub rows: usize,
    pub columns: usize,
    pub truncated: bool,
}

/// End-of-run summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub files: Vec<FileReport>,
    pub records_read: u64,
    /// Reached at least one segment table
    pub records_admitted: u64,
    /// Not selected by type or source
    pub records_filtered: u64,
    /// Dropped as warm-up or invalid readings
    pub records_dropped: u64,
    pub records_outside_segments: u64,
    pub clock: ClockStatus,
    pub ordering_violations: Vec<OrderingViolation>,
    pub ordering_violation_count: u64,
    pub future_timestamps: u64,
    pub caps: Vec<CapReached>,
    pub tables: Vec<TableSummary>,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Read {} records from {} file(s): {} admitted, {} filtered, {} dropped, {} outside segments",
            self.records_read,
            self.files.len(),
            self.records_admitted,
            self.records_filtered,
            self.records_dropped,
            self.records_outside_segments
        )?;

        for file in &self.files {
            match &file.open_error {
                Some(err) => writeln!(f, "  {}: FAILED ({})", file.path.display(), err)?,
                None => {
                    write!(f, "  {}: {} records", file.path.display(), file.records)?;
                    if file.decode_errors > 0 {
                        write!(f, ", {} decode errors", file.decode_errors)?;
                    }
                    if file.bad_checksums > 0 {
                        write!(f, ", {} bad checksums", file.bad_checksums)?;
                    }
                    if file.time_shift != 0.0 {
                        write!(f, ", shifted {:+.3}s", file.time_shift)?;
                    }
                    writeln!(f)?;
                }
            }
        }

        match &self.clock {
            ClockStatus::NotRequested => {}
            ClockStatus::NotNeeded => writeln!(f, "Clock: all inputs already on wall clock")?,
            ClockStatus::Aligned(offset) => writeln!(
                f,
                "Clock: offset {:.3}s from {} samples (candidate spread {:.3}s)",
                offset.offset,
                offset.samples,
                offset.spread()
            )?,
            ClockStatus::Degraded(err) => {
                writeln!(f, "Clock: NOT aligned, boot-relative times kept ({})", err)?
            }
        }

        if self.ordering_violation_count > 0 {
            writeln!(f, "Ordering violations: {}", self.ordering_violation_count)?;
            for violation in &self.ordering_violations {
                writeln!(f, "  {}", violation)?;
            }
        }

        if self.future_timestamps > 0 {
            writeln!(f, "Future timestamps: {}", self.future_timestamps)?;
        }

        for cap in &self.caps {
            writeln!(f, "Truncated: {}", cap)?;
        }

        Ok(())
    }
}

/// Everything a run produces
#[derive(Debug)]
pub struct RunOutcome {
    pub segments: Vec<SegmentTables>,
    pub rates: RateReport,
    pub summary: RunSummary,
}

/// Flags timestamps that step backwards within (file, source)
#[derive(Debug, Default)]
struct OrderingMonitor {
    last: HashMap<(usize, SourceKey), f64>,
    positions: HashMap<usize, u64>,
    listed: Vec<OrderingViolation>,
    count: u64,
}

impl OrderingMonitor {
    fn check(&mut self, file: usize, record: &Record) {
        let position = self.positions.entry(file).or_insert(0);
        *position += 1;
        let position = *position;

        let previous = self
            .last
            .insert((file, record.source), record.timestamp);
        if let Some(previous) = previous.filter(|&p| record.timestamp < p) {
            self.count += 1;
            let violation = OrderingViolation {
                file,
                position,
                source: record.source,
                msg_type: record.msg_type.clone(),
                previous,
                timestamp: record.timestamp,
            };
            warn!("timestamp went backwards: {}", violation);
            if self.listed.len() < MAX_LISTED_VIOLATIONS {
                self.listed.push(violation);
            }
        }
    }
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Name of the whole-stream segment: the first input's file stem
pub fn implicit_segment_name(first_input: &Path) -> String {
    first_input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "merged".to_string())
}

fn has_time_base(files: &[Result<LogFile, SourceError>], time_base: TimeBase) -> bool {
    files.iter().flatten().any(|f| f.time_base == time_base)
}

/// Estimate the boot-to-wall offset from the wall-clock inputs
///
/// Scans fresh handles so the files used for merging are untouched.
fn align_clocks(
    config: &MergeConfig,
    decoder: &dyn Decoder,
    files: &[Result<LogFile, SourceError>],
) -> ClockStatus {
    let has_boot_relative = has_time_base(files, TimeBase::BootRelative);
    if !config.clock.align {
        if has_boot_relative && has_time_base(files, TimeBase::WallClock) {
            warn!(
                "merging boot-relative and wall-clock logs without --align-clocks; \
                 their timestamps are not comparable"
            );
        }
        return ClockStatus::NotRequested;
    }

    if !has_boot_relative {
        return ClockStatus::NotNeeded;
    }

    let mut estimator = OffsetEstimator::new(&config.clock);
    for file in files.iter().flatten() {
        if file.time_base != TimeBase::WallClock || estimator.is_saturated() {
            continue;
        }
        let reference = match decoder.open(&file.path) {
            Ok(reference) => reference,
            Err(err) => {
                warn!("clock pre-pass: {}", err);
                continue;
            }
        };
        for record in reference.records.flatten() {
            if estimator.is_saturated() {
                break;
            }
            estimator.observe(&record);
        }
    }

    match estimator.finish() {
        Ok(offset) => {
            info!(
                offset = offset.offset,
                samples = offset.samples,
                spread = offset.spread(),
                "boot-relative logs aligned to wall clock"
            );
            ClockStatus::Aligned(offset)
        }
        Err(err) => {
            warn!("{}; boot-relative timestamps left unadjusted", err);
            ClockStatus::Degraded(err)
        }
    }
}

/// Run one merge over `paths`, in the given order
pub fn run(config: &MergeConfig, decoder: &dyn Decoder, paths: &[PathBuf]) -> Result<RunOutcome> {
    let Some(first_input) = paths.first() else {
        bail!("No input files given");
    };

    let selector = config.selector()?;
    let enricher = config.enricher();

    let files: Vec<Result<LogFile, SourceError>> = paths.iter().map(|p| decoder.open(p)).collect();
    let clock = align_clocks(config, decoder, &files);
    let boot_shift = match &clock {
        ClockStatus::Aligned(offset) => offset.offset,
        _ => 0.0,
    };

    let mut stream = LogStream::new(config.stream_options());
    for file in files {
        let shift = match &file {
            Ok(f) if f.time_base == TimeBase::BootRelative => boot_shift,
            _ => 0.0,
        };
        stream.push_file(file, shift);
    }

    let mut segments = SegmentFilter::new(config.segments.clone(), &implicit_segment_name(first_input));
    let mut tables: Vec<SegmentTables> = segments
        .segments()
        .iter()
        .map(|segment| {
            SegmentTables::new(
                segment.clone(),
                &config.output,
                config.split_source,
                config.limits.max_rows,
            )
        })
        .collect();

    let mut budget = MessageBudget::new(config.limits.max_msgs);
    let mut rates = RateAnalyzer::new(config.rate.clone());
    let mut monitor = OrderingMonitor::default();
    let future_limit = unix_now() + FUTURE_TOLERANCE_SECS;

    let mut caps = Vec::new();
    let mut matches = Vec::new();
    let mut records_read = 0u64;
    let mut records_admitted = 0u64;
    let mut records_filtered = 0u64;
    let mut records_dropped = 0u64;
    let mut records_outside = 0u64;
    let mut future_timestamps = 0u64;

    info!(files = paths.len(), segments = tables.len(), "merging");

    while stream.has_pending() {
        if !budget.take() {
            let cap = CapReached::Messages {
                limit: budget.limit(),
            };
            warn!("{}", cap);
            caps.push(cap);
            break;
        }
        let Some(StreamRecord { file, record }) = stream.next() else {
            break;
        };
        records_read += 1;

        monitor.check(file, &record);
        if record.timestamp > future_limit {
            future_timestamps += 1;
            debug!(file, timestamp = record.timestamp, msg_type = %record.msg_type, "timestamp in the future");
        }

        segments.route(record.timestamp, &mut matches);
        if matches.is_empty() {
            records_outside += 1;
            if segments.all_closed() {
                debug!(timestamp = record.timestamp, "all segments closed, stopping early");
                break;
            }
            continue;
        }

        if !selector.admits(&record) {
            records_filtered += 1;
            continue;
        }

        let Some(mut record) = enricher.apply(record) else {
            records_dropped += 1;
            continue;
        };

        let observation = rates.observe(&record.msg_type, record.source, record.timestamp);
        if rates.config().add_field {
            record
                .fields
                .insert("rate".to_string(), Scalar::Float(observation.rate));
        }

        records_admitted += 1;
        for &index in &matches {
            tables[index].admit(&record);
        }
    }

    let files = stream.into_reports();
    if records_read == 0 {
        bail!(
            "No readable records in {} input file(s)",
            files.len()
        );
    }

    let mut table_summaries = Vec::new();
    for segment in &tables {
        for table in segment.tables() {
            if let Some(cap) = table.cap_notice() {
                warn!("{}", cap);
                caps.push(cap);
            }
            table_summaries.push(TableSummary {
                segment: segment.segment.name.clone(),
                table: table.name().to_string(),
                rows: table.len(),
                columns: table.columns().len(),
                truncated: table.truncated(),
            });
        }
    }

    if future_timestamps > 0 {
        warn!(count = future_timestamps, "records stamped more than a day in the future");
    }
    info!(records_read, records_admitted, "merge finished");

    Ok(RunOutcome {
        segments: tables,
        rates: rates.report(),
        summary: RunSummary {
            files,
            records_read,
            records_admitted,
            records_filtered,
            records_dropped,
            records_outside_segments: records_outside,
            clock,
            ordering_violations: monitor.listed,
            ordering_violation_count: monitor.count,
            future_timestamps,
            caps,
            tables: table_summaries,
        },
    })
}
