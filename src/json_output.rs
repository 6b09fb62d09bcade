//! JSON side report (`--report`)

use crate::pipeline::RunSummary;
use crate::rate::RateReport;
use crate::router::WrittenTable;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Root JSON output structure
#[derive(Debug, Clone, Serialize)]
pub struct JsonReport<'a> {
    /// Format version identifier
    pub version: &'static str,
    /// Format name
    pub format: &'static str,
    pub summary: &'a RunSummary,
    /// Rate and worst gap per (type, source)
    pub rates: &'a RateReport,
    /// Tables that were written
    pub tables: &'a [WrittenTable],
}

impl<'a> JsonReport<'a> {
    pub fn new(summary: &'a RunSummary, rates: &'a RateReport, tables: &'a [WrittenTable]) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            format: "mavmerge-report-v1",
            summary,
            rates,
            tables,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize report")
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        let mut out = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut out, self).context("Failed to serialize report")?;
        out.write_all(b"\n")?;
        out.flush()
            .with_context(|| format!("Failed to write {}", path.display()))
    }
}
