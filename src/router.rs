//! Output routing
//!
//! Each segment owns a merged table, a set of exploded per-type tables, or
//! both. After the run the router names every non-empty table and hands it to
//! a [`TableWriter`]:
//!
//! ```text
//! <dir>/<segment>.csv           merged
//! <dir>/<segment>_<TABLE>.csv   exploded
//! ```
//!
//! `<dir>` is the directory of the first input unless `out_dir` is set.

use crate::merger::{ExplodedTables, ForwardFillMerger, WideTable};
use crate::record::Record;
use crate::segment::Segment;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// One forward-filled table across all types
    pub merge: bool,
    /// One table per type (or type + source)
    pub explode: bool,
    pub out_dir: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            merge: true,
            explode: false,
            out_dir: None,
        }
    }
}

/// Sink for finished tables
pub trait TableWriter {
    fn write_table(&mut self, path: &Path, table: &WideTable) -> std::io::Result<()>;
}

/// Tables accumulated for one segment
#[derive(Debug, Clone)]
pub struct SegmentTables {
    pub segment: Segment,
    pub merged: Option<ForwardFillMerger>,
    pub exploded: Option<ExplodedTables>,
}

impl SegmentTables {
    pub fn new(segment: Segment, output: &OutputConfig, split_by_source: bool, max_rows: usize) -> Self {
        let merged = output
            .merge
            .then(|| ForwardFillMerger::new(segment.name.clone(), split_by_source, max_rows));
        let exploded = output
            .explode
            .then(|| ExplodedTables::new(split_by_source, max_rows));
        Self {
            segment,
            merged,
            exploded,
        }
    }

    /// Feed one record to every table of this segment
    pub fn admit(&mut self, record: &Record) {
        if let Some(merger) = self.merged.as_mut() {
            merger.admit(record);
        }
        if let Some(exploded) = self.exploded.as_mut() {
            exploded.admit(record);
        }
    }

    pub fn merged_table(&self) -> Option<&WideTable> {
        self.merged.as_ref().map(ForwardFillMerger::table)
    }

    /// Every table of the segment; merged first, then exploded by name
    pub fn tables(&self) -> impl Iterator<Item = &WideTable> {
        self.merged_table()
            .into_iter()
            .chain(self.exploded.iter().flat_map(ExplodedTables::tables))
    }

    pub fn rows(&self) -> usize {
        self.tables().map(WideTable::len).sum()
    }
}

/// A table that reached the writer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WrittenTable {
    pub segment: String,
    pub table: String,
    pub path: PathBuf,
    pub rows: usize,
    pub columns: usize,
    pub truncated: bool,
}

#[derive(Debug, Clone)]
pub struct OutputRouter {
    dir: PathBuf,
}

impl OutputRouter {
    pub fn new(output: &OutputConfig, first_input: &Path) -> Self {
        let dir = match &output.out_dir {
            Some(dir) => dir.clone(),
            None => first_input
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        };
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn merged_path(&self, segment: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", segment))
    }

    pub fn exploded_path(&self, segment: &str, table: &str) -> PathBuf {
        self.dir.join(format!("{}_{}.csv", segment, table))
    }

    /// Write every non-empty table of every segment
    pub fn route(
        &self,
        segments: &[SegmentTables],
        writer: &mut dyn TableWriter,
    ) -> Result<Vec<WrittenTable>> {
        let mut written = Vec::new();

        for tables in segments {
            let name = &tables.segment.name;

            if let Some(table) = tables.merged_table() {
                let path = self.merged_path(name);
                if let Some(entry) = write_one(writer, name, &path, table)? {
                    written.push(entry);
                }
            }

            if let Some(exploded) = &tables.exploded {
                for table in exploded.tables() {
                    let path = self.exploded_path(name, table.name());
                    if let Some(entry) = write_one(writer, name, &path, table)? {
                        written.push(entry);
                    }
                }
            }
        }

        Ok(written)
    }
}

fn write_one(
    writer: &mut dyn TableWriter,
    segment: &str,
    path: &Path,
    table: &WideTable,
) -> Result<Option<WrittenTable>> {
    if table.is_empty() {
        debug!(segment, table = table.name(), "skipping empty table");
        return Ok(None);
    }

    writer
        .write_table(path, table)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!(
        path = %path.display(),
        rows = table.len(),
        columns = table.columns().len(),
        "table written"
    );

    Ok(Some(WrittenTable {
        segment: segment.to_string(),
        table: table.name().to_string(),
        path: path.to_path_buf(),
        rows: table.len(),
        columns: table.columns().len(),
        truncated: table.truncated(),
    }))
}
