//! CSV output for wide tables
//!
//! Header is `timestamp` followed by one `TABLE.field` column per column of
//! the table. Unset cells are empty.

use crate::merger::WideTable;
use crate::record::Scalar;
use crate::router::TableWriter;
use std::borrow::Cow;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Writes each table to its own CSV file
#[derive(Debug, Default)]
pub struct CsvTableWriter;

impl CsvTableWriter {
    pub fn new() -> Self {
        Self
    }
}

impl TableWriter for CsvTableWriter {
    fn write_table(&mut self, path: &Path, table: &WideTable) -> io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut out = BufWriter::new(File::create(path)?);
        write_csv(&mut out, table)?;
        out.flush()
    }
}

/// Escape CSV field (handle commas, quotes, newlines)
fn escape_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

fn format_cell(cell: Option<&Scalar>) -> Cow<'_, str> {
    match cell {
        None => Cow::Borrowed(""),
        Some(Scalar::Text(s)) => escape_field(s),
        Some(value) => Cow::Owned(value.to_string()),
    }
}

pub fn write_csv<W: Write>(out: &mut W, table: &WideTable) -> io::Result<()> {
    out.write_all(b"timestamp")?;
    for column in table.columns() {
        write!(out, ",{}", escape_field(&column.to_string()))?;
    }
    out.write_all(b"\n")?;

    for row in table.rows() {
        write!(out, "{}", row.timestamp)?;
        for cell in table.cells(row) {
            write!(out, ",{}", format_cell(cell))?;
        }
        out.write_all(b"\n")?;
    }
    Ok(())
}

/// Generate CSV output as string
pub fn to_csv(table: &WideTable) -> io::Result<String> {
    let mut buf = Vec::new();
    write_csv(&mut buf, table)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
