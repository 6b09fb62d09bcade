//! Forward-fill merger
//!
//! Every admitted record updates the live value of its columns and emits one
//! row holding a snapshot of *all* columns seen so far. Columns are created on
//! first sight and never removed. A row emitted before a column existed is
//! shorter than later rows; [`WideTable::cells`] pads it with unset cells so
//! every row of a table reads with the same width.

use crate::limits::{CapReached, RowBudget};
use crate::record::{Record, Scalar};
use crate::selector::table_name;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::iter;

/// A `table.field` column
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnKey {
    pub table: String,
    pub field: String,
}

impl fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.field)
    }
}

/// One emitted row; `None` is an unset cell
#[derive(Debug, Clone, PartialEq)]
pub struct WideRow {
    pub timestamp: f64,
    pub values: Vec<Option<Scalar>>,
}

#[derive(Debug, Clone)]
pub struct WideTable {
    name: String,
    columns: Vec<ColumnKey>,
    /// table -> field -> column index
    index: HashMap<String, HashMap<String, usize>>,
    live: Vec<Option<Scalar>>,
    rows: Vec<WideRow>,
    budget: RowBudget,
}

impl WideTable {
    pub fn new(name: impl Into<String>, max_rows: usize) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            index: HashMap::new(),
            live: Vec::new(),
            rows: Vec::new(),
            budget: RowBudget::new(max_rows),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnKey] {
        &self.columns
    }

    pub fn rows(&self) -> &[WideRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, table: &str, field: &str) -> Option<usize> {
        self.index.get(table)?.get(field).copied()
    }

    /// Update the live value of a column, creating it if new
    pub fn set(&mut self, table: &str, field: &str, value: Scalar) {
        let idx = match self.column_index(table, field) {
            Some(idx) => idx,
            None => self.add_column(table, field),
        };
        self.live[idx] = Some(value);
    }

    fn add_column(&mut self, table: &str, field: &str) -> usize {
        let idx = self.columns.len();
        self.columns.push(ColumnKey {
            table: table.to_string(),
            field: field.to_string(),
        });
        self.index
            .entry(table.to_string())
            .or_default()
            .insert(field.to_string(), idx);
        self.live.push(None);
        idx
    }

    /// Snapshot the live values as a new row; false if the row cap dropped it
    pub fn emit(&mut self, timestamp: f64) -> bool {
        if !self.budget.try_emit() {
            return false;
        }
        self.rows.push(WideRow {
            timestamp,
            values: self.live.clone(),
        });
        true
    }

    /// Cells of `row` padded to the table's full width
    pub fn cells<'a>(&'a self, row: &'a WideRow) -> impl Iterator<Item = Option<&'a Scalar>> + 'a {
        row.values
            .iter()
            .map(Option::as_ref)
            .chain(iter::repeat(None))
            .take(self.columns.len())
    }

    /// Look up a cell by `table.field` name
    pub fn cell(&self, row: usize, column: &str) -> Option<&Scalar> {
        let (table, field) = column.split_once('.')?;
        let idx = self.column_index(table, field)?;
        self.rows.get(row)?.values.get(idx)?.as_ref()
    }

    /// No further rows will be emitted
    pub fn is_full(&self) -> bool {
        self.budget.is_spent()
    }

    pub fn truncated(&self) -> bool {
        self.budget.truncated()
    }

    pub fn dropped(&self) -> u64 {
        self.budget.dropped()
    }

    pub fn cap_notice(&self) -> Option<CapReached> {
        self.budget.notice(&self.name)
    }
}

/// Write a record's fields into `table` under `name`
///
/// Multi-sender tables that are not split by source get `sysid`/`compid`
/// columns so the sender of each row stays visible.
fn apply_record(table: &mut WideTable, name: &str, record: &Record, split_by_source: bool) {
    for (field, value) in &record.fields {
        table.set(name, field, value.clone());
    }
    if !split_by_source && !record.source.is_local() {
        table.set(name, "sysid", Scalar::Int(i64::from(record.source.system)));
        table.set(name, "compid", Scalar::Int(i64::from(record.source.component)));
    }
}

/// Apply a record and emit its row; a full table only counts the drop, so
/// no column appears that no emitted row could fill
fn fill_and_emit(table: &mut WideTable, name: &str, record: &Record, split_by_source: bool) -> bool {
    if !table.is_full() {
        apply_record(table, name, record, split_by_source);
    }
    table.emit(record.timestamp)
}

/// One merged table with forward fill across every type
#[derive(Debug, Clone)]
pub struct ForwardFillMerger {
    split_by_source: bool,
    table: WideTable,
}

impl ForwardFillMerger {
    pub fn new(name: impl Into<String>, split_by_source: bool, max_rows: usize) -> Self {
        Self {
            split_by_source,
            table: WideTable::new(name, max_rows),
        }
    }

    /// Update columns and emit one row; false if the row was capped
    pub fn admit(&mut self, record: &Record) -> bool {
        let name = table_name(record, self.split_by_source);
        fill_and_emit(&mut self.table, &name, record, self.split_by_source)
    }

    pub fn table(&self) -> &WideTable {
        &self.table
    }

    pub fn into_table(self) -> WideTable {
        self.table
    }
}

/// One table per type (or type + source), forward filled independently
#[derive(Debug, Clone)]
pub struct ExplodedTables {
    split_by_source: bool,
    max_rows: usize,
    tables: BTreeMap<String, WideTable>,
}

impl ExplodedTables {
    pub fn new(split_by_source: bool, max_rows: usize) -> Self {
        Self {
            split_by_source,
            max_rows,
            tables: BTreeMap::new(),
        }
    }

    pub fn admit(&mut self, record: &Record) -> bool {
        let name = table_name(record, self.split_by_source);
        let max_rows = self.max_rows;
        let table = self
            .tables
            .entry(name.clone())
            .or_insert_with(|| WideTable::new(name.clone(), max_rows));
        fill_and_emit(table, &name, record, self.split_by_source)
    }

    pub fn get(&self, name: &str) -> Option<&WideTable> {
        self.tables.get(name)
    }

    /// Tables in name order
    pub fn tables(&self) -> impl Iterator<Item = &WideTable> {
        self.tables.values()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
