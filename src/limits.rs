//! Message and row caps
//!
//! Both caps are safety valves: hitting one truncates the output and is
//! reported, it never fails the run.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Records pulled from all inputs combined
    pub max_msgs: u64,
    /// Rows emitted per output table
    pub max_rows: usize,
}

impl Limits {
    pub const DEFAULT_MAX_MSGS: u64 = 500_000;
    pub const DEFAULT_MAX_ROWS: usize = 500_000;
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_msgs: Self::DEFAULT_MAX_MSGS,
            max_rows: Self::DEFAULT_MAX_ROWS,
        }
    }
}

/// Truncation notice
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "cap", rename_all = "snake_case")]
pub enum CapReached {
    /// Stopped reading input
    Messages { limit: u64 },
    /// Stopped emitting rows into one table
    Rows {
        table: String,
        limit: usize,
        dropped: u64,
    },
}

impl fmt::Display for CapReached {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapReached::Messages { limit } => {
                write!(f, "message cap of {} reached, remaining input not read", limit)
            }
            CapReached::Rows {
                table,
                limit,
                dropped,
            } => write!(
                f,
                "row cap of {} reached for {}, {} rows dropped",
                limit, table, dropped
            ),
        }
    }
}

/// Counts records pulled from the stream
#[derive(Debug, Clone)]
pub struct MessageBudget {
    limit: u64,
    taken: u64,
}

impl MessageBudget {
    pub fn new(limit: u64) -> Self {
        Self { limit, taken: 0 }
    }

    /// Claim one record; false once the cap is spent
    pub fn take(&mut self) -> bool {
        if self.taken >= self.limit {
            return false;
        }
        self.taken += 1;
        true
    }

    pub fn taken(&self) -> u64 {
        self.taken
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }
}

/// Counts rows emitted into one table
#[derive(Debug, Clone)]
pub struct RowBudget {
    limit: usize,
    emitted: usize,
    dropped: u64,
}

impl RowBudget {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            emitted: 0,
            dropped: 0,
        }
    }

    /// Claim one row; counts a drop once the cap is spent
    pub fn try_emit(&mut self) -> bool {
        if self.emitted >= self.limit {
            self.dropped += 1;
            return false;
        }
        self.emitted += 1;
        true
    }

    /// Every row the cap allows has been emitted
    pub fn is_spent(&self) -> bool {
        self.emitted >= self.limit
    }

    pub fn truncated(&self) -> bool {
        self.dropped > 0
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn notice(&self, table: &str) -> Option<CapReached> {
        self.truncated().then(|| CapReached::Rows {
            table: table.to_string(),
            limit: self.limit,
            dropped: self.dropped,
        })
    }
}
