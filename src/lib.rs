//! mavmerge - merge MAVLink telemetry and dataflash logs into wide tables
//!
//! Records from several logs are merged by timestamp, optionally shifted from
//! boot-relative to wall-clock time, restricted to named time segments, and
//! forward filled into one column-stable table per segment (and/or one table
//! per type). Binary decoding is left to an external tool; the crate reads
//! its JSON-lines dumps through the [`source::Decoder`] trait.

pub mod cli;
pub mod clock;
pub mod config;
pub mod csv_output;
pub mod enrich;
pub mod json_output;
pub mod limits;
pub mod merger;
pub mod pipeline;
pub mod rate;
pub mod record;
pub mod router;
pub mod segment;
pub mod selector;
pub mod source;
pub mod stream;
