//! CLI argument parsing for mavmerge

use crate::config::MergeConfig;
use crate::segment::{parse_segments, SegmentParseError};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mavmerge")]
#[command(version)]
#[command(
    about = "Merge MAVLink telemetry and dataflash record dumps into forward-filled wide tables",
    long_about = None
)]
pub struct Cli {
    /// Input logs (JSON lines), merged in the given order
    #[arg(required = true, value_name = "PATH")]
    pub paths: Vec<PathBuf>,

    /// Keep only START,END[,NAME] (Unix seconds); repeatable, may overlap
    #[arg(short = 'k', long = "keep", value_name = "START,END[,NAME]")]
    pub keep: Vec<String>,

    /// Types to merge: names and classes (all, default, telemetry, dataflash, surftrak, ekf, fusion)
    #[arg(long = "types", value_name = "LIST")]
    pub types: Option<String>,

    /// Only keep messages from this system id
    #[arg(long = "sysid", value_name = "ID")]
    pub sysid: Option<u8>,

    /// Only keep messages from this component id
    #[arg(long = "compid", value_name = "ID")]
    pub compid: Option<u8>,

    /// Separate columns per sender (TYPE_sys_comp.field)
    #[arg(long = "split-source")]
    pub split_source: bool,

    /// Surface-tracking analysis: surftrak types, rangefinder from the
    /// companion computer and HEARTBEAT from the autopilot only
    #[arg(long = "surftrak")]
    pub surftrak: bool,

    /// Also write one table per type
    #[arg(long = "explode")]
    pub explode: bool,

    /// Skip the merged table (use with --explode)
    #[arg(long = "no-merge")]
    pub no_merge: bool,

    /// Stop after reading this many records
    #[arg(long = "max-msgs", value_name = "N")]
    pub max_msgs: Option<u64>,

    /// Stop emitting rows into a table after this many
    #[arg(long = "max-rows", value_name = "N")]
    pub max_rows: Option<usize>,

    /// Add a TYPE.rate column
    #[arg(long = "rate")]
    pub rate: bool,

    /// Shift boot-relative logs onto the wall clock of the telemetry logs
    #[arg(long = "align-clocks")]
    pub align_clocks: bool,

    /// Only scan this many records when estimating the clock offset
    #[arg(long = "align-prefix", value_name = "N")]
    pub align_prefix: Option<u64>,

    /// Boot-relative field used for clock alignment
    #[arg(long = "boot-field", value_name = "FIELD")]
    pub boot_field: Option<String>,

    /// Seconds per unit of --boot-field
    #[arg(long = "boot-scale", value_name = "SCALE")]
    pub boot_scale: Option<f64>,

    /// Keep GPS warm-up and other known-bad readings
    #[arg(long = "raw")]
    pub raw: bool,

    /// Decode each input on its own thread
    #[arg(long = "decode-ahead")]
    pub decode_ahead: bool,

    /// Write tables here instead of next to the first input
    #[arg(long = "out-dir", value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Write a JSON summary and rate report
    #[arg(long = "report", value_name = "FILE.json")]
    pub report: Option<PathBuf>,

    /// TOML configuration file; flags override its values
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Enable debug tracing output to stderr
    #[arg(long = "debug")]
    pub debug: bool,
}

impl Cli {
    /// Overlay command-line flags onto `config`
    pub fn apply_to(&self, config: &mut MergeConfig) -> Result<(), SegmentParseError> {
        if !self.keep.is_empty() {
            config.segments = parse_segments(&self.keep)?;
        }
        if let Some(types) = &self.types {
            config.types = types.clone();
        } else if self.surftrak && config.types == MergeConfig::default().types {
            config.types = "surftrak".to_string();
        }
        if let Some(sysid) = self.sysid {
            config.sysid = sysid;
        }
        if let Some(compid) = self.compid {
            config.compid = compid;
        }
        if let Some(max_msgs) = self.max_msgs {
            config.limits.max_msgs = max_msgs;
        }
        if let Some(max_rows) = self.max_rows {
            config.limits.max_rows = max_rows;
        }
        if let Some(prefix) = self.align_prefix {
            config.clock.max_records = Some(prefix);
        }
        if let Some(field) = &self.boot_field {
            config.clock.boot_field = field.clone();
        }
        if let Some(scale) = self.boot_scale {
            config.clock.boot_scale = scale;
        }
        if let Some(dir) = &self.out_dir {
            config.output.out_dir = Some(dir.clone());
        }

        config.split_source |= self.split_source;
        config.surftrak |= self.surftrak;
        config.output.explode |= self.explode;
        config.output.merge &= !self.no_merge;
        config.rate.add_field |= self.rate;
        config.clock.align |= self.align_clocks;
        config.raw |= self.raw;
        config.decode_ahead |= self.decode_ahead;
        Ok(())
    }
}
