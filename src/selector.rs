//! Record type and source selection
//!
//! Supports:
//! - Individual types: `--types ATTITUDE,VFR_HUD`
//! - Type classes: `default`, `telemetry`, `dataflash`, `surftrak`, `ekf`, `fusion`
//! - Everything: `all`
//! - Sender filtering by system/component id

use crate::record::{Record, SourceKey};
use anyhow::{bail, Result};
use std::collections::HashSet;

/// Telemetry (tlog) types that look generally interesting
pub const TELEMETRY_TYPES: &[&str] = &[
    "AHRS",
    "AHRS2",
    "ATTITUDE",
    "BATTERY_STATUS",
    "EKF_STATUS_REPORT",
    "GLOBAL_POSITION_INT",
    "GLOBAL_VISION_POSITION_ESTIMATE",
    "GPS2_RAW",
    "GPS_GLOBAL_ORIGIN",
    "GPS_RAW_INT",
    "HEARTBEAT",
    "LOCAL_POSITION_NED",
    "POWER_STATUS",
    "RANGEFINDER",
    "RAW_IMU",
    "RC_CHANNELS",
    "SCALED_IMU2",
    "SCALED_PRESSURE",
    "SCALED_PRESSURE2",
    "SERVO_OUTPUT_RAW",
    "SET_GPS_GLOBAL_ORIGIN",
    "SYS_STATUS",
    "SYSTEM_TIME",
    "TIMESYNC",
    "VFR_HUD",
    "VISION_POSITION_DELTA",
];

/// Dataflash (BIN) types that look generally interesting
pub const DATAFLASH_TYPES: &[&str] = &[
    "AHR2", "ARM", "ATT", "BARO", "BAT", "CTRL", "CTUN", "DSF", "DU32", "EV", "FMT", "FMTU", "FTN",
    "GPS", "IMU", "MAG", "MAV", "MAVC", "MODE", "MOTB", "MSG", "MULT", "PARM", "PM", "PSCD", "RATE",
    "RCI2", "RCIN", "RCOU", "RFND", "XKFD",
];

/// Rangefinder / surface tracking analysis
pub const SURFTRAK_TYPES: &[&str] = &[
    "AHRS2",
    "DISTANCE_SENSOR",
    "HEARTBEAT",
    "NAMED_VALUE_FLOAT",
    "RANGEFINDER",
    "RC_CHANNELS",
    "ARM",
    "ATT",
    "BAT",
    "CTUN",
    "MODE",
    "RCIN",
    "RCOU",
    "RFND",
];

/// EKF3 estimator outputs
pub const EKF_TYPES: &[&str] = &[
    "XKF1", "XKF2", "XKF3", "XKF4", "XKF5", "XKFS", "XKQ", "XKT", "XKTV", "XKV1", "XKV2",
];

/// UGPS + DVL fusion
pub const FUSION_TYPES: &[&str] = &["GPS", "MAVC", "XKFD"];

/// Decides which record types reach the merger
#[derive(Debug, Clone)]
pub struct TypeSelector {
    /// Set of type names to include (None = all types)
    include: Option<HashSet<String>>,
}

impl TypeSelector {
    /// Select every type
    pub fn all() -> Self {
        Self { include: None }
    }

    /// The documented default: telemetry and dataflash "useful" lists
    pub fn useful() -> Self {
        let mut include = HashSet::new();
        include.extend(TELEMETRY_TYPES.iter().map(|s| s.to_string()));
        include.extend(DATAFLASH_TYPES.iter().map(|s| s.to_string()));
        Self {
            include: Some(include),
        }
    }

    /// Parse a comma separated list of types and classes
    pub fn from_spec(spec: &str) -> Result<Self> {
        let mut include = HashSet::new();

        for part in spec.split(',') {
            let part = part.trim();
            match part {
                "" => continue,
                "all" => return Ok(Self::all()),
                "default" => {
                    include.extend(TELEMETRY_TYPES.iter().map(|s| s.to_string()));
                    include.extend(DATAFLASH_TYPES.iter().map(|s| s.to_string()));
                }
                "telemetry" => include.extend(TELEMETRY_TYPES.iter().map(|s| s.to_string())),
                "dataflash" => include.extend(DATAFLASH_TYPES.iter().map(|s| s.to_string())),
                "surftrak" => include.extend(SURFTRAK_TYPES.iter().map(|s| s.to_string())),
                "ekf" => include.extend(EKF_TYPES.iter().map(|s| s.to_string())),
                "fusion" => include.extend(FUSION_TYPES.iter().map(|s| s.to_string())),
                name => {
                    if !name
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_')
                    {
                        bail!(
                            "Invalid type name: {}. Expected a message name or one of: all, default, telemetry, dataflash, surftrak, ekf, fusion",
                            name
                        );
                    }
                    include.insert(name.to_string());
                }
            }
        }

        if include.is_empty() {
            bail!("Type list is empty");
        }

        Ok(Self {
            include: Some(include),
        })
    }

    /// Check if a type should be kept
    pub fn wants(&self, msg_type: &str) -> bool {
        match &self.include {
            None => true,
            Some(set) => set.contains(msg_type),
        }
    }

    /// Sorted list of selected types, `None` when everything is selected
    pub fn selected(&self) -> Option<Vec<&str>> {
        self.include.as_ref().map(|set| {
            let mut names: Vec<&str> = set.iter().map(String::as_str).collect();
            names.sort_unstable();
            names
        })
    }
}

/// Restricts the stream to one system and/or component (0 = any)
///
/// Single-sender logs carry [`SourceKey::LOCAL`] and always pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceFilter {
    pub system: u8,
    pub component: u8,
}

impl SourceFilter {
    pub fn new(system: u8, component: u8) -> Self {
        Self { system, component }
    }

    pub fn accepts(&self, source: SourceKey) -> bool {
        if source.is_local() {
            return true;
        }
        (self.system == 0 || self.system == source.system)
            && (self.component == 0 || self.component == source.component)
    }
}

/// Table a record's columns belong to: `TYPE`, or `TYPE_sys_comp` when split by source
pub fn table_name(record: &Record, split_by_source: bool) -> String {
    if split_by_source {
        format!("{}_{}", record.msg_type, record.source)
    } else {
        record.msg_type.clone()
    }
}

/// Autopilot component; in surftrak mode the only trusted HEARTBEAT sender
pub const AUTOPILOT_COMPONENT: u8 = 1;

/// Combined type + source selection
#[derive(Debug, Clone)]
pub struct RecordSelector {
    pub types: TypeSelector,
    pub sources: SourceFilter,
    /// Keep one sender per surftrak type: rangefinder readings from the
    /// companion computer, HEARTBEAT from the autopilot
    pub surftrak: bool,
}

impl RecordSelector {
    pub fn new(types: TypeSelector, sources: SourceFilter) -> Self {
        Self {
            types,
            sources,
            surftrak: false,
        }
    }

    pub fn with_surftrak(mut self, surftrak: bool) -> Self {
        self.surftrak = surftrak;
        self
    }

    pub fn admits(&self, record: &Record) -> bool {
        self.sources.accepts(record.source)
            && self.types.wants(&record.msg_type)
            && !(self.surftrak && is_surftrak_duplicate(record))
    }
}

/// DISTANCE_SENSOR echoed by the autopilot, or HEARTBEAT from anything else
fn is_surftrak_duplicate(record: &Record) -> bool {
    if record.source.is_local() {
        return false;
    }
    match record.msg_type.as_str() {
        "DISTANCE_SENSOR" => record.source.component == AUTOPILOT_COMPONENT,
        "HEARTBEAT" => record.source.component != AUTOPILOT_COMPONENT,
        _ => false,
    }
}
