//! Per-type derived fields and warm-up filtering
//!
//! Adds convenience columns (degrees, meters, combined flight mode), renames
//! RC channels after the axis they drive, drops known-bad readings and splits
//! EKF tables per core. `raw` keeps every reading.

use crate::record::{Record, Scalar};

/// Types whose fields are lat/lon in degE7
const GPS_TYPES: &[&str] = &["GLOBAL_POSITION_INT", "GPS_INPUT", "GPS_RAW_INT", "GPS2_RAW"];

/// EKF3 tables logged once per core, distinguished by field `C`
const EKF_CORE_TYPES: &[&str] = &["XKF1", "XKF2", "XKF3", "XKF4", "XKFS", "XKQ", "XKT", "XKTV"];

/// RC channel -> axis, ArduSub default mapping
const RC_AXES: &[(u8, &str)] = &[
    (1, "pitch"),
    (2, "roll"),
    (3, "throttle"),
    (4, "yaw"),
    (5, "forward"),
    (6, "lateral"),
];

/// `HEARTBEAT.mode` value when the vehicle is disarmed
pub const MODE_DISARMED: i64 = -10;

/// Armed flag in `HEARTBEAT.base_mode`
const MAV_MODE_FLAG_SAFETY_ARMED: i64 = 128;

#[derive(Debug, Clone, Copy)]
pub struct Enricher {
    raw: bool,
    hdop_max: f64,
}

impl Default for Enricher {
    fn default() -> Self {
        Self::new(false, 100.0)
    }
}

impl Enricher {
    pub fn new(raw: bool, hdop_max: f64) -> Self {
        Self { raw, hdop_max }
    }

    /// Enrich a record, or drop it (`None`) when it is a known-bad reading
    pub fn apply(&self, mut record: Record) -> Option<Record> {
        match record.msg_type.as_str() {
            "HEARTBEAT" => add_heartbeat_mode(&mut record),
            "DISTANCE_SENSOR" => {
                scale_into(&mut record, "current_distance", "current_distance_m", 0.01)
            }
            "AHRS2" => {
                for axis in ["roll", "pitch", "yaw"] {
                    if let Some(radians) = record.number(axis) {
                        record
                            .fields
                            .insert(format!("{axis}_deg"), Scalar::Float(radians.to_degrees()));
                    }
                }
            }
            "RC_CHANNELS" => rename_rc(&mut record, |n| format!("chan{n}_raw")),
            "RCIN" => rename_rc(&mut record, |n| format!("C{n}")),
            "BARO" if !self.raw && is_zero(&record, "I") => return None,
            "AHR2" if !self.raw && is_zero(&record, "Lat") => return None,
            t if GPS_TYPES.contains(&t) => {
                if !self.raw && self.is_gps_warm_up(&record) {
                    return None;
                }
                add_gps_units(&mut record);
            }
            t if EKF_CORE_TYPES.contains(&t) => {
                if let Some(core) = record.field("C").and_then(Scalar::as_i64) {
                    record.msg_type = format!("{}_core{}", record.msg_type, core);
                }
            }
            _ => {}
        }
        Some(record)
    }

    /// Receivers report lat=lon=0, a poor fix or a huge hdop while warming up
    fn is_gps_warm_up(&self, record: &Record) -> bool {
        if is_zero(record, "lat") && is_zero(record, "lon") {
            return true;
        }
        if record.number("fix_type").is_some_and(|fix| fix < 3.0) {
            return true;
        }
        if record.number("hdop").is_some_and(|hdop| hdop > self.hdop_max) {
            return true;
        }
        record
            .number("eph")
            .is_some_and(|eph| eph / 100.0 > self.hdop_max)
    }
}

/// Combined armed state and flight mode
pub fn combined_mode(base_mode: i64, custom_mode: i64) -> i64 {
    if base_mode >= MAV_MODE_FLAG_SAFETY_ARMED {
        custom_mode
    } else {
        MODE_DISARMED
    }
}

fn add_heartbeat_mode(record: &mut Record) {
    let base = record.field("base_mode").and_then(Scalar::as_i64);
    let custom = record.field("custom_mode").and_then(Scalar::as_i64);
    if let (Some(base), Some(custom)) = (base, custom) {
        record
            .fields
            .insert("mode".to_string(), Scalar::Int(combined_mode(base, custom)));
    }
}

fn add_gps_units(record: &mut Record) {
    scale_into(record, "lat", "lat_deg", 1e-7);
    scale_into(record, "lon", "lon_deg", 1e-7);
    if record.msg_type == "GLOBAL_POSITION_INT" {
        scale_into(record, "hdg", "hdg_deg", 0.01);
        scale_into(record, "alt", "alt_m", 0.001);
        scale_into(record, "relative_alt", "relative_alt_m", 0.001);
    }
    scale_into(record, "yaw", "yaw_deg", 0.01);
}

fn scale_into(record: &mut Record, from: &str, to: &str, factor: f64) {
    if let Some(v) = record.number(from) {
        record.fields.insert(to.to_string(), Scalar::Float(v * factor));
    }
}

fn rename_rc(record: &mut Record, field_name: impl Fn(u8) -> String) {
    for (channel, axis) in RC_AXES {
        let old = field_name(*channel);
        if let Some(value) = record.fields.remove(&old) {
            record.fields.insert(format!("{old}_{axis}"), value);
        }
    }
}

fn is_zero(record: &Record, field: &str) -> bool {
    record.number(field) == Some(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::SourceKey;

    fn enrich(record: Record) -> Option<Record> {
        Enricher::default().apply(record)
    }

    #[test]
    fn test_combined_mode() {
        assert_eq!(combined_mode(209, 19), 19);
        assert_eq!(combined_mode(81, 19), MODE_DISARMED);
    }

    #[test]
    fn test_heartbeat_mode_field() {
        let record = Record::new(1.0, "HEARTBEAT", SourceKey::new(1, 1))
            .with_field("base_mode", 209i64)
            .with_field("custom_mode", 2i64);
        let record = enrich(record).unwrap();
        assert_eq!(record.field("mode"), Some(&Scalar::Int(2)));
    }

    #[test]
    fn test_gps_warm_up_dropped() {
        let warm_up = Record::new(1.0, "GPS_RAW_INT", SourceKey::new(1, 1))
            .with_field("lat", 0i64)
            .with_field("lon", 0i64);
        assert!(enrich(warm_up).is_none());

        let poor_fix = Record::new(1.0, "GPS_RAW_INT", SourceKey::new(1, 1))
            .with_field("lat", 473_977_418i64)
            .with_field("lon", 85_455_938i64)
            .with_field("fix_type", 1i64);
        assert!(enrich(poor_fix).is_none());

        let high_eph = Record::new(1.0, "GPS_RAW_INT", SourceKey::new(1, 1))
            .with_field("lat", 473_977_418i64)
            .with_field("lon", 85_455_938i64)
            .with_field("eph", 65_535i64);
        assert!(enrich(high_eph).is_none());
    }

    #[test]
    fn test_gps_warm_up_kept_when_raw() {
        let warm_up = Record::new(1.0, "GPS_RAW_INT", SourceKey::new(1, 1))
            .with_field("lat", 0i64)
            .with_field("lon", 0i64);
        assert!(Enricher::new(true, 100.0).apply(warm_up).is_some());
    }

    #[test]
    fn test_global_position_units() {
        let record = Record::new(1.0, "GLOBAL_POSITION_INT", SourceKey::new(1, 1))
            .with_field("lat", 473_977_418i64)
            .with_field("lon", 85_455_938i64)
            .with_field("hdg", 18_000i64)
            .with_field("alt", 12_500i64)
            .with_field("relative_alt", -2_000i64);
        let record = enrich(record).unwrap();
        assert!((record.number("lat_deg").unwrap() - 47.3977418).abs() < 1e-9);
        assert!((record.number("lon_deg").unwrap() - 8.5455938).abs() < 1e-9);
        assert_eq!(record.number("hdg_deg"), Some(180.0));
        assert_eq!(record.number("alt_m"), Some(12.5));
        assert_eq!(record.number("relative_alt_m"), Some(-2.0));
    }

    #[test]
    fn test_distance_sensor_meters() {
        let record = Record::new(1.0, "DISTANCE_SENSOR", SourceKey::new(1, 194))
            .with_field("current_distance", 250i64);
        let record = enrich(record).unwrap();
        assert_eq!(record.number("current_distance_m"), Some(2.5));
    }

    #[test]
    fn test_ahrs2_degrees() {
        let record = Record::new(1.0, "AHRS2", SourceKey::new(1, 1))
            .with_field("roll", std::f64::consts::PI)
            .with_field("pitch", 0.0)
            .with_field("yaw", -std::f64::consts::FRAC_PI_2);
        let record = enrich(record).unwrap();
        assert!((record.number("roll_deg").unwrap() - 180.0).abs() < 1e-9);
        assert!((record.number("yaw_deg").unwrap() + 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_rc_channel_renames() {
        let record = Record::new(1.0, "RC_CHANNELS", SourceKey::new(1, 1))
            .with_field("chan3_raw", 1500i64)
            .with_field("chan9_raw", 1100i64);
        let record = enrich(record).unwrap();
        assert_eq!(record.field("chan3_raw_throttle"), Some(&Scalar::Int(1500)));
        assert!(record.field("chan3_raw").is_none());
        assert_eq!(record.field("chan9_raw"), Some(&Scalar::Int(1100)));

        let rcin = Record::new(1.0, "RCIN", SourceKey::LOCAL).with_field("C5", 1600i64);
        let rcin = enrich(rcin).unwrap();
        assert_eq!(rcin.field("C5_forward"), Some(&Scalar::Int(1600)));
    }

    #[test]
    fn test_dataflash_drops() {
        let baro = Record::new(1.0, "BARO", SourceKey::LOCAL).with_field("I", 0i64);
        assert!(enrich(baro.clone()).is_none());
        assert!(Enricher::new(true, 100.0).apply(baro).is_some());

        let external = Record::new(1.0, "BARO", SourceKey::LOCAL).with_field("I", 1i64);
        assert!(enrich(external).is_some());

        let ahr2 = Record::new(1.0, "AHR2", SourceKey::LOCAL).with_field("Lat", 0i64);
        assert!(enrich(ahr2).is_none());
    }

    #[test]
    fn test_ekf_core_split() {
        let record = Record::new(1.0, "XKF1", SourceKey::LOCAL).with_field("C", 1i64);
        assert_eq!(enrich(record).unwrap().msg_type, "XKF1_core1");

        let without_core = Record::new(1.0, "XKF1", SourceKey::LOCAL);
        assert_eq!(enrich(without_core).unwrap().msg_type, "XKF1");
    }
}
