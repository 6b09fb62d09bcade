//! Comprehensive property-based tests for pre-commit hook
//!
//! Designed to run in a few seconds as a pre-commit quality gate.
//!
//! Core properties tested:
//! 1. Every row of a table has the same columns
//! 2. Forward fill carries untouched columns unchanged
//! 3. Segment containment
//! 4. Minimum-candidate clock offset
//! 5. Row and message caps
//! 6. Split-by-source column families
//! 7. Ordered k-way merge across files
//! 8. Parsers never panic

use mavmerge::clock::{estimate, ClockConfig};
use mavmerge::limits::MessageBudget;
use mavmerge::merger::ForwardFillMerger;
use mavmerge::record::{LogFormat, Record, Scalar, SourceKey, TimeBase};
use mavmerge::segment::{Segment, SegmentFilter};
use mavmerge::source::{parse_line, DecodeError, LogFile, SourceError};
use mavmerge::stream::{LogStream, StreamOptions};
use proptest::prelude::*;
use std::path::PathBuf;

/// (timestamp, type index, field index, value)
fn arb_records() -> impl Strategy<Value = Vec<Record>> {
    prop::collection::vec((0.0f64..1000.0, 0usize..4, 0usize..5, -1000i64..1000), 1..60).prop_map(
        |mut raw| {
            raw.sort_by(|a, b| a.0.total_cmp(&b.0));
            raw.into_iter()
                .map(|(t, ty, field, value)| {
                    Record::new(t, format!("TYPE{}", ty), SourceKey::new(1, 1))
                        .with_field(format!("f{}", field), value)
                })
                .collect()
        },
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_rows_have_identical_width(records in arb_records()) {
        let mut merger = ForwardFillMerger::new("merged", false, usize::MAX);
        for record in &records {
            merger.admit(record);
        }
        let table = merger.table();
        let width = table.columns().len();
        for row in table.rows() {
            prop_assert_eq!(table.cells(row).count(), width);
        }
    }

    #[test]
    fn prop_forward_fill_carries_untouched_columns(records in arb_records()) {
        let mut merger = ForwardFillMerger::new("merged", true, usize::MAX);
        for record in &records {
            merger.admit(record);
        }
        let table = merger.table();
        let rows = table.rows();

        for i in 1..rows.len() {
            let touched = &records[i];
            let prev: Vec<_> = table.cells(&rows[i - 1]).collect();
            let cur: Vec<_> = table.cells(&rows[i]).collect();
            for (idx, column) in table.columns().iter().enumerate() {
                let was_touched = column.table == format!("{}_{}", touched.msg_type, touched.source)
                    && touched.fields.contains_key(&column.field);
                if !was_touched {
                    prop_assert_eq!(prev[idx], cur[idx]);
                }
            }
        }
    }

    #[test]
    fn prop_segment_containment(
        records in arb_records(),
        start in 0.0f64..500.0,
        len in 0.0f64..500.0,
    ) {
        let segment = Segment::new(start, start + len, None);
        let mut filter = SegmentFilter::new(vec![segment.clone()], "unused");
        let mut merger = ForwardFillMerger::new("seg", false, usize::MAX);
        let mut matches = Vec::new();

        for record in &records {
            filter.route(record.timestamp, &mut matches);
            if !matches.is_empty() {
                merger.admit(record);
            }
        }

        let expected = records.iter().filter(|r| segment.contains(r.timestamp)).count();
        prop_assert_eq!(merger.table().len(), expected);
        for row in merger.table().rows() {
            prop_assert!(segment.start <= row.timestamp && row.timestamp <= segment.end);
        }
    }

    #[test]
    fn prop_clock_offset_is_minimum(
        offset in -1.0e6f64..1.0e6,
        jitter in prop::collection::vec(0.0f64..5.0, 0..30),
        boots in prop::collection::vec(0.0f64..10_000.0, 31),
        zero_at in 0usize..31,
    ) {
        let config = ClockConfig {
            boot_field: "boot".to_string(),
            boot_scale: 1.0,
            ..ClockConfig::default()
        };

        let mut delays = jitter.clone();
        delays.insert(zero_at.min(delays.len()), 0.0);
        let records: Vec<Record> = delays
            .iter()
            .zip(&boots)
            .map(|(delay, boot)| {
                Record::new(boot + offset + delay, "SYSTEM_TIME", SourceKey::new(1, 1))
                    .with_field("boot", *boot)
            })
            .collect();

        let estimated = estimate(&config, &records).unwrap();
        prop_assert!((estimated.offset - offset).abs() < 1e-6);
        prop_assert!(estimated.spread() >= 0.0);
    }

    #[test]
    fn prop_row_cap_holds(records in arb_records(), max_rows in 1usize..30) {
        let mut merger = ForwardFillMerger::new("merged", false, max_rows);
        for record in &records {
            merger.admit(record);
        }
        let table = merger.table();
        prop_assert!(table.len() <= max_rows);
        prop_assert_eq!(table.truncated(), records.len() > max_rows);
    }

    #[test]
    fn prop_message_budget_holds(limit in 0u64..100, attempts in 0u64..200) {
        let mut budget = MessageBudget::new(limit);
        let granted = (0..attempts).filter(|_| budget.take()).count() as u64;
        prop_assert_eq!(granted, limit.min(attempts));
    }

    #[test]
    fn prop_split_source_never_shares_columns(
        values in prop::collection::vec((1u8..5, -100i64..100), 1..40),
    ) {
        let mut merger = ForwardFillMerger::new("merged", true, usize::MAX);
        for (i, (system, value)) in values.iter().enumerate() {
            merger.admit(
                &Record::new(i as f64, "HEARTBEAT", SourceKey::new(*system, 1))
                    .with_field("v", *value),
            );
        }
        let table = merger.table();
        let last = table.len() - 1;
        for system in 1u8..5 {
            let expected = values.iter().rev().find(|(s, _)| *s == system).map(|(_, v)| Scalar::Int(*v));
            let column = format!("HEARTBEAT_{}_1.v", system);
            prop_assert_eq!(table.cell(last, &column).cloned(), expected);
        }
    }

    #[test]
    fn prop_stream_is_ordered_and_complete(
        files in prop::collection::vec(prop::collection::vec(0.0f64..100.0, 0..20), 1..5),
    ) {
        let total: usize = files.iter().map(Vec::len).sum();
        let logs = files.into_iter().enumerate().map(|(i, mut times)| {
            times.sort_by(f64::total_cmp);
            let records = times
                .into_iter()
                .map(|t| Ok::<_, DecodeError>(Record::new(t, "A", SourceKey::LOCAL)))
                .collect::<Vec<_>>();
            Ok::<_, SourceError>(LogFile {
                path: PathBuf::from(format!("{}.jsonl", i)),
                format: LogFormat::Dataflash,
                time_base: TimeBase::WallClock,
                records: Box::new(records.into_iter()),
            })
        });

        let merged: Vec<_> = LogStream::from_files(logs, StreamOptions::default()).collect();
        prop_assert_eq!(merged.len(), total);
        for pair in merged.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            prop_assert!(a.record.timestamp < b.record.timestamp
                || (a.record.timestamp == b.record.timestamp && a.file <= b.file));
        }
    }

    #[test]
    fn prop_segment_parser_never_panics(s in "\\PC{0,40}") {
        let _ = s.parse::<Segment>();
    }

    #[test]
    fn prop_record_parser_never_panics(s in "\\PC{0,80}") {
        let _ = parse_line(1, &s);
    }
}
