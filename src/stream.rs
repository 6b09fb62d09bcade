//! Logical concatenated stream over several logs
//!
//! Files are merged by timestamp (k-way merge over per-file heads), stable by
//! file order on ties, so logs that overlap in time still come out ordered.
//! Within one file records keep their original order even if timestamps step
//! backwards.
//!
//! With decode-ahead enabled every file is decoded on its own worker thread
//! into a bounded channel; the merge itself stays on the consuming thread.
//! A record limit caps how far any file is decoded, inline or ahead: the
//! limit plus one lookahead head per file.

use crate::record::{LogFormat, Record, TimeBase};
use crate::source::{DecodeError, Decoded, LogFile, RecordIter, SourceError};
use crossbeam::channel::{self, Receiver};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use tracing::{debug, trace, warn};

/// Records buffered per file when decoding ahead
pub const DECODE_AHEAD_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamOptions {
    /// Pass checksum-invalid records through instead of skipping them
    pub tolerate_bad_checksum: bool,
    /// Decode each file on a worker thread
    pub decode_ahead: bool,
    /// Most records the consumer will take in total (`None` = unbounded)
    pub max_records: Option<u64>,
}

impl StreamOptions {
    /// Usable records any one file may decode: the limit plus its lookahead head
    fn file_quota(&self) -> Option<u64> {
        self.max_records.map(|max| max.saturating_add(1))
    }
}

/// Per-file counters for the end-of-run summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub format: Option<LogFormat>,
    pub time_base: Option<TimeBase>,
    /// Records handed to the consumer
    pub records: u64,
    pub decode_errors: u64,
    pub bad_checksums: u64,
    pub open_error: Option<String>,
    pub first_timestamp: Option<f64>,
    pub last_timestamp: Option<f64>,
    /// Seconds added to every timestamp of this file
    pub time_shift: f64,
}

impl FileReport {
    fn opened(file: &LogFile, time_shift: f64) -> Self {
        Self {
            path: file.path.clone(),
            format: Some(file.format),
            time_base: Some(file.time_base),
            records: 0,
            decode_errors: 0,
            bad_checksums: 0,
            open_error: None,
            first_timestamp: None,
            last_timestamp: None,
            time_shift,
        }
    }

    fn failed(err: &SourceError) -> Self {
        Self {
            path: err.path().to_path_buf(),
            format: None,
            time_base: None,
            records: 0,
            decode_errors: 0,
            bad_checksums: 0,
            open_error: Some(err.to_string()),
            first_timestamp: None,
            last_timestamp: None,
            time_shift: 0.0,
        }
    }
}

/// A record plus the index of the file it came from
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRecord {
    pub file: usize,
    pub record: Record,
}

/// Stops pulling from a file once it has produced its quota of usable records
struct Quota {
    records: RecordIter,
    remaining: u64,
    tolerate_bad_checksum: bool,
}

impl Quota {
    fn wrap(records: RecordIter, options: &StreamOptions) -> RecordIter {
        match options.file_quota() {
            Some(remaining) => Box::new(Quota {
                records,
                remaining,
                tolerate_bad_checksum: options.tolerate_bad_checksum,
            }),
            None => records,
        }
    }
}

impl Iterator for Quota {
    type Item = Decoded;

    fn next(&mut self) -> Option<Decoded> {
        if self.remaining == 0 {
            return None;
        }
        let item = self.records.next()?;
        let usable = match &item {
            Ok(_) => true,
            Err(DecodeError::BadChecksum { .. }) => self.tolerate_bad_checksum,
            Err(DecodeError::Malformed { .. }) => false,
        };
        if usable {
            self.remaining -= 1;
        }
        Some(item)
    }
}

/// Decoder output, either read inline or from a worker thread
enum Feed {
    Inline(RecordIter),
    Worker(Worker),
}

impl Feed {
    fn next(&mut self) -> Option<Decoded> {
        match self {
            Feed::Inline(records) => records.next(),
            Feed::Worker(worker) => worker.rx.as_ref()?.recv().ok(),
        }
    }
}

struct Worker {
    rx: Option<Receiver<Decoded>>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    fn spawn(file: usize, records: RecordIter, capacity: usize) -> Self {
        let (tx, rx) = channel::bounded(capacity);
        let handle = thread::spawn(move || {
            for item in records {
                // Consumer hung up (cap reached or segments closed)
                if tx.send(item).is_err() {
                    trace!(file, "decode-ahead worker stopping early");
                    return;
                }
            }
        });
        Self {
            rx: Some(rx),
            handle: Some(handle),
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        // Disconnect first so a worker blocked on a full channel wakes up
        self.rx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("decode-ahead worker panicked");
            }
        }
    }
}

struct Cursor {
    feed: Option<Feed>,
    head: Option<Record>,
    shift: f64,
}

/// Heap entry; `Ord` is reversed so the max-heap pops the earliest head
#[derive(Debug)]
struct HeadKey {
    timestamp: f64,
    file: usize,
}

impl Ord for HeadKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .timestamp
            .total_cmp(&self.timestamp)
            .then_with(|| other.file.cmp(&self.file))
    }
}

impl PartialOrd for HeadKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HeadKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeadKey {}

/// Ordered record stream over every input file
pub struct LogStream {
    options: StreamOptions,
    cursors: Vec<Cursor>,
    reports: Vec<FileReport>,
    heap: BinaryHeap<HeadKey>,
}

impl LogStream {
    pub fn new(options: StreamOptions) -> Self {
        Self {
            options,
            cursors: Vec::new(),
            reports: Vec::new(),
            heap: BinaryHeap::new(),
        }
    }

    /// Convenience: add every file unshifted
    pub fn from_files<I>(files: I, options: StreamOptions) -> Self
    where
        I: IntoIterator<Item = Result<LogFile, SourceError>>,
    {
        let mut stream = Self::new(options);
        for file in files {
            stream.push_file(file, 0.0);
        }
        stream
    }

    /// Add the next input in file order; `shift` seconds are added to its timestamps
    ///
    /// A file that failed to open is recorded and contributes no records.
    pub fn push_file(&mut self, file: Result<LogFile, SourceError>, shift: f64) {
        let index = self.cursors.len();
        match file {
            Ok(file) => {
                debug!(
                    file = index,
                    path = %file.path.display(),
                    format = ?file.format,
                    time_base = ?file.time_base,
                    shift,
                    "adding log to stream"
                );
                self.reports.push(FileReport::opened(&file, shift));
                let records = Quota::wrap(file.records, &self.options);
                let feed = if self.options.decode_ahead {
                    let capacity = self
                        .options
                        .file_quota()
                        .map_or(DECODE_AHEAD_CAPACITY, |quota| {
                            quota.min(DECODE_AHEAD_CAPACITY as u64) as usize
                        });
                    Feed::Worker(Worker::spawn(index, records, capacity))
                } else {
                    Feed::Inline(records)
                };
                self.cursors.push(Cursor {
                    feed: Some(feed),
                    head: None,
                    shift,
                });
                self.advance(index);
            }
            Err(err) => {
                warn!("{}", err);
                self.reports.push(FileReport::failed(&err));
                self.cursors.push(Cursor {
                    feed: None,
                    head: None,
                    shift: 0.0,
                });
            }
        }
    }

    /// Decode the next usable record of `file` into its head slot
    fn advance(&mut self, file: usize) {
        let tolerate = self.options.tolerate_bad_checksum;
        let cursor = &mut self.cursors[file];
        let report = &mut self.reports[file];

        loop {
            let Some(item) = cursor.feed.as_mut().and_then(Feed::next) else {
                // Exhausted; dropping the feed joins its worker
                cursor.feed = None;
                return;
            };

            let mut record = match item {
                Ok(record) => record,
                Err(DecodeError::BadChecksum { line, record }) => {
                    report.bad_checksums += 1;
                    if !tolerate {
                        debug!(file, line, msg_type = %record.msg_type, "skipping record with bad checksum");
                        continue;
                    }
                    *record
                }
                Err(err @ DecodeError::Malformed { .. }) => {
                    report.decode_errors += 1;
                    debug!(file, "{}", err);
                    continue;
                }
            };

            record.timestamp += cursor.shift;
            self.heap.push(HeadKey {
                timestamp: record.timestamp,
                file,
            });
            cursor.head = Some(record);
            return;
        }
    }

    /// True while any file still has a record to give
    pub fn has_pending(&self) -> bool {
        !self.heap.is_empty()
    }

    pub fn reports(&self) -> &[FileReport] {
        &self.reports
    }

    /// Stop reading and hand back the per-file counters
    pub fn into_reports(self) -> Vec<FileReport> {
        self.reports
    }
}

impl Iterator for LogStream {
    type Item = StreamRecord;

    fn next(&mut self) -> Option<StreamRecord> {
        let HeadKey { file, .. } = self.heap.pop()?;
        let record = self.cursors[file].head.take()?;

        let report = &mut self.reports[file];
        report.records += 1;
        report.first_timestamp.get_or_insert(record.timestamp);
        report.last_timestamp = Some(record.timestamp);

        self.advance(file);
        Some(StreamRecord { file, record })
    }
}
