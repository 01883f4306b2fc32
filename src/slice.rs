//! Cut a time window out of a log.
//!
//! One sequential pass: read the source log in its native order, keep the
//! records whose timestamp lies in the closed interval `[start, end]`, and
//! append them unchanged to a freshly created destination log.
//!
//! ```no_run
//! use logslice::core::Timestamp;
//! use logslice::slice::{slice, TimeWindow};
//!
//! let window = TimeWindow::new(Timestamp::from_secs(2), Timestamp::from_secs(4));
//! let stats = slice("./recording", "./excerpt", window)?;
//! println!("{} records in {:?}", stats.records_written, stats.elapsed);
//! # Ok::<(), logslice::core::Error>(())
//! ```

use std::path::Path;
use std::time::Duration;

use crate::core::{Clock, LogReader, LogWriter, Result, Timestamp};

/// Inclusive time interval. `start > end` is allowed and selects nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl Default for TimeWindow {
    fn default() -> Self {
        Self {
            start: Timestamp::MIN,
            end: Timestamp::MAX,
        }
    }
}

impl TimeWindow {
    /// Selects no timestamp at all.
    pub const EMPTY: TimeWindow = TimeWindow {
        start: Timestamp::MAX,
        end: Timestamp::MIN,
    };

    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self { start, end }
    }

    /// Window of every timestamp `t` with `start <= t <= end` in seconds.
    ///
    /// A NaN end leaves the window open above; a NaN start selects nothing.
    /// A bound no timestamp can satisfy (negative end, start past `MAX`)
    /// gives `EMPTY`.
    pub fn from_secs_f64(start: f64, end: f64) -> Self {
        let end = if end.is_nan() {
            Some(Timestamp::MAX)
        } else {
            Timestamp::at_or_before_secs(end)
        };
        match (Timestamp::at_or_after_secs(start), end) {
            (Some(start), Some(end)) => Self::new(start, end),
            _ => Self::EMPTY,
        }
    }

    pub fn contains(&self, ts: Timestamp) -> bool {
        ts >= self.start && ts <= self.end
    }

    /// True once `ts` lies beyond the end bound.
    pub fn is_past(&self, ts: Timestamp) -> bool {
        ts > self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }
}

/// How much of the source is scanned.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScanMode {
    /// Stop at the first record past the window end.
    ///
    /// Only correct when the source yields non-decreasing timestamps. On an
    /// unsorted source the output silently misses in-window records that come
    /// after the first late one.
    #[default]
    Sorted,
    /// Test every record in the source. Use for sources that are not time-sorted.
    FullScan,
}

#[derive(Clone, Debug)]
pub struct SliceOptions {
    pub window: TimeWindow,
    pub scan: ScanMode,
    /// Destination segment size. `None` reuses the source's segment size.
    pub segment_size: Option<usize>,
    /// Log progress every this many records read. 0 disables progress lines.
    pub progress_interval: u64,
}

impl Default for SliceOptions {
    fn default() -> Self {
        Self {
            window: TimeWindow::default(),
            scan: ScanMode::default(),
            segment_size: None,
            progress_interval: 100_000,
        }
    }
}

impl SliceOptions {
    pub fn new(window: TimeWindow) -> Self {
        Self {
            window,
            ..Self::default()
        }
    }
}

/// Statistics for a slice run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SliceStats {
    pub records_read: u64,
    pub records_written: u64,
    pub records_skipped: u64,
    /// Records whose timestamp was lower than the one before them.
    pub out_of_order: u64,
    /// The pass ended at the window end instead of the end of the source.
    pub stopped_early: bool,
    pub elapsed: Duration,
}

impl SliceStats {
    /// Records written per second of wall-clock time.
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.records_written as f64 / secs
        } else {
            0.0
        }
    }
}

/// Slice `source` into `dest` with default options.
///
/// Initializes its own clock; long-running callers should call
/// `core::initialize()` once and use `slice_with`.
pub fn slice(
    source: impl AsRef<Path>,
    dest: impl AsRef<Path>,
    window: TimeWindow,
) -> Result<SliceStats> {
    let clock = crate::core::initialize();
    slice_with(source, dest, &SliceOptions::new(window), &clock)
}

/// Copy every record of `source` inside `options.window` into a new log at `dest`.
///
/// `dest` is replaced if it already holds a log. Both logs are closed before
/// this returns, on success and on early termination alike.
///
/// # Errors
///
/// Any failure to open, read or write either log. Records appended before a
/// mid-stream failure stay in `dest`.
pub fn slice_with(
    source: impl AsRef<Path>,
    dest: impl AsRef<Path>,
    options: &SliceOptions,
    clock: &impl Clock,
) -> Result<SliceStats> {
    let started = clock.now();
    let window = options.window;

    let mut reader = LogReader::open(source.as_ref())?;
    let segment_size = match options.segment_size {
        Some(size) => size,
        None => reader.segment_size()?.unwrap_or(0),
    };
    let mut writer = LogWriter::create(dest.as_ref(), segment_size)?;

    if window.is_empty() {
        log::warn!("time window selects no records, output will be empty");
    }

    let mut stats = SliceStats::default();
    let mut last_ts: Option<Timestamp> = None;

    while let Some(record) = reader.next()? {
        stats.records_read += 1;

        if let Some(prev) = last_ts.filter(|prev| record.timestamp < *prev) {
            if stats.out_of_order == 0 {
                log::warn!(
                    "{} is not time-sorted: record {} at {} follows {}",
                    source.as_ref().display(),
                    record.seq,
                    record.timestamp,
                    prev
                );
            }
            stats.out_of_order += 1;
        }
        last_ts = Some(record.timestamp);

        if window.is_past(record.timestamp) && options.scan == ScanMode::Sorted {
            stats.stopped_early = true;
            break;
        }

        if window.contains(record.timestamp) {
            writer.write(record.topic, record.timestamp, record.payload)?;
            stats.records_written += 1;
        } else {
            stats.records_skipped += 1;
        }

        if options.progress_interval > 0 && stats.records_read % options.progress_interval == 0 {
            let elapsed = clock.elapsed_since(started).as_secs_f64();
            log::info!(
                "Processed {} records, wrote {} ({:.0} records/sec)",
                stats.records_read,
                stats.records_written,
                stats.records_read as f64 / elapsed.max(f64::EPSILON)
            );
        }
    }

    drop(reader);
    writer.finish()?;
    stats.elapsed = clock.elapsed_since(started);

    log::info!(
        "sliced {} -> {}: read {} wrote {} in {:.3}s{}",
        source.as_ref().display(),
        dest.as_ref().display(),
        stats.records_read,
        stats.records_written,
        stats.elapsed.as_secs_f64(),
        if stats.stopped_early { " (stopped at window end)" } else { "" }
    );

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Error;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tempfile::TempDir;

    /// Advances one millisecond per reading.
    struct StepClock(AtomicU64);

    impl Clock for StepClock {
        fn now(&self) -> u64 {
            self.0.fetch_add(1_000_000, Ordering::Relaxed)
        }
    }

    fn write_log(dir: &Path, stamps: &[u64]) {
        let mut writer = LogWriter::create(dir, 8192).unwrap();
        for &secs in stamps {
            writer
                .write("/a", Timestamp::from_secs(secs), &secs.to_le_bytes())
                .unwrap();
        }
        writer.finish().unwrap();
    }

    fn read_stamps(dir: &Path) -> Vec<u64> {
        let mut reader = LogReader::open(dir).unwrap();
        let mut out = Vec::new();
        while let Some(record) = reader.next().unwrap() {
            out.push(record.timestamp.as_nanos() / 1_000_000_000);
        }
        out
    }

    fn run(src: &Path, dst: &Path, options: &SliceOptions) -> SliceStats {
        slice_with(src, dst, options, &StepClock(AtomicU64::new(0))).unwrap()
    }

    #[test]
    fn window_is_closed_on_both_ends() {
        let window = TimeWindow::new(Timestamp::from_secs(2), Timestamp::from_secs(4));
        assert!(!window.contains(Timestamp::from_nanos(1_999_999_999)));
        assert!(window.contains(Timestamp::from_secs(2)));
        assert!(window.contains(Timestamp::from_secs(4)));
        assert!(!window.contains(Timestamp::from_nanos(4_000_000_001)));
        assert!(window.is_past(Timestamp::from_nanos(4_000_000_001)));
        assert!(!window.is_empty());
    }

    #[test]
    fn default_window_covers_everything() {
        let window = TimeWindow::default();
        assert!(window.contains(Timestamp::MIN));
        assert!(window.contains(Timestamp::MAX));
        assert_eq!(TimeWindow::from_secs_f64(0.0, f64::MAX), window);
    }

    #[test]
    fn bounds_outside_time_range_are_empty() {
        assert_eq!(TimeWindow::from_secs_f64(0.0, -1.0), TimeWindow::EMPTY);
        assert_eq!(TimeWindow::from_secs_f64(f64::MAX, f64::MAX), TimeWindow::EMPTY);
        assert_eq!(TimeWindow::from_secs_f64(f64::NAN, 5.0), TimeWindow::EMPTY);
        assert!(TimeWindow::EMPTY.is_empty());
        assert!(!TimeWindow::EMPTY.contains(Timestamp::MIN));
        assert!(!TimeWindow::EMPTY.contains(Timestamp::MAX));
    }

    #[test]
    fn nan_end_is_open() {
        let window = TimeWindow::from_secs_f64(1.0, f64::NAN);
        assert_eq!(window.start, Timestamp::from_secs(1));
        assert_eq!(window.end, Timestamp::MAX);
    }

    #[test]
    fn sorted_scan_stops_after_window() {
        let dir = TempDir::new().unwrap();
        let (src, dst) = (dir.path().join("src"), dir.path().join("dst"));
        write_log(&src, &[1, 2, 3, 4, 5, 6, 7]);

        let options = SliceOptions::new(TimeWindow::from_secs_f64(2.0, 4.0));
        let stats = run(&src, &dst, &options);

        assert_eq!(read_stamps(&dst), vec![2, 3, 4]);
        assert_eq!(stats.records_written, 3);
        assert_eq!(stats.records_skipped, 1);
        // 1, 2, 3, 4 and the first record past the end
        assert_eq!(stats.records_read, 5);
        assert!(stats.stopped_early);
        assert!(stats.elapsed > Duration::ZERO);
        assert!(stats.rate() > 0.0);
    }

    #[test]
    fn full_scan_finds_records_after_late_one() {
        let dir = TempDir::new().unwrap();
        let (src, dst) = (dir.path().join("src"), dir.path().join("dst"));
        write_log(&src, &[1, 9, 2, 3]);

        let mut options = SliceOptions::new(TimeWindow::from_secs_f64(1.0, 3.0));
        let sorted = run(&src, &dst, &options);
        assert_eq!(read_stamps(&dst), vec![1]);
        assert!(sorted.stopped_early);

        options.scan = ScanMode::FullScan;
        let full = run(&src, &dst, &options);
        assert_eq!(read_stamps(&dst), vec![1, 2, 3]);
        assert_eq!(full.records_read, 4);
        assert_eq!(full.records_skipped, 1);
        assert_eq!(full.out_of_order, 1);
        assert!(!full.stopped_early);
    }

    #[test]
    fn inverted_window_yields_empty_log() {
        let dir = TempDir::new().unwrap();
        let (src, dst) = (dir.path().join("src"), dir.path().join("dst"));
        write_log(&src, &[1, 2, 3]);

        let stats = run(
            &src,
            &dst,
            &SliceOptions::new(TimeWindow::from_secs_f64(3.0, 2.0)),
        );
        assert_eq!(stats.records_written, 0);
        assert!(read_stamps(&dst).is_empty());
    }

    #[test]
    fn destination_reuses_source_segment_size() {
        let dir = TempDir::new().unwrap();
        let (src, dst) = (dir.path().join("src"), dir.path().join("dst"));
        write_log(&src, &[1, 2, 3]);

        run(&src, &dst, &SliceOptions::default());
        let reader = LogReader::open(&dst).unwrap();
        assert_eq!(reader.segment_size().unwrap(), Some(8192));

        let options = SliceOptions {
            segment_size: Some(4096),
            ..SliceOptions::default()
        };
        run(&src, &dst, &options);
        let reader = LogReader::open(&dst).unwrap();
        assert_eq!(reader.segment_size().unwrap(), Some(4096));
    }

    #[test]
    fn missing_source_is_fatal() {
        let dir = TempDir::new().unwrap();
        let dst = dir.path().join("dst");
        let err = slice_with(
            dir.path().join("missing"),
            &dst,
            &SliceOptions::default(),
            &StepClock(AtomicU64::new(0)),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound));
        // No I/O on the destination once the source fails to open.
        assert!(!dst.exists());
    }

    #[test]
    fn zero_elapsed_rate_is_zero() {
        let stats = SliceStats {
            records_written: 10,
            ..SliceStats::default()
        };
        assert_eq!(stats.rate(), 0.0);
    }
}
