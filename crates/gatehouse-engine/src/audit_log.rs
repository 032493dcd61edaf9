//! Audit Log Sink
//!
//! Append-only, line-delimited JSON records partitioned into one file per
//! calendar day (`YYYY-MM-DD.jsonl`, UTC). Records written before the wall
//! clock is synchronized go to `unsynced.jsonl`, which retention pruning
//! never touches. The sink works with no network at all; mirroring happens
//! separately through [`AuditTrail`].

use crate::config::millis;
use crate::queue::QueueSender;
use chrono::{DateTime, Days, NaiveDate, Utc};
use gatehouse_core::AuditRecord;
use parking_lot::Mutex;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const DAY_FORMAT: &str = "%Y-%m-%d";
const EXTENSION: &str = "jsonl";
const UNSYNCED_FILE: &str = "unsynced.jsonl";

/// Audit log failures
#[derive(Debug, thiserror::Error)]
pub enum AuditLogError {
    /// Filesystem operation failed
    #[error("audit log I/O on {path}: {source}")]
    Io {
        /// File or directory involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
    /// Record could not be encoded
    #[error("audit record encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
    /// The writer lock was not acquired within the bounded wait
    #[error("audit log busy for {waited_ms}ms")]
    Contention {
        /// Bounded wait that elapsed
        waited_ms: u64,
    },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> AuditLogError + '_ {
    move |source| AuditLogError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Day-partitioned local audit storage.
#[derive(Debug)]
pub struct AuditLog {
    dir: PathBuf,
    retention_days: u32,
    lock_timeout: Duration,
    writer: Mutex<()>,
    failed_appends: AtomicU64,
}

impl AuditLog {
    /// Open (creating if needed) the log directory.
    pub fn open(
        dir: impl Into<PathBuf>,
        retention_days: u32,
        lock_timeout: Duration,
    ) -> Result<Self, AuditLogError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(io_err(&dir))?;
        Ok(Self {
            dir,
            retention_days,
            lock_timeout,
            writer: Mutex::new(()),
            failed_appends: AtomicU64::new(0),
        })
    }

    /// Directory holding the day files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Appends that failed since start-up
    pub fn failed_appends(&self) -> u64 {
        self.failed_appends.load(Ordering::Relaxed)
    }

    fn file_for(&self, time: Option<DateTime<Utc>>) -> PathBuf {
        match time {
            Some(t) => self
                .dir
                .join(format!("{}.{EXTENSION}", t.date_naive().format(DAY_FORMAT))),
            None => self.dir.join(UNSYNCED_FILE),
        }
    }

    /// Append one record as a single line write.
    pub fn append(&self, record: &AuditRecord) -> Result<(), AuditLogError> {
        let result = self.append_inner(record);
        if result.is_err() {
            self.failed_appends.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    fn append_inner(&self, record: &AuditRecord) -> Result<(), AuditLogError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self
            .writer
            .try_lock_for(self.lock_timeout)
            .ok_or(AuditLogError::Contention {
                waited_ms: millis(self.lock_timeout),
            })?;
        let path = self.file_for(record.time);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_err(&path))?;
        file.write_all(&line).map_err(io_err(&path))?;
        Ok(())
    }

    /// Dates that have a day file, oldest first.
    pub fn days(&self) -> Result<Vec<NaiveDate>, AuditLogError> {
        let mut days = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(io_err(&self.dir))? {
            let entry = entry.map_err(io_err(&self.dir))?;
            if let Some(date) = parse_day_file(&entry.path()) {
                days.push(date);
            }
        }
        days.sort();
        Ok(days)
    }

    /// Delete day files older than the retention window. Returns the dates
    /// removed.
    pub fn prune(&self, now: DateTime<Utc>) -> Result<Vec<NaiveDate>, AuditLogError> {
        let today = now.date_naive();
        let Some(cutoff) = today.checked_sub_days(Days::new(u64::from(self.retention_days)))
        else {
            return Ok(Vec::new());
        };

        let mut removed = Vec::new();
        for date in self.days()? {
            if date >= cutoff {
                continue;
            }
            let path = self.file_for_date(date);
            match fs::remove_file(&path) {
                Ok(()) => removed.push(date),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => return Err(AuditLogError::Io { path, source }),
            }
        }
        if !removed.is_empty() {
            info!(count = removed.len(), %cutoff, "pruned audit day files");
        }
        Ok(removed)
    }

    fn file_for_date(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{}.{EXTENSION}", date.format(DAY_FORMAT)))
    }

    /// All records of one day, in write order. Unparseable lines (a torn
    /// final write after power loss) are skipped.
    pub fn read_day(&self, date: NaiveDate) -> Result<Vec<AuditRecord>, AuditLogError> {
        read_records(&self.file_for_date(date))
    }

    /// Records written before the clock was synchronized.
    pub fn read_unsynced(&self) -> Result<Vec<AuditRecord>, AuditLogError> {
        read_records(&self.dir.join(UNSYNCED_FILE))
    }

    /// Up to `limit` most recent dated records, oldest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<AuditRecord>, AuditLogError> {
        let mut collected: Vec<AuditRecord> = Vec::new();
        for date in self.days()?.into_iter().rev() {
            if collected.len() >= limit {
                break;
            }
            let mut day = self.read_day(date)?;
            let take = limit - collected.len();
            let start = day.len().saturating_sub(take);
            let mut tail = day.split_off(start);
            tail.append(&mut collected);
            collected = tail;
        }
        Ok(collected)
    }
}

fn parse_day_file(path: &Path) -> Option<NaiveDate> {
    if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    NaiveDate::parse_from_str(stem, DAY_FORMAT).ok()
}

fn read_records(path: &Path) -> Result<Vec<AuditRecord>, AuditLogError> {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(AuditLogError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let mut records = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(io_err(path))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(record) => records.push(record),
            Err(e) => debug!(path = %path.display(), line = index + 1, error = %e, "skipping unreadable audit line"),
        }
    }
    Ok(records)
}

/// Records an audit entry locally and queues it for mirroring.
#[derive(Debug, Clone)]
pub struct AuditTrail {
    log: Arc<AuditLog>,
    mirror: QueueSender<AuditRecord>,
}

impl AuditTrail {
    /// Create a trail writing to `log` and mirroring through `mirror`
    pub fn new(log: Arc<AuditLog>, mirror: QueueSender<AuditRecord>) -> Self {
        Self { log, mirror }
    }

    /// Durably append `record`, then enqueue it for the mirror. A failed
    /// append is logged and does not stop the mirror.
    pub fn record(&self, record: AuditRecord) {
        if let Err(err) = self.log.append(&record) {
            warn!(identifier = %record.identifier, outcome = %record.outcome, error = %err, "audit append failed");
        }
        self.mirror.push(record);
    }

    /// The underlying local log
    pub fn log(&self) -> &Arc<AuditLog> {
        &self.log
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::bounded;
    use chrono::TimeZone;
    use gatehouse_core::{AuditOutcome, AuditSource};
    use tempfile::TempDir;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn record(id: &str, time: Option<DateTime<Utc>>) -> AuditRecord {
        AuditRecord::remote(id, "Test", AuditOutcome::Granted, time)
    }

    #[test]
    fn test_append_partitions_by_day() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::open(dir.path(), 30, Duration::from_millis(20)).unwrap();
        log.append(&record("A1", Some(at(2026, 10, 17)))).unwrap();
        log.append(&record("A2", Some(at(2026, 10, 18)))).unwrap();
        log.append(&record("A3", Some(at(2026, 10, 18)))).unwrap();
        log.append(&record("A4", None)).unwrap();

        assert!(dir.path().join("2026-10-18.jsonl").exists());
        let day = log.read_day(NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()).unwrap();
        assert_eq!(day.len(), 2);
        assert_eq!(day[0].identifier, "A2");
        assert_eq!(day[1].source, AuditSource::Remote);
        assert_eq!(log.read_unsynced().unwrap().len(), 1);
        assert_eq!(log.days().unwrap().len(), 2);
    }

    #[test]
    fn test_prune_respects_retention_window() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::open(dir.path(), 30, Duration::from_millis(20)).unwrap();
        log.append(&record("OLD", Some(at(2026, 9, 1)))).unwrap();
        log.append(&record("EDGE", Some(at(2026, 9, 18)))).unwrap();
        log.append(&record("NEW", Some(at(2026, 10, 18)))).unwrap();
        log.append(&record("UNSYNCED", None)).unwrap();
        fs::write(dir.path().join("notes.txt"), "keep").unwrap();

        let removed = log.prune(at(2026, 10, 18)).unwrap();
        assert_eq!(removed, vec![NaiveDate::from_ymd_opt(2026, 9, 1).unwrap()]);
        assert_eq!(log.days().unwrap().len(), 2);
        assert!(dir.path().join("unsynced.jsonl").exists());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_recent_spans_days_and_skips_torn_lines() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::open(dir.path(), 30, Duration::from_millis(20)).unwrap();
        for i in 0..3 {
            log.append(&record(&format!("D1-{i}"), Some(at(2026, 10, 16)))).unwrap();
        }
        for i in 0..2 {
            log.append(&record(&format!("D2-{i}"), Some(at(2026, 10, 17)))).unwrap();
        }
        let mut file = OpenOptions::new()
            .append(true)
            .open(dir.path().join("2026-10-17.jsonl"))
            .unwrap();
        file.write_all(b"{\"identifier\":\"tor").unwrap();

        let recent = log.recent(4).unwrap();
        let ids: Vec<_> = recent.iter().map(|r| r.identifier.as_str()).collect();
        assert_eq!(ids, vec!["D1-1", "D1-2", "D2-0", "D2-1"]);
    }

    #[test]
    fn test_trail_appends_and_mirrors() {
        let dir = TempDir::new().unwrap();
        let log = Arc::new(AuditLog::open(dir.path(), 30, Duration::from_millis(20)).unwrap());
        let (tx, mut rx) = bounded("audit", 1);
        let trail = AuditTrail::new(log.clone(), tx);

        trail.record(record("M1", None));
        trail.record(record("M2", None));
        assert_eq!(log.read_unsynced().unwrap().len(), 2);
        assert_eq!(rx.drain(10).len(), 1);
    }
}
