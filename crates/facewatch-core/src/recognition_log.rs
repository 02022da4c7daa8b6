//! Daily recognition log: one CSV file per calendar day.
//!
//! `recognition_log_YYYY-MM-DD.csv` gets a `Timestamp,Name` header the first
//! time it is written, then one row per recognition. Rows are never merged.

use chrono::{Local, NaiveDate, NaiveDateTime};
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const HEADER: [&str; 2] = ["Timestamp", "Name"];

#[derive(Error, Debug)]
pub enum LogError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Appends recognitions to date-partitioned CSV files under one directory.
#[derive(Debug, Clone)]
pub struct RecognitionLog {
    dir: PathBuf,
}

impl RecognitionLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Log file for `date`.
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("recognition_log_{}.csv", date.format("%Y-%m-%d")))
    }

    /// Record `name` as seen at `at`, in the file for `at`'s date.
    pub fn record_at(&self, name: &str, at: NaiveDateTime) -> Result<(), LogError> {
        let path = self.path_for(at.date());
        let fresh = !path.exists();

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| LogError::Open {
                path: path.clone(),
                source,
            })?;

        let mut writer = csv::Writer::from_writer(file);
        let write_err = |source| LogError::Write {
            path: path.clone(),
            source,
        };
        if fresh {
            writer.write_record(HEADER).map_err(write_err)?;
        }
        writer
            .write_record([at.format(TIMESTAMP_FORMAT).to_string().as_str(), name])
            .map_err(write_err)?;
        writer.flush().map_err(|e| write_err(e.into()))?;
        Ok(())
    }

    /// Raw contents of the log for `date`, or `None` if nothing was logged.
    pub fn read_day(&self, date: NaiveDate) -> Result<Option<String>, LogError> {
        let path = self.path_for(date);
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(LogError::Read { path, source }),
        }
    }

    /// Raw contents of today's log.
    pub fn read_today(&self) -> Result<Option<String>, LogError> {
        self.read_day(Local::now().date_naive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn at(date: NaiveDate, h: u32, m: u32, s: u32) -> NaiveDateTime {
        date.and_time(NaiveTime::from_hms_opt(h, m, s).unwrap())
    }

    #[test]
    fn test_path_pattern() {
        let log = RecognitionLog::new("/var/tmp/logs");
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(
            log.path_for(date),
            PathBuf::from("/var/tmp/logs/recognition_log_2024-03-07.csv")
        );
    }

    #[test]
    fn test_header_written_once_then_every_row() {
        let dir = tempfile::tempdir().unwrap();
        let log = RecognitionLog::new(dir.path());
        let day = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();

        log.record_at("Ada", at(day, 9, 15, 0)).unwrap();
        log.record_at("Ada", at(day, 9, 15, 0)).unwrap();
        log.record_at("Grace Hopper", at(day, 17, 2, 59)).unwrap();

        let contents = log.read_day(day).unwrap().unwrap();
        assert_eq!(
            contents,
            "Timestamp,Name\n\
             2024-03-07 09:15:00,Ada\n\
             2024-03-07 09:15:00,Ada\n\
             2024-03-07 17:02:59,Grace Hopper\n"
        );
    }

    #[test]
    fn test_days_are_partitioned() {
        let dir = tempfile::tempdir().unwrap();
        let log = RecognitionLog::new(dir.path());
        let monday = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let tuesday = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();

        log.record_at("Ada", at(monday, 23, 59, 59)).unwrap();
        log.record_at("Ada", at(tuesday, 0, 0, 1)).unwrap();

        let mon = log.read_day(monday).unwrap().unwrap();
        let tue = log.read_day(tuesday).unwrap().unwrap();
        assert_eq!(mon.lines().count(), 2);
        assert_eq!(tue.lines().count(), 2);
        assert!(tue.starts_with("Timestamp,Name\n"));
    }

    #[test]
    fn test_names_with_commas_are_quoted() {
        let dir = tempfile::tempdir().unwrap();
        let log = RecognitionLog::new(dir.path());
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        log.record_at("Lovelace, Ada", at(day, 12, 0, 0)).unwrap();

        let contents = log.read_day(day).unwrap().unwrap();
        assert!(contents.ends_with("2024-01-01 12:00:00,\"Lovelace, Ada\"\n"));
    }

    #[test]
    fn test_read_missing_day() {
        let dir = tempfile::tempdir().unwrap();
        let log = RecognitionLog::new(dir.path());
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(log.read_day(day).unwrap(), None);
    }

    #[test]
    fn test_unwritable_dir_reported() {
        let dir = tempfile::tempdir().unwrap();
        let log = RecognitionLog::new(dir.path().join("missing"));
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let err = log.record_at("Ada", at(day, 0, 0, 0)).unwrap_err();
        assert!(matches!(err, LogError::Open { .. }));
    }
}
