//! On-disk ranging records, one RON document per line, for replay and
//! post-experiment analysis.

use crate::accumulator::Detection;
use crate::label::EndSide;
use crate::safety::AlertLevel;
use chrono::Local;
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

/// One pipeline snapshot as written to the record file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RangingRecord {
    /// Local wall-clock time the snapshot was taken.
    pub timestamp: String,
    /// The vehicle end the snapshot belongs to.
    pub side: EndSide,
    /// Alert level at snapshot time.
    pub alert: AlertLevel,
    /// The detections behind the alert, nearest first.
    pub detections: Vec<Detection>,
}

impl RangingRecord {
    /// Stamps a snapshot with the current local time.
    pub fn now(side: EndSide, alert: AlertLevel, detections: Vec<Detection>) -> Self {
        RangingRecord {
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
            side,
            alert,
            detections,
        }
    }
}

/// A nice little error for when record io goes wrong.
#[derive(Debug)]
pub enum RecordError {
    /// Returned when the record file cannot be opened, read, or written.
    IoError(std::io::Error),
    /// Returned when serialization of a record fails.
    RonError(ron::Error),
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RecordError::IoError(error) => write!(f, "io error: {}", error),
            RecordError::RonError(error) => write!(f, "ron error: {}", error),
        }
    }
}

impl std::error::Error for RecordError {}

impl From<std::io::Error> for RecordError {
    fn from(value: std::io::Error) -> Self {
        RecordError::IoError(value)
    }
}

impl From<ron::Error> for RecordError {
    fn from(value: ron::Error) -> Self {
        RecordError::RonError(value)
    }
}

/// Appends records to a file, one per line, flushing as it goes so a
/// killed experiment still leaves a usable log.
pub struct RecordWriter {
    out: BufWriter<File>,
}

impl RecordWriter {
    /// Creates (truncating) the record file at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, RecordError> {
        Ok(RecordWriter {
            out: BufWriter::new(File::create(path)?),
        })
    }

    /// Writes one record line.
    pub fn append(&mut self, record: &RangingRecord) -> Result<(), RecordError> {
        let line = ron::ser::to_string(record)?;
        self.out.write_all(line.as_bytes())?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        Ok(())
    }
}

/// Reads every record from `path`. Lines that fail to parse, usually the
/// partial tail line of a killed run, are skipped with a warning rather
/// than failing the whole file.
pub fn read_records(path: impl AsRef<Path>) -> Result<Vec<RangingRecord>, RecordError> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();

    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match ron::de::from_str::<RangingRecord>(&line) {
            Ok(record) => records.push(record),
            Err(e) => warn!("skipping record line {}: {}", lineno + 1, e),
        }
    }

    Ok(records)
}
