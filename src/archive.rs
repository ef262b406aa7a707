//! Seam to the BSA archiving facility.
//!
//! The facility is reached through two traits:
//!
//! - [`ChannelRegistrar`] turns a full channel name into an opaque
//!   [`ChannelHandle`]. It is used once, while the channel registry is built.
//! - [`Archiver`] accepts one [`Sample`] per channel per frame.
//!
//! Three backends ship with the crate: [`MemoryArchive`] keeps everything in
//! memory, [`CsvArchive`] appends rows to a CSV file and [`LogArchive`] emits
//! each sample as a trace event.

use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::error::{BsaError, Result};
use crate::timestamp::BsaTimestamp;

/// Opaque handle issued by the archiving facility for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelHandle(pub u64);

/// Alarm status attached to a sample. The bridge only emits `NoAlarm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AlarmStatus {
    /// No alarm condition
    #[default]
    NoAlarm,
}

/// Alarm severity attached to a sample. The bridge only emits `NoAlarm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AlarmSeverity {
    /// No alarm severity
    #[default]
    NoAlarm,
}

/// One value handed to the archiving facility.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Channel the value belongs to
    pub handle: ChannelHandle,
    /// Corrected frame timestamp
    pub timestamp: BsaTimestamp,
    /// Channel value
    pub value: f64,
    /// Alarm status
    pub status: AlarmStatus,
    /// Alarm severity
    pub severity: AlarmSeverity,
}

impl Sample {
    /// Create a sample with no alarm status or severity.
    pub fn new(handle: ChannelHandle, timestamp: BsaTimestamp, value: f64) -> Self {
        Self {
            handle,
            timestamp,
            value,
            status: AlarmStatus::NoAlarm,
            severity: AlarmSeverity::NoAlarm,
        }
    }
}

/// Registers channel names with the archiving facility.
pub trait ChannelRegistrar: Send + Sync {
    /// Register `full_name` and return the handle the facility assigned to it.
    fn register_channel(&self, full_name: &str) -> Result<ChannelHandle>;
}

/// Accepts timestamped channel samples.
pub trait Archiver: Send + Sync {
    /// Store a single sample.
    fn store_sample(&self, sample: &Sample) -> Result<()>;
}

/// Assigns sequential handles and remembers the name behind each one.
#[derive(Debug, Default)]
struct NameTable {
    names: Vec<String>,
}

impl NameTable {
    fn register(&mut self, full_name: &str) -> Result<ChannelHandle> {
        if self.names.iter().any(|n| n == full_name) {
            return Err(BsaError::Registration {
                channel: full_name.to_string(),
                reason: "channel already registered".to_string(),
            });
        }
        self.names.push(full_name.to_string());
        Ok(ChannelHandle(self.names.len() as u64 - 1))
    }

    fn name(&self, handle: ChannelHandle) -> Option<&str> {
        self.names.get(handle.0 as usize).map(String::as_str)
    }
}

/// In-memory archiving facility.
///
/// Records every registration and sample. Individual channel names can be
/// marked as rejected to exercise registration failures.
#[derive(Debug, Default)]
pub struct MemoryArchive {
    table: Mutex<NameTable>,
    rejected: Mutex<HashSet<String>>,
    samples: Mutex<Vec<Sample>>,
}

impl MemoryArchive {
    /// Create an empty archive.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make registration of `full_name` fail.
    pub fn reject_channel(&self, full_name: &str) {
        self.rejected.lock().insert(full_name.to_string());
    }

    /// Names registered so far, in registration order.
    pub fn registered(&self) -> Vec<String> {
        self.table.lock().names.clone()
    }

    /// Name behind a handle.
    pub fn channel_name(&self, handle: ChannelHandle) -> Option<String> {
        self.table.lock().name(handle).map(str::to_owned)
    }

    /// Copy of all stored samples, in arrival order.
    pub fn samples(&self) -> Vec<Sample> {
        self.samples.lock().clone()
    }

    /// Number of stored samples.
    pub fn sample_count(&self) -> usize {
        self.samples.lock().len()
    }
}

impl ChannelRegistrar for MemoryArchive {
    fn register_channel(&self, full_name: &str) -> Result<ChannelHandle> {
        if self.rejected.lock().contains(full_name) {
            return Err(BsaError::Registration {
                channel: full_name.to_string(),
                reason: "rejected by archiving facility".to_string(),
            });
        }
        self.table.lock().register(full_name)
    }
}

impl Archiver for MemoryArchive {
    fn store_sample(&self, sample: &Sample) -> Result<()> {
        self.samples.lock().push(*sample);
        Ok(())
    }
}

/// Archiving facility that appends samples to a CSV file.
///
/// Columns: `channel,seconds,nanoseconds,time,value,status,severity`.
pub struct CsvArchive {
    path: PathBuf,
    table: Mutex<NameTable>,
    writer: Mutex<csv::Writer<File>>,
}

impl CsvArchive {
    /// Create (or truncate) `path` and write the header row.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = File::create(&path)?;
        let mut writer = csv::Writer::from_writer(file);
        writer
            .write_record([
                "channel",
                "seconds",
                "nanoseconds",
                "time",
                "value",
                "status",
                "severity",
            ])
            .map_err(|e| BsaError::archive(e.to_string()))?;
        writer.flush()?;

        info!(path = %path.display(), "CSV archive will be written");

        Ok(Self {
            path,
            table: Mutex::new(NameTable::default()),
            writer: Mutex::new(writer),
        })
    }

    /// Path of the CSV file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush buffered rows to disk.
    pub fn flush(&self) -> Result<()> {
        self.writer.lock().flush()?;
        Ok(())
    }
}

impl ChannelRegistrar for CsvArchive {
    fn register_channel(&self, full_name: &str) -> Result<ChannelHandle> {
        self.table.lock().register(full_name)
    }
}

impl Archiver for CsvArchive {
    fn store_sample(&self, sample: &Sample) -> Result<()> {
        let channel = self
            .table
            .lock()
            .name(sample.handle)
            .map(str::to_owned)
            .ok_or_else(|| BsaError::archive(format!("unknown handle {}", sample.handle.0)))?;
        let time = sample
            .timestamp
            .to_utc()
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();

        self.writer
            .lock()
            .write_record(&[
                channel,
                sample.timestamp.seconds_past_epoch.to_string(),
                sample.timestamp.nanoseconds.to_string(),
                time,
                sample.value.to_string(),
                format!("{:?}", sample.status),
                format!("{:?}", sample.severity),
            ])
            .map_err(|e| BsaError::archive(e.to_string()))
    }
}

impl Drop for CsvArchive {
    fn drop(&mut self) {
        if let Err(e) = self.writer.get_mut().flush() {
            debug!(path = %self.path.display(), "Failed to flush CSV archive: {}", e);
        }
    }
}

/// Archiving facility that only emits trace events.
#[derive(Debug, Default)]
pub struct LogArchive {
    table: Mutex<NameTable>,
}

impl LogArchive {
    /// Create a new log archive.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChannelRegistrar for LogArchive {
    fn register_channel(&self, full_name: &str) -> Result<ChannelHandle> {
        self.table.lock().register(full_name)
    }
}

impl Archiver for LogArchive {
    fn store_sample(&self, sample: &Sample) -> Result<()> {
        let table = self.table.lock();
        trace!(
            channel = table.name(sample.handle).unwrap_or("?"),
            timestamp = %sample.timestamp,
            value = sample.value,
            "BSA sample"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_archive_assigns_sequential_handles() {
        let archive = MemoryArchive::new();
        let a = archive.register_channel("P:A").unwrap();
        let b = archive.register_channel("P:B").unwrap();
        assert_eq!(a, ChannelHandle(0));
        assert_eq!(b, ChannelHandle(1));
        assert_eq!(archive.channel_name(b).as_deref(), Some("P:B"));
        assert_eq!(archive.registered(), vec!["P:A", "P:B"]);
    }

    #[test]
    fn test_memory_archive_rejects_duplicates_and_marked_names() {
        let archive = MemoryArchive::new();
        archive.register_channel("P:A").unwrap();
        assert!(archive.register_channel("P:A").is_err());

        archive.reject_channel("P:C");
        let err = archive.register_channel("P:C").unwrap_err();
        assert!(matches!(err, BsaError::Registration { ref channel, .. } if channel == "P:C"));
    }

    #[test]
    fn test_memory_archive_records_samples() {
        let archive = MemoryArchive::new();
        let h = archive.register_channel("P:A").unwrap();
        archive
            .store_sample(&Sample::new(h, BsaTimestamp::new(1, 2), 3.0))
            .unwrap();
        let samples = archive.samples();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].value, 3.0);
        assert_eq!(samples[0].status, AlarmStatus::NoAlarm);
        assert_eq!(samples[0].severity, AlarmSeverity::NoAlarm);
    }

    #[test]
    fn test_csv_archive_writes_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("bsa.csv");

        let archive = CsvArchive::create(&path).unwrap();
        let h = archive.register_channel("MPLN:LC1_BSA_00").unwrap();
        archive
            .store_sample(&Sample::new(h, BsaTimestamp::new(0, 0), 42.0))
            .unwrap();
        archive.flush().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(
            lines.next(),
            Some("channel,seconds,nanoseconds,time,value,status,severity")
        );
        assert_eq!(
            lines.next(),
            Some("MPLN:LC1_BSA_00,0,0,1990-01-01T00:00:00+00:00,42,NoAlarm,NoAlarm")
        );
    }

    #[test]
    fn test_csv_archive_rejects_unknown_handle() {
        let dir = tempfile::tempdir().unwrap();
        let archive = CsvArchive::create(dir.path().join("bsa.csv")).unwrap();
        let err = archive
            .store_sample(&Sample::new(ChannelHandle(9), BsaTimestamp::default(), 1.0))
            .unwrap_err();
        assert!(matches!(err, BsaError::Archive { .. }));
    }
}
