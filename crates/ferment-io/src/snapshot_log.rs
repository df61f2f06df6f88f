//! Append-only JSONL log of complete telemetry snapshots.

use crate::publisher::{SinkError, SnapshotSink};
use crate::record::SnapshotRecord;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

pub struct SnapshotLog {
    writer: BufWriter<File>,
}

impl SnapshotLog {
    /// Opens `path` in append mode, creating parent directories as needed.
    pub fn new(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: BufWriter::with_capacity(8192, file),
        })
    }

    pub fn write(&mut self, record: &SnapshotRecord) -> Result<(), SinkError> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

impl SnapshotSink for SnapshotLog {
    fn name(&self) -> &str {
        "snapshot-log"
    }

    fn publish(&mut self, record: &SnapshotRecord) -> Result<(), SinkError> {
        self.write(record)
    }
}
