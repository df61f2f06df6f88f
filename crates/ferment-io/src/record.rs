//! Wire record handed to telemetry consumers, one JSON object per snapshot.

use ferment_core::Snapshot;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

pub const RECORD_TYPE: &str = "snapshot";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    #[serde(rename = "type")]
    pub record_type: String,
    pub sequence: u64,
    /// Wall-clock microseconds since the Unix epoch.
    pub unix_us: u64,
    pub fields: Snapshot,
}

impl SnapshotRecord {
    pub fn new(sequence: u64, fields: Snapshot) -> Self {
        Self::at(sequence, unix_us(), fields)
    }

    pub fn at(sequence: u64, unix_us: u64, fields: Snapshot) -> Self {
        Self {
            record_type: RECORD_TYPE.to_string(),
            sequence,
            unix_us,
            fields,
        }
    }

    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

pub fn unix_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}
