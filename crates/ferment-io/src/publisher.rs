use crate::metrics;
use crate::record::SnapshotRecord;
use ferment_core::{Aggregate, Aggregator, PeriodicTask};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Destination for complete snapshots.
pub trait SnapshotSink: Send {
    fn name(&self) -> &str;
    fn publish(&mut self, record: &SnapshotRecord) -> Result<(), SinkError>;
}

/// Sole consumer of the aggregator. Each tick reads it once and fans a
/// complete snapshot out to every sink, so a snapshot is never split
/// between consumers.
pub struct SnapshotPublisher {
    aggregator: Arc<Aggregator>,
    sinks: Vec<Box<dyn SnapshotSink>>,
    sequence: u64,
}

impl SnapshotPublisher {
    pub fn new(aggregator: Arc<Aggregator>) -> Self {
        Self {
            aggregator,
            sinks: Vec::new(),
            sequence: 0,
        }
    }

    pub fn with_sink(mut self, sink: impl SnapshotSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn published(&self) -> u64 {
        self.sequence
    }

    /// Returns the record handed to sinks, or `None` when some field has
    /// not refreshed since the last complete read.
    pub fn publish(&mut self) -> Option<SnapshotRecord> {
        let fields = match self.aggregator.try_read() {
            Aggregate::Complete(fields) => fields,
            Aggregate::Incomplete { missing } => {
                metrics::SNAPSHOTS_INCOMPLETE.inc();
                debug!(?missing, "Snapshot incomplete, skipping publish");
                return None;
            }
        };

        self.sequence += 1;
        let record = SnapshotRecord::new(self.sequence, fields);

        for sink in &mut self.sinks {
            if let Err(e) = sink.publish(&record) {
                metrics::SINK_FAILURES.inc();
                warn!(sink = sink.name(), error = %e, "Snapshot sink failed");
            }
        }

        metrics::SNAPSHOTS_PUBLISHED.inc();
        Some(record)
    }
}

impl PeriodicTask for SnapshotPublisher {
    fn name(&self) -> &str {
        "publish"
    }

    fn tick(&mut self) {
        self.publish();
    }

    fn shutdown(&mut self) {
        debug!(published = self.sequence, "Snapshot publisher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferment_core::FieldValue;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Collect {
        records: Arc<Mutex<Vec<SnapshotRecord>>>,
        fail: bool,
    }

    impl SnapshotSink for Collect {
        fn name(&self) -> &str {
            "collect"
        }

        fn publish(&mut self, record: &SnapshotRecord) -> Result<(), SinkError> {
            if self.fail {
                return Err(std::io::Error::other("disk full").into());
            }
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    fn aggregator() -> Arc<Aggregator> {
        Arc::new(Aggregator::new(["vessel", "heater"]))
    }

    #[test]
    fn publishes_only_complete_snapshots() {
        let aggregator = aggregator();
        let sink = Collect::default();
        let mut publisher = SnapshotPublisher::new(Arc::clone(&aggregator)).with_sink(sink.clone());

        aggregator.observe("vessel", 18.5);
        assert!(publisher.publish().is_none());

        aggregator.observe("heater", true);
        let record = publisher.publish().unwrap();

        assert_eq!(record.sequence, 1);
        assert_eq!(record.fields["vessel"], FieldValue::Number(18.5));
        assert_eq!(record.fields["heater"], FieldValue::Flag(true));
        assert_eq!(sink.records.lock().unwrap().len(), 1);

        // Nothing refreshed since the last complete read
        assert!(publisher.publish().is_none());
        assert_eq!(publisher.published(), 1);
    }

    #[test]
    fn every_sink_sees_the_same_record() {
        let aggregator = aggregator();
        let first = Collect::default();
        let second = Collect::default();
        let mut publisher = SnapshotPublisher::new(Arc::clone(&aggregator))
            .with_sink(first.clone())
            .with_sink(second.clone());

        aggregator.observe("vessel", 18.5);
        aggregator.observe("heater", false);
        publisher.tick();

        assert_eq!(
            *first.records.lock().unwrap(),
            *second.records.lock().unwrap()
        );
    }

    #[test]
    fn failing_sink_does_not_starve_the_others() {
        let aggregator = aggregator();
        let broken = Collect {
            fail: true,
            ..Default::default()
        };
        let healthy = Collect::default();
        let mut publisher = SnapshotPublisher::new(Arc::clone(&aggregator))
            .with_sink(broken)
            .with_sink(healthy.clone());

        aggregator.observe("vessel", 18.5);
        aggregator.observe("heater", false);

        assert!(publisher.publish().is_some());
        assert_eq!(healthy.records.lock().unwrap().len(), 1);
    }
}
