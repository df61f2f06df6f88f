pub mod config_file;
pub mod metrics;
pub mod publisher;
pub mod record;
pub mod snapshot_log;

pub use config_file::{load_snapshot, parse_snapshot, ConfigError, ConfigFile};
pub use metrics::{init_metrics, serve_metrics, ControlMetrics, MetricsSink};
pub use publisher::{SinkError, SnapshotPublisher, SnapshotSink};
pub use record::SnapshotRecord;
pub use snapshot_log::SnapshotLog;
