//! Prometheus metrics for fermentation telemetry.
//!
//! Every field of a published snapshot is exported as one sample of
//! `fermentd_field_value{field="..."}`; flags are exported as 0/1.

use crate::publisher::{SinkError, SnapshotSink};
use crate::record::SnapshotRecord;
use ferment_core::ControlObserver;
use prometheus::{Encoder, Gauge, GaugeVec, IntCounter, Opts, Registry, TextEncoder};
use std::sync::LazyLock;
use std::thread;
use tiny_http::{Response, Server};

/// Global metrics registry
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Snapshot Metrics
// ============================================================================

/// Latest value of each published field
pub static FIELD_VALUE: LazyLock<GaugeVec> = LazyLock::new(|| {
    let gauge = GaugeVec::new(
        Opts::new(
            "fermentd_field_value",
            "Latest published value of a telemetry field",
        ),
        &["field"],
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Complete snapshots handed to sinks
pub static SNAPSHOTS_PUBLISHED: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "fermentd_snapshots_published_total",
        "Complete snapshots handed to telemetry sinks",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Publish ticks that found the snapshot incomplete
pub static SNAPSHOTS_INCOMPLETE: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "fermentd_snapshots_incomplete_total",
        "Publish attempts skipped because a field had not refreshed",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Sink write failures
pub static SINK_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "fermentd_sink_failures_total",
        "Snapshot sink write failures",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

// ============================================================================
// Controller Metrics
// ============================================================================

/// Controller cycles executed
pub static CONTROLLER_TICKS: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "fermentd_controller_ticks_total",
        "Controller cycles executed",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Latest PID output
pub static CONTROL_SIGNAL: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new("fermentd_control_signal", "Latest PID control output").unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Follows the controller directly, independent of snapshot completeness.
#[derive(Debug, Default)]
pub struct ControlMetrics;

impl ControlObserver for ControlMetrics {
    fn on_control_tick(&self, _p: f64, _i: f64, _d: f64, control: f64) {
        CONTROLLER_TICKS.inc();
        CONTROL_SIGNAL.set(control);
    }
}

/// Exports snapshot fields as gauges.
#[derive(Debug, Default)]
pub struct MetricsSink;

impl SnapshotSink for MetricsSink {
    fn name(&self) -> &str {
        "metrics"
    }

    fn publish(&mut self, record: &SnapshotRecord) -> Result<(), SinkError> {
        for (field, value) in &record.fields {
            FIELD_VALUE
                .with_label_values(&[field.as_str()])
                .set(value.as_f64());
        }
        Ok(())
    }
}

// ============================================================================
// Metrics HTTP Server
// ============================================================================

/// Start the metrics HTTP server on the given address.
/// Returns a join handle for the server thread.
pub fn serve_metrics(bind_addr: String) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let server = match Server::http(&bind_addr) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Failed to start metrics server on {}: {}", bind_addr, e);
                return;
            }
        };

        tracing::info!("Metrics server listening on http://{}/metrics", bind_addr);

        for request in server.incoming_requests() {
            let response = match request.url() {
                "/metrics" => match encode_metrics() {
                    Ok(buffer) => Response::from_data(buffer).with_header(text_plain()),
                    Err(e) => {
                        tracing::warn!("Failed to encode metrics: {}", e);
                        Response::from_string("Internal Server Error")
                            .with_status_code(500)
                    }
                },
                "/health" => Response::from_string("OK"),
                // Ready once the first complete snapshot went out
                "/ready" if SNAPSHOTS_PUBLISHED.get() > 0 => Response::from_string("Ready"),
                "/ready" => Response::from_string("Not Ready").with_status_code(503),
                _ => Response::from_string("Not Found").with_status_code(404),
            };
            let _ = request.respond(response);
        }
    })
}

fn encode_metrics() -> Result<Vec<u8>, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(buffer)
}

fn text_plain() -> tiny_http::Header {
    tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"text/plain; version=0.0.4"[..])
        .unwrap()
}

/// Initialize all metrics (forces lazy initialization)
pub fn init_metrics() {
    let _ = FIELD_VALUE.with_label_values(&["vessel"]);
    let _ = SNAPSHOTS_PUBLISHED.get();
    let _ = SNAPSHOTS_INCOMPLETE.get();
    let _ = SINK_FAILURES.get();
    let _ = CONTROLLER_TICKS.get();
    let _ = CONTROL_SIGNAL.get();
}
