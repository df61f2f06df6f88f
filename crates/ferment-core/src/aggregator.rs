//! Completeness-gated telemetry snapshot.
//!
//! Producers on independent schedules write named fields; a consumer only
//! gets a snapshot once every declared field has been refreshed since the
//! previous successful read. Stored values persist across reads, but each
//! read requires a full refresh of every field.

use crate::observer::{ActuatorObserver, ControlObserver, TemperatureObserver};
use crate::tags;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, PoisonError};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Flag(bool),
    Number(f64),
}

impl FieldValue {
    /// Flags map to 1.0 / 0.0.
    pub fn as_f64(&self) -> f64 {
        match *self {
            FieldValue::Flag(on) => {
                if on {
                    1.0
                } else {
                    0.0
                }
            }
            FieldValue::Number(value) => value,
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<bool> for FieldValue {
    fn from(on: bool) -> Self {
        FieldValue::Flag(on)
    }
}

pub type Snapshot = BTreeMap<String, FieldValue>;

#[derive(Debug, Clone, PartialEq)]
pub enum Aggregate {
    Complete(Snapshot),
    /// Not an error: the consumer skips this cycle.
    Incomplete { missing: Vec<String> },
}

impl Aggregate {
    pub fn complete(self) -> Option<Snapshot> {
        match self {
            Aggregate::Complete(snapshot) => Some(snapshot),
            Aggregate::Incomplete { .. } => None,
        }
    }
}

#[derive(Debug, Default)]
struct Fields {
    values: Snapshot,
    fresh: BTreeSet<String>,
}

#[derive(Debug)]
pub struct Aggregator {
    expected: BTreeSet<String>,
    fields: Mutex<Fields>,
}

impl Aggregator {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            expected: fields.into_iter().map(Into::into).collect(),
            fields: Mutex::new(Fields::default()),
        }
    }

    /// Declares each sensor with its average, each actuator, and the PID
    /// telemetry fields.
    pub fn for_components(sensors: &[&str], actuators: &[&str]) -> Self {
        let sensor_fields = sensors
            .iter()
            .flat_map(|name| [name.to_string(), tags::avg_field(name)]);
        let actuator_fields = actuators.iter().map(|name| name.to_string());
        let control_fields = tags::CONTROL_FIELDS.iter().map(|name| name.to_string());
        Self::new(sensor_fields.chain(actuator_fields).chain(control_fields))
    }

    pub fn expected_fields(&self) -> impl Iterator<Item = &str> {
        self.expected.iter().map(String::as_str)
    }

    /// Stores `value` under `field`. Undeclared fields are dropped with a
    /// warning and `false` is returned.
    pub fn observe(&self, field: &str, value: impl Into<FieldValue>) -> bool {
        if !self.expected.contains(field) {
            warn!(field, "Ignoring telemetry field, not configured");
            return false;
        }
        let mut fields = self.lock();
        fields.values.insert(field.to_string(), value.into());
        fields.fresh.insert(field.to_string());
        true
    }

    /// Returns the snapshot if every declared field was observed since the
    /// last successful read, and starts a new refresh cycle.
    pub fn try_read(&self) -> Aggregate {
        let mut fields = self.lock();
        if fields.fresh.len() == self.expected.len() {
            fields.fresh.clear();
            return Aggregate::Complete(fields.values.clone());
        }
        let missing = self
            .expected
            .iter()
            .filter(|name| !fields.fresh.contains(*name))
            .cloned()
            .collect();
        Aggregate::Incomplete { missing }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Fields> {
        self.fields.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TemperatureObserver for Aggregator {
    fn on_temperature(&self, name: &str, current: f64, average: f64) {
        if self.observe(name, current) {
            self.observe(&tags::avg_field(name), average);
        }
    }
}

impl ActuatorObserver for Aggregator {
    fn on_actuator_state(&self, name: &str, on: bool) {
        self.observe(name, on);
    }
}

impl ControlObserver for Aggregator {
    fn on_control_tick(&self, p: f64, i: f64, d: f64, control: f64) {
        self.observe(tags::P, p);
        self.observe(tags::I, i);
        self.observe(tags::D, d);
        self.observe(tags::CONTROL, control);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn incomplete_until_every_field_is_observed() {
        let aggregator = Aggregator::new(["a", "b"]);

        aggregator.observe("a", 1.0);
        assert_eq!(
            aggregator.try_read(),
            Aggregate::Incomplete {
                missing: vec!["b".to_string()]
            }
        );

        aggregator.observe("b", 2.0);
        let snapshot = aggregator.try_read().complete().unwrap();
        assert_eq!(snapshot["a"], FieldValue::Number(1.0));
        assert_eq!(snapshot["b"], FieldValue::Number(2.0));
    }

    #[test]
    fn unknown_fields_are_dropped() {
        let aggregator = Aggregator::new(["a"]);

        assert!(!aggregator.observe("something-not-configured", false));
        aggregator.observe("a", 1.0);

        let snapshot = aggregator.try_read().complete().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(!snapshot.contains_key("something-not-configured"));
    }

    #[test]
    fn each_read_requires_a_full_refresh() {
        let aggregator = Aggregator::new(["a", "b"]);
        aggregator.observe("a", 1.0);
        aggregator.observe("b", 2.0);
        assert!(aggregator.try_read().complete().is_some());

        aggregator.observe("a", 3.0);
        assert!(aggregator.try_read().complete().is_none());
        // an incomplete read leaves the cycle open
        assert!(aggregator.try_read().complete().is_none());

        aggregator.observe("b", 2.0);
        let snapshot = aggregator.try_read().complete().unwrap();
        assert_eq!(snapshot["a"], FieldValue::Number(3.0));
    }

    #[test]
    fn collects_chamber_telemetry_from_observers() {
        let aggregator =
            Aggregator::for_components(&tags::CHAMBER_TEMPERATURES, &tags::CHAMBER_ACTUATORS);

        aggregator.on_temperature("environment", 1.2, 1.3);
        aggregator.on_temperature("vessel", 2.0, 2.3);
        assert!(aggregator.try_read().complete().is_none());

        aggregator.on_temperature("fridge", 3.0, 3.3);
        aggregator.on_temperature("target", 31.2, 31.3);
        aggregator.on_actuator_state("heater", true);
        aggregator.on_actuator_state("cooler", false);
        aggregator.on_actuator_state("limiter", true);
        aggregator.on_control_tick(2.3, 3.4, -5.6, 12.5);
        aggregator.on_actuator_state("something-not-configured", false);

        let snapshot = aggregator.try_read().complete().unwrap();
        let expected: Snapshot = [
            ("environment", FieldValue::Number(1.2)),
            ("environment_avg", FieldValue::Number(1.3)),
            ("vessel", FieldValue::Number(2.0)),
            ("vessel_avg", FieldValue::Number(2.3)),
            ("fridge", FieldValue::Number(3.0)),
            ("fridge_avg", FieldValue::Number(3.3)),
            ("target", FieldValue::Number(31.2)),
            ("target_avg", FieldValue::Number(31.3)),
            ("heater", FieldValue::Flag(true)),
            ("cooler", FieldValue::Flag(false)),
            ("limiter", FieldValue::Flag(true)),
            ("p", FieldValue::Number(2.3)),
            ("i", FieldValue::Number(3.4)),
            ("d", FieldValue::Number(-5.6)),
            ("control", FieldValue::Number(12.5)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        assert_eq!(snapshot, expected);
    }

    #[test]
    fn concurrent_producers_complete_a_snapshot() {
        let fields: Vec<String> = (0..8).map(|i| format!("f{i}")).collect();
        let aggregator = Arc::new(Aggregator::new(fields.clone()));

        let producers: Vec<_> = fields
            .into_iter()
            .enumerate()
            .map(|(n, field)| {
                let aggregator = Arc::clone(&aggregator);
                thread::spawn(move || {
                    for _ in 0..100 {
                        aggregator.observe(&field, n as f64);
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        let snapshot = aggregator.try_read().complete().unwrap();
        assert_eq!(snapshot.len(), 8);
        assert_eq!(snapshot["f7"], FieldValue::Number(7.0));
    }

    #[test]
    fn flags_read_as_numbers() {
        assert_eq!(FieldValue::Flag(true).as_f64(), 1.0);
        assert_eq!(FieldValue::Flag(false).as_f64(), 0.0);
        assert_eq!(FieldValue::from(21.5).as_f64(), 21.5);
    }
}
