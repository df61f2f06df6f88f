//! Temperature sensors with a bounded moving average.

use crate::error::SetupError;
use crate::hal::TemperatureReader;
use crate::observer::{Observers, TemperatureObserver};
use crate::scheduler::PeriodicTask;
use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

/// Latest committed values of a sensor, readable from any task.
pub trait TemperatureSource: Send + Sync {
    fn name(&self) -> &str;
    fn current(&self) -> f64;
    fn average(&self) -> f64;
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Reading {
    pub current: f64,
    pub average: f64,
}

/// Fixed-capacity window over the most recent valid readings.
#[derive(Debug, Clone)]
pub struct MovingAverage {
    capacity: usize,
    readings: VecDeque<f64>,
}

impl MovingAverage {
    /// `capacity` must be at least one.
    pub fn new(capacity: usize) -> Option<Self> {
        (capacity > 0).then(|| Self {
            capacity,
            readings: VecDeque::with_capacity(capacity),
        })
    }

    /// Appends a reading, evicting the oldest once full, and returns the new
    /// average.
    pub fn push(&mut self, value: f64) -> f64 {
        if self.readings.len() == self.capacity {
            self.readings.pop_front();
        }
        self.readings.push_back(value);
        self.average()
    }

    /// Mean of the window rounded to one decimal place. Zero when empty.
    pub fn average(&self) -> f64 {
        if self.readings.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.readings.iter().sum();
        round_tenth(sum / self.readings.len() as f64)
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn readings(&self) -> impl Iterator<Item = f64> + '_ {
        self.readings.iter().copied()
    }
}

pub fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Cheap clone of a sensor's committed state for consumers on other tasks.
#[derive(Debug, Clone)]
pub struct SensorHandle {
    name: Arc<str>,
    latest: Arc<RwLock<Reading>>,
}

impl SensorHandle {
    pub fn reading(&self) -> Reading {
        *self.latest.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TemperatureSource for SensorHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn current(&self) -> f64 {
        self.reading().current
    }

    fn average(&self) -> f64 {
        self.reading().average
    }
}

/// A thermometer polled by its own task. The window is owned by that task; other
/// tasks see only the committed [`Reading`] through a [`SensorHandle`].
pub struct Sensor<R> {
    name: Arc<str>,
    reader: R,
    window: MovingAverage,
    latest: Arc<RwLock<Reading>>,
    observers: Observers<dyn TemperatureObserver>,
}

impl<R: TemperatureReader> Sensor<R> {
    pub fn new(name: impl Into<String>, reader: R, window: usize) -> Result<Self, SetupError> {
        let name: String = name.into();
        let window = MovingAverage::new(window).ok_or_else(|| SetupError::EmptyWindow {
            sensor: name.clone(),
        })?;
        Ok(Self {
            name: name.into(),
            reader,
            window,
            latest: Arc::new(RwLock::new(Reading::default())),
            observers: Observers::new(),
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn TemperatureObserver>) -> Self {
        self.observers.register(observer);
        self
    }

    pub fn handle(&self) -> SensorHandle {
        SensorHandle {
            name: Arc::clone(&self.name),
            latest: Arc::clone(&self.latest),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self) -> f64 {
        self.handle().current()
    }

    pub fn get_average(&self) -> f64 {
        self.handle().average()
    }

    pub fn window(&self) -> &MovingAverage {
        &self.window
    }

    /// Polls the device once. A device that is not ready leaves all state
    /// untouched and publishes nothing.
    pub fn read(&mut self) -> Option<Reading> {
        let current = match self.reader.read_celsius() {
            Ok(value) => value,
            Err(e) => {
                debug!(sensor = %self.name, error = %e, "Skipping sensor read");
                return None;
            }
        };

        let reading = Reading {
            current,
            average: self.window.push(current),
        };
        *self.latest.write().unwrap_or_else(PoisonError::into_inner) = reading;

        debug!(
            sensor = %self.name,
            device = self.reader.device_id(),
            current = reading.current,
            average = reading.average,
            "Read temperature"
        );

        self.observers
            .notify(|o| o.on_temperature(&self.name, reading.current, reading.average));
        Some(reading)
    }
}

impl<R: TemperatureReader + 'static> PeriodicTask for Sensor<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn tick(&mut self) {
        self.read();
    }

    fn shutdown(&mut self) {
        info!(sensor = %self.name, device = self.reader.device_id(), "Shutting down sensor");
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::HalError;
    use std::sync::Mutex;

    /// Reader replaying a fixed script; `None` entries read as not-ready.
    pub(crate) struct ScriptedReader {
        script: VecDeque<Option<f64>>,
    }

    impl ScriptedReader {
        pub(crate) fn new(script: impl IntoIterator<Item = Option<f64>>) -> Self {
            Self {
                script: script.into_iter().collect(),
            }
        }
    }

    impl TemperatureReader for ScriptedReader {
        fn device_id(&self) -> &str {
            "28-scripted"
        }

        fn read_celsius(&mut self) -> Result<f64, HalError> {
            self.script
                .pop_front()
                .flatten()
                .ok_or_else(|| HalError::NotReady {
                    device: "28-scripted".to_string(),
                })
        }
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(String, f64, f64)>>,
    }

    impl TemperatureObserver for Recorder {
        fn on_temperature(&self, name: &str, current: f64, average: f64) {
            self.seen
                .lock()
                .unwrap()
                .push((name.to_string(), current, average));
        }
    }

    #[test]
    fn reads_and_publishes_to_every_listener() {
        let recorder = Arc::new(Recorder::default());
        let mut sensor = Sensor::new("vessel", ScriptedReader::new([Some(21.5)]), 3)
            .unwrap()
            .with_observer(recorder.clone())
            .with_observer(recorder.clone());

        let reading = sensor.read().unwrap();

        assert_eq!(reading.current, 21.5);
        assert_eq!(sensor.get(), 21.5);
        assert_eq!(sensor.get_average(), 21.5);
        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1], ("vessel".to_string(), 21.5, 21.5));
    }

    #[test]
    fn keeps_previous_value_when_not_ready() {
        let recorder = Arc::new(Recorder::default());
        let mut sensor = Sensor::new("vessel", ScriptedReader::new([Some(20.0), None]), 3)
            .unwrap()
            .with_observer(recorder.clone());

        sensor.read();
        assert!(sensor.read().is_none());

        assert_eq!(sensor.get(), 20.0);
        assert_eq!(sensor.window().len(), 1);
        assert_eq!(recorder.seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn unread_sensor_reports_zero() {
        let sensor = Sensor::new("vessel", ScriptedReader::new([]), 3).unwrap();
        assert_eq!(sensor.get(), 0.0);
        assert_eq!(sensor.get_average(), 0.0);
    }

    #[test]
    fn average_covers_only_the_window_and_is_rounded() {
        let script = [Some(10.0), Some(20.0), Some(20.1), Some(20.2)];
        let mut sensor = Sensor::new("fridge", ScriptedReader::new(script), 3).unwrap();

        for _ in 0..4 {
            sensor.read();
        }

        // (20.0 + 20.1 + 20.2) / 3
        assert_eq!(sensor.get_average(), 20.1);
        assert_eq!(sensor.window().readings().collect::<Vec<_>>(), vec![20.0, 20.1, 20.2]);
    }

    #[test]
    fn rejects_empty_window() {
        let res = Sensor::new("vessel", ScriptedReader::new([]), 0);
        assert!(matches!(res, Err(SetupError::EmptyWindow { .. })));
    }

    #[test]
    fn handle_follows_sensor_state() {
        let mut sensor = Sensor::new("room", ScriptedReader::new([Some(18.0), Some(19.0)]), 2)
            .unwrap();
        let handle = sensor.handle();

        sensor.read();
        sensor.read();

        assert_eq!(handle.name(), "room");
        assert_eq!(handle.current(), 19.0);
        assert_eq!(handle.average(), 18.5);
    }
}
