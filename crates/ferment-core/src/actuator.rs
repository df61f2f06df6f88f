//! Boolean actuators (relays) and their state fan-out.

use crate::error::{ActuatorError, HalError};
use crate::hal::SwitchOutput;
use crate::observer::{ActuatorObserver, Observers};
use crate::scheduler::PeriodicTask;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

pub trait Actuator: Send + Sync {
    fn name(&self) -> &str;

    /// Drives the actuator to `on`. Already being in that state is a no-op:
    /// no hardware write and no publish. Otherwise exactly one write and one
    /// publish happen before returning.
    fn set(&self, on: bool) -> Result<(), ActuatorError>;

    fn get(&self) -> bool;

    /// Re-publishes the current state without touching hardware.
    fn announce(&self);
}

struct Relay<O> {
    output: O,
    on: bool,
}

/// Actuator writing straight to an output line.
///
/// Construction is pure; [`RelayActuator::open`] performs the hardware setup.
pub struct RelayActuator<O> {
    name: String,
    relay: Mutex<Relay<O>>,
    observers: Observers<dyn ActuatorObserver>,
}

impl<O: SwitchOutput> RelayActuator<O> {
    pub fn new(name: impl Into<String>, output: O) -> Self {
        Self {
            name: name.into(),
            relay: Mutex::new(Relay { output, on: false }),
            observers: Observers::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ActuatorObserver>) -> Self {
        self.observers.register(observer);
        self
    }

    /// Initialises the output, forces it off and publishes that state.
    pub fn open(&self) -> Result<(), ActuatorError> {
        let mut relay = self.relay.lock().unwrap_or_else(PoisonError::into_inner);
        relay
            .output
            .init()
            .and_then(|_| relay.output.write(false))
            .map_err(|source| self.hal_error(source))?;
        relay.on = false;
        debug!(actuator = %self.name, "Opened actuator");
        self.publish(false);
        Ok(())
    }

    /// Callers hold the relay lock, so publishes reach observers in the same
    /// order as the state changes they report. Observers must not call back
    /// into this actuator.
    fn publish(&self, on: bool) {
        self.observers
            .notify(|o| o.on_actuator_state(&self.name, on));
    }

    fn hal_error(&self, source: HalError) -> ActuatorError {
        ActuatorError::Hal {
            actuator: self.name.clone(),
            source,
        }
    }
}

impl<O: SwitchOutput> Actuator for RelayActuator<O> {
    fn name(&self) -> &str {
        &self.name
    }

    fn set(&self, on: bool) -> Result<(), ActuatorError> {
        let mut relay = self.relay.lock().unwrap_or_else(PoisonError::into_inner);
        if relay.on == on {
            return Ok(());
        }
        relay
            .output
            .write(on)
            .map_err(|source| self.hal_error(source))?;
        relay.on = on;
        info!(actuator = %self.name, on, "Switched actuator");
        self.publish(on);
        Ok(())
    }

    fn get(&self) -> bool {
        self.relay.lock().unwrap_or_else(PoisonError::into_inner).on
    }

    fn announce(&self) {
        let relay = self.relay.lock().unwrap_or_else(PoisonError::into_inner);
        self.publish(relay.on);
    }
}

/// Periodically re-announces actuator states so that observers which need a
/// fresh value every cycle keep receiving one between transitions.
pub struct ActuatorHeartbeat {
    actuators: Vec<Arc<dyn Actuator>>,
}

impl ActuatorHeartbeat {
    pub fn new(actuators: Vec<Arc<dyn Actuator>>) -> Self {
        Self { actuators }
    }
}

impl PeriodicTask for ActuatorHeartbeat {
    fn name(&self) -> &str {
        "actuator-heartbeat"
    }

    fn tick(&mut self) {
        for actuator in &self.actuators {
            actuator.announce();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::aggregator::{Aggregator, FieldValue};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[derive(Clone, Default)]
    pub(crate) struct RecordingOutput {
        pub(crate) writes: Arc<Mutex<Vec<bool>>>,
        pub(crate) fail: bool,
    }

    impl SwitchOutput for RecordingOutput {
        fn write(&mut self, on: bool) -> Result<(), HalError> {
            if self.fail {
                return Err(HalError::NotReady {
                    device: "gpio-test".to_string(),
                });
            }
            self.writes.lock().unwrap().push(on);
            Ok(())
        }
    }

    #[derive(Default)]
    pub(crate) struct StateLog {
        pub(crate) seen: Mutex<Vec<(String, bool)>>,
    }

    impl ActuatorObserver for StateLog {
        fn on_actuator_state(&self, name: &str, on: bool) {
            self.seen.lock().unwrap().push((name.to_string(), on));
        }
    }

    fn heater() -> (RelayActuator<RecordingOutput>, RecordingOutput, Arc<StateLog>) {
        let output = RecordingOutput::default();
        let log = Arc::new(StateLog::default());
        let actuator = RelayActuator::new("heater", output.clone()).with_observer(log.clone());
        (actuator, output, log)
    }

    #[test]
    fn off_by_default() {
        let (heater, output, log) = heater();
        assert!(!heater.get());
        assert!(output.writes.lock().unwrap().is_empty());
        assert!(log.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn open_forces_off_and_publishes() {
        let (heater, output, log) = heater();
        heater.open().unwrap();

        assert_eq!(*output.writes.lock().unwrap(), vec![false]);
        assert_eq!(*log.seen.lock().unwrap(), vec![("heater".to_string(), false)]);
    }

    #[test]
    fn switching_writes_once_and_publishes_once() {
        let (heater, output, log) = heater();
        heater.set(true).unwrap();

        assert!(heater.get());
        assert_eq!(*output.writes.lock().unwrap(), vec![true]);
        assert_eq!(*log.seen.lock().unwrap(), vec![("heater".to_string(), true)]);
    }

    #[test]
    fn setting_current_state_is_a_noop() {
        let (heater, output, log) = heater();
        heater.set(false).unwrap();
        heater.set(true).unwrap();
        heater.set(true).unwrap();

        assert_eq!(*output.writes.lock().unwrap(), vec![true]);
        assert_eq!(log.seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn failed_write_keeps_state_and_stays_silent() {
        let output = RecordingOutput {
            fail: true,
            ..Default::default()
        };
        let log = Arc::new(StateLog::default());
        let heater = RelayActuator::new("heater", output).with_observer(log.clone());

        let res = heater.set(true);

        assert!(matches!(res, Err(ActuatorError::Hal { .. })));
        assert!(!heater.get());
        assert!(log.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn heartbeat_reannounces_without_writing() {
        let (heater, output, log) = heater();
        heater.set(true).unwrap();
        let heater: Arc<dyn Actuator> = Arc::new(heater);
        let mut heartbeat = ActuatorHeartbeat::new(vec![heater]);

        heartbeat.tick();
        heartbeat.tick();

        assert_eq!(output.writes.lock().unwrap().len(), 1);
        assert_eq!(
            *log.seen.lock().unwrap(),
            vec![
                ("heater".to_string(), true),
                ("heater".to_string(), true),
                ("heater".to_string(), true),
            ]
        );
    }

    /// Once armed, lingers inside the next `true` notification it receives,
    /// giving a concurrent switch the chance to overtake it.
    #[derive(Default)]
    pub(crate) struct SlowListener {
        entered: Mutex<Option<mpsc::Sender<()>>>,
    }

    impl SlowListener {
        pub(crate) fn arm(&self) -> mpsc::Receiver<()> {
            let (tx, rx) = mpsc::channel();
            *self.entered.lock().unwrap() = Some(tx);
            rx
        }
    }

    impl ActuatorObserver for SlowListener {
        fn on_actuator_state(&self, _name: &str, on: bool) {
            if !on {
                return;
            }
            let entered = self.entered.lock().unwrap().take();
            if let Some(tx) = entered {
                tx.send(()).unwrap();
                thread::sleep(Duration::from_millis(100));
            }
        }
    }

    #[test]
    fn heartbeat_racing_a_switch_never_leaves_a_stale_state() {
        let slow = Arc::new(SlowListener::default());
        let aggregator = Arc::new(Aggregator::new(["heater"]));
        let heater = Arc::new(
            RelayActuator::new("heater", RecordingOutput::default())
                .with_observer(slow.clone())
                .with_observer(aggregator.clone()),
        );
        heater.set(true).unwrap();
        let entered = slow.arm();

        let mut heartbeat = ActuatorHeartbeat::new(vec![heater.clone() as Arc<dyn Actuator>]);
        let beat = thread::spawn(move || heartbeat.tick());
        entered.recv().unwrap();
        heater.set(false).unwrap();
        beat.join().unwrap();

        let snapshot = aggregator.try_read().complete().unwrap();
        assert!(!heater.get());
        assert_eq!(snapshot["heater"], FieldValue::Flag(heater.get()));
    }
}
