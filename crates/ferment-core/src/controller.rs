//! Temperature controller: PID, deadband, and the thermal interlock.
//!
//! Each tick runs the same fixed sequence: retune from config, publish the
//! setpoint, compute and publish the control signal, evaluate the interlock, and only when it is
//! released drive the heater and cooler. The opposite actuator is always
//! switched off before one is switched on, and a failed switch-off aborts
//! the switch-on, so both are never on together.

use crate::actuator::Actuator;
use crate::config::ConfigSource;
use crate::interlock::InterlockState;
use crate::observer::{ControlObserver, Observers, TemperatureObserver};
use crate::pid::{ControlLaw, Gains, Pid, PidOutput};
use crate::scheduler::PeriodicTask;
use crate::sensor::TemperatureSource;
use crate::tags;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub mod keys {
    pub const P: &str = "p";
    pub const I: &str = "i";
    pub const D: &str = "d";
    pub const TARGET: &str = "target";
    pub const HEATING_LIMIT: &str = "heating_limit";
    pub const LIMIT_WINDOW: &str = "limit_window";
    pub const THRESHOLD: &str = "threshold";
    pub const OUTPUT_MIN: &str = "output_min";
    pub const OUTPUT_MAX: &str = "output_max";
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlSettings {
    pub gains: Gains,
    pub target: f64,
    /// Secondary temperature above which the interlock engages.
    pub heating_limit: f64,
    /// Hysteresis below `heating_limit` before the interlock releases.
    pub limit_window: f64,
    /// Deadband half-width around zero control.
    pub threshold: f64,
    /// Saturation bounds of the control law, if any.
    pub output_limits: Option<(f64, f64)>,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            gains: Gains::new(1.0, 0.0, 0.0),
            target: 20.0,
            heating_limit: 40.0,
            limit_window: 5.0,
            threshold: 0.5,
            output_limits: None,
        }
    }
}

impl ControlSettings {
    /// Overlays the keys present in `config`; absent keys keep their
    /// current value. Output limits change only when both bounds are set.
    pub fn refresh(&self, config: &dyn ConfigSource) -> Self {
        Self {
            gains: Gains {
                kp: config.get_or(keys::P, self.gains.kp),
                ki: config.get_or(keys::I, self.gains.ki),
                kd: config.get_or(keys::D, self.gains.kd),
            },
            target: config.get_or(keys::TARGET, self.target),
            heating_limit: config.get_or(keys::HEATING_LIMIT, self.heating_limit),
            limit_window: config.get_or(keys::LIMIT_WINDOW, self.limit_window),
            threshold: config.get_or(keys::THRESHOLD, self.threshold).max(0.0),
            output_limits: match (config.get(keys::OUTPUT_MIN), config.get(keys::OUTPUT_MAX)) {
                (Some(min), Some(max)) => Some((min.min(max), max.max(min))),
                _ => self.output_limits,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Demand {
    /// Both actuators off.
    Idle,
    Heat,
    Cool,
}

/// Maps a control signal onto a demand. Zero is the deadband midpoint even
/// when the deadband is empty.
pub fn demand(control: f64, threshold: f64) -> Demand {
    if control.is_nan() || control == 0.0 || control.abs() < threshold {
        Demand::Idle
    } else if control > 0.0 {
        Demand::Heat
    } else {
        Demand::Cool
    }
}

/// Devices the controller reads and drives.
#[derive(Clone)]
pub struct Plant {
    /// Vessel thermometer; its moving average is the process variable.
    pub primary: Arc<dyn TemperatureSource>,
    /// Jacket/fridge thermometer checked against the heating limit.
    pub secondary: Arc<dyn TemperatureSource>,
    pub heater: Arc<dyn Actuator>,
    pub cooler: Arc<dyn Actuator>,
    pub interlock: Arc<dyn Actuator>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControllerStats {
    pub ticks: u64,
    pub retunes: u64,
    pub interlock_trips: u64,
    pub interlocked_ticks: u64,
    pub actuator_faults: u64,
}

pub struct Controller<L = Pid> {
    law: L,
    settings: ControlSettings,
    config: Arc<dyn ConfigSource>,
    plant: Plant,
    observers: Observers<dyn ControlObserver>,
    setpoint_observers: Observers<dyn TemperatureObserver>,
    sample_time: Duration,
    last_tick: Option<Instant>,
    stats: ControllerStats,
}

impl Controller<Pid> {
    pub fn new(config: Arc<dyn ConfigSource>, plant: Plant, sample_time: Duration) -> Self {
        let settings = ControlSettings::default().refresh(config.as_ref());
        let law = Pid::new(settings.gains, settings.target);
        Self::with_law(config, plant, sample_time, law)
    }
}

impl<L: ControlLaw> Controller<L> {
    pub fn with_law(
        config: Arc<dyn ConfigSource>,
        plant: Plant,
        sample_time: Duration,
        mut law: L,
    ) -> Self {
        let settings = ControlSettings::default().refresh(config.as_ref());
        law.set_gains(settings.gains);
        law.set_setpoint(settings.target);
        law.set_output_limits(settings.output_limits);
        Self {
            law,
            settings,
            config,
            plant,
            observers: Observers::new(),
            setpoint_observers: Observers::new(),
            sample_time,
            last_tick: None,
            stats: ControllerStats::default(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ControlObserver>) -> Self {
        self.observers.register(observer);
        self
    }

    /// The setpoint is published every tick as a pseudo-sensor reading
    /// named [`tags::TARGET`], with current and average both the target.
    pub fn with_setpoint_observer(mut self, observer: Arc<dyn TemperatureObserver>) -> Self {
        self.setpoint_observers.register(observer);
        self
    }

    pub fn settings(&self) -> &ControlSettings {
        &self.settings
    }

    pub fn stats(&self) -> &ControllerStats {
        &self.stats
    }

    /// Runs one control cycle. Returns the demand that was applied, or
    /// `None` when the interlock held actuator control off this tick.
    pub fn control(&mut self) -> Option<Demand> {
        self.stats.ticks += 1;
        self.retune();
        self.publish_setpoint();

        let dt = self.elapsed_secs();
        let output = self.law.update(self.plant.primary.average(), dt);
        debug!(
            p = output.p,
            i = output.i,
            d = output.d,
            control = output.control,
            "Computed control value"
        );
        self.publish(&output);

        if self.check_interlock() == InterlockState::Engaged {
            self.stats.interlocked_ticks += 1;
            return None;
        }

        let demand = demand(output.control, self.settings.threshold);
        self.apply(demand);
        Some(demand)
    }

    fn retune(&mut self) {
        let next = self.settings.refresh(self.config.as_ref());

        if next.gains != self.law.gains() {
            info!(
                kp = next.gains.kp,
                ki = next.gains.ki,
                kd = next.gains.kd,
                "Retuning PID"
            );
            self.law.set_gains(next.gains);
            self.stats.retunes += 1;
        }
        if next.target != self.settings.target {
            info!(from = self.settings.target, to = next.target, "Target changed");
            self.law.set_setpoint(next.target);
        }
        if next.output_limits != self.settings.output_limits {
            info!(limits = ?next.output_limits, "Output limits changed");
            self.law.set_output_limits(next.output_limits);
        }
        self.settings = next;
    }

    fn elapsed_secs(&mut self) -> f64 {
        let now = Instant::now();
        let dt = match self.last_tick {
            Some(last) => now.duration_since(last),
            None => self.sample_time,
        };
        self.last_tick = Some(now);
        dt.as_secs_f64()
    }

    fn publish_setpoint(&self) {
        let target = self.settings.target;
        self.setpoint_observers
            .notify(|o| o.on_temperature(tags::TARGET, target, target));
    }

    fn publish(&self, output: &PidOutput) {
        self.observers
            .notify(|o| o.on_control_tick(output.p, output.i, output.d, output.control));
    }

    fn check_interlock(&mut self) -> InterlockState {
        let secondary = self.plant.secondary.current();
        let limit = self.settings.heating_limit;
        let release_below = limit - self.settings.limit_window;
        let interlock = Arc::clone(&self.plant.interlock);

        match InterlockState::from(interlock.get()) {
            InterlockState::Engaged if secondary < release_below => {
                info!(secondary, release_below, "Secondary temperature back in range");
                self.switch(interlock.as_ref(), false);
                InterlockState::Released
            }
            InterlockState::Engaged => InterlockState::Engaged,
            InterlockState::Released if secondary > limit => {
                warn!(secondary, limit, "Secondary temperature over heating limit");
                self.stats.interlock_trips += 1;
                self.switch(interlock.as_ref(), true);
                InterlockState::Engaged
            }
            InterlockState::Released => InterlockState::Released,
        }
    }

    fn apply(&mut self, demand: Demand) {
        let heater = Arc::clone(&self.plant.heater);
        let cooler = Arc::clone(&self.plant.cooler);

        match demand {
            Demand::Idle => {
                self.switch(cooler.as_ref(), false);
                self.switch(heater.as_ref(), false);
            }
            Demand::Heat => {
                if self.switch(cooler.as_ref(), false) {
                    self.switch(heater.as_ref(), true);
                }
            }
            Demand::Cool => {
                if self.switch(heater.as_ref(), false) {
                    self.switch(cooler.as_ref(), true);
                }
            }
        }
    }

    /// Calls `set` only when the state differs. Returns whether the
    /// actuator ended up in the requested state.
    fn switch(&mut self, actuator: &dyn Actuator, on: bool) -> bool {
        if actuator.get() == on {
            return true;
        }
        match actuator.set(on) {
            Ok(()) => true,
            Err(e) => {
                self.stats.actuator_faults += 1;
                error!(actuator = actuator.name(), on, error = %e, "Failed to switch actuator");
                false
            }
        }
    }
}

impl<L: ControlLaw + 'static> PeriodicTask for Controller<L> {
    fn name(&self) -> &str {
        "controller"
    }

    fn tick(&mut self) {
        self.control();
    }

    fn shutdown(&mut self) {
        debug!(ticks = self.stats.ticks, "Shutting down controller");
    }
}
