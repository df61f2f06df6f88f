//! Listener capabilities and the ordered fan-out used by every publisher.
//!
//! A listener implements only the capabilities it cares about and is
//! registered into the typed set of each publisher it follows.

use std::fmt;
use std::sync::Arc;

pub trait TemperatureObserver: Send + Sync {
    fn on_temperature(&self, name: &str, current: f64, average: f64);
}

pub trait ActuatorObserver: Send + Sync {
    fn on_actuator_state(&self, name: &str, on: bool);
}

pub trait ControlObserver: Send + Sync {
    fn on_control_tick(&self, p: f64, i: f64, d: f64, control: f64);
}

/// Registration-ordered set of listeners of one capability.
pub struct Observers<T: ?Sized> {
    listeners: Vec<Arc<T>>,
}

impl<T: ?Sized> Observers<T> {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    pub fn register(&mut self, listener: Arc<T>) {
        self.listeners.push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Calls `f` on each listener synchronously, in registration order.
    pub fn notify(&self, mut f: impl FnMut(&T)) {
        for listener in &self.listeners {
            f(listener);
        }
    }
}

impl<T: ?Sized> Default for Observers<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for Observers<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
