//! Thermal interlock guarding a protected actuator.
//!
//! While engaged, the protected actuator is off and every attempt to switch
//! it on through [`InterlockedActuator`] is refused. Releasing the interlock
//! never switches anything back on.

use crate::actuator::Actuator;
use crate::error::ActuatorError;
use crate::observer::{ActuatorObserver, Observers};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterlockState {
    #[default]
    Released,
    Engaged,
}

impl From<bool> for InterlockState {
    fn from(engaged: bool) -> Self {
        if engaged {
            Self::Engaged
        } else {
            Self::Released
        }
    }
}

pub struct Interlock {
    name: String,
    protected: Arc<dyn Actuator>,
    engaged: Arc<Mutex<bool>>,
    observers: Observers<dyn ActuatorObserver>,
}

impl Interlock {
    pub fn new(name: impl Into<String>, protected: Arc<dyn Actuator>) -> Self {
        Self {
            name: name.into(),
            protected,
            engaged: Arc::new(Mutex::new(false)),
            observers: Observers::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ActuatorObserver>) -> Self {
        self.observers.register(observer);
        self
    }

    /// Publishes the initial released state.
    pub fn open(&self) {
        debug!(interlock = %self.name, protected = self.protected.name(), "Opened interlock");
        self.announce();
    }

    pub fn state(&self) -> InterlockState {
        self.get().into()
    }

    /// The protected actuator as seen by control logic: switching it on is
    /// refused while the interlock is engaged.
    pub fn guarded(&self) -> InterlockedActuator {
        InterlockedActuator {
            inner: Arc::clone(&self.protected),
            engaged: Arc::clone(&self.engaged),
            interlock: self.name.clone(),
        }
    }

    /// Called with the engaged flag locked.
    fn publish(&self, on: bool) {
        self.observers
            .notify(|o| o.on_actuator_state(&self.name, on));
    }
}

impl Actuator for Interlock {
    fn name(&self) -> &str {
        &self.name
    }

    /// Engaging forces the protected actuator off first. The interlock is
    /// recorded as engaged even if that forced write fails; the failure is
    /// returned after publishing.
    fn set(&self, on: bool) -> Result<(), ActuatorError> {
        let mut engaged = self.engaged.lock().unwrap_or_else(PoisonError::into_inner);
        let forced = if on && self.protected.get() {
            self.protected.set(false)
        } else {
            Ok(())
        };
        *engaged = on;

        if on {
            warn!(interlock = %self.name, protected = self.protected.name(), "Interlock engaged");
        } else {
            warn!(interlock = %self.name, protected = self.protected.name(), "Interlock released");
        }
        self.publish(on);
        forced
    }

    fn get(&self) -> bool {
        *self.engaged.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn announce(&self) {
        let engaged = self.engaged.lock().unwrap_or_else(PoisonError::into_inner);
        self.publish(*engaged);
    }
}

/// View of an interlock's protected actuator that honours the lockout.
#[derive(Clone)]
pub struct InterlockedActuator {
    inner: Arc<dyn Actuator>,
    engaged: Arc<Mutex<bool>>,
    interlock: String,
}

impl Actuator for InterlockedActuator {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn set(&self, on: bool) -> Result<(), ActuatorError> {
        let engaged = self.engaged.lock().unwrap_or_else(PoisonError::into_inner);
        if on && *engaged {
            return Err(ActuatorError::Interlocked {
                actuator: self.inner.name().to_string(),
                interlock: self.interlock.clone(),
            });
        }
        self.inner.set(on)
    }

    fn get(&self) -> bool {
        self.inner.get()
    }

    fn announce(&self) {
        self.inner.announce();
    }
}
