use thiserror::Error;

/// Faults reported by the hardware seams.
#[derive(Debug, Error)]
pub enum HalError {
    /// The device answered but flagged the sample as unusable.
    #[error("device {device} not ready")]
    NotReady { device: String },
}

#[derive(Debug, Error)]
pub enum ActuatorError {
    #[error("actuator {actuator}: {source}")]
    Hal {
        actuator: String,
        #[source]
        source: HalError,
    },

    #[error("actuator {actuator} is locked out by interlock {interlock}")]
    Interlocked { actuator: String, interlock: String },
}

/// Wiring-time mistakes. These never occur once the tasks are running.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SetupError {
    #[error("sensor {sensor}: averaging window must hold at least one reading")]
    EmptyWindow { sensor: String },

    #[error("invalid {what}: {value} seconds")]
    InvalidDuration { what: &'static str, value: f64 },
}
