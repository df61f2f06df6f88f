use crate::error::HalError;

/// Raw temperature sensor device. A reading that the device flags as unhealthy is
/// reported as [`HalError::NotReady`].
pub trait TemperatureReader: Send {
    fn device_id(&self) -> &str;
    fn read_celsius(&mut self) -> Result<f64, HalError>;
}

/// Boolean output line driving a relay.
pub trait SwitchOutput: Send {
    /// One-time hardware setup. Called from the owning actuator's `open`.
    fn init(&mut self) -> Result<(), HalError> {
        Ok(())
    }

    fn write(&mut self, on: bool) -> Result<(), HalError>;
}
