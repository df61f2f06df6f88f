pub mod actuator;
pub mod aggregator;
pub mod config;
pub mod controller;
pub mod error;
pub mod hal;
#[cfg(feature = "simulation")]
pub mod hal_sim;
pub mod interlock;
pub mod observer;
pub mod pid;
pub mod scheduler;
pub mod sensor;
pub mod tags;

pub use actuator::{Actuator, ActuatorHeartbeat, RelayActuator};
pub use aggregator::{Aggregate, Aggregator, FieldValue, Snapshot};
pub use config::{ConfigSnapshot, ConfigSource, SharedConfig};
pub use controller::{ControlSettings, Controller, ControllerStats, Demand, Plant};
pub use error::{ActuatorError, HalError, SetupError};
pub use hal::{SwitchOutput, TemperatureReader};
#[cfg(feature = "simulation")]
pub use hal_sim::{Element, Location, SimulatedChamber};
pub use interlock::{Interlock, InterlockState, InterlockedActuator};
pub use observer::{ActuatorObserver, ControlObserver, Observers, TemperatureObserver};
pub use pid::{ControlLaw, Gains, Pid, PidOutput};
pub use scheduler::{PeriodicTask, Schedule, Scheduler, TaskHandle, TaskReport};
pub use sensor::{Reading, Sensor, SensorHandle, TemperatureSource};
