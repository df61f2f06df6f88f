//! Telemetry field names shared by producers, the aggregator and sinks.

pub const P: &str = "p";
pub const I: &str = "i";
pub const D: &str = "d";
pub const CONTROL: &str = "control";

pub const CONTROL_FIELDS: [&str; 4] = [P, I, D, CONTROL];

pub const AVG_SUFFIX: &str = "_avg";

/// Field carrying a sensor's moving average.
pub fn avg_field(sensor: &str) -> String {
    format!("{sensor}{AVG_SUFFIX}")
}

// Fixed chamber wiring.
pub const ROOM: &str = "environment";
pub const VESSEL: &str = "vessel";
pub const FRIDGE: &str = "fridge";
pub const HEATER: &str = "heater";
pub const COOLER: &str = "cooler";
pub const LIMITER: &str = "limiter";

/// Pseudo-sensor carrying the controller's setpoint.
pub const TARGET: &str = "target";

/// Temperature-like snapshot fields: the three thermometers plus the setpoint.
pub const CHAMBER_TEMPERATURES: [&str; 4] = [ROOM, VESSEL, FRIDGE, TARGET];
pub const CHAMBER_ACTUATORS: [&str; 3] = [HEATER, COOLER, LIMITER];
