use crate::error::HalError;
use crate::hal::{SwitchOutput, TemperatureReader};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

const MAX_SUBSTEP: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Room,
    Fridge,
    Vessel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Element {
    Heater,
    Cooler,
}

/// Lumped thermal model of a fermentation fridge.
#[derive(Debug, Clone)]
struct ChamberModel {
    room_c: f64,
    fridge_c: f64,
    vessel_c: f64,
    heater_on: bool,
    cooler_on: bool,

    heater_rate: f64,
    cooler_rate: f64,
    fridge_leak: f64,
    vessel_coupling: f64,

    last_step: Instant,
}

impl ChamberModel {
    fn new() -> Self {
        Self {
            room_c: 20.0,
            fridge_c: 20.0,
            vessel_c: 18.0,
            heater_on: false,
            cooler_on: false,
            // degC per second applied to fridge air
            heater_rate: 0.5,
            cooler_rate: 0.3,
            // per second
            fridge_leak: 0.01,
            vessel_coupling: 0.005,
            last_step: Instant::now(),
        }
    }

    fn step(&mut self, mut dt: Duration) {
        while !dt.is_zero() {
            let sub = dt.min(MAX_SUBSTEP);
            let dt_s = sub.as_secs_f64();

            let mut fridge_rate = self.fridge_leak * (self.room_c - self.fridge_c);
            if self.heater_on {
                fridge_rate += self.heater_rate;
            }
            if self.cooler_on {
                fridge_rate -= self.cooler_rate;
            }
            self.fridge_c += fridge_rate * dt_s;
            self.vessel_c += self.vessel_coupling * (self.fridge_c - self.vessel_c) * dt_s;

            dt -= sub;
        }
    }

    fn advance(&mut self) {
        let now = Instant::now();
        let dt = now.saturating_duration_since(self.last_step);
        self.last_step = now;
        self.step(dt);
    }

    fn temperature(&self, location: Location) -> f64 {
        match location {
            Location::Room => self.room_c,
            Location::Fridge => self.fridge_c,
            Location::Vessel => self.vessel_c,
        }
    }
}

/// Shared simulated chamber handing out thermometers and relays.
#[derive(Debug, Clone)]
pub struct SimulatedChamber {
    model: Arc<Mutex<ChamberModel>>,
}

impl SimulatedChamber {
    pub fn new() -> Self {
        Self {
            model: Arc::new(Mutex::new(ChamberModel::new())),
        }
    }

    pub fn with_temperatures(self, room_c: f64, fridge_c: f64, vessel_c: f64) -> Self {
        {
            let mut model = self.lock();
            model.room_c = room_c;
            model.fridge_c = fridge_c;
            model.vessel_c = vessel_c;
        }
        self
    }

    /// Advances the model by a fixed amount of simulated time.
    pub fn step(&self, dt: Duration) {
        self.lock().step(dt);
    }

    pub fn temperature(&self, location: Location) -> f64 {
        self.lock().temperature(location)
    }

    pub fn is_on(&self, element: Element) -> bool {
        let model = self.lock();
        match element {
            Element::Heater => model.heater_on,
            Element::Cooler => model.cooler_on,
        }
    }

    pub fn thermometer(&self, location: Location) -> SimulatedThermometer {
        SimulatedThermometer {
            model: Arc::clone(&self.model),
            location,
            device_id: format!("sim-{location:?}").to_lowercase(),
            dropout_every: None,
            reads: 0,
        }
    }

    pub fn relay(&self, element: Element) -> SimulatedRelay {
        SimulatedRelay {
            model: Arc::clone(&self.model),
            element,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ChamberModel> {
        self.model.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SimulatedChamber {
    fn default() -> Self {
        Self::new()
    }
}

/// Thermometer reporting the chamber temperature at one location, quantised to
/// 0.1 degC like a DS18B20.
#[derive(Debug)]
pub struct SimulatedThermometer {
    model: Arc<Mutex<ChamberModel>>,
    location: Location,
    device_id: String,
    dropout_every: Option<u32>,
    reads: u32,
}

impl SimulatedThermometer {
    /// Every `n`-th read reports not-ready.
    pub fn with_dropout(mut self, n: u32) -> Self {
        self.dropout_every = (n > 0).then_some(n);
        self
    }
}

impl TemperatureReader for SimulatedThermometer {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn read_celsius(&mut self) -> Result<f64, HalError> {
        self.reads = self.reads.wrapping_add(1);
        if let Some(n) = self.dropout_every {
            if self.reads % n == 0 {
                return Err(HalError::NotReady {
                    device: self.device_id.clone(),
                });
            }
        }

        let mut model = self.model.lock().unwrap_or_else(PoisonError::into_inner);
        model.advance();
        Ok((model.temperature(self.location) * 10.0).round() / 10.0)
    }
}

#[derive(Debug)]
pub struct SimulatedRelay {
    model: Arc<Mutex<ChamberModel>>,
    element: Element,
}

impl SwitchOutput for SimulatedRelay {
    fn write(&mut self, on: bool) -> Result<(), HalError> {
        let mut model = self.model.lock().unwrap_or_else(PoisonError::into_inner);
        model.advance();
        match self.element {
            Element::Heater => model.heater_on = on,
            Element::Cooler => model.cooler_on = on,
        }
        Ok(())
    }
}
