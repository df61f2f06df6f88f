//! Positional PID with derivative on measurement.

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Gains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl Gains {
    pub const fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self { kp, ki, kd }
    }
}

/// One evaluation: the three terms and their sum.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PidOutput {
    pub p: f64,
    pub i: f64,
    pub d: f64,
    pub control: f64,
}

/// Control law driven once per controller tick.
pub trait ControlLaw: Send {
    fn gains(&self) -> Gains;

    /// Retunes in place. Accumulated integral state is kept.
    fn set_gains(&mut self, gains: Gains);

    fn set_setpoint(&mut self, setpoint: f64);

    /// Bounds the output, or lifts the bounds with `None`. Laws without a
    /// notion of saturation ignore this.
    fn set_output_limits(&mut self, _limits: Option<(f64, f64)>) {}

    /// `dt` is the time since the previous update, in seconds.
    fn update(&mut self, input: f64, dt: f64) -> PidOutput;
}

#[derive(Debug, Clone)]
pub struct Pid {
    gains: Gains,
    setpoint: f64,
    integral: f64,
    last_input: Option<f64>,
    output_limits: Option<(f64, f64)>,
}

impl Pid {
    pub fn new(gains: Gains, setpoint: f64) -> Self {
        Self {
            gains,
            setpoint,
            integral: 0.0,
            last_input: None,
            output_limits: None,
        }
    }

    fn clamp(&self, value: f64) -> f64 {
        match self.output_limits {
            Some((min, max)) => value.clamp(min, max),
            None => value,
        }
    }
}

impl ControlLaw for Pid {
    fn gains(&self) -> Gains {
        self.gains
    }

    fn set_gains(&mut self, gains: Gains) {
        self.gains = gains;
    }

    fn set_setpoint(&mut self, setpoint: f64) {
        self.setpoint = setpoint;
    }

    /// Clamps both the integral term and the output.
    fn set_output_limits(&mut self, limits: Option<(f64, f64)>) {
        self.output_limits = limits.map(|(min, max)| (min.min(max), max.max(min)));
    }

    fn update(&mut self, input: f64, dt: f64) -> PidOutput {
        let error = self.setpoint - input;
        let d_input = input - self.last_input.unwrap_or(input);

        let p = self.gains.kp * error;
        self.integral = self.clamp(self.integral + self.gains.ki * error * dt);
        let d = if dt > 0.0 {
            -self.gains.kd * d_input / dt
        } else {
            0.0
        };

        self.last_input = Some(input);
        PidOutput {
            p,
            i: self.integral,
            d,
            control: self.clamp(p + self.integral + d),
        }
    }
}
