//! Simulated peripherals for development without greenhouse hardware.
//!
//! The soil probe follows a noisy drying walk that snaps back wet near the
//! dry end (the controller waters at that point anyway, so this
//! approximates the closed loop without coupling the simulator to the
//! actuator bank). Lux follows the wall-clock hour so the schedule logic
//! can be watched end to end during a dev run.

use chrono::{Local, Timelike};
use tracing::info;

use crate::error::{ActuatorError, SensorError};
use crate::ports::{ActuatorPort, AmbientReading, SensorPort};

pub struct SimSensors {
    soil_raw: f64,
}

impl SimSensors {
    pub fn new() -> Self {
        // Start mid-range so the first dose is a few cycles away.
        Self { soil_raw: 60.0 }
    }
}

impl SensorPort for SimSensors {
    fn read_light_lux(&mut self) -> Result<f32, SensorError> {
        // Rough bell over the day, dark at night, ±10 % electronic noise.
        let hour = Local::now().hour();
        let base = if (6..20).contains(&hour) {
            let x = (hour as f32 - 13.0) / 7.0;
            900.0 * (1.0 - x * x)
        } else {
            0.0
        };
        Ok((base * (0.9 + 0.2 * fastrand::f32())).max(0.0))
    }

    fn read_soil_raw(&mut self) -> Result<u16, SensorError> {
        self.soil_raw += 4.0 + 4.0 * fastrand::f64();
        if self.soil_raw > 150.0 {
            self.soil_raw = 20.0 + 10.0 * fastrand::f64();
        }
        Ok(self.soil_raw.clamp(0.0, 255.0) as u16)
    }

    fn read_ambient(&mut self) -> Result<AmbientReading, SensorError> {
        Ok(AmbientReading {
            temp_c: 18.0 + 6.0 * fastrand::f32(),
            humidity_pct: 45.0 + 20.0 * fastrand::f32(),
        })
    }

    fn emergency_pressed(&mut self) -> bool {
        false
    }
}

/// Actuator bank that only logs. State is kept so a dev run can be
/// inspected in a debugger.
#[derive(Default)]
pub struct SimActuators {
    pub light: bool,
    pub valve: bool,
    pub pump: bool,
    pub alert: bool,
}

fn onoff(on: bool) -> &'static str {
    if on {
        "ON"
    } else {
        "OFF"
    }
}

impl ActuatorPort for SimActuators {
    fn set_light(&mut self, on: bool) -> Result<(), ActuatorError> {
        self.light = on;
        info!("[sim-gpio] light set {}", onoff(self.light));
        Ok(())
    }

    fn set_valve(&mut self, on: bool) -> Result<(), ActuatorError> {
        self.valve = on;
        info!("[sim-gpio] valve set {}", onoff(self.valve));
        Ok(())
    }

    fn set_pump(&mut self, on: bool) -> Result<(), ActuatorError> {
        self.pump = on;
        info!("[sim-gpio] pump set {}", onoff(self.pump));
        Ok(())
    }

    fn set_alert(&mut self, on: bool) -> Result<(), ActuatorError> {
        self.alert = on;
        info!("[sim-gpio] alert set {}", onoff(self.alert));
        Ok(())
    }
}

// ===========================================================================
// Tests
// ===========================================================================
