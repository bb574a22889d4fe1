//! Capability traits the control core needs from its collaborators.
//!
//! Hardware drivers, the CSV log, and the HTTP uploader all live behind
//! these traits so the core can run against test doubles, the simulator,
//! or the real Raspberry Pi peripherals without changing.

use crate::error::{ActuatorError, NetworkError, PersistenceError, SensorError};
use crate::record::TelemetryRecord;

/// Temperature/humidity pair from the climate probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientReading {
    pub temp_c: f32,
    pub humidity_pct: f32,
}

/// Instantaneous sensor access.
///
/// Implementations own any sensor-protection sequencing (e.g. powering the
/// moisture probe only for the read window) and must be safe to call at
/// whatever cadence the control loop chooses.
pub trait SensorPort {
    /// Current illuminance in lux.
    fn read_light_lux(&mut self) -> Result<f32, SensorError>;

    /// Raw soil-moisture ADC count, in the converter's native range.
    fn read_soil_raw(&mut self) -> Result<u16, SensorError>;

    /// Ambient temperature and relative humidity.
    fn read_ambient(&mut self) -> Result<AmbientReading, SensorError>;

    /// Whether the emergency-stop button is currently pressed.
    fn emergency_pressed(&mut self) -> bool;
}

/// Binary actuator outputs. Commands are idempotent and fire-and-forget;
/// there is no feedback sensing, so a failed command means the relay state
/// can no longer be trusted.
pub trait ActuatorPort {
    fn set_light(&mut self, on: bool) -> Result<(), ActuatorError>;
    fn set_valve(&mut self, on: bool) -> Result<(), ActuatorError>;
    fn set_pump(&mut self, on: bool) -> Result<(), ActuatorError>;
    fn set_alert(&mut self, on: bool) -> Result<(), ActuatorError>;

    /// Force every output OFF, pump before valve so the shutdown path obeys
    /// the same hydraulic ordering as a dose. All four commands are
    /// attempted even if one fails; the first failure is returned.
    fn all_off(&mut self) -> Result<(), ActuatorError> {
        let results = [
            self.set_pump(false),
            self.set_valve(false),
            self.set_light(false),
            self.set_alert(false),
        ];
        results.into_iter().collect()
    }
}

/// Append-only telemetry log.
pub trait PersistencePort {
    fn append(&mut self, record: &TelemetryRecord) -> Result<(), PersistenceError>;
}

/// Remote telemetry collector. Implementations must bound the request time
/// so a dead uplink cannot stall the control loop indefinitely.
#[allow(async_fn_in_trait)]
pub trait CloudPort {
    async fn publish(&mut self, record: &TelemetryRecord) -> Result<(), NetworkError>;
}

// ===========================================================================
// Test doubles
// ===========================================================================
