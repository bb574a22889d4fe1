//! Irrigation dose sequencing.
//!
//! A dose walks the hydraulics through a fixed order that must never be
//! reordered or parallelised:
//!
//! ```text
//! Idle ──▶ ValveOpening ──▶ PumpRunning ──▶ PumpStopping ──▶ ValveClosing ──▶ Idle
//! ```
//!
//! The valve opens and settles before the pump pushes against it, and the
//! pump always stops and the line bleeds down before the valve closes.
//! That release leg (pump off, bleed settle, valve close) runs on every
//! exit path once the valve has been commanded open, actuator faults and
//! shutdown mid-water included.

use tracing::{debug, info, warn};

use crate::config::IrrigationConfig;
use crate::error::ActuatorError;
use crate::ports::ActuatorPort;
use crate::record::IrrigationState;
use crate::shutdown::Shutdown;

/// Position of the sequencer within a dose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DoseState {
    Idle,
    ValveOpening,
    PumpRunning,
    PumpStopping,
    ValveClosing,
}

pub struct IrrigationSequencer {
    cfg: IrrigationConfig,
    state: DoseState,
}

impl IrrigationSequencer {
    pub fn new(cfg: IrrigationConfig) -> Self {
        Self {
            cfg,
            state: DoseState::Idle,
        }
    }

    fn transition(&mut self, next: DoseState) {
        debug!(from = ?self.state, to = ?next, "dose transition");
        self.state = next;
    }

    /// Evaluate one cycle's soil reading and water if the bed is dry.
    ///
    /// When the reading is at or above the threshold — or missing — both
    /// valve and pump are re-asserted OFF rather than skipped, so a relay
    /// left on by an earlier fault does not silently persist.
    pub async fn tend(
        &mut self,
        moisture_pct: Option<u8>,
        actuators: &mut impl ActuatorPort,
        shutdown: &mut Shutdown,
    ) -> Result<IrrigationState, ActuatorError> {
        match moisture_pct {
            Some(pct) if pct < self.cfg.dry_threshold_pct && !shutdown.is_signalled() => {
                info!(
                    moisture_pct = pct,
                    threshold_pct = self.cfg.dry_threshold_pct,
                    "soil dry — starting dose"
                );
                self.run_dose(actuators, shutdown).await?;
                Ok(IrrigationState::Watering)
            }
            other => {
                if other.is_none() {
                    warn!("soil moisture unknown — holding hydraulics off");
                }
                actuators.set_pump(false)?;
                actuators.set_valve(false)?;
                actuators.set_alert(false)?;
                Ok(IrrigationState::Idle)
            }
        }
    }

    /// Drive one complete dose.
    async fn run_dose(
        &mut self,
        actuators: &mut impl ActuatorPort,
        shutdown: &mut Shutdown,
    ) -> Result<(), ActuatorError> {
        actuators.set_alert(true)?;
        self.transition(DoseState::ValveOpening);
        actuators.set_valve(true)?;

        // Let line pressure equalise before the pump pushes against it.
        let mut interrupted = !shutdown.sleep(self.cfg.valve_settle()).await;
        let mut fault: Option<ActuatorError> = None;

        if !interrupted {
            self.transition(DoseState::PumpRunning);
            match actuators.set_pump(true) {
                Ok(()) => interrupted = !shutdown.sleep(self.cfg.water_duration()).await,
                Err(e) => fault = Some(e),
            }
        }

        // Release leg: pump off, bleed down, valve closed. Never skipped,
        // whatever happened above. The bleed settle is a hydraulic
        // requirement, so it is a plain sleep and not cancellable.
        self.transition(DoseState::PumpStopping);
        let pump_off = actuators.set_pump(false);
        tokio::time::sleep(self.cfg.post_pump_settle()).await;
        self.transition(DoseState::ValveClosing);
        let valve_closed = actuators.set_valve(false);
        let alert_cleared = actuators.set_alert(false);
        self.transition(DoseState::Idle);

        if let Some(e) = fault {
            return Err(e);
        }
        if interrupted {
            warn!("dose interrupted — hydraulics released");
        } else {
            info!(
                water_seconds = self.cfg.water_duration_seconds,
                "dose complete"
            );
        }
        pump_off.and(valve_closed).and(alert_cleared)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
