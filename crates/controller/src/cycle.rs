//! One control iteration and the fixed-rate loop around it.
//!
//! Step order within a cycle is fixed: emergency stop, lighting (measure
//! natural → decide → apply → measure total), soil moisture, irrigation,
//! ambient climate, record assembly, sinks. Irrigation runs synchronously
//! to completion — nothing else touches the actuators while a dose is in
//! flight, which is what makes the hydraulic ordering enforceable at all.

use chrono::{DateTime, Local, Timelike};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::ActuatorError;
use crate::irrigation::IrrigationSequencer;
use crate::ports::{ActuatorPort, CloudPort, PersistencePort, SensorPort};
use crate::record::TelemetryRecord;
use crate::shutdown::Shutdown;

/// Why the loop stopped cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The panic button was pressed.
    EmergencyStop,
    /// Operator interrupt (or any other shutdown trigger).
    Interrupted,
}

enum CycleOutcome {
    Completed,
    EmergencyStop,
}

pub struct ControlCycle<S, A, P, C> {
    cfg: Config,
    sensors: S,
    actuators: A,
    persistence: P,
    cloud: Option<C>,
    sequencer: IrrigationSequencer,
    shutdown: Shutdown,
}

impl<S, A, P, C> ControlCycle<S, A, P, C>
where
    S: SensorPort,
    A: ActuatorPort,
    P: PersistencePort,
    C: CloudPort,
{
    pub fn new(
        cfg: Config,
        sensors: S,
        actuators: A,
        persistence: P,
        cloud: Option<C>,
        shutdown: Shutdown,
    ) -> Self {
        let sequencer = IrrigationSequencer::new(cfg.irrigation);
        Self {
            cfg,
            sensors,
            actuators,
            persistence,
            cloud,
            sequencer,
            shutdown,
        }
    }

    /// Run until emergency stop, operator interrupt, or hardware fault.
    /// Every output is forced OFF on every exit path.
    pub async fn run(mut self) -> Result<StopReason, ActuatorError> {
        // Safe posture before the first cycle.
        self.actuators.all_off()?;

        let result = self.run_loop().await;

        // When the fault is in the relay path itself this is best-effort;
        // there is nothing more the software can do.
        if let Err(e) = self.actuators.all_off() {
            error!("failed to force outputs off during shutdown: {e}");
        } else {
            info!("all outputs off");
        }
        result
    }

    async fn run_loop(&mut self) -> Result<StopReason, ActuatorError> {
        let mut ticker = tokio::time::interval(self.cfg.controller.cycle_period());
        // The configured interval is a period: a long cycle eats into the
        // following wait instead of pushing every later cycle out.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                () = self.shutdown.signalled() => return Ok(StopReason::Interrupted),
            }

            match self.run_cycle(Local::now()).await? {
                CycleOutcome::EmergencyStop => return Ok(StopReason::EmergencyStop),
                CycleOutcome::Completed => {}
            }
        }
    }

    /// One iteration. Returns early only for the emergency stop; sensor
    /// trouble degrades fields, sink trouble is logged and skipped.
    async fn run_cycle(
        &mut self,
        now: DateTime<Local>,
    ) -> Result<CycleOutcome, ActuatorError> {
        // Emergency stop gates everything else in the cycle.
        if self.sensors.emergency_pressed() {
            warn!("emergency stop asserted");
            return Ok(CycleOutcome::EmergencyStop);
        }

        // Lighting. The fixture is forced off for the first measurement so
        // the decision sees sunlight only; deciding on the lit scene would
        // let the fixture suppress itself next cycle. The order
        // measure-natural → decide → apply → measure-total is load-bearing.
        self.actuators.set_light(false)?;
        self.shutdown.sleep(self.cfg.controller.light_settle()).await;
        let natural_lux = self.read_lux("natural");

        let light_state = self.cfg.light.decide(natural_lux, now.hour());
        self.actuators.set_light(light_state.fixture_on())?;
        self.shutdown.sleep(self.cfg.controller.light_settle()).await;
        let total_lux = self.read_lux("total");

        // Soil moisture. A failed read means "unknown", not "dry" — watering
        // a bed we cannot see could drown it.
        let soil_moisture_pct = match self.sensors.read_soil_raw() {
            Ok(raw) => Some(self.cfg.calibration.normalize(raw)),
            Err(e) => {
                warn!("soil read failed, moisture unknown this cycle: {e}");
                None
            }
        };

        // Irrigation, synchronously to completion.
        let irrigation_state = self
            .sequencer
            .tend(soil_moisture_pct, &mut self.actuators, &mut self.shutdown)
            .await?;

        // Ambient climate, best effort.
        let (ambient_temp_c, ambient_humidity_pct) = match self.sensors.read_ambient() {
            Ok(ambient) => (Some(ambient.temp_c), Some(ambient.humidity_pct)),
            Err(e) => {
                warn!("ambient read failed: {e}");
                (None, None)
            }
        };

        let record = TelemetryRecord {
            timestamp: now,
            natural_lux,
            total_lux,
            soil_moisture_pct,
            ambient_temp_c,
            ambient_humidity_pct,
            light_state,
            irrigation_state,
        };

        info!(
            natural_lux = format!("{natural_lux:.0}"),
            total_lux = format!("{total_lux:.0}"),
            soil_moisture_pct = ?soil_moisture_pct,
            ambient_temp_c = ?ambient_temp_c,
            ambient_humidity_pct = ?ambient_humidity_pct,
            light = %light_state,
            irrigation = %irrigation_state,
            "cycle complete"
        );

        // Hand off to both sinks; neither failure blocks the other.
        if let Err(e) = self.persistence.append(&record) {
            error!("telemetry log append failed: {e}");
        }
        if let Some(cloud) = &mut self.cloud {
            if let Err(e) = cloud.publish(&record).await {
                error!("cloud publish failed: {e}");
            }
        }

        Ok(CycleOutcome::Completed)
    }

    fn read_lux(&mut self, which: &'static str) -> f32 {
        match self.sensors.read_light_lux() {
            Ok(lux) => lux,
            Err(e) => {
                warn!("{which} lux read failed, assuming 0: {e}");
                0.0
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        ControllerConfig, HardwareConfig, IrrigationConfig, PersistenceConfig,
    };
    use crate::error::SensorError;
    use crate::light::{LightSchedule, LightState};
    use crate::moisture::MoistureCalibration;
    use crate::ports::doubles::{
        index_of, RecordingActuators, ScriptedSensors, VecCloud, VecPersistence,
    };
    use crate::record::IrrigationState;
    use crate::shutdown;
    use chrono::TimeZone;

    fn test_config() -> Config {
        Config {
            controller: ControllerConfig {
                cycle_seconds: 0.01,
                light_settle_seconds: 0.0,
            },
            calibration: MoistureCalibration {
                raw_dry: 160,
                raw_wet: 8,
                dry_percent: 0,
                wet_percent: 100,
            },
            light: LightSchedule {
                day_start_hour: 8,
                day_end_hour: 17,
                lux_threshold: 500.0,
            },
            irrigation: IrrigationConfig {
                dry_threshold_pct: 50,
                valve_settle_seconds: 0.0,
                water_duration_seconds: 0.0,
                post_pump_settle_seconds: 0.0,
            },
            persistence: PersistenceConfig {
                csv_path: "unused.csv".into(),
            },
            cloud: None,
            hardware: HardwareConfig::default(),
        }
    }

    struct Harness {
        cycle: ControlCycle<ScriptedSensors, RecordingActuators, VecPersistence, VecCloud>,
        commands: crate::ports::doubles::CommandLog,
        persisted: crate::ports::doubles::RecordLog,
        published: crate::ports::doubles::RecordLog,
        trigger: shutdown::Trigger,
    }

    fn harness(cfg: Config, sensors: ScriptedSensors) -> Harness {
        let (actuators, commands) = RecordingActuators::new();
        let (persistence, persisted) = VecPersistence::new();
        let (cloud, published) = VecCloud::new();
        let (trigger, shutdown) = shutdown::channel();
        Harness {
            cycle: ControlCycle::new(cfg, sensors, actuators, persistence, Some(cloud), shutdown),
            commands,
            persisted,
            published,
            trigger,
        }
    }

    fn at_hour(hour: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 6, 1, hour, 0, 0).unwrap()
    }

    // -- Lighting -----------------------------------------------------------

    #[tokio::test]
    async fn dim_day_measures_natural_then_lights_fixture() {
        let mut sensors = ScriptedSensors::default();
        sensors.lux.push_back(Ok(300.0)); // natural, fixture off
        sensors.lux.push_back(Ok(845.0)); // total, fixture on
        let mut h = harness(test_config(), sensors);

        h.cycle.run_cycle(at_hour(10)).await.unwrap();

        let record = h.persisted.lock().unwrap()[0].clone();
        assert_eq!(record.light_state, LightState::On);
        assert_eq!(record.natural_lux, 300.0);
        assert_eq!(record.total_lux, 845.0);

        // Fixture forced off before the natural measurement, on afterwards.
        let commands = h.commands.lock().unwrap();
        assert!(index_of(&commands, ("light", false)) < index_of(&commands, ("light", true)));
    }

    #[tokio::test]
    async fn bright_day_leaves_fixture_off() {
        let mut sensors = ScriptedSensors::default();
        sensors.lux.push_back(Ok(600.0));
        sensors.lux.push_back(Ok(610.0));
        let mut h = harness(test_config(), sensors);

        h.cycle.run_cycle(at_hour(10)).await.unwrap();

        let record = h.persisted.lock().unwrap()[0].clone();
        assert_eq!(record.light_state, LightState::OffSun);
        assert!(!h.commands.lock().unwrap().contains(&("light", true)));
    }

    #[tokio::test]
    async fn night_hour_keeps_fixture_off_regardless_of_lux() {
        let mut sensors = ScriptedSensors::default();
        sensors.lux.push_back(Ok(10.0));
        sensors.lux.push_back(Ok(10.0));
        let mut h = harness(test_config(), sensors);

        h.cycle.run_cycle(at_hour(20)).await.unwrap();

        let record = h.persisted.lock().unwrap()[0].clone();
        assert_eq!(record.light_state, LightState::OffNight);
        assert!(!h.commands.lock().unwrap().contains(&("light", true)));
    }

    #[tokio::test]
    async fn dead_lux_sensor_degrades_to_zero_and_lights_fixture() {
        let mut sensors = ScriptedSensors::default();
        sensors.lux.push_back(Err(SensorError::ReadFailed {
            sensor: "bh1750",
            reason: "bus timeout".into(),
        }));
        sensors.lux.push_back(Ok(500.0));
        let mut h = harness(test_config(), sensors);

        h.cycle.run_cycle(at_hour(10)).await.unwrap();

        let record = h.persisted.lock().unwrap()[0].clone();
        assert_eq!(record.natural_lux, 0.0);
        assert_eq!(record.light_state, LightState::On);
    }

    // -- Soil and irrigation --------------------------------------------------

    #[tokio::test]
    async fn dry_soil_runs_a_dose_in_order() {
        let mut sensors = ScriptedSensors::default();
        sensors.soil.push_back(Ok(150)); // normalises to 6 %
        let mut h = harness(test_config(), sensors);

        h.cycle.run_cycle(at_hour(10)).await.unwrap();

        let record = h.persisted.lock().unwrap()[0].clone();
        assert_eq!(record.soil_moisture_pct, Some(6));
        assert_eq!(record.irrigation_state, IrrigationState::Watering);

        let commands = h.commands.lock().unwrap();
        assert!(index_of(&commands, ("valve", true)) < index_of(&commands, ("pump", true)));
        assert!(index_of(&commands, ("pump", false)) < index_of(&commands, ("valve", false)));
    }

    #[tokio::test]
    async fn near_saturated_soil_reads_92_percent_and_waters_only_under_a_high_threshold() {
        // Thesis calibration end-to-end: raw 20 → 92 %. Wet for the default
        // threshold, but a 95 % threshold (germination trays) still waters.
        let mut cfg = test_config();
        cfg.irrigation.dry_threshold_pct = 95;
        let mut sensors = ScriptedSensors::default();
        sensors.soil.push_back(Ok(20));
        let mut h = harness(cfg, sensors);

        h.cycle.run_cycle(at_hour(10)).await.unwrap();

        let record = h.persisted.lock().unwrap()[0].clone();
        assert_eq!(record.soil_moisture_pct, Some(92));
        assert_eq!(record.irrigation_state, IrrigationState::Watering);
    }

    #[tokio::test]
    async fn wet_soil_stays_idle_and_asserts_outputs_off() {
        let mut sensors = ScriptedSensors::default();
        sensors.soil.push_back(Ok(30)); // normalises to 85 %
        let mut h = harness(test_config(), sensors);

        h.cycle.run_cycle(at_hour(10)).await.unwrap();

        let record = h.persisted.lock().unwrap()[0].clone();
        assert_eq!(record.soil_moisture_pct, Some(85));
        assert_eq!(record.irrigation_state, IrrigationState::Idle);

        let commands = h.commands.lock().unwrap();
        assert!(!commands.contains(&("pump", true)));
        assert!(commands.contains(&("pump", false)));
        assert!(commands.contains(&("valve", false)));
    }

    #[tokio::test]
    async fn failed_soil_read_skips_watering() {
        let mut sensors = ScriptedSensors::default();
        sensors.soil.push_back(Err(SensorError::ReadFailed {
            sensor: "pcf8591",
            reason: "bus timeout".into(),
        }));
        let mut h = harness(test_config(), sensors);

        h.cycle.run_cycle(at_hour(10)).await.unwrap();

        let record = h.persisted.lock().unwrap()[0].clone();
        assert_eq!(record.soil_moisture_pct, None);
        assert_eq!(record.irrigation_state, IrrigationState::Idle);
        assert!(!h.commands.lock().unwrap().contains(&("pump", true)));
    }

    // -- Ambient ---------------------------------------------------------------

    #[tokio::test]
    async fn failed_ambient_read_degrades_to_unknown() {
        let mut sensors = ScriptedSensors::default();
        sensors.ambient.push_back(Err(SensorError::ReadFailed {
            sensor: "dht22",
            reason: "no response to start signal".into(),
        }));
        let mut h = harness(test_config(), sensors);

        h.cycle.run_cycle(at_hour(10)).await.unwrap();

        let record = h.persisted.lock().unwrap()[0].clone();
        assert_eq!(record.ambient_temp_c, None);
        assert_eq!(record.ambient_humidity_pct, None);
        assert_eq!(record.irrigation_state, IrrigationState::Idle);
    }

    // -- Sinks ------------------------------------------------------------------

    #[tokio::test]
    async fn both_sinks_receive_the_same_record() {
        let mut h = harness(test_config(), ScriptedSensors::default());

        h.cycle.run_cycle(at_hour(10)).await.unwrap();

        assert_eq!(h.persisted.lock().unwrap().len(), 1);
        assert_eq!(h.published.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn persistence_failure_does_not_block_cloud() {
        let mut h = harness(test_config(), ScriptedSensors::default());
        h.cycle.persistence.fail = true;

        h.cycle.run_cycle(at_hour(10)).await.unwrap();

        assert!(h.persisted.lock().unwrap().is_empty());
        assert_eq!(h.published.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cloud_failure_does_not_block_persistence() {
        let mut h = harness(test_config(), ScriptedSensors::default());
        h.cycle.cloud.as_mut().unwrap().fail = true;

        h.cycle.run_cycle(at_hour(10)).await.unwrap();

        assert_eq!(h.persisted.lock().unwrap().len(), 1);
        assert!(h.published.lock().unwrap().is_empty());
    }

    // -- Emergency stop and shutdown ---------------------------------------------

    #[tokio::test]
    async fn emergency_stop_short_circuits_the_cycle() {
        let mut sensors = ScriptedSensors::default();
        sensors.emergency.push_back(true);
        let mut h = harness(test_config(), sensors);

        let outcome = h.cycle.run_cycle(at_hour(10)).await.unwrap();

        assert!(matches!(outcome, CycleOutcome::EmergencyStop));
        assert!(h.commands.lock().unwrap().is_empty());
        assert!(h.persisted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn run_exits_on_emergency_with_everything_off() {
        let mut sensors = ScriptedSensors::default();
        sensors.emergency.push_back(true);
        let h = harness(test_config(), sensors);
        let commands = h.commands.clone();

        let stop = h.cycle.run().await.unwrap();

        assert_eq!(stop, StopReason::EmergencyStop);
        // Initial safe posture plus the forced-off on exit.
        let commands = commands.lock().unwrap();
        let tail = &commands[commands.len() - 4..];
        assert_eq!(
            tail,
            [
                ("pump", false),
                ("valve", false),
                ("light", false),
                ("alert", false)
            ]
        );
    }

    #[tokio::test]
    async fn run_exits_on_operator_interrupt() {
        let h = harness(test_config(), ScriptedSensors::default());
        h.trigger.trigger();

        let stop = h.cycle.run().await.unwrap();
        assert_eq!(stop, StopReason::Interrupted);
    }

    #[tokio::test]
    async fn mid_water_interrupt_still_releases_and_stops() {
        let mut cfg = test_config();
        cfg.irrigation.water_duration_seconds = 30.0;
        let mut sensors = ScriptedSensors::default();
        sensors.soil.push_back(Ok(150)); // dry → dose starts
        let h = harness(cfg, sensors);
        let commands = h.commands.clone();
        let trigger = h.trigger.clone();

        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            trigger.trigger();
        });

        let start = std::time::Instant::now();
        let stop = h.cycle.run().await.unwrap();

        assert_eq!(stop, StopReason::Interrupted);
        assert!(start.elapsed() < std::time::Duration::from_secs(10));

        // Within the dose itself: pump stopped before the valve closed.
        let commands = commands.lock().unwrap();
        let pump_on = index_of(&commands, ("pump", true));
        let release = &commands[pump_on..];
        assert!(index_of(release, ("pump", false)) < index_of(release, ("valve", false)));
    }

    #[tokio::test]
    async fn actuator_fault_is_fatal_and_safe_posture_is_attempted() {
        let mut sensors = ScriptedSensors::default();
        sensors.soil.push_back(Ok(150)); // dry → dose starts
        let mut h = harness(test_config(), sensors);
        h.cycle.actuators.fail_on = Some(("pump", true));

        let err = h.cycle.run().await.unwrap_err();
        assert_eq!(err.output, "pump");

        // Release inside the dose plus the final forced-off both ran.
        let commands = h.commands.lock().unwrap();
        assert!(index_of(&commands, ("pump", false)) < index_of(&commands, ("valve", false)));
        assert_eq!(*commands.last().unwrap(), ("alert", false));
    }
}
