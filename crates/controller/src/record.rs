//! Per-cycle telemetry snapshot handed to the persistence and cloud sinks.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;

use crate::light::LightState;

/// Whether a watering dose ran during the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IrrigationState {
    Idle,
    Watering,
}

impl fmt::Display for IrrigationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrrigationState::Idle => write!(f, "IDLE"),
            IrrigationState::Watering => write!(f, "WATERING"),
        }
    }
}

/// One cycle's measurements and decisions. Assembled once per iteration,
/// never mutated afterwards; both sinks receive the same snapshot.
///
/// Fields that degraded this cycle (failed soil or climate read) are
/// `None` rather than a fake zero, so downstream analysis can tell "dry"
/// from "sensor fault".
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryRecord {
    pub timestamp: DateTime<Local>,
    pub natural_lux: f32,
    pub total_lux: f32,
    pub soil_moisture_pct: Option<u8>,
    pub ambient_temp_c: Option<f32>,
    pub ambient_humidity_pct: Option<f32>,
    pub light_state: LightState,
    pub irrigation_state: IrrigationState,
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> TelemetryRecord {
        TelemetryRecord {
            timestamp: Local::now(),
            natural_lux: 312.0,
            total_lux: 845.0,
            soil_moisture_pct: Some(42),
            ambient_temp_c: Some(21.5),
            ambient_humidity_pct: Some(60.0),
            light_state: LightState::On,
            irrigation_state: IrrigationState::Watering,
        }
    }

    #[test]
    fn serializes_with_stable_field_names() {
        let json = serde_json::to_value(sample_record()).unwrap();
        let obj = json.as_object().unwrap();

        assert_eq!(obj.len(), 8);
        assert_eq!(json["natural_lux"], 312.0);
        assert_eq!(json["soil_moisture_pct"], 42);
        assert_eq!(json["light_state"], "ON");
        assert_eq!(json["irrigation_state"], "WATERING");
    }

    #[test]
    fn degraded_fields_serialize_as_null() {
        let mut record = sample_record();
        record.soil_moisture_pct = None;
        record.ambient_temp_c = None;

        let json = serde_json::to_value(record).unwrap();
        assert!(json["soil_moisture_pct"].is_null());
        assert!(json["ambient_temp_c"].is_null());
    }

    #[test]
    fn irrigation_labels_match_log_sheet() {
        assert_eq!(IrrigationState::Idle.to_string(), "IDLE");
        assert_eq!(IrrigationState::Watering.to_string(), "WATERING");
    }
}
