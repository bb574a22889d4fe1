//! Supplemental-light decision: natural light against a day schedule.
//!
//! The lux sensor cannot tell sunlight from the fixture's own output, so
//! the control cycle measures with the fixture forced off and feeds that
//! natural-light value here. Deciding on anything else would let the
//! fixture's glow suppress the fixture on the next cycle.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Daily window in which supplemental light may run. Hours in
/// `[day_start_hour, day_end_hour)` count as daytime; overnight windows
/// (start after end) are not supported and are rejected at config load.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LightSchedule {
    pub day_start_hour: u32,
    pub day_end_hour: u32,
    pub lux_threshold: f32,
}

/// Outcome of a lighting decision, as recorded in telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LightState {
    /// Daytime, natural light below the threshold: fixture on.
    On,
    /// Daytime, enough sun: fixture off.
    OffSun,
    /// Outside the scheduled window: fixture off.
    OffNight,
}

impl LightState {
    /// Whether the fixture relay should be energised.
    pub fn fixture_on(self) -> bool {
        matches!(self, LightState::On)
    }
}

impl fmt::Display for LightState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LightState::On => write!(f, "ON"),
            LightState::OffSun => write!(f, "OFF (Sun)"),
            LightState::OffNight => write!(f, "OFF (Night)"),
        }
    }
}

impl LightSchedule {
    /// Decide the fixture state from the natural-light measurement and the
    /// hour of day.
    pub fn decide(&self, natural_lux: f32, hour: u32) -> LightState {
        if hour < self.day_start_hour || hour >= self.day_end_hour {
            LightState::OffNight
        } else if natural_lux < self.lux_threshold {
            LightState::On
        } else {
            LightState::OffSun
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn thesis_schedule() -> LightSchedule {
        LightSchedule {
            day_start_hour: 8,
            day_end_hour: 17,
            lux_threshold: 500.0,
        }
    }

    // -- Night ------------------------------------------------------------

    #[test]
    fn night_hours_stay_off_regardless_of_lux() {
        let schedule = thesis_schedule();
        for hour in (0..8).chain(17..24) {
            assert_eq!(schedule.decide(0.0, hour), LightState::OffNight);
            assert_eq!(schedule.decide(10_000.0, hour), LightState::OffNight);
        }
    }

    #[test]
    fn day_end_hour_is_exclusive() {
        assert_eq!(thesis_schedule().decide(0.0, 17), LightState::OffNight);
    }

    #[test]
    fn day_start_hour_is_inclusive() {
        assert_eq!(thesis_schedule().decide(0.0, 8), LightState::On);
    }

    // -- Daytime ----------------------------------------------------------

    #[test]
    fn dim_morning_turns_fixture_on() {
        let state = thesis_schedule().decide(300.0, 10);
        assert_eq!(state, LightState::On);
        assert!(state.fixture_on());
    }

    #[test]
    fn bright_day_leaves_fixture_off() {
        let state = thesis_schedule().decide(600.0, 10);
        assert_eq!(state, LightState::OffSun);
        assert!(!state.fixture_on());
    }

    #[test]
    fn exact_threshold_counts_as_sun() {
        assert_eq!(thesis_schedule().decide(500.0, 10), LightState::OffSun);
    }

    // -- Labels -----------------------------------------------------------

    #[test]
    fn display_labels_match_log_sheet() {
        assert_eq!(LightState::On.to_string(), "ON");
        assert_eq!(LightState::OffSun.to_string(), "OFF (Sun)");
        assert_eq!(LightState::OffNight.to_string(), "OFF (Night)");
    }

    #[test]
    fn serialized_labels_are_stable() {
        assert_eq!(
            serde_json::to_value(LightState::OffNight).unwrap(),
            serde_json::json!("OFF_NIGHT")
        );
    }
}
