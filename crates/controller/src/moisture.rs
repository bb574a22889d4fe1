//! Soil-moisture normalisation: raw ADC counts to a wetness percentage.

use serde::Deserialize;

/// Two-point linear calibration for a capacitive soil probe.
///
/// `raw_dry` is the ADC count with the probe in open air, `raw_wet` the
/// count in water. Capacitive probes read *lower* when wet, so
/// `raw_wet < raw_dry` is the common case; the maths works either way
/// round. `raw_dry != raw_wet` is enforced at config-load time — the
/// division below relies on it.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct MoistureCalibration {
    pub raw_dry: i32,
    pub raw_wet: i32,
    #[serde(default)]
    pub dry_percent: i32,
    #[serde(default = "default_wet_percent")]
    pub wet_percent: i32,
}

fn default_wet_percent() -> i32 {
    100
}

impl MoistureCalibration {
    /// Map a raw ADC count onto `[dry_percent, wet_percent]`, clamped to
    /// `[0, 100]`. Pure; sensor power-gating around the read belongs to
    /// the sensor port.
    pub fn normalize(&self, raw: u16) -> u8 {
        let span = self.wet_percent - self.dry_percent;
        let pct =
            (i32::from(raw) - self.raw_dry) * span / (self.raw_wet - self.raw_dry)
                + self.dry_percent;
        pct.clamp(0, 100) as u8
    }
}

// ===========================================================================
// Tests
// ===========================================================================
