//! TOML configuration loading and validation.
//!
//! The whole runtime configuration is read once at startup into an
//! immutable `Config` handed to the control loop; nothing is re-read or
//! mutated afterwards. Validation reports every violation at once rather
//! than stopping at the first.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::light::LightSchedule;
use crate::moisture::MoistureCalibration;

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub controller: ControllerConfig,
    pub calibration: MoistureCalibration,
    pub light: LightSchedule,
    pub irrigation: IrrigationConfig,
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub cloud: Option<CloudConfig>,
    #[serde(default)]
    pub hardware: HardwareConfig,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ControllerConfig {
    /// Control loop period in seconds. The loop runs at a fixed rate: time
    /// spent measuring and watering counts against the period.
    pub cycle_seconds: f64,
    /// Hold around each lux measurement so the sensor sees the scene
    /// without, then with, the fixture.
    #[serde(default = "default_light_settle")]
    pub light_settle_seconds: f64,
}

impl ControllerConfig {
    pub fn cycle_period(&self) -> Duration {
        Duration::from_secs_f64(self.cycle_seconds)
    }

    pub fn light_settle(&self) -> Duration {
        Duration::from_secs_f64(self.light_settle_seconds)
    }
}

fn default_light_settle() -> f64 {
    1.0
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct IrrigationConfig {
    /// Soil wetness below which a dose is started.
    pub dry_threshold_pct: u8,
    /// Hold between valve open and pump start.
    pub valve_settle_seconds: f64,
    /// Pump run time per dose.
    pub water_duration_seconds: f64,
    /// Pressure-bleed hold between pump stop and valve close.
    pub post_pump_settle_seconds: f64,
}

impl IrrigationConfig {
    pub fn valve_settle(&self) -> Duration {
        Duration::from_secs_f64(self.valve_settle_seconds)
    }

    pub fn water_duration(&self) -> Duration {
        Duration::from_secs_f64(self.water_duration_seconds)
    }

    pub fn post_pump_settle(&self) -> Duration {
        Duration::from_secs_f64(self.post_pump_settle_seconds)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    /// Append-only CSV telemetry log.
    pub csv_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CloudConfig {
    pub url: String,
    pub api_key: String,
    #[serde(default = "default_cloud_timeout")]
    pub timeout_seconds: f64,
}

fn default_cloud_timeout() -> f64 {
    5.0
}

/// Wiring of the controller board. Defaults match the thesis rig.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    pub pump_pin: u8,
    pub valve_pin: u8,
    pub light_pin: u8,
    pub alert_pin: u8,
    /// Powers the moisture probe only during its read window.
    pub sensor_power_pin: u8,
    /// Emergency-stop input, pulled up; pressed reads low.
    pub button_pin: u8,
    pub dht_pin: u8,
    /// PCF8591 input the soil probe is wired to.
    pub adc_channel: u8,
    /// Relay boards are commonly active-low; the alert LED is not.
    pub relay_active_low: bool,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            pump_pin: 23,
            valve_pin: 16,
            light_pin: 26,
            alert_pin: 24,
            sensor_power_pin: 27,
            button_pin: 21,
            dht_pin: 5,
            adc_channel: 3,
            relay_active_low: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// BCM GPIO pins available on the Raspberry Pi 40-pin header for general
/// use. GPIO 0-1 are reserved for the ID EEPROM and must never be used.
const VALID_GPIO_PINS: &[u8] = &[
    2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27,
];

/// The PCF8591 is an 8-bit converter.
const ADC_RAW_MAX: i32 = 255;
const ADC_CHANNEL_MAX: u8 = 3;

impl Config {
    /// Validate all sections. Returns `Ok(())` or a `ConfigError` listing
    /// every violation found, not just the first one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        self.validate_controller(&mut errors);
        self.validate_calibration(&mut errors);
        self.validate_light(&mut errors);
        self.validate_irrigation(&mut errors);
        self.validate_cloud(&mut errors);
        self.validate_hardware(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid {
                details: errors.join("\n  - "),
            })
        }
    }

    fn validate_controller(&self, errors: &mut Vec<String>) {
        let c = &self.controller;
        if c.cycle_seconds <= 0.0 || !c.cycle_seconds.is_finite() {
            errors.push(format!(
                "controller: cycle_seconds must be positive, got {}",
                c.cycle_seconds
            ));
        }
        if c.light_settle_seconds < 0.0 || !c.light_settle_seconds.is_finite() {
            errors.push(format!(
                "controller: light_settle_seconds must be non-negative, got {}",
                c.light_settle_seconds
            ));
        }
    }

    fn validate_calibration(&self, errors: &mut Vec<String>) {
        let cal = &self.calibration;
        for (name, raw) in [("raw_dry", cal.raw_dry), ("raw_wet", cal.raw_wet)] {
            if raw < 0 || raw > ADC_RAW_MAX {
                errors.push(format!(
                    "calibration: {name} {raw} out of ADC range [0, {ADC_RAW_MAX}]"
                ));
            }
        }
        if cal.raw_dry == cal.raw_wet {
            errors.push(format!(
                "calibration: raw_dry and raw_wet are both {} — calibration range is zero",
                cal.raw_dry
            ));
        }
        for (name, pct) in [
            ("dry_percent", cal.dry_percent),
            ("wet_percent", cal.wet_percent),
        ] {
            if !(0..=100).contains(&pct) {
                errors.push(format!(
                    "calibration: {name} {pct} out of range [0, 100]"
                ));
            }
        }
    }

    fn validate_light(&self, errors: &mut Vec<String>) {
        let l = &self.light;
        for (name, hour) in [
            ("day_start_hour", l.day_start_hour),
            ("day_end_hour", l.day_end_hour),
        ] {
            if hour > 23 {
                errors.push(format!("light: {name} {hour} out of range [0, 23]"));
            }
        }
        if l.day_start_hour >= l.day_end_hour {
            errors.push(format!(
                "light: day_start_hour ({}) must be before day_end_hour ({}) — overnight schedules are not supported",
                l.day_start_hour, l.day_end_hour
            ));
        }
        if l.lux_threshold < 0.0 || !l.lux_threshold.is_finite() {
            errors.push(format!(
                "light: lux_threshold must be non-negative, got {}",
                l.lux_threshold
            ));
        }
    }

    fn validate_irrigation(&self, errors: &mut Vec<String>) {
        let irr = &self.irrigation;
        if irr.dry_threshold_pct > 100 {
            errors.push(format!(
                "irrigation: dry_threshold_pct {} out of range [0, 100]",
                irr.dry_threshold_pct
            ));
        }
        for (name, secs) in [
            ("valve_settle_seconds", irr.valve_settle_seconds),
            ("water_duration_seconds", irr.water_duration_seconds),
            ("post_pump_settle_seconds", irr.post_pump_settle_seconds),
        ] {
            if secs < 0.0 || !secs.is_finite() {
                errors.push(format!(
                    "irrigation: {name} must be non-negative, got {secs}"
                ));
            }
        }
    }

    fn validate_cloud(&self, errors: &mut Vec<String>) {
        let Some(cloud) = &self.cloud else { return };
        if cloud.url.trim().is_empty() {
            errors.push("cloud: url is empty".to_string());
        }
        if cloud.api_key.trim().is_empty() {
            errors.push("cloud: api_key is empty".to_string());
        }
        if cloud.timeout_seconds <= 0.0 || !cloud.timeout_seconds.is_finite() {
            errors.push(format!(
                "cloud: timeout_seconds must be positive, got {}",
                cloud.timeout_seconds
            ));
        }
    }

    fn validate_hardware(&self, errors: &mut Vec<String>) {
        let hw = &self.hardware;
        let pins = [
            ("pump_pin", hw.pump_pin),
            ("valve_pin", hw.valve_pin),
            ("light_pin", hw.light_pin),
            ("alert_pin", hw.alert_pin),
            ("sensor_power_pin", hw.sensor_power_pin),
            ("button_pin", hw.button_pin),
            ("dht_pin", hw.dht_pin),
        ];

        let mut seen: Vec<u8> = Vec::new();
        for (name, pin) in pins {
            if !VALID_GPIO_PINS.contains(&pin) {
                errors.push(format!(
                    "hardware: {name} {pin} is not a usable BCM GPIO pin (allowed: 2-27)"
                ));
            } else if seen.contains(&pin) {
                errors.push(format!(
                    "hardware: {name} {pin} is already assigned to another output"
                ));
            } else {
                seen.push(pin);
            }
        }

        if hw.adc_channel > ADC_CHANNEL_MAX {
            errors.push(format!(
                "hardware: adc_channel {} exceeds maximum ({ADC_CHANNEL_MAX})",
                hw.adc_channel
            ));
        }
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Read, parse, and validate a TOML config file.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    let config: Config = toml::from_str(&contents).map_err(|source| ConfigError::ParseToml {
        path: path.to_path_buf(),
        source: Box::new(source),
    })?;
    config.validate()?;
    Ok(config)
}

// ===========================================================================
// Tests
// ===========================================================================
