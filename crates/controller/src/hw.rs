//! Raspberry Pi peripherals: BH1750 lux sensor and PCF8591 ADC on the I2C
//! bus, DHT22 climate probe and relay board on GPIO. Compiled only with
//! the `gpio` feature.

use anyhow::{Context, Result};
use rppal::gpio::{Gpio, InputPin, IoPin, Level, Mode, OutputPin};
use rppal::i2c::I2c;
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;

use crate::config::HardwareConfig;
use crate::error::{ActuatorError, SensorError};
use crate::ports::{ActuatorPort, AmbientReading, SensorPort};

// ── BH1750 ──────────────────────────────────────────────────────────────────

const BH1750_ADDR: u16 = 0x23;
/// One-time H-resolution measurement; the sensor powers down afterwards.
const BH1750_ONE_TIME_HIRES: u8 = 0x20;
/// Worst-case conversion time in H-resolution mode is 180 ms.
const BH1750_CONVERSION_WAIT: Duration = Duration::from_millis(180);
/// Datasheet count-to-lux divisor at the default measurement accuracy.
const BH1750_LUX_SCALE: f32 = 1.2;

fn lux_from_raw(raw: u16) -> f32 {
    f32::from(raw) / BH1750_LUX_SCALE
}

// ── PCF8591 ─────────────────────────────────────────────────────────────────

const PCF8591_ADDR: u16 = 0x48;
/// Control byte: analogue output disabled, four single-ended inputs; OR in
/// the channel number.
const PCF8591_CTRL_BASE: u8 = 0x40;

/// Corrosion guard: the probe is powered just long enough to read.
const PROBE_SETTLE: Duration = Duration::from_millis(200);

fn pcf8591_control(channel: u8) -> u8 {
    PCF8591_CTRL_BASE | (channel & 0x03)
}

// ── DHT22 ───────────────────────────────────────────────────────────────────

/// High pulses longer than this are ones (zeros run ~26 µs, ones ~70 µs).
const DHT_BIT_THRESHOLD: Duration = Duration::from_micros(50);
const DHT_PULSE_TIMEOUT: Duration = Duration::from_millis(1);
/// Host start signal: hold the line low at least 1 ms.
const DHT_START_HOLD: Duration = Duration::from_micros(1200);

/// Decode a 40-bit DHT22 frame: humidity ×10, temperature ×10 (sign in the
/// top bit), checksum over the first four bytes.
fn decode_dht_frame(bytes: [u8; 5]) -> Result<AmbientReading, SensorError> {
    let sum = bytes[..4].iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    if sum != bytes[4] {
        return Err(SensorError::InvalidData {
            sensor: "dht22",
            reason: format!("checksum mismatch: {sum:#04x} != {:#04x}", bytes[4]),
        });
    }

    let humidity_pct = f32::from(u16::from_be_bytes([bytes[0], bytes[1]])) / 10.0;
    let magnitude = f32::from(u16::from_be_bytes([bytes[2] & 0x7f, bytes[3]])) / 10.0;
    let temp_c = if bytes[2] & 0x80 != 0 {
        -magnitude
    } else {
        magnitude
    };

    if humidity_pct > 100.0 {
        return Err(SensorError::InvalidData {
            sensor: "dht22",
            reason: format!("humidity {humidity_pct}% out of range"),
        });
    }

    Ok(AmbientReading {
        temp_c,
        humidity_pct,
    })
}

/// Busy-wait until the line reaches `level`, returning how long it took.
/// Userspace timing is jittery; the checksum catches misread frames.
fn wait_for(pin: &IoPin, level: Level, timeout: Duration) -> Result<Duration, SensorError> {
    let start = Instant::now();
    while pin.read() != level {
        if start.elapsed() > timeout {
            return Err(SensorError::ReadFailed {
                sensor: "dht22",
                reason: format!("timed out waiting for {level:?} edge"),
            });
        }
    }
    Ok(start.elapsed())
}

fn read_dht_frame(pin: &mut IoPin) -> Result<[u8; 5], SensorError> {
    // Host start: hold low, then release; the module's pull-up raises the
    // line and the sensor answers with an 80 µs low / 80 µs high preamble.
    pin.set_mode(Mode::Output);
    pin.set_low();
    thread::sleep(DHT_START_HOLD);
    pin.set_mode(Mode::Input);

    wait_for(pin, Level::Low, Duration::from_millis(2))?;
    wait_for(pin, Level::High, DHT_PULSE_TIMEOUT)?;
    wait_for(pin, Level::Low, DHT_PULSE_TIMEOUT)?;

    let mut bytes = [0u8; 5];
    for i in 0..40 {
        wait_for(pin, Level::High, DHT_PULSE_TIMEOUT)?;
        let high = wait_for(pin, Level::Low, DHT_PULSE_TIMEOUT)?;
        if high > DHT_BIT_THRESHOLD {
            bytes[i / 8] |= 1 << (7 - i % 8);
        }
    }
    Ok(bytes)
}

// ── Sensor port ─────────────────────────────────────────────────────────────

pub struct GpioSensors {
    i2c: I2c,
    dht_pin: IoPin,
    probe_power: OutputPin,
    button: InputPin,
    adc_control: u8,
}

impl GpioSensors {
    pub fn new(hw: &HardwareConfig) -> Result<Self> {
        let gpio = Gpio::new().context("failed to open GPIO")?;

        let mut probe_power = gpio
            .get(hw.sensor_power_pin)
            .context("probe power pin unavailable")?
            .into_output();
        probe_power.set_low();

        let button = gpio
            .get(hw.button_pin)
            .context("emergency button pin unavailable")?
            .into_input_pullup();

        let dht_pin = gpio
            .get(hw.dht_pin)
            .context("dht22 pin unavailable")?
            .into_io(Mode::Input);

        let i2c = I2c::new().context("failed to open I2C bus")?;

        info!(
            adc_channel = hw.adc_channel,
            button_pin = hw.button_pin,
            dht_pin = hw.dht_pin,
            "sensors initialised"
        );

        Ok(Self {
            i2c,
            dht_pin,
            probe_power,
            button,
            adc_control: pcf8591_control(hw.adc_channel),
        })
    }

    fn read_adc(&mut self) -> Result<u16, SensorError> {
        let fail = |reason: rppal::i2c::Error| SensorError::ReadFailed {
            sensor: "pcf8591",
            reason: reason.to_string(),
        };

        self.i2c.set_slave_address(PCF8591_ADDR).map_err(fail)?;
        self.i2c.write(&[self.adc_control]).map_err(fail)?;
        // The first byte returned is the previous conversion.
        let mut buf = [0u8; 2];
        self.i2c.read(&mut buf).map_err(fail)?;
        Ok(u16::from(buf[1]))
    }
}

impl SensorPort for GpioSensors {
    fn read_light_lux(&mut self) -> Result<f32, SensorError> {
        let fail = |reason: rppal::i2c::Error| SensorError::ReadFailed {
            sensor: "bh1750",
            reason: reason.to_string(),
        };

        self.i2c.set_slave_address(BH1750_ADDR).map_err(fail)?;
        self.i2c.write(&[BH1750_ONE_TIME_HIRES]).map_err(fail)?;
        thread::sleep(BH1750_CONVERSION_WAIT);
        let mut buf = [0u8; 2];
        self.i2c.read(&mut buf).map_err(fail)?;
        Ok(lux_from_raw(u16::from_be_bytes(buf)))
    }

    fn read_soil_raw(&mut self) -> Result<u16, SensorError> {
        self.probe_power.set_high();
        thread::sleep(PROBE_SETTLE);
        let result = self.read_adc();
        // Depower the probe whether or not the read worked.
        self.probe_power.set_low();
        result
    }

    fn read_ambient(&mut self) -> Result<AmbientReading, SensorError> {
        read_dht_frame(&mut self.dht_pin).and_then(decode_dht_frame)
    }

    fn emergency_pressed(&mut self) -> bool {
        // Pulled up; the button shorts to ground.
        self.button.is_low()
    }
}

// ── Actuator port ───────────────────────────────────────────────────────────

pub struct GpioActuators {
    light: OutputPin,
    valve: OutputPin,
    pump: OutputPin,
    alert: OutputPin,
    relay_active_low: bool,
}

fn drive(pin: &mut OutputPin, on: bool, active_low: bool) {
    if active_low {
        if on {
            pin.set_low();
        } else {
            pin.set_high();
        }
    } else if on {
        pin.set_high();
    } else {
        pin.set_low();
    }
}

impl GpioActuators {
    pub fn new(hw: &HardwareConfig) -> Result<Self> {
        let gpio = Gpio::new().context("failed to open GPIO")?;
        let take = |pin: u8, what: &'static str| {
            gpio.get(pin)
                .with_context(|| format!("{what} pin {pin} unavailable"))
                .map(rppal::gpio::Pin::into_output)
        };

        let mut bank = Self {
            light: take(hw.light_pin, "light relay")?,
            valve: take(hw.valve_pin, "valve relay")?,
            pump: take(hw.pump_pin, "pump relay")?,
            alert: take(hw.alert_pin, "alert LED")?,
            relay_active_low: hw.relay_active_low,
        };

        // Fail-safe posture before anything else runs.
        bank.all_off()?;

        info!(
            light_pin = hw.light_pin,
            valve_pin = hw.valve_pin,
            pump_pin = hw.pump_pin,
            alert_pin = hw.alert_pin,
            relay_active_low = hw.relay_active_low,
            "relay bank initialised, all outputs off"
        );
        Ok(bank)
    }
}

impl ActuatorPort for GpioActuators {
    fn set_light(&mut self, on: bool) -> Result<(), ActuatorError> {
        drive(&mut self.light, on, self.relay_active_low);
        Ok(())
    }

    fn set_valve(&mut self, on: bool) -> Result<(), ActuatorError> {
        drive(&mut self.valve, on, self.relay_active_low);
        Ok(())
    }

    fn set_pump(&mut self, on: bool) -> Result<(), ActuatorError> {
        drive(&mut self.pump, on, self.relay_active_low);
        Ok(())
    }

    fn set_alert(&mut self, on: bool) -> Result<(), ActuatorError> {
        // The status LED is wired active-high regardless of the relay board.
        drive(&mut self.alert, on, false);
        Ok(())
    }
}

// ===========================================================================
// Tests
// ===========================================================================
