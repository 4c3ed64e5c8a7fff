//! SCD30 CO2 / temperature / humidity (NDIR).
//!
//! Measurements arrive as three big-endian IEEE-754 floats, each split into two
//! CRC-protected words. The part only refreshes every couple of seconds; a poll
//! between refreshes is "not ready", which is not a failure. Until the first
//! measurement lands such a poll yields an invalid reading.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::bus::{read_words, write_command, write_command_with_arg};
use crate::error::{Result, SensorError};
use crate::reading::{Fallback, Reading};
use crate::synthetic;

pub const DEFAULT_ADDRESS: u8 = 0x61;

const CMD_FIRMWARE_VERSION: u16 = 0xD100;
const CMD_START_CONTINUOUS: u16 = 0x0010;
const CMD_STOP_CONTINUOUS: u16 = 0x0104;
const CMD_DATA_READY: u16 = 0x0202;
const CMD_READ_MEASUREMENT: u16 = 0x0300;
/// Ambient pressure compensation argument for continuous mode.
const START_ARGUMENT: u16 = 0x0002;
const COMMAND_DELAY_MS: u32 = 10;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Co2 {
    pub co2_ppm: f32,
    pub temperature_c: f32,
    pub humidity_rh: f32,
}

pub struct Scd30<B, D> {
    bus: B,
    delay: D,
    address: u8,
    firmware: Option<(u8, u8)>,
    last: Option<Co2>,
    fallback: Fallback,
}

impl<B: I2c, D: DelayNs> Scd30<B, D> {
    pub fn init(mut bus: B, address: u8, mut delay: D) -> Self {
        let probe = probe(&mut bus, &mut delay, address);
        let firmware = probe.as_ref().ok().copied();
        Self {
            bus,
            delay,
            address,
            firmware,
            last: None,
            fallback: Fallback::from_probe("scd30", address, probe.map(|_| ())),
        }
    }

    pub fn hardware_present(&self) -> bool {
        self.fallback.hardware_present()
    }

    /// `(major, minor)` firmware version read during the probe.
    pub fn firmware(&self) -> Option<(u8, u8)> {
        self.firmware
    }

    pub fn read(&mut self) -> Reading<Co2> {
        if self.fallback.hardware_present() {
            match measure(&mut self.bus, &mut self.delay, self.address) {
                Ok(value) => {
                    self.last = Some(value);
                    return Reading::hardware(value);
                }
                Err(SensorError::NotReady) => {
                    return match self.last {
                        Some(value) => Reading::hardware(value),
                        None => Reading::not_ready(synthetic_co2(self.fallback.tick())),
                    };
                }
                Err(e) => self.fallback.demote(&e),
            }
        }
        Reading::synthetic(synthetic_co2(self.fallback.tick()))
    }

    /// Stop continuous measurement and hand the bus back.
    pub fn deinit(mut self) -> B {
        if self.fallback.hardware_present() {
            if let Err(e) = write_command(&mut self.bus, self.address, CMD_STOP_CONTINUOUS) {
                tracing::debug!(error = %e, "scd30 stop failed");
            }
        }
        self.bus
    }
}

fn synthetic_co2(t: f32) -> Co2 {
    Co2 {
        co2_ppm: synthetic::co2_ppm(t),
        temperature_c: synthetic::temperature(t),
        humidity_rh: synthetic::humidity(t),
    }
}

fn probe<B: I2c, D: DelayNs>(bus: &mut B, delay: &mut D, address: u8) -> Result<(u8, u8)> {
    write_command(bus, address, CMD_FIRMWARE_VERSION)?;
    delay.delay_ms(COMMAND_DELAY_MS);
    let mut version = [0u16; 1];
    read_words(bus, address, &mut version)?;
    write_command_with_arg(bus, address, CMD_START_CONTINUOUS, START_ARGUMENT)?;
    let [major, minor] = version[0].to_be_bytes();
    Ok((major, minor))
}

fn measure<B: I2c, D: DelayNs>(bus: &mut B, delay: &mut D, address: u8) -> Result<Co2> {
    write_command(bus, address, CMD_DATA_READY)?;
    delay.delay_ms(COMMAND_DELAY_MS);
    let mut ready = [0u16; 1];
    read_words(bus, address, &mut ready)?;
    if ready[0] == 0 {
        return Err(SensorError::NotReady);
    }

    write_command(bus, address, CMD_READ_MEASUREMENT)?;
    delay.delay_ms(COMMAND_DELAY_MS);
    let mut words = [0u16; 6];
    read_words(bus, address, &mut words)?;
    let float = |hi: u16, lo: u16| f32::from_bits(((hi as u32) << 16) | lo as u32);
    Ok(Co2 {
        co2_ppm: float(words[0], words[1]),
        temperature_c: float(words[2], words[3]),
        humidity_rh: float(words[4], words[5]),
    })
}
