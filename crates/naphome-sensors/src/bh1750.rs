//! BH1750 ambient light.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::error::{Result, SensorError};
use crate::reading::{Fallback, Reading};
use crate::synthetic;

/// ADDR pin low.
pub const DEFAULT_ADDRESS: u8 = 0x23;
/// ADDR pin high.
pub const ALT_ADDRESS: u8 = 0x5C;

const CMD_POWER_DOWN: u8 = 0x00;
const CMD_POWER_ON: u8 = 0x01;
const CMD_RESET: u8 = 0x07;
const CMD_CONTINUOUS_HIGH_RES: u8 = 0x10;
const MEASURE_DELAY_MS: u32 = 120;

pub struct Bh1750<B, D> {
    bus: B,
    delay: D,
    address: u8,
    fallback: Fallback,
}

impl<B: I2c, D: DelayNs> Bh1750<B, D> {
    pub fn init(mut bus: B, address: u8, mut delay: D) -> Self {
        let probe = power_up(&mut bus, &mut delay, address);
        Self {
            bus,
            delay,
            address,
            fallback: Fallback::from_probe("bh1750", address, probe),
        }
    }

    pub fn hardware_present(&self) -> bool {
        self.fallback.hardware_present()
    }

    /// Illuminance in lux.
    pub fn read(&mut self) -> Reading<f32> {
        let Self {
            bus,
            delay,
            address,
            fallback,
        } = self;
        fallback.resolve(|| measure(bus, delay, *address), synthetic::lux)
    }

    /// Power the part down and hand the bus back.
    pub fn deinit(mut self) -> B {
        if self.fallback.hardware_present() {
            if let Err(e) = send(&mut self.bus, self.address, CMD_POWER_DOWN) {
                tracing::debug!(error = %e, "bh1750 power down failed");
            }
        }
        self.bus
    }
}

fn send<B: I2c>(bus: &mut B, address: u8, command: u8) -> Result<()> {
    bus.write(address, &[command]).map_err(SensorError::bus)
}

fn power_up<B: I2c, D: DelayNs>(bus: &mut B, delay: &mut D, address: u8) -> Result<()> {
    send(bus, address, CMD_POWER_ON)?;
    delay.delay_ms(10);
    send(bus, address, CMD_RESET)?;
    delay.delay_ms(10);
    send(bus, address, CMD_CONTINUOUS_HIGH_RES)
}

fn measure<B: I2c, D: DelayNs>(bus: &mut B, delay: &mut D, address: u8) -> Result<f32> {
    delay.delay_ms(MEASURE_DELAY_MS);
    let mut raw = [0u8; 2];
    bus.read(address, &mut raw).map_err(SensorError::bus)?;
    Ok(u16::from_be_bytes(raw) as f32 / 1.2)
}
