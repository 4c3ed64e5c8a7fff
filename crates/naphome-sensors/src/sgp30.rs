//! SGP30 TVOC / eCO2.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::bus::{read_words, write_command};
use crate::error::Result;
use crate::reading::{Fallback, Reading};
use crate::synthetic;

pub const DEFAULT_ADDRESS: u8 = 0x58;

const CMD_GET_SERIAL_ID: u16 = 0x3682;
const CMD_INIT_AIR_QUALITY: u16 = 0x2003;
const CMD_MEASURE_AIR_QUALITY: u16 = 0x2008;
const MEASURE_DELAY_MS: u32 = 12;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AirQuality {
    pub tvoc_ppb: u16,
    pub eco2_ppm: u16,
}

pub struct Sgp30<B, D> {
    bus: B,
    delay: D,
    address: u8,
    serial: Option<u64>,
    fallback: Fallback,
}

impl<B: I2c, D: DelayNs> Sgp30<B, D> {
    pub fn init(mut bus: B, address: u8, mut delay: D) -> Self {
        let probe = probe(&mut bus, &mut delay, address);
        let serial = probe.as_ref().ok().copied();
        Self {
            bus,
            delay,
            address,
            serial,
            fallback: Fallback::from_probe("sgp30", address, probe.map(|_| ())),
        }
    }

    pub fn hardware_present(&self) -> bool {
        self.fallback.hardware_present()
    }

    /// 48-bit serial read during the probe.
    pub fn serial(&self) -> Option<u64> {
        self.serial
    }

    pub fn read(&mut self) -> Reading<AirQuality> {
        let Self {
            bus,
            delay,
            address,
            fallback,
            ..
        } = self;
        fallback.resolve(
            || measure(bus, delay, *address),
            |t| AirQuality {
                tvoc_ppb: synthetic::tvoc_ppb(t),
                eco2_ppm: synthetic::eco2_ppm(t),
            },
        )
    }

    pub fn deinit(self) -> B {
        self.bus
    }
}

fn probe<B: I2c, D: DelayNs>(bus: &mut B, delay: &mut D, address: u8) -> Result<u64> {
    write_command(bus, address, CMD_GET_SERIAL_ID)?;
    delay.delay_ms(1);
    let mut id = [0u16; 3];
    read_words(bus, address, &mut id)?;
    write_command(bus, address, CMD_INIT_AIR_QUALITY)?;
    delay.delay_ms(10);
    Ok(id.iter().fold(0u64, |acc, &w| (acc << 16) | w as u64))
}

fn measure<B: I2c, D: DelayNs>(bus: &mut B, delay: &mut D, address: u8) -> Result<AirQuality> {
    write_command(bus, address, CMD_MEASURE_AIR_QUALITY)?;
    delay.delay_ms(MEASURE_DELAY_MS);
    let mut words = [0u16; 2];
    read_words(bus, address, &mut words)?;
    Ok(AirQuality {
        eco2_ppm: words[0],
        tvoc_ppb: words[1],
    })
}
