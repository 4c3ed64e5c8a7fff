//! SHT30 temperature / humidity.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::bus::{read_words, write_command};
use crate::error::Result;
use crate::reading::{Fallback, Reading};
use crate::synthetic;

pub const DEFAULT_ADDRESS: u8 = 0x44;

const CMD_SOFT_RESET: u16 = 0x30A2;
/// Single shot, high repeatability, no clock stretching.
const CMD_MEASURE: u16 = 0x2400;
const MEASURE_DELAY_MS: u32 = 15;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Climate {
    pub temperature_c: f32,
    pub humidity_rh: f32,
}

pub struct Sht30<B, D> {
    bus: B,
    delay: D,
    address: u8,
    fallback: Fallback,
}

impl<B: I2c, D: DelayNs> Sht30<B, D> {
    pub fn init(mut bus: B, address: u8, mut delay: D) -> Self {
        let probe = write_command(&mut bus, address, CMD_SOFT_RESET).map(|()| delay.delay_ms(10));
        Self {
            bus,
            delay,
            address,
            fallback: Fallback::from_probe("sht30", address, probe),
        }
    }

    pub fn hardware_present(&self) -> bool {
        self.fallback.hardware_present()
    }

    pub fn read(&mut self) -> Reading<Climate> {
        let Self {
            bus,
            delay,
            address,
            fallback,
        } = self;
        fallback.resolve(
            || measure(bus, delay, *address),
            |t| Climate {
                temperature_c: synthetic::temperature(t),
                humidity_rh: synthetic::humidity(t),
            },
        )
    }

    pub fn deinit(self) -> B {
        self.bus
    }
}

fn measure<B: I2c, D: DelayNs>(bus: &mut B, delay: &mut D, address: u8) -> Result<Climate> {
    write_command(bus, address, CMD_MEASURE)?;
    delay.delay_ms(MEASURE_DELAY_MS);
    let mut words = [0u16; 2];
    read_words(bus, address, &mut words)?;
    Ok(Climate {
        temperature_c: -45.0 + 175.0 * words[0] as f32 / 65535.0,
        humidity_rh: 100.0 * words[1] as f32 / 65535.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::DetachedBus;
    use crate::bus::fake::{FakeBus, NoDelay, words};

    #[test]
    fn converts_raw_words() {
        let bus = FakeBus::default();
        let mut sensor = Sht30::init(bus.clone(), DEFAULT_ADDRESS, NoDelay);
        assert!(sensor.hardware_present());

        bus.respond(&words(&[0x6666, 0x8000]));
        let reading = sensor.read();
        assert!(reading.valid && reading.hardware_present);
        assert!((reading.value.temperature_c - 25.0).abs() < 0.01);
        assert!((reading.value.humidity_rh - 50.0).abs() < 0.01);
        assert_eq!(
            bus.writes(),
            vec![(0x44, vec![0x30, 0xA2]), (0x44, vec![0x24, 0x00])]
        );
    }

    #[test]
    fn missing_hardware_reads_synthetic() {
        let mut sensor = Sht30::init(DetachedBus, DEFAULT_ADDRESS, NoDelay);
        assert!(!sensor.hardware_present());
        for _ in 0..5 {
            let reading = sensor.read();
            assert!(reading.valid);
            assert!(!reading.hardware_present);
            assert!((19.0..=25.0).contains(&reading.value.temperature_c));
        }
    }

    #[test]
    fn crc_failure_demotes_for_good() {
        let bus = FakeBus::default();
        let mut sensor = Sht30::init(bus.clone(), DEFAULT_ADDRESS, NoDelay);
        let mut bad = words(&[0x6666, 0x8000]);
        bad[2] ^= 0x01;
        bus.respond(&bad);

        let reading = sensor.read();
        assert!(reading.valid);
        assert!(!reading.hardware_present);
        assert!(!sensor.hardware_present());

        bus.clear_writes();
        bus.respond(&words(&[0x6666, 0x8000]));
        assert!(!sensor.read().hardware_present);
        assert!(bus.writes().is_empty());
    }
}
