//! The four environmental sensors behind one poll call.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use naphome_types::{AirQualitySample, ClimateSample, Co2Sample, LightSample, SensorSnapshot};

use crate::bh1750::{self, Bh1750};
use crate::scd30::{self, Scd30};
use crate::sgp30::{self, Sgp30};
use crate::sht30::{self, Sht30};

/// 7-bit addresses of each part.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SensorAddresses {
    pub sht30: u8,
    pub sgp30: u8,
    pub bh1750: u8,
    pub scd30: u8,
}

impl Default for SensorAddresses {
    fn default() -> Self {
        Self {
            sht30: sht30::DEFAULT_ADDRESS,
            sgp30: sgp30::DEFAULT_ADDRESS,
            bh1750: bh1750::DEFAULT_ADDRESS,
            scd30: scd30::DEFAULT_ADDRESS,
        }
    }
}

pub struct SensorHub<B, D> {
    sht30: Sht30<B, D>,
    sgp30: Sgp30<B, D>,
    bh1750: Bh1750<B, D>,
    scd30: Scd30<B, D>,
}

impl<B, D> SensorHub<B, D>
where
    B: I2c + Clone,
    D: DelayNs + Clone,
{
    /// Probe every sensor. Absent parts fall back to synthetic data.
    pub fn init(bus: B, delay: D, addresses: SensorAddresses) -> Self {
        let hub = Self {
            sht30: Sht30::init(bus.clone(), addresses.sht30, delay.clone()),
            sgp30: Sgp30::init(bus.clone(), addresses.sgp30, delay.clone()),
            bh1750: Bh1750::init(bus.clone(), addresses.bh1750, delay.clone()),
            scd30: Scd30::init(bus, addresses.scd30, delay),
        };
        tracing::info!(
            sht30 = hub.sht30.hardware_present(),
            sgp30 = hub.sgp30.hardware_present(),
            bh1750 = hub.bh1750.hardware_present(),
            scd30 = hub.scd30.hardware_present(),
            "sensor hub ready"
        );
        hub
    }

    /// `(name, hardware_present)` for every sensor, in probe order.
    pub fn presence(&self) -> [(&'static str, bool); 4] {
        [
            ("SHT30", self.sht30.hardware_present()),
            ("SGP30", self.sgp30.hardware_present()),
            ("BH1750", self.bh1750.hardware_present()),
            ("SCD30", self.scd30.hardware_present()),
        ]
    }

    /// Read every sensor once.
    pub fn poll(&mut self) -> SensorSnapshot {
        let climate = self.sht30.read();
        let air = self.sgp30.read();
        let light = self.bh1750.read();
        let co2 = self.scd30.read();

        let snapshot = SensorSnapshot {
            climate: climate.valid.then_some(ClimateSample {
                temperature_c: climate.value.temperature_c,
                humidity_rh: climate.value.humidity_rh,
                hardware_present: climate.hardware_present,
            }),
            air_quality: air.valid.then_some(AirQualitySample {
                tvoc_ppb: air.value.tvoc_ppb,
                eco2_ppm: air.value.eco2_ppm,
                hardware_present: air.hardware_present,
            }),
            light: light.valid.then_some(LightSample {
                lux: light.value,
                hardware_present: light.hardware_present,
            }),
            co2: co2.valid.then_some(Co2Sample {
                co2_ppm: co2.value.co2_ppm,
                temperature_c: co2.value.temperature_c,
                humidity_rh: co2.value.humidity_rh,
                hardware_present: co2.hardware_present,
            }),
        };
        tracing::debug!(?snapshot, "sensors polled");
        snapshot
    }

    /// Put the parts that need it to sleep.
    pub fn shutdown(self) {
        self.sht30.deinit();
        self.sgp30.deinit();
        self.bh1750.deinit();
        self.scd30.deinit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::fake::{FakeBus, NoDelay, words};
    use crate::bus::{DetachedBus, SharedBus};

    #[test]
    fn detached_hub_is_fully_synthetic() {
        let mut hub = SensorHub::init(DetachedBus, NoDelay, SensorAddresses::default());
        assert!(hub.presence().iter().all(|(_, present)| !present));

        let first = hub.poll();
        let second = hub.poll();
        for snap in [&first, &second] {
            assert!(!snap.climate.unwrap().hardware_present);
            assert!(!snap.air_quality.unwrap().hardware_present);
            assert!(!snap.light.unwrap().hardware_present);
            assert!(!snap.co2.unwrap().hardware_present);
        }
        assert_ne!(first.climate, second.climate);
    }

    #[test]
    fn shared_bus_addresses_each_part() {
        let fake = FakeBus::default();
        let hub = SensorHub::init(
            SharedBus::new(fake.clone()),
            NoDelay,
            SensorAddresses::default(),
        );
        let addressed: Vec<u8> = fake.writes().iter().map(|(a, _)| *a).collect();
        assert!(addressed.contains(&0x44));
        assert!(addressed.contains(&0x58));
        assert!(addressed.contains(&0x23));
        assert!(addressed.contains(&0x61));
        // SGP30 and SCD30 probes need read data, the fake had none queued
        assert_eq!(
            hub.presence(),
            [("SHT30", true), ("SGP30", false), ("BH1750", true), ("SCD30", false)]
        );
    }

    #[test]
    fn co2_is_absent_until_the_first_measurement() {
        let fake = FakeBus::default();
        fake.respond(&words(&[0x0000, 0x0123, 0x4567]));
        fake.respond(&words(&[0x0342]));
        let mut hub = SensorHub::init(
            SharedBus::new(fake.clone()),
            NoDelay,
            SensorAddresses::default(),
        );
        assert!(hub.presence().iter().all(|(_, present)| *present));

        fake.respond(&words(&[0x6666, 0x8000]));
        fake.respond(&words(&[412, 7]));
        fake.respond(&[0x01, 0xE0]);
        fake.respond(&words(&[0]));
        let snapshot = hub.poll();

        assert!(snapshot.climate.unwrap().hardware_present);
        assert!(snapshot.air_quality.unwrap().hardware_present);
        assert!(snapshot.light.unwrap().hardware_present);
        assert!(snapshot.co2.is_none());
        assert!(hub.presence()[3].1);
    }
}
