//! Deterministic stand-ins for absent hardware.
//!
//! Each driver owns a [`Ticker`]; every synthetic read advances it once and feeds
//! `t = counter * 0.01` into a blend of slow sinusoids.

#[derive(Clone, Copy, Debug, Default)]
pub struct Ticker {
    counter: u32,
}

impl Ticker {
    pub fn advance(&mut self) -> f32 {
        self.counter = self.counter.wrapping_add(1);
        self.counter as f32 * 0.01
    }

    pub fn count(&self) -> u32 {
        self.counter
    }
}

const TEMPERATURE_BASE: f32 = 22.0;
const HUMIDITY_BASE: f32 = 45.0;

pub fn temperature(t: f32) -> f32 {
    TEMPERATURE_BASE + 2.5 * t.sin() + 0.5 * (3.7 * t).sin()
}

pub fn humidity(t: f32) -> f32 {
    HUMIDITY_BASE + 10.0 * (0.7 * t).sin() + 2.0 * (2.3 * t).sin()
}

pub fn tvoc_ppb(t: f32) -> u16 {
    (50.0 + 30.0 * t.sin() + 10.0 * (2.3 * t).sin()).max(0.0) as u16
}

pub fn eco2_ppm(t: f32) -> u16 {
    (400.0 + 100.0 * (0.5 * t).sin() + 30.0 * (1.7 * t).sin()).max(0.0) as u16
}

/// Day/night swing: bright daylight while the slow wave is positive, dim otherwise.
pub fn lux(t: f32) -> f32 {
    let daylight = (0.1 * t).sin();
    let value = if daylight > 0.0 {
        200.0 + 800.0 * daylight + 100.0 * (2.3 * t).sin()
    } else {
        25.0 + 25.0 * daylight.abs() + 5.0 * (1.7 * t).sin()
    };
    value.max(0.0)
}

pub fn co2_ppm(t: f32) -> f32 {
    400.0 + 300.0 * (0.3 * t).sin() + 50.0 * (1.5 * t).sin()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticker_advances_before_producing_time() {
        let mut ticker = Ticker::default();
        assert!((ticker.advance() - 0.01).abs() < 1e-6);
        assert!((ticker.advance() - 0.02).abs() < 1e-6);
        assert_eq!(ticker.count(), 2);
    }

    #[test]
    fn generators_stay_in_plausible_ranges() {
        let mut ticker = Ticker::default();
        for _ in 0..20_000 {
            let t = ticker.advance();
            assert!((19.0..=25.0).contains(&temperature(t)));
            assert!((33.0..=57.0).contains(&humidity(t)));
            assert!(tvoc_ppb(t) <= 90);
            assert!((270..=530).contains(&eco2_ppm(t)));
            assert!((0.0..=1100.0).contains(&lux(t)));
            assert!((50.0..=750.0).contains(&co2_ppm(t)));
        }
    }

    #[test]
    fn same_counter_gives_same_values() {
        let (mut a, mut b) = (Ticker::default(), Ticker::default());
        for _ in 0..10 {
            assert_eq!(lux(a.advance()), lux(b.advance()));
        }
    }
}
