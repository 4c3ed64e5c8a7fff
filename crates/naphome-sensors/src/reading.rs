use crate::synthetic::Ticker;

/// One poll result. `valid` is false only when hardware answered but has not
/// produced a measurement yet; `value` is then a placeholder.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Reading<T> {
    pub value: T,
    pub valid: bool,
    pub hardware_present: bool,
}

impl<T> Reading<T> {
    pub fn hardware(value: T) -> Self {
        Self {
            value,
            valid: true,
            hardware_present: true,
        }
    }

    pub fn not_ready(value: T) -> Self {
        Self {
            value,
            valid: false,
            hardware_present: true,
        }
    }

    pub fn synthetic(value: T) -> Self {
        Self {
            value,
            valid: true,
            hardware_present: false,
        }
    }
}

/// Hardware-or-synthetic bookkeeping shared by every driver.
///
/// Demotion is one-way: once a hardware read fails the handle stays synthetic
/// until it is dropped and re-initialized.
#[derive(Debug)]
pub(crate) struct Fallback {
    name: &'static str,
    hardware: bool,
    ticker: Ticker,
}

impl Fallback {
    pub(crate) fn new(name: &'static str, hardware: bool) -> Self {
        Self {
            name,
            hardware,
            ticker: Ticker::default(),
        }
    }

    pub(crate) fn hardware_present(&self) -> bool {
        self.hardware
    }

    /// Log a probe outcome and build the bookkeeping for it.
    pub(crate) fn from_probe(
        name: &'static str,
        address: u8,
        probe: crate::error::Result<()>,
    ) -> Self {
        match probe {
            Ok(()) => {
                tracing::info!(
                    sensor = name,
                    address = format_args!("{address:#04x}"),
                    "sensor detected"
                );
                Self::new(name, true)
            }
            Err(e) => {
                tracing::warn!(
                    sensor = name,
                    address = format_args!("{address:#04x}"),
                    error = %e,
                    "sensor not detected, using synthetic data"
                );
                Self::new(name, false)
            }
        }
    }

    /// Try `hardware` while the handle has not been demoted, otherwise (or on any
    /// failure) produce a synthetic value from the next tick.
    pub(crate) fn resolve<T>(
        &mut self,
        hardware: impl FnOnce() -> crate::error::Result<T>,
        synthetic: impl FnOnce(f32) -> T,
    ) -> Reading<T> {
        if self.hardware {
            match hardware() {
                Ok(value) => return Reading::hardware(value),
                Err(e) => self.demote(&e),
            }
        }
        Reading::synthetic(synthetic(self.ticker.advance()))
    }

    pub(crate) fn demote(&mut self, err: &crate::error::SensorError) {
        tracing::warn!(
            sensor = self.name,
            error = %err,
            "hardware read failed, switching to synthetic data"
        );
        self.hardware = false;
    }

    pub(crate) fn tick(&mut self) -> f32 {
        self.ticker.advance()
    }
}
