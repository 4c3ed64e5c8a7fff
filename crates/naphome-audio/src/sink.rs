//! Output sink abstraction.
//!
//! A sink accepts mono 16-bit PCM at the rate it was last reconfigured to. The
//! playback loop only talks to sinks through [`crate::arbiter::Codec`], which
//! serializes access.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::error::Result;

pub trait AudioSink: Send {
    /// Block until `samples` have been accepted by the output.
    fn write(&mut self, samples: &[i16]) -> Result<()>;

    /// Switch the output to `sample_rate`.
    fn reconfigure(&mut self, sample_rate: u32) -> Result<()>;

    /// Rate of the last successful reconfiguration.
    fn sample_rate(&self) -> u32;

    fn device_name(&self) -> Option<String> {
        None
    }
}

/// Discards audio. With `realtime` set, each write sleeps for the duration of the
/// samples so playback timing matches a real device.
pub struct NullSink {
    rate: u32,
    realtime: bool,
}

impl NullSink {
    pub fn new(rate: u32, realtime: bool) -> Self {
        Self { rate, realtime }
    }
}

impl AudioSink for NullSink {
    fn write(&mut self, samples: &[i16]) -> Result<()> {
        if self.realtime && self.rate > 0 {
            let micros = samples.len() as u64 * 1_000_000 / self.rate as u64;
            std::thread::sleep(Duration::from_micros(micros));
        }
        Ok(())
    }

    fn reconfigure(&mut self, sample_rate: u32) -> Result<()> {
        self.rate = sample_rate;
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.rate
    }

    fn device_name(&self) -> Option<String> {
        Some("null".to_string())
    }
}

/// What a [`MemorySink`] has seen.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SinkLog {
    /// Length of every write call, in order.
    pub writes: Vec<usize>,
    pub samples: Vec<i16>,
    /// Every rate passed to `reconfigure`.
    pub reconfigures: Vec<u32>,
}

/// Records writes in memory. Clones share the same log.
#[derive(Clone)]
pub struct MemorySink {
    rate: u32,
    log: Arc<Mutex<SinkLog>>,
}

impl MemorySink {
    pub fn new(rate: u32) -> Self {
        Self {
            rate,
            log: Arc::new(Mutex::new(SinkLog::default())),
        }
    }

    pub fn log(&self) -> SinkLog {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl AudioSink for MemorySink {
    fn write(&mut self, samples: &[i16]) -> Result<()> {
        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        log.writes.push(samples.len());
        log.samples.extend_from_slice(samples);
        Ok(())
    }

    fn reconfigure(&mut self, sample_rate: u32) -> Result<()> {
        self.rate = sample_rate;
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reconfigures
            .push(sample_rate);
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.rate
    }

    fn device_name(&self) -> Option<String> {
        Some("memory".to_string())
    }
}
