//! I2C plumbing shared by the drivers.
//!
//! Drivers are generic over `embedded_hal::i2c::I2c`. On a host without a bus the
//! runtime hands them a [`DetachedBus`], which NACKs every transaction so each
//! probe fails and the drivers run synthetic.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};

use crate::crc;
use crate::error::{Result, SensorError};

/// A bus with nothing attached.
#[derive(Clone, Copy, Debug, Default)]
pub struct DetachedBus;

impl ErrorType for DetachedBus {
    type Error = ErrorKind;
}

impl I2c for DetachedBus {
    fn transaction(
        &mut self,
        _address: u8,
        _operations: &mut [Operation<'_>],
    ) -> std::result::Result<(), Self::Error> {
        Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address))
    }
}

/// One bus shared by several drivers. Each transaction holds the lock for its
/// whole duration, so command/response pairs from different sensors never interleave
/// within a transaction.
pub struct SharedBus<B> {
    inner: Arc<Mutex<B>>,
}

impl<B> SharedBus<B> {
    pub fn new(bus: B) -> Self {
        Self {
            inner: Arc::new(Mutex::new(bus)),
        }
    }
}

impl<B> Clone for SharedBus<B> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<B: ErrorType> ErrorType for SharedBus<B> {
    type Error = B::Error;
}

impl<B: I2c> I2c for SharedBus<B> {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> std::result::Result<(), Self::Error> {
        let mut bus = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        bus.transaction(address, operations)
    }
}

/// Blocking delay on the calling thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdDelay;

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(Duration::from_nanos(ns as u64));
    }
}

pub(crate) fn write_command<B: I2c>(bus: &mut B, address: u8, command: u16) -> Result<()> {
    bus.write(address, &command.to_be_bytes())
        .map_err(SensorError::bus)
}

/// Command followed by one CRC-protected argument word.
pub(crate) fn write_command_with_arg<B: I2c>(
    bus: &mut B,
    address: u8,
    command: u16,
    arg: u16,
) -> Result<()> {
    let [c0, c1] = command.to_be_bytes();
    let [a0, a1, a2] = crc::with_crc(arg);
    bus.write(address, &[c0, c1, a0, a1, a2])
        .map_err(SensorError::bus)
}

/// Read `words.len()` CRC-checked words.
pub(crate) fn read_words<B: I2c>(bus: &mut B, address: u8, words: &mut [u16]) -> Result<()> {
    let mut raw = [0u8; 18];
    let len = words.len() * 3;
    debug_assert!(len <= raw.len());
    bus.read(address, &mut raw[..len])
        .map_err(SensorError::bus)?;
    for (word, triple) in words.iter_mut().zip(raw[..len].chunks_exact(3)) {
        *word = crc::checked_word(triple)?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod fake {
    use std::collections::VecDeque;

    use super::*;

    #[derive(Debug, Default)]
    pub struct FakeState {
        pub writes: Vec<(u8, Vec<u8>)>,
        pub responses: VecDeque<Vec<u8>>,
        pub fail_writes: bool,
    }

    /// Scripted bus: records writes, answers reads from a queue, NACKs when the
    /// queue is empty. Clones share state so tests can inspect it after handing
    /// the bus to a driver.
    #[derive(Clone, Default)]
    pub struct FakeBus {
        pub state: Arc<Mutex<FakeState>>,
    }

    impl FakeBus {
        pub fn respond(&self, bytes: &[u8]) {
            self.state.lock().unwrap().responses.push_back(bytes.to_vec());
        }

        pub fn set_fail_writes(&self, fail: bool) {
            self.state.lock().unwrap().fail_writes = fail;
        }

        pub fn writes(&self) -> Vec<(u8, Vec<u8>)> {
            self.state.lock().unwrap().writes.clone()
        }

        pub fn clear_writes(&self) {
            self.state.lock().unwrap().writes.clear();
        }
    }

    impl ErrorType for FakeBus {
        type Error = ErrorKind;
    }

    impl I2c for FakeBus {
        fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> std::result::Result<(), Self::Error> {
            let mut state = self.state.lock().unwrap();
            for op in operations.iter_mut() {
                match op {
                    Operation::Write(bytes) => {
                        if state.fail_writes {
                            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
                        }
                        state.writes.push((address, bytes.to_vec()));
                    }
                    Operation::Read(buf) => {
                        let Some(resp) = state.responses.pop_front() else {
                            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data));
                        };
                        let n = buf.len().min(resp.len());
                        buf[..n].copy_from_slice(&resp[..n]);
                    }
                }
            }
            Ok(())
        }
    }

    #[derive(Clone, Copy, Default)]
    pub struct NoDelay;

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    /// Encode words as CRC-protected triples.
    pub fn words(values: &[u16]) -> Vec<u8> {
        values.iter().flat_map(|&w| crc::with_crc(w)).collect()
    }
}
