use embedded_hal::i2c::ErrorKind;

/// Why a hardware read did not produce a value.
///
/// Never reaches callers of the drivers' `read`. Bus and CRC errors are logged
/// and demote the driver to synthetic data; `NotReady` does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SensorError {
    #[error("i2c transaction failed: {0}")]
    Bus(ErrorKind),
    #[error("crc mismatch: expected {expected:#04x}, got {actual:#04x}")]
    Crc { expected: u8, actual: u8 },
    /// The part answered but has no measurement yet. Not a failure.
    #[error("no measurement ready")]
    NotReady,
}

impl SensorError {
    pub(crate) fn bus<E: embedded_hal::i2c::Error>(err: E) -> Self {
        SensorError::Bus(err.kind())
    }
}

pub type Result<T> = std::result::Result<T, SensorError>;
