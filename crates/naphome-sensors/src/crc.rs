//! Sensirion CRC-8 (polynomial 0x31, init 0xFF, no reflection, no final xor).

use crate::error::{Result, SensorError};

pub fn crc8(data: &[u8]) -> u8 {
    let mut crc: u8 = 0xFF;
    for &byte in data {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ 0x31
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Decode one `[msb, lsb, crc]` triple.
pub fn checked_word(triple: &[u8]) -> Result<u16> {
    let expected = crc8(&triple[..2]);
    let actual = triple[2];
    if expected != actual {
        return Err(SensorError::Crc { expected, actual });
    }
    Ok(u16::from_be_bytes([triple[0], triple[1]]))
}

/// Encode a word as `[msb, lsb, crc]`.
pub fn with_crc(word: u16) -> [u8; 3] {
    let [msb, lsb] = word.to_be_bytes();
    [msb, lsb, crc8(&[msb, lsb])]
}
