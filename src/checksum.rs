//! Pluggable checksums, used to give a manifest its self-verifying id.
//!
//! A manifest's id is a field id and therefore 16 bits wide, so engines produce `u16` values.
//!  Wider algorithms are folded down to 16 bits.

use std::fmt::{Debug, Formatter};

use crc::{Algorithm, Crc};

use crate::error::{DatagramError, Result};

pub trait ChecksumEngine: Debug + Send + Sync + 'static {
    fn checksum(&self, bytes: &[u8]) -> u16;

    fn checksum_range(&self, bytes: &[u8], offset: usize, length: usize) -> Result<u16> {
        let end = offset.checked_add(length)
            .filter(|&end| end <= bytes.len())
            .ok_or(DatagramError::OutOfRange {
                what: "checksum range end",
                value: (offset as u64).saturating_add(length as u64),
                allowed: "0..=len",
            })?;
        Ok(self.checksum(&bytes[offset..end]))
    }
}

pub struct Crc16 {
    algorithm: &'static Algorithm<u16>,
}
impl Debug for Crc16 {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Crc16{{poly:0x{:04x},init:0x{:04x}}}", self.algorithm.poly, self.algorithm.init)
    }
}

impl Default for Crc16 {
    fn default() -> Self {
        Self::ccitt()
    }
}

impl Crc16 {
    pub const fn new(algorithm: &'static Algorithm<u16>) -> Crc16 {
        Crc16 { algorithm }
    }

    /// CRC-16/CCITT-FALSE (poly 0x1021, init 0xFFFF)
    pub const fn ccitt() -> Crc16 {
        Self::new(&crc::CRC_16_IBM_3740)
    }

    /// CRC-16/ARC, the 'classic' IBM CRC-16
    pub const fn arc() -> Crc16 {
        Self::new(&crc::CRC_16_ARC)
    }

    pub const fn xmodem() -> Crc16 {
        Self::new(&crc::CRC_16_XMODEM)
    }
}

impl ChecksumEngine for Crc16 {
    fn checksum(&self, bytes: &[u8]) -> u16 {
        Crc::<u16>::new(self.algorithm).checksum(bytes)
    }
}

/// CRC-32 (ISO-HDLC) with the upper and lower 16 bits XOR'ed together
#[derive(Debug, Default)]
pub struct FoldedCrc32;

impl ChecksumEngine for FoldedCrc32 {
    fn checksum(&self, bytes: &[u8]) -> u16 {
        let crc = Crc::<u32>::new(&crc::CRC_32_ISO_HDLC).checksum(bytes);
        ((crc >> 16) ^ (crc & 0xffff)) as u16
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use super::*;

    #[rstest]
    #[case::ccitt(Crc16::ccitt(), 0x29b1)]
    #[case::arc(Crc16::arc(), 0xbb3d)]
    #[case::xmodem(Crc16::xmodem(), 0x31c3)]
    fn test_crc16_check_values(#[case] engine: Crc16, #[case] expected: u16) {
        assert_eq!(engine.checksum(b"123456789"), expected);
    }

    #[test]
    fn test_folded_crc32() {
        // CRC-32 check value is 0xCBF43926
        assert_eq!(FoldedCrc32.checksum(b"123456789"), 0xcbf4 ^ 0x3926);
    }

    #[rstest]
    #[case::full(0, 9, true)]
    #[case::middle(2, 3, true)]
    #[case::empty_at_end(9, 0, true)]
    #[case::too_long(5, 5, false)]
    #[case::overflow(usize::MAX, 2, false)]
    fn test_checksum_range(#[case] offset: usize, #[case] length: usize, #[case] is_ok: bool) {
        let engine = Crc16::ccitt();
        let bytes = b"123456789";
        match engine.checksum_range(bytes, offset, length) {
            Ok(actual) => {
                assert!(is_ok);
                assert_eq!(actual, engine.checksum(&bytes[offset..offset + length]));
            }
            Err(e) => {
                assert!(!is_ok);
                assert!(matches!(e, DatagramError::OutOfRange { .. }));
            }
        }
    }
}
