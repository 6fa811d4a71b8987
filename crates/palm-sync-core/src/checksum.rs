//! Checksums used by SLP framing.
//!
//! - CRC16 with polynomial 0x1021, initial value 0, no reflection
//!   (the XMODEM variant). Covers the SLP header and payload.
//! - An 8-bit additive checksum over the SLP header bytes.

/// CRC16 generator polynomial.
pub const CRC16_POLY: u16 = 0x1021;

const CRC16_TABLE: [u16; 256] = build_table();

const fn build_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ CRC16_POLY
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Incremental CRC16 state.
///
/// Feeding data in any number of `update` calls yields the same value as
/// a single call over the concatenation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Crc16 {
    value: u16,
}

impl Crc16 {
    /// Start a new computation.
    pub const fn new() -> Self {
        Self { value: 0 }
    }

    /// Feed more bytes.
    pub fn update(&mut self, data: &[u8]) {
        for &byte in data {
            let index = ((self.value >> 8) as u8 ^ byte) as usize;
            self.value = (self.value << 8) ^ CRC16_TABLE[index];
        }
    }

    /// Current checksum value.
    pub const fn finish(&self) -> u16 {
        self.value
    }
}

/// CRC16 of a byte slice in one pass.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = Crc16::new();
    crc.update(data);
    crc.finish()
}

/// Sum of all bytes, truncated to 8 bits.
pub fn sum8(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_crc16_check_vector() {
        assert_eq!(crc16(b"123456789"), 0x31C3);
    }

    #[test]
    fn test_crc16_empty() {
        assert_eq!(crc16(&[]), 0);
    }

    #[test]
    fn test_crc16_matches_bitwise_reference() {
        fn bitwise(data: &[u8]) -> u16 {
            let mut crc: u16 = 0;
            for &b in data {
                crc ^= u16::from(b) << 8;
                for _ in 0..8 {
                    crc = if crc & 0x8000 != 0 {
                        (crc << 1) ^ CRC16_POLY
                    } else {
                        crc << 1
                    };
                }
            }
            crc
        }
        let data: Vec<u8> = (0..=255u8).collect();
        assert_eq!(crc16(&data), bitwise(&data));
    }

    #[test]
    fn test_sum8_wraps() {
        assert_eq!(sum8(&[0xBE, 0xEF, 0xED]), 0x9A);
        assert_eq!(sum8(&[0xFF, 0x01]), 0x00);
    }

    proptest! {
        #[test]
        fn crc16_incremental_equals_one_pass(
            a in prop::collection::vec(any::<u8>(), 0..512),
            b in prop::collection::vec(any::<u8>(), 0..512),
        ) {
            let mut crc = Crc16::new();
            crc.update(&a);
            crc.update(&b);

            let mut joined = a.clone();
            joined.extend_from_slice(&b);
            prop_assert_eq!(crc.finish(), crc16(&joined));
        }
    }
}
