//! Bit-level writer/reader with Elias gamma coding.
//!
//! Bits are packed MSB-first into bytes. Gamma codes only represent values
//! `>= 1`, so callers store `v + 1` for values that may be zero.

use crate::error::{PilumError, Result};

/// Accumulates bits into a byte vector, most significant bit first.
#[derive(Debug, Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    /// Number of bits already used in the last byte (0 means byte-aligned).
    used: u8,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_bit(&mut self, bit: bool) {
        if self.used == 0 {
            self.bytes.push(0);
        }
        if bit {
            if let Some(last) = self.bytes.last_mut() {
                *last |= 0x80 >> self.used;
            }
        }
        self.used = (self.used + 1) % 8;
    }

    /// Write the low `width` bits of `value`, most significant first.
    pub fn put_bits(&mut self, value: u64, width: u32) {
        for i in (0..width).rev() {
            self.put_bit((value >> i) & 1 == 1);
        }
    }

    /// Write `value` as an Elias gamma code. `value` must be at least 1.
    pub fn put_gamma(&mut self, value: u64) -> Result<()> {
        if value == 0 {
            return Err(PilumError::invalid_argument("gamma code requires a value >= 1"));
        }
        let width = 64 - value.leading_zeros();
        for _ in 1..width {
            self.put_bit(false);
        }
        self.put_bits(value, width);
        Ok(())
    }

    /// Number of bits written so far.
    pub fn bit_len(&self) -> usize {
        if self.used == 0 {
            self.bytes.len() * 8
        } else {
            (self.bytes.len() - 1) * 8 + self.used as usize
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Reads bits from a byte slice, most significant bit first.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        BitReader { bytes, pos: 0 }
    }

    pub fn get_bit(&mut self) -> Result<bool> {
        let byte = self
            .bytes
            .get(self.pos / 8)
            .ok_or_else(|| PilumError::corruption("bit stream exhausted"))?;
        let bit = (byte >> (7 - (self.pos % 8))) & 1 == 1;
        self.pos += 1;
        Ok(bit)
    }

    pub fn get_bits(&mut self, width: u32) -> Result<u64> {
        let mut value = 0u64;
        for _ in 0..width {
            value = (value << 1) | self.get_bit()? as u64;
        }
        Ok(value)
    }

    pub fn get_gamma(&mut self) -> Result<u64> {
        let mut zeros = 0u32;
        while !self.get_bit()? {
            zeros += 1;
            if zeros >= 64 {
                return Err(PilumError::corruption("gamma prefix too long"));
            }
        }
        let rest = self.get_bits(zeros)?;
        Ok((1u64 << zeros) | rest)
    }

    pub fn bits_read(&self) -> usize {
        self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gamma_known_codes() {
        let mut writer = BitWriter::new();
        writer.put_gamma(1).unwrap(); // 1
        writer.put_gamma(2).unwrap(); // 010
        writer.put_gamma(5).unwrap(); // 00101
        assert_eq!(writer.bit_len(), 9);
        assert_eq!(writer.into_bytes(), vec![0b1010_0010, 0b1000_0000]);
    }

    #[test]
    fn test_gamma_sequence() {
        let values = [1u64, 7, 8, 1000, 1, 1 << 40, 3];
        let mut writer = BitWriter::new();
        for &v in &values {
            writer.put_gamma(v).unwrap();
        }
        let bytes = writer.into_bytes();

        let mut reader = BitReader::new(&bytes);
        for &v in &values {
            assert_eq!(reader.get_gamma().unwrap(), v);
        }
    }

    #[test]
    fn test_zero_rejected() {
        let mut writer = BitWriter::new();
        assert!(writer.put_gamma(0).is_err());
    }

    #[test]
    fn test_exhausted_stream() {
        let mut reader = BitReader::new(&[0u8]);
        assert!(reader.get_gamma().is_err());
    }
}
