use crate::error::Result;

use super::ParseError;

/// A big-endian, most-significant-bit-first reader over a byte slice.
#[derive(Clone, Debug)]
pub struct BitReader<'a> {
    data: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, bit_pos: 0 }
    }

    pub fn remaining_bits(&self) -> usize {
        self.data.len() * 8 - self.bit_pos
    }

    /// Read `count` bits, `count <= 32`.
    pub fn read_bits(&mut self, count: u32) -> Result<u32, ParseError> {
        debug_assert!(count <= 32);
        ensure_attach!(self.remaining_bits() >= count as usize, ParseError::TruncatedBox, "while reading bit field");
        let mut value = 0u64;
        for _ in 0..count {
            let byte = self.data[self.bit_pos / 8];
            let bit = (byte >> (7 - self.bit_pos % 8)) & 1;
            value = (value << 1) | u64::from(bit);
            self.bit_pos += 1;
        }
        Ok(value as u32)
    }

    pub fn read_flag(&mut self) -> Result<bool, ParseError> {
        Ok(self.read_bits(1)? == 1)
    }
}
