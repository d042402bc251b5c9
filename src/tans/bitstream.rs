//! Bit I/O for the tANS stream.
//!
//! The writer packs bits LSB first. The reader walks the same stream from the
//! end, so the last value written is the first value read, which is the order
//! a tANS decoder consumes what the encoder emitted in reverse.
//!
//! A single 1 bit is appended after the payload; the reader locates the end of
//! the payload from the highest set bit of the final byte.

use crate::error::{PktzError, Result};

/// LSB-first bit writer appending to a caller-owned buffer.
pub struct BitWriter<'a> {
    out: &'a mut Vec<u8>,
    /// Pending bits, lowest first
    acc: u64,
    /// Bits pending in `acc` (always < 8 between calls)
    bits: u32,
}

impl<'a> BitWriter<'a> {
    pub fn new(out: &'a mut Vec<u8>) -> Self {
        Self { out, acc: 0, bits: 0 }
    }

    /// Append the low `n` bits of `value`.
    #[inline]
    pub fn write_bits(&mut self, value: u32, n: u32) {
        debug_assert!(n <= 24);
        debug_assert!(n == 32 || value >> n == 0);
        self.acc |= u64::from(value) << self.bits;
        self.bits += n;
        while self.bits >= 8 {
            self.out.push(self.acc as u8);
            self.acc >>= 8;
            self.bits -= 8;
        }
    }

    /// Write the end marker and flush the final partial byte.
    pub fn finish(mut self) {
        self.write_bits(1, 1);
        if self.bits > 0 {
            self.out.push(self.acc as u8);
        }
    }
}

/// Reads bits back from the end of a stream produced by [`BitWriter`].
pub struct BackwardBitReader<'a> {
    data: &'a [u8],
    /// Payload bits not yet consumed; also the bit index of the next read's end.
    pos: usize,
}

impl<'a> BackwardBitReader<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let last = *data
            .last()
            .ok_or(PktzError::CorruptFrame("empty bitstream"))?;
        if last == 0 {
            return Err(PktzError::CorruptFrame("missing end marker"));
        }
        let marker = 7 - last.leading_zeros() as usize;
        Ok(Self {
            data,
            pos: (data.len() - 1) * 8 + marker,
        })
    }

    /// Read the `n` bits written most recently before the current position.
    #[inline]
    pub fn read_bits(&mut self, n: u32) -> Result<u32> {
        debug_assert!(n <= 24);
        let n_usize = n as usize;
        if n_usize > self.pos {
            return Err(PktzError::CorruptFrame("bitstream underflow"));
        }
        if n == 0 {
            return Ok(0);
        }
        self.pos -= n_usize;
        let byte = self.pos / 8;
        let shift = self.pos % 8;
        let mut word = [0u8; 4];
        let avail = (self.data.len() - byte).min(4);
        word[..avail].copy_from_slice(&self.data[byte..byte + avail]);
        let value = u32::from_le_bytes(word) >> shift;
        Ok(value & ((1u32 << n) - 1))
    }

    /// Payload bits left.
    pub fn remaining_bits(&self) -> usize {
        self.pos
    }
}
