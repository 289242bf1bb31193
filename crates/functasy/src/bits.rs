//! Bit-level packing primitives.
//!
//! Bits fill bytes LSB-first. On top of raw bits sit two variable-width
//! codecs:
//!
//! - `write_var`/`read_var` encode a value known to be `<= max` in at most
//!   `bitlen(max)` bits. A running bound flag starts set; while it holds, bit
//!   positions where `max` has a 0 are skipped entirely (the value cannot have
//!   a 1 there without exceeding `max`), and the flag clears as soon as a 0
//!   bit is emitted. With `max = 0` nothing is written and zero is read.
//! - `write_int`/`read_int` encode an arbitrary unsigned integer as the bits
//!   of `n + 1`, each payload bit prefixed by a 1 continuation bit and the
//!   whole terminated by a 0.
//!
//! Readers yield 0 past the end of the buffer, so encodings with trailing
//! zero bytes stripped decode unchanged.

/// Accumulates bits into a byte buffer, LSB-first.
#[derive(Debug, Clone, Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    byte: u8,
    count: u8,
}

impl BitWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_bit(&mut self, bit: u8) {
        self.byte |= (bit & 1) << self.count;
        self.count += 1;
        if self.count == 8 {
            self.bytes.push(self.byte);
            self.byte = 0;
            self.count = 0;
        }
    }

    /// Writes `num` bounded by `max`. `num` must not exceed `max`.
    pub fn write_var(&mut self, num: u32, max: u32) {
        debug_assert!(num <= max);
        if max == 0 {
            return;
        }

        let mut mask = 1u32 << (31 - max.leading_zeros());
        let mut bounded = true;

        while mask != 0 {
            if !bounded || max & mask != 0 {
                let bit = u8::from(num & mask != 0);
                self.write_bit(bit);
                if bit == 0 {
                    bounded = false;
                }
            }
            mask >>= 1;
        }
    }

    /// Writes an unbounded integer, low bits first, one continuation bit per
    /// payload bit.
    pub fn write_int(&mut self, num: u64) {
        let mut v = num + 1;
        while v != 1 {
            self.write_bit(1);
            self.write_bit((v & 1) as u8);
            v >>= 1;
        }
        self.write_bit(0);
    }

    /// Number of bits written so far.
    #[must_use]
    pub fn bit_len(&self) -> usize {
        self.bytes.len() * 8 + self.count as usize
    }

    /// Finishes the buffer, including a final partial byte.
    #[must_use]
    pub fn into_bytes(mut self) -> Vec<u8> {
        if self.count != 0 {
            self.bytes.push(self.byte);
        }
        self.bytes
    }

    /// Like [`Self::into_bytes`], with trailing zero bytes stripped.
    #[must_use]
    pub fn into_trimmed(self) -> Vec<u8> {
        let mut bytes = self.into_bytes();
        while bytes.last() == Some(&0) {
            bytes.pop();
        }
        bytes
    }
}

/// Reads bits from a byte buffer, LSB-first. Never fails: positions past the
/// end read as 0.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn read_bit(&mut self) -> u8 {
        let bit = match self.buf.get(self.pos >> 3) {
            Some(byte) => (byte >> (self.pos & 7)) & 1,
            None => 0,
        };
        self.pos += 1;
        bit
    }

    /// Reads a value bounded by `max`; the result never exceeds `max`.
    pub fn read_var(&mut self, max: u32) -> u32 {
        if max == 0 {
            return 0;
        }

        let mut mask = 1u32 << (31 - max.leading_zeros());
        let mut bounded = true;
        let mut num = 0u32;

        while mask != 0 {
            num <<= 1;
            if !bounded || max & mask != 0 {
                let bit = self.read_bit();
                num |= u32::from(bit);
                if bit == 0 {
                    bounded = false;
                }
            }
            mask >>= 1;
        }

        num
    }

    /// Reads an integer written by [`BitWriter::write_int`].
    pub fn read_int(&mut self) -> u64 {
        let mut val = 0u64;
        let mut mult = 1u64;
        while self.read_bit() != 0 {
            val += u64::from(self.read_bit()) * mult;
            mult <<= 1;
        }
        val + mult - 1
    }

    /// Whether every bit from the current position to the physical end of the
    /// buffer is 0. Used to reject trailing garbage after a decoded payload.
    #[must_use]
    pub fn rest_is_zero(&self) -> bool {
        let mut probe = self.clone();
        while probe.pos < probe.buf.len() * 8 {
            if probe.read_bit() != 0 {
                return false;
            }
        }
        true
    }
}
