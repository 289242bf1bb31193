//! I/O devices.
//!
//! The evaluator only ever reads and writes single bits; devices own all
//! framing. Input is addressed in *slots*: in padded mode slots alternate
//! between a presence bit (1 while input remains) and a data bit, which gives
//! programs a way to detect end of input; in sequential mode only the data
//! slots are visited. Once the input is exhausted every read yields 0.
//!
//! [`ByteIo`] frames bits over byte buffers, LSB-first within each byte.
//! [`TextBitIo`] frames them over ASCII `'0'`/`'1'` text, one character per
//! bit, which makes traces easy to eyeball.

use crate::bits::BitWriter;

/// Single-bit device interface between the evaluator and the outside world.
/// Reads never fail; an exhausted device returns 0 forever.
pub trait BitIo {
    fn read_bit(&mut self) -> u8;
    fn write_bit(&mut self, bit: u8);
}

/// Byte-buffer device. Each input byte spans sixteen slots (eight presence,
/// eight data, interleaved), so the data bit for slot `i` is bit `(i >> 1) & 7`
/// of byte `i >> 4`.
#[derive(Debug, Clone)]
pub struct ByteIo {
    input: Vec<u8>,
    index: usize,
    padded: bool,
    output: BitWriter,
}

impl ByteIo {
    /// Padded mode: presence and data slots alternate.
    #[must_use]
    pub fn padded(input: impl Into<Vec<u8>>) -> Self {
        Self::new(input, true)
    }

    /// Sequential mode: data slots only.
    #[must_use]
    pub fn sequential(input: impl Into<Vec<u8>>) -> Self {
        Self::new(input, false)
    }

    #[must_use]
    pub fn new(input: impl Into<Vec<u8>>, padded: bool) -> Self {
        Self {
            input: input.into(),
            index: usize::from(!padded),
            padded,
            output: BitWriter::new(),
        }
    }

    /// Whether any input remains to be read.
    #[must_use]
    pub fn has_more(&self) -> bool {
        (self.index >> 4) < self.input.len()
    }

    /// The bytes written so far, final partial byte included. Output is never
    /// trimmed; a program that writes trailing zero bits gets them back.
    #[must_use]
    pub fn into_output(self) -> Vec<u8> {
        self.output.into_bytes()
    }
}

impl BitIo for ByteIo {
    fn read_bit(&mut self) -> u8 {
        let i = self.index;
        if (i >> 4) >= self.input.len() {
            return 0;
        }
        self.index += if self.padded { 1 } else { 2 };

        if i & 1 == 0 {
            return 1;
        }
        (self.input[i >> 4] >> ((i >> 1) & 7)) & 1
    }

    fn write_bit(&mut self, bit: u8) {
        self.output.write_bit(bit);
    }
}

/// Bit-text device: input and output are ASCII `'0'`/`'1'` strings.
#[derive(Debug, Clone)]
pub struct TextBitIo {
    input: Vec<u8>,
    index: usize,
    padded: bool,
    output: String,
}

impl TextBitIo {
    #[must_use]
    pub fn new(input: &str, padded: bool) -> Self {
        Self {
            input: input.bytes().map(|b| u8::from(b == b'1')).collect(),
            index: usize::from(!padded),
            padded,
            output: String::new(),
        }
    }

    #[must_use]
    pub fn into_output(self) -> String {
        self.output
    }
}

impl BitIo for TextBitIo {
    fn read_bit(&mut self) -> u8 {
        let i = self.index;
        if (i >> 1) >= self.input.len() {
            return 0;
        }
        self.index += if self.padded { 1 } else { 2 };

        if i & 1 == 0 {
            return 1;
        }
        self.input[i >> 1]
    }

    fn write_bit(&mut self, bit: u8) {
        self.output.push(if bit == 0 { '0' } else { '1' });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(io: &mut dyn BitIo, n: usize) -> Vec<u8> {
        (0..n).map(|_| io.read_bit()).collect()
    }

    #[test]
    fn padded_alternates_presence_and_data() {
        let mut io = ByteIo::padded(vec![0x03]);
        assert_eq!(
            drain(&mut io, 8),
            // presence, bit0, presence, bit1, presence, bit2, ...
            vec![1, 1, 1, 1, 1, 0, 1, 0],
        );
        assert_eq!(drain(&mut io, 8), vec![1, 0, 1, 0, 1, 0, 1, 0]);
        // Exhausted: presence drops to 0 along with everything else.
        assert_eq!(drain(&mut io, 4), vec![0, 0, 0, 0]);
        assert!(!io.has_more());
    }

    #[test]
    fn sequential_reads_data_only() {
        let mut io = ByteIo::sequential(vec![0x1a, 0x01]);
        assert_eq!(drain(&mut io, 8), vec![0, 1, 0, 1, 1, 0, 0, 0]);
        assert_eq!(drain(&mut io, 8), vec![1, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(drain(&mut io, 3), vec![0, 0, 0]);
    }

    #[test]
    fn empty_input_reads_zero() {
        let mut io = ByteIo::padded(Vec::new());
        assert_eq!(drain(&mut io, 3), vec![0, 0, 0]);
        assert!(!io.has_more());
    }

    #[test]
    fn output_packs_lsb_first() {
        let mut io = ByteIo::padded(Vec::new());
        for bit in [1, 0, 1, 1, 0, 0, 0, 0, 1] {
            io.write_bit(bit);
        }
        // Final partial byte is kept.
        assert_eq!(io.into_output(), vec![0b0000_1101, 0b0000_0001]);
    }

    #[test]
    fn text_device_mirrors_byte_device() {
        let mut io = TextBitIo::new("101", true);
        assert_eq!(drain(&mut io, 8), vec![1, 1, 1, 0, 1, 1, 0, 0]);
        io.write_bit(1);
        io.write_bit(0);
        assert_eq!(io.into_output(), "10");
    }

    #[test]
    fn text_sequential() {
        let mut io = TextBitIo::new("1101", false);
        assert_eq!(drain(&mut io, 6), vec![1, 1, 0, 1, 0, 0]);
    }
}
