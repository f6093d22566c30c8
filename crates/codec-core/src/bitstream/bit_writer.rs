//! MSB-first bit writer used to build bit-packed configuration blobs

/// Accumulates bits into a byte vector
#[derive(Debug, Clone, Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    /// Bits used in the last byte (0 means the last byte is full or absent)
    used: u32,
}

impl BitWriter {
    /// Create an empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the low `n` (0..=32) bits of `value`
    pub fn write_bits(&mut self, n: u32, value: u32) {
        for i in (0..n).rev() {
            let bit = ((value >> i) & 1) as u8;
            if self.used == 0 {
                self.bytes.push(0);
            }
            let last = self.bytes.len() - 1;
            self.bytes[last] |= bit << (7 - self.used);
            self.used = (self.used + 1) % 8;
        }
    }

    /// Append one flag bit
    pub fn write_flag(&mut self, flag: bool) {
        self.write_bits(1, flag as u32);
    }

    /// Append an unsigned Exp-Golomb code
    pub fn write_ue(&mut self, value: u32) {
        let code = value as u64 + 1;
        let bits = 64 - code.leading_zeros();
        self.write_bits(bits - 1, 0);
        if bits > 32 {
            self.write_bits(bits - 32, (code >> 32) as u32);
            self.write_bits(32, code as u32);
        } else {
            self.write_bits(bits, code as u32);
        }
    }

    /// Append a signed Exp-Golomb code
    pub fn write_se(&mut self, value: i32) {
        let code = if value > 0 {
            (value as u32) * 2 - 1
        } else {
            value.unsigned_abs().saturating_mul(2)
        };
        self.write_ue(code);
    }

    /// Pad with zero bits to the next byte boundary
    pub fn align(&mut self) {
        self.used = 0;
    }

    /// Number of bits written
    pub fn bit_len(&self) -> usize {
        if self.used == 0 {
            self.bytes.len() * 8
        } else {
            (self.bytes.len() - 1) * 8 + self.used as usize
        }
    }

    /// Finish and return the bytes, zero padded
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}
