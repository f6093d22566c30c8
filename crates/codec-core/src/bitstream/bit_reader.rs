//! Exp-Golomb capable bit reader
//!
//! Bits are served from a left-aligned 32-bit cache that is refilled from the
//! underlying byte slice as it drains. Reads past the end return
//! [`BitstreamError::Exhausted`] instead of touching memory beyond the slice.

use crate::error::BitstreamError;

/// Result type for bit level reads
pub type BitResult<T> = std::result::Result<T, BitstreamError>;

/// MSB-first bit reader over a byte slice
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    /// Index of the next byte to move into the cache
    next_byte: usize,
    /// Left-aligned cached bits
    cache: u32,
    /// Number of valid bits in `cache`
    cache_bits: u32,
}

impl<'a> BitReader<'a> {
    /// Create a reader positioned at the first bit of `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            next_byte: 0,
            cache: 0,
            cache_bits: 0,
        }
    }

    /// Number of unread bits
    pub fn bits_left(&self) -> usize {
        self.cache_bits as usize + (self.data.len() - self.next_byte) * 8
    }

    /// Number of bits consumed so far
    pub fn position(&self) -> usize {
        self.next_byte * 8 - self.cache_bits as usize
    }

    /// Whether the reader sits on a byte boundary
    pub fn is_byte_aligned(&self) -> bool {
        self.position() % 8 == 0
    }

    fn refill(&mut self) {
        if self.cache_bits == 0 && self.data.len() - self.next_byte >= 4 {
            let word = &self.data[self.next_byte..self.next_byte + 4];
            self.cache = u32::from_be_bytes([word[0], word[1], word[2], word[3]]);
            self.cache_bits = 32;
            self.next_byte += 4;
            return;
        }
        while self.cache_bits <= 24 && self.next_byte < self.data.len() {
            self.cache |= (self.data[self.next_byte] as u32) << (24 - self.cache_bits);
            self.cache_bits += 8;
            self.next_byte += 1;
        }
    }

    fn exhausted(&self, needed: usize) -> BitstreamError {
        BitstreamError::Exhausted {
            needed,
            available: self.bits_left(),
        }
    }

    /// Read `n` (0..=32) bits as an unsigned value
    pub fn read_bits(&mut self, n: u32) -> BitResult<u32> {
        debug_assert!(n <= 32);
        if n == 0 {
            return Ok(0);
        }
        if n as usize > self.bits_left() {
            return Err(self.exhausted(n as usize));
        }
        if n > 24 {
            let high = self.read_bits(n - 16)?;
            let low = self.read_bits(16)?;
            return Ok((high << 16) | low);
        }
        if self.cache_bits < n {
            self.refill();
        }
        let value = self.cache >> (32 - n);
        self.cache = if n == 32 { 0 } else { self.cache << n };
        self.cache_bits -= n;
        Ok(value)
    }

    /// Read up to 64 bits
    pub fn read_bits_u64(&mut self, n: u32) -> BitResult<u64> {
        debug_assert!(n <= 64);
        if n <= 32 {
            return self.read_bits(n).map(u64::from);
        }
        let high = self.read_bits(n - 32)? as u64;
        let low = self.read_bits(32)? as u64;
        Ok((high << 32) | low)
    }

    /// Read a single bit
    pub fn read_bit(&mut self) -> BitResult<u32> {
        self.read_bits(1)
    }

    /// Read a single bit as a flag
    pub fn read_flag(&mut self) -> BitResult<bool> {
        Ok(self.read_bits(1)? == 1)
    }

    /// Read a byte (need not be aligned)
    pub fn read_u8(&mut self) -> BitResult<u8> {
        Ok(self.read_bits(8)? as u8)
    }

    /// Skip `n` bits
    pub fn skip_bits(&mut self, mut n: usize) -> BitResult<()> {
        if n > self.bits_left() {
            return Err(self.exhausted(n));
        }
        while n > 0 {
            let step = n.min(24) as u32;
            self.read_bits(step)?;
            n -= step as usize;
        }
        Ok(())
    }

    /// Advance to the next byte boundary
    pub fn byte_align(&mut self) -> BitResult<()> {
        let misalign = self.position() % 8;
        if misalign != 0 {
            self.skip_bits(8 - misalign)?;
        }
        Ok(())
    }

    /// Consume zero bits up to (not including) the next one bit and return how many there were
    pub fn read_leading_zeros(&mut self) -> BitResult<u32> {
        let mut zeros = 0u32;
        loop {
            if self.cache_bits == 0 {
                self.refill();
                if self.cache_bits == 0 {
                    return Err(self.exhausted(1));
                }
            }
            if self.cache == 0 {
                zeros += self.cache_bits;
                self.cache_bits = 0;
                continue;
            }
            let lz = self.cache.leading_zeros().min(self.cache_bits);
            zeros += lz;
            self.cache <<= lz;
            self.cache_bits -= lz;
            if self.cache_bits > 0 {
                return Ok(zeros);
            }
        }
    }

    /// Unsigned Exp-Golomb code, `ue(v)`
    pub fn read_ue(&mut self) -> BitResult<u32> {
        let leading_zeros = self.read_leading_zeros()?;
        if leading_zeros > 31 {
            return Err(BitstreamError::ExpGolombOverflow { leading_zeros });
        }
        self.read_bit()?;
        let suffix = self.read_bits(leading_zeros)? as u64;
        Ok(((1u64 << leading_zeros) - 1 + suffix) as u32)
    }

    /// Signed Exp-Golomb code, `se(v)`
    pub fn read_se(&mut self) -> BitResult<i32> {
        let code = self.read_ue()? as i64;
        let value = if code % 2 == 1 { (code + 1) / 2 } else { -(code / 2) };
        Ok(value as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_width_reads_across_refills() {
        let data = [0b1010_1100, 0xFF, 0x00, 0x12, 0x34, 0x56];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bits(3).unwrap(), 0b101);
        assert_eq!(reader.read_bits(5).unwrap(), 0b01100);
        assert_eq!(reader.read_bits(16).unwrap(), 0xFF00);
        assert_eq!(reader.read_bits(24).unwrap(), 0x123456);
        assert_eq!(reader.bits_left(), 0);
    }

    #[test]
    fn test_read_32_bits() {
        let data = [0xDE, 0xAD, 0xBE, 0xEF, 0x80];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bits(32).unwrap(), 0xDEADBEEF);
        assert!(reader.read_flag().unwrap());
    }

    #[test]
    fn test_exp_golomb_codes() {
        // 1 | 010 | 011 | 00100 | 00101 -> ue 0,1,2,3,4
        let data = [0b1010_0110, 0b0100_0010, 0b1000_0000];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_ue().unwrap(), 0);
        assert_eq!(reader.read_ue().unwrap(), 1);
        assert_eq!(reader.read_ue().unwrap(), 2);
        assert_eq!(reader.read_ue().unwrap(), 3);
        assert_eq!(reader.read_ue().unwrap(), 4);
    }

    #[test]
    fn test_signed_exp_golomb() {
        // ue 1 -> +1, ue 2 -> -1, ue 3 -> +2
        let data = [0b0100_1100, 0b1000_0000];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_se().unwrap(), 1);
        assert_eq!(reader.read_se().unwrap(), -1);
        assert_eq!(reader.read_se().unwrap(), 2);
    }

    #[test]
    fn test_long_leading_zero_run() {
        // 20 zeros, a one, then 20 suffix bits of value 5
        let data = [0x00, 0x00, 0x08, 0x00, 0x02, 0x80];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_ue().unwrap(), (1 << 20) - 1 + 5);
    }

    #[test]
    fn test_exhaustion_is_reported() {
        let data = [0xFF];
        let mut reader = BitReader::new(&data);
        assert!(matches!(
            reader.read_bits(9),
            Err(BitstreamError::Exhausted { needed: 9, available: 8 })
        ));
        let zeros = [0x00, 0x00];
        let mut reader = BitReader::new(&zeros);
        assert!(reader.read_ue().is_err());
    }

    #[test]
    fn test_alignment() {
        let data = [0xFF, 0xAB];
        let mut reader = BitReader::new(&data);
        reader.read_bits(3).unwrap();
        assert!(!reader.is_byte_aligned());
        reader.byte_align().unwrap();
        assert_eq!(reader.position(), 8);
        assert_eq!(reader.read_u8().unwrap(), 0xAB);
    }
}
