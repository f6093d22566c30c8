//! Transport descrambling applied to raw container bytes

use crate::error::{DemuxError, Result};

/// Reverses a transport-level scrambling of the byte stream.
///
/// Called once per incoming chunk before any box parsing, with the absolute
/// stream offset of the chunk's first byte. Implementations must produce the
/// same output for a byte regardless of how the stream was chunked.
pub trait Descrambler: Send {
    /// Descramble `data` in place; `offset` is the stream position of `data[0]`
    fn descramble(&mut self, offset: u64, data: &mut [u8]);
}

/// Repeating-key XOR keyed on absolute stream offset
#[derive(Debug, Clone)]
pub struct XorDescrambler {
    key: Vec<u8>,
}

impl XorDescrambler {
    /// Create a descrambler; the key must not be empty
    pub fn new(key: impl Into<Vec<u8>>) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(DemuxError::invalid_config("empty descrambler key"));
        }
        Ok(Self { key })
    }
}

impl Descrambler for XorDescrambler {
    fn descramble(&mut self, offset: u64, data: &mut [u8]) {
        let len = self.key.len() as u64;
        for (i, byte) in data.iter_mut().enumerate() {
            *byte ^= self.key[((offset + i as u64) % len) as usize];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunking_does_not_change_output() {
        let plain: Vec<u8> = (0..=255u8).collect();
        let mut whole = plain.clone();
        XorDescrambler::new(vec![0x5A, 0x01, 0xFF]).unwrap().descramble(0, &mut whole);
        assert_ne!(whole, plain);

        let mut d = XorDescrambler::new(vec![0x5A, 0x01, 0xFF]).unwrap();
        let mut pieces = plain.clone();
        let (a, b) = pieces.split_at_mut(100);
        d.descramble(0, a);
        d.descramble(100, b);
        assert_eq!(pieces, whole);

        // Scrambling twice restores the input
        d.descramble(0, &mut pieces);
        assert_eq!(pieces, plain);
    }

    #[test]
    fn test_empty_key_rejected() {
        assert!(XorDescrambler::new(Vec::new()).is_err());
    }
}
