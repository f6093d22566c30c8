//! Checked big-endian reader for box and tag headers

use crate::error::BitstreamError;

/// Result type for byte level reads
pub type ByteResult<T> = std::result::Result<T, BitstreamError>;

/// Cursor over a byte slice with fixed-width big-endian reads
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Create a reader at the start of `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes consumed so far
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Whether all bytes have been consumed
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// The unread tail
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    fn take(&mut self, n: usize) -> ByteResult<&'a [u8]> {
        if n > self.remaining() {
            return Err(BitstreamError::Truncated {
                needed: n,
                available: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Peek at the next byte without consuming it
    pub fn peek_u8(&self) -> ByteResult<u8> {
        self.data.get(self.pos).copied().ok_or(BitstreamError::Truncated {
            needed: 1,
            available: 0,
        })
    }

    /// Read one byte
    pub fn read_u8(&mut self) -> ByteResult<u8> {
        Ok(self.take(1)?[0])
    }

    /// Read a big-endian u16
    pub fn read_u16(&mut self) -> ByteResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    /// Read a big-endian 24-bit unsigned value
    pub fn read_u24(&mut self) -> ByteResult<u32> {
        let b = self.take(3)?;
        Ok(((b[0] as u32) << 16) | ((b[1] as u32) << 8) | b[2] as u32)
    }

    /// Read a big-endian 24-bit two's complement value
    pub fn read_i24(&mut self) -> ByteResult<i32> {
        let raw = self.read_u24()?;
        Ok(((raw << 8) as i32) >> 8)
    }

    /// Read a big-endian u32
    pub fn read_u32(&mut self) -> ByteResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a big-endian i32
    pub fn read_i32(&mut self) -> ByteResult<i32> {
        Ok(self.read_u32()? as i32)
    }

    /// Read a big-endian u64
    pub fn read_u64(&mut self) -> ByteResult<u64> {
        let b = self.take(8)?;
        let mut word = [0u8; 8];
        word.copy_from_slice(b);
        Ok(u64::from_be_bytes(word))
    }

    /// Read a big-endian IEEE-754 double
    pub fn read_f64(&mut self) -> ByteResult<f64> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    /// Read a four character code
    pub fn read_fourcc(&mut self) -> ByteResult<[u8; 4]> {
        let b = self.take(4)?;
        Ok([b[0], b[1], b[2], b[3]])
    }

    /// Read `n` raw bytes
    pub fn read_bytes(&mut self, n: usize) -> ByteResult<&'a [u8]> {
        self.take(n)
    }

    /// Skip `n` bytes
    pub fn skip(&mut self, n: usize) -> ByteResult<()> {
        self.take(n).map(|_| ())
    }

    /// Split off a reader over the next `n` bytes
    pub fn sub_reader(&mut self, n: usize) -> ByteResult<ByteReader<'a>> {
        Ok(ByteReader::new(self.take(n)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_width_reads() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A];
        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.read_u8().unwrap(), 0x01);
        assert_eq!(reader.read_u16().unwrap(), 0x0203);
        assert_eq!(reader.read_u24().unwrap(), 0x040506);
        assert_eq!(reader.read_u32().unwrap(), 0x0708090A);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_signed_24_bit() {
        let data = [0xFF, 0xFF, 0xD8, 0x00, 0x00, 0x28];
        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.read_i24().unwrap(), -40);
        assert_eq!(reader.read_i24().unwrap(), 40);
    }

    #[test]
    fn test_truncation() {
        let data = [0x00, 0x01];
        let mut reader = ByteReader::new(&data);
        assert_eq!(
            reader.read_u32(),
            Err(BitstreamError::Truncated { needed: 4, available: 2 })
        );
        // A failed read does not move the cursor
        assert_eq!(reader.read_u16().unwrap(), 1);
    }

    #[test]
    fn test_sub_reader() {
        let data = b"moovtrak";
        let mut reader = ByteReader::new(data);
        let mut sub = reader.sub_reader(4).unwrap();
        assert_eq!(&sub.read_fourcc().unwrap(), b"moov");
        assert!(sub.is_empty());
        assert_eq!(reader.rest(), b"trak");
    }
}
