//! PES header parsing, reassembly and 33-bit timestamp unwrapping

use bytes::{Bytes, BytesMut};

use crate::error::{DemuxError, Result};

/// 90 kHz timestamps wrap at 2^33
pub const TIMESTAMP_WRAP: u64 = 1 << 33;

/// Fields of a PES packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PesHeader {
    /// stream_id
    pub stream_id: u8,
    /// PES_packet_length; zero means unbounded
    pub packet_length: usize,
    /// Presentation timestamp, 90 kHz, 33 bits
    pub pts: Option<u64>,
    /// Decode timestamp, 90 kHz, 33 bits
    pub dts: Option<u64>,
    /// Offset of the elementary stream payload
    pub payload_offset: usize,
}

impl PesHeader {
    /// Parse the header at the start of a reassembled PES packet
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 6 || data[..3] != [0x00, 0x00, 0x01] {
            return Err(DemuxError::malformed("ts", "PES without start code prefix"));
        }
        let stream_id = data[3];
        let packet_length = u16::from_be_bytes([data[4], data[5]]) as usize;
        if !has_optional_header(stream_id) {
            return Ok(Self {
                stream_id,
                packet_length,
                pts: None,
                dts: None,
                payload_offset: 6,
            });
        }
        if data.len() < 9 {
            return Err(DemuxError::malformed("ts", "PES header truncated"));
        }
        let flags = data[7] >> 6;
        let header_data_length = data[8] as usize;
        let payload_offset = 9 + header_data_length;
        if data.len() < payload_offset {
            return Err(DemuxError::malformed("ts", "PES header data past packet end"));
        }
        let optional = &data[9..payload_offset];
        let (pts, dts) = match flags {
            0b10 if optional.len() >= 5 => (Some(read_timestamp(&optional[..5])), None),
            0b11 if optional.len() >= 10 => {
                let pts = read_timestamp(&optional[..5]);
                (Some(pts), Some(read_timestamp(&optional[5..10])))
            }
            0b00 => (None, None),
            _ => {
                return Err(DemuxError::malformed(
                    "ts",
                    format!("PTS_DTS_flags {flags:02b} with {} header bytes", optional.len()),
                ))
            }
        };
        Ok(Self {
            stream_id,
            packet_length,
            pts,
            dts,
            payload_offset,
        })
    }
}

fn has_optional_header(stream_id: u8) -> bool {
    // program_stream_map, padding, private_stream_2, ECM, EMM, directory, DSMCC, H.222.1 type E
    !matches!(stream_id, 0xBC | 0xBE | 0xBF | 0xF0 | 0xF1 | 0xF2 | 0xF8 | 0xFF)
}

fn read_timestamp(b: &[u8]) -> u64 {
    ((b[0] as u64 >> 1) & 0x07) << 30
        | (b[1] as u64) << 22
        | (b[2] as u64 >> 1) << 15
        | (b[3] as u64) << 7
        | (b[4] as u64) >> 1
}

/// Extends 33-bit timestamps into a monotonic 64-bit timeline
#[derive(Debug, Default, Clone)]
pub struct TimestampUnwrapper {
    last: Option<u64>,
}

impl TimestampUnwrapper {
    /// Create an unwrapper with no history
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a 33-bit value to the candidate closest to the previous one
    pub fn unwrap(&mut self, raw: u64) -> u64 {
        let raw = raw & (TIMESTAMP_WRAP - 1);
        let value = match self.last {
            None => raw,
            Some(last) => {
                let base = last & !(TIMESTAMP_WRAP - 1);
                let candidate = base | raw;
                [
                    candidate.checked_sub(TIMESTAMP_WRAP),
                    Some(candidate),
                    candidate.checked_add(TIMESTAMP_WRAP),
                ]
                .into_iter()
                .flatten()
                .min_by_key(|c| c.abs_diff(last))
                .unwrap_or(candidate)
            }
        };
        self.last = Some(value);
        value
    }

    /// Forget the history
    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// Convert 90 kHz ticks to milliseconds
pub fn ticks_to_ms(ticks: u64) -> u64 {
    ticks / 90
}

/// Collects the payloads of one PES packet across transport packets
#[derive(Debug, Default)]
pub struct PesAssembler {
    buf: BytesMut,
    expected: Option<usize>,
    random_access: bool,
    active: bool,
}

/// A reassembled PES packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PesPacket {
    /// Full packet bytes, header included
    pub data: Bytes,
    /// Random access indicator of the first transport packet
    pub random_access: bool,
}

impl PesAssembler {
    /// Create an idle assembler
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a new packet. Returns the packet it interrupts, if any
    pub fn start(&mut self, payload: &[u8], random_access: bool) -> Result<Option<PesPacket>> {
        let interrupted = self.take_unbounded();
        self.buf.clear();
        self.buf.extend_from_slice(payload);
        self.random_access = random_access;
        self.active = true;
        self.expected = None;
        if payload.len() >= 6 {
            let len = u16::from_be_bytes([payload[4], payload[5]]) as usize;
            if len > 0 {
                self.expected = Some(6 + len);
            }
        }
        interrupted
    }

    /// Append a continuation payload
    pub fn push(&mut self, payload: &[u8]) {
        if self.active {
            self.buf.extend_from_slice(payload);
            if self.expected.is_none() && self.buf.len() >= 6 {
                let len = u16::from_be_bytes([self.buf[4], self.buf[5]]) as usize;
                if len > 0 {
                    self.expected = Some(6 + len);
                }
            }
        }
    }

    /// A bounded packet whose declared length has been reached
    pub fn take_complete(&mut self) -> Option<PesPacket> {
        let expected = self.expected?;
        if self.buf.len() < expected {
            return None;
        }
        self.active = false;
        self.expected = None;
        let data = self.buf.split_to(expected).freeze();
        self.buf.clear();
        Some(PesPacket {
            data,
            random_access: self.random_access,
        })
    }

    /// The in-progress packet at a unit start or end of stream.
    ///
    /// Unbounded packets complete here; a bounded packet that never reached
    /// its declared length is an error.
    pub fn take_unbounded(&mut self) -> Result<Option<PesPacket>> {
        if !self.active {
            return Ok(None);
        }
        self.active = false;
        let data = self.buf.split().freeze();
        if let Some(expected) = self.expected.take() {
            return Err(DemuxError::malformed(
                "ts",
                format!("PES truncated at {} of {} bytes", data.len(), expected),
            ));
        }
        Ok(Some(PesPacket {
            data,
            random_access: self.random_access,
        }))
    }

    /// Abandon the in-progress packet
    pub fn reset(&mut self) {
        self.buf.clear();
        self.expected = None;
        self.active = false;
    }

    /// Bytes held for the in-progress packet
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ts::pes_packet;

    #[test]
    fn test_parse_pts_dts() {
        let data = pes_packet(0xE0, Some(900_000), Some(897_000), &[1, 2, 3], false);
        let header = PesHeader::parse(&data).unwrap();
        assert_eq!(header.stream_id, 0xE0);
        assert_eq!(header.pts, Some(900_000));
        assert_eq!(header.dts, Some(897_000));
        assert_eq!(&data[header.payload_offset..], &[1, 2, 3]);
    }

    #[test]
    fn test_parse_max_timestamp() {
        let data = pes_packet(0xC0, Some(TIMESTAMP_WRAP - 1), None, &[], true);
        let header = PesHeader::parse(&data).unwrap();
        assert_eq!(header.pts, Some(TIMESTAMP_WRAP - 1));
        assert_eq!(header.packet_length, 0);
    }

    #[test]
    fn test_unwrap_across_wrap() {
        let mut unwrapper = TimestampUnwrapper::new();
        assert_eq!(unwrapper.unwrap(TIMESTAMP_WRAP - 9000), TIMESTAMP_WRAP - 9000);
        assert_eq!(unwrapper.unwrap(9000), TIMESTAMP_WRAP + 9000);
        // Slight reordering (B-frames) stays on the same side
        assert_eq!(unwrapper.unwrap(TIMESTAMP_WRAP - 3000), TIMESTAMP_WRAP - 3000);
        assert_eq!(unwrapper.unwrap(12_000), TIMESTAMP_WRAP + 12_000);
        assert_eq!(ticks_to_ms(TIMESTAMP_WRAP + 9000), 95_443_717 + 100);
    }

    #[test]
    fn test_bounded_packet_completes_on_length() {
        let data = pes_packet(0xC0, Some(90), None, &[7; 300], false);
        let mut assembler = PesAssembler::new();
        assert_eq!(assembler.start(&data[..184], false).unwrap(), None);
        assert!(assembler.take_complete().is_none());
        assembler.push(&data[184..]);
        let packet = assembler.take_complete().unwrap();
        assert_eq!(packet.data.len(), data.len());
        assert_eq!(assembler.take_unbounded().unwrap(), None);
    }

    #[test]
    fn test_unbounded_packet_completes_on_next_start() {
        let first = pes_packet(0xE0, Some(0), None, &[1; 10], true);
        let second = pes_packet(0xE0, Some(3600), None, &[2; 10], true);
        let mut assembler = PesAssembler::new();
        assembler.start(&first, true).unwrap();
        assert!(assembler.take_complete().is_none());
        let done = assembler.start(&second, false).unwrap().unwrap();
        assert_eq!(done.data, Bytes::from(first));
        assert!(done.random_access);
        assert_eq!(assembler.buffered(), second.len());
    }

    #[test]
    fn test_truncated_bounded_packet_is_reported() {
        let data = pes_packet(0xC0, Some(90), None, &[7; 300], false);
        let mut assembler = PesAssembler::new();
        assembler.start(&data[..184], false).unwrap();
        assert!(assembler.start(&data[..184], false).is_err());
        // The new packet was still started
        assert_eq!(assembler.buffered(), 184);
    }
}
