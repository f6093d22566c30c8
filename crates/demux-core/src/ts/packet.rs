//! Transport packet header, adaptation field and packet size detection

use crate::error::{DemuxError, Result};

/// Sync byte opening every transport packet
pub const SYNC_BYTE: u8 = 0x47;
/// Transport packet length without trailing extras
pub const TS_PACKET_LEN: usize = 188;
/// Recognized on-wire packet sizes: plain, M2TS/timestamped, Reed-Solomon
pub const PACKET_SIZES: [usize; 3] = [188, 192, 204];
/// PID of the program association table
pub const PAT_PID: u16 = 0x0000;
/// Null packet PID
pub const NULL_PID: u16 = 0x1FFF;

const LARGEST_PACKET: usize = 204;

/// Outcome of a packet size probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeProbe {
    /// Three sync bytes found at `offset` spaced `size` apart
    Found { offset: usize, size: usize },
    /// Not decidable yet; the first `discard` bytes can never start a packet
    NeedMoreData { discard: usize },
}

/// Locate three consecutive sync bytes spaced 188, 192 or 204 bytes apart.
///
/// A position is only judged once bytes for every candidate size are present,
/// so the outcome does not depend on how the input was chunked.
pub fn probe_packet_size(data: &[u8]) -> SizeProbe {
    let mut offset = 0;
    while offset + 2 * LARGEST_PACKET < data.len() {
        if data[offset] == SYNC_BYTE {
            for size in PACKET_SIZES {
                if data[offset + size] == SYNC_BYTE && data[offset + 2 * size] == SYNC_BYTE {
                    return SizeProbe::Found { offset, size };
                }
            }
        }
        offset += 1;
    }
    SizeProbe::NeedMoreData { discard: offset }
}

/// Fields of the 4-byte packet header plus the adaptation field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// transport_error_indicator
    pub transport_error: bool,
    /// payload_unit_start_indicator
    pub payload_unit_start: bool,
    /// Packet identifier
    pub pid: u16,
    /// transport_scrambling_control
    pub scrambling: u8,
    /// continuity_counter
    pub continuity_counter: u8,
    /// A payload follows the header
    pub has_payload: bool,
    /// Adaptation field contents, if present
    pub adaptation: Option<AdaptationField>,
    /// Offset of the payload within the packet
    pub payload_offset: usize,
}

/// The subset of the adaptation field the demuxer uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdaptationField {
    /// discontinuity_indicator
    pub discontinuity: bool,
    /// random_access_indicator
    pub random_access: bool,
    /// Program clock reference in 27 MHz units
    pub pcr: Option<u64>,
}

impl PacketHeader {
    /// Parse a 188-byte packet
    pub fn parse(packet: &[u8]) -> Result<Self> {
        if packet.len() < TS_PACKET_LEN || packet[0] != SYNC_BYTE {
            return Err(DemuxError::malformed("ts", "packet without sync byte"));
        }
        let pid = ((packet[1] as u16 & 0x1F) << 8) | packet[2] as u16;
        let control = (packet[3] >> 4) & 0x03;
        let has_adaptation = control & 0x02 != 0;
        let has_payload = control & 0x01 != 0;
        let mut payload_offset = 4;
        let mut adaptation = None;
        if has_adaptation {
            let len = packet[4] as usize;
            let max = if has_payload { 182 } else { 183 };
            if len > max {
                return Err(DemuxError::malformed(
                    "ts",
                    format!("adaptation field length {len} on pid {pid}"),
                ));
            }
            adaptation = Some(AdaptationField::parse(&packet[5..5 + len]));
            payload_offset = 5 + len;
        }
        Ok(Self {
            transport_error: packet[1] & 0x80 != 0,
            payload_unit_start: packet[1] & 0x40 != 0,
            pid,
            scrambling: packet[3] >> 6,
            continuity_counter: packet[3] & 0x0F,
            has_payload,
            adaptation,
            payload_offset,
        })
    }

    /// Whether the random access indicator is set
    pub fn random_access(&self) -> bool {
        self.adaptation.map_or(false, |a| a.random_access)
    }

    /// Whether the discontinuity indicator is set
    pub fn discontinuity(&self) -> bool {
        self.adaptation.map_or(false, |a| a.discontinuity)
    }
}

impl AdaptationField {
    fn parse(field: &[u8]) -> Self {
        let Some(&flags) = field.first() else {
            return Self::default();
        };
        let pcr = if flags & 0x10 != 0 && field.len() >= 7 {
            let b = &field[1..7];
            let base = (b[0] as u64) << 25
                | (b[1] as u64) << 17
                | (b[2] as u64) << 9
                | (b[3] as u64) << 1
                | (b[4] as u64) >> 7;
            let extension = ((b[4] as u64 & 0x01) << 8) | b[5] as u64;
            Some(base * 300 + extension)
        } else {
            None
        };
        Self {
            discontinuity: flags & 0x80 != 0,
            random_access: flags & 0x40 != 0,
            pcr,
        }
    }
}
