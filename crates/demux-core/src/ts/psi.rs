//! Program specific information: section reassembly, PAT and PMT

use tracing::trace;

use crate::error::{DemuxError, Result};

/// Stream type codes from the PMT
pub mod stream_type {
    /// MPEG-1 audio
    pub const MPEG1_AUDIO: u8 = 0x03;
    /// MPEG-2 audio
    pub const MPEG2_AUDIO: u8 = 0x04;
    /// Private PES data (AC-3 when tagged by a descriptor)
    pub const PRIVATE_PES: u8 = 0x06;
    /// AAC with ADTS framing
    pub const AAC_ADTS: u8 = 0x0F;
    /// AAC with LOAS/LATM framing
    pub const AAC_LATM: u8 = 0x11;
    /// H.264
    pub const H264: u8 = 0x1B;
    /// H.265
    pub const H265: u8 = 0x24;
    /// ATSC AC-3
    pub const AC3: u8 = 0x81;
    /// G.711 A-law, as used by surveillance cameras
    pub const ALAW: u8 = 0x90;
}

const TABLE_PAT: u8 = 0x00;
const TABLE_PMT: u8 = 0x02;
const DESCRIPTOR_REGISTRATION: u8 = 0x05;
const DESCRIPTOR_AC3: u8 = 0x6A;
const DESCRIPTOR_ENHANCED_AC3: u8 = 0x7A;

const fn crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u32) << 24;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ 0x04C1_1DB7
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static CRC_TABLE: [u32; 256] = crc_table();

/// CRC-32/MPEG-2 (no reflection, no final xor)
pub fn crc32_mpeg2(data: &[u8]) -> u32 {
    data.iter().fold(0xFFFF_FFFF, |crc, &b| {
        (crc << 8) ^ CRC_TABLE[((crc >> 24) ^ b as u32) as usize]
    })
}

/// Reassembles PSI sections that span transport packets
#[derive(Debug, Default)]
pub struct SectionAssembler {
    buf: Vec<u8>,
    active: bool,
}

impl SectionAssembler {
    /// Create an idle assembler
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one packet payload; returns the sections it completes
    pub fn push(&mut self, unit_start: bool, payload: &[u8]) -> Vec<Vec<u8>> {
        let mut sections = Vec::new();
        if unit_start {
            let Some((&pointer, rest)) = payload.split_first() else {
                self.reset();
                return sections;
            };
            let pointer = pointer as usize;
            if pointer > rest.len() {
                trace!("PSI pointer field {} past packet end", pointer);
                self.reset();
                return sections;
            }
            if self.active {
                self.buf.extend_from_slice(&rest[..pointer]);
                self.drain(&mut sections);
            }
            self.buf.clear();
            self.active = true;
            self.buf.extend_from_slice(&rest[pointer..]);
        } else if self.active {
            self.buf.extend_from_slice(payload);
        }
        self.drain(&mut sections);
        sections
    }

    fn drain(&mut self, sections: &mut Vec<Vec<u8>>) {
        while self.active && self.buf.len() >= 3 {
            if self.buf[0] == 0xFF {
                // Stuffing up to the end of the packet
                self.reset();
                return;
            }
            let total = 3 + (((self.buf[1] as usize) & 0x0F) << 8 | self.buf[2] as usize);
            if self.buf.len() < total {
                return;
            }
            sections.push(self.buf.drain(..total).collect());
        }
    }

    /// Forget any partial section
    pub fn reset(&mut self) {
        self.buf.clear();
        self.active = false;
    }
}

/// Validate the section's syntax and CRC; returns the table body
/// (after the 8-byte long header, before the CRC)
fn section_body(section: &[u8], table_id: u8) -> Result<&[u8]> {
    if section.len() < 12 {
        return Err(DemuxError::malformed("ts", "PSI section too short"));
    }
    if section[0] != table_id {
        return Err(DemuxError::malformed(
            "ts",
            format!("table id 0x{:02x}, expected 0x{:02x}", section[0], table_id),
        ));
    }
    if section[1] & 0x80 == 0 {
        return Err(DemuxError::malformed("ts", "PSI section without syntax indicator"));
    }
    if crc32_mpeg2(section) != 0 {
        return Err(DemuxError::malformed(
            "ts",
            format!("CRC mismatch on table 0x{table_id:02x}"),
        ));
    }
    Ok(&section[8..section.len() - 4])
}

/// Version number of a long-form section
pub fn section_version(section: &[u8]) -> Option<u8> {
    section.get(5).map(|b| (b >> 1) & 0x1F)
}

/// Parse a PAT section; returns the PMT pid of the first real program
pub fn parse_pat(section: &[u8]) -> Result<Option<u16>> {
    let body = section_body(section, TABLE_PAT)?;
    Ok(body.chunks_exact(4).find_map(|entry| {
        let program = u16::from_be_bytes([entry[0], entry[1]]);
        let pid = ((entry[2] as u16 & 0x1F) << 8) | entry[3] as u16;
        // Program 0 points at the network information table
        (program != 0).then_some(pid)
    }))
}

/// One elementary stream entry from a PMT
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PmtStream {
    /// stream_type
    pub stream_type: u8,
    /// Elementary pid
    pub pid: u16,
    /// Whether an AC-3 descriptor tags private data as AC-3
    pub ac3_descriptor: bool,
}

/// Parsed program map table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pmt {
    /// Version number
    pub version: u8,
    /// PCR pid
    pub pcr_pid: u16,
    /// Elementary streams in table order
    pub streams: Vec<PmtStream>,
}

/// Parse a PMT section
pub fn parse_pmt(section: &[u8]) -> Result<Pmt> {
    let body = section_body(section, TABLE_PMT)?;
    if body.len() < 4 {
        return Err(DemuxError::malformed("ts", "PMT too short"));
    }
    let pcr_pid = ((body[0] as u16 & 0x1F) << 8) | body[1] as u16;
    let info_len = ((body[2] as usize & 0x0F) << 8) | body[3] as usize;
    let mut rest = body
        .get(4 + info_len..)
        .ok_or_else(|| DemuxError::malformed("ts", "PMT program info past section end"))?;
    let mut streams = Vec::new();
    while rest.len() >= 5 {
        let stream_type = rest[0];
        let pid = ((rest[1] as u16 & 0x1F) << 8) | rest[2] as u16;
        let es_info_len = ((rest[3] as usize & 0x0F) << 8) | rest[4] as usize;
        let descriptors = rest
            .get(5..5 + es_info_len)
            .ok_or_else(|| DemuxError::malformed("ts", "PMT ES info past section end"))?;
        streams.push(PmtStream {
            stream_type,
            pid,
            ac3_descriptor: has_ac3_descriptor(descriptors),
        });
        rest = &rest[5 + es_info_len..];
    }
    Ok(Pmt {
        version: section_version(section).unwrap_or(0),
        pcr_pid,
        streams,
    })
}

fn has_ac3_descriptor(mut descriptors: &[u8]) -> bool {
    while descriptors.len() >= 2 {
        let tag = descriptors[0];
        let len = descriptors[1] as usize;
        let Some(body) = descriptors.get(2..2 + len) else {
            return false;
        };
        match tag {
            DESCRIPTOR_AC3 | DESCRIPTOR_ENHANCED_AC3 => return true,
            DESCRIPTOR_REGISTRATION if body.starts_with(b"AC-3") => return true,
            _ => {}
        }
        descriptors = &descriptors[2 + len..];
    }
    false
}
