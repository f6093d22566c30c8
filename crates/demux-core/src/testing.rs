//! Synthetic stream builders for tests in this and downstream crates
//!
//! Every builder produces byte-exact container data around a small set of
//! real parameter sets, so demuxer tests can assert on dimensions and
//! timestamps without shipping media files.

use bytes::Bytes;
use rplay_codec_core::record::{AvcDecoderConfigurationRecord, HevcDecoderConfigurationRecord};
use rplay_codec_core::BitWriter;

/// H.264 Main profile SPS for 640x480
pub const AVC_SPS: [u8; 23] = [
    0x67, 0x4d, 0x40, 0x1e, 0x9a, 0x64, 0x05, 0x01, 0xef, 0xf3, 0x50, 0x10, 0x10, 0x14, 0x00, 0x00,
    0x0f, 0xa0, 0x00, 0x01, 0x38, 0x80, 0x10,
];

/// H.264 PPS matching [`AVC_SPS`]
pub const AVC_PPS: [u8; 4] = [0x68, 0xee, 0x3c, 0x80];

/// H.264 IDR slice (first_mb_in_slice = 0)
pub const AVC_IDR_SLICE: &[u8] = &[0x65, 0x88, 0x84, 0x00, 0x33, 0xFF];

/// H.264 non-IDR slice (first_mb_in_slice = 0)
pub const AVC_P_SLICE: &[u8] = &[0x41, 0x9A, 0x02, 0x0C, 0x80];

/// H.265 VPS for 1920x1080 Main
pub const HEVC_VPS: [u8; 24] = [
    0x40, 0x01, 0x0c, 0x01, 0xff, 0xff, 0x01, 0x60, 0x00, 0x00, 0x03, 0x00, 0x90, 0x00, 0x00, 0x03,
    0x00, 0x00, 0x03, 0x00, 0x78, 0x99, 0x98, 0x09,
];

/// H.265 SPS for 1920x1080 Main
pub const HEVC_SPS: [u8; 42] = [
    0x42, 0x01, 0x01, 0x01, 0x60, 0x00, 0x00, 0x03, 0x00, 0x90, 0x00, 0x00, 0x03, 0x00, 0x00, 0x03,
    0x00, 0x78, 0xa0, 0x03, 0xc0, 0x80, 0x10, 0xe5, 0x96, 0x66, 0x69, 0x24, 0xca, 0xe0, 0x10, 0x00,
    0x00, 0x03, 0x00, 0x10, 0x00, 0x00, 0x03, 0x01, 0xe0, 0x80,
];

/// H.265 PPS with entropy coding sync enabled
pub const HEVC_PPS: [u8; 7] = [0x44, 0x01, 0xc1, 0x72, 0xb4, 0x62, 0x40];

/// H.265 IDR_W_RADL slice (first_slice_segment_in_pic_flag set)
pub const HEVC_IDR_SLICE: &[u8] = &[0x26, 0x01, 0xAF, 0x09, 0x40];

/// H.265 TRAIL_R slice (first_slice_segment_in_pic_flag set)
pub const HEVC_TRAIL_SLICE: &[u8] = &[0x02, 0x01, 0xD0, 0x12, 0x34];

/// Join NAL units with 4-byte start codes
pub fn annex_b(nals: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    for nal in nals {
        out.extend_from_slice(&[0, 0, 0, 1]);
        out.extend_from_slice(nal);
    }
    out
}

/// Join NAL units with big-endian length prefixes of `size` bytes
pub fn length_prefixed(nals: &[&[u8]], size: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for nal in nals {
        let len = (nal.len() as u32).to_be_bytes();
        out.extend_from_slice(&len[4 - size..]);
        out.extend_from_slice(nal);
    }
    out
}

/// `avcC` record for [`AVC_SPS`]/[`AVC_PPS`] declaring `length_size`
pub fn avc_record(length_size: u8) -> Vec<u8> {
    let record = AvcDecoderConfigurationRecord {
        profile: AVC_SPS[1],
        compatibility: AVC_SPS[2],
        level: AVC_SPS[3],
        length_size,
        sps: vec![Bytes::from_static(&AVC_SPS)],
        pps: vec![Bytes::from_static(&AVC_PPS)],
    };
    record.to_bytes().expect("fixture avcC").to_vec()
}

/// `hvcC` record for the HEVC fixtures with 4-byte lengths
pub fn hevc_record() -> Vec<u8> {
    HevcDecoderConfigurationRecord::from_parameter_sets(
        &[Bytes::from_static(&HEVC_VPS)],
        &[Bytes::from_static(&HEVC_SPS)],
        &[Bytes::from_static(&HEVC_PPS)],
    )
    .and_then(|record| record.to_bytes())
    .expect("fixture hvcC")
    .to_vec()
}

/// One AAC-LC ADTS frame without CRC
pub fn adts_frame(sampling_index: u8, channels: u8, payload: &[u8]) -> Vec<u8> {
    let mut w = BitWriter::new();
    w.write_bits(12, 0xFFF);
    w.write_bits(1, 0); // MPEG-4
    w.write_bits(2, 0);
    w.write_flag(true); // protection absent
    w.write_bits(2, 1); // AAC LC
    w.write_bits(4, sampling_index as u32);
    w.write_flag(false);
    w.write_bits(3, channels as u32);
    w.write_bits(4, 0);
    w.write_bits(13, payload.len() as u32 + 7);
    w.write_bits(11, 0x7FF);
    w.write_bits(2, 0);
    let mut out = w.into_bytes();
    out.extend_from_slice(payload);
    out
}

/// AMF0 encoding of script data values
pub mod amf {
    /// Encoded number value
    pub fn number(value: f64) -> Vec<u8> {
        let mut out = vec![0x00];
        out.extend_from_slice(&value.to_be_bytes());
        out
    }

    /// Encoded short string value
    pub fn string(value: &str) -> Vec<u8> {
        let mut out = vec![0x02];
        out.extend_from_slice(&key(value));
        out
    }

    fn key(name: &str) -> Vec<u8> {
        let mut out = (name.len() as u16).to_be_bytes().to_vec();
        out.extend_from_slice(name.as_bytes());
        out
    }

    /// `onMetaData` script body with an ECMA array of properties
    pub fn on_metadata(props: &[(&str, Vec<u8>)]) -> Vec<u8> {
        let mut out = string("onMetaData");
        out.push(0x08);
        out.extend_from_slice(&(props.len() as u32).to_be_bytes());
        for (name, value) in props {
            out.extend(key(name));
            out.extend_from_slice(value);
        }
        out.extend_from_slice(&[0x00, 0x00, 0x09]);
        out
    }
}

/// Builds FLV files tag by tag
#[derive(Debug, Clone)]
pub struct FlvWriter {
    out: Vec<u8>,
    previous_tag_size: u32,
}

impl FlvWriter {
    /// Start a file whose header announces the given tracks
    pub fn new(has_audio: bool, has_video: bool) -> Self {
        let flags = (has_audio as u8) << 2 | has_video as u8;
        Self {
            out: vec![b'F', b'L', b'V', 1, flags, 0, 0, 0, 9],
            previous_tag_size: 0,
        }
    }

    /// Append a tag with an arbitrary type and body
    pub fn raw_tag(&mut self, tag_type: u8, timestamp: u32, body: &[u8]) {
        self.out.extend_from_slice(&self.previous_tag_size.to_be_bytes());
        self.out.push(tag_type);
        self.out.extend_from_slice(&(body.len() as u32).to_be_bytes()[1..]);
        self.out.extend_from_slice(&(timestamp & 0x00FF_FFFF).to_be_bytes()[1..]);
        self.out.push((timestamp >> 24) as u8);
        self.out.extend_from_slice(&[0, 0, 0]);
        self.out.extend_from_slice(body);
        self.previous_tag_size = 11 + body.len() as u32;
    }

    /// Legacy AVC sequence header
    pub fn avc_sequence_header(&mut self, timestamp: u32, record: &[u8]) {
        let mut body = vec![0x17, 0x00, 0, 0, 0];
        body.extend_from_slice(record);
        self.raw_tag(9, timestamp, &body);
    }

    /// Legacy AVC picture with a composition time offset in ms
    pub fn avc_frame(
        &mut self,
        dts: u32,
        composition_time: i32,
        keyframe: bool,
        nals: &[&[u8]],
        length_size: usize,
    ) {
        let first = if keyframe { 0x17 } else { 0x27 };
        let cts = composition_time.to_be_bytes();
        let mut body = vec![first, 0x01, cts[1], cts[2], cts[3]];
        body.extend(length_prefixed(nals, length_size));
        self.raw_tag(9, dts, &body);
    }

    /// Enhanced-RTMP sequence start
    pub fn enhanced_sequence_start(&mut self, timestamp: u32, fourcc: &[u8; 4], record: &[u8]) {
        let mut body = vec![0x90];
        body.extend_from_slice(fourcc);
        body.extend_from_slice(record);
        self.raw_tag(9, timestamp, &body);
    }

    /// Enhanced-RTMP coded frames; `None` composition time uses the short packet type
    pub fn enhanced_frames(
        &mut self,
        timestamp: u32,
        fourcc: &[u8; 4],
        keyframe: bool,
        composition_time: Option<i32>,
        nals: &[&[u8]],
    ) {
        let frame = if keyframe { 0x10 } else { 0x20 };
        let packet_type = if composition_time.is_some() { 1 } else { 3 };
        let mut body = vec![0x80 | frame | packet_type];
        body.extend_from_slice(fourcc);
        if let Some(cts) = composition_time {
            body.extend_from_slice(&cts.to_be_bytes()[1..]);
        }
        body.extend(length_prefixed(nals, 4));
        self.raw_tag(9, timestamp, &body);
    }

    /// AAC AudioSpecificConfig tag
    pub fn aac_config(&mut self, timestamp: u32, asc: &[u8]) {
        let mut body = vec![0xAF, 0x00];
        body.extend_from_slice(asc);
        self.raw_tag(8, timestamp, &body);
    }

    /// Raw AAC access unit
    pub fn aac_frame(&mut self, timestamp: u32, data: &[u8]) {
        let mut body = vec![0xAF, 0x01];
        body.extend_from_slice(data);
        self.raw_tag(8, timestamp, &body);
    }

    /// G.711 samples behind a raw sound flags byte
    pub fn g711(&mut self, timestamp: u32, flags: u8, samples: &[u8]) {
        let mut body = vec![flags];
        body.extend_from_slice(samples);
        self.raw_tag(8, timestamp, &body);
    }

    /// `onMetaData` script tag
    pub fn metadata(&mut self, props: &[(&str, Vec<u8>)]) {
        self.raw_tag(18, 0, &amf::on_metadata(props));
    }

    /// Close the file with the final PreviousTagSize
    pub fn finish(mut self) -> Vec<u8> {
        self.out.extend_from_slice(&self.previous_tag_size.to_be_bytes());
        self.out
    }
}

/// A live-style FLV stream: AAC and AVC configuration, one keyframe carrying
/// in-band SPS/PPS at 0 ms, then `p_frames` predicted pictures every 40 ms and
/// AAC frames every 23 ms up to the last picture.
pub fn flv_av_stream(p_frames: u32) -> Vec<u8> {
    let mut w = FlvWriter::new(true, true);
    w.aac_config(0, &[0x12, 0x10]);
    w.avc_sequence_header(0, &avc_record(4));
    let mut audio_ts = 0;
    for n in 0..=p_frames {
        let ts = n * 40;
        while audio_ts <= ts {
            w.aac_frame(audio_ts, &[0x21, 0x10, 0x04, 0x60, 0x8C, 0x1C]);
            audio_ts += 23;
        }
        if n == 0 {
            w.avc_frame(0, 0, true, &[&AVC_SPS, &AVC_PPS, AVC_IDR_SLICE], 4);
        } else {
            w.avc_frame(ts, 0, false, &[AVC_P_SLICE], 4);
        }
    }
    w.finish()
}

/// MPEG-2 transport stream builders
pub mod ts {
    use std::collections::HashMap;

    use crate::ts::psi::crc32_mpeg2;

    /// Pid carrying the PMT
    pub const PMT_PID: u16 = 0x1000;
    /// Pid of the video stream
    pub const VIDEO_PID: u16 = 0x100;
    /// Pid of the audio stream
    pub const AUDIO_PID: u16 = 0x101;

    fn finish_section(mut section: Vec<u8>) -> Vec<u8> {
        let length = section.len() - 3 + 4;
        section[1] = 0xB0 | (length >> 8) as u8;
        section[2] = length as u8;
        let crc = crc32_mpeg2(&section);
        section.extend_from_slice(&crc.to_be_bytes());
        section
    }

    /// PAT section listing `(program_number, pmt_pid)` entries
    pub fn pat_section(programs: &[(u16, u16)]) -> Vec<u8> {
        let mut section = vec![0x00, 0, 0, 0x00, 0x01, 0xC1, 0x00, 0x00];
        for &(program, pid) in programs {
            section.extend_from_slice(&program.to_be_bytes());
            section.extend_from_slice(&(0xE000 | pid).to_be_bytes());
        }
        finish_section(section)
    }

    /// PMT section for program 1 with `(stream_type, pid, descriptors)` entries
    pub fn pmt_section(pcr_pid: u16, streams: &[(u8, u16, Vec<u8>)]) -> Vec<u8> {
        let mut section = vec![0x02, 0, 0, 0x00, 0x01, 0xC1, 0x00, 0x00];
        section.extend_from_slice(&(0xE000 | pcr_pid).to_be_bytes());
        section.extend_from_slice(&[0xF0, 0x00]);
        for (stream_type, pid, descriptors) in streams {
            section.push(*stream_type);
            section.extend_from_slice(&(0xE000 | pid).to_be_bytes());
            section.extend_from_slice(&(0xF000 | descriptors.len() as u16).to_be_bytes());
            section.extend_from_slice(descriptors);
        }
        finish_section(section)
    }

    fn timestamp(prefix: u8, ts: u64) -> [u8; 5] {
        [
            prefix << 4 | ((ts >> 29) as u8 & 0x0E) | 1,
            (ts >> 22) as u8,
            ((ts >> 14) as u8 & 0xFE) | 1,
            (ts >> 7) as u8,
            ((ts << 1) as u8 & 0xFE) | 1,
        ]
    }

    /// A complete PES packet; `unbounded` writes a zero PES_packet_length
    pub fn pes_packet(
        stream_id: u8,
        pts: Option<u64>,
        dts: Option<u64>,
        payload: &[u8],
        unbounded: bool,
    ) -> Vec<u8> {
        let mut optional = Vec::new();
        let flags = match (pts, dts) {
            (Some(pts), Some(dts)) => {
                optional.extend_from_slice(&timestamp(0x3, pts));
                optional.extend_from_slice(&timestamp(0x1, dts));
                0xC0
            }
            (Some(pts), None) => {
                optional.extend_from_slice(&timestamp(0x2, pts));
                0x80
            }
            _ => 0x00,
        };
        let length = if unbounded {
            0
        } else {
            (3 + optional.len() + payload.len()) as u16
        };
        let mut out = vec![0x00, 0x00, 0x01, stream_id];
        out.extend_from_slice(&length.to_be_bytes());
        out.extend_from_slice(&[0x80, flags, optional.len() as u8]);
        out.extend(optional);
        out.extend_from_slice(payload);
        out
    }

    /// Packetizes PSI and PES data into transport packets of a fixed size
    #[derive(Debug, Clone)]
    pub struct TsWriter {
        size: usize,
        out: Vec<u8>,
        continuity: HashMap<u16, u8>,
    }

    impl TsWriter {
        /// Writer for 188, 192 or 204 byte packets; extra bytes trail each packet
        pub fn new(size: usize) -> Self {
            Self {
                size,
                out: Vec::new(),
                continuity: HashMap::new(),
            }
        }

        /// PAT and PMT for one program with optional video and audio streams
        pub fn program(&mut self, video: Option<u8>, audio: Option<u8>) {
            self.section(0x0000, &pat_section(&[(1, PMT_PID)]));
            let mut streams = Vec::new();
            if let Some(stream_type) = video {
                streams.push((stream_type, VIDEO_PID, Vec::new()));
            }
            if let Some(stream_type) = audio {
                streams.push((stream_type, AUDIO_PID, Vec::new()));
            }
            let pcr_pid = if video.is_some() { VIDEO_PID } else { AUDIO_PID };
            self.section(PMT_PID, &pmt_section(pcr_pid, &streams));
        }

        /// Unbounded video PES (90 kHz timestamps)
        pub fn video_pes(&mut self, pts: u64, dts: Option<u64>, payload: &[u8], random_access: bool) {
            let pes = pes_packet(0xE0, Some(pts), dts, payload, true);
            self.packetize(VIDEO_PID, &pes, random_access);
        }

        /// Bounded audio PES
        pub fn audio_pes(&mut self, pts: u64, payload: &[u8]) {
            let pes = pes_packet(0xC0, Some(pts), None, payload, false);
            self.packetize(AUDIO_PID, &pes, false);
        }

        /// The stream written so far
        pub fn finish(self) -> Vec<u8> {
            self.out
        }

        fn section(&mut self, pid: u16, section: &[u8]) {
            let mut payload = vec![0x00];
            payload.extend_from_slice(section);
            assert!(payload.len() <= 184, "test sections fit one packet");
            payload.resize(184, 0xFF);
            self.packet(pid, true, None, &payload);
        }

        fn packetize(&mut self, pid: u16, data: &[u8], random_access: bool) {
            let mut pos = 0;
            let mut first = true;
            while pos < data.len() {
                let mut adaptation: Option<Vec<u8>> = (first && random_access).then(|| vec![0x40]);
                let overhead = adaptation.as_ref().map_or(0, |a| 1 + a.len());
                let room = 184 - overhead;
                let take = room.min(data.len() - pos);
                let stuffing = room - take;
                if stuffing > 0 {
                    match adaptation.as_mut() {
                        Some(field) => field.resize(field.len() + stuffing, 0xFF),
                        None if stuffing == 1 => adaptation = Some(Vec::new()),
                        None => {
                            let mut field = vec![0x00];
                            field.resize(stuffing - 1, 0xFF);
                            adaptation = Some(field);
                        }
                    }
                }
                self.packet(pid, first, adaptation.as_deref(), &data[pos..pos + take]);
                pos += take;
                first = false;
            }
        }

        fn packet(&mut self, pid: u16, unit_start: bool, adaptation: Option<&[u8]>, payload: &[u8]) {
            let cc = self.continuity.entry(pid).or_insert(0);
            let counter = *cc;
            *cc = (*cc + 1) & 0x0F;
            let control = if adaptation.is_some() { 0x30 } else { 0x10 };
            let start = self.out.len();
            self.out.push(0x47);
            self.out.push((unit_start as u8) << 6 | (pid >> 8) as u8 & 0x1F);
            self.out.push(pid as u8);
            self.out.push(control | counter);
            if let Some(field) = adaptation {
                self.out.push(field.len() as u8);
                self.out.extend_from_slice(field);
            }
            self.out.extend_from_slice(payload);
            debug_assert_eq!(self.out.len() - start, 188);
            self.out.resize(start + self.size, 0x00);
        }
    }
}

/// ISO base media file format builders
pub mod mp4 {
    /// A plain box
    pub fn mp4_box(kind: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut out = ((body.len() + 8) as u32).to_be_bytes().to_vec();
        out.extend_from_slice(kind);
        out.extend_from_slice(body);
        out
    }

    /// A full box with version and flags
    pub fn full_box(kind: &[u8; 4], version: u8, flags: u32, body: &[u8]) -> Vec<u8> {
        let mut content = vec![version];
        content.extend_from_slice(&flags.to_be_bytes()[1..]);
        content.extend_from_slice(body);
        mp4_box(kind, &content)
    }

    fn u32s(values: &[u32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_be_bytes()).collect()
    }

    /// `ftyp` for a CMAF-style stream
    pub fn ftyp() -> Vec<u8> {
        mp4_box(b"ftyp", b"iso6\x00\x00\x00\x00iso6mp41")
    }

    /// `moov` with the given `trak` boxes and `(track_id, default_duration, default_flags)` trex entries
    pub fn moov(traks: &[Vec<u8>], trex: &[(u32, u32, u32)]) -> Vec<u8> {
        let mut mvhd = u32s(&[0, 0, 1000, 0, 0x0001_0000]);
        mvhd.extend_from_slice(&[0x01, 0x00, 0, 0]);
        mvhd.extend_from_slice(&[0; 8]);
        mvhd.extend(u32s(&[0x0001_0000, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000]));
        mvhd.extend_from_slice(&[0; 24]);
        mvhd.extend(u32s(&[traks.len() as u32 + 1]));
        let mut body = full_box(b"mvhd", 0, 0, &mvhd);
        for trak in traks {
            body.extend_from_slice(trak);
        }
        if !trex.is_empty() {
            let entries: Vec<u8> = trex
                .iter()
                .flat_map(|&(id, duration, flags)| full_box(b"trex", 0, 0, &u32s(&[id, 1, duration, 0, flags])))
                .collect();
            body.extend(mp4_box(b"mvex", &entries));
        }
        mp4_box(b"moov", &body)
    }

    fn trak(id: u32, timescale: u32, handler: &[u8; 4], media_header: Vec<u8>, entry: &[u8]) -> Vec<u8> {
        let mut tkhd = u32s(&[0, 0, id, 0, 0, 0, 0]);
        tkhd.extend_from_slice(&[0; 8]);
        tkhd.extend(u32s(&[0x0001_0000, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000]));
        tkhd.extend(u32s(&[0, 0]));
        let mdhd = {
            let mut body = u32s(&[0, 0, timescale, 0]);
            body.extend_from_slice(&[0x55, 0xC4, 0, 0]);
            full_box(b"mdhd", 0, 0, &body)
        };
        let hdlr = {
            let mut body = u32s(&[0]);
            body.extend_from_slice(handler);
            body.extend_from_slice(&[0; 12]);
            body.extend_from_slice(b"rplay\0");
            full_box(b"hdlr", 0, 0, &body)
        };
        let mut stsd = u32s(&[1]);
        stsd.extend_from_slice(entry);
        let stbl = [
            full_box(b"stsd", 0, 0, &stsd),
            full_box(b"stts", 0, 0, &u32s(&[0])),
            full_box(b"stsc", 0, 0, &u32s(&[0])),
            full_box(b"stsz", 0, 0, &u32s(&[0, 0])),
            full_box(b"stco", 0, 0, &u32s(&[0])),
        ]
        .concat();
        let dinf = mp4_box(b"dinf", &full_box(b"dref", 0, 0, &[u32s(&[1]), full_box(b"url ", 0, 1, &[])].concat()));
        let minf = mp4_box(b"minf", &[media_header, dinf, mp4_box(b"stbl", &stbl)].concat());
        let mdia = mp4_box(b"mdia", &[mdhd, hdlr, minf].concat());
        mp4_box(b"trak", &[full_box(b"tkhd", 0, 3, &tkhd), mdia].concat())
    }

    /// Video `trak` whose sample entry carries `record` in a `record_fourcc` box
    pub fn video_trak(id: u32, timescale: u32, entry_fourcc: &[u8; 4], record_fourcc: &[u8; 4], record: &[u8]) -> Vec<u8> {
        let mut entry = vec![0; 6];
        entry.extend_from_slice(&1u16.to_be_bytes());
        entry.extend_from_slice(&[0; 16]);
        entry.extend_from_slice(&640u16.to_be_bytes());
        entry.extend_from_slice(&480u16.to_be_bytes());
        entry.extend(u32s(&[0x0048_0000, 0x0048_0000, 0]));
        entry.extend_from_slice(&1u16.to_be_bytes());
        entry.extend_from_slice(&[0; 32]);
        entry.extend_from_slice(&[0x00, 0x18, 0xFF, 0xFF]);
        entry.extend(mp4_box(record_fourcc, record));
        let vmhd = full_box(b"vmhd", 0, 1, &[0; 8]);
        trak(id, timescale, b"vide", vmhd, &mp4_box(entry_fourcc, &entry))
    }

    /// Audio `trak` around a complete sample entry box
    pub fn audio_trak(id: u32, timescale: u32, entry_box: &[u8]) -> Vec<u8> {
        let smhd = full_box(b"smhd", 0, 0, &[0; 4]);
        trak(id, timescale, b"soun", smhd, entry_box)
    }

    fn descriptor(tag: u8, body: &[u8]) -> Vec<u8> {
        let mut out = vec![tag, body.len() as u8];
        out.extend_from_slice(body);
        out
    }

    /// `mp4a` sample entry; an empty `asc` omits the DecoderSpecificInfo
    pub fn mp4a_entry(channels: u16, sample_rate: u32, object_type: u8, asc: &[u8]) -> Vec<u8> {
        let mut entry = vec![0; 6];
        entry.extend_from_slice(&1u16.to_be_bytes());
        entry.extend_from_slice(&[0; 8]);
        entry.extend_from_slice(&channels.to_be_bytes());
        entry.extend_from_slice(&16u16.to_be_bytes());
        entry.extend_from_slice(&[0; 4]);
        entry.extend_from_slice(&(sample_rate << 16).to_be_bytes());

        let mut config = vec![object_type, 0x15, 0, 0, 0];
        config.extend(u32s(&[128_000, 128_000]));
        if !asc.is_empty() {
            config.extend(descriptor(0x05, asc));
        }
        let mut es = vec![0x00, 0x01, 0x00];
        es.extend(descriptor(0x04, &config));
        es.extend(descriptor(0x06, &[0x02]));
        entry.extend(full_box(b"esds", 0, 0, &descriptor(0x03, &es)));
        mp4_box(b"mp4a", &entry)
    }

    /// One `trun` row; `None` fields are left out of the run
    #[derive(Debug, Clone, Copy, Default)]
    pub struct RunRow {
        /// sample_duration
        pub duration: Option<u32>,
        /// sample_size
        pub size: Option<u32>,
        /// sample_flags
        pub flags: Option<u32>,
        /// sample_composition_time_offset
        pub composition_offset: Option<i32>,
    }

    /// Field-level description of a `traf`
    #[derive(Debug, Clone, Default)]
    pub struct TrafLayout {
        /// track_ID
        pub track_id: u32,
        /// tfhd base_data_offset
        pub base_data_offset: Option<u64>,
        /// tfhd default_sample_duration
        pub default_duration: Option<u32>,
        /// tfhd default_sample_size
        pub default_size: Option<u32>,
        /// tfhd default_sample_flags
        pub default_flags: Option<u32>,
        /// tfhd default-base-is-moof
        pub default_base_is_moof: bool,
        /// tfdt baseMediaDecodeTime
        pub base_decode_time: Option<u64>,
        /// trun data_offset
        pub data_offset: Option<i32>,
        /// trun first_sample_flags
        pub first_sample_flags: Option<u32>,
        /// trun rows
        pub rows: Vec<RunRow>,
        /// Write a version 1 `trun` (signed composition offsets)
        pub signed_offsets: bool,
    }

    fn traf(layout: &TrafLayout) -> Vec<u8> {
        let mut tfhd_flags = 0;
        let mut tfhd = u32s(&[layout.track_id]);
        if let Some(offset) = layout.base_data_offset {
            tfhd_flags |= 0x01;
            tfhd.extend_from_slice(&offset.to_be_bytes());
        }
        for (flag, value) in [
            (0x08, layout.default_duration),
            (0x10, layout.default_size),
            (0x20, layout.default_flags),
        ] {
            if let Some(value) = value {
                tfhd_flags |= flag;
                tfhd.extend(u32s(&[value]));
            }
        }
        if layout.default_base_is_moof {
            tfhd_flags |= 0x02_0000;
        }
        let mut body = full_box(b"tfhd", 0, tfhd_flags, &tfhd);
        if let Some(time) = layout.base_decode_time {
            body.extend(full_box(b"tfdt", 1, 0, &time.to_be_bytes()));
        }

        let rows = &layout.rows;
        let has = |f: fn(&RunRow) -> bool| rows.iter().any(f);
        let mut trun_flags = 0;
        let mut trun = u32s(&[rows.len() as u32]);
        if let Some(offset) = layout.data_offset {
            trun_flags |= 0x0001;
            trun.extend_from_slice(&offset.to_be_bytes());
        }
        if let Some(flags) = layout.first_sample_flags {
            trun_flags |= 0x0004;
            trun.extend(u32s(&[flags]));
        }
        let (durations, sizes) = (has(|r| r.duration.is_some()), has(|r| r.size.is_some()));
        let (flags, offsets) = (has(|r| r.flags.is_some()), has(|r| r.composition_offset.is_some()));
        trun_flags |= (durations as u32) * 0x0100
            | (sizes as u32) * 0x0200
            | (flags as u32) * 0x0400
            | (offsets as u32) * 0x0800;
        for row in rows {
            if durations {
                trun.extend(u32s(&[row.duration.unwrap_or(0)]));
            }
            if sizes {
                trun.extend(u32s(&[row.size.unwrap_or(0)]));
            }
            if flags {
                trun.extend(u32s(&[row.flags.unwrap_or(0)]));
            }
            if offsets {
                trun.extend_from_slice(&row.composition_offset.unwrap_or(0).to_be_bytes());
            }
        }
        body.extend(full_box(b"trun", layout.signed_offsets as u8, trun_flags, &trun));
        mp4_box(b"traf", &body)
    }

    /// `moof` with one `traf` per layout
    pub fn moof(sequence: u32, trafs: &[TrafLayout]) -> Vec<u8> {
        let mut body = full_box(b"mfhd", 0, 0, &u32s(&[sequence]));
        for layout in trafs {
            body.extend(traf(layout));
        }
        mp4_box(b"moof", &body)
    }

    /// One sample of a [`Traf`]
    #[derive(Debug, Clone)]
    pub struct Sample {
        data: Vec<u8>,
        flags: Option<u32>,
        composition_offset: Option<i32>,
    }

    impl Sample {
        /// A sync sample
        pub fn new(data: Vec<u8>) -> Self {
            Self {
                data,
                flags: None,
                composition_offset: None,
            }
        }

        /// Mark the sample as not a sync sample
        pub fn non_sync(mut self) -> Self {
            self.flags = Some(0x0001_0000);
            self
        }

        /// Set the composition offset in track ticks
        pub fn composition_offset(mut self, offset: i32) -> Self {
            self.composition_offset = Some(offset);
            self
        }
    }

    /// A track's samples within one media segment
    #[derive(Debug, Clone)]
    pub struct Traf {
        track_id: u32,
        base_decode_time: Option<u64>,
        samples: Vec<Sample>,
    }

    impl Traf {
        /// Samples for `track_id`; durations come from `trex`
        pub fn new(track_id: u32, base_decode_time: Option<u64>, samples: Vec<Sample>) -> Self {
            Self {
                track_id,
                base_decode_time,
                samples,
            }
        }

        fn layout(&self, data_offset: i32) -> TrafLayout {
            TrafLayout {
                track_id: self.track_id,
                default_base_is_moof: true,
                base_decode_time: self.base_decode_time,
                data_offset: Some(data_offset),
                rows: self
                    .samples
                    .iter()
                    .map(|s| RunRow {
                        duration: None,
                        size: Some(s.data.len() as u32),
                        flags: s.flags,
                        composition_offset: s.composition_offset,
                    })
                    .collect(),
                signed_offsets: self.samples.iter().any(|s| s.composition_offset.map_or(false, |o| o < 0)),
                ..Default::default()
            }
        }
    }

    /// `moof` plus `mdat`, with each run's data offset pointing into the `mdat`
    pub fn media_segment(sequence: u32, trafs: &[Traf]) -> Vec<u8> {
        let placeholder: Vec<TrafLayout> = trafs.iter().map(|t| t.layout(0)).collect();
        let moof_len = moof(sequence, &placeholder).len();
        let mut offset = moof_len + 8;
        let mut layouts = Vec::new();
        let mut mdat = Vec::new();
        for traf in trafs {
            layouts.push(traf.layout(offset as i32));
            for sample in &traf.samples {
                mdat.extend_from_slice(&sample.data);
                offset += sample.data.len();
            }
        }
        let mut out = moof(sequence, &layouts);
        out.extend(mp4_box(b"mdat", &mdat));
        out
    }
}

/// MPEG-4 Part 2 visual segments, each with its `00 00 01 xx` prefix
pub mod mpeg4 {
    use rplay_codec_core::mpeg4::VopType;
    use rplay_codec_core::BitWriter;

    fn segment(code: u8, body: &[u8]) -> Vec<u8> {
        let mut out = vec![0x00, 0x00, 0x01, code];
        out.extend_from_slice(body);
        out
    }

    /// next_start_code(): a zero bit then ones up to the byte boundary
    fn stuff(w: &mut BitWriter) {
        w.write_flag(false);
        while w.bit_len() % 8 != 0 {
            w.write_flag(true);
        }
    }

    /// Visual object sequence header
    pub fn vos(profile_level: u8) -> Vec<u8> {
        segment(0xB0, &[profile_level])
    }

    /// Visual object header followed by video object start code 0
    pub fn vo() -> Vec<u8> {
        let mut out = segment(0xB5, &[0x09]);
        out.extend(segment(0x00, &[]));
        out
    }

    /// Rectangular simple-profile video object layer
    pub fn vol(width: u32, height: u32, resolution: u32, increment: u32) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.write_flag(false);
        w.write_bits(8, 1); // simple object
        w.write_flag(true);
        w.write_bits(4, 2);
        w.write_bits(3, 1);
        w.write_bits(4, 1); // square pixels
        w.write_flag(false);
        w.write_bits(2, 0); // rectangular
        w.write_flag(true);
        w.write_bits(16, resolution);
        w.write_flag(true);
        w.write_flag(true); // fixed_vop_rate
        let bits = (32 - (resolution - 1).leading_zeros()).max(1);
        w.write_bits(bits, increment);
        w.write_flag(true);
        w.write_bits(13, width);
        w.write_flag(true);
        w.write_bits(13, height);
        w.write_flag(true);
        w.write_bits(4, 0b0100);
        stuff(&mut w);
        segment(0x20, &w.into_bytes())
    }

    /// Closed group of VOPs at time code zero
    pub fn gov() -> Vec<u8> {
        segment(0xB3, &[0x00, 0x10, 0x27])
    }

    /// VOP of the given coding type followed by `body`
    pub fn vop(coding: VopType, body: &[u8]) -> Vec<u8> {
        let bits = match coding {
            VopType::I => 0,
            VopType::P => 1,
            VopType::B => 2,
            VopType::S => 3,
        };
        let mut content = vec![bits << 6 | 0x10];
        content.extend_from_slice(body);
        segment(0xB6, &content)
    }
}
