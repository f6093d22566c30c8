//! Movie fragment box: `tfhd`, `tfdt` and `trun`

use super::boxes::{children, full_box};
use crate::error::Result;

mod tfhd_flags {
    pub const BASE_DATA_OFFSET: u32 = 0x00_0001;
    pub const SAMPLE_DESCRIPTION_INDEX: u32 = 0x00_0002;
    pub const DEFAULT_SAMPLE_DURATION: u32 = 0x00_0008;
    pub const DEFAULT_SAMPLE_SIZE: u32 = 0x00_0010;
    pub const DEFAULT_SAMPLE_FLAGS: u32 = 0x00_0020;
    pub const DURATION_IS_EMPTY: u32 = 0x01_0000;
    pub const DEFAULT_BASE_IS_MOOF: u32 = 0x02_0000;
}

mod trun_flags {
    pub const DATA_OFFSET: u32 = 0x0001;
    pub const FIRST_SAMPLE_FLAGS: u32 = 0x0004;
    pub const SAMPLE_DURATION: u32 = 0x0100;
    pub const SAMPLE_SIZE: u32 = 0x0200;
    pub const SAMPLE_FLAGS: u32 = 0x0400;
    pub const SAMPLE_COMPOSITION_OFFSET: u32 = 0x0800;
}

/// Track fragment header
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FragmentHeader {
    /// track_ID
    pub track_id: u32,
    /// Explicit base data offset
    pub base_data_offset: Option<u64>,
    /// sample_description_index override
    pub sample_description_index: Option<u32>,
    /// default_sample_duration override
    pub default_sample_duration: Option<u32>,
    /// default_sample_size override
    pub default_sample_size: Option<u32>,
    /// default_sample_flags override
    pub default_sample_flags: Option<u32>,
    /// duration-is-empty flag
    pub duration_is_empty: bool,
    /// default-base-is-moof flag
    pub default_base_is_moof: bool,
}

/// One sample row of a `trun`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSample {
    /// sample_duration
    pub duration: Option<u32>,
    /// sample_size
    pub size: Option<u32>,
    /// sample_flags
    pub flags: Option<u32>,
    /// sample_composition_time_offset, sign-extended for version 1
    pub composition_offset: i64,
}

/// Track run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackRun {
    /// data_offset relative to the fragment base
    pub data_offset: Option<i32>,
    /// first_sample_flags
    pub first_sample_flags: Option<u32>,
    /// Sample rows
    pub samples: Vec<RunSample>,
}

/// Track fragment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackFragment {
    /// `tfhd`
    pub header: FragmentHeader,
    /// `tfdt` baseMediaDecodeTime
    pub base_decode_time: Option<u64>,
    /// `trun` boxes in order
    pub runs: Vec<TrackRun>,
}

/// Parse the body of a `moof` box into its track fragments
pub fn parse_moof(body: &[u8]) -> Result<Vec<TrackFragment>> {
    let mut fragments = Vec::new();
    for child in children(body) {
        let (kind, traf) = child?;
        if &kind != b"traf" {
            continue;
        }
        let mut fragment = TrackFragment::default();
        let mut has_header = false;
        for entry in children(traf) {
            let (kind, data) = entry?;
            match &kind {
                b"tfhd" => {
                    fragment.header = parse_tfhd(data)?;
                    has_header = true;
                }
                b"tfdt" => fragment.base_decode_time = Some(parse_tfdt(data)?),
                b"trun" => fragment.runs.push(parse_trun(data)?),
                _ => {}
            }
        }
        if has_header {
            fragments.push(fragment);
        }
    }
    Ok(fragments)
}

fn parse_tfhd(body: &[u8]) -> Result<FragmentHeader> {
    let (_, flags, mut r) = full_box(body)?;
    let mut header = FragmentHeader {
        track_id: r.read_u32()?,
        duration_is_empty: flags & tfhd_flags::DURATION_IS_EMPTY != 0,
        default_base_is_moof: flags & tfhd_flags::DEFAULT_BASE_IS_MOOF != 0,
        ..Default::default()
    };
    if flags & tfhd_flags::BASE_DATA_OFFSET != 0 {
        header.base_data_offset = Some(r.read_u64()?);
    }
    if flags & tfhd_flags::SAMPLE_DESCRIPTION_INDEX != 0 {
        header.sample_description_index = Some(r.read_u32()?);
    }
    if flags & tfhd_flags::DEFAULT_SAMPLE_DURATION != 0 {
        header.default_sample_duration = Some(r.read_u32()?);
    }
    if flags & tfhd_flags::DEFAULT_SAMPLE_SIZE != 0 {
        header.default_sample_size = Some(r.read_u32()?);
    }
    if flags & tfhd_flags::DEFAULT_SAMPLE_FLAGS != 0 {
        header.default_sample_flags = Some(r.read_u32()?);
    }
    Ok(header)
}

fn parse_tfdt(body: &[u8]) -> Result<u64> {
    let (version, _, mut r) = full_box(body)?;
    Ok(if version == 1 {
        r.read_u64()?
    } else {
        r.read_u32()? as u64
    })
}

fn parse_trun(body: &[u8]) -> Result<TrackRun> {
    let (version, flags, mut r) = full_box(body)?;
    let count = r.read_u32()? as usize;
    let mut run = TrackRun::default();
    if flags & trun_flags::DATA_OFFSET != 0 {
        run.data_offset = Some(r.read_i32()?);
    }
    if flags & trun_flags::FIRST_SAMPLE_FLAGS != 0 {
        run.first_sample_flags = Some(r.read_u32()?);
    }
    let row_len = [
        trun_flags::SAMPLE_DURATION,
        trun_flags::SAMPLE_SIZE,
        trun_flags::SAMPLE_FLAGS,
        trun_flags::SAMPLE_COMPOSITION_OFFSET,
    ]
    .iter()
    .filter(|&&f| flags & f != 0)
    .count()
        * 4;
    // Bound the allocation by what the box can actually hold
    let capacity = if row_len == 0 { count.min(4096) } else { count.min(r.remaining() / row_len) };
    run.samples.reserve(capacity);
    for _ in 0..count {
        let mut sample = RunSample::default();
        if flags & trun_flags::SAMPLE_DURATION != 0 {
            sample.duration = Some(r.read_u32()?);
        }
        if flags & trun_flags::SAMPLE_SIZE != 0 {
            sample.size = Some(r.read_u32()?);
        }
        if flags & trun_flags::SAMPLE_FLAGS != 0 {
            sample.flags = Some(r.read_u32()?);
        }
        if flags & trun_flags::SAMPLE_COMPOSITION_OFFSET != 0 {
            let raw = r.read_u32()?;
            sample.composition_offset = if version == 0 {
                raw as i64
            } else {
                raw as i32 as i64
            };
        }
        run.samples.push(sample);
    }
    Ok(run)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mp4::{self, RunRow, TrafLayout};

    #[test]
    fn test_parse_full_traf() {
        let traf = TrafLayout {
            track_id: 2,
            base_data_offset: Some(1000),
            default_duration: Some(3000),
            default_size: None,
            default_flags: Some(0x0101_0000),
            default_base_is_moof: false,
            base_decode_time: Some(1 << 40),
            data_offset: Some(-8),
            first_sample_flags: Some(0x0200_0000),
            rows: vec![
                RunRow {
                    size: Some(10),
                    composition_offset: Some(-3000),
                    ..Default::default()
                },
                RunRow {
                    size: Some(20),
                    composition_offset: Some(6000),
                    ..Default::default()
                },
            ],
            signed_offsets: true,
        };
        let moof = mp4::moof(1, &[traf]);
        let fragments = parse_moof(&moof[8..]).unwrap();
        assert_eq!(fragments.len(), 1);
        let f = &fragments[0];
        assert_eq!(f.header.track_id, 2);
        assert_eq!(f.header.base_data_offset, Some(1000));
        assert_eq!(f.header.default_sample_duration, Some(3000));
        assert_eq!(f.header.default_sample_flags, Some(0x0101_0000));
        assert_eq!(f.base_decode_time, Some(1 << 40));
        let run = &f.runs[0];
        assert_eq!(run.data_offset, Some(-8));
        assert_eq!(run.first_sample_flags, Some(0x0200_0000));
        assert_eq!(run.samples.len(), 2);
        assert_eq!(run.samples[0].composition_offset, -3000);
        assert_eq!(run.samples[1].size, Some(20));
        assert_eq!(run.samples[1].duration, None);
    }

    #[test]
    fn test_truncated_trun_is_an_error() {
        let traf = TrafLayout {
            track_id: 1,
            rows: vec![RunRow {
                size: Some(10),
                ..Default::default()
            }],
            ..Default::default()
        };
        let mut moof = mp4::moof(1, &[traf]);
        // Claim one more sample than the run holds
        let pos = moof.windows(4).position(|w| w == b"trun").unwrap() + 8;
        moof[pos + 3] = 2;
        assert!(parse_moof(&moof[8..]).is_err());
    }
}
