//! H.264 NAL unit types and sequence parameter set parsing

use tracing::trace;

use super::nal::strip_emulation_prevention;
use crate::bitstream::BitReader;
use crate::error::{CodecError, Result};

/// H.264 NAL unit type numbers
pub mod nal_type {
    /// Non-IDR slice
    pub const SLICE: u8 = 1;
    /// Slice data partition A
    pub const SLICE_DPA: u8 = 2;
    /// Slice data partition B
    pub const SLICE_DPB: u8 = 3;
    /// Slice data partition C
    pub const SLICE_DPC: u8 = 4;
    /// IDR slice
    pub const IDR: u8 = 5;
    /// Supplemental enhancement information
    pub const SEI: u8 = 6;
    /// Sequence parameter set
    pub const SPS: u8 = 7;
    /// Picture parameter set
    pub const PPS: u8 = 8;
    /// Access unit delimiter
    pub const AUD: u8 = 9;
    /// End of sequence
    pub const END_OF_SEQUENCE: u8 = 10;
    /// End of stream
    pub const END_OF_STREAM: u8 = 11;
    /// Filler data
    pub const FILLER: u8 = 12;
}

/// NAL unit type from the first header byte
pub fn nal_type(header: u8) -> u8 {
    header & 0x1F
}

/// Whether the type carries slice data
pub fn is_slice(nal_type: u8) -> bool {
    (nal_type::SLICE..=nal_type::IDR).contains(&nal_type)
}

/// Whether the type starts a random access point
pub fn is_keyframe(nal_type: u8) -> bool {
    nal_type == nal_type::IDR
}

/// Whether a slice NAL begins a new picture (`first_mb_in_slice == 0`)
pub fn is_first_slice(nal: &[u8]) -> bool {
    // ue(v) == 0 is the single bit `1`
    nal.len() > 1 && is_slice(nal_type(nal[0])) && nal[1] & 0x80 != 0
}

/// Fields of a sequence parameter set
#[derive(Debug, Clone, PartialEq)]
pub struct Sps {
    /// profile_idc
    pub profile_idc: u8,
    /// constraint_set flags byte
    pub constraint_flags: u8,
    /// level_idc
    pub level_idc: u8,
    /// seq_parameter_set_id
    pub sps_id: u32,
    /// chroma_format_idc (1 = 4:2:0 when absent)
    pub chroma_format_idc: u8,
    /// Luma bit depth
    pub bit_depth_luma: u8,
    /// Chroma bit depth
    pub bit_depth_chroma: u8,
    /// frame_mbs_only_flag
    pub frame_mbs_only: bool,
    /// Frame cropping offsets: left, right, top, bottom
    pub crop: [u32; 4],
    /// Cropped width in pixels
    pub width: u32,
    /// Cropped height in pixels
    pub height: u32,
    /// Sample aspect ratio from the VUI
    pub sample_aspect_ratio: Option<(u16, u16)>,
    /// Frame rate from the VUI timing info
    pub frame_rate: Option<f64>,
}

#[derive(Debug, Default)]
struct Vui {
    sample_aspect_ratio: Option<(u16, u16)>,
    frame_rate: Option<f64>,
}

const HIGH_PROFILES: [u8; 13] = [100, 110, 122, 244, 44, 83, 86, 118, 128, 138, 139, 134, 135];

impl Sps {
    /// Parse an SPS NAL unit, header byte included
    pub fn parse(nal: &[u8]) -> Result<Self> {
        let header = *nal
            .first()
            .ok_or_else(|| CodecError::invalid_syntax("sps", "empty NAL unit"))?;
        if nal_type(header) != nal_type::SPS {
            return Err(CodecError::UnexpectedNalType {
                nal_type: nal_type(header),
                expected: "H.264 SPS",
            });
        }
        let rbsp = strip_emulation_prevention(&nal[1..]);
        let mut r = BitReader::new(&rbsp);

        let profile_idc = r.read_u8()?;
        let constraint_flags = r.read_u8()?;
        let level_idc = r.read_u8()?;
        let sps_id = r.read_ue()?;
        if sps_id > 31 {
            return Err(CodecError::invalid_syntax("seq_parameter_set_id", sps_id.to_string()));
        }

        let mut chroma_format_idc = 1u32;
        let mut separate_colour_plane = false;
        let mut bit_depth_luma = 8u32;
        let mut bit_depth_chroma = 8u32;
        if HIGH_PROFILES.contains(&profile_idc) {
            chroma_format_idc = r.read_ue()?;
            if chroma_format_idc > 3 {
                return Err(CodecError::invalid_syntax(
                    "chroma_format_idc",
                    chroma_format_idc.to_string(),
                ));
            }
            if chroma_format_idc == 3 {
                separate_colour_plane = r.read_flag()?;
            }
            bit_depth_luma = 8 + r.read_ue()?;
            bit_depth_chroma = 8 + r.read_ue()?;
            if bit_depth_luma > 14 || bit_depth_chroma > 14 {
                return Err(CodecError::invalid_syntax(
                    "bit_depth",
                    format!("{bit_depth_luma}/{bit_depth_chroma}"),
                ));
            }
            r.skip_bits(1)?; // qpprime_y_zero_transform_bypass_flag
            if r.read_flag()? {
                let lists = if chroma_format_idc == 3 { 12 } else { 8 };
                for i in 0..lists {
                    if r.read_flag()? {
                        skip_scaling_list(&mut r, if i < 6 { 16 } else { 64 })?;
                    }
                }
            }
        }

        r.read_ue()?; // log2_max_frame_num_minus4
        match r.read_ue()? {
            0 => {
                r.read_ue()?; // log2_max_pic_order_cnt_lsb_minus4
            }
            1 => {
                r.skip_bits(1)?; // delta_pic_order_always_zero_flag
                r.read_se()?;
                r.read_se()?;
                let cycle = r.read_ue()?;
                if cycle > 255 {
                    return Err(CodecError::invalid_syntax(
                        "num_ref_frames_in_pic_order_cnt_cycle",
                        cycle.to_string(),
                    ));
                }
                for _ in 0..cycle {
                    r.read_se()?;
                }
            }
            2 => {}
            other => {
                return Err(CodecError::invalid_syntax("pic_order_cnt_type", other.to_string()));
            }
        }
        r.read_ue()?; // max_num_ref_frames
        r.skip_bits(1)?; // gaps_in_frame_num_value_allowed_flag
        let width_in_mbs = r.read_ue()? as u64 + 1;
        let height_in_map_units = r.read_ue()? as u64 + 1;
        let frame_mbs_only = r.read_flag()?;
        if !frame_mbs_only {
            r.skip_bits(1)?; // mb_adaptive_frame_field_flag
        }
        r.skip_bits(1)?; // direct_8x8_inference_flag
        let mut crop = [0u32; 4];
        if r.read_flag()? {
            for offset in crop.iter_mut() {
                *offset = r.read_ue()?;
            }
        }
        // Damaged VUI does not invalidate the geometry
        let vui = if r.read_flag()? {
            parse_vui(&mut r).unwrap_or_else(|e| {
                trace!("Ignoring unparseable H.264 VUI: {}", e);
                Vui::default()
            })
        } else {
            Vui::default()
        };

        let chroma_array_type = if separate_colour_plane { 0 } else { chroma_format_idc };
        let (sub_width, sub_height) = match chroma_array_type {
            1 => (2, 2),
            2 => (2, 1),
            _ => (1, 1),
        };
        let field_factor = if frame_mbs_only { 1 } else { 2 };
        let crop_x = sub_width * (crop[0] as u64 + crop[1] as u64);
        let crop_y = sub_height * field_factor * (crop[2] as u64 + crop[3] as u64);
        let coded_width = width_in_mbs * 16;
        let coded_height = field_factor * height_in_map_units * 16;
        if crop_x >= coded_width || crop_y >= coded_height || coded_width > u32::MAX as u64 {
            return Err(CodecError::invalid_syntax(
                "frame_cropping",
                format!("{crop:?} exceeds {coded_width}x{coded_height}"),
            ));
        }

        Ok(Self {
            profile_idc,
            constraint_flags,
            level_idc,
            sps_id,
            chroma_format_idc: chroma_format_idc as u8,
            bit_depth_luma: bit_depth_luma as u8,
            bit_depth_chroma: bit_depth_chroma as u8,
            frame_mbs_only,
            crop,
            width: (coded_width - crop_x) as u32,
            height: (coded_height - crop_y) as u32,
            sample_aspect_ratio: vui.sample_aspect_ratio,
            frame_rate: vui.frame_rate,
        })
    }
}

fn skip_scaling_list(r: &mut BitReader<'_>, size: usize) -> Result<()> {
    let mut last = 8i32;
    let mut next = 8i32;
    for _ in 0..size {
        if next != 0 {
            let delta = r.read_se()?;
            next = (last + delta + 256).rem_euclid(256);
        }
        if next != 0 {
            last = next;
        }
    }
    Ok(())
}

fn parse_vui(r: &mut BitReader<'_>) -> Result<Vui> {
    let mut vui = Vui::default();
    if r.read_flag()? {
        let aspect_ratio_idc = r.read_u8()?;
        vui.sample_aspect_ratio = match aspect_ratio_idc {
            255 => Some((r.read_bits(16)? as u16, r.read_bits(16)? as u16)),
            idc => sar_from_idc(idc),
        };
    }
    if r.read_flag()? {
        r.skip_bits(1)?; // overscan_appropriate_flag
    }
    if r.read_flag()? {
        r.skip_bits(4)?; // video_format, video_full_range_flag
        if r.read_flag()? {
            r.skip_bits(24)?; // colour primaries, transfer, matrix
        }
    }
    if r.read_flag()? {
        r.read_ue()?;
        r.read_ue()?;
    }
    if r.read_flag()? {
        let num_units_in_tick = r.read_bits(32)?;
        let time_scale = r.read_bits(32)?;
        r.skip_bits(1)?; // fixed_frame_rate_flag
        if num_units_in_tick > 0 && time_scale > 0 {
            vui.frame_rate = Some(time_scale as f64 / (2.0 * num_units_in_tick as f64));
        }
    }
    Ok(vui)
}

/// Predefined sample aspect ratios shared by H.264 and H.265 VUI
pub(crate) fn sar_from_idc(idc: u8) -> Option<(u16, u16)> {
    const TABLE: [(u16, u16); 16] = [
        (1, 1),
        (12, 11),
        (10, 11),
        (16, 11),
        (40, 33),
        (24, 11),
        (20, 11),
        (32, 11),
        (80, 33),
        (18, 11),
        (15, 11),
        (64, 33),
        (160, 99),
        (4, 3),
        (3, 2),
        (2, 1),
    ];
    match idc {
        1..=16 => Some(TABLE[idc as usize - 1]),
        _ => None,
    }
}
