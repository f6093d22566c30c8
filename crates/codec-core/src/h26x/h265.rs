//! H.265 NAL unit types and VPS/SPS/PPS parsing
//!
//! Only the fields needed to build an HEVC decoder configuration record and
//! to describe the stream are kept. Everything between the conformance window
//! and the VUI timing info still has to be walked, because the VUI sits after
//! the reference picture set syntax.

use tracing::trace;

use super::h264::sar_from_idc;
use super::nal::strip_emulation_prevention;
use crate::bitstream::BitReader;
use crate::error::{CodecError, Result};

/// H.265 NAL unit type numbers
pub mod nal_type {
    /// Trailing picture, non-reference
    pub const TRAIL_N: u8 = 0;
    /// Trailing picture, reference
    pub const TRAIL_R: u8 = 1;
    /// Broken link access, with leading pictures
    pub const BLA_W_LP: u8 = 16;
    /// Broken link access, with RADL pictures
    pub const BLA_W_RADL: u8 = 17;
    /// Broken link access, no leading pictures
    pub const BLA_N_LP: u8 = 18;
    /// IDR, with RADL pictures
    pub const IDR_W_RADL: u8 = 19;
    /// IDR, no leading pictures
    pub const IDR_N_LP: u8 = 20;
    /// Clean random access
    pub const CRA: u8 = 21;
    /// Video parameter set
    pub const VPS: u8 = 32;
    /// Sequence parameter set
    pub const SPS: u8 = 33;
    /// Picture parameter set
    pub const PPS: u8 = 34;
    /// Access unit delimiter
    pub const AUD: u8 = 35;
    /// End of sequence
    pub const EOS: u8 = 36;
    /// End of bitstream
    pub const EOB: u8 = 37;
    /// Filler data
    pub const FD: u8 = 38;
    /// Prefix SEI
    pub const PREFIX_SEI: u8 = 39;
    /// Suffix SEI
    pub const SUFFIX_SEI: u8 = 40;
}

const MAX_SHORT_TERM_REF_PIC_SETS: u32 = 64;
const MAX_DELTA_POCS: u32 = 32;

/// NAL unit type from the first header byte
pub fn nal_type(header: u8) -> u8 {
    (header >> 1) & 0x3F
}

/// Whether the type is a VCL (slice segment) NAL unit
pub fn is_vcl(nal_type: u8) -> bool {
    nal_type < 32
}

/// Whether the type is an intra random access point (BLA, IDR or CRA)
pub fn is_keyframe(nal_type: u8) -> bool {
    (nal_type::BLA_W_LP..=nal_type::CRA).contains(&nal_type)
}

/// Whether a slice segment NAL begins a new picture
pub fn is_first_slice(nal: &[u8]) -> bool {
    nal.len() > 2 && is_vcl(nal_type(nal[0])) && nal[2] & 0x80 != 0
}

/// General profile, tier and level
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileTierLevel {
    /// general_profile_space
    pub profile_space: u8,
    /// general_tier_flag
    pub tier_flag: bool,
    /// general_profile_idc
    pub profile_idc: u8,
    /// general_profile_compatibility_flags
    pub compatibility_flags: u32,
    /// The 48 constraint indicator bits
    pub constraint_flags: u64,
    /// general_level_idc
    pub level_idc: u8,
}

impl ProfileTierLevel {
    fn parse(r: &mut BitReader<'_>, max_sub_layers_minus1: u8) -> Result<Self> {
        let profile_space = r.read_bits(2)? as u8;
        let tier_flag = r.read_flag()?;
        let profile_idc = r.read_bits(5)? as u8;
        let compatibility_flags = r.read_bits(32)?;
        let constraint_flags = r.read_bits_u64(48)?;
        let level_idc = r.read_u8()?;

        let sub_layers = max_sub_layers_minus1 as usize;
        let mut profile_present = [false; 8];
        let mut level_present = [false; 8];
        for i in 0..sub_layers {
            profile_present[i] = r.read_flag()?;
            level_present[i] = r.read_flag()?;
        }
        if sub_layers > 0 {
            r.skip_bits(2 * (8 - sub_layers))?;
        }
        for i in 0..sub_layers {
            if profile_present[i] {
                r.skip_bits(88)?;
            }
            if level_present[i] {
                r.skip_bits(8)?;
            }
        }

        Ok(Self {
            profile_space,
            tier_flag,
            profile_idc,
            compatibility_flags,
            constraint_flags,
            level_idc,
        })
    }
}

fn rbsp(nal: &[u8], expected: u8, name: &'static str) -> Result<Vec<u8>> {
    if nal.len() < 2 {
        return Err(CodecError::invalid_syntax(name, "NAL unit shorter than its header"));
    }
    let found = nal_type(nal[0]);
    if found != expected {
        return Err(CodecError::UnexpectedNalType {
            nal_type: found,
            expected: name,
        });
    }
    Ok(strip_emulation_prevention(&nal[2..]))
}

/// Video parameter set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vps {
    /// vps_video_parameter_set_id
    pub vps_id: u8,
    /// vps_max_sub_layers_minus1 + 1
    pub max_sub_layers: u8,
    /// vps_temporal_id_nesting_flag
    pub temporal_id_nesting: bool,
    /// Profile, tier and level
    pub profile_tier_level: ProfileTierLevel,
}

impl Vps {
    /// Parse a VPS NAL unit, 2-byte header included
    pub fn parse(nal: &[u8]) -> Result<Self> {
        let data = rbsp(nal, nal_type::VPS, "H.265 VPS")?;
        let mut r = BitReader::new(&data);
        let vps_id = r.read_bits(4)? as u8;
        r.skip_bits(2)?; // base layer internal / available
        r.skip_bits(6)?; // vps_max_layers_minus1
        let max_sub_layers_minus1 = r.read_bits(3)? as u8;
        if max_sub_layers_minus1 > 6 {
            return Err(CodecError::invalid_syntax(
                "vps_max_sub_layers_minus1",
                max_sub_layers_minus1.to_string(),
            ));
        }
        let temporal_id_nesting = r.read_flag()?;
        r.skip_bits(16)?; // vps_reserved_0xffff_16bits
        let profile_tier_level = ProfileTierLevel::parse(&mut r, max_sub_layers_minus1)?;
        Ok(Self {
            vps_id,
            max_sub_layers: max_sub_layers_minus1 + 1,
            temporal_id_nesting,
            profile_tier_level,
        })
    }
}

/// Sequence parameter set
#[derive(Debug, Clone, PartialEq)]
pub struct Sps {
    /// sps_video_parameter_set_id
    pub vps_id: u8,
    /// sps_max_sub_layers_minus1 + 1
    pub max_sub_layers: u8,
    /// sps_temporal_id_nesting_flag
    pub temporal_id_nesting: bool,
    /// Profile, tier and level
    pub profile_tier_level: ProfileTierLevel,
    /// sps_seq_parameter_set_id
    pub sps_id: u32,
    /// chroma_format_idc
    pub chroma_format_idc: u8,
    /// pic_width_in_luma_samples
    pub coded_width: u32,
    /// pic_height_in_luma_samples
    pub coded_height: u32,
    /// Width after the conformance window
    pub width: u32,
    /// Height after the conformance window
    pub height: u32,
    /// Luma bit depth
    pub bit_depth_luma: u8,
    /// Chroma bit depth
    pub bit_depth_chroma: u8,
    /// Sample aspect ratio from the VUI
    pub sample_aspect_ratio: Option<(u16, u16)>,
    /// Frame rate from the VUI timing info
    pub frame_rate: Option<f64>,
    /// min_spatial_segmentation_idc from the VUI bitstream restriction (0 when absent)
    pub min_spatial_segmentation_idc: u16,
}

#[derive(Debug, Default)]
struct Vui {
    sample_aspect_ratio: Option<(u16, u16)>,
    frame_rate: Option<f64>,
    min_spatial_segmentation_idc: u16,
}

impl Sps {
    /// Parse an SPS NAL unit, 2-byte header included
    pub fn parse(nal: &[u8]) -> Result<Self> {
        let data = rbsp(nal, nal_type::SPS, "H.265 SPS")?;
        let mut r = BitReader::new(&data);

        let vps_id = r.read_bits(4)? as u8;
        let max_sub_layers_minus1 = r.read_bits(3)? as u8;
        if max_sub_layers_minus1 > 6 {
            return Err(CodecError::invalid_syntax(
                "sps_max_sub_layers_minus1",
                max_sub_layers_minus1.to_string(),
            ));
        }
        let temporal_id_nesting = r.read_flag()?;
        let profile_tier_level = ProfileTierLevel::parse(&mut r, max_sub_layers_minus1)?;

        let sps_id = r.read_ue()?;
        if sps_id > 15 {
            return Err(CodecError::invalid_syntax("sps_seq_parameter_set_id", sps_id.to_string()));
        }
        let chroma_format_idc = r.read_ue()?;
        if chroma_format_idc > 3 {
            return Err(CodecError::invalid_syntax(
                "chroma_format_idc",
                chroma_format_idc.to_string(),
            ));
        }
        let separate_colour_plane = chroma_format_idc == 3 && r.read_flag()?;
        let coded_width = r.read_ue()?;
        let coded_height = r.read_ue()?;
        if coded_width == 0 || coded_height == 0 {
            return Err(CodecError::invalid_syntax(
                "pic_size",
                format!("{coded_width}x{coded_height}"),
            ));
        }
        let mut window = [0u32; 4];
        if r.read_flag()? {
            for offset in window.iter_mut() {
                *offset = r.read_ue()?;
            }
        }
        let bit_depth_luma = 8 + r.read_ue()?;
        let bit_depth_chroma = 8 + r.read_ue()?;
        if bit_depth_luma > 16 || bit_depth_chroma > 16 {
            return Err(CodecError::invalid_syntax(
                "bit_depth",
                format!("{bit_depth_luma}/{bit_depth_chroma}"),
            ));
        }

        let (sub_width, sub_height) = match (chroma_format_idc, separate_colour_plane) {
            (1, _) => (2u64, 2u64),
            (2, _) => (2, 1),
            _ => (1, 1),
        };
        let crop_x = sub_width * (window[0] as u64 + window[1] as u64);
        let crop_y = sub_height * (window[2] as u64 + window[3] as u64);
        if crop_x >= coded_width as u64 || crop_y >= coded_height as u64 {
            return Err(CodecError::invalid_syntax(
                "conformance_window",
                format!("{window:?} exceeds {coded_width}x{coded_height}"),
            ));
        }

        // The rest only contributes VUI hints; a failure there keeps the geometry
        let vui = parse_tail(&mut r, max_sub_layers_minus1).unwrap_or_else(|e| {
            trace!("Ignoring unparseable H.265 SPS tail: {}", e);
            Vui::default()
        });

        Ok(Self {
            vps_id,
            max_sub_layers: max_sub_layers_minus1 + 1,
            temporal_id_nesting,
            profile_tier_level,
            sps_id,
            chroma_format_idc: chroma_format_idc as u8,
            coded_width,
            coded_height,
            width: (coded_width as u64 - crop_x) as u32,
            height: (coded_height as u64 - crop_y) as u32,
            bit_depth_luma: bit_depth_luma as u8,
            bit_depth_chroma: bit_depth_chroma as u8,
            sample_aspect_ratio: vui.sample_aspect_ratio,
            frame_rate: vui.frame_rate,
            min_spatial_segmentation_idc: vui.min_spatial_segmentation_idc,
        })
    }
}

/// Walk from log2_max_pic_order_cnt_lsb to the VUI
fn parse_tail(r: &mut BitReader<'_>, max_sub_layers_minus1: u8) -> Result<Vui> {
    let log2_max_poc_lsb = r.read_ue()? + 4;
    if log2_max_poc_lsb > 16 {
        return Err(CodecError::invalid_syntax(
            "log2_max_pic_order_cnt_lsb_minus4",
            (log2_max_poc_lsb - 4).to_string(),
        ));
    }
    let ordering_info_for_all = r.read_flag()?;
    let first = if ordering_info_for_all { 0 } else { max_sub_layers_minus1 };
    for _ in first..=max_sub_layers_minus1 {
        r.read_ue()?; // sps_max_dec_pic_buffering_minus1
        r.read_ue()?; // sps_max_num_reorder_pics
        r.read_ue()?; // sps_max_latency_increase_plus1
    }
    for _ in 0..6 {
        // coding block, transform block and hierarchy depth sizes
        r.read_ue()?;
    }
    if r.read_flag()? && r.read_flag()? {
        skip_scaling_list_data(r)?;
    }
    r.skip_bits(2)?; // amp, sample_adaptive_offset
    if r.read_flag()? {
        r.skip_bits(8)?; // pcm sample bit depths
        r.read_ue()?;
        r.read_ue()?;
        r.skip_bits(1)?; // pcm_loop_filter_disabled_flag
    }
    let num_short_term_ref_pic_sets = r.read_ue()?;
    if num_short_term_ref_pic_sets > MAX_SHORT_TERM_REF_PIC_SETS {
        return Err(CodecError::invalid_syntax(
            "num_short_term_ref_pic_sets",
            num_short_term_ref_pic_sets.to_string(),
        ));
    }
    let mut num_delta_pocs = Vec::with_capacity(num_short_term_ref_pic_sets as usize);
    for idx in 0..num_short_term_ref_pic_sets as usize {
        let count = skip_short_term_ref_pic_set(r, idx, &num_delta_pocs)?;
        num_delta_pocs.push(count);
    }
    if r.read_flag()? {
        let num_long_term = r.read_ue()?;
        if num_long_term > 32 {
            return Err(CodecError::invalid_syntax(
                "num_long_term_ref_pics_sps",
                num_long_term.to_string(),
            ));
        }
        for _ in 0..num_long_term {
            r.skip_bits(log2_max_poc_lsb as usize + 1)?;
        }
    }
    r.skip_bits(2)?; // temporal mvp, strong intra smoothing
    if r.read_flag()? {
        parse_vui(r, max_sub_layers_minus1)
    } else {
        Ok(Vui::default())
    }
}

fn skip_scaling_list_data(r: &mut BitReader<'_>) -> Result<()> {
    for size_id in 0..4u32 {
        let step = if size_id == 3 { 3 } else { 1 };
        for _ in (0..6).step_by(step) {
            if !r.read_flag()? {
                r.read_ue()?; // scaling_list_pred_matrix_id_delta
                continue;
            }
            let coefficients = 64.min(1 << (4 + (size_id << 1)));
            if size_id > 1 {
                r.read_se()?; // scaling_list_dc_coef_minus8
            }
            for _ in 0..coefficients {
                r.read_se()?;
            }
        }
    }
    Ok(())
}

/// Skip one st_ref_pic_set and return its NumDeltaPocs
fn skip_short_term_ref_pic_set(r: &mut BitReader<'_>, idx: usize, previous: &[u32]) -> Result<u32> {
    let inter_ref_pic_set_prediction = idx != 0 && r.read_flag()?;
    if inter_ref_pic_set_prediction {
        // In the SPS the reference set is always the previous one
        r.skip_bits(1)?; // delta_rps_sign
        r.read_ue()?; // abs_delta_rps_minus1
        let reference = previous[idx - 1];
        let mut count = 0;
        for _ in 0..=reference {
            let used_by_curr_pic = r.read_flag()?;
            let use_delta = used_by_curr_pic || r.read_flag()?;
            if use_delta {
                count += 1;
            }
        }
        return Ok(count);
    }
    let negative = r.read_ue()?;
    let positive = r.read_ue()?;
    if negative > MAX_DELTA_POCS || positive > MAX_DELTA_POCS {
        return Err(CodecError::invalid_syntax(
            "st_ref_pic_set",
            format!("{negative} negative, {positive} positive pictures"),
        ));
    }
    for _ in 0..negative + positive {
        r.read_ue()?; // delta_poc_minus1
        r.skip_bits(1)?; // used_by_curr_pic_flag
    }
    Ok(negative + positive)
}

fn parse_vui(r: &mut BitReader<'_>, max_sub_layers_minus1: u8) -> Result<Vui> {
    let mut vui = Vui::default();
    if r.read_flag()? {
        vui.sample_aspect_ratio = match r.read_u8()? {
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
            r.skip_bits(24)?;
        }
    }
    if r.read_flag()? {
        r.read_ue()?;
        r.read_ue()?;
    }
    r.skip_bits(3)?; // neutral_chroma, field_seq, frame_field_info
    if r.read_flag()? {
        for _ in 0..4 {
            r.read_ue()?; // default display window
        }
    }
    if r.read_flag()? {
        let num_units_in_tick = r.read_bits(32)?;
        let time_scale = r.read_bits(32)?;
        if num_units_in_tick > 0 && time_scale > 0 {
            vui.frame_rate = Some(time_scale as f64 / num_units_in_tick as f64);
        }
        if r.read_flag()? {
            r.read_ue()?; // num_ticks_poc_diff_one_minus1
        }
        if r.read_flag()? {
            // Keep the timing even if the HRD is damaged
            if let Err(e) = skip_hrd_parameters(r, max_sub_layers_minus1) {
                trace!("Stopping VUI parse at HRD parameters: {}", e);
                return Ok(vui);
            }
        }
    }
    match read_min_spatial_segmentation(r) {
        Ok(idc) => vui.min_spatial_segmentation_idc = idc,
        Err(e) => trace!("Stopping VUI parse at bitstream restriction: {}", e),
    }
    Ok(vui)
}

fn read_min_spatial_segmentation(r: &mut BitReader<'_>) -> Result<u16> {
    if !r.read_flag()? {
        return Ok(0);
    }
    r.skip_bits(3)?; // tiles_fixed_structure, mv over boundaries, restricted ref lists
    Ok(r.read_ue()?.min(4095) as u16)
}

fn skip_hrd_parameters(r: &mut BitReader<'_>, max_sub_layers_minus1: u8) -> Result<()> {
    let nal_hrd = r.read_flag()?;
    let vcl_hrd = r.read_flag()?;
    let mut sub_pic_params = false;
    if nal_hrd || vcl_hrd {
        sub_pic_params = r.read_flag()?;
        if sub_pic_params {
            r.skip_bits(19)?;
        }
        r.skip_bits(8)?; // bit_rate_scale, cpb_size_scale
        if sub_pic_params {
            r.skip_bits(4)?;
        }
        r.skip_bits(15)?;
    }
    for _ in 0..=max_sub_layers_minus1 {
        let fixed_general = r.read_flag()?;
        let fixed_within_cvs = fixed_general || r.read_flag()?;
        let mut low_delay = false;
        if fixed_within_cvs {
            r.read_ue()?; // elemental_duration_in_tc_minus1
        } else {
            low_delay = r.read_flag()?;
        }
        let cpb_count = if low_delay { 1 } else { r.read_ue()? + 1 };
        if cpb_count > 32 {
            return Err(CodecError::invalid_syntax("cpb_cnt_minus1", (cpb_count - 1).to_string()));
        }
        let layers = nal_hrd as u32 + vcl_hrd as u32;
        for _ in 0..layers * cpb_count {
            r.read_ue()?;
            r.read_ue()?;
            if sub_pic_params {
                r.read_ue()?;
                r.read_ue()?;
            }
            r.skip_bits(1)?; // cbr_flag
        }
    }
    Ok(())
}

/// Picture parameter set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pps {
    /// pps_pic_parameter_set_id
    pub pps_id: u32,
    /// pps_seq_parameter_set_id
    pub sps_id: u32,
    /// tiles_enabled_flag
    pub tiles_enabled: bool,
    /// entropy_coding_sync_enabled_flag
    pub entropy_coding_sync_enabled: bool,
}

impl Pps {
    /// Parse a PPS NAL unit, 2-byte header included
    pub fn parse(nal: &[u8]) -> Result<Self> {
        let data = rbsp(nal, nal_type::PPS, "H.265 PPS")?;
        let mut r = BitReader::new(&data);
        let pps_id = r.read_ue()?;
        let sps_id = r.read_ue()?;
        if pps_id > 63 || sps_id > 15 {
            return Err(CodecError::invalid_syntax("pps ids", format!("pps {pps_id} sps {sps_id}")));
        }
        r.skip_bits(7)?; // dependent slices, output flag, extra bits, sign hiding, cabac init
        r.read_ue()?;
        r.read_ue()?;
        r.read_se()?; // init_qp_minus26
        r.skip_bits(2)?; // constrained intra, transform skip
        if r.read_flag()? {
            r.read_ue()?; // diff_cu_qp_delta_depth
        }
        r.read_se()?;
        r.read_se()?;
        r.skip_bits(4)?; // chroma qp offsets, weighted pred/bipred, transquant bypass
        let tiles_enabled = r.read_flag()?;
        let entropy_coding_sync_enabled = r.read_flag()?;
        Ok(Self {
            pps_id,
            sps_id,
            tiles_enabled,
            entropy_coding_sync_enabled,
        })
    }

    /// parallelismType of the HEVC decoder configuration record
    pub fn parallelism_type(&self) -> u8 {
        match (self.tiles_enabled, self.entropy_coding_sync_enabled) {
            (true, true) => 0,
            (false, true) => 3,
            (true, false) => 2,
            (false, false) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::BitWriter;
    use crate::h26x::fixtures::{
        HEVC_PPS_WAVEFRONT as PPS_WAVEFRONT, HEVC_SPS_1080P as SPS_1080P, HEVC_SPS_720P as SPS_720P,
        HEVC_VPS_1080P as VPS_1080P,
    };

    #[test]
    fn test_parse_1080p_sps() {
        let sps = Sps::parse(&SPS_1080P).unwrap();
        assert_eq!((sps.width, sps.height), (1920, 1080));
        assert_eq!(sps.profile_tier_level.profile_idc, 1);
        assert_eq!(sps.profile_tier_level.level_idc, 120);
        assert_eq!(sps.profile_tier_level.compatibility_flags, 0x6000_0000);
        assert_eq!(sps.chroma_format_idc, 1);
        assert_eq!(sps.bit_depth_luma, 8);
        assert_eq!(sps.frame_rate, Some(30.0));
    }

    #[test]
    fn test_parse_720p_sps() {
        let sps = Sps::parse(&SPS_720P).unwrap();
        assert_eq!((sps.width, sps.height), (1280, 720));
        assert_eq!(sps.profile_tier_level.level_idc, 93);
        assert_eq!(sps.frame_rate, Some(25.0));
    }

    #[test]
    fn test_parse_vps() {
        let vps = Vps::parse(&VPS_1080P).unwrap();
        assert_eq!(vps.vps_id, 0);
        assert_eq!(vps.max_sub_layers, 1);
        assert!(vps.temporal_id_nesting);
        assert_eq!(vps.profile_tier_level.level_idc, 120);
    }

    #[test]
    fn test_parse_pps() {
        let pps = Pps::parse(&PPS_WAVEFRONT).unwrap();
        assert_eq!((pps.pps_id, pps.sps_id), (0, 0));
        assert!(pps.entropy_coding_sync_enabled);
        assert!(!pps.tiles_enabled);
        assert_eq!(pps.parallelism_type(), 3);
    }

    #[test]
    fn test_parse_pps_field_alignment() {
        let mut w = BitWriter::new();
        w.write_ue(3); // pps id
        w.write_ue(1); // sps id
        w.write_flag(false);
        w.write_flag(false);
        w.write_bits(3, 0);
        w.write_flag(true); // sign_data_hiding_enabled_flag
        w.write_flag(true); // cabac_init_present_flag
        w.write_ue(0);
        w.write_ue(0);
        w.write_se(0);
        w.write_flag(false);
        w.write_flag(false);
        w.write_flag(true); // cu_qp_delta_enabled_flag
        w.write_ue(1);
        w.write_se(0);
        w.write_se(0);
        w.write_bits(4, 0);
        w.write_flag(true); // tiles
        w.write_flag(false); // entropy coding sync
        w.write_flag(true); // trailing bits
        let mut nal = vec![0x44, 0x01];
        nal.extend(w.into_bytes());

        let pps = Pps::parse(&nal).unwrap();
        assert_eq!((pps.pps_id, pps.sps_id), (3, 1));
        assert!(pps.tiles_enabled);
        assert!(!pps.entropy_coding_sync_enabled);
        assert_eq!(pps.parallelism_type(), 2);
    }

    /// Build an SPS with a conformance window and inter-predicted reference picture sets
    fn synthetic_sps() -> Vec<u8> {
        let mut w = BitWriter::new();
        w.write_bits(4, 0); // vps id
        w.write_bits(3, 0); // max_sub_layers_minus1
        w.write_flag(true);
        // profile_tier_level
        w.write_bits(8, 0x01);
        w.write_bits(32, 0x6000_0000);
        w.write_bits(16, 0x9000);
        w.write_bits(32, 0);
        w.write_bits(8, 90);
        w.write_ue(0); // sps id
        w.write_ue(1); // 4:2:0
        w.write_ue(1920);
        w.write_ue(1088);
        w.write_flag(true);
        for offset in [0, 0, 0, 4] {
            w.write_ue(offset);
        }
        w.write_ue(0);
        w.write_ue(0);
        w.write_ue(4); // log2_max_pic_order_cnt_lsb_minus4
        w.write_flag(true);
        for _ in 0..3 {
            w.write_ue(1);
        }
        for value in [0, 3, 0, 3, 1, 1] {
            w.write_ue(value);
        }
        w.write_flag(false); // scaling lists
        w.write_flag(true);
        w.write_flag(true);
        w.write_flag(false); // pcm
        w.write_ue(2); // two short term sets
        // set 0: one negative picture
        w.write_ue(1);
        w.write_ue(0);
        w.write_ue(0);
        w.write_flag(true);
        // set 1: predicted from set 0
        w.write_flag(true);
        w.write_flag(false);
        w.write_ue(0);
        w.write_flag(true);
        w.write_flag(false);
        w.write_flag(true);
        w.write_flag(false); // long term refs
        w.write_flag(true);
        w.write_flag(true);
        w.write_flag(true); // vui
        w.write_flag(false);
        w.write_flag(false);
        w.write_flag(false);
        w.write_flag(false);
        w.write_bits(3, 0);
        w.write_flag(false);
        w.write_flag(true); // timing
        w.write_bits(32, 1001);
        w.write_bits(32, 60000);
        w.write_flag(false);
        w.write_flag(false);
        w.write_flag(true); // bitstream restriction
        w.write_bits(3, 0);
        w.write_ue(2);
        w.write_flag(true); // trailing bits
        let mut nal = vec![0x42, 0x01];
        nal.extend(w.into_bytes());
        nal
    }

    #[test]
    fn test_parse_synthetic_sps_with_rps_and_window() {
        let sps = Sps::parse(&synthetic_sps()).unwrap();
        assert_eq!((sps.coded_width, sps.coded_height), (1920, 1088));
        assert_eq!((sps.width, sps.height), (1920, 1080));
        assert_eq!(sps.profile_tier_level.level_idc, 90);
        let fps = sps.frame_rate.unwrap();
        assert!((fps - 59.94).abs() < 0.01);
        assert_eq!(sps.min_spatial_segmentation_idc, 2);
    }

    #[test]
    fn test_wrong_nal_type() {
        assert!(matches!(
            Sps::parse(&PPS_WAVEFRONT),
            Err(CodecError::UnexpectedNalType { nal_type: 34, .. })
        ));
    }

    #[test]
    fn test_nal_classification() {
        assert_eq!(nal_type(0x26), nal_type::IDR_W_RADL);
        assert!(is_keyframe(nal_type::CRA));
        assert!(!is_keyframe(nal_type::TRAIL_R));
        assert!(is_vcl(nal_type::TRAIL_N));
        assert!(!is_vcl(nal_type::VPS));
        assert!(is_first_slice(&[0x26, 0x01, 0xaf]));
        assert!(!is_first_slice(&[0x02, 0x01, 0x2f]));
    }
}
