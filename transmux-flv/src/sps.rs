//! H.264 Sequence Parameter Set parsing.
//!
//! Extracts only what the remuxing pipeline needs: coded and display sizes,
//! profile/level strings, chroma format, SAR and the VUI frame rate.

use crate::error::{FlvError, Result};
use crate::exp_golomb::{ebsp_to_rbsp, ExpGolombReader};
use transmux_core::FrameRate;

/// Width/height pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Parsed SPS fields relevant to remuxing.
#[derive(Debug, Clone, PartialEq)]
pub struct SpsInfo {
    /// Profile name ("Baseline", "Main", "High", …).
    pub profile_string: String,
    /// Level string ("3.1").
    pub level_string: String,
    /// Luma bit depth.
    pub bit_depth: u8,
    /// Chroma format as 420/422/444 (0 for monochrome).
    pub chroma_format: u16,
    /// Chroma format display string ("4:2:0").
    pub chroma_format_string: String,
    /// Sample aspect ratio.
    pub sar_ratio: (u32, u32),
    /// Coded size after cropping.
    pub codec_size: Size,
    /// Display size (SAR applied to the width).
    pub present_size: Size,
    /// VUI frame rate; `fixed == false` or zero fps means unusable.
    pub frame_rate: FrameRate,
}

const PROFILE_HIGH_IDCS: &[u8] = &[100, 110, 122, 244, 44, 83, 86, 118, 128, 138, 144];

// aspect_ratio_idc 1..=16 per Table E-1
const SAR_TABLE: &[(u32, u32)] = &[
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

fn profile_string(profile_idc: u8) -> String {
    match profile_idc {
        66 => "Baseline",
        77 => "Main",
        88 => "Extended",
        100 => "High",
        110 => "High10",
        122 => "High422",
        244 => "High444",
        _ => "Unknown",
    }
    .to_string()
}

fn level_string(level_idc: u8) -> String {
    format!("{}.{}", level_idc / 10, level_idc % 10)
}

fn chroma_format_string(chroma_format: u16) -> String {
    match chroma_format {
        420 => "4:2:0",
        422 => "4:2:2",
        444 => "4:4:4",
        _ => "Unknown",
    }
    .to_string()
}

fn skip_scaling_list(reader: &mut ExpGolombReader<'_>, count: u32) -> Result<()> {
    let mut last_scale: i32 = 8;
    let mut next_scale: i32 = 8;
    for _ in 0..count {
        if next_scale != 0 {
            let delta_scale = reader.read_se()?;
            next_scale = (last_scale + delta_scale + 256) % 256;
        }
        last_scale = if next_scale == 0 { last_scale } else { next_scale };
    }
    Ok(())
}

/// Parse an SPS NAL unit (including the NAL header byte).
pub fn parse_sps(sps: &[u8]) -> Result<SpsInfo> {
    if sps.len() < 4 {
        return Err(FlvError::InvalidSps("SPS too short".into()));
    }
    // drop the NAL header byte, then de-escape
    let rbsp = ebsp_to_rbsp(&sps[1..]);
    let mut gb = ExpGolombReader::new(&rbsp);

    let profile_idc = gb.read_bits(8)? as u8;
    gb.read_bits(8)?; // constraint_set flags + reserved
    let level_idc = gb.read_bits(8)? as u8;
    gb.read_ue()?; // seq_parameter_set_id

    let mut chroma_format_idc = 1u32;
    let mut bit_depth = 8u8;

    if PROFILE_HIGH_IDCS.contains(&profile_idc) {
        chroma_format_idc = gb.read_ue()?;
        if chroma_format_idc == 3 {
            gb.skip(1)?; // separate_colour_plane_flag
        }
        if chroma_format_idc > 3 {
            return Err(FlvError::InvalidSps(format!(
                "chroma_format_idc {chroma_format_idc} out of range"
            )));
        }
        bit_depth = gb.read_ue()? as u8 + 8; // bit_depth_luma_minus8
        gb.read_ue()?; // bit_depth_chroma_minus8
        gb.skip(1)?; // qpprime_y_zero_transform_bypass_flag
        if gb.read_bit()? {
            // seq_scaling_matrix_present_flag
            let count = if chroma_format_idc != 3 { 8 } else { 12 };
            for i in 0..count {
                if gb.read_bit()? {
                    let size = if i < 6 { 16 } else { 64 };
                    skip_scaling_list(&mut gb, size)?;
                }
            }
        }
    }

    gb.read_ue()?; // log2_max_frame_num_minus4
    let pic_order_cnt_type = gb.read_ue()?;
    match pic_order_cnt_type {
        0 => {
            gb.read_ue()?; // log2_max_pic_order_cnt_lsb_minus4
        }
        1 => {
            gb.skip(1)?; // delta_pic_order_always_zero_flag
            gb.read_se()?; // offset_for_non_ref_pic
            gb.read_se()?; // offset_for_top_to_bottom_field
            let num_ref_frames_in_cycle = gb.read_ue()?;
            for _ in 0..num_ref_frames_in_cycle {
                gb.read_se()?;
            }
        }
        2 => {}
        other => {
            return Err(FlvError::InvalidSps(format!(
                "pic_order_cnt_type {other} out of range"
            )))
        }
    }

    gb.read_ue()?; // max_num_ref_frames
    gb.skip(1)?; // gaps_in_frame_num_value_allowed_flag

    let pic_width_in_mbs_minus1 = gb.read_ue()?;
    let pic_height_in_map_units_minus1 = gb.read_ue()?;
    let frame_mbs_only_flag = gb.read_bit()?;
    if !frame_mbs_only_flag {
        gb.skip(1)?; // mb_adaptive_frame_field_flag
    }
    gb.skip(1)?; // direct_8x8_inference_flag

    let (mut crop_left, mut crop_right, mut crop_top, mut crop_bottom) = (0u32, 0u32, 0u32, 0u32);
    if gb.read_bit()? {
        // frame_cropping_flag
        crop_left = gb.read_ue()?;
        crop_right = gb.read_ue()?;
        crop_top = gb.read_ue()?;
        crop_bottom = gb.read_ue()?;
    }

    let mut sar_ratio = (1u32, 1u32);
    let mut frame_rate = FrameRate {
        fixed: false,
        fps: 0.0,
        fps_num: 0,
        fps_den: 0,
    };

    if gb.read_bit()? {
        // vui_parameters_present_flag
        if gb.read_bit()? {
            // aspect_ratio_info_present_flag
            let aspect_ratio_idc = gb.read_bits(8)? as usize;
            if aspect_ratio_idc == 255 {
                // Extended_SAR
                let sar_width = gb.read_bits(16)?;
                let sar_height = gb.read_bits(16)?;
                sar_ratio = (sar_width, sar_height);
            } else if (1..=SAR_TABLE.len()).contains(&aspect_ratio_idc) {
                sar_ratio = SAR_TABLE[aspect_ratio_idc - 1];
            }
        }
        if gb.read_bit()? {
            gb.skip(1)?; // overscan_appropriate_flag
        }
        if gb.read_bit()? {
            // video_signal_type_present_flag
            gb.skip(4)?; // video_format + video_full_range_flag
            if gb.read_bit()? {
                // colour_description_present_flag
                gb.skip(24)?;
            }
        }
        if gb.read_bit()? {
            // chroma_loc_info_present_flag
            gb.read_ue()?;
            gb.read_ue()?;
        }
        if gb.read_bit()? {
            // timing_info_present_flag
            let num_units_in_tick = gb.read_bits(32)?;
            let time_scale = gb.read_bits(32)?;
            let fixed_frame_rate_flag = gb.read_bit()?;
            if num_units_in_tick > 0 && time_scale > 0 {
                frame_rate = FrameRate {
                    fixed: fixed_frame_rate_flag,
                    fps: time_scale as f64 / (2.0 * num_units_in_tick as f64),
                    fps_num: time_scale,
                    fps_den: num_units_in_tick * 2,
                };
            }
        }
    }

    // crop units per 7-3 / 7-4
    let (crop_unit_x, crop_unit_y) = if chroma_format_idc == 0 {
        (1u32, 2 - frame_mbs_only_flag as u32)
    } else {
        let sub_wc = if chroma_format_idc == 3 { 1 } else { 2 };
        let sub_hc = if chroma_format_idc == 1 { 2 } else { 1 };
        (sub_wc, sub_hc * (2 - frame_mbs_only_flag as u32))
    };

    let mut codec_width = (pic_width_in_mbs_minus1 + 1) * 16;
    let mut codec_height = (2 - frame_mbs_only_flag as u32) * ((pic_height_in_map_units_minus1 + 1) * 16);
    codec_width = codec_width
        .saturating_sub((crop_left + crop_right) * crop_unit_x);
    codec_height = codec_height
        .saturating_sub((crop_top + crop_bottom) * crop_unit_y);

    let sar_scale = if sar_ratio.1 != 0 {
        sar_ratio.0 as f64 / sar_ratio.1 as f64
    } else {
        1.0
    };
    let present_width = (codec_width as f64 * sar_scale).ceil() as u32;

    let chroma_format: u16 = match chroma_format_idc {
        1 => 420,
        2 => 422,
        3 => 444,
        _ => 0,
    };

    Ok(SpsInfo {
        profile_string: profile_string(profile_idc),
        level_string: level_string(level_idc),
        bit_depth,
        chroma_format,
        chroma_format_string: chroma_format_string(chroma_format),
        sar_ratio,
        codec_size: Size {
            width: codec_width,
            height: codec_height,
        },
        present_size: Size {
            width: present_width,
            height: codec_height,
        },
        frame_rate,
    })
}
