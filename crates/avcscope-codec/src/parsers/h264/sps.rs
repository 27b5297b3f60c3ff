//! H.264 SPS (Sequence Parameter Set) 解析器.
//!
//! 输入为完整的 SPS NAL 单元 (含 1 字节头部). 解析流程:
//! - 校验 nal_unit_type == 7
//! - 去除 emulation prevention 字节得到 RBSP
//! - 按固定顺序读取语法元素, 包括可选的 VUI
//! - 推导分辨率、裁剪后分辨率和帧率
//!
//! 任何字段读取越界都会使整个解析失败 (`TruncatedSps`), 不返回部分结果.

use avcscope_core::{AvcError, AvcResult};
use bitflags::bitflags;
use log::trace;
use serde::Serialize;

use super::nal::remove_emulation_prevention;
use super::syntax::{ParamSetKind, SyntaxReader};
use crate::config::{ParserConfig, UnsupportedSyntaxPolicy};

/// SPS 的 nal_unit_type
const NAL_TYPE_SPS: u8 = 7;

bitflags! {
    /// constraint_set0..5 标志位 (profile_idc 之后的字节高 6 位)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
    pub struct ConstraintFlags: u8 {
        const SET0 = 0x80;
        const SET1 = 0x40;
        const SET2 = 0x20;
        const SET3 = 0x10;
        const SET4 = 0x08;
        const SET5 = 0x04;
    }
}

/// High Profile 系列才有的字段
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HighProfileFields {
    /// 色度格式 (0=单色, 1=4:2:0, 2=4:2:2, 3=4:4:4)
    pub chroma_format_idc: u32,
    /// 仅 chroma_format_idc==3 时存在
    pub separate_colour_plane_flag: Option<bool>,
    pub bit_depth_luma_minus8: u32,
    pub bit_depth_chroma_minus8: u32,
    pub qpprime_y_zero_transform_bypass_flag: bool,
    /// 量化矩阵本身不保留
    pub seq_scaling_matrix_present_flag: bool,
}

/// 图像顺序计数 (POC) 参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum PicOrderCnt {
    /// pic_order_cnt_type == 0
    Type0 {
        log2_max_pic_order_cnt_lsb_minus4: u32,
    },
    /// pic_order_cnt_type == 1, offset_for_ref_frame 列表不保留
    Type1 {
        delta_pic_order_always_zero_flag: bool,
        offset_for_non_ref_pic: i32,
        offset_for_top_to_bottom_field: i32,
        num_ref_frames_in_pic_order_cnt_cycle: u32,
    },
    /// pic_order_cnt_type == 2
    Type2,
}

impl PicOrderCnt {
    /// 对应的 pic_order_cnt_type 编号
    pub fn pic_order_cnt_type(&self) -> u32 {
        match self {
            Self::Type0 { .. } => 0,
            Self::Type1 { .. } => 1,
            Self::Type2 => 2,
        }
    }
}

/// frame_crop_*_offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CropOffsets {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
}

/// VUI 宽高比信息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AspectRatioInfo {
    pub aspect_ratio_idc: u8,
    /// 仅 aspect_ratio_idc==255 (Extended_SAR) 时存在
    pub sar_width: Option<u16>,
    pub sar_height: Option<u16>,
}

/// 颜色描述
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ColourDescription {
    pub colour_primaries: u8,
    pub transfer_characteristics: u8,
    pub matrix_coefficients: u8,
}

/// 视频信号类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VideoSignalType {
    pub video_format: u8,
    pub video_full_range_flag: bool,
    pub colour_description: Option<ColourDescription>,
}

/// 色度采样位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChromaLocInfo {
    pub top_field: u32,
    pub bottom_field: u32,
}

/// VUI 时间信息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimingInfo {
    pub num_units_in_tick: u32,
    pub time_scale: u32,
    pub fixed_frame_rate_flag: bool,
}

impl TimingInfo {
    /// 帧率 = time_scale / (2 * num_units_in_tick)
    ///
    /// 任一取值为 0 时无法推导, 返回 None.
    pub fn frame_rate(&self) -> Option<f64> {
        if self.num_units_in_tick == 0 || self.time_scale == 0 {
            return None;
        }
        Some(f64::from(self.time_scale) / (2.0 * f64::from(self.num_units_in_tick)))
    }
}

/// VUI 参数 (读取到 timing_info 为止, HRD 及之后的字段不解析)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VuiParameters {
    pub aspect_ratio: Option<AspectRatioInfo>,
    /// overscan_info_present_flag 置位时为 overscan_appropriate_flag
    pub overscan_appropriate_flag: Option<bool>,
    pub video_signal_type: Option<VideoSignalType>,
    pub chroma_loc_info: Option<ChromaLocInfo>,
    pub timing_info: Option<TimingInfo>,
}

/// 预定义的 SAR 表 (ITU-T H.264 表 E-1), 下标即 aspect_ratio_idc
const SAR_TABLE: [(u32, u32); 17] = [
    (0, 1),    // 0: 未指定
    (1, 1),    // 1: 1:1
    (12, 11),  // 2: 12:11
    (10, 11),  // 3: 10:11
    (16, 11),  // 4: 16:11
    (40, 33),  // 5: 40:33
    (24, 11),  // 6: 24:11
    (20, 11),  // 7: 20:11
    (32, 11),  // 8: 32:11
    (80, 33),  // 9: 80:33
    (18, 11),  // 10: 18:11
    (15, 11),  // 11: 15:11
    (64, 33),  // 12: 64:33
    (160, 99), // 13: 160:99
    (4, 3),    // 14: 4:3
    (3, 2),    // 15: 3:2
    (2, 1),    // 16: 2:1
];

/// Extended_SAR
const ASPECT_RATIO_EXTENDED_SAR: u8 = 255;

impl VuiParameters {
    /// 像素宽高比 (sar_width, sar_height)
    ///
    /// 未指定、保留值或 Extended_SAR 中出现 0 时返回 None.
    pub fn sample_aspect_ratio(&self) -> Option<(u32, u32)> {
        let info = self.aspect_ratio?;
        let (w, h) = if info.aspect_ratio_idc == ASPECT_RATIO_EXTENDED_SAR {
            (u32::from(info.sar_width?), u32::from(info.sar_height?))
        } else {
            *SAR_TABLE.get(usize::from(info.aspect_ratio_idc))?
        };
        (w > 0 && h > 0).then_some((w, h))
    }
}

/// SPS 解析结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpsInfo {
    /// profile_idc (66=Baseline, 77=Main, 100=High, ...)
    pub profile_idc: u8,
    pub constraint_flags: ConstraintFlags,
    pub reserved_zero_2bits: u8,
    /// level_idc (30=3.0, 41=4.1, ...)
    pub level_idc: u8,
    pub seq_parameter_set_id: u32,
    pub high_profile: Option<HighProfileFields>,
    pub log2_max_frame_num_minus4: u32,
    pub pic_order_cnt: PicOrderCnt,
    pub num_ref_frames: u32,
    pub gaps_in_frame_num_value_allowed_flag: bool,
    pub pic_width_in_mbs_minus1: u32,
    pub pic_height_in_map_units_minus1: u32,
    pub frame_mbs_only_flag: bool,
    /// 仅 frame_mbs_only_flag==0 时存在
    pub mb_adaptive_frame_field_flag: Option<bool>,
    pub direct_8x8_inference_flag: bool,
    /// frame_cropping_flag 置位时存在
    pub crop: Option<CropOffsets>,
    pub vui: Option<VuiParameters>,
    /// 编码宽度 (像素, 宏块对齐)
    pub width: u32,
    /// 编码高度 (像素, 宏块对齐)
    pub height: u32,
    /// 应用裁剪后的显示宽度
    pub cropped_width: u32,
    /// 应用裁剪后的显示高度
    pub cropped_height: u32,
    /// 由 VUI timing_info 推导的帧率
    pub frame_rate: Option<f64>,
}

impl SpsInfo {
    /// 色度格式, 非 High Profile 时默认为 1 (4:2:0)
    pub fn chroma_format_idc(&self) -> u32 {
        self.high_profile
            .as_ref()
            .map_or(1, |hp| hp.chroma_format_idc)
    }

    /// 单个 constraint_setN_flag
    pub fn constraint_set_flag(&self, index: u8) -> bool {
        index < 6 && self.constraint_flags.bits() & (0x80 >> index) != 0
    }

    /// profile 名称
    pub fn profile_name(&self) -> &'static str {
        match self.profile_idc {
            66 if self.constraint_flags.contains(ConstraintFlags::SET1) => "Constrained Baseline",
            66 => "Baseline",
            77 => "Main",
            88 => "Extended",
            100 => "High",
            110 => "High 10",
            122 => "High 4:2:2",
            244 => "High 4:4:4 Predictive",
            44 => "CAVLC 4:4:4 Intra",
            83 => "Scalable Baseline",
            86 => "Scalable High",
            118 => "Multiview High",
            128 => "Stereo High",
            134 => "MFC High",
            135 => "MFC Depth High",
            138 => "Multiview Depth High",
            139 => "Enhanced Multiview Depth High",
            _ => "Unknown",
        }
    }

    /// 逐行或隔行 (场编码)
    pub fn is_interlaced(&self) -> bool {
        !self.frame_mbs_only_flag
    }
}

/// 使用默认配置解析 SPS NAL 单元 (含头部字节)
///
/// # 示例
/// ```
/// use avcscope_codec::parsers::h264::parse_sps;
/// use avcscope_core::AvcError;
///
/// // nal_unit_type = 8 (PPS)
/// let err = parse_sps(&[0x68, 0xCE, 0x3C, 0x80]).unwrap_err();
/// assert_eq!(err, AvcError::WrongNaluType { expected: 7, actual: 8 });
/// ```
pub fn parse_sps(nalu: &[u8]) -> AvcResult<SpsInfo> {
    parse_sps_with_config(nalu, &ParserConfig::default())
}

/// 按指定配置解析 SPS NAL 单元 (含头部字节)
pub fn parse_sps_with_config(nalu: &[u8], config: &ParserConfig) -> AvcResult<SpsInfo> {
    let Some(&header) = nalu.first() else {
        return Err(AvcError::TruncatedSps {
            field: "nal_unit_header",
            byte_offset: 0,
        });
    };
    let nal_type = header & 0x1F;
    if nal_type != NAL_TYPE_SPS {
        return Err(AvcError::WrongNaluType {
            expected: NAL_TYPE_SPS,
            actual: nal_type,
        });
    }

    let rbsp = remove_emulation_prevention(&nalu[1..]);
    let sps = parse_sps_rbsp(&rbsp, config.unsupported_syntax)?;
    trace!(
        "SPS: id={}, profile={}, level={}, {}x{} (裁剪后 {}x{}), fps={:?}",
        sps.seq_parameter_set_id,
        sps.profile_idc,
        sps.level_idc,
        sps.width,
        sps.height,
        sps.cropped_width,
        sps.cropped_height,
        sps.frame_rate,
    );
    Ok(sps)
}

fn parse_sps_rbsp(rbsp: &[u8], policy: UnsupportedSyntaxPolicy) -> AvcResult<SpsInfo> {
    let mut sr = SyntaxReader::new(rbsp, ParamSetKind::Sps);

    let profile_idc = sr.u8("profile_idc")?;
    let constraint_bits = sr.u(6, "constraint_set_flags")? as u8;
    let constraint_flags = ConstraintFlags::from_bits_truncate(constraint_bits << 2);
    let reserved_zero_2bits = sr.u(2, "reserved_zero_2bits")? as u8;
    let level_idc = sr.u8("level_idc")?;
    let seq_parameter_set_id = sr.ue("seq_parameter_set_id")?;

    let high_profile = if is_high_profile(profile_idc) {
        Some(parse_high_profile_fields(&mut sr, policy)?)
    } else {
        None
    };

    let log2_max_frame_num_minus4 = sr.ue("log2_max_frame_num_minus4")?;
    let pic_order_cnt = match sr.ue_max("pic_order_cnt_type", 2)? {
        0 => PicOrderCnt::Type0 {
            log2_max_pic_order_cnt_lsb_minus4: sr.ue("log2_max_pic_order_cnt_lsb_minus4")?,
        },
        1 => {
            let delta_pic_order_always_zero_flag = sr.flag("delta_pic_order_always_zero_flag")?;
            let offset_for_non_ref_pic = sr.se("offset_for_non_ref_pic")?;
            let offset_for_top_to_bottom_field = sr.se("offset_for_top_to_bottom_field")?;
            let num_ref_frames_in_pic_order_cnt_cycle =
                sr.ue_max("num_ref_frames_in_pic_order_cnt_cycle", 255)?;
            for _ in 0..num_ref_frames_in_pic_order_cnt_cycle {
                sr.se("offset_for_ref_frame")?;
            }
            PicOrderCnt::Type1 {
                delta_pic_order_always_zero_flag,
                offset_for_non_ref_pic,
                offset_for_top_to_bottom_field,
                num_ref_frames_in_pic_order_cnt_cycle,
            }
        }
        _ => PicOrderCnt::Type2,
    };

    let num_ref_frames = sr.ue("num_ref_frames")?;
    let gaps_in_frame_num_value_allowed_flag = sr.flag("gaps_in_frame_num_value_allowed_flag")?;
    let pic_width_in_mbs_minus1 = sr.ue("pic_width_in_mbs_minus1")?;
    let pic_height_in_map_units_minus1 = sr.ue("pic_height_in_map_units_minus1")?;
    let frame_mbs_only_flag = sr.flag("frame_mbs_only_flag")?;
    let mb_adaptive_frame_field_flag = if frame_mbs_only_flag {
        None
    } else {
        Some(sr.flag("mb_adaptive_frame_field_flag")?)
    };
    let direct_8x8_inference_flag = sr.flag("direct_8x8_inference_flag")?;

    let crop = if sr.flag("frame_cropping_flag")? {
        Some(CropOffsets {
            left: sr.ue("frame_crop_left_offset")?,
            right: sr.ue("frame_crop_right_offset")?,
            top: sr.ue("frame_crop_top_offset")?,
            bottom: sr.ue("frame_crop_bottom_offset")?,
        })
    } else {
        None
    };

    let vui = if sr.flag("vui_parameters_present_flag")? {
        Some(parse_vui(&mut sr)?)
    } else {
        None
    };

    let chroma_format_idc = high_profile.as_ref().map_or(1, |hp| hp.chroma_format_idc);
    let width = mul_dim(u64::from(pic_width_in_mbs_minus1) + 1, 16, "pic_width_in_mbs_minus1")?;
    let field_mult = if frame_mbs_only_flag { 1 } else { 2 };
    let height = mul_dim(
        (u64::from(pic_height_in_map_units_minus1) + 1) * field_mult,
        16,
        "pic_height_in_map_units_minus1",
    )?;

    let (cropped_width, cropped_height) = match crop {
        Some(c) => {
            let (unit_x, unit_y) = cropping_unit(chroma_format_idc, frame_mbs_only_flag);
            let crop_x = (u64::from(c.left) + u64::from(c.right)) * u64::from(unit_x);
            let crop_y = (u64::from(c.top) + u64::from(c.bottom)) * u64::from(unit_y);
            (
                apply_crop(width, crop_x, "frame_crop_horizontal")?,
                apply_crop(height, crop_y, "frame_crop_vertical")?,
            )
        }
        None => (width, height),
    };

    let frame_rate = vui
        .as_ref()
        .and_then(|v| v.timing_info)
        .and_then(|t| t.frame_rate());

    Ok(SpsInfo {
        profile_idc,
        constraint_flags,
        reserved_zero_2bits,
        level_idc,
        seq_parameter_set_id,
        high_profile,
        log2_max_frame_num_minus4,
        pic_order_cnt,
        num_ref_frames,
        gaps_in_frame_num_value_allowed_flag,
        pic_width_in_mbs_minus1,
        pic_height_in_map_units_minus1,
        frame_mbs_only_flag,
        mb_adaptive_frame_field_flag,
        direct_8x8_inference_flag,
        crop,
        vui,
        width,
        height,
        cropped_width,
        cropped_height,
        frame_rate,
    })
}

fn parse_high_profile_fields(
    sr: &mut SyntaxReader<'_>,
    policy: UnsupportedSyntaxPolicy,
) -> AvcResult<HighProfileFields> {
    let chroma_format_idc = sr.ue_max("chroma_format_idc", 3)?;
    let separate_colour_plane_flag = if chroma_format_idc == 3 {
        Some(sr.flag("separate_colour_plane_flag")?)
    } else {
        None
    };
    let bit_depth_luma_minus8 = sr.ue("bit_depth_luma_minus8")?;
    let bit_depth_chroma_minus8 = sr.ue("bit_depth_chroma_minus8")?;
    let qpprime_y_zero_transform_bypass_flag = sr.flag("qpprime_y_zero_transform_bypass_flag")?;
    let seq_scaling_matrix_present_flag = sr.flag("seq_scaling_matrix_present_flag")?;

    if seq_scaling_matrix_present_flag {
        if policy == UnsupportedSyntaxPolicy::Reject {
            return Err(AvcError::UnsupportedFeature {
                component: "SPS",
                feature: "seq_scaling_matrix",
            });
        }
        let list_count = if chroma_format_idc == 3 { 12 } else { 8 };
        for i in 0..list_count {
            if sr.flag("seq_scaling_list_present_flag")? {
                sr.skip_scaling_list(if i < 6 { 16 } else { 64 })?;
            }
        }
    }

    Ok(HighProfileFields {
        chroma_format_idc,
        separate_colour_plane_flag,
        bit_depth_luma_minus8,
        bit_depth_chroma_minus8,
        qpprime_y_zero_transform_bypass_flag,
        seq_scaling_matrix_present_flag,
    })
}

fn parse_vui(sr: &mut SyntaxReader<'_>) -> AvcResult<VuiParameters> {
    let mut vui = VuiParameters::default();

    if sr.flag("aspect_ratio_info_present_flag")? {
        let aspect_ratio_idc = sr.u8("aspect_ratio_idc")?;
        let (sar_width, sar_height) = if aspect_ratio_idc == ASPECT_RATIO_EXTENDED_SAR {
            (
                Some(sr.u(16, "sar_width")? as u16),
                Some(sr.u(16, "sar_height")? as u16),
            )
        } else {
            (None, None)
        };
        vui.aspect_ratio = Some(AspectRatioInfo {
            aspect_ratio_idc,
            sar_width,
            sar_height,
        });
    }

    if sr.flag("overscan_info_present_flag")? {
        vui.overscan_appropriate_flag = Some(sr.flag("overscan_appropriate_flag")?);
    }

    if sr.flag("video_signal_type_present_flag")? {
        let video_format = sr.u(3, "video_format")? as u8;
        let video_full_range_flag = sr.flag("video_full_range_flag")?;
        let colour_description = if sr.flag("colour_description_present_flag")? {
            Some(ColourDescription {
                colour_primaries: sr.u8("colour_primaries")?,
                transfer_characteristics: sr.u8("transfer_characteristics")?,
                matrix_coefficients: sr.u8("matrix_coefficients")?,
            })
        } else {
            None
        };
        vui.video_signal_type = Some(VideoSignalType {
            video_format,
            video_full_range_flag,
            colour_description,
        });
    }

    if sr.flag("chroma_loc_info_present_flag")? {
        vui.chroma_loc_info = Some(ChromaLocInfo {
            top_field: sr.ue("chroma_sample_loc_type_top_field")?,
            bottom_field: sr.ue("chroma_sample_loc_type_bottom_field")?,
        });
    }

    if sr.flag("timing_info_present_flag")? {
        vui.timing_info = Some(TimingInfo {
            num_units_in_tick: sr.u(32, "num_units_in_tick")?,
            time_scale: sr.u(32, "time_scale")?,
            fixed_frame_rate_flag: sr.flag("fixed_frame_rate_flag")?,
        });
    }

    Ok(vui)
}

// ============================================================
// 辅助函数
// ============================================================

/// 是否为 High Profile 或更高 (带 chroma_format_idc 等扩展字段)
fn is_high_profile(profile_idc: u8) -> bool {
    matches!(
        profile_idc,
        100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 138 | 139 | 134 | 135
    )
}

/// 获取 cropping 单位 (crop_unit_x, crop_unit_y)
fn cropping_unit(chroma_format_idc: u32, frame_mbs_only: bool) -> (u32, u32) {
    let field_mult = if frame_mbs_only { 1 } else { 2 };
    match chroma_format_idc {
        1 | 2 => (2, 2 * field_mult),
        _ => (1, 1),
    }
}

fn mul_dim(units: u64, unit_size: u64, field: &'static str) -> AvcResult<u32> {
    u32::try_from(units * unit_size).map_err(|_| AvcError::InvalidValue {
        component: "SPS",
        field,
        value: i64::try_from(units).unwrap_or(i64::MAX),
    })
}

fn apply_crop(size: u32, crop: u64, field: &'static str) -> AvcResult<u32> {
    if crop >= u64::from(size) {
        return Err(AvcError::InvalidValue {
            component: "SPS",
            field,
            value: i64::try_from(crop).unwrap_or(i64::MAX),
        });
    }
    Ok(size - crop as u32)
}
