//! H.264 PPS (Picture Parameter Set) 解析器.
//!
//! 输入为完整的 PPS NAL 单元 (含头部字节). slice group 映射按
//! [`UnsupportedSyntaxPolicy`] 拒绝或跳过; 扩展字段中的量化矩阵在 Reject 策略下
//! 只使扩展被忽略, 基础字段照常返回. 映射与矩阵的取值都不保留.

use avcscope_core::{AvcError, AvcResult};
use log::{debug, trace};
use serde::Serialize;

use super::nal::remove_emulation_prevention;
use super::syntax::{ParamSetKind, SyntaxReader};
use crate::config::{ParserConfig, UnsupportedSyntaxPolicy};

/// PPS 的 nal_unit_type
const NAL_TYPE_PPS: u8 = 8;

/// RBSP 尾部仍有数据时存在的扩展字段 (High Profile)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PpsExtension {
    pub transform_8x8_mode_flag: bool,
    /// 量化矩阵本身不保留
    pub pic_scaling_matrix_present_flag: bool,
    pub second_chroma_qp_index_offset: i32,
}

/// PPS 解析结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PpsInfo {
    pub pic_parameter_set_id: u32,
    pub seq_parameter_set_id: u32,
    /// 0=CAVLC, 1=CABAC
    pub entropy_coding_mode_flag: bool,
    pub bottom_field_pic_order_in_frame_present_flag: bool,
    pub num_slice_groups_minus1: u32,
    pub num_ref_idx_l0_active_minus1: u32,
    pub num_ref_idx_l1_active_minus1: u32,
    pub weighted_pred_flag: bool,
    pub weighted_bipred_idc: u8,
    pub pic_init_qp_minus26: i32,
    pub pic_init_qs_minus26: i32,
    pub chroma_qp_index_offset: i32,
    pub deblocking_filter_control_present_flag: bool,
    pub constrained_intra_pred_flag: bool,
    pub redundant_pic_cnt_present_flag: bool,
    pub extension: Option<PpsExtension>,
}

impl PpsInfo {
    /// 熵编码方式名称
    pub fn entropy_coding_name(&self) -> &'static str {
        if self.entropy_coding_mode_flag {
            "CABAC"
        } else {
            "CAVLC"
        }
    }

    /// 初始 QP = 26 + pic_init_qp_minus26
    pub fn pic_init_qp(&self) -> i32 {
        26 + self.pic_init_qp_minus26
    }

    /// 是否启用 8x8 变换
    pub fn transform_8x8_mode(&self) -> bool {
        self.extension.is_some_and(|ext| ext.transform_8x8_mode_flag)
    }
}

/// 使用默认配置解析 PPS NAL 单元 (含头部字节)
pub fn parse_pps(nalu: &[u8]) -> AvcResult<PpsInfo> {
    parse_pps_with_config(nalu, &ParserConfig::default())
}

/// 按指定配置解析 PPS NAL 单元 (含头部字节)
pub fn parse_pps_with_config(nalu: &[u8], config: &ParserConfig) -> AvcResult<PpsInfo> {
    let Some(&header) = nalu.first() else {
        return Err(AvcError::TruncatedPps {
            field: "nal_unit_header",
            byte_offset: 0,
        });
    };
    let nal_type = header & 0x1F;
    if nal_type != NAL_TYPE_PPS {
        return Err(AvcError::WrongNaluType {
            expected: NAL_TYPE_PPS,
            actual: nal_type,
        });
    }

    let rbsp = remove_emulation_prevention(&nalu[1..]);
    let pps = parse_pps_rbsp(&rbsp, config.unsupported_syntax)?;
    trace!(
        "PPS: id={}, sps_id={}, entropy={}, extension={}",
        pps.pic_parameter_set_id,
        pps.seq_parameter_set_id,
        pps.entropy_coding_name(),
        pps.extension.is_some(),
    );
    Ok(pps)
}

fn parse_pps_rbsp(rbsp: &[u8], policy: UnsupportedSyntaxPolicy) -> AvcResult<PpsInfo> {
    let mut sr = SyntaxReader::new(rbsp, ParamSetKind::Pps);

    let pic_parameter_set_id = sr.ue("pic_parameter_set_id")?;
    let seq_parameter_set_id = sr.ue("seq_parameter_set_id")?;
    let entropy_coding_mode_flag = sr.flag("entropy_coding_mode_flag")?;
    let bottom_field_pic_order_in_frame_present_flag =
        sr.flag("bottom_field_pic_order_in_frame_present_flag")?;

    let num_slice_groups_minus1 = sr.ue_max("num_slice_groups_minus1", 7)?;
    if num_slice_groups_minus1 > 0 {
        if policy == UnsupportedSyntaxPolicy::Reject {
            return Err(AvcError::UnsupportedFeature {
                component: "PPS",
                feature: "slice_group_map",
            });
        }
        skip_slice_group_map(&mut sr, num_slice_groups_minus1)?;
    }

    let num_ref_idx_l0_active_minus1 = sr.ue("num_ref_idx_l0_active_minus1")?;
    let num_ref_idx_l1_active_minus1 = sr.ue("num_ref_idx_l1_active_minus1")?;
    let weighted_pred_flag = sr.flag("weighted_pred_flag")?;
    let weighted_bipred_idc = sr.u(2, "weighted_bipred_idc")? as u8;
    let pic_init_qp_minus26 = sr.se("pic_init_qp_minus26")?;
    let pic_init_qs_minus26 = sr.se("pic_init_qs_minus26")?;
    let chroma_qp_index_offset = sr.se("chroma_qp_index_offset")?;
    let deblocking_filter_control_present_flag =
        sr.flag("deblocking_filter_control_present_flag")?;
    let constrained_intra_pred_flag = sr.flag("constrained_intra_pred_flag")?;
    let redundant_pic_cnt_present_flag = sr.flag("redundant_pic_cnt_present_flag")?;

    let extension = if sr.more_rbsp_data() {
        parse_extension(&mut sr, policy)?
    } else {
        None
    };

    Ok(PpsInfo {
        pic_parameter_set_id,
        seq_parameter_set_id,
        entropy_coding_mode_flag,
        bottom_field_pic_order_in_frame_present_flag,
        num_slice_groups_minus1,
        num_ref_idx_l0_active_minus1,
        num_ref_idx_l1_active_minus1,
        weighted_pred_flag,
        weighted_bipred_idc,
        pic_init_qp_minus26,
        pic_init_qs_minus26,
        chroma_qp_index_offset,
        deblocking_filter_control_present_flag,
        constrained_intra_pred_flag,
        redundant_pic_cnt_present_flag,
        extension,
    })
}

/// 解析 High Profile 扩展字段
///
/// Reject 策略下遇到 pic_scaling_matrix 时放弃整个扩展 (返回 None),
/// 基础字段已经完整, 不影响 PPS 本身.
fn parse_extension(
    sr: &mut SyntaxReader<'_>,
    policy: UnsupportedSyntaxPolicy,
) -> AvcResult<Option<PpsExtension>> {
    let transform_8x8_mode_flag = sr.flag("transform_8x8_mode_flag")?;
    let pic_scaling_matrix_present_flag = sr.flag("pic_scaling_matrix_present_flag")?;
    if pic_scaling_matrix_present_flag {
        if policy == UnsupportedSyntaxPolicy::Reject {
            debug!("PPS: 扩展字段含 pic_scaling_matrix, 按 Reject 策略忽略扩展");
            return Ok(None);
        }
        // 6 个 4x4 列表, 启用 8x8 变换时再加 2 个 8x8 列表
        let list_count = if transform_8x8_mode_flag { 8 } else { 6 };
        for i in 0..list_count {
            if sr.flag("pic_scaling_list_present_flag")? {
                sr.skip_scaling_list(if i < 6 { 16 } else { 64 })?;
            }
        }
    }
    Ok(Some(PpsExtension {
        transform_8x8_mode_flag,
        pic_scaling_matrix_present_flag,
        second_chroma_qp_index_offset: sr.se("second_chroma_qp_index_offset")?,
    }))
}

/// 按 slice_group_map_type (0-6) 消耗 slice group 映射语法
fn skip_slice_group_map(sr: &mut SyntaxReader<'_>, num_slice_groups_minus1: u32) -> AvcResult<()> {
    match sr.ue_max("slice_group_map_type", 6)? {
        0 => {
            for _ in 0..=num_slice_groups_minus1 {
                sr.ue("run_length_minus1")?;
            }
        }
        2 => {
            for _ in 0..num_slice_groups_minus1 {
                sr.ue("top_left")?;
                sr.ue("bottom_right")?;
            }
        }
        3..=5 => {
            sr.flag("slice_group_change_direction_flag")?;
            sr.ue("slice_group_change_rate_minus1")?;
        }
        6 => {
            let pic_size_in_map_units_minus1 = sr.ue("pic_size_in_map_units_minus1")?;
            // Ceil(Log2(num_slice_groups_minus1 + 1)), 此处至少为 1
            let id_bits = u32::BITS - num_slice_groups_minus1.leading_zeros();
            for _ in 0..=pic_size_in_map_units_minus1 {
                sr.u(id_bits, "slice_group_id")?;
            }
        }
        // 类型 1 (dispersed) 没有额外语法
        _ => {}
    }
    Ok(())
}
