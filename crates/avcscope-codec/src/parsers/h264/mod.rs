//! H.264/AVC 码流解析器.
//!
//! 提供 RTMP/FLV 场景下的 H.264 语法解析:
//! - AVCC 长度前缀 NAL 单元分割与类型识别
//! - AVCDecoderConfigurationRecord (sequence header) 解析
//! - SPS (Sequence Parameter Set) 解析, 推导分辨率和帧率
//! - PPS (Picture Parameter Set) 解析
//!
//! 所有入口都是无状态的纯函数, 输入为完整字节缓冲区.

pub mod config_record;
pub mod nal;
pub mod pps;
pub mod sps;
mod syntax;

pub use config_record::{AvcDecoderConfigRecord, parse_avc_config};
pub use nal::{
    NalUnitType, Nalu, NaluStream, ParameterSet, Truncation, remove_emulation_prevention,
    split_avcc, split_avcc_with_config,
};
pub use pps::{PpsExtension, PpsInfo, parse_pps, parse_pps_with_config};
pub use sps::{
    AspectRatioInfo, ChromaLocInfo, ColourDescription, ConstraintFlags, CropOffsets,
    HighProfileFields, PicOrderCnt, SpsInfo, TimingInfo, VideoSignalType, VuiParameters,
    parse_sps, parse_sps_with_config,
};
