//! H.264 NAL 单元分割 (AVCC 长度前缀格式).
//!
//! RTMP VideoData 的 NALU 包 (AVCPacketType=1) 不使用起始码,
//! 每个 NAL 单元前有一个大端长度前缀:
//! ```text
//! [length: N bytes BE] [NAL data: length bytes] [length] [NAL data] ...
//! ```
//! N 通常为 4, 由 AVCDecoderConfigurationRecord 的 lengthSizeMinusOne + 1 给出.
//!
//! # NAL 头部 (1 字节)
//! ```text
//! ┌────────────────────────────────────┐
//! │ forbidden(1) | ref_idc(2) | type(5) │
//! └────────────────────────────────────┘
//! ```
//!
//! 尾部不完整的 NAL 单元不视为错误, 通过 [`Truncation`] 报告.

use avcscope_core::{AvcError, AvcResult};
use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;
use log::{debug, trace};
use serde::{Serialize, Serializer};

use super::pps::{PpsInfo, parse_pps_with_config};
use super::sps::{SpsInfo, parse_sps_with_config};
use crate::config::ParserConfig;

/// NAL 单元类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NalUnitType {
    /// 非 IDR 图像切片 (P/B slice)
    Slice,
    /// IDR 图像切片 (关键帧)
    SliceIdr,
    /// 增补增强信息 (SEI)
    Sei,
    /// 序列参数集 (SPS)
    Sps,
    /// 图像参数集 (PPS)
    Pps,
    /// 访问单元分隔符 (AUD)
    Aud,
    /// 序列结束
    EndOfSequence,
    /// 流结束
    EndOfStream,
    /// 其他类型, 不做解析
    Unknown(u8),
}

impl NalUnitType {
    /// 从 NAL 类型编号创建
    pub fn from_type_id(type_id: u8) -> Self {
        match type_id {
            1 => Self::Slice,
            5 => Self::SliceIdr,
            6 => Self::Sei,
            7 => Self::Sps,
            8 => Self::Pps,
            9 => Self::Aud,
            10 => Self::EndOfSequence,
            11 => Self::EndOfStream,
            _ => Self::Unknown(type_id),
        }
    }

    /// 获取类型编号
    pub fn type_id(&self) -> u8 {
        match self {
            Self::Slice => 1,
            Self::SliceIdr => 5,
            Self::Sei => 6,
            Self::Sps => 7,
            Self::Pps => 8,
            Self::Aud => 9,
            Self::EndOfSequence => 10,
            Self::EndOfStream => 11,
            Self::Unknown(id) => *id,
        }
    }

    /// 是否为图像切片
    pub fn is_slice(&self) -> bool {
        matches!(self, Self::Slice | Self::SliceIdr)
    }
}

impl std::fmt::Display for NalUnitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Slice => write!(f, "P/B-slice"),
            Self::SliceIdr => write!(f, "IDR-slice"),
            Self::Sei => write!(f, "SEI"),
            Self::Sps => write!(f, "SPS"),
            Self::Pps => write!(f, "PPS"),
            Self::Aud => write!(f, "AUD"),
            Self::EndOfSequence => write!(f, "End-of-sequence"),
            Self::EndOfStream => write!(f, "End-of-stream"),
            Self::Unknown(id) => write!(f, "Unknown({id})"),
        }
    }
}

impl Serialize for NalUnitType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// 从 NALU 中解析出的参数集
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value")]
pub enum ParameterSet {
    Sps(SpsInfo),
    Pps(PpsInfo),
}

/// 分割得到的 NAL 单元
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Nalu {
    /// nal_unit_type 原始编号 (头部低 5 位)
    pub nal_unit_type: u8,
    /// NAL 单元类型
    pub nal_type: NalUnitType,
    /// nal_ref_idc (参考重要性, 0-3)
    pub ref_idc: u8,
    /// forbidden_zero_bit, 置位只做报告不拒绝
    pub forbidden_bit: bool,
    /// NAL 单元原始数据 (含头部字节, 与输入共享内存)
    pub data: Bytes,
    /// SPS/PPS 的解析结果, 解析失败或未启用时为 None
    pub decoded: Option<ParameterSet>,
}

impl Nalu {
    /// 解析 NAL 头部, 不解析负载
    pub fn from_bytes(data: Bytes) -> AvcResult<Self> {
        let Some(&header) = data.first() else {
            return Err(AvcError::InvalidArgument("NAL 单元数据为空".into()));
        };
        let nal_unit_type = header & 0x1F;
        Ok(Self {
            nal_unit_type,
            nal_type: NalUnitType::from_type_id(nal_unit_type),
            ref_idc: (header >> 5) & 0x03,
            forbidden_bit: header & 0x80 != 0,
            data,
            decoded: None,
        })
    }

    /// 负载部分 (不含头部字节, 未去除防竞争字节), 数据为空时返回空切片
    pub fn payload(&self) -> &[u8] {
        self.data.get(1..).unwrap_or_default()
    }

    /// RBSP 数据 (去除头部字节和防竞争字节)
    pub fn rbsp(&self) -> Vec<u8> {
        remove_emulation_prevention(self.payload())
    }

    /// SPS 解析结果
    pub fn sps(&self) -> Option<&SpsInfo> {
        match &self.decoded {
            Some(ParameterSet::Sps(sps)) => Some(sps),
            _ => None,
        }
    }

    /// PPS 解析结果
    pub fn pps(&self) -> Option<&PpsInfo> {
        match &self.decoded {
            Some(ParameterSet::Pps(pps)) => Some(pps),
            _ => None,
        }
    }

    /// 对 SPS/PPS 类型尝试解析参数集
    ///
    /// 失败不影响 NAL 单元本身, 仅记录 debug 日志.
    fn decode_parameter_set(&mut self, config: &ParserConfig) {
        let result = match self.nal_type {
            NalUnitType::Sps => parse_sps_with_config(&self.data, config).map(ParameterSet::Sps),
            NalUnitType::Pps => parse_pps_with_config(&self.data, config).map(ParameterSet::Pps),
            _ => return,
        };
        match result {
            Ok(ps) => self.decoded = Some(ps),
            Err(e) => debug!("{} 解析失败, len={}: {}", self.nal_type, self.data.len(), e),
        }
    }
}

/// NALU 流尾部截断信息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Truncation {
    /// 截断处的字节偏移 (长度前缀起点)
    pub offset: usize,
    /// 声明的 NAL 长度, 长度前缀本身不完整时为 None
    pub declared_len: Option<u32>,
    /// 偏移处剩余的字节数
    pub remaining: usize,
}

/// NALU 分割结果
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NaluStream {
    pub nalus: Vec<Nalu>,
    /// 尾部数据不完整时存在
    pub truncation: Option<Truncation>,
}

impl NaluStream {
    /// 是否有被丢弃的尾部数据
    pub fn is_truncated(&self) -> bool {
        self.truncation.is_some()
    }

    /// 按顺序遍历 NAL 单元
    pub fn iter(&self) -> std::slice::Iter<'_, Nalu> {
        self.nalus.iter()
    }
}

/// 按默认配置 (4 字节长度前缀) 分割 NALU 流
///
/// # 示例
/// ```
/// use avcscope_codec::parsers::h264::{NalUnitType, split_avcc};
/// use bytes::Bytes;
///
/// let data = Bytes::from_static(&[0, 0, 0, 1, 0x09, 0, 0, 0, 9]);
/// let stream = split_avcc(&data);
/// assert_eq!(stream.nalus.len(), 1);
/// assert_eq!(stream.nalus[0].nal_type, NalUnitType::Aud);
/// assert!(stream.is_truncated());
/// ```
pub fn split_avcc(data: &Bytes) -> NaluStream {
    split_nalus(data, &ParserConfig::default())
}

/// 按指定配置分割 NALU 流
///
/// 配置中的长度前缀不在 1-4 之间时返回 `InvalidArgument`.
pub fn split_avcc_with_config(data: &Bytes, config: &ParserConfig) -> AvcResult<NaluStream> {
    config.validate()?;
    Ok(split_nalus(data, config))
}

fn split_nalus(data: &Bytes, config: &ParserConfig) -> NaluStream {
    let length_size = usize::from(config.nalu_length_size);
    let mut stream = NaluStream::default();
    let mut pos = 0;

    while pos < data.len() {
        let remaining = data.len() - pos;
        if remaining < length_size {
            stream.truncation = Some(Truncation {
                offset: pos,
                declared_len: None,
                remaining,
            });
            break;
        }

        let nal_len = BigEndian::read_uint(&data[pos..pos + length_size], length_size) as u32;
        let body = remaining - length_size;
        if nal_len as usize > body {
            stream.truncation = Some(Truncation {
                offset: pos,
                declared_len: Some(nal_len),
                remaining,
            });
            break;
        }

        let start = pos + length_size;
        let end = start + nal_len as usize;
        pos = end;
        if nal_len == 0 {
            trace!("跳过空 NAL 单元, offset={}", start - length_size);
            continue;
        }

        // nal_len > 0, 头部字节一定存在
        let Ok(mut nalu) = Nalu::from_bytes(data.slice(start..end)) else {
            continue;
        };
        trace!(
            "NAL 单元: type={} ({}), ref_idc={}, len={}",
            nalu.nal_unit_type, nalu.nal_type, nalu.ref_idc, nal_len
        );
        if config.decode_parameter_sets {
            nalu.decode_parameter_set(config);
        }
        stream.nalus.push(nalu);
    }

    if let Some(t) = &stream.truncation {
        debug!(
            "NALU 流尾部截断: offset={}, declared_len={:?}, remaining={}",
            t.offset, t.declared_len, t.remaining
        );
    }
    stream
}

/// 移除 emulation prevention 字节 (0x00 0x00 0x03 → 0x00 0x00)
///
/// 编码端在 RBSP 中每出现两个连续 0x00 且下一字节 <= 0x03 时插入 0x03,
/// 解析参数集前需要还原.
pub fn remove_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut rbsp = Vec::with_capacity(data.len());
    let mut zeros = 0usize;

    for &b in data {
        if zeros >= 2 && b == 0x03 {
            zeros = 0;
            continue;
        }
        zeros = if b == 0x00 { zeros + 1 } else { 0 };
        rbsp.push(b);
    }

    rbsp
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UnsupportedSyntaxPolicy;

    fn avcc(nalus: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for nalu in nalus {
            out.extend_from_slice(&(nalu.len() as u32).to_be_bytes());
            out.extend_from_slice(nalu);
        }
        out
    }

    #[test]
    fn test_nal_type_table() {
        let expected = [
            (1, "P/B-slice"),
            (5, "IDR-slice"),
            (6, "SEI"),
            (7, "SPS"),
            (8, "PPS"),
            (9, "AUD"),
            (10, "End-of-sequence"),
            (11, "End-of-stream"),
            (2, "Unknown(2)"),
            (31, "Unknown(31)"),
        ];
        for (id, name) in expected {
            let t = NalUnitType::from_type_id(id);
            assert_eq!(t.to_string(), name, "type_id={}", id);
            assert_eq!(t.type_id(), id);
        }
        assert!(NalUnitType::SliceIdr.is_slice());
        assert!(!NalUnitType::Sei.is_slice());
    }

    #[test]
    fn test_nalu_header_fields() {
        let nalu = Nalu::from_bytes(Bytes::from_static(&[0x65, 0x88])).expect("解析 NAL 头失败");
        assert_eq!(nalu.nal_type, NalUnitType::SliceIdr);
        assert_eq!(nalu.ref_idc, 3);
        assert!(!nalu.forbidden_bit);
        assert_eq!(nalu.payload(), &[0x88]);

        let nalu = Nalu::from_bytes(Bytes::from_static(&[0x86])).expect("解析 NAL 头失败");
        assert!(nalu.forbidden_bit, "forbidden_zero_bit 应被报告而不是拒绝");
        assert_eq!(nalu.nal_type, NalUnitType::Sei);
        assert_eq!(nalu.ref_idc, 0);

        assert!(Nalu::from_bytes(Bytes::new()).is_err());
    }

    #[test]
    fn test_nalu_payload_of_empty_data() {
        // 字段是公开的, 调用方可以直接构造空数据的 Nalu
        let nalu = Nalu {
            nal_unit_type: 9,
            nal_type: NalUnitType::Aud,
            ref_idc: 0,
            forbidden_bit: false,
            data: Bytes::new(),
            decoded: None,
        };
        assert!(nalu.payload().is_empty());
        assert!(nalu.rbsp().is_empty());
    }

    #[test]
    fn test_split_sps_pps_types() {
        let data = Bytes::from_static(&[0, 0, 0, 1, 0x67, 0, 0, 0, 1, 0x08]);
        let stream = split_avcc(&data);
        assert_eq!(stream.nalus.len(), 2);
        assert_eq!(stream.nalus[0].nal_unit_type, 7);
        assert_eq!(stream.nalus[1].nal_unit_type, 8);
        assert!(!stream.is_truncated());
        // 单字节 SPS/PPS 无法解析, 但不影响分割
        assert!(stream.nalus[0].decoded.is_none());
        assert!(stream.nalus[1].decoded.is_none());
    }

    #[test]
    fn test_split_trailing_bytes_truncation() {
        let mut data = avcc(&[&[0x65, 0x88, 0x84]]);
        data.extend_from_slice(&[0x00, 0x00, 0x01]);
        let stream = split_avcc(&Bytes::from(data));
        assert_eq!(stream.nalus.len(), 1);
        assert_eq!(
            stream.truncation,
            Some(Truncation {
                offset: 7,
                declared_len: None,
                remaining: 3,
            })
        );
    }

    #[test]
    fn test_split_declared_length_exceeds_remaining() {
        let data = Bytes::from_static(&[0, 0, 0, 2, 0x09, 0xF0, 0, 0, 0, 10, 0x65, 0x88]);
        let stream = split_avcc(&data);
        assert_eq!(stream.nalus.len(), 1);
        assert_eq!(stream.nalus[0].nal_type, NalUnitType::Aud);
        assert_eq!(
            stream.truncation,
            Some(Truncation {
                offset: 6,
                declared_len: Some(10),
                remaining: 6,
            })
        );
    }

    #[test]
    fn test_split_skips_zero_length_nalu() {
        let data = Bytes::from_static(&[0, 0, 0, 0, 0, 0, 0, 1, 0x09]);
        let stream = split_avcc(&data);
        assert_eq!(stream.nalus.len(), 1);
        assert_eq!(stream.nalus[0].nal_type, NalUnitType::Aud);
        assert!(!stream.is_truncated());
    }

    #[test]
    fn test_split_shares_input_memory() {
        let data = Bytes::from(avcc(&[&[0x09, 0xF0], &[0x41, 0x9A, 0x02]]));
        let stream = split_avcc(&data);
        assert_eq!(stream.nalus.len(), 2);
        assert_eq!(stream.nalus[1].data.as_ref(), &[0x41, 0x9A, 0x02]);
        assert_eq!(
            stream.nalus[1].data.as_ptr(),
            data[10..].as_ptr(),
            "NAL 数据应为输入的零拷贝切片"
        );
    }

    #[test]
    fn test_split_with_length_size_2() {
        let data = Bytes::from_static(&[0, 2, 0x09, 0xF0, 0, 1, 0x0A]);
        let config = ParserConfig::default().with_nalu_length_size(2);
        let stream = split_avcc_with_config(&data, &config).expect("分割失败");
        let types: Vec<_> = stream.iter().map(|n| n.nal_type).collect();
        assert_eq!(types, vec![NalUnitType::Aud, NalUnitType::EndOfSequence]);
    }

    #[test]
    fn test_split_reject_invalid_length_size() {
        let data = Bytes::from_static(&[0, 0, 0, 1, 0x09]);
        let config = ParserConfig::default().with_nalu_length_size(5);
        assert!(matches!(
            split_avcc_with_config(&data, &config),
            Err(AvcError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_split_decodes_parameter_sets() {
        // Baseline 176x128 SPS 与最简 PPS
        let sps = [0x67, 0x42, 0xC0, 0x1E, 0xED, 0x05, 0x88, 0xC8];
        let pps = [0x68, 0xCE, 0x3C, 0x80];
        let data = Bytes::from(avcc(&[&sps, &pps]));

        let stream = split_avcc(&data);
        let sps_info = stream.nalus[0].sps().expect("SPS 应被解析");
        assert_eq!((sps_info.width, sps_info.height), (176, 128));
        let pps_info = stream.nalus[1].pps().expect("PPS 应被解析");
        assert_eq!(pps_info.pic_parameter_set_id, 0);

        let config = ParserConfig::default()
            .with_decode_parameter_sets(false)
            .with_unsupported_syntax(UnsupportedSyntaxPolicy::Skip);
        let stream = split_avcc_with_config(&data, &config).expect("分割失败");
        assert!(stream.iter().all(|n| n.decoded.is_none()));
    }

    #[test]
    fn test_emulation_prevention_remove() {
        let data = [0x01, 0x00, 0x00, 0x03, 0x02, 0x03];
        assert_eq!(
            remove_emulation_prevention(&data),
            vec![0x01, 0x00, 0x00, 0x02, 0x03]
        );
    }

    #[test]
    fn test_emulation_prevention_consecutive() {
        let data = [0x00, 0x00, 0x03, 0x00, 0x00, 0x03, 0x01];
        assert_eq!(
            remove_emulation_prevention(&data),
            vec![0x00, 0x00, 0x00, 0x00, 0x01]
        );
    }

    #[test]
    fn test_emulation_prevention_keeps_data_03() {
        // `00 00 03 03` 中只有第一个 0x03 是防竞争字节
        let data = [0x00, 0x00, 0x03, 0x03, 0x80];
        assert_eq!(
            remove_emulation_prevention(&data),
            vec![0x00, 0x00, 0x03, 0x80]
        );
        // 无 00 00 前缀的 0x03 保留
        assert_eq!(remove_emulation_prevention(&[0x00, 0x03]), vec![0x00, 0x03]);
    }
}
