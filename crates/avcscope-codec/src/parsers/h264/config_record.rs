//! AVCDecoderConfigurationRecord (ISO/IEC 14496-15) 解析.
//!
//! RTMP 的 AVC sequence header (AVCPacketType=0) 与 MP4 avcC box 内容相同:
//! ```text
//! configurationVersion(8) AVCProfileIndication(8) profile_compatibility(8)
//! AVCLevelIndication(8) reserved(6) lengthSizeMinusOne(2)
//! reserved(3) numOfSequenceParameterSets(5)
//!   { sequenceParameterSetLength(16) sequenceParameterSetNALUnit }
//! numOfPictureParameterSets(8)
//!   { pictureParameterSetLength(16) pictureParameterSetNALUnit }
//! ```
//! 解析是全有或全无的: 任何长度字段越界都返回 `MalformedRecord`.

use avcscope_core::{AvcError, AvcResult};
use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;
use log::debug;
use serde::Serialize;

/// 固定头部 (6 字节) 加 numOfPictureParameterSets 的最小长度
const MIN_RECORD_LEN: usize = 7;

/// AVCDecoderConfigurationRecord 解析结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvcDecoderConfigRecord {
    pub configuration_version: u8,
    pub profile_indication: u8,
    pub profile_compatibility: u8,
    pub level_indication: u8,
    /// NALU 长度前缀字节数减一 (0-3)
    pub length_size_minus_one: u8,
    /// SPS NAL 单元 (含头部字节), 与输入共享内存
    pub sps_list: Vec<Bytes>,
    /// PPS NAL 单元 (含头部字节), 与输入共享内存
    pub pps_list: Vec<Bytes>,
}

impl AvcDecoderConfigRecord {
    /// NALU 长度前缀字节数 (1-4)
    pub fn nalu_length_size(&self) -> u8 {
        self.length_size_minus_one + 1
    }

    /// 序列化为 AVCDecoderConfigurationRecord 字节
    ///
    /// 保留位按规范置 1. SPS 超过 31 个、PPS 超过 255 个或单个参数集超过 65535 字节时
    /// 返回 `InvalidArgument`.
    pub fn to_bytes(&self) -> AvcResult<Vec<u8>> {
        if self.length_size_minus_one > 3 {
            return Err(AvcError::InvalidArgument(format!(
                "lengthSizeMinusOne 超出范围: {}",
                self.length_size_minus_one
            )));
        }
        if self.sps_list.len() > 31 {
            return Err(AvcError::InvalidArgument(format!(
                "SPS 数量超出范围: {}",
                self.sps_list.len()
            )));
        }
        if self.pps_list.len() > 255 {
            return Err(AvcError::InvalidArgument(format!(
                "PPS 数量超出范围: {}",
                self.pps_list.len()
            )));
        }

        let mut out = vec![
            self.configuration_version,
            self.profile_indication,
            self.profile_compatibility,
            self.level_indication,
            0xFC | self.length_size_minus_one,
            0xE0 | self.sps_list.len() as u8,
        ];
        write_parameter_sets(&mut out, &self.sps_list)?;
        out.push(self.pps_list.len() as u8);
        write_parameter_sets(&mut out, &self.pps_list)?;
        Ok(out)
    }
}

fn write_parameter_sets(out: &mut Vec<u8>, list: &[Bytes]) -> AvcResult<()> {
    for ps in list {
        let len = u16::try_from(ps.len()).map_err(|_| {
            AvcError::InvalidArgument(format!("参数集长度超出 16 位: {}", ps.len()))
        })?;
        let mut len_buf = [0u8; 2];
        BigEndian::write_u16(&mut len_buf, len);
        out.extend_from_slice(&len_buf);
        out.extend_from_slice(ps);
    }
    Ok(())
}

/// 解析 AVCDecoderConfigurationRecord
///
/// PPS 列表之后的数据 (High Profile 的 chroma_format 等扩展字段) 被忽略.
///
/// # 示例
/// ```
/// use avcscope_codec::parsers::h264::parse_avc_config;
/// use bytes::Bytes;
///
/// let record = parse_avc_config(&Bytes::from_static(&[0x01, 0x64, 0x00, 0x1F, 0xFF, 0x00, 0x00]))
///     .unwrap();
/// assert_eq!(record.profile_indication, 100);
/// assert_eq!(record.nalu_length_size(), 4);
/// assert!(record.sps_list.is_empty() && record.pps_list.is_empty());
/// ```
pub fn parse_avc_config(data: &Bytes) -> AvcResult<AvcDecoderConfigRecord> {
    if data.len() < MIN_RECORD_LEN {
        return Err(AvcError::MalformedRecord {
            offset: data.len(),
            reason: format!("数据太短, 至少需要 {MIN_RECORD_LEN} 字节, 实际 {}", data.len()),
        });
    }

    let num_sps = usize::from(data[5] & 0x1F);
    let mut pos = 6;
    let sps_list = read_parameter_sets(data, &mut pos, num_sps, "SPS")?;

    let Some(&num_pps) = data.get(pos) else {
        return Err(AvcError::MalformedRecord {
            offset: pos,
            reason: "缺少 numOfPictureParameterSets 字段".into(),
        });
    };
    pos += 1;
    let pps_list = read_parameter_sets(data, &mut pos, usize::from(num_pps), "PPS")?;

    if pos < data.len() {
        debug!(
            "AVCDecoderConfigurationRecord 忽略尾部 {} 字节扩展数据",
            data.len() - pos
        );
    }

    Ok(AvcDecoderConfigRecord {
        configuration_version: data[0],
        profile_indication: data[1],
        profile_compatibility: data[2],
        level_indication: data[3],
        length_size_minus_one: data[4] & 0x03,
        sps_list,
        pps_list,
    })
}

fn read_parameter_sets(
    data: &Bytes,
    pos: &mut usize,
    count: usize,
    kind: &str,
) -> AvcResult<Vec<Bytes>> {
    let mut list = Vec::with_capacity(count);
    for i in 0..count {
        if *pos + 2 > data.len() {
            return Err(AvcError::MalformedRecord {
                offset: *pos,
                reason: format!("{kind} 长度字段截断, index={i}"),
            });
        }
        let len = usize::from(BigEndian::read_u16(&data[*pos..*pos + 2]));
        let start = *pos + 2;
        if start + len > data.len() {
            return Err(AvcError::MalformedRecord {
                offset: *pos,
                reason: format!(
                    "{kind} 数据截断, index={i}, declared_len={len}, remain={}",
                    data.len() - start
                ),
            });
        }
        list.push(data.slice(start..start + len));
        *pos = start + len;
    }
    Ok(list)
}
