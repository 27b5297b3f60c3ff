//! RTMP/FLV VideoData tag 解析.
//!
//! # VideoData 结构
//! ```text
//! FrameType (4 bits): 1=keyframe, 2=inter, 3=disposable inter, 4=generated keyframe
//! CodecID (4 bits): 2=H.263, 4=VP6, 7=AVC(H.264), 12=HEVC, ...
//! [AVC: AVCPacketType (1 byte): 0=SeqHeader, 1=NALU, 2=EndOfSeq]
//! [AVC: CompositionTime (3 bytes, BE, signed)]
//! [AVC: AVCDecoderConfigurationRecord 或长度前缀 NAL 单元]
//! ```
//!
//! 解析器不保存跨调用状态. NALU 包的长度前缀大小取自 [`ParserConfig`],
//! 不会从之前收到的 sequence header 中继承.

use avcscope_codec::parsers::h264::{
    AvcDecoderConfigRecord, Nalu, PpsInfo, SpsInfo, Truncation, parse_avc_config,
    parse_pps_with_config, parse_sps_with_config, split_avcc_with_config,
};
use avcscope_codec::ParserConfig;
use avcscope_core::{AvcError, AvcResult};
use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;
use log::{debug, trace};
use serde::{Serialize, Serializer};

/// AVC tag 头部长度: VideoData 头 + AVCPacketType + CompositionTime
const AVC_HEADER_LEN: usize = 5;

/// 帧类型 (VideoData 第一字节高 4 位)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    Keyframe,
    Interframe,
    DisposableInterframe,
    GeneratedKeyframe,
    Unknown(u8),
}

impl FrameType {
    pub fn from_id(id: u8) -> Self {
        match id {
            1 => Self::Keyframe,
            2 => Self::Interframe,
            3 => Self::DisposableInterframe,
            4 => Self::GeneratedKeyframe,
            _ => Self::Unknown(id),
        }
    }

    pub fn id(&self) -> u8 {
        match self {
            Self::Keyframe => 1,
            Self::Interframe => 2,
            Self::DisposableInterframe => 3,
            Self::GeneratedKeyframe => 4,
            Self::Unknown(id) => *id,
        }
    }

    /// 是否为关键帧
    pub fn is_keyframe(&self) -> bool {
        matches!(self, Self::Keyframe | Self::GeneratedKeyframe)
    }
}

impl std::fmt::Display for FrameType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Keyframe => write!(f, "Keyframe"),
            Self::Interframe => write!(f, "Interframe"),
            Self::DisposableInterframe => write!(f, "Disposable interframe"),
            Self::GeneratedKeyframe => write!(f, "Generated keyframe"),
            Self::Unknown(id) => write!(f, "Unknown({id})"),
        }
    }
}

/// 视频编解码器 ID (VideoData 第一字节低 4 位)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecId {
    SorensonH263,
    ScreenVideo,
    Vp6,
    Vp6Alpha,
    ScreenVideoV2,
    /// H.264
    Avc,
    /// H.265, 只识别不解析
    Hevc,
    Unknown(u8),
}

impl CodecId {
    pub fn from_id(id: u8) -> Self {
        match id {
            2 => Self::SorensonH263,
            3 => Self::ScreenVideo,
            4 => Self::Vp6,
            5 => Self::Vp6Alpha,
            6 => Self::ScreenVideoV2,
            7 => Self::Avc,
            12 => Self::Hevc,
            _ => Self::Unknown(id),
        }
    }

    pub fn id(&self) -> u8 {
        match self {
            Self::SorensonH263 => 2,
            Self::ScreenVideo => 3,
            Self::Vp6 => 4,
            Self::Vp6Alpha => 5,
            Self::ScreenVideoV2 => 6,
            Self::Avc => 7,
            Self::Hevc => 12,
            Self::Unknown(id) => *id,
        }
    }
}

impl std::fmt::Display for CodecId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SorensonH263 => write!(f, "Sorenson H.263"),
            Self::ScreenVideo => write!(f, "Screen video"),
            Self::Vp6 => write!(f, "On2 VP6"),
            Self::Vp6Alpha => write!(f, "On2 VP6 with alpha"),
            Self::ScreenVideoV2 => write!(f, "Screen video v2"),
            Self::Avc => write!(f, "AVC"),
            Self::Hevc => write!(f, "HEVC"),
            Self::Unknown(id) => write!(f, "Unknown({id})"),
        }
    }
}

/// AVCPacketType
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AvcPacketType {
    /// AVCDecoderConfigurationRecord
    SequenceHeader,
    /// 长度前缀 NAL 单元
    Nalu,
    EndOfSequence,
    Unknown(u8),
}

impl AvcPacketType {
    pub fn from_id(id: u8) -> Self {
        match id {
            0 => Self::SequenceHeader,
            1 => Self::Nalu,
            2 => Self::EndOfSequence,
            _ => Self::Unknown(id),
        }
    }

    pub fn id(&self) -> u8 {
        match self {
            Self::SequenceHeader => 0,
            Self::Nalu => 1,
            Self::EndOfSequence => 2,
            Self::Unknown(id) => *id,
        }
    }
}

impl std::fmt::Display for AvcPacketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SequenceHeader => write!(f, "Sequence header"),
            Self::Nalu => write!(f, "NALU"),
            Self::EndOfSequence => write!(f, "End of sequence"),
            Self::Unknown(id) => write!(f, "Unknown({id})"),
        }
    }
}

macro_rules! serialize_as_display {
    ($($ty:ty),*) => {
        $(
            impl Serialize for $ty {
                fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                    serializer.collect_str(self)
                }
            }
        )*
    };
}

serialize_as_display!(FrameType, CodecId, AvcPacketType);

/// AVC sequence header 及其中每个参数集的解析结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SequenceHeader {
    pub record: AvcDecoderConfigRecord,
    /// 与 `record.sps_list` 一一对应, 单个失败不影响其他
    #[serde(serialize_with = "serialize_results")]
    pub sps: Vec<AvcResult<SpsInfo>>,
    /// 与 `record.pps_list` 一一对应
    #[serde(serialize_with = "serialize_results")]
    pub pps: Vec<AvcResult<PpsInfo>>,
}

impl SequenceHeader {
    /// 第一个解析成功的 SPS
    pub fn first_sps(&self) -> Option<&SpsInfo> {
        self.sps.iter().find_map(|r| r.as_ref().ok())
    }
}

fn serialize_results<T: Serialize, S: Serializer>(
    results: &[AvcResult<T>],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    #[derive(Serialize)]
    #[serde(rename_all = "snake_case")]
    enum Entry<'a, T> {
        Ok(&'a T),
        Error(String),
    }

    serializer.collect_seq(results.iter().map(|r| match r {
        Ok(v) => Entry::Ok(v),
        Err(e) => Entry::Error(e.to_string()),
    }))
}

/// VideoData tag 解析结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoTagResult {
    pub frame_type: FrameType,
    pub codec_id: CodecId,
    /// 仅 AVC 存在
    pub avc_packet_type: Option<AvcPacketType>,
    /// 仅 AVC 存在, 有符号 24 位 (毫秒)
    pub composition_time: Option<i32>,
    /// AVCPacketType=0 时存在
    pub sequence_header: Option<SequenceHeader>,
    /// AVCPacketType=1 时的 NAL 单元
    pub nalus: Vec<Nalu>,
    /// NAL 单元流尾部截断信息
    pub truncation: Option<Truncation>,
    /// 未解析的负载 (非 AVC 编码或未知 AVCPacketType)
    pub payload: Option<Bytes>,
}

impl VideoTagResult {
    fn header_only(frame_type: FrameType, codec_id: CodecId) -> Self {
        Self {
            frame_type,
            codec_id,
            avc_packet_type: None,
            composition_time: None,
            sequence_header: None,
            nalus: Vec::new(),
            truncation: None,
            payload: None,
        }
    }
}

/// VideoData tag 解析器
///
/// 只持有不可变配置, 可在多线程间共享.
///
/// # 示例
/// ```
/// use avcscope_format::{CodecId, FrameType, VideoTagParser};
///
/// let parser = VideoTagParser::new();
/// let tag = parser.parse(vec![0x17u8, 0x02, 0x00, 0x00, 0x00]).unwrap();
/// assert_eq!(tag.frame_type, FrameType::Keyframe);
/// assert_eq!(tag.codec_id, CodecId::Avc);
/// assert!(tag.nalus.is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct VideoTagParser {
    config: ParserConfig,
}

impl VideoTagParser {
    /// 使用默认配置创建
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用指定配置创建, 配置非法时返回 `InvalidArgument`
    pub fn with_config(config: ParserConfig) -> AvcResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// 解析一个 VideoData tag 负载
    pub fn parse(&self, payload: impl Into<Bytes>) -> AvcResult<VideoTagResult> {
        let data: Bytes = payload.into();
        let Some(&header) = data.first() else {
            return Err(AvcError::InvalidTag("负载为空".into()));
        };

        let frame_type = FrameType::from_id(header >> 4);
        let codec_id = CodecId::from_id(header & 0x0F);
        let mut result = VideoTagResult::header_only(frame_type, codec_id);

        if codec_id != CodecId::Avc {
            debug!(
                "VideoData: codec={} ({}), frame_type={}, 负载 {} 字节不解析",
                codec_id,
                codec_id.id(),
                frame_type,
                data.len() - 1
            );
            result.payload = Some(data.slice(1..));
            return Ok(result);
        }

        if data.len() < AVC_HEADER_LEN {
            return Err(AvcError::InvalidTag(format!(
                "AVC tag 长度不足, 至少需要 {AVC_HEADER_LEN} 字节, 实际 {}",
                data.len()
            )));
        }

        let packet_type = AvcPacketType::from_id(data[1]);
        let composition_time = BigEndian::read_i24(&data[2..AVC_HEADER_LEN]);
        result.avc_packet_type = Some(packet_type);
        result.composition_time = Some(composition_time);
        let body = data.slice(AVC_HEADER_LEN..);
        trace!(
            "VideoData: frame_type={}, packet_type={}, cts={}, body={} 字节",
            frame_type,
            packet_type,
            composition_time,
            body.len()
        );

        match packet_type {
            AvcPacketType::SequenceHeader => {
                result.sequence_header = Some(self.parse_sequence_header(&body)?);
            }
            AvcPacketType::Nalu => {
                let stream = split_avcc_with_config(&body, &self.config)?;
                result.nalus = stream.nalus;
                result.truncation = stream.truncation;
            }
            AvcPacketType::EndOfSequence => {
                debug!("VideoData: 收到 AVC end of sequence");
            }
            AvcPacketType::Unknown(id) => {
                debug!("VideoData: 未知 AVCPacketType={}, 保留原始负载", id);
                result.payload = Some(body);
            }
        }

        Ok(result)
    }

    fn parse_sequence_header(&self, body: &Bytes) -> AvcResult<SequenceHeader> {
        let record = parse_avc_config(body)?;
        let sps: Vec<_> = record
            .sps_list
            .iter()
            .map(|blob| parse_sps_with_config(blob, &self.config))
            .collect();
        let pps: Vec<_> = record
            .pps_list
            .iter()
            .map(|blob| parse_pps_with_config(blob, &self.config))
            .collect();

        let errors = sps
            .iter()
            .filter_map(|r| r.as_ref().err())
            .chain(pps.iter().filter_map(|r| r.as_ref().err()));
        for err in errors {
            debug!("VideoData: sequence header 中参数集解析失败: {}", err);
        }
        debug!(
            "VideoData: 收到 AVC sequence header, profile={}, level={}, length_size={}, sps={}, pps={}",
            record.profile_indication,
            record.level_indication,
            record.nalu_length_size(),
            sps.len(),
            pps.len()
        );

        Ok(SequenceHeader { record, sps, pps })
    }
}

/// 按默认配置解析一个 VideoData tag 负载
pub fn parse_video_tag(payload: impl Into<Bytes>) -> AvcResult<VideoTagResult> {
    VideoTagParser::new().parse(payload)
}
