//! # avcscope
//!
//! RTMP VideoData tag 与 H.264 (AVC) 码流诊断解析库.
//!
//! 从抓取的 RTMP 视频消息中解析:
//! - **Tag 头部**: FrameType / CodecID / AVCPacketType / CompositionTime
//! - **Sequence header**: AVCDecoderConfigurationRecord 及其中的 SPS/PPS
//! - **NAL 单元**: 长度前缀分割、类型识别、参数集解析
//! - **推导信息**: 分辨率、裁剪后分辨率、帧率
//!
//! 不做实际的视频解码, 所有入口都是无状态的纯函数.
//!
//! # 快速开始
//!
//! ```rust
//! use avcscope::format::{AvcPacketType, parse_video_tag};
//!
//! // 关键帧, AVC, NALU 包, 一个 AUD
//! let tag = parse_video_tag(vec![0x17u8, 0x01, 0, 0, 0, 0, 0, 0, 2, 0x09, 0xF0]).unwrap();
//! assert_eq!(tag.avc_packet_type, Some(AvcPacketType::Nalu));
//! assert_eq!(tag.nalus[0].nal_type.to_string(), "AUD");
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `avcscope-core` | 比特流读写与错误类型 |
//! | `avcscope-codec` | H.264 语法解析 (NAL / avcC / SPS / PPS) |
//! | `avcscope-format` | RTMP/FLV VideoData tag 解析 |

/// 比特流读写与错误类型
pub use avcscope_core as core;

/// H.264 语法解析
pub use avcscope_codec as codec;

/// VideoData tag 解析
pub use avcscope_format as format;

pub use avcscope_codec::{ParserConfig, UnsupportedSyntaxPolicy};
pub use avcscope_core::{AvcError, AvcResult};
pub use avcscope_format::{VideoTagParser, VideoTagResult, parse_video_tag};

/// 获取 avcscope 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// 按默认配置解析一组连续的 VideoData tag 负载
///
/// 每个 tag 独立解析, 单个失败不影响其余 tag.
pub fn parse_video_tags<I, T>(payloads: I) -> Vec<AvcResult<VideoTagResult>>
where
    I: IntoIterator<Item = T>,
    T: Into<bytes::Bytes>,
{
    let parser = VideoTagParser::new();
    payloads.into_iter().map(|p| parser.parse(p)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(version(), "0.1.0");
    }

    #[test]
    fn test_parse_video_tags_independent() {
        let results = parse_video_tags(vec![
            vec![0x17u8, 0x02, 0, 0, 0],
            Vec::new(),
            vec![0x22u8, 0xAA],
        ]);
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(AvcError::InvalidTag(_))));
        assert!(results[2].is_ok());
    }
}
