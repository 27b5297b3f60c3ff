//! # avcscope-format
//!
//! RTMP/FLV VideoData tag 解析库.
//!
//! 解释 tag 头部 (FrameType / CodecID / AVCPacketType / CompositionTime),
//! 并把 AVC 负载分派给 `avcscope-codec` 中的 H.264 解析器.

pub mod video_tag;

pub use video_tag::{
    AvcPacketType, CodecId, FrameType, SequenceHeader, VideoTagParser, VideoTagResult,
    parse_video_tag,
};
