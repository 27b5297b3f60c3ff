//! # avcscope-codec
//!
//! H.264 (AVC) 码流语法解析库.
//!
//! 只解析语法层 (NAL 单元、AVCDecoderConfigurationRecord、SPS/PPS),
//! 不做实际的视频解码. 解析行为由 [`ParserConfig`] 控制.

pub mod config;
pub mod parsers;

pub use config::{ParserConfig, UnsupportedSyntaxPolicy};
