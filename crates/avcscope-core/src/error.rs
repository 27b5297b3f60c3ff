//! 统一错误类型定义.
//!
//! 所有 avcscope crate 共用的错误类型. 每个变体都携带足够的上下文
//! (组件、字段名、偏移量), 便于定位损坏的输入.

use thiserror::Error;

/// avcscope 统一错误类型
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AvcError {
    /// 比特流读取越界
    #[error("比特流数据不足: bit_offset={bit_offset}, 需要 {requested} 位, 剩余 {available} 位")]
    OutOfData {
        /// 发生越界时已读取的位数
        bit_offset: usize,
        /// 请求读取的位数
        requested: u32,
        /// 剩余可读位数
        available: usize,
    },

    /// Exp-Golomb 前导零超过 31 个, 无法用 u32 表示
    #[error("Exp-Golomb 前导零过多: bit_offset={bit_offset}")]
    ExpGolombOverflow {
        /// 码字起始位置
        bit_offset: usize,
    },

    /// 无效参数
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// AVCDecoderConfigurationRecord 过短或长度字段越界
    #[error("AVCDecoderConfigurationRecord 格式错误: offset={offset}, {reason}")]
    MalformedRecord {
        /// 出错字段的字节偏移
        offset: usize,
        /// 错误原因
        reason: String,
    },

    /// NALU 类型与解码器不匹配
    #[error("NALU 类型不匹配: 期望 {expected}, 实际 {actual}")]
    WrongNaluType {
        /// 期望的 nal_unit_type
        expected: u8,
        /// 实际的 nal_unit_type
        actual: u8,
    },

    /// VideoData tag 为空或长度不足
    #[error("VideoData tag 无效: {0}")]
    InvalidTag(String),

    /// SPS 码流在读取某字段时耗尽
    #[error("SPS 数据截断: 读取 {field} 时越界, byte_offset={byte_offset}")]
    TruncatedSps {
        /// 正在读取的语法元素
        field: &'static str,
        /// RBSP 中的字节偏移
        byte_offset: usize,
    },

    /// PPS 码流在读取某字段时耗尽
    #[error("PPS 数据截断: 读取 {field} 时越界, byte_offset={byte_offset}")]
    TruncatedPps {
        /// 正在读取的语法元素
        field: &'static str,
        /// RBSP 中的字节偏移
        byte_offset: usize,
    },

    /// 码流使用了未实现的语法结构
    #[error("{component}: 不支持的特性 {feature}")]
    UnsupportedFeature {
        /// 出错组件 (SPS / PPS)
        component: &'static str,
        /// 特性名称
        feature: &'static str,
    },

    /// 字段取值超出合法范围
    #[error("{component}: 字段取值非法, {field}={value}")]
    InvalidValue {
        /// 出错组件
        component: &'static str,
        /// 字段名
        field: &'static str,
        /// 实际取值
        value: i64,
    },
}

/// avcscope 统一 Result 类型
pub type AvcResult<T> = Result<T, AvcError>;
