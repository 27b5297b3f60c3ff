//! 解析器配置.
//!
//! 配置对象只描述解析策略, 不保存任何跨调用状态.
//! 可由上层工具从 JSON/TOML 等格式反序列化, 缺省字段使用默认值.

use avcscope_core::{AvcError, AvcResult};
use serde::{Deserialize, Serialize};

/// 遇到未实现的语法结构 (scaling_list / slice_group_map) 时的处理策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnsupportedSyntaxPolicy {
    /// 返回 `UnsupportedFeature` 错误; PPS 扩展字段中的量化矩阵只使扩展被忽略
    #[default]
    Reject,
    /// 按语法消耗对应的位但不保留取值, 保证后续字段位置正确
    Skip,
}

/// H.264 解析器配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParserConfig {
    /// NALU 长度前缀字节数 (1-4, 对应 lengthSizeMinusOne + 1)
    #[serde(default = "default_nalu_length_size")]
    pub nalu_length_size: u8,
    /// 分割 NALU 时是否尝试解析 SPS/PPS
    #[serde(default = "default_true")]
    pub decode_parameter_sets: bool,
    /// scaling_list / slice_group_map 处理策略
    #[serde(default)]
    pub unsupported_syntax: UnsupportedSyntaxPolicy,
}

fn default_nalu_length_size() -> u8 {
    4
}

fn default_true() -> bool {
    true
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            nalu_length_size: default_nalu_length_size(),
            decode_parameter_sets: true,
            unsupported_syntax: UnsupportedSyntaxPolicy::default(),
        }
    }
}

impl ParserConfig {
    /// 设置 NALU 长度前缀字节数
    pub fn with_nalu_length_size(mut self, length_size: u8) -> Self {
        self.nalu_length_size = length_size;
        self
    }

    /// 设置未实现语法结构的处理策略
    pub fn with_unsupported_syntax(mut self, policy: UnsupportedSyntaxPolicy) -> Self {
        self.unsupported_syntax = policy;
        self
    }

    /// 设置是否解析 NALU 中的 SPS/PPS
    pub fn with_decode_parameter_sets(mut self, enabled: bool) -> Self {
        self.decode_parameter_sets = enabled;
        self
    }

    /// 校验配置
    pub fn validate(&self) -> AvcResult<()> {
        if !(1..=4).contains(&self.nalu_length_size) {
            return Err(AvcError::InvalidArgument(format!(
                "nalu_length_size 必须在 1-4 之间, 实际为 {}",
                self.nalu_length_size
            )));
        }
        Ok(())
    }
}
