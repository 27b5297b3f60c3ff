//! # avcscope-core
//!
//! avcscope 核心库, 提供比特流读写工具和统一错误类型.
//!
//! 上层的 H.264 参数集解析 (`avcscope-codec`) 与 VideoData tag 解析
//! (`avcscope-format`) 都建立在本 crate 之上.

pub mod bitreader;
pub mod bitwriter;
pub mod error;

// 重导出常用类型
pub use bitreader::BitReader;
pub use bitwriter::BitWriter;
pub use error::{AvcError, AvcResult};
