//! 参数集语法元素读取.
//!
//! 在 BitReader 之上为每次读取附带语法元素名称, 数据耗尽时
//! 转换为 `TruncatedSps` / `TruncatedPps`, 指明出错字段及其字节偏移.

use avcscope_core::{AvcError, AvcResult, BitReader};

/// 参数集类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ParamSetKind {
    Sps,
    Pps,
}

impl ParamSetKind {
    pub(crate) fn name(self) -> &'static str {
        match self {
            Self::Sps => "SPS",
            Self::Pps => "PPS",
        }
    }

    fn truncated(self, field: &'static str, byte_offset: usize) -> AvcError {
        match self {
            Self::Sps => AvcError::TruncatedSps { field, byte_offset },
            Self::Pps => AvcError::TruncatedPps { field, byte_offset },
        }
    }
}

/// 带字段名的语法元素读取器
pub(crate) struct SyntaxReader<'a> {
    br: BitReader<'a>,
    kind: ParamSetKind,
}

impl<'a> SyntaxReader<'a> {
    pub(crate) fn new(rbsp: &'a [u8], kind: ParamSetKind) -> Self {
        Self {
            br: BitReader::new(rbsp),
            kind,
        }
    }

    fn wrap<T>(
        &mut self,
        field: &'static str,
        read: impl FnOnce(&mut BitReader<'a>) -> AvcResult<T>,
    ) -> AvcResult<T> {
        let byte_offset = self.br.byte_position();
        match read(&mut self.br) {
            Ok(value) => Ok(value),
            Err(AvcError::OutOfData { .. }) => Err(self.kind.truncated(field, byte_offset)),
            // 前导零一直延续到缓冲区末尾: 码流在该字段处被截断 (尾部补零)
            Err(AvcError::ExpGolombOverflow { .. }) if !has_set_bit_from(&self.br) => {
                Err(self.kind.truncated(field, byte_offset))
            }
            Err(AvcError::ExpGolombOverflow { .. }) => Err(AvcError::InvalidValue {
                component: self.kind.name(),
                field,
                value: i64::from(u32::MAX),
            }),
            Err(other) => Err(other),
        }
    }

    /// u(n)
    pub(crate) fn u(&mut self, n: u32, field: &'static str) -> AvcResult<u32> {
        self.wrap(field, |br| br.read_bits(n))
    }

    /// u(8), 直接返回字节
    pub(crate) fn u8(&mut self, field: &'static str) -> AvcResult<u8> {
        Ok(self.u(8, field)? as u8)
    }

    /// u(1) 标志位
    pub(crate) fn flag(&mut self, field: &'static str) -> AvcResult<bool> {
        self.wrap(field, |br| br.read_flag())
    }

    /// ue(v)
    pub(crate) fn ue(&mut self, field: &'static str) -> AvcResult<u32> {
        self.wrap(field, |br| br.read_ue())
    }

    /// se(v)
    pub(crate) fn se(&mut self, field: &'static str) -> AvcResult<i32> {
        self.wrap(field, |br| br.read_se())
    }

    /// 读取 ue(v) 并检查上限
    pub(crate) fn ue_max(&mut self, field: &'static str, max: u32) -> AvcResult<u32> {
        let value = self.ue(field)?;
        if value > max {
            return Err(AvcError::InvalidValue {
                component: self.kind.name(),
                field,
                value: i64::from(value),
            });
        }
        Ok(value)
    }

    pub(crate) fn more_rbsp_data(&self) -> bool {
        self.br.more_rbsp_data()
    }

    /// 按 scaling_list() 语法消耗一个列表, 不保留取值
    ///
    /// next_scale 变为 0 后其余系数沿用上一个值, 不再占用码流.
    pub(crate) fn skip_scaling_list(&mut self, size: usize) -> AvcResult<()> {
        let mut last_scale = 8i32;
        let mut next_scale = 8i32;
        for _ in 0..size {
            if next_scale != 0 {
                let delta = self.se("delta_scale")?;
                if !(-128..=127).contains(&delta) {
                    return Err(AvcError::InvalidValue {
                        component: self.kind.name(),
                        field: "delta_scale",
                        value: i64::from(delta),
                    });
                }
                next_scale = (last_scale + delta + 256).rem_euclid(256);
            }
            if next_scale != 0 {
                last_scale = next_scale;
            }
        }
        Ok(())
    }
}

/// 读取位置之后是否还有置位的比特
fn has_set_bit_from(br: &BitReader<'_>) -> bool {
    let data = br.data();
    let pos = br.bits_read();
    let byte = pos / 8;
    let Some(&current) = data.get(byte) else {
        return false;
    };
    let mask = 0xFFu8 >> (pos % 8);
    current & mask != 0 || data[byte + 1..].iter().any(|&b| b != 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use avcscope_core::BitWriter;

    #[test]
    fn test_truncation_names_field_and_offset() {
        // 2 个完整字节后数据耗尽
        let data = [0xFF, 0x00];
        let mut sr = SyntaxReader::new(&data, ParamSetKind::Pps);
        assert_eq!(sr.u8("first").expect("读取 first 失败"), 0xFF);
        let err = sr.ue("second").expect_err("全零尾部应截断");
        assert_eq!(
            err,
            AvcError::TruncatedPps {
                field: "second",
                byte_offset: 1,
            }
        );
    }

    #[test]
    fn test_zero_tail_reported_as_truncation() {
        // 一个完整字节后全是零: ue 前导零超过 31 个, 但实为截断
        let data = [0xFF, 0x00, 0x00, 0x00, 0x00, 0x00];
        let mut sr = SyntaxReader::new(&data, ParamSetKind::Sps);
        sr.u8("level_idc").expect("读取 level_idc 失败");
        assert_eq!(
            sr.ue("seq_parameter_set_id"),
            Err(AvcError::TruncatedSps {
                field: "seq_parameter_set_id",
                byte_offset: 1,
            })
        );
    }

    #[test]
    fn test_exp_golomb_overflow_names_field() {
        // 32 个前导零后仍有数据, 取值超出 u32
        let data = [0x00, 0x00, 0x00, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00];
        let mut sr = SyntaxReader::new(&data, ParamSetKind::Pps);
        assert_eq!(
            sr.ue("pic_parameter_set_id"),
            Err(AvcError::InvalidValue {
                component: "PPS",
                field: "pic_parameter_set_id",
                value: i64::from(u32::MAX),
            })
        );
    }

    #[test]
    fn test_ue_max_rejects_large_value() {
        let mut bw = BitWriter::new();
        bw.write_ue(300);
        bw.write_trailing_bits();
        let data = bw.finish();
        let mut sr = SyntaxReader::new(&data, ParamSetKind::Sps);
        let err = sr
            .ue_max("num_ref_frames_in_pic_order_cnt_cycle", 255)
            .expect_err("300 超过上限");
        assert!(matches!(
            err,
            AvcError::InvalidValue {
                component: "SPS",
                value: 300,
                ..
            }
        ));
    }

    #[test]
    fn test_skip_scaling_list_stops_at_zero_next_scale() {
        let mut bw = BitWriter::new();
        // delta=-8 使 next_scale 变为 0, 其余 15 个系数不占码流
        bw.write_se(-8);
        bw.write_bits(0b101, 3);
        bw.write_trailing_bits();
        let data = bw.finish();
        let mut sr = SyntaxReader::new(&data, ParamSetKind::Sps);
        sr.skip_scaling_list(16).expect("跳过 scaling_list 失败");
        assert_eq!(sr.u(3, "marker").expect("读取 marker 失败"), 0b101);
    }
}
