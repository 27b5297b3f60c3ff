//! 比特流写入器.
//!
//! 按大端位序写入 (MSB first), 与 BitReader 对应.
//! 主要用于构造参数集码流 (测试夹具、诊断工具回放).

/// 比特流写入器
///
/// # 示例
/// ```
/// use avcscope_core::bitwriter::BitWriter;
///
/// let mut bw = BitWriter::new();
/// bw.write_bits(0b1011, 4);
/// bw.write_ue(1); // "010"
/// bw.write_trailing_bits();
/// assert_eq!(bw.finish(), vec![0b1011_0101]);
/// ```
#[derive(Debug, Default)]
pub struct BitWriter {
    /// 输出缓冲区
    data: Vec<u8>,
    /// 当前字节 (正在填充)
    current_byte: u8,
    /// 当前字节中已填充的位数 (0-7)
    bit_count: u8,
}

impl BitWriter {
    /// 创建新的比特流写入器
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取已写入的总位数
    pub fn bits_written(&self) -> usize {
        self.data.len() * 8 + self.bit_count as usize
    }

    /// 是否位于字节边界
    pub fn is_byte_aligned(&self) -> bool {
        self.bit_count == 0
    }

    /// 写入 1 个位
    pub fn write_bit(&mut self, bit: u32) {
        self.current_byte = (self.current_byte << 1) | (bit & 1) as u8;
        self.bit_count += 1;
        if self.bit_count >= 8 {
            self.data.push(self.current_byte);
            self.current_byte = 0;
            self.bit_count = 0;
        }
    }

    /// 写入布尔标志
    pub fn write_flag(&mut self, flag: bool) {
        self.write_bit(u32::from(flag));
    }

    /// 写入 N 个位 (最多 32 位)
    ///
    /// 值的低 N 位被写入, 高位在前.
    pub fn write_bits(&mut self, value: u32, n: u32) {
        debug_assert!(n <= 32, "write_bits: n={} 超过 32 位", n);
        for i in (0..n).rev() {
            self.write_bit((value >> i) & 1);
        }
    }

    /// 写入无符号 Exp-Golomb 编码值 ue(v)
    ///
    /// `value` 最大为 `u32::MAX - 1`.
    pub fn write_ue(&mut self, value: u32) {
        let code = u64::from(value) + 1;
        let num_bits = 64 - code.leading_zeros();
        for _ in 0..num_bits - 1 {
            self.write_bit(0);
        }
        for i in (0..num_bits).rev() {
            self.write_bit(((code >> i) & 1) as u32);
        }
    }

    /// 写入有符号 Exp-Golomb 编码值 se(v)
    pub fn write_se(&mut self, value: i32) {
        let code = if value <= 0 {
            (-2 * i64::from(value)) as u32
        } else {
            (2 * i64::from(value) - 1) as u32
        };
        self.write_ue(code);
    }

    /// 写入 rbsp_trailing_bits: 一个 1 后补零至字节边界
    pub fn write_trailing_bits(&mut self) {
        self.write_bit(1);
        while !self.is_byte_aligned() {
            self.write_bit(0);
        }
    }

    /// 写入整字节 (要求字节对齐时效率最高, 非对齐时逐位写入)
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        if self.is_byte_aligned() {
            self.data.extend_from_slice(bytes);
            return;
        }
        for &b in bytes {
            self.write_bits(u32::from(b), 8);
        }
    }

    /// 结束写入, 不足一字节的部分低位补零
    pub fn finish(mut self) -> Vec<u8> {
        if self.bit_count > 0 {
            let pad = 8 - self.bit_count;
            self.data.push(self.current_byte << pad);
        }
        self.data
    }
}
