//! 比特流读取器.
//!
//! 提供从字节缓冲区中按位读取数据的能力, 是 NALU 头部之后所有参数集解析的基础设施.
//!
//! 按大端位序读取 (MSB first), 并提供 H.264 使用的 Exp-Golomb 可变长编码:
//! - `ue(v)`: 无符号 Exp-Golomb
//! - `se(v)`: 有符号 Exp-Golomb

use crate::{AvcError, AvcResult};

/// 比特流读取器
///
/// 从字节缓冲区中按位读取数据, 使用大端位序 (MSB first).
/// 读取器只借用缓冲区, 生命周期不超过一次解析调用.
///
/// # 示例
/// ```
/// use avcscope_core::bitreader::BitReader;
///
/// let data = [0b10110001, 0b01010101];
/// let mut br = BitReader::new(&data);
/// assert_eq!(br.read_bits(4).unwrap(), 0b1011);
/// assert_eq!(br.read_bits(4).unwrap(), 0b0001);
/// assert_eq!(br.read_ue().unwrap(), 1); // "010"
/// ```
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    /// 源数据
    data: &'a [u8],
    /// 当前字节索引
    byte_pos: usize,
    /// 当前字节中的位位置 (0-7, 0 表示最高位)
    bit_pos: u8,
}

impl<'a> BitReader<'a> {
    /// 创建新的比特流读取器
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_pos: 0,
            bit_pos: 0,
        }
    }

    /// 获取已读取的总位数
    pub fn bits_read(&self) -> usize {
        self.byte_pos * 8 + self.bit_pos as usize
    }

    /// 获取剩余可读位数
    pub fn bits_left(&self) -> usize {
        if self.byte_pos >= self.data.len() {
            return 0;
        }
        (self.data.len() - self.byte_pos) * 8 - self.bit_pos as usize
    }

    /// 是否已到达末尾
    pub fn is_eof(&self) -> bool {
        self.bits_left() == 0
    }

    /// 获取当前字节位置
    pub fn byte_position(&self) -> usize {
        self.byte_pos
    }

    fn out_of_data(&self, requested: u32) -> AvcError {
        AvcError::OutOfData {
            bit_offset: self.bits_read(),
            requested,
            available: self.bits_left(),
        }
    }

    /// 读取 1 个位
    pub fn read_bit(&mut self) -> AvcResult<u32> {
        if self.byte_pos >= self.data.len() {
            return Err(self.out_of_data(1));
        }

        let bit = (self.data[self.byte_pos] >> (7 - self.bit_pos)) & 1;
        self.bit_pos += 1;
        if self.bit_pos >= 8 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }

        Ok(u32::from(bit))
    }

    /// 读取 1 个位并转换为布尔标志
    pub fn read_flag(&mut self) -> AvcResult<bool> {
        Ok(self.read_bit()? == 1)
    }

    /// 读取 N 个位 (最多 32 位)
    ///
    /// 按大端位序读取, 返回值的低 N 位有效.
    /// 剩余位数不足时返回 `OutOfData`, 且不移动读取位置.
    pub fn read_bits(&mut self, n: u32) -> AvcResult<u32> {
        if n == 0 {
            return Ok(0);
        }
        if n > 32 {
            return Err(AvcError::InvalidArgument(format!(
                "read_bits: n={} 超过 32 位",
                n,
            )));
        }
        if (n as usize) > self.bits_left() {
            return Err(self.out_of_data(n));
        }

        let mut result: u32 = 0;
        let mut remaining = n;

        while remaining > 0 {
            let available = 8 - self.bit_pos as u32;
            let to_read = remaining.min(available);

            // 从当前字节中提取位
            let shift = available - to_read;
            let mask = ((1u32 << to_read) - 1) as u8;
            let bits = (self.data[self.byte_pos] >> shift) & mask;

            result = (result << to_read) | u32::from(bits);

            self.bit_pos += to_read as u8;
            if self.bit_pos >= 8 {
                self.bit_pos = 0;
                self.byte_pos += 1;
            }
            remaining -= to_read;
        }

        Ok(result)
    }

    /// 读取无符号 Exp-Golomb 编码值 ue(v)
    ///
    /// 前导零的扫描受缓冲区长度约束, 数据耗尽时返回 `OutOfData`.
    pub fn read_ue(&mut self) -> AvcResult<u32> {
        let start = self.bits_read();
        let mut leading_zeros = 0u32;
        while self.read_bit()? == 0 {
            leading_zeros += 1;
            if leading_zeros > 31 {
                return Err(AvcError::ExpGolombOverflow { bit_offset: start });
            }
        }

        if leading_zeros == 0 {
            return Ok(0);
        }

        let suffix = self.read_bits(leading_zeros)?;
        // leading_zeros == 31 时 (1 << 31) - 1 + suffix 最大为 u32::MAX - 1
        Ok((1u32 << leading_zeros) - 1 + suffix)
    }

    /// 读取有符号 Exp-Golomb 编码值 se(v)
    ///
    /// 映射: 0→0, 1→1, 2→-1, 3→2, 4→-2, ...
    pub fn read_se(&mut self) -> AvcResult<i32> {
        let code = self.read_ue()?;
        let value = code.div_ceil(2) as i64;
        let signed = if code & 1 == 0 { -value } else { value };
        Ok(signed as i32)
    }

    /// 窥视 N 个位 (不移动位置)
    pub fn peek_bits(&mut self, n: u32) -> AvcResult<u32> {
        let saved_byte = self.byte_pos;
        let saved_bit = self.bit_pos;
        let result = self.read_bits(n);
        self.byte_pos = saved_byte;
        self.bit_pos = saved_bit;
        result
    }

    /// 跳过 N 个位
    pub fn skip_bits(&mut self, n: u32) -> AvcResult<()> {
        if (n as usize) > self.bits_left() {
            return Err(self.out_of_data(n));
        }

        let total_bits = self.bit_pos as usize + n as usize;
        self.byte_pos += total_bits / 8;
        self.bit_pos = (total_bits % 8) as u8;

        Ok(())
    }

    /// 对齐到下一个字节边界
    ///
    /// 如果当前已在字节边界, 则不做任何事.
    pub fn align_byte(&mut self) {
        if self.bit_pos > 0 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }
    }

    /// 判断 RBSP 是否仍有有效语法数据 (H.264 7.2 more_rbsp_data)
    ///
    /// 剩余部分仅为 rbsp_stop_one_bit 加对齐零位 (或全零填充) 时返回 false.
    pub fn more_rbsp_data(&self) -> bool {
        let bits_left = self.bits_left();
        if bits_left == 0 {
            return false;
        }
        // 最后一个非零字节中最低的 1 即 rbsp_stop_one_bit
        let Some(last) = self.data.iter().rposition(|&b| b != 0) else {
            return false;
        };
        let stop_bit_pos = last * 8 + 7 - self.data[last].trailing_zeros() as usize;
        self.bits_read() < stop_bit_pos
    }

    /// 获取底层数据的引用
    pub fn data(&self) -> &'a [u8] {
        self.data
    }
}
