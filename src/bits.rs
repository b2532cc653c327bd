//! MSB-first bit writer for the FLAC encoder

/// Growable MSB-first bit sink
#[derive(Debug, Default)]
pub struct BitWriter {
    buf: Vec<u8>,
    acc: u64,
    acc_bits: u32,
}

impl BitWriter {
    /// Create an empty writer
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Write the low `count` (at most 32) bits of `value`
    #[inline]
    pub fn write_bits(&mut self, value: u64, count: u32) {
        debug_assert!(count <= 32);
        if count == 0 {
            return;
        }
        let mask = (1u64 << count) - 1;
        self.acc = (self.acc << count) | (value & mask);
        self.acc_bits += count;
        while self.acc_bits >= 8 {
            self.acc_bits -= 8;
            self.buf.push((self.acc >> self.acc_bits) as u8);
        }
        self.acc &= (1u64 << self.acc_bits) - 1;
    }

    /// Write `value` as a `count`-bit two's complement field
    #[inline]
    pub fn write_signed(&mut self, value: i64, count: u32) {
        self.write_bits(value as u64, count);
    }

    /// Write `zeros` zero bits followed by a one bit
    #[inline]
    pub fn write_unary(&mut self, mut zeros: u32) {
        while zeros >= 32 {
            self.write_bits(0, 32);
            zeros -= 32;
        }
        self.write_bits(1, zeros + 1);
    }

    /// Write a FLAC "UTF-8" coded integer (values below 2^36)
    pub fn write_utf8_u64(&mut self, value: u64) {
        if value < 0x80 {
            self.write_bits(value, 8);
            return;
        }

        let extra = match value {
            0..=0x7FF => 1,
            0x800..=0xFFFF => 2,
            0x1_0000..=0x1F_FFFF => 3,
            0x20_0000..=0x3FF_FFFF => 4,
            0x400_0000..=0x7FFF_FFFF => 5,
            _ => 6,
        };
        let lead = (0xFF00u16 >> (extra + 1)) as u64 & 0xFF;
        self.write_bits(lead | (value >> (6 * extra)), 8);
        for i in (0..extra).rev() {
            self.write_bits(0x80 | ((value >> (6 * i)) & 0x3F), 8);
        }
    }

    /// Pad with zero bits up to the next byte boundary
    #[inline]
    pub fn align(&mut self) {
        if self.acc_bits > 0 {
            self.write_bits(0, 8 - self.acc_bits);
        }
    }

    /// Bytes completed so far (excludes a partial trailing byte)
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Total bits written
    #[inline]
    pub fn bit_len(&self) -> usize {
        self.buf.len() * 8 + self.acc_bits as usize
    }

    /// Align and return the finished buffer
    #[inline]
    pub fn into_bytes(mut self) -> Vec<u8> {
        self.align();
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_across_bytes() {
        let mut writer = BitWriter::new();
        writer.write_bits(0b101, 3);
        writer.write_bits(0b0_1100_01, 7);
        assert_eq!(writer.bytes(), &[0b1010_1100]);
        assert_eq!(writer.bit_len(), 10);
        writer.write_bits(0b01_0011, 6);
        assert_eq!(writer.into_bytes(), vec![0b1010_1100, 0b0101_0011]);
    }

    #[test]
    fn test_signed_values() {
        let mut writer = BitWriter::new();
        writer.write_signed(-1, 3);
        writer.write_signed(7, 5);
        assert_eq!(writer.into_bytes(), vec![0b1110_0111]);
    }

    #[test]
    fn test_unary() {
        let mut writer = BitWriter::new();
        writer.write_unary(3);
        writer.write_unary(19);
        assert_eq!(writer.into_bytes(), vec![0b0001_0000, 0x00, 0b0000_0001]);

        let mut long = BitWriter::new();
        long.write_unary(40);
        assert_eq!(long.bit_len(), 41);
    }

    #[test]
    fn test_align_pads_with_zeros() {
        let mut writer = BitWriter::new();
        writer.write_bits(0b111, 3);
        writer.align();
        writer.write_bits(0xAB, 8);
        assert_eq!(writer.into_bytes(), vec![0b1110_0000, 0xAB]);
    }

    #[test]
    fn test_utf8_known_encodings() {
        let mut writer = BitWriter::new();
        writer.write_utf8_u64(0x7F);
        writer.write_utf8_u64(0xE9);
        writer.write_utf8_u64(0x800);
        assert_eq!(
            writer.into_bytes(),
            vec![0x7F, 0xC3, 0xA9, 0xE0, 0xA0, 0x80]
        );

        let mut wide = BitWriter::new();
        wide.write_utf8_u64(0x3_1234_5678);
        let bytes = wide.into_bytes();
        assert_eq!(bytes.len(), 7);
        assert_eq!(bytes[0], 0xFE);
        assert!(bytes[1..].iter().all(|b| b & 0xC0 == 0x80));
    }
}
