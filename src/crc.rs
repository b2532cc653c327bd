//! CRC-8 and CRC-16 checksums used by FLAC frames
//!
//! Both are MSB-first, zero-initialised and unreflected: CRC-8 with
//! polynomial x^8 + x^2 + x + 1 guards frame headers, CRC-16 with
//! x^16 + x^15 + x^2 + 1 guards whole frames.

/// CRC-8 polynomial (0x07)
const CRC8_POLYNOMIAL: u8 = 0x07;

/// CRC-16 polynomial (0x8005)
const CRC16_POLYNOMIAL: u16 = 0x8005;

/// Pre-computed CRC-8 lookup table
static CRC8_TABLE: [u8; 256] = generate_crc8_table();

/// Pre-computed CRC-16 lookup table
static CRC16_TABLE: [u16; 256] = generate_crc16_table();

/// Generate CRC-8 lookup table at compile time
const fn generate_crc8_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;

    while i < 256 {
        let mut crc = i as u8;
        let mut j = 0;

        while j < 8 {
            if crc & 0x80 != 0 {
                crc = (crc << 1) ^ CRC8_POLYNOMIAL;
            } else {
                crc <<= 1;
            }
            j += 1;
        }

        table[i] = crc;
        i += 1;
    }

    table
}

/// Generate CRC-16 lookup table at compile time
const fn generate_crc16_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;

    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut j = 0;

        while j < 8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ CRC16_POLYNOMIAL;
            } else {
                crc <<= 1;
            }
            j += 1;
        }

        table[i] = crc;
        i += 1;
    }

    table
}

/// Compute the CRC-8 of `data`
#[inline]
pub fn crc8(data: &[u8]) -> u8 {
    data.iter()
        .fold(0u8, |crc, &byte| CRC8_TABLE[(crc ^ byte) as usize])
}

/// Compute the CRC-16 of `data`
#[inline]
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |crc, &byte| {
        let idx = ((crc >> 8) as u8 ^ byte) as usize;
        (crc << 8) ^ CRC16_TABLE[idx]
    })
}
