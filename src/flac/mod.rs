//! FLAC support
//!
//! ```text
//! [ID3v2 tag]  optional, skipped
//! "fLaC"
//! METADATA_BLOCK*  1-bit last flag, 7-bit type, 24-bit length, body
//!                  STREAMINFO (type 0) must come first
//! FRAME*           sync 0x3FFE, header + CRC-8, one subframe per
//!                  channel, byte padding, CRC-16
//! ```
//!
//! Every multi-byte field is big-endian and bit-packed MSB first.
//! Decoding goes through symphonia; encoding is native.

mod reader;
mod writer;

pub use reader::FlacReader;
pub use writer::FlacWriter;

use crate::bits::BitWriter;
use crate::channel::SoundChannel;
use crate::stream::{read_array, InputStream};
use std::io;

pub(crate) const FORMAT_NAME: &str = "FLAC";

pub(crate) const MARKER: &[u8; 4] = b"fLaC";

pub(crate) const BLOCK_STREAMINFO: u8 = 0;

pub(crate) const STREAMINFO_LEN: usize = 34;

/// Contents of the mandatory STREAMINFO block
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct StreamInfo {
    pub min_block_size: u16,
    pub max_block_size: u16,
    /// Smallest frame in bytes, 0 if unknown
    pub min_frame_size: u32,
    /// Largest frame in bytes, 0 if unknown
    pub max_frame_size: u32,
    pub sample_rate: u32,
    pub channels: u8,
    pub bits_per_sample: u8,
    /// Inter-channel samples (frames), 0 if unknown
    pub total_samples: u64,
}

impl StreamInfo {
    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        let mut bits = BitWriter::new();
        bits.write_bits(u64::from(self.min_block_size), 16);
        bits.write_bits(u64::from(self.max_block_size), 16);
        bits.write_bits(u64::from(self.min_frame_size), 24);
        bits.write_bits(u64::from(self.max_frame_size), 24);
        bits.write_bits(u64::from(self.sample_rate), 20);
        bits.write_bits(u64::from(self.channels - 1), 3);
        bits.write_bits(u64::from(self.bits_per_sample - 1), 5);
        bits.write_bits(self.total_samples >> 32, 4);
        bits.write_bits(self.total_samples & 0xFFFF_FFFF, 32);
        // MD5 left unset
        for _ in 0..4 {
            bits.write_bits(0, 32);
        }
        bits.into_bytes()
    }
}

/// Channel positions implied by the channel count
pub(crate) fn channel_map(channels: u32) -> Option<Vec<SoundChannel>> {
    use SoundChannel::*;
    let map = match channels {
        1 => vec![Mono],
        2 => vec![FrontLeft, FrontRight],
        3 => vec![FrontLeft, FrontRight, FrontCenter],
        4 => vec![FrontLeft, FrontRight, BackLeft, BackRight],
        5 => vec![FrontLeft, FrontRight, FrontCenter, BackLeft, BackRight],
        6 => vec![FrontLeft, FrontRight, FrontCenter, LowFrequencyEffects, BackLeft, BackRight],
        7 => vec![
            FrontLeft,
            FrontRight,
            FrontCenter,
            LowFrequencyEffects,
            BackCenter,
            SideLeft,
            SideRight,
        ],
        8 => vec![
            FrontLeft,
            FrontRight,
            FrontCenter,
            LowFrequencyEffects,
            BackLeft,
            BackRight,
            SideLeft,
            SideRight,
        ],
        _ => return None,
    };
    Some(map)
}

/// Position just past a leading ID3v2 tag, or 0 if there is none
pub(crate) fn skip_id3v2(stream: &mut dyn InputStream) -> io::Result<u64> {
    stream.seek(0)?;
    let Some(header) = read_array::<10>(stream)? else {
        return Ok(0);
    };
    if &header[0..3] != b"ID3" {
        return Ok(0);
    }
    // Syncsafe size: 7 bits per byte
    let size = header[6..10]
        .iter()
        .fold(0u64, |acc, &b| (acc << 7) | u64::from(b & 0x7F));
    let footer = if header[5] & 0x10 != 0 { 10 } else { 0 };
    Ok(10 + size + footer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_streaminfo_layout() {
        let info = StreamInfo {
            min_block_size: 4096,
            max_block_size: 4096,
            min_frame_size: 14,
            max_frame_size: 9000,
            sample_rate: 44_100,
            channels: 2,
            bits_per_sample: 16,
            total_samples: (1 << 33) + 5,
        };
        let bytes = info.to_bytes();
        assert_eq!(bytes.len(), STREAMINFO_LEN);
        assert_eq!(&bytes[0..4], &[0x10, 0x00, 0x10, 0x00]);
        assert_eq!(&bytes[4..7], &[0x00, 0x00, 0x0E]);
        assert_eq!(&bytes[7..10], &[0x00, 0x23, 0x28]);
        // 20-bit rate, 3-bit channels - 1, 5-bit depth - 1, 36-bit total
        assert_eq!(&bytes[10..13], &[0x0A, 0xC4, 0x42]);
        assert_eq!(bytes[13], 0xF2);
        assert_eq!(&bytes[14..18], &5u32.to_be_bytes());
        assert!(bytes[18..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_channel_maps() {
        for count in 1..=8 {
            assert_eq!(channel_map(count).map(|m| m.len()), Some(count as usize));
        }
        assert_eq!(channel_map(0), None);
        assert_eq!(channel_map(9), None);
    }

    #[test]
    fn test_skip_id3v2() {
        let mut tagged = b"ID3\x04\x00\x00\x00\x00\x01\x01".to_vec();
        tagged.extend_from_slice(&[0u8; 129]);
        tagged.extend_from_slice(MARKER);
        assert_eq!(skip_id3v2(&mut Cursor::new(tagged)).unwrap(), 139);

        assert_eq!(skip_id3v2(&mut Cursor::new(MARKER.to_vec())).unwrap(), 0);
    }
}
