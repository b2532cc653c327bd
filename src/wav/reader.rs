//! WAV decoder: walks the RIFF chunk list to `fmt ` and `data`

use std::io;

use tracing::{debug, warn};

use super::{
    DATA_ID, FMT_ID, FORMAT_EXTENSIBLE, FORMAT_FLOAT, FORMAT_NAME, FORMAT_PCM, RIFF_ID,
    SPEAKERS, SUBFORMAT_TAIL, WAVE_ID,
};
use crate::channel::{default_channel_map, SoundChannel};
use crate::codec::{Info, SoundFileReader};
use crate::error::{Error, Result};
use crate::stream::{read_array, read_full, InputStream};

/// Bytes decoded per underlying stream read
const READ_CHUNK: usize = 16 * 1024;

/// Stored sample encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    /// Integer PCM of the given byte width (1 = unsigned 8-bit)
    Int(usize),
    /// IEEE float of the given byte width
    Float(usize),
}

impl Encoding {
    fn bytes_per_sample(self) -> usize {
        match self {
            Encoding::Int(n) | Encoding::Float(n) => n,
        }
    }

    /// Convert one little-endian sample to i16
    #[inline]
    fn decode(self, bytes: &[u8]) -> i16 {
        match self {
            Encoding::Int(1) => (i16::from(bytes[0]) - 128) << 8,
            // Keep the most significant 16 bits
            Encoding::Int(n) => i16::from_le_bytes([bytes[n - 2], bytes[n - 1]]),
            Encoding::Float(4) => {
                float_to_i16(f64::from(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])))
            }
            Encoding::Float(_) => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&bytes[..8]);
                float_to_i16(f64::from_le_bytes(raw))
            }
        }
    }
}

#[inline]
fn float_to_i16(value: f64) -> i16 {
    if value.is_nan() {
        return 0;
    }
    (value.clamp(-1.0, 1.0) * f64::from(i16::MAX)).round() as i16
}

/// Parsed `fmt ` chunk
#[derive(Debug)]
struct Format {
    encoding: Encoding,
    channel_count: u16,
    sample_rate: u32,
    channel_map: Vec<SoundChannel>,
}

/// Reader for RIFF/WAVE files holding PCM or float samples
#[derive(Default)]
pub struct WavReader {
    stream: Option<Box<dyn InputStream>>,
    encoding: Option<Encoding>,
    data_start: u64,
    sample_count: u64,
    position: u64,
    scratch: Vec<u8>,
}

impl WavReader {
    /// Create a reader with no stream attached
    pub fn new() -> Self {
        Self::default()
    }
}

impl SoundFileReader for WavReader {
    fn check(stream: &mut dyn InputStream) -> io::Result<bool> {
        let Some(header) = read_array::<12>(stream)? else {
            return Ok(false);
        };
        Ok(&header[0..4] == RIFF_ID && &header[8..12] == WAVE_ID)
    }

    fn open(&mut self, mut stream: Box<dyn InputStream>) -> Result<Info> {
        let stream_size = stream.size()?;
        stream.seek(0)?;

        let header = read_array::<12>(stream.as_mut())?.ok_or(Error::UnexpectedEof)?;
        if &header[0..4] != RIFF_ID || &header[8..12] != WAVE_ID {
            return Err(Error::corrupt(FORMAT_NAME, "missing RIFF/WAVE signature"));
        }

        let mut format: Option<Format> = None;
        let (data_start, declared_size) = loop {
            let chunk = read_array::<8>(stream.as_mut())?
                .ok_or_else(|| Error::corrupt(FORMAT_NAME, "no data chunk"))?;
            let id = &chunk[0..4];
            let size = u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]);
            let body_start = stream.tell()?;

            if id == DATA_ID {
                if format.is_none() {
                    return Err(Error::corrupt(FORMAT_NAME, "data chunk before fmt chunk"));
                }
                break (body_start, u64::from(size));
            }

            // Chunks are padded to an even size
            let next = body_start + u64::from(size) + u64::from(size & 1);
            if next > stream_size {
                return Err(Error::corrupt(FORMAT_NAME, "chunk extends past end of file"));
            }

            if id == FMT_ID {
                format = Some(parse_format(stream.as_mut(), size)?);
            } else {
                debug!(chunk = %String::from_utf8_lossy(id), size, "skipping WAV chunk");
            }
            stream.seek(next)?;
        };

        let Some(format) = format else {
            return Err(Error::corrupt(FORMAT_NAME, "missing fmt chunk"));
        };

        let available = stream_size.saturating_sub(data_start);
        let data_size = if declared_size == 0 || declared_size > available {
            // Streaming writers leave the size unset
            if declared_size != 0 {
                warn!(declared_size, available, "WAV data chunk truncated");
            }
            available
        } else {
            declared_size
        };

        let bytes_per_sample = format.encoding.bytes_per_sample() as u64;
        let channel_count = u64::from(format.channel_count);
        let frame_size = bytes_per_sample * channel_count;
        // Partial trailing frames are dropped
        let sample_count = data_size / frame_size * channel_count;

        self.stream = Some(stream);
        self.encoding = Some(format.encoding);
        self.data_start = data_start;
        self.sample_count = sample_count;
        self.position = 0;

        Ok(Info {
            sample_count,
            channel_count: u32::from(format.channel_count),
            sample_rate: format.sample_rate,
            channel_map: format.channel_map,
        })
    }

    fn seek(&mut self, sample_offset: u64) -> Result<()> {
        let (Some(stream), Some(encoding)) = (self.stream.as_mut(), self.encoding) else {
            return Err(Error::NotOpen);
        };
        self.position = sample_offset.min(self.sample_count);
        stream.seek(self.data_start + self.position * encoding.bytes_per_sample() as u64)?;
        Ok(())
    }

    fn read(&mut self, samples: &mut [i16]) -> Result<usize> {
        let (Some(stream), Some(encoding)) = (self.stream.as_mut(), self.encoding) else {
            return Err(Error::NotOpen);
        };

        let bytes_per_sample = encoding.bytes_per_sample();
        let left = self.sample_count - self.position;
        let wanted = (samples.len() as u64).min(left) as usize;
        let mut produced = 0;

        while produced < wanted {
            let batch = (wanted - produced).min(READ_CHUNK / bytes_per_sample);
            self.scratch.resize(batch * bytes_per_sample, 0);
            let n = read_full(stream.as_mut(), &mut self.scratch)?;
            let whole = n / bytes_per_sample;

            for (out, raw) in samples[produced..produced + whole]
                .iter_mut()
                .zip(self.scratch.chunks_exact(bytes_per_sample))
            {
                *out = encoding.decode(raw);
            }
            produced += whole;
            self.position += whole as u64;

            if whole < batch {
                // File shorter than its header claimed
                warn!(position = self.position, "WAV data ended early");
                self.sample_count = self.position;
                stream.seek(self.data_start + self.position * bytes_per_sample as u64)?;
                break;
            }
        }

        Ok(produced)
    }
}

/// Parse the body of a `fmt ` chunk of `size` bytes
fn parse_format(stream: &mut dyn InputStream, size: u32) -> Result<Format> {
    if size < 16 {
        return Err(Error::corrupt(FORMAT_NAME, "fmt chunk too small"));
    }
    let mut body = vec![0u8; size as usize];
    if read_full(stream, &mut body)? < body.len() {
        return Err(Error::UnexpectedEof);
    }

    let u16_at = |at: usize| u16::from_le_bytes([body[at], body[at + 1]]);
    let u32_at = |at: usize| u32::from_le_bytes([body[at], body[at + 1], body[at + 2], body[at + 3]]);

    let mut tag = u16_at(0);
    let channel_count = u16_at(2);
    let sample_rate = u32_at(4);
    let block_align = u16_at(12);
    let bits_per_sample = u16_at(14);
    let mut channel_mask = None;

    if tag == FORMAT_EXTENSIBLE {
        if size < 40 {
            return Err(Error::corrupt(FORMAT_NAME, "extensible fmt chunk too small"));
        }
        channel_mask = Some(u32_at(20));
        if body[26..40] != SUBFORMAT_TAIL {
            return Err(Error::Unsupported("WAV sub-format GUID".into()));
        }
        tag = u16_at(24);
    }

    if channel_count == 0 {
        return Err(Error::corrupt(FORMAT_NAME, "zero channels"));
    }
    if sample_rate == 0 {
        return Err(Error::corrupt(FORMAT_NAME, "zero sample rate"));
    }

    let encoding = match (tag, bits_per_sample) {
        (FORMAT_PCM, 8 | 16 | 24 | 32) => Encoding::Int(usize::from(bits_per_sample / 8)),
        (FORMAT_FLOAT, 32 | 64) => Encoding::Float(usize::from(bits_per_sample / 8)),
        (FORMAT_PCM | FORMAT_FLOAT, bits) => {
            return Err(Error::Unsupported(format!("{bits}-bit WAV samples")));
        }
        (other, _) => {
            return Err(Error::Unsupported(format!("WAV format tag {other:#06x}")));
        }
    };

    if usize::from(block_align) != encoding.bytes_per_sample() * usize::from(channel_count) {
        return Err(Error::corrupt(FORMAT_NAME, "block align does not match channels"));
    }

    let channel_map = match channel_mask {
        Some(mask) if mask != 0 => mask_to_channels(mask, channel_count),
        _ => default_channel_map(u32::from(channel_count)).ok_or_else(|| {
            Error::Unsupported(format!(
                "{channel_count} WAV channels without a channel mask"
            ))
        })?,
    };

    Ok(Format {
        encoding,
        channel_count,
        sample_rate,
        channel_map,
    })
}

/// Assign mask bits to channels in ascending bit order
fn mask_to_channels(mask: u32, channel_count: u16) -> Vec<SoundChannel> {
    let mut map: Vec<SoundChannel> = SPEAKERS
        .iter()
        .filter(|(bit, _)| mask & bit != 0)
        .map(|&(_, channel)| channel)
        .take(usize::from(channel_count))
        .collect();
    map.resize(usize::from(channel_count), SoundChannel::Unspecified);
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Canonical 44-byte header followed by `data`
    fn wav_bytes(tag: u16, channels: u16, rate: u32, bits: u16, data: &[u8]) -> Vec<u8> {
        let block_align = channels * (bits / 8);
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data.len() as u32).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&tag.to_le_bytes());
        out.extend_from_slice(&channels.to_le_bytes());
        out.extend_from_slice(&rate.to_le_bytes());
        out.extend_from_slice(&(rate * u32::from(block_align)).to_le_bytes());
        out.extend_from_slice(&block_align.to_le_bytes());
        out.extend_from_slice(&bits.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(data);
        out
    }

    fn open(bytes: Vec<u8>) -> Result<(WavReader, Info)> {
        let mut reader = WavReader::new();
        let info = reader.open(Box::new(Cursor::new(bytes)))?;
        Ok((reader, info))
    }

    #[test]
    fn test_check_rejects_short_and_foreign() {
        assert!(!WavReader::check(&mut Cursor::new(b"RIFF".to_vec())).unwrap());
        assert!(!WavReader::check(&mut Cursor::new(b"RIFF\0\0\0\0AVI ".to_vec())).unwrap());
        assert!(WavReader::check(&mut Cursor::new(b"RIFF\0\0\0\0WAVE".to_vec())).unwrap());
    }

    #[test]
    fn test_oversized_fmt_chunk_rejected_before_reading() {
        let mut bytes = b"RIFF\x18\0\0\0WAVEfmt ".to_vec();
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 16]);
        assert_eq!(bytes.len(), 36);

        assert!(matches!(open(bytes), Err(Error::Corrupt { .. })));
    }

    #[test]
    fn test_8bit_unsigned() {
        let (mut reader, info) = open(wav_bytes(FORMAT_PCM, 1, 8000, 8, &[0, 128, 255])).unwrap();
        assert_eq!(info.sample_count, 3);

        let mut out = [0i16; 3];
        assert_eq!(reader.read(&mut out).unwrap(), 3);
        assert_eq!(out, [-32768, 0, 32512]);
    }

    #[test]
    fn test_24bit_keeps_high_bytes() {
        let data = [0x11, 0x34, 0x12, 0xFF, 0xFF, 0xFF];
        let (mut reader, _) = open(wav_bytes(FORMAT_PCM, 1, 8000, 24, &data)).unwrap();

        let mut out = [0i16; 2];
        assert_eq!(reader.read(&mut out).unwrap(), 2);
        assert_eq!(out, [0x1234, -1]);
    }

    #[test]
    fn test_float_samples() {
        let mut data = Vec::new();
        for v in [0.5f32, -1.0, 2.0] {
            data.extend_from_slice(&v.to_le_bytes());
        }
        let (mut reader, _) = open(wav_bytes(FORMAT_FLOAT, 1, 8000, 32, &data)).unwrap();

        let mut out = [0i16; 3];
        assert_eq!(reader.read(&mut out).unwrap(), 3);
        assert_eq!(out, [16384, -32767, 32767]);
    }

    #[test]
    fn test_partial_trailing_frame_dropped() {
        // Stereo 16-bit: 2 full frames + 2 stray bytes
        let data = [1, 0, 2, 0, 3, 0, 4, 0, 5, 0];
        let (mut reader, info) = open(wav_bytes(FORMAT_PCM, 2, 8000, 16, &data)).unwrap();
        assert_eq!(info.sample_count, 4);

        let mut out = [0i16; 8];
        assert_eq!(reader.read(&mut out).unwrap(), 4);
        assert_eq!(&out[..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_structural_errors() {
        let zero_channels = wav_bytes(FORMAT_PCM, 0, 8000, 16, &[]);
        assert!(matches!(open(zero_channels), Err(Error::Corrupt { .. })));

        let zero_rate = wav_bytes(FORMAT_PCM, 1, 0, 16, &[]);
        assert!(matches!(open(zero_rate), Err(Error::Corrupt { .. })));

        let mut truncated = wav_bytes(FORMAT_PCM, 1, 8000, 16, &[]);
        truncated.truncate(30);
        assert!(open(truncated).is_err());

        let adpcm = wav_bytes(2, 1, 8000, 16, &[]);
        assert!(matches!(open(adpcm), Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_many_channels_without_mask_rejected() {
        let bytes = wav_bytes(FORMAT_PCM, 3, 8000, 16, &[0; 12]);
        assert!(matches!(open(bytes), Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_unknown_chunks_skipped() {
        let mut bytes = wav_bytes(FORMAT_PCM, 1, 8000, 16, &[7, 0]);
        // Splice an odd-sized LIST chunk (padded) between fmt and data
        let list = [b"LIST".as_slice(), &3u32.to_le_bytes(), &[1, 2, 3, 0]].concat();
        bytes.splice(36..36, list);

        let (mut reader, info) = open(bytes).unwrap();
        assert_eq!(info.sample_count, 1);
        let mut out = [0i16; 1];
        assert_eq!(reader.read(&mut out).unwrap(), 1);
        assert_eq!(out[0], 7);
    }

    #[test]
    fn test_oversized_data_chunk_clamped() {
        let mut bytes = wav_bytes(FORMAT_PCM, 1, 8000, 16, &[1, 0, 2, 0]);
        bytes[40..44].copy_from_slice(&u32::MAX.to_le_bytes());
        let (_, info) = open(bytes).unwrap();
        assert_eq!(info.sample_count, 2);
    }

    #[test]
    fn test_read_before_open() {
        let mut reader = WavReader::new();
        assert!(matches!(reader.read(&mut [0i16; 4]), Err(Error::NotOpen)));
        assert!(matches!(reader.seek(0), Err(Error::NotOpen)));
    }
}
