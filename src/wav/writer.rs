//! WAV encoder: 16-bit PCM, sizes patched on close

use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use tracing::warn;

use super::{
    DATA_ID, FMT_ID, FORMAT_EXTENSIBLE, FORMAT_PCM, RIFF_ID, SPEAKERS, SUBFORMAT_TAIL, WAVE_ID,
};
use crate::channel::{has_duplicates, SoundChannel};
use crate::codec::{extension, SoundFileWriter};
use crate::error::{Error, Result};
use crate::stream::OutputStream;

const BITS_PER_SAMPLE: u16 = 16;
const BYTES_PER_SAMPLE: u16 = BITS_PER_SAMPLE / 8;

/// Writer for 16-bit PCM RIFF/WAVE files
#[derive(Default)]
pub struct WavWriter {
    sink: Option<Box<dyn OutputStream>>,
    channel_count: usize,
    /// `remap[i]` is the input channel stored at file position `i`
    remap: Vec<usize>,
    data_size_offset: u64,
    data_bytes: u64,
    scratch: Vec<u8>,
}

impl WavWriter {
    /// Create a writer with no sink attached
    pub fn new() -> Self {
        Self::default()
    }
}

/// Speaker mask and file-order remap table for a multichannel layout
fn plan_layout(channel_map: &[SoundChannel]) -> Result<(u32, Vec<usize>)> {
    if has_duplicates(channel_map) {
        return Err(Error::ChannelMap("channel listed twice".into()));
    }

    let mut mask = 0u32;
    for channel in channel_map {
        let bit = SPEAKERS
            .iter()
            .find(|(_, speaker)| speaker == channel)
            .map(|&(bit, _)| bit)
            .ok_or_else(|| Error::ChannelMap(format!("{channel:?} has no WAV speaker position")))?;
        mask |= bit;
    }

    let remap = SPEAKERS
        .iter()
        .filter(|(bit, _)| mask & bit != 0)
        .filter_map(|(_, speaker)| channel_map.iter().position(|c| c == speaker))
        .collect();
    Ok((mask, remap))
}

fn fmt_chunk(sample_rate: u32, channel_count: u16, mask: Option<u32>) -> Result<Vec<u8>> {
    let block_align = channel_count
        .checked_mul(BYTES_PER_SAMPLE)
        .ok_or_else(|| Error::Unsupported(format!("{channel_count} WAV channels")))?;
    let byte_rate = sample_rate
        .checked_mul(u32::from(block_align))
        .ok_or_else(|| Error::Unsupported(format!("{sample_rate} Hz WAV stream")))?;
    let mut chunk = Vec::with_capacity(48);
    chunk.extend_from_slice(FMT_ID);
    chunk.extend_from_slice(&(if mask.is_some() { 40u32 } else { 16 }).to_le_bytes());
    let tag = if mask.is_some() { FORMAT_EXTENSIBLE } else { FORMAT_PCM };
    chunk.extend_from_slice(&tag.to_le_bytes());
    chunk.extend_from_slice(&channel_count.to_le_bytes());
    chunk.extend_from_slice(&sample_rate.to_le_bytes());
    chunk.extend_from_slice(&byte_rate.to_le_bytes());
    chunk.extend_from_slice(&block_align.to_le_bytes());
    chunk.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    if let Some(mask) = mask {
        // cbSize, valid bits, mask, sub-format GUID
        chunk.extend_from_slice(&22u16.to_le_bytes());
        chunk.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());
        chunk.extend_from_slice(&mask.to_le_bytes());
        chunk.extend_from_slice(&FORMAT_PCM.to_le_bytes());
        chunk.extend_from_slice(&SUBFORMAT_TAIL);
    }
    Ok(chunk)
}

impl SoundFileWriter for WavWriter {
    fn check(path: &Path) -> bool {
        extension(path).as_deref() == Some("wav")
    }

    fn open(
        &mut self,
        mut sink: Box<dyn OutputStream>,
        sample_rate: u32,
        channel_count: u32,
        channel_map: &[SoundChannel],
    ) -> Result<()> {
        if channel_count == 0 {
            return Err(Error::ChannelMap("zero channels".into()));
        }
        if channel_map.len() != channel_count as usize {
            return Err(Error::ChannelMap(format!(
                "{} positions for {channel_count} channels",
                channel_map.len()
            )));
        }
        if sample_rate == 0 {
            return Err(Error::Unsupported("zero sample rate".into()));
        }
        let channels = u16::try_from(channel_count)
            .map_err(|_| Error::Unsupported(format!("{channel_count} WAV channels")))?;

        let (mask, remap) = if channel_count > 2 {
            let (mask, remap) = plan_layout(channel_map)?;
            (Some(mask), remap)
        } else {
            (None, (0..channel_count as usize).collect())
        };

        let fmt = fmt_chunk(sample_rate, channels, mask)?;
        let mut header = Vec::with_capacity(12 + fmt.len() + 8);
        header.extend_from_slice(RIFF_ID);
        header.extend_from_slice(&0u32.to_le_bytes());
        header.extend_from_slice(WAVE_ID);
        header.extend_from_slice(&fmt);
        header.extend_from_slice(DATA_ID);
        let data_size_offset = header.len() as u64;
        header.extend_from_slice(&0u32.to_le_bytes());

        sink.seek(SeekFrom::Start(0))?;
        sink.write_all(&header)?;

        self.sink = Some(sink);
        self.channel_count = channel_count as usize;
        self.remap = remap;
        self.data_size_offset = data_size_offset;
        self.data_bytes = 0;
        Ok(())
    }

    fn write(&mut self, samples: &[i16]) -> Result<()> {
        let Some(sink) = self.sink.as_mut() else {
            return Err(Error::NotOpen);
        };

        let stray = samples.len() % self.channel_count;
        if stray != 0 {
            warn!(stray, "dropping samples that do not fill a WAV frame");
        }

        let frames = &samples[..samples.len() - stray];
        let bytes = (frames.len() * usize::from(BYTES_PER_SAMPLE)) as u64;
        if self.data_size_offset + 4 + self.data_bytes + bytes > u64::from(u32::MAX) {
            return Err(Error::Unsupported("WAV data over 4 GiB".into()));
        }

        self.scratch.clear();
        for frame in frames.chunks_exact(self.channel_count) {
            for &source in &self.remap {
                self.scratch.extend_from_slice(&frame[source].to_le_bytes());
            }
        }
        sink.write_all(&self.scratch)?;
        self.data_bytes += bytes;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let Some(mut sink) = self.sink.take() else {
            return Ok(());
        };

        let file_size = self.data_size_offset + 4 + self.data_bytes;
        sink.seek(SeekFrom::Start(4))?;
        sink.write_all(&((file_size - 8) as u32).to_le_bytes())?;
        sink.seek(SeekFrom::Start(self.data_size_offset))?;
        sink.write_all(&(self.data_bytes as u32).to_le_bytes())?;
        sink.seek(SeekFrom::Start(file_size))?;
        sink.flush()?;
        Ok(())
    }
}

impl Drop for WavWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "failed to finalize WAV file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_check_by_extension() {
        assert!(WavWriter::check(Path::new("out.wav")));
        assert!(WavWriter::check(Path::new("dir/OUT.WAV")));
        assert!(!WavWriter::check(Path::new("out.flac")));
        assert!(!WavWriter::check(Path::new("wav")));
    }

    #[test]
    fn test_layout_rejections() {
        use SoundChannel::*;
        assert!(matches!(
            plan_layout(&[FrontLeft, FrontRight, FrontLeft]),
            Err(Error::ChannelMap(_))
        ));
        assert!(matches!(
            plan_layout(&[FrontLeft, FrontRight, Mono]),
            Err(Error::ChannelMap(_))
        ));
    }

    #[test]
    fn test_layout_mask_and_remap() {
        use SoundChannel::*;
        let (mask, remap) = plan_layout(&[SideRight, FrontLeft, FrontRight]).unwrap();
        assert_eq!(mask, 0x1 | 0x2 | 0x400);
        assert_eq!(remap, vec![1, 2, 0]);
    }

    #[test]
    fn test_open_validates_arguments() {
        let mut writer = WavWriter::new();
        let sink = || Box::new(Cursor::new(Vec::<u8>::new()));
        assert!(matches!(
            writer.open(sink(), 44_100, 0, &[]),
            Err(Error::ChannelMap(_))
        ));
        assert!(matches!(
            writer.open(sink(), 44_100, 2, &[SoundChannel::Mono]),
            Err(Error::ChannelMap(_))
        ));
        assert!(matches!(
            writer.write(&[0, 0]),
            Err(Error::NotOpen)
        ));
    }

    #[test]
    fn test_byte_rate_overflow_rejected() {
        let mut writer = WavWriter::new();
        let map = [SoundChannel::FrontLeft, SoundChannel::FrontRight];
        assert!(matches!(
            writer.open(Box::new(Cursor::new(Vec::<u8>::new())), u32::MAX, 2, &map),
            Err(Error::Unsupported(_))
        ));
        assert!(matches!(writer.write(&[0, 0]), Err(Error::NotOpen)));

        // The largest rate that still fits is accepted
        let fmt = fmt_chunk(u32::MAX / 4, 2, None).unwrap();
        assert_eq!(&fmt[16..20], &(u32::MAX / 4 * 4).to_le_bytes());
    }

    #[test]
    fn test_close_twice_is_noop() {
        let mut writer = WavWriter::new();
        writer
            .open(Box::new(Cursor::new(Vec::<u8>::new())), 8_000, 1, &[SoundChannel::Mono])
            .unwrap();
        writer.write(&[1, 2, 3]).unwrap();
        writer.close().unwrap();
        writer.close().unwrap();
    }
}
