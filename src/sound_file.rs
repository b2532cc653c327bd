//! High-level sound file handles backed by the global registry

use std::fs::File;
use std::io::{BufWriter, Cursor};
use std::path::Path;
use std::time::Duration;

use tracing::warn;

use crate::channel::SoundChannel;
use crate::codec::{Info, SoundFileReader, SoundFileWriter};
use crate::error::{Error, Result};
use crate::registry::with_global;
use crate::stream::InputStream;

const MICROS_PER_SECOND: u128 = 1_000_000;

/// Time covered by `samples` interleaved samples
fn samples_to_duration(samples: u64, channel_count: u32, sample_rate: u32) -> Duration {
    if channel_count == 0 || sample_rate == 0 {
        return Duration::ZERO;
    }
    let frames = u128::from(samples / u64::from(channel_count));
    let micros = frames * MICROS_PER_SECOND / u128::from(sample_rate);
    Duration::from_micros(u64::try_from(micros).unwrap_or(u64::MAX))
}

/// Decoded sound file opened for reading
///
/// The format is detected from the content, not the file name.
#[derive(Default)]
pub struct InputSoundFile {
    reader: Option<Box<dyn SoundFileReader>>,
    info: Info,
    sample_offset: u64,
}

impl InputSoundFile {
    /// Create a closed handle
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the file at `path`
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut file = Self::new();
        file.open_from_file(path)?;
        Ok(file)
    }

    /// Open the file at `path`, replacing any open stream
    pub fn open_from_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::open(path.as_ref())?;
        self.open_from_stream(Box::new(file))
    }

    /// Open a complete file held in memory
    pub fn open_from_memory(&mut self, data: impl Into<Vec<u8>>) -> Result<()> {
        self.open_from_stream(Box::new(Cursor::new(data.into())))
    }

    /// Open an arbitrary seekable stream
    pub fn open_from_stream(&mut self, mut stream: Box<dyn InputStream>) -> Result<()> {
        self.close();

        let reader = with_global(|registry| registry.create_reader_from_stream(stream.as_mut()))?;
        let Some(mut reader) = reader else {
            return Err(Error::UnsupportedFormat);
        };

        let info = reader.open(stream).inspect_err(|e| {
            warn!(error = %e, "failed to open sound file");
        })?;

        self.reader = Some(reader);
        self.info = info;
        Ok(())
    }

    /// Total number of samples (frames × channels)
    pub fn sample_count(&self) -> u64 {
        self.info.sample_count
    }

    /// Number of interleaved channels
    pub fn channel_count(&self) -> u32 {
        self.info.channel_count
    }

    /// Frames per second
    pub fn sample_rate(&self) -> u32 {
        self.info.sample_rate
    }

    /// Position of each channel
    pub fn channel_map(&self) -> &[SoundChannel] {
        &self.info.channel_map
    }

    /// Length of the whole sound
    pub fn duration(&self) -> Duration {
        samples_to_duration(self.info.sample_count, self.info.channel_count, self.info.sample_rate)
    }

    /// Current read position as a time
    pub fn time_offset(&self) -> Duration {
        samples_to_duration(self.sample_offset, self.info.channel_count, self.info.sample_rate)
    }

    /// Current read position in samples
    pub fn sample_offset(&self) -> u64 {
        self.sample_offset
    }

    /// Move to `sample_offset`, rounded down to a frame and clamped to the end
    pub fn seek(&mut self, sample_offset: u64) -> Result<()> {
        let reader = self.reader.as_mut().ok_or(Error::NotOpen)?;
        let channels = u64::from(self.info.channel_count.max(1));
        let offset = (sample_offset / channels * channels).min(self.info.sample_count);
        reader.seek(offset)?;
        self.sample_offset = offset;
        Ok(())
    }

    /// Move to the frame at `offset` from the start
    pub fn seek_time(&mut self, offset: Duration) -> Result<()> {
        let frames = offset.as_micros() * u128::from(self.info.sample_rate) / MICROS_PER_SECOND;
        let samples = frames.saturating_mul(u128::from(self.info.channel_count));
        self.seek(u64::try_from(samples).unwrap_or(u64::MAX))
    }

    /// Read up to `samples.len()` interleaved samples; 0 means end of file
    pub fn read(&mut self, samples: &mut [i16]) -> Result<usize> {
        let reader = self.reader.as_mut().ok_or(Error::NotOpen)?;
        if samples.is_empty() {
            return Ok(0);
        }
        let count = reader.read(samples)?;
        self.sample_offset += count as u64;
        Ok(count)
    }

    /// Release the stream and reset every property
    pub fn close(&mut self) {
        *self = Self::default();
    }

    /// Check whether a stream is open
    pub fn is_open(&self) -> bool {
        self.reader.is_some()
    }
}

/// Sound file opened for writing
#[derive(Default)]
pub struct OutputSoundFile {
    writer: Option<Box<dyn SoundFileWriter>>,
}

impl OutputSoundFile {
    /// Create a closed handle
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `path`, picking the format from its extension
    pub fn open_from_file(
        &mut self,
        path: impl AsRef<Path>,
        sample_rate: u32,
        channel_count: u32,
        channel_map: &[SoundChannel],
    ) -> Result<()> {
        self.close()?;

        let path = path.as_ref();
        let mut writer = with_global(|registry| registry.create_writer_from_filename(path))
            .ok_or(Error::UnsupportedFormat)?;

        let file = BufWriter::new(File::create(path)?);
        writer.open(Box::new(file), sample_rate, channel_count, channel_map)?;
        self.writer = Some(writer);
        Ok(())
    }

    /// Append interleaved samples
    pub fn write(&mut self, samples: &[i16]) -> Result<()> {
        self.writer.as_mut().ok_or(Error::NotOpen)?.write(samples)
    }

    /// Finalize and close the file; closing twice is a no-op
    pub fn close(&mut self) -> Result<()> {
        match self.writer.take() {
            Some(mut writer) => writer.close(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_math() {
        assert_eq!(samples_to_duration(88_200, 2, 44_100), Duration::from_secs(1));
        assert_eq!(samples_to_duration(3, 1, 2), Duration::from_millis(1500));
        assert_eq!(samples_to_duration(100, 0, 44_100), Duration::ZERO);
        assert_eq!(samples_to_duration(100, 1, 0), Duration::ZERO);
    }

    #[test]
    fn test_closed_handles() {
        let mut input = InputSoundFile::new();
        assert!(!input.is_open());
        assert!(matches!(input.read(&mut [0i16; 4]), Err(Error::NotOpen)));
        assert!(matches!(input.seek(0), Err(Error::NotOpen)));
        assert_eq!(input.duration(), Duration::ZERO);

        let mut output = OutputSoundFile::new();
        assert!(matches!(output.write(&[0]), Err(Error::NotOpen)));
        output.close().unwrap();
    }

    #[test]
    fn test_unrecognized_memory() {
        let mut input = InputSoundFile::new();
        assert!(matches!(
            input.open_from_memory(vec![0x13u8; 10]),
            Err(Error::UnsupportedFormat)
        ));
        assert!(!input.is_open());
    }
}
