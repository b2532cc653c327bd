//! Reader and writer contracts shared by every sound format

use std::io;
use std::path::Path;

use crate::channel::SoundChannel;
use crate::error::Result;
use crate::stream::{InputStream, OutputStream};

/// Properties of an opened sound stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Info {
    /// Total number of samples (frames × channels)
    pub sample_count: u64,
    /// Number of interleaved channels
    pub channel_count: u32,
    /// Frames per second
    pub sample_rate: u32,
    /// Position of each channel, `channel_count` entries
    pub channel_map: Vec<SoundChannel>,
}

/// Decoder for one binary sound format
///
/// A reader is bound to a single stream by [`open`](Self::open) and then
/// yields interleaved signed 16-bit samples, whatever the stored encoding.
pub trait SoundFileReader {
    /// Return true if the leading bytes of `stream` look like this format
    ///
    /// The stream position on entry is unspecified and is not restored.
    /// Short or garbage input yields `Ok(false)`.
    fn check(stream: &mut dyn InputStream) -> io::Result<bool>
    where
        Self: Sized;

    /// Parse the header and take ownership of `stream`
    fn open(&mut self, stream: Box<dyn InputStream>) -> Result<Info>;

    /// Move to the given sample (not frame) index
    ///
    /// Offsets past the end clamp to the end of the stream.
    fn seek(&mut self, sample_offset: u64) -> Result<()>;

    /// Decode up to `samples.len()` interleaved samples
    ///
    /// Returns the number written; 0 means end of stream.
    fn read(&mut self, samples: &mut [i16]) -> Result<usize>;
}

/// Encoder for one binary sound format
pub trait SoundFileWriter {
    /// Return true if this writer handles files named like `path`
    fn check(path: &Path) -> bool
    where
        Self: Sized;

    /// Write the header to `sink` and prepare for samples
    fn open(
        &mut self,
        sink: Box<dyn OutputStream>,
        sample_rate: u32,
        channel_count: u32,
        channel_map: &[SoundChannel],
    ) -> Result<()>;

    /// Append interleaved samples
    fn write(&mut self, samples: &[i16]) -> Result<()>;

    /// Flush pending data and finalize the header
    ///
    /// Closing twice is a no-op.
    fn close(&mut self) -> Result<()>;
}

/// Lower-case extension of `path`, if any
pub(crate) fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}
