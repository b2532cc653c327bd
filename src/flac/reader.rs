//! FLAC decoder backed by symphonia's FLAC bundle
//!
//! The marker and leading STREAMINFO block are validated here; frames,
//! seek tables and resynchronisation are left to symphonia.

use std::io;

use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::default::formats::FlacReader as FlacDemuxer;
use tracing::warn;

use super::{channel_map, skip_id3v2, BLOCK_STREAMINFO, FORMAT_NAME, MARKER, STREAMINFO_LEN};
use crate::codec::{Info, SoundFileReader};
use crate::error::{Error, Result};
use crate::media::{convert_error, MediaDecoder, StreamSource};
use crate::stream::{read_array, InputStream};

/// Marker, block header and STREAMINFO body
const HEADER_LEN: usize = 4 + 4 + STREAMINFO_LEN;

/// Reader for FLAC streams
#[derive(Default)]
pub struct FlacReader {
    decoder: Option<MediaDecoder>,
}

impl FlacReader {
    /// Create a reader with no stream attached
    pub fn new() -> Self {
        Self::default()
    }

    fn decoder(&mut self) -> Result<&mut MediaDecoder> {
        self.decoder.as_mut().ok_or(Error::NotOpen)
    }
}

impl SoundFileReader for FlacReader {
    fn check(stream: &mut dyn InputStream) -> io::Result<bool> {
        let start = skip_id3v2(stream)?;
        stream.seek(start)?;
        Ok(read_array::<4>(stream)?.is_some_and(|m| &m == MARKER))
    }

    fn open(&mut self, mut stream: Box<dyn InputStream>) -> Result<Info> {
        self.decoder = None;

        let start = skip_id3v2(stream.as_mut())?;
        stream.seek(start)?;
        let header = read_array::<HEADER_LEN>(stream.as_mut())?.ok_or(Error::UnexpectedEof)?;
        if &header[..4] != MARKER {
            return Err(Error::corrupt(FORMAT_NAME, "missing fLaC marker"));
        }
        let kind = header[4] & 0x7F;
        let len = u32::from_be_bytes([0, header[5], header[6], header[7]]) as usize;
        if kind != BLOCK_STREAMINFO || len != STREAMINFO_LEN {
            return Err(Error::corrupt(FORMAT_NAME, "STREAMINFO must come first"));
        }

        let source = StreamSource::new(stream, start)?;
        let demuxer = FlacDemuxer::try_new(source.into_media_stream(), &FormatOptions::default())
            .map_err(|e| {
                let e = convert_error(FORMAT_NAME, e);
                warn!(error = %e, "failed to read FLAC metadata");
                e
            })?;
        let decoder = MediaDecoder::new(FORMAT_NAME, Box::new(demuxer))?;

        let channel_count = decoder.channel_count();
        let channel_map = channel_map(channel_count).ok_or_else(|| {
            Error::Unsupported(format!("{channel_count} FLAC channels"))
        })?;
        let info = Info {
            sample_count: decoder.sample_count(),
            channel_count,
            sample_rate: decoder.sample_rate(),
            channel_map,
        };

        self.decoder = Some(decoder);
        Ok(info)
    }

    fn seek(&mut self, sample_offset: u64) -> Result<()> {
        self.decoder()?.seek(sample_offset)
    }

    fn read(&mut self, samples: &mut [i16]) -> Result<usize> {
        self.decoder()?.read(samples)
    }
}
