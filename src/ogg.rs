//! Ogg Vorbis decoding
//!
//! ```text
//! page:    "OggS" version(1) type(1) granule(8) serial(4) sequence(4)
//!          crc(4) segments(1) lacing[segments] payload
//! first packet of the first page: 0x01 "vorbis" identification header
//! ```
//!
//! Only Vorbis streams are claimed; other codecs carried in Ogg (Opus,
//! FLAC) are left for later registry entries.

use std::io;

use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::default::formats::OggReader as OggDemuxer;
use tracing::warn;

use crate::channel::SoundChannel;
use crate::codec::{Info, SoundFileReader};
use crate::error::{Error, Result};
use crate::media::{convert_error, MediaDecoder, StreamSource};
use crate::stream::{read_array, read_full, InputStream};

pub(crate) const FORMAT_NAME: &str = "Ogg Vorbis";

const CAPTURE_PATTERN: &[u8; 4] = b"OggS";
const PAGE_HEADER_LEN: usize = 27;
const VORBIS_IDENTIFICATION: &[u8; 7] = b"\x01vorbis";

/// Channel positions in Vorbis stream order
fn channel_map(channels: u32) -> Option<Vec<SoundChannel>> {
    use SoundChannel::*;
    let map = match channels {
        1 => vec![Mono],
        2 => vec![FrontLeft, FrontRight],
        3 => vec![FrontLeft, FrontCenter, FrontRight],
        4 => vec![FrontLeft, FrontRight, BackLeft, BackRight],
        5 => vec![FrontLeft, FrontCenter, FrontRight, BackLeft, BackRight],
        6 => vec![FrontLeft, FrontCenter, FrontRight, BackLeft, BackRight, LowFrequencyEffects],
        7 => vec![
            FrontLeft,
            FrontCenter,
            FrontRight,
            SideLeft,
            SideRight,
            BackCenter,
            LowFrequencyEffects,
        ],
        8 => vec![
            FrontLeft,
            FrontCenter,
            FrontRight,
            SideLeft,
            SideRight,
            BackLeft,
            BackRight,
            LowFrequencyEffects,
        ],
        _ => return None,
    };
    Some(map)
}

/// Reader for Ogg Vorbis streams
#[derive(Default)]
pub struct OggVorbisReader {
    decoder: Option<MediaDecoder>,
}

impl OggVorbisReader {
    /// Create a reader with no stream attached
    pub fn new() -> Self {
        Self::default()
    }

    fn decoder(&mut self) -> Result<&mut MediaDecoder> {
        self.decoder.as_mut().ok_or(Error::NotOpen)
    }
}

impl SoundFileReader for OggVorbisReader {
    fn check(stream: &mut dyn InputStream) -> io::Result<bool> {
        let Some(page) = read_array::<PAGE_HEADER_LEN>(stream)? else {
            return Ok(false);
        };
        if &page[..4] != CAPTURE_PATTERN {
            return Ok(false);
        }
        let mut lacing = vec![0u8; usize::from(page[26])];
        if read_full(stream, &mut lacing)? < lacing.len() {
            return Ok(false);
        }
        Ok(read_array::<7>(stream)?.is_some_and(|id| &id == VORBIS_IDENTIFICATION))
    }

    fn open(&mut self, stream: Box<dyn InputStream>) -> Result<Info> {
        self.decoder = None;

        let source = StreamSource::new(stream, 0)?;
        let demuxer = OggDemuxer::try_new(source.into_media_stream(), &FormatOptions::default())
            .map_err(|e| {
                let e = convert_error(FORMAT_NAME, e);
                warn!(error = %e, "failed to read Ogg headers");
                e
            })?;
        let decoder = MediaDecoder::new(FORMAT_NAME, Box::new(demuxer))?;

        let channel_count = decoder.channel_count();
        let channel_map = channel_map(channel_count).ok_or_else(|| {
            Error::Unsupported(format!("{channel_count} Vorbis channels"))
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
