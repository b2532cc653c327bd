//! Packet decoding through symphonia
//!
//! ```text
//! InputStream -> StreamSource -> MediaSourceStream -> FormatReader -> Decoder
//! ```
//!
//! [`MediaDecoder`] owns the demuxer and codec for one track and hands out
//! interleaved `i16` samples, whatever the codec's native sample type.

use std::io::{self, ErrorKind, Read, Seek, SeekFrom};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, PoisonError};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::{Error as SymphoniaError, SeekErrorKind};
use symphonia::core::formats::{FormatReader, SeekMode, SeekTo};
use symphonia::core::io::{MediaSource, MediaSourceStream, MediaSourceStreamOptions};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::stream::InputStream;

/// An [`InputStream`] exposed to symphonia, starting at byte `base`
///
/// Positions seen by symphonia are relative to `base`, so leading data
/// such as an ID3v2 tag stays invisible to the demuxer.
pub(crate) struct StreamSource {
    stream: Mutex<Box<dyn InputStream>>,
    base: u64,
    len: u64,
}

impl StreamSource {
    pub(crate) fn new(mut stream: Box<dyn InputStream>, base: u64) -> io::Result<Self> {
        let size = stream.size()?;
        stream.seek(base)?;
        Ok(Self {
            stream: Mutex::new(stream),
            base,
            len: size.saturating_sub(base),
        })
    }

    /// Wrap into the buffered stream symphonia's demuxers read from
    pub(crate) fn into_media_stream(self) -> MediaSourceStream {
        MediaSourceStream::new(Box::new(self), MediaSourceStreamOptions::default())
    }

    fn stream(&mut self) -> &mut dyn InputStream {
        self.stream
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
    }
}

impl Read for StreamSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream().read(buf)
    }
}

impl Seek for StreamSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let (base, len) = (self.base, self.len);
        let stream = self.stream();
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => len.checked_add_signed(delta),
            SeekFrom::Current(delta) => stream
                .tell()?
                .checked_sub(base)
                .and_then(|position| position.checked_add_signed(delta)),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(ErrorKind::InvalidInput, "seek before the start of the stream")
        })?;
        Ok(stream.seek(base + target)?.saturating_sub(base))
    }
}

impl MediaSource for StreamSource {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        Some(self.len)
    }
}

/// Translate a symphonia failure for `format`
pub(crate) fn convert_error(format: &'static str, error: SymphoniaError) -> Error {
    match error {
        SymphoniaError::IoError(e) if e.kind() == ErrorKind::UnexpectedEof => Error::UnexpectedEof,
        SymphoniaError::IoError(e) => Error::Io(e),
        SymphoniaError::Unsupported(what) => Error::Unsupported(format!("{format}: {what}")),
        other => Error::corrupt(format, other.to_string()),
    }
}

/// Demuxer and codec bound to the first audio track of a stream
pub(crate) struct MediaDecoder {
    format: &'static str,
    demuxer: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    channels: u32,
    sample_rate: u32,
    frames: Option<u64>,

    /// Interleaved samples of the last decoded packet
    decoded: Vec<i16>,
    decoded_pos: usize,
    /// Samples still to drop after landing before a seek target
    skip: usize,
    finished: bool,
}

impl MediaDecoder {
    pub(crate) fn new(format: &'static str, demuxer: Box<dyn FormatReader>) -> Result<Self> {
        let track = demuxer
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::corrupt(format, "no audio track"))?;
        let track_id = track.id;
        let params = track.codec_params.clone();

        let sample_rate = params
            .sample_rate
            .filter(|&rate| rate > 0)
            .ok_or_else(|| Error::corrupt(format, "missing sample rate"))?;
        let channels = params
            .channels
            .map(|c| c.count() as u32)
            .filter(|&count| count > 0)
            .ok_or_else(|| Error::corrupt(format, "missing channel layout"))?;

        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| convert_error(format, e))?;

        debug!(
            format,
            sample_rate,
            channels,
            frames = ?params.n_frames,
            "opened symphonia decoder"
        );

        Ok(Self {
            format,
            demuxer,
            decoder,
            track_id,
            channels,
            sample_rate,
            frames: params.n_frames,
            decoded: Vec::new(),
            decoded_pos: 0,
            skip: 0,
            finished: false,
        })
    }

    pub(crate) fn channel_count(&self) -> u32 {
        self.channels
    }

    pub(crate) fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Inter-channel sample count announced by the container, 0 if unknown
    pub(crate) fn sample_count(&self) -> u64 {
        self.frames.unwrap_or(0) * u64::from(self.channels)
    }

    /// Position the decoder so the next read starts at `sample_offset`
    pub(crate) fn seek(&mut self, sample_offset: u64) -> Result<()> {
        let channels = u64::from(self.channels);
        let target = sample_offset / channels;

        self.decoded.clear();
        self.decoded_pos = 0;
        self.skip = 0;

        if self.frames.is_some_and(|total| target >= total) {
            self.finished = true;
            return Ok(());
        }

        let seek_to = SeekTo::TimeStamp {
            ts: target,
            track_id: self.track_id,
        };
        match self.demuxer.seek(SeekMode::Accurate, seek_to) {
            Ok(seeked) => {
                self.decoder.reset();
                self.finished = false;
                let lead = seeked.required_ts.saturating_sub(seeked.actual_ts);
                self.skip = (lead * channels + sample_offset % channels) as usize;
                debug!(
                    format = self.format,
                    target,
                    landed = seeked.actual_ts,
                    "seeked"
                );
                Ok(())
            }
            Err(SymphoniaError::SeekError(SeekErrorKind::OutOfRange)) => {
                self.finished = true;
                Ok(())
            }
            Err(e) => Err(convert_error(self.format, e)),
        }
    }

    /// Copy up to `samples.len()` interleaved samples, 0 at end of stream
    pub(crate) fn read(&mut self, samples: &mut [i16]) -> Result<usize> {
        let mut produced = 0;
        while produced < samples.len() {
            if self.decoded_pos == self.decoded.len() {
                if !self.decode_next()? {
                    break;
                }
                continue;
            }
            let available = &self.decoded[self.decoded_pos..];
            let n = available.len().min(samples.len() - produced);
            samples[produced..produced + n].copy_from_slice(&available[..n]);
            produced += n;
            self.decoded_pos += n;
        }
        Ok(produced)
    }

    /// Decode packets until one yields samples; false at end of stream
    fn decode_next(&mut self) -> Result<bool> {
        while !self.finished {
            let packet = match self.demuxer.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof => {
                    self.finished = true;
                    break;
                }
                Err(SymphoniaError::ResetRequired) => {
                    debug!(format = self.format, "stream layout changed, stopping");
                    self.finished = true;
                    break;
                }
                Err(e) => return Err(convert_error(self.format, e)),
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            self.decoded.clear();
            self.decoded_pos = 0;

            // Malformed packets can trip overflow checks inside the codec;
            // such a packet is dropped like any other corrupt one.
            let decoder = &mut self.decoder;
            let decoded = &mut self.decoded;
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                let buffer = decoder.decode(&packet)?;
                let mut interleaved =
                    SampleBuffer::<i16>::new(buffer.frames() as u64, *buffer.spec());
                interleaved.copy_interleaved_ref(buffer);
                decoded.extend_from_slice(interleaved.samples());
                Ok::<(), SymphoniaError>(())
            }));

            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(SymphoniaError::DecodeError(reason))) => {
                    warn!(format = self.format, %reason, "skipping corrupt packet");
                    continue;
                }
                Ok(Err(e)) => return Err(convert_error(self.format, e)),
                Err(_) => {
                    warn!(format = self.format, "decoder aborted on a malformed packet, skipping");
                    self.decoded.clear();
                    self.decoder.reset();
                    continue;
                }
            }

            let dropped = self.skip.min(self.decoded.len());
            self.skip -= dropped;
            self.decoded_pos = dropped;
            if self.decoded_pos < self.decoded.len() {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn source(bytes: Vec<u8>, base: u64) -> StreamSource {
        StreamSource::new(Box::new(Cursor::new(bytes)), base).unwrap()
    }

    #[test]
    fn test_source_hides_leading_bytes() {
        let mut source = source(b"skipMEDIA".to_vec(), 4);
        assert_eq!(source.byte_len(), Some(5));
        assert!(source.is_seekable());

        let mut buf = [0u8; 3];
        source.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"MED");
        assert_eq!(Seek::seek(&mut source, SeekFrom::Current(0)).unwrap(), 3);
    }

    #[test]
    fn test_source_relative_seeks() {
        let mut source = source(b"..0123456789".to_vec(), 2);

        assert_eq!(Seek::seek(&mut source, SeekFrom::End(-2)).unwrap(), 8);
        let mut buf = [0u8; 2];
        source.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"89");

        assert_eq!(Seek::seek(&mut source, SeekFrom::Start(1)).unwrap(), 1);
        assert_eq!(Seek::seek(&mut source, SeekFrom::Current(3)).unwrap(), 4);
        source.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"45");

        assert!(Seek::seek(&mut source, SeekFrom::Current(-20)).is_err());
        assert!(Seek::seek(&mut source, SeekFrom::End(-11)).is_err());
    }

    #[test]
    fn test_error_conversion() {
        let eof = SymphoniaError::IoError(io::Error::from(ErrorKind::UnexpectedEof));
        assert!(matches!(convert_error("FLAC", eof), Error::UnexpectedEof));

        let io = SymphoniaError::IoError(io::Error::from(ErrorKind::PermissionDenied));
        assert!(matches!(convert_error("FLAC", io), Error::Io(_)));

        assert!(matches!(
            convert_error("Ogg", SymphoniaError::DecodeError("bad page")),
            Error::Corrupt { format: "Ogg", .. }
        ));
        assert!(matches!(
            convert_error("Ogg", SymphoniaError::Unsupported("codec")),
            Error::Unsupported(_)
        ));
    }
}
