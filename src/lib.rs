//! BitSound: typed network packets and sniffing sound-file codecs
//!
//! Two independent building blocks live in this crate:
//!
//! - [`Packet`], a growable byte buffer with typed, order-dependent
//!   append/extract and a fixed big-endian wire format, plus framing and
//!   filters for moving packets over streams and datagrams ([`transport`]).
//! - A [`Registry`] of sound file readers and writers that picks a decoder
//!   by sniffing the leading bytes of a stream, with WAV, FLAC and Ogg
//!   Vorbis codecs and the [`InputSoundFile`]/[`OutputSoundFile`] handles.
//!
//! # Packet Format
//!
//! ```text
//! +----------+--------------+----------------------------+
//! | bool  1B | u32 4B (BE)  | string: u32 len + UTF-8    |  ...
//! +----------+--------------+----------------------------+
//! ```
//!
//! No type tags are transmitted; both sides agree on the order.
//!
//! # Features
//!
//! - Sticky validity flag instead of errors on short reads
//! - Length-prefixed stream framing tolerant of partial, non-blocking reads
//! - Optional LZ4 compression (`lz4`) and ChaCha20-Poly1305 sealing (`aead`)
//! - Format detection by content, first registered match wins
//! - WAV (PCM, float, extensible) and FLAC readers and writers
//! - Ogg Vorbis reader (FLAC and Vorbis decoding through symphonia)
//!
//! # Example
//!
//! ```rust
//! use bitsound::*;
//!
//! let mut packet = Packet::new();
//! packet.write_u32(42).write_bool(true).write_string("hi");
//!
//! assert_eq!(packet.read_u32(), 42);
//! assert!(packet.read_bool());
//! assert_eq!(packet.read_string(), "hi");
//! assert!(packet.end_of_packet());
//!
//! // Ten bytes of noise are not a sound file
//! let registry = Registry::with_defaults();
//! let reader = registry.create_reader_from_memory(&[0x5A; 10])?;
//! assert!(reader.is_none());
//! # Ok::<(), bitsound::Error>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod bits;
pub mod channel;
pub mod codec;
pub mod crc;
pub mod error;
pub mod flac;
mod media;
pub mod ogg;
pub mod packet;
pub mod registry;
pub mod sound_file;
pub mod stream;
pub mod transport;
pub mod wav;

// Re-export main types
pub use channel::SoundChannel;
pub use codec::{Info, SoundFileReader, SoundFileWriter};
pub use error::Error;
pub use flac::{FlacReader, FlacWriter};
pub use ogg::OggVorbisReader;
pub use packet::{Pack, Packet, Unpack};
pub use registry::Registry;
pub use sound_file::{InputSoundFile, OutputSoundFile};
pub use stream::{InputStream, OutputStream};
pub use transport::{PacketFilter, PacketReceiver, Plain, Status};
pub use wav::{WavReader, WavWriter};

/// Maximum framed packet payload (16MB - safety limit)
pub const MAX_PACKET_SIZE: usize = 16 * 1024 * 1024;

/// Maximum datagram payload (IPv4 UDP limit)
pub const MAX_DATAGRAM_SIZE: usize = 65_507;
