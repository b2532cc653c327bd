//! Error types for packets, transport framing and sound codecs

use thiserror::Error;

/// Errors raised by transport framing and sound file readers/writers
///
/// Packet extraction never produces an `Error`; short reads only flip the
/// packet's validity flag.
#[derive(Debug, Error)]
pub enum Error {
    /// The underlying stream failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Ran out of bytes while decoding a structure
    #[error("unexpected end of data")]
    UnexpectedEof,

    /// The format was recognized but its content is inconsistent
    #[error("corrupt {format} data: {reason}")]
    Corrupt {
        /// Format name ("WAV", "FLAC", ...)
        format: &'static str,
        /// What was wrong
        reason: String,
    },

    /// The data is well-formed but uses a layout this crate does not handle
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// No registered reader or writer accepts the input
    #[error("no registered codec supports this sound file")]
    UnsupportedFormat,

    /// A reader or writer was used before `open` succeeded
    #[error("sound file is not open")]
    NotOpen,

    /// The channel map handed to a writer cannot be represented
    #[error("invalid channel map: {0}")]
    ChannelMap(String),

    /// A packet payload exceeds the transport limit
    #[error("packet of {size} bytes exceeds the {limit} byte limit")]
    PacketTooLarge {
        /// Payload size in bytes
        size: usize,
        /// Maximum accepted size
        limit: usize,
    },

    /// A send/receive filter rejected the payload
    #[error("packet filter failed: {0}")]
    Filter(String),
}

impl Error {
    pub(crate) fn corrupt(format: &'static str, reason: impl Into<String>) -> Self {
        Error::Corrupt {
            format,
            reason: reason.into(),
        }
    }
}

/// Result type alias for bitsound operations
pub type Result<T> = core::result::Result<T, Error>;
