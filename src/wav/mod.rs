//! RIFF/WAVE support
//!
//! ```text
//! +--------+----------+--------+
//! | "RIFF" | size u32 | "WAVE" |   all integers little-endian
//! +--------+----------+--------+
//! | "fmt " | 16 or 40 | format, channels, rate, byte rate,
//! |        |          | block align, bits [, extensible tail]
//! +--------+----------+--------+
//! | other chunks (skipped, padded to even size)      |
//! +--------+----------+--------+
//! | "data" | size u32 | interleaved samples        |
//! +--------+----------+--------+
//! ```

mod reader;
mod writer;

pub use reader::WavReader;
pub use writer::WavWriter;

use crate::channel::SoundChannel;

pub(crate) const FORMAT_NAME: &str = "WAV";

pub(crate) const RIFF_ID: &[u8; 4] = b"RIFF";
pub(crate) const WAVE_ID: &[u8; 4] = b"WAVE";
pub(crate) const FMT_ID: &[u8; 4] = b"fmt ";
pub(crate) const DATA_ID: &[u8; 4] = b"data";

/// Integer PCM
pub(crate) const FORMAT_PCM: u16 = 1;
/// IEEE-754 float
pub(crate) const FORMAT_FLOAT: u16 = 3;
/// WAVE_FORMAT_EXTENSIBLE, real format in the sub-format GUID
pub(crate) const FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Sub-format GUID after its leading format tag (KSDATAFORMAT_SUBTYPE_*)
pub(crate) const SUBFORMAT_TAIL: [u8; 14] = [
    0x00, 0x00, 0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0xAA, 0x00, 0x38, 0x9B, 0x71,
];

/// Speaker mask bits in the order samples are interleaved
pub(crate) const SPEAKERS: [(u32, SoundChannel); 18] = [
    (0x1, SoundChannel::FrontLeft),
    (0x2, SoundChannel::FrontRight),
    (0x4, SoundChannel::FrontCenter),
    (0x8, SoundChannel::LowFrequencyEffects),
    (0x10, SoundChannel::BackLeft),
    (0x20, SoundChannel::BackRight),
    (0x40, SoundChannel::FrontLeftOfCenter),
    (0x80, SoundChannel::FrontRightOfCenter),
    (0x100, SoundChannel::BackCenter),
    (0x200, SoundChannel::SideLeft),
    (0x400, SoundChannel::SideRight),
    (0x800, SoundChannel::TopCenter),
    (0x1000, SoundChannel::TopFrontLeft),
    (0x2000, SoundChannel::TopFrontCenter),
    (0x4000, SoundChannel::TopFrontRight),
    (0x8000, SoundChannel::TopBackLeft),
    (0x10000, SoundChannel::TopBackCenter),
    (0x20000, SoundChannel::TopBackRight),
];
