//! FLAC encoder: fixed 4096-sample blocks of 16-bit audio
//!
//! Each channel is stored as CONSTANT, VERBATIM or the cheapest FIXED
//! predictor with a single Rice partition. Stereo frames also try the
//! three difference-channel layouts and keep whichever is smallest.

use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use tracing::warn;

use super::{channel_map, StreamInfo, BLOCK_STREAMINFO, MARKER, STREAMINFO_LEN};
use crate::bits::BitWriter;
use crate::channel::{has_duplicates, SoundChannel};
use crate::codec::{extension, SoundFileWriter};
use crate::crc::{crc16, crc8};
use crate::error::{Error, Result};
use crate::stream::OutputStream;

/// 14-bit frame sync code
const SYNC_CODE: u64 = 0x3FFE;
const BLOCK_SIZE: usize = 4096;
/// Header code for a 4096-sample block
const BLOCK_SIZE_CODE: u64 = 12;
/// Header code for "block size - 1 follows in 16 bits"
const BLOCK_SIZE_CODE_16BIT: u64 = 7;
const BITS_PER_SAMPLE: u32 = 16;
/// Header code for 16-bit samples
const SAMPLE_SIZE_CODE: u64 = 4;
/// Highest Rice parameter below the 4-bit escape code
const MAX_RICE_PARAMETER: u32 = 14;
/// Largest sample rate a STREAMINFO block can hold
const MAX_SAMPLE_RATE: u32 = (1 << 20) - 1;
/// STREAMINFO body offset: marker + block header
const STREAMINFO_OFFSET: u64 = 8;

/// How the channels of a frame are stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelAssignment {
    /// Each channel coded on its own
    Independent(u32),
    /// Left, then left minus right
    LeftSide,
    /// Left minus right, then right
    SideRight,
    /// Average, then left minus right
    MidSide,
}

impl ChannelAssignment {
    /// 4-bit header code
    fn code(self) -> u64 {
        match self {
            ChannelAssignment::Independent(n) => u64::from(n - 1),
            ChannelAssignment::LeftSide => 8,
            ChannelAssignment::SideRight => 9,
            ChannelAssignment::MidSide => 10,
        }
    }

    /// Whether channel `index` is a difference channel needing one extra bit
    fn is_side(self, index: usize) -> bool {
        matches!(
            (self, index),
            (ChannelAssignment::LeftSide, 1)
                | (ChannelAssignment::SideRight, 0)
                | (ChannelAssignment::MidSide, 1)
        )
    }
}

/// How one channel of a block is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Subframe {
    Constant,
    Verbatim,
    Fixed { order: usize, parameter: u32 },
}

/// Writer producing native FLAC streams
#[derive(Default)]
pub struct FlacWriter {
    sink: Option<Box<dyn OutputStream>>,
    info: StreamInfo,
    /// `remap[i]` is the input channel stored as FLAC channel `i`
    remap: Vec<usize>,
    /// Interleaved samples in FLAC channel order, less than one block
    pending: Vec<i16>,
    frame_number: u64,
}

impl FlacWriter {
    /// Create a writer with no sink attached
    pub fn new() -> Self {
        Self::default()
    }

    fn channel_count(&self) -> usize {
        usize::from(self.info.channels)
    }

    /// Encode `frames` inter-channel samples from the front of `pending`
    fn flush_block(&mut self, frames: usize) -> Result<()> {
        let channel_count = self.channel_count();
        let mut channels: Vec<Vec<i64>> = vec![Vec::with_capacity(frames); channel_count];
        for frame in self.pending[..frames * channel_count].chunks_exact(channel_count) {
            for (channel, &sample) in channels.iter_mut().zip(frame) {
                channel.push(i64::from(sample));
            }
        }
        self.pending.drain(..frames * channel_count);

        let (assignment, coded) = choose_layout(channels);

        let mut bits = BitWriter::new();
        write_frame_header(&mut bits, frames, assignment, self.frame_number);
        for (index, (samples, subframe)) in coded.iter().enumerate() {
            let depth = BITS_PER_SAMPLE + u32::from(assignment.is_side(index));
            write_subframe(&mut bits, samples, depth, *subframe);
        }
        bits.align();
        let crc = crc16(bits.bytes());
        bits.write_bits(u64::from(crc), 16);
        let bytes = bits.into_bytes();

        let sink = self.sink.as_mut().ok_or(Error::NotOpen)?;
        sink.write_all(&bytes)?;

        let size = bytes.len() as u32;
        if self.info.min_frame_size == 0 || size < self.info.min_frame_size {
            self.info.min_frame_size = size;
        }
        self.info.max_frame_size = self.info.max_frame_size.max(size);
        self.info.total_samples += frames as u64;
        self.frame_number += 1;
        Ok(())
    }
}

/// Pick the channel layout with the smallest coded size
fn choose_layout(channels: Vec<Vec<i64>>) -> (ChannelAssignment, Vec<(Vec<i64>, Subframe)>) {
    let plan = |samples: Vec<i64>, depth: u32| {
        let (subframe, cost) = plan_subframe(&samples, depth);
        (samples, subframe, cost)
    };

    if channels.len() != 2 {
        let count = channels.len() as u32;
        let coded = channels
            .into_iter()
            .map(|samples| {
                let (samples, subframe, _) = plan(samples, BITS_PER_SAMPLE);
                (samples, subframe)
            })
            .collect();
        return (ChannelAssignment::Independent(count), coded);
    }

    let left = &channels[0];
    let right = &channels[1];
    let side: Vec<i64> = left.iter().zip(right).map(|(l, r)| l - r).collect();
    let mid: Vec<i64> = left.iter().zip(right).map(|(l, r)| (l + r) >> 1).collect();

    let left = plan(left.clone(), BITS_PER_SAMPLE);
    let right = plan(right.clone(), BITS_PER_SAMPLE);
    let side = plan(side, BITS_PER_SAMPLE + 1);
    let mid = plan(mid, BITS_PER_SAMPLE);

    let layouts = [
        (ChannelAssignment::Independent(2), left.2 + right.2),
        (ChannelAssignment::LeftSide, left.2 + side.2),
        (ChannelAssignment::SideRight, side.2 + right.2),
        (ChannelAssignment::MidSide, mid.2 + side.2),
    ];
    let (assignment, _) = layouts
        .iter()
        .copied()
        .min_by_key(|&(_, cost)| cost)
        .unwrap_or(layouts[0]);

    let (first, second) = match assignment {
        ChannelAssignment::LeftSide => (left, side),
        ChannelAssignment::SideRight => (side, right),
        ChannelAssignment::MidSide => (mid, side),
        ChannelAssignment::Independent(_) => (left, right),
    };
    (
        assignment,
        vec![(first.0, first.1), (second.0, second.1)],
    )
}

#[inline]
fn zigzag(residual: i64) -> u64 {
    ((residual << 1) ^ (residual >> 63)) as u64
}

/// Residuals of the order-`order` fixed predictor
fn fixed_residuals(samples: &[i64], order: usize) -> impl Iterator<Item = i64> + '_ {
    (order..samples.len()).map(move |i| {
        let s = samples;
        let prediction = match order {
            0 => 0,
            1 => s[i - 1],
            2 => 2 * s[i - 1] - s[i - 2],
            3 => 3 * s[i - 1] - 3 * s[i - 2] + s[i - 3],
            _ => 4 * s[i - 1] - 6 * s[i - 2] + 4 * s[i - 3] - s[i - 4],
        };
        s[i] - prediction
    })
}

/// Best Rice parameter for `residuals` and the bits it costs
fn rice_parameter(residuals: impl Iterator<Item = i64>) -> (u32, u64) {
    let folded: Vec<u64> = residuals.map(zigzag).collect();
    let count = folded.len() as u64;
    (0..=MAX_RICE_PARAMETER)
        .map(|k| {
            let quotients: u64 = folded.iter().map(|&u| u >> k).sum();
            (k, quotients + count * u64::from(k + 1))
        })
        .min_by_key(|&(_, cost)| cost)
        .unwrap_or((0, u64::MAX))
}

/// Choose a subframe type for one channel and return its size in bits
fn plan_subframe(samples: &[i64], depth: u32) -> (Subframe, u64) {
    // Subframe header is 8 bits
    if samples.windows(2).all(|w| w[0] == w[1]) {
        return (Subframe::Constant, 8 + u64::from(depth));
    }

    let mut best = (
        Subframe::Verbatim,
        8 + u64::from(depth) * samples.len() as u64,
    );
    for order in 0..=4.min(samples.len()) {
        let (parameter, residual_bits) = rice_parameter(fixed_residuals(samples, order));
        // Method, partition order and parameter fields
        let cost = 8 + order as u64 * u64::from(depth) + 2 + 4 + 4 + residual_bits;
        if cost < best.1 {
            best = (Subframe::Fixed { order, parameter }, cost);
        }
    }
    best
}

fn write_frame_header(
    bits: &mut BitWriter,
    frames: usize,
    assignment: ChannelAssignment,
    number: u64,
) {
    let start = bits.bytes().len();
    bits.write_bits(SYNC_CODE, 14);
    bits.write_bits(0, 1);
    // Fixed block size
    bits.write_bits(0, 1);
    let block_code = if frames == BLOCK_SIZE {
        BLOCK_SIZE_CODE
    } else {
        BLOCK_SIZE_CODE_16BIT
    };
    bits.write_bits(block_code, 4);
    // Sample rate from STREAMINFO
    bits.write_bits(0, 4);
    bits.write_bits(assignment.code(), 4);
    bits.write_bits(SAMPLE_SIZE_CODE, 3);
    bits.write_bits(0, 1);
    bits.write_utf8_u64(number);
    if block_code == BLOCK_SIZE_CODE_16BIT {
        bits.write_bits(frames as u64 - 1, 16);
    }
    let crc = crc8(&bits.bytes()[start..]);
    bits.write_bits(u64::from(crc), 8);
}

fn write_subframe(bits: &mut BitWriter, samples: &[i64], depth: u32, subframe: Subframe) {
    match subframe {
        Subframe::Constant => {
            bits.write_bits(0, 8);
            bits.write_signed(samples[0], depth);
        }
        Subframe::Verbatim => {
            bits.write_bits(1 << 1, 8);
            for &sample in samples {
                bits.write_signed(sample, depth);
            }
        }
        Subframe::Fixed { order, parameter } => {
            bits.write_bits((8 + order as u64) << 1, 8);
            for &sample in &samples[..order] {
                bits.write_signed(sample, depth);
            }
            // Rice, partition order 0
            bits.write_bits(0, 2);
            bits.write_bits(0, 4);
            bits.write_bits(u64::from(parameter), 4);
            for residual in fixed_residuals(samples, order) {
                let folded = zigzag(residual);
                bits.write_unary((folded >> parameter) as u32);
                bits.write_bits(folded & ((1 << parameter) - 1), parameter);
            }
        }
    }
}

impl SoundFileWriter for FlacWriter {
    fn check(path: &Path) -> bool {
        extension(path).as_deref() == Some("flac")
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
        let target = self::channel_map(channel_count)
            .ok_or_else(|| Error::Unsupported(format!("{channel_count} FLAC channels")))?;
        if channel_map.len() != target.len() || has_duplicates(channel_map) {
            return Err(Error::ChannelMap(format!(
                "{channel_map:?} is not a FLAC layout for {channel_count} channels"
            )));
        }
        let remap = target
            .iter()
            .map(|wanted| channel_map.iter().position(|c| c == wanted))
            .collect::<Option<Vec<usize>>>()
            .ok_or_else(|| {
                Error::ChannelMap(format!("{channel_map:?} cannot be reordered to {target:?}"))
            })?;
        if sample_rate == 0 || sample_rate > MAX_SAMPLE_RATE {
            return Err(Error::Unsupported(format!("{sample_rate} Hz FLAC stream")));
        }

        self.info = StreamInfo {
            min_block_size: BLOCK_SIZE as u16,
            max_block_size: BLOCK_SIZE as u16,
            sample_rate,
            channels: channel_count as u8,
            bits_per_sample: BITS_PER_SAMPLE as u8,
            ..StreamInfo::default()
        };

        let mut header = MARKER.to_vec();
        // Last metadata block
        header.push(0x80 | BLOCK_STREAMINFO);
        header.extend_from_slice(&(STREAMINFO_LEN as u32).to_be_bytes()[1..]);
        header.extend_from_slice(&self.info.to_bytes());

        sink.seek(SeekFrom::Start(0))?;
        sink.write_all(&header)?;

        self.sink = Some(sink);
        self.remap = remap;
        self.pending.clear();
        self.frame_number = 0;
        Ok(())
    }

    fn write(&mut self, samples: &[i16]) -> Result<()> {
        if self.sink.is_none() {
            return Err(Error::NotOpen);
        }

        let channel_count = self.channel_count();
        let stray = samples.len() % channel_count;
        if stray != 0 {
            warn!(stray, "dropping samples that do not fill a FLAC frame");
        }

        for frame in samples[..samples.len() - stray].chunks_exact(channel_count) {
            self.pending.extend(self.remap.iter().map(|&source| frame[source]));
            if self.pending.len() == BLOCK_SIZE * channel_count {
                self.flush_block(BLOCK_SIZE)?;
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.sink.is_none() {
            return Ok(());
        }

        let remaining = self.pending.len() / self.channel_count();
        if remaining > 0 {
            self.flush_block(remaining)?;
        }

        let Some(mut sink) = self.sink.take() else {
            return Ok(());
        };
        let end = sink.stream_position()?;
        sink.seek(SeekFrom::Start(STREAMINFO_OFFSET))?;
        sink.write_all(&self.info.to_bytes())?;
        sink.seek(SeekFrom::Start(end))?;
        sink.flush()?;
        Ok(())
    }
}

impl Drop for FlacWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "failed to finalize FLAC file");
        }
    }
}
