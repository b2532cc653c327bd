//! Speaker positions attached to each interleaved channel

/// Position of one channel in a sound's channel map
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SoundChannel {
    /// Position not known
    Unspecified,
    /// Single-channel sound
    Mono,
    /// Front left
    FrontLeft,
    /// Front right
    FrontRight,
    /// Front center
    FrontCenter,
    /// Between front left and front center
    FrontLeftOfCenter,
    /// Between front right and front center
    FrontRightOfCenter,
    /// Subwoofer
    LowFrequencyEffects,
    /// Rear left
    BackLeft,
    /// Rear right
    BackRight,
    /// Rear center
    BackCenter,
    /// Side left
    SideLeft,
    /// Side right
    SideRight,
    /// Overhead center
    TopCenter,
    /// Overhead front left
    TopFrontLeft,
    /// Overhead front right
    TopFrontRight,
    /// Overhead front center
    TopFrontCenter,
    /// Overhead rear left
    TopBackLeft,
    /// Overhead rear right
    TopBackRight,
    /// Overhead rear center
    TopBackCenter,
}

/// Conventional layout for sounds with one or two channels
///
/// Returns `None` for larger counts, which need an explicit map.
pub fn default_channel_map(channel_count: u32) -> Option<Vec<SoundChannel>> {
    match channel_count {
        1 => Some(vec![SoundChannel::Mono]),
        2 => Some(vec![SoundChannel::FrontLeft, SoundChannel::FrontRight]),
        _ => None,
    }
}

/// True if `map` names some channel more than once
///
/// `Unspecified` entries are allowed to repeat.
pub(crate) fn has_duplicates(map: &[SoundChannel]) -> bool {
    let mut sorted: Vec<_> = map
        .iter()
        .copied()
        .filter(|&c| c != SoundChannel::Unspecified)
        .collect();
    sorted.sort_unstable();
    sorted.windows(2).any(|w| w[0] == w[1])
}
