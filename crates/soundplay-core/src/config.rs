//! Mixer configuration.

use std::time::Duration;


/// Settings used when opening the mixer.
///
/// The defaults mirror what a typical game-audio mixer opens with: CD-rate
/// stereo and eight one-shot sound channels.
#[derive( Debug, Clone, PartialEq )]
pub struct MixerConfig {
    /// Requested output sample rate in Hz. The device may pick another.
    pub frequency: u32,

    /// Requested number of output channels.
    pub channels: u16,

    /// Number of one-shot sound channels that can play at once.
    pub sound_channels: usize,

    /// How often a blocking sound playback checks for completion.
    pub sound_poll_interval: Duration,

    /// How often a blocking music playback checks for completion.
    pub music_poll_interval: Duration,
}


impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            frequency: 44100,
            channels: 2,
            sound_channels: 8,
            sound_poll_interval: Duration::from_millis( 50 ),
            music_poll_interval: Duration::from_millis( 100 ),
        }
    }
}
