//! sound_play core - audio mixer engine
//!
//! This crate provides decoding, sample-rate conversion, mixing and device
//! output, plus the blocking [`AudioSession`] the command line drives.

pub mod config;
pub mod convert;
pub mod decoder;
pub mod mixer;
pub mod music;
pub mod output;
pub mod session;
pub mod sound;

#[cfg( test )]
mod testutil;

pub use config::MixerConfig;
pub use mixer::{ Channel, Mixer, MixerError };
pub use output::OutputSpec;
pub use session::{ AudioSession, MixerSession, PlayError, PlaybackKind, Playing, SessionError };
pub use sound::Sound;
