//! Blocking playback session
//!
//! [`AudioSession`] is the surface the command line drives: start a file,
//! report it, wait until it finishes. [`MixerSession`] implements it on top of
//! a real [`Mixer`].

use std::fmt;
use std::io::Write;
use std::path::{ Path, PathBuf };
use std::thread;
use std::time::Duration;

use thiserror::Error;

use crate::config::MixerConfig;
use crate::mixer::{ Channel, Mixer, MixerError };


/// How a file is played.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum PlaybackKind {
    /// Fully decoded and played on a one-shot channel.
    Sound,
    /// Streamed on the dedicated music channel.
    Music,
}


impl fmt::Display for PlaybackKind {
    fn fmt( &self, f: &mut fmt::Formatter<'_> ) -> fmt::Result {
        match self {
            PlaybackKind::Sound => f.write_str( "sound" ),
            PlaybackKind::Music => f.write_str( "music" ),
        }
    }
}


/// Errors that prevent the session from opening.
#[derive( Debug, Error )]
pub enum SessionError {
    #[error( transparent )]
    DeviceInit( MixerError ),
}


/// Errors for a single file. These never stop the rest of a batch.
#[derive( Debug, Error )]
pub enum PlayError {
    #[error( "Error playing {kind} '{}': {source}", .path.display() )]
    Load {
        kind: PlaybackKind,
        path: PathBuf,
        source: MixerError,
    },

    #[error( "Failed to play: {}", .path.display() )]
    NoFreeChannel { path: PathBuf },
}


/// Something that can be polled for completion.
pub trait Playing {
    fn is_busy( &self ) -> bool;
}


impl Playing for Channel {
    fn is_busy( &self ) -> bool {
        Channel::is_busy( self )
    }
}


/// Blocks until `handle` stops playing, checking every `interval`.
pub fn wait_until_idle<P: Playing + ?Sized>( handle: &P, interval: Duration ) {
    while handle.is_busy() {
        thread::sleep( interval );
    }
}


/// An open audio session able to play files one at a time.
pub trait AudioSession {
    type Handle: Playing;

    /// Loads `path` as a one-shot sound and starts it.
    fn start_sound( &mut self, path: &Path ) -> Result<Self::Handle, PlayError>;

    /// Opens `path` as streamed music and starts it.
    fn start_music( &mut self, path: &Path ) -> Result<Self::Handle, PlayError>;

    /// How often a blocking playback of `kind` checks for completion.
    fn poll_interval( &self, kind: PlaybackKind ) -> Duration;


    /// Closes the session once every file has been handled.
    fn finalize( self )
    where
        Self: Sized,
    {
    }


    /// Plays `path` as a sound and blocks until it finishes.
    fn play_sound( &mut self, path: &Path, out: &mut dyn Write ) -> Result<(), PlayError> {
        self.play( PlaybackKind::Sound, path, out )
    }


    /// Plays `path` as music and blocks until it finishes.
    fn play_music( &mut self, path: &Path, out: &mut dyn Write ) -> Result<(), PlayError> {
        self.play( PlaybackKind::Music, path, out )
    }


    /// Starts `path`, writes one status line to `out`, and blocks until done.
    ///
    /// On failure the diagnostic is written to `out` as well.
    fn play( &mut self, kind: PlaybackKind, path: &Path, out: &mut dyn Write ) -> Result<(), PlayError> {
        let started = match kind {
            PlaybackKind::Sound => self.start_sound( path ),
            PlaybackKind::Music => self.start_music( path ),
        };

        let handle = match started {
            Ok( handle ) => handle,
            Err( e ) => {
                tracing::info!( "{}", e );
                let _ = writeln!( out, "{}", e );
                return Err( e );
            }
        };

        let _ = writeln!( out, "Playing {}: {}", kind, path.display() );
        wait_until_idle( &handle, self.poll_interval( kind ) );
        tracing::debug!( "Finished {} {:?}", kind, path );

        Ok(())
    }
}


/// Session backed by the system output device.
pub struct MixerSession {
    mixer: Mixer,
    config: MixerConfig,
}


impl MixerSession {
    /// Opens the output device.
    pub fn init( config: MixerConfig ) -> Result<Self, SessionError> {
        let mixer = Mixer::init( &config ).map_err( SessionError::DeviceInit )?;
        Ok( Self { mixer, config } )
    }
}


impl AudioSession for MixerSession {
    type Handle = Channel;


    fn start_sound( &mut self, path: &Path ) -> Result<Channel, PlayError> {
        let sound = self.mixer.load_sound( path ).map_err( |source| PlayError::Load {
            kind: PlaybackKind::Sound,
            path: path.to_path_buf(),
            source,
        })?;

        self.mixer.play( &sound ).ok_or_else( || PlayError::NoFreeChannel {
            path: path.to_path_buf(),
        })
    }


    fn start_music( &mut self, path: &Path ) -> Result<Channel, PlayError> {
        self.mixer.play_music( path ).map_err( |source| PlayError::Load {
            kind: PlaybackKind::Music,
            path: path.to_path_buf(),
            source,
        })
    }


    fn poll_interval( &self, kind: PlaybackKind ) -> Duration {
        match kind {
            PlaybackKind::Sound => self.config.sound_poll_interval,
            PlaybackKind::Music => self.config.music_poll_interval,
        }
    }


    /// Releases the device. Errors are logged and dropped.
    fn finalize( self ) {
        if let Err( e ) = self.mixer.quit() {
            tracing::debug!( "Ignoring mixer teardown error: {}", e );
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use std::cell::Cell;

    use crate::decoder::DecoderError;
    use crate::sound::LoadError;


    /// Handle that reports busy for a fixed number of polls.
    struct Countdown( Cell<u32> );

    impl Playing for Countdown {
        fn is_busy( &self ) -> bool {
            let left = self.0.get();
            if left == 0 {
                return false;
            }
            self.0.set( left - 1 );
            true
        }
    }


    struct FakeSession {
        fail_music: bool,
    }

    impl AudioSession for FakeSession {
        type Handle = Countdown;

        fn start_sound( &mut self, path: &Path ) -> Result<Countdown, PlayError> {
            if path.ends_with( "busy.wav" ) {
                return Err( PlayError::NoFreeChannel { path: path.to_path_buf() } );
            }
            if path.ends_with( "broken.wav" ) {
                return Err( PlayError::Load {
                    kind: PlaybackKind::Sound,
                    path: path.to_path_buf(),
                    source: MixerError::Load( LoadError::Decoder( DecoderError::UnsupportedFormat ) ),
                });
            }
            Ok( Countdown( Cell::new( 3 ) ) )
        }

        fn start_music( &mut self, path: &Path ) -> Result<Countdown, PlayError> {
            if self.fail_music {
                return Err( PlayError::Load {
                    kind: PlaybackKind::Music,
                    path: path.to_path_buf(),
                    source: MixerError::Thread( std::io::Error::other( "no threads" ) ),
                });
            }
            Ok( Countdown( Cell::new( 2 ) ) )
        }

        fn poll_interval( &self, _kind: PlaybackKind ) -> Duration {
            Duration::ZERO
        }
    }


    #[test]
    fn test_play_sound_reports_and_waits() {
        let mut session = FakeSession { fail_music: false };
        let mut out = Vec::new();

        session.play_sound( Path::new( "good.wav" ), &mut out ).unwrap();
        assert_eq!( String::from_utf8( out ).unwrap(), "Playing sound: good.wav\n" );
    }


    #[test]
    fn test_play_music_reports_kind() {
        let mut session = FakeSession { fail_music: false };
        let mut out = Vec::new();

        session.play_music( Path::new( "song.mp3" ), &mut out ).unwrap();
        assert_eq!( String::from_utf8( out ).unwrap(), "Playing music: song.mp3\n" );
    }


    #[test]
    fn test_no_free_channel_message() {
        let mut session = FakeSession { fail_music: false };
        let mut out = Vec::new();

        let result = session.play_sound( Path::new( "busy.wav" ), &mut out );
        assert!( matches!( result, Err( PlayError::NoFreeChannel { .. } ) ) );
        assert_eq!( String::from_utf8( out ).unwrap(), "Failed to play: busy.wav\n" );
    }


    #[test]
    fn test_load_error_names_file_and_cause() {
        let mut session = FakeSession { fail_music: true };
        let mut out = Vec::new();

        let result = session.play_music( Path::new( "song.mp3" ), &mut out );
        assert!( result.is_err() );
        assert_eq!(
            String::from_utf8( out ).unwrap(),
            "Error playing music 'song.mp3': Failed to start decode thread: no threads\n"
        );
    }


    #[test]
    fn test_undecodable_sound_names_file_and_cause() {
        let mut session = FakeSession { fail_music: false };
        let mut out = Vec::new();

        let result = session.play_sound( Path::new( "broken.wav" ), &mut out );
        assert!( matches!( result, Err( PlayError::Load { kind: PlaybackKind::Sound, .. } ) ) );
        assert_eq!(
            String::from_utf8( out ).unwrap(),
            "Error playing sound 'broken.wav': Unsupported format\n"
        );
    }


    #[test]
    fn test_wait_until_idle_polls_to_completion() {
        let handle = Countdown( Cell::new( 5 ) );
        wait_until_idle( &handle, Duration::ZERO );
        assert_eq!( handle.0.get(), 0 );
    }
}
