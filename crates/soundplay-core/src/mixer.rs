//! The mixer
//!
//! [`MixBus`] is the state shared with the audio callback: a fixed set of
//! one-shot voice slots plus one music slot. [`Mixer`] owns the bus together
//! with the output stream and the current music track.

use std::path::Path;
use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::{ Arc, Mutex, MutexGuard, PoisonError };

use thiserror::Error;

use crate::config::MixerConfig;
use crate::decoder::Decoder;
use crate::music::{ MusicStream, StreamBuffer };
use crate::output::{ AudioOutput, OutputError, OutputSpec };
use crate::sound::{ LoadError, Sound };


/// Errors that can occur in the mixer.
#[derive( Debug, Error )]
pub enum MixerError {
    #[error( transparent )]
    Output( #[from] OutputError ),

    #[error( transparent )]
    Load( #[from] LoadError ),

    #[error( "Failed to start decode thread: {0}" )]
    Thread( std::io::Error ),
}


/// Locks a mutex, recovering the data if another thread panicked holding it.
pub( crate ) fn lock<T>( mutex: &Mutex<T> ) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else( PoisonError::into_inner )
}


/// Handle to something playing on the mixer.
///
/// Cloning is cheap; every clone observes the same playback.
#[derive( Debug, Clone )]
pub struct Channel {
    busy: Arc<AtomicBool>,
}


impl Channel {
    pub( crate ) fn new( busy: Arc<AtomicBool> ) -> Self {
        Self { busy }
    }


    /// Returns true while audio is still coming out of this channel.
    pub fn is_busy( &self ) -> bool {
        self.busy.load( Ordering::Acquire )
    }
}


/// A sound occupying one voice slot.
struct Voice {
    samples: Arc<[f32]>,
    cursor: usize,
    busy: Arc<AtomicBool>,
}


/// Mixing state shared between the control thread and the audio callback.
pub struct MixBus {
    voices: Mutex<Vec<Option<Voice>>>,
    music: Mutex<Option<Arc<StreamBuffer>>>,
}


impl MixBus {
    /// Creates a bus with `sound_channels` voice slots.
    pub fn new( sound_channels: usize ) -> Self {
        Self {
            voices: Mutex::new( ( 0..sound_channels ).map( |_| None ).collect() ),
            music: Mutex::new( None ),
        }
    }


    /// Starts `sound` on the first free voice slot.
    ///
    /// Returns None when every slot is busy.
    pub fn play( &self, sound: &Sound ) -> Option<Channel> {
        let mut voices = lock( &self.voices );
        let ( index, slot ) = voices
            .iter_mut()
            .enumerate()
            .find( |( _, slot )| slot.is_none() )?;

        let busy = Arc::new( AtomicBool::new( true ) );
        *slot = Some( Voice {
            samples: Arc::clone( sound.samples() ),
            cursor: 0,
            busy: Arc::clone( &busy ),
        });

        tracing::debug!( "Sound started on channel {}", index );
        Some( Channel::new( busy ) )
    }


    /// Replaces the music source. `None` silences the music slot.
    pub fn set_music( &self, stream: Option<Arc<StreamBuffer>> ) {
        *lock( &self.music ) = stream;
    }


    /// Returns the number of voice slots currently playing.
    pub fn active_voices( &self ) -> usize {
        lock( &self.voices ).iter().filter( |v| v.is_some() ).count()
    }


    /// Fills `output` with the sum of every active source.
    pub fn render( &self, output: &mut [f32] ) {
        output.fill( 0.0 );

        {
            let mut voices = lock( &self.voices );
            for slot in voices.iter_mut() {
                let Some( voice ) = slot else { continue };

                let remaining = &voice.samples[ voice.cursor.. ];
                let count = remaining.len().min( output.len() );
                for ( out, sample ) in output.iter_mut().zip( &remaining[ ..count ] ) {
                    *out += sample;
                }
                voice.cursor += count;

                if voice.cursor >= voice.samples.len() {
                    voice.busy.store( false, Ordering::Release );
                    *slot = None;
                }
            }
        }

        if let Some( ref music ) = *lock( &self.music ) {
            music.mix_into( output );
        }

        for sample in output.iter_mut() {
            *sample = sample.clamp( -1.0, 1.0 );
        }
    }


    /// Silences every voice and the music slot.
    pub fn clear( &self ) {
        for slot in lock( &self.voices ).iter_mut() {
            if let Some( voice ) = slot.take() {
                voice.busy.store( false, Ordering::Release );
            }
        }
        self.set_music( None );
    }
}


/// An open mixer: output device, mix bus and the current music track.
pub struct Mixer {
    bus: Arc<MixBus>,
    output: AudioOutput,
    music: Option<MusicStream>,
    closed: bool,
}


impl Mixer {
    /// Opens the default output device and starts mixing.
    pub fn init( config: &MixerConfig ) -> Result<Self, MixerError> {
        let bus = Arc::new( MixBus::new( config.sound_channels ) );
        let bus_clone = Arc::clone( &bus );

        let output = AudioOutput::open( config, move |data| bus_clone.render( data ) )?;

        tracing::info!( "Mixer ready with {} sound channels", config.sound_channels );

        Ok( Self {
            bus,
            output,
            music: None,
            closed: false,
        })
    }


    /// Gets the output format every source is converted to.
    pub fn spec( &self ) -> OutputSpec {
        self.output.spec()
    }


    /// Decodes a file into a [`Sound`] ready for [`Mixer::play`].
    pub fn load_sound( &self, path: &Path ) -> Result<Sound, MixerError> {
        Ok( Sound::load( path, self.spec() )? )
    }


    /// Starts `sound` on a free channel. Returns None if all channels are busy.
    pub fn play( &self, sound: &Sound ) -> Option<Channel> {
        self.bus.play( sound )
    }


    /// Opens `path` as a streamed track and starts it on the music channel,
    /// replacing any track already playing.
    pub fn play_music( &mut self, path: &Path ) -> Result<Channel, MixerError> {
        let decoder = Decoder::open( path ).map_err( LoadError::from )?;
        self.stop_music();

        let stream = MusicStream::start( decoder, self.spec() )?;
        self.bus.set_music( Some( stream.buffer() ) );
        let channel = stream.channel();
        self.music = Some( stream );

        tracing::info!( "Music started: {:?}", path );
        Ok( channel )
    }


    /// Stops the current music track, if any.
    pub fn stop_music( &mut self ) {
        self.bus.set_music( None );
        if let Some( mut stream ) = self.music.take() {
            stream.stop();
        }
    }


    /// Shuts the mixer down and releases the device.
    pub fn quit( mut self ) -> Result<(), MixerError> {
        self.shutdown()
    }


    fn shutdown( &mut self ) -> Result<(), MixerError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        self.stop_music();
        let cut = self.bus.active_voices();
        if cut > 0 {
            tracing::debug!( "Stopping {} active sounds", cut );
        }
        self.bus.clear();
        self.output.pause()?;

        tracing::info!( "Mixer closed" );
        Ok(())
    }
}


impl Drop for Mixer {
    fn drop( &mut self ) {
        if let Err( e ) = self.shutdown() {
            tracing::debug!( "Ignoring mixer shutdown error: {}", e );
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    const MONO: OutputSpec = OutputSpec { sample_rate: 8000, channels: 1 };


    #[test]
    fn test_play_uses_free_slots_until_full() {
        let bus = MixBus::new( 2 );
        let sound = Sound::from_samples( vec![ 0.1; 16 ], MONO );

        assert!( bus.play( &sound ).is_some() );
        assert!( bus.play( &sound ).is_some() );
        assert!( bus.play( &sound ).is_none() );
        assert_eq!( bus.active_voices(), 2 );
    }


    #[test]
    fn test_render_retires_finished_voices() {
        let bus = MixBus::new( 1 );
        let sound = Sound::from_samples( vec![ 0.5; 6 ], MONO );
        let channel = bus.play( &sound ).unwrap();

        let mut out = [ 0.0; 4 ];
        bus.render( &mut out );
        assert_eq!( out, [ 0.5; 4 ] );
        assert!( channel.is_busy() );

        bus.render( &mut out );
        assert_eq!( out, [ 0.5, 0.5, 0.0, 0.0 ] );
        assert!( !channel.is_busy() );
        assert_eq!( bus.active_voices(), 0 );

        // The freed slot is available again
        assert!( bus.play( &sound ).is_some() );
    }


    #[test]
    fn test_render_sums_and_clamps() {
        let bus = MixBus::new( 2 );
        bus.play( &Sound::from_samples( vec![ 0.75; 4 ], MONO ) ).unwrap();
        bus.play( &Sound::from_samples( vec![ 0.5, -0.25, 0.0, 0.0 ], MONO ) ).unwrap();

        let music = Arc::new( StreamBuffer::new( 8 ) );
        music.push( &[ 0.0, 0.0, -0.5 ] );
        bus.set_music( Some( Arc::clone( &music ) ) );

        let mut out = [ 0.0; 4 ];
        bus.render( &mut out );
        assert_eq!( out, [ 1.0, 0.5, 0.25, 0.75 ] );
        assert!( music.is_empty() );
    }


    #[test]
    fn test_clear_releases_every_channel() {
        let bus = MixBus::new( 2 );
        let channel = bus.play( &Sound::from_samples( vec![ 0.1; 64 ], MONO ) ).unwrap();
        bus.set_music( Some( Arc::new( StreamBuffer::new( 4 ) ) ) );

        bus.clear();
        assert!( !channel.is_busy() );
        assert_eq!( bus.active_voices(), 0 );
    }
}
