//! Streamed music
//!
//! Music is decoded on a background thread into a bounded [`StreamBuffer`]
//! that the mix bus drains, so long tracks never sit fully in memory.

use std::collections::VecDeque;
use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::{ Arc, Mutex };
use std::thread;
use std::time::Duration;

use crate::convert::{ remix, StreamResampler };
use crate::decoder::Decoder;
use crate::mixer::{ lock, Channel, MixerError };
use crate::output::OutputSpec;
use crate::sound::LoadError;


/// Bounded FIFO of interleaved samples shared between the decode thread
/// (producer) and the audio callback (consumer).
pub struct StreamBuffer {
    buffer: Mutex<VecDeque<f32>>,
    capacity: usize,
}


impl StreamBuffer {
    /// Creates a buffer holding at most `capacity` samples.
    pub fn new( capacity: usize ) -> Self {
        Self {
            buffer: Mutex::new( VecDeque::with_capacity( capacity ) ),
            capacity,
        }
    }


    /// Pushes samples to the buffer. Returns number of samples actually pushed.
    pub fn push( &self, samples: &[f32] ) -> usize {
        let mut buf = lock( &self.buffer );
        let available = self.capacity.saturating_sub( buf.len() );
        let to_push = samples.len().min( available );
        buf.extend( samples[ ..to_push ].iter().copied() );
        to_push
    }


    /// Adds buffered samples onto `output`. Returns the number consumed.
    pub fn mix_into( &self, output: &mut [f32] ) -> usize {
        let mut buf = lock( &self.buffer );
        let count = output.len().min( buf.len() );
        for ( out, sample ) in output.iter_mut().zip( buf.drain( ..count ) ) {
            *out += sample;
        }
        count
    }


    /// Returns the number of samples currently in the buffer.
    pub fn len( &self ) -> usize {
        lock( &self.buffer ).len()
    }


    /// Returns true if the buffer is empty.
    pub fn is_empty( &self ) -> bool {
        lock( &self.buffer ).is_empty()
    }


    /// Clears the buffer.
    pub fn clear( &self ) {
        lock( &self.buffer ).clear();
    }
}


/// A music track being decoded in the background.
pub struct MusicStream {
    stop_flag: Arc<AtomicBool>,
    busy: Arc<AtomicBool>,
    buffer: Arc<StreamBuffer>,
    thread: Option<thread::JoinHandle<()>>,
}


impl MusicStream {
    /// Starts decoding `decoder` into a new stream buffer in `spec`'s format.
    ///
    /// The stream reports busy until the last sample has left the buffer.
    pub fn start( decoder: Decoder, spec: OutputSpec ) -> Result<Self, MixerError> {
        let resampler = StreamResampler::new(
            decoder.sample_rate(),
            spec.sample_rate,
            decoder.channels(),
        ).map_err( LoadError::from )?;

        // ~500ms of output audio
        let capacity = spec.sample_rate as usize * spec.channels as usize / 2;
        let buffer = Arc::new( StreamBuffer::new( capacity ) );
        let stop_flag = Arc::new( AtomicBool::new( false ) );
        let busy = Arc::new( AtomicBool::new( true ) );

        let loop_state = DecodeLoop {
            decoder,
            resampler,
            spec,
            buffer: Arc::clone( &buffer ),
            stop_flag: Arc::clone( &stop_flag ),
        };
        let busy_clone = Arc::clone( &busy );

        let thread = thread::Builder::new()
            .name( "music-decode".into() )
            .spawn( move || {
                loop_state.run();
                busy_clone.store( false, Ordering::Release );
            })
            .map_err( MixerError::Thread )?;

        Ok( Self {
            stop_flag,
            busy,
            buffer,
            thread: Some( thread ),
        })
    }


    /// Returns the buffer the mix bus should drain.
    pub fn buffer( &self ) -> Arc<StreamBuffer> {
        Arc::clone( &self.buffer )
    }


    /// Returns a handle reporting whether the track is still playing.
    pub fn channel( &self ) -> Channel {
        Channel::new( Arc::clone( &self.busy ) )
    }


    /// Stops decoding and discards anything not yet played.
    pub fn stop( &mut self ) {
        self.stop_flag.store( true, Ordering::Relaxed );
        self.buffer.clear();

        if let Some( thread ) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!( "Music decode thread panicked" );
            }
        }
        // The decode thread may have pushed once more before it saw the flag
        self.buffer.clear();
        self.busy.store( false, Ordering::Release );
    }
}


impl Drop for MusicStream {
    fn drop( &mut self ) {
        self.stop();
    }
}


/// State owned by the decode thread.
struct DecodeLoop {
    decoder: Decoder,
    resampler: StreamResampler,
    spec: OutputSpec,
    buffer: Arc<StreamBuffer>,
    stop_flag: Arc<AtomicBool>,
}


impl DecodeLoop {
    fn run( mut self ) {
        let source_channels = self.decoder.channels();
        let out_channels = self.spec.channels as usize;
        // Don't decode too far ahead - keep about 100ms buffered
        let target_buffer = self.spec.sample_rate as usize * out_channels / 10;

        loop {
            if self.stopped() {
                tracing::debug!( "Decode loop: stop signal received" );
                break;
            }

            if self.buffer.len() > target_buffer {
                thread::sleep( Duration::from_millis( 5 ) );
                continue;
            }

            match self.decoder.decode_next() {
                Ok( Some( samples ) ) => {
                    match self.resampler.process( samples ) {
                        Ok( resampled ) => {
                            self.push_all( &remix( &resampled, source_channels, out_channels ) );
                        }
                        Err( e ) => {
                            tracing::error!( "{}", e );
                            break;
                        }
                    }
                }
                Ok( None ) => {
                    match self.resampler.flush() {
                        Ok( tail ) => self.push_all( &remix( &tail, source_channels, out_channels ) ),
                        Err( e ) => tracing::error!( "Final {}", e ),
                    }

                    tracing::info!( "Decode loop: reached end of file" );
                    while !self.buffer.is_empty() && !self.stopped() {
                        thread::sleep( Duration::from_millis( 10 ) );
                    }
                    break;
                }
                Err( e ) => {
                    tracing::error!( "Decode error: {}", e );
                    break;
                }
            }
        }

        tracing::debug!( "Decode loop: exiting" );
    }


    fn stopped( &self ) -> bool {
        self.stop_flag.load( Ordering::Relaxed )
    }


    /// Pushes every sample, waiting for the consumer when the buffer is full.
    fn push_all( &self, samples: &[f32] ) {
        let mut offset = 0;
        while offset < samples.len() && !self.stopped() {
            let pushed = self.buffer.push( &samples[ offset.. ] );
            offset += pushed;
            if pushed == 0 {
                thread::sleep( Duration::from_millis( 5 ) );
            }
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use crate::testutil::write_wav;


    #[test]
    fn test_stream_buffer_respects_capacity() {
        let buffer = StreamBuffer::new( 4 );
        assert_eq!( buffer.push( &[ 0.1; 6 ] ), 4 );
        assert_eq!( buffer.push( &[ 0.1 ] ), 0 );
        assert_eq!( buffer.len(), 4 );
    }


    #[test]
    fn test_stream_buffer_mixes_additively() {
        let buffer = StreamBuffer::new( 8 );
        buffer.push( &[ 0.25, 0.5 ] );

        let mut out = [ 0.5, 0.5, 0.5 ];
        assert_eq!( buffer.mix_into( &mut out ), 2 );
        assert_eq!( out, [ 0.75, 1.0, 0.5 ] );
        assert!( buffer.is_empty() );
    }


    #[test]
    fn test_stream_goes_idle_after_buffer_drains() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "song.wav" );
        write_wav( &path, 8000, 1, &vec![ 0.1; 800 ] );

        let spec = OutputSpec { sample_rate: 8000, channels: 1 };
        let stream = MusicStream::start( Decoder::open( &path ).unwrap(), spec ).unwrap();
        let channel = stream.channel();
        let buffer = stream.buffer();

        // Stand in for the audio callback
        let mut drained = 0;
        let mut out = [ 0.0; 64 ];
        for _ in 0..1000 {
            drained += buffer.mix_into( &mut out );
            if !channel.is_busy() {
                break;
            }
            thread::sleep( Duration::from_millis( 1 ) );
        }

        assert!( !channel.is_busy() );
        assert_eq!( drained, 800 );
    }


    #[test]
    fn test_stop_marks_stream_idle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "long.wav" );
        write_wav( &path, 8000, 1, &vec![ 0.1; 80000 ] );

        let spec = OutputSpec { sample_rate: 8000, channels: 1 };
        let mut stream = MusicStream::start( Decoder::open( &path ).unwrap(), spec ).unwrap();
        let channel = stream.channel();
        assert!( channel.is_busy() );

        stream.stop();
        assert!( !channel.is_busy() );
        assert!( stream.buffer().is_empty() );
    }
}
