//! Sample-rate and channel-layout conversion
//!
//! Everything handed to the mix bus is already at the device rate and in the
//! device channel layout, so the audio callback only has to sum.

use rubato::{ FastFixedOut, PolynomialDegree, Resampler };
use thiserror::Error;


/// Output frames produced per resampler call.
const CHUNK_FRAMES: usize = 1024;


/// Errors raised while setting up or running the resampler.
#[derive( Debug, Error )]
pub enum ConvertError {
    #[error( "Failed to create resampler: {0}" )]
    Construction( String ),

    #[error( "Resample error: {0}" )]
    Process( String ),
}


/// Converts planar samples back to interleaved format.
/// [[L0, L1, ...], [R0, R1, ...]] → [L0, R0, L1, R1, ...]
fn interleave( channels: &[Vec<f32>] ) -> Vec<f32> {
    if channels.is_empty() || channels[ 0 ].is_empty() {
        return Vec::new();
    }
    let frames = channels[ 0 ].len();
    let mut out = Vec::with_capacity( frames * channels.len() );
    for f in 0..frames {
        for ch in channels {
            out.push( ch[ f ] );
        }
    }
    out
}


/// Drops the resampler's start-up delay and caps output at the length the
/// input actually covers.
struct Trim {
    delay_left: usize,
    frames_out: usize,
}


impl Trim {
    fn apply( &mut self, planar: &[Vec<f32>], limit: Option<usize> ) -> Vec<f32> {
        let frames = planar.first().map_or( 0, Vec::len );
        let skip = self.delay_left.min( frames );
        self.delay_left -= skip;

        let mut end = frames;
        if let Some( limit ) = limit {
            end = end.min( skip + limit.saturating_sub( self.frames_out ) );
        }
        self.frames_out += end - skip;

        let kept: Vec<Vec<f32>> = planar.iter().map( |ch| ch[ skip..end ].to_vec() ).collect();
        interleave( &kept )
    }
}


/// Streaming resampler that accepts interleaved packets of any length.
///
/// Input is buffered per channel until the resampler has a full chunk; the
/// tail is emitted by [`StreamResampler::flush`] at end of stream. When the
/// source and target rates match, samples pass straight through.
pub struct StreamResampler {
    inner: Option<FastFixedOut<f32>>,
    pending: Vec<Vec<f32>>,
    channels: usize,
    ratio: f64,
    frames_in: usize,
    trim: Trim,
}


impl StreamResampler {
    /// Creates a resampler from `source_rate` to `target_rate` for interleaved
    /// audio with `channels` channels.
    pub fn new( source_rate: u32, target_rate: u32, channels: usize ) -> Result<Self, ConvertError> {
        let ratio = target_rate as f64 / source_rate as f64;

        let inner = if source_rate != target_rate {
            tracing::debug!( "Resampling: {} Hz → {} Hz", source_rate, target_rate );

            let resampler = FastFixedOut::<f32>::new(
                ratio,
                2.0,
                PolynomialDegree::Cubic,
                CHUNK_FRAMES,
                channels,
            ).map_err( |e| ConvertError::Construction( e.to_string() ) )?;

            Some( resampler )
        } else {
            None
        };

        let delay = inner.as_ref().map_or( 0, |r| r.output_delay() );

        Ok( Self {
            inner,
            pending: ( 0..channels ).map( |_| Vec::new() ).collect(),
            channels,
            ratio,
            frames_in: 0,
            trim: Trim { delay_left: delay, frames_out: 0 },
        })
    }


    /// Returns true if samples are passed through unchanged.
    #[cfg( test )]
    fn is_passthrough( &self ) -> bool {
        self.inner.is_none()
    }


    /// Feeds one interleaved packet and returns whatever output is ready.
    pub fn process( &mut self, samples: Vec<f32> ) -> Result<Vec<f32>, ConvertError> {
        let Some( ref mut resampler ) = self.inner else {
            return Ok( samples );
        };

        self.frames_in += samples.len() / self.channels;
        for frame in samples.chunks( self.channels ) {
            for ( ch_idx, sample ) in frame.iter().enumerate() {
                self.pending[ ch_idx ].push( *sample );
            }
        }

        let mut output = Vec::new();
        while self.pending[ 0 ].len() >= resampler.input_frames_next() {
            let needed = resampler.input_frames_next();
            let chunk: Vec<Vec<f32>> = self.pending
                .iter_mut()
                .map( |ch| ch.drain( ..needed ).collect() )
                .collect();

            let resampled = resampler
                .process( &chunk, None )
                .map_err( |e| ConvertError::Process( e.to_string() ) )?;
            output.extend( self.trim.apply( &resampled, None ) );
        }

        Ok( output )
    }


    /// Drains the buffered tail at end of stream.
    ///
    /// Total output is exactly `ceil(input frames * ratio)` frames.
    pub fn flush( &mut self ) -> Result<Vec<f32>, ConvertError> {
        let Some( ref mut resampler ) = self.inner else {
            return Ok( Vec::new() );
        };

        let expected = ( self.frames_in as f64 * self.ratio ).ceil() as usize;
        let mut output = Vec::new();

        if !self.pending[ 0 ].is_empty() {
            let resampled = resampler
                .process_partial( Some( self.pending.as_slice() ), None )
                .map_err( |e| ConvertError::Process( e.to_string() ) )?;
            output.extend( self.trim.apply( &resampled, Some( expected ) ) );
            for ch in self.pending.iter_mut() {
                ch.clear();
            }
        }

        // Push silence through until the delayed tail has come out
        let silence: Option<&[Vec<f32>]> = None;
        while self.trim.frames_out < expected {
            let resampled = resampler
                .process_partial( silence, None )
                .map_err( |e| ConvertError::Process( e.to_string() ) )?;
            if resampled.first().map_or( true, Vec::is_empty ) {
                break;
            }
            output.extend( self.trim.apply( &resampled, Some( expected ) ) );
        }

        Ok( output )
    }
}


/// Converts interleaved samples from `src_ch` to `out_ch` channels.
///
/// Mono is duplicated to stereo, stereo is averaged down to mono, and any
/// other layout copies matching channels and repeats the last source channel.
pub fn remix( samples: &[f32], src_ch: usize, out_ch: usize ) -> Vec<f32> {
    if src_ch == out_ch || src_ch == 0 || out_ch == 0 {
        return samples.to_vec();
    }

    let frames = samples.len() / src_ch;
    let mut output = Vec::with_capacity( frames * out_ch );

    if src_ch == 1 && out_ch == 2 {
        for &sample in samples {
            output.push( sample );
            output.push( sample );
        }
    } else if src_ch == 2 && out_ch == 1 {
        for frame in samples.chunks_exact( 2 ) {
            output.push( ( frame[ 0 ] + frame[ 1 ] ) * 0.5 );
        }
    } else {
        for frame in samples.chunks_exact( src_ch ) {
            for ch in 0..out_ch {
                output.push( frame[ ch.min( src_ch - 1 ) ] );
            }
        }
    }

    output
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_remix_mono_to_stereo() {
        assert_eq!( remix( &[ 0.1, 0.2 ], 1, 2 ), vec![ 0.1, 0.1, 0.2, 0.2 ] );
    }


    #[test]
    fn test_remix_stereo_to_mono() {
        let out = remix( &[ 0.2, 0.4, -1.0, 1.0 ], 2, 1 );
        assert_eq!( out.len(), 2 );
        assert!( ( out[ 0 ] - 0.3 ).abs() < 1e-6 );
        assert_eq!( out[ 1 ], 0.0 );
    }


    #[test]
    fn test_remix_surround_repeats_last_channel() {
        let out = remix( &[ 1.0, 2.0 ], 2, 4 );
        assert_eq!( out, vec![ 1.0, 2.0, 2.0, 2.0 ] );
    }


    #[test]
    fn test_passthrough_when_rates_match() {
        let mut resampler = StreamResampler::new( 48000, 48000, 2 ).unwrap();
        assert!( resampler.is_passthrough() );
        assert_eq!( resampler.process( vec![ 0.5; 8 ] ).unwrap(), vec![ 0.5; 8 ] );
        assert!( resampler.flush().unwrap().is_empty() );
    }


    #[test]
    fn test_resample_doubles_frame_count() {
        let mut resampler = StreamResampler::new( 22050, 44100, 1 ).unwrap();
        assert!( !resampler.is_passthrough() );

        let mut total = 0;
        for _ in 0..10 {
            total += resampler.process( vec![ 0.0; 2205 ] ).unwrap().len();
        }
        total += resampler.flush().unwrap().len();

        assert_eq!( total, 44100 );
    }


    #[test]
    fn test_short_clip_is_not_padded_to_a_chunk() {
        let mut resampler = StreamResampler::new( 22050, 44100, 2 ).unwrap();

        let mut out = resampler.process( vec![ 0.25; 10 * 2 ] ).unwrap();
        out.extend( resampler.flush().unwrap() );

        assert_eq!( out.len(), 20 * 2 );
    }


    #[test]
    fn test_downsample_rounds_up_partial_frame() {
        let mut resampler = StreamResampler::new( 48000, 44100, 1 ).unwrap();

        let mut total = resampler.process( vec![ 0.0; 1001 ] ).unwrap().len();
        total += resampler.flush().unwrap().len();

        // ceil(1001 * 44100 / 48000) = ceil(919.67)
        assert_eq!( total, 920 );
    }
}
