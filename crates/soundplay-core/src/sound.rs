//! One-shot sounds
//!
//! A [`Sound`] is decoded completely up front and converted to the output
//! format, so any number of channels can play it without further work.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::convert::{ remix, ConvertError, StreamResampler };
use crate::decoder::{ Decoder, DecoderError };
use crate::output::OutputSpec;


/// Errors that can occur while loading a file for playback.
#[derive( Debug, Error )]
pub enum LoadError {
    #[error( transparent )]
    Decoder( #[from] DecoderError ),

    #[error( transparent )]
    Convert( #[from] ConvertError ),
}


/// A fully decoded sound in the output device's format.
#[derive( Debug, Clone )]
pub struct Sound {
    samples: Arc<[f32]>,
    spec: OutputSpec,
}


impl Sound {
    /// Decodes the file at `path` and converts it to `spec`.
    pub fn load( path: &Path, spec: OutputSpec ) -> Result<Self, LoadError> {
        let mut decoder = Decoder::open( path )?;
        let source_channels = decoder.channels();

        let mut resampler = StreamResampler::new(
            decoder.sample_rate(),
            spec.sample_rate,
            source_channels,
        )?;

        let mut samples = resampler.process( decoder.decode_to_end()? )?;
        samples.extend( resampler.flush()? );

        let samples = remix( &samples, source_channels, spec.channels as usize );
        let sound = Self::from_samples( samples, spec );
        tracing::debug!( "Loaded sound {:?}: {:.2?}", path, sound.duration() );

        Ok( sound )
    }


    /// Wraps samples that are already interleaved in `spec`'s layout.
    pub fn from_samples( samples: Vec<f32>, spec: OutputSpec ) -> Self {
        Self {
            samples: samples.into(),
            spec,
        }
    }


    /// Returns the interleaved sample data.
    pub fn samples( &self ) -> &Arc<[f32]> {
        &self.samples
    }


    /// Returns the playback length.
    pub fn duration( &self ) -> Duration {
        let frames = self.samples.len() / self.spec.channels.max( 1 ) as usize;
        Duration::from_secs_f64( frames as f64 / self.spec.sample_rate as f64 )
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use crate::testutil::write_wav;


    const STEREO_44K: OutputSpec = OutputSpec { sample_rate: 44100, channels: 2 };


    #[test]
    fn test_load_converts_mono_to_output_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "blip.wav" );
        write_wav( &path, 44100, 1, &vec![ 0.5; 4410 ] );

        let sound = Sound::load( &path, STEREO_44K ).unwrap();
        assert_eq!( sound.samples().len(), 4410 * 2 );
        assert!( ( sound.duration().as_secs_f64() - 0.1 ).abs() < 1e-6 );
    }


    #[test]
    fn test_load_resamples_to_device_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "low.wav" );
        write_wav( &path, 22050, 2, &vec![ 0.0; 22050 * 2 ] );

        let sound = Sound::load( &path, STEREO_44K ).unwrap();
        assert_eq!( sound.samples().len(), 44100 * 2 );
        assert_eq!( sound.duration(), Duration::from_secs( 1 ) );
    }


    #[test]
    fn test_load_rejects_non_audio() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "readme.txt" );
        std::fs::write( &path, "not a sound" ).unwrap();

        let result = Sound::load( &path, STEREO_44K );
        assert!( matches!( result, Err( LoadError::Decoder( DecoderError::UnsupportedFormat ) ) ) );
    }
}
