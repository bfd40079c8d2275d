//! Audio decoding via Symphonia
//!
//! Turns any container/codec Symphonia understands into interleaved f32 PCM.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{ Decoder as SymphoniaDecoder, DecoderOptions, CODEC_TYPE_NULL };
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{ FormatOptions, FormatReader };
use symphonia::core::io::{ MediaSourceStream, MediaSourceStreamOptions };
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;


/// Errors that can occur during decoding.
#[derive( Debug, Error )]
pub enum DecoderError {
    #[error( "Failed to open file: {0}" )]
    FileOpen( #[from] std::io::Error ),

    #[error( "Unsupported format" )]
    UnsupportedFormat,

    #[error( "No audio tracks found" )]
    NoAudioTrack,

    #[error( "Decoder creation failed: {0}" )]
    DecoderCreation( String ),

    #[error( "Decode error: {0}" )]
    Decode( String ),
}


/// Audio decoder wrapper around Symphonia.
pub struct Decoder {
    format_reader: Box<dyn FormatReader>,
    decoder: Box<dyn SymphoniaDecoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
    sample_buf: Option<SampleBuffer<f32>>,
    duration: Option<f64>,
}


impl Decoder {
    /// Opens an audio file for decoding.
    pub fn open( path: &Path ) -> Result<Self, DecoderError> {
        let file = File::open( path )?;
        let mss = MediaSourceStream::new( Box::new( file ), MediaSourceStreamOptions::default() );

        let mut hint = Hint::new();
        if let Some( ext ) = path.extension().and_then( |e| e.to_str() ) {
            hint.with_extension( ext );
        }

        let probed = symphonia::default::get_probe()
            .format( &hint, mss, &FormatOptions::default(), &MetadataOptions::default() )
            .map_err( |_| DecoderError::UnsupportedFormat )?;
        let format_reader = probed.format;

        let track = format_reader
            .tracks()
            .iter()
            .find( |t| t.codec_params.codec != CODEC_TYPE_NULL )
            .ok_or( DecoderError::NoAudioTrack )?;

        let track_id = track.id;
        let codec_params = &track.codec_params;

        let sample_rate = codec_params.sample_rate.unwrap_or( 44100 );
        let channels = codec_params.channels.map( |c| c.count() ).unwrap_or( 2 );
        let duration = codec_params.n_frames.map( |frames| frames as f64 / sample_rate as f64 );

        let decoder = symphonia::default::get_codecs()
            .make( codec_params, &DecoderOptions::default() )
            .map_err( |e| DecoderError::DecoderCreation( e.to_string() ) )?;

        tracing::debug!(
            "Opened {:?}: {} Hz, {} channels, duration: {:?}s",
            path,
            sample_rate,
            channels,
            duration
        );

        Ok( Self {
            format_reader,
            decoder,
            track_id,
            sample_rate,
            channels,
            sample_buf: None,
            duration,
        })
    }


    /// Returns the sample rate of the audio.
    pub fn sample_rate( &self ) -> u32 {
        self.sample_rate
    }


    /// Returns the number of channels.
    pub fn channels( &self ) -> usize {
        self.channels
    }


    /// Returns the duration in seconds, if the container reports one.
    pub fn duration( &self ) -> Option<f64> {
        self.duration
    }


    /// Decodes the next packet and returns interleaved f32 samples.
    ///
    /// Returns None when EOF is reached. Corrupt packets are skipped.
    pub fn decode_next( &mut self ) -> Result<Option<Vec<f32>>, DecoderError> {
        loop {
            let packet = match self.format_reader.next_packet() {
                Ok( packet ) => packet,
                Err( SymphoniaError::IoError( ref e ) )
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok( None );
                }
                Err( e ) => return Err( DecoderError::Decode( e.to_string() ) ),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode( &packet ) {
                Ok( decoded ) => decoded,
                Err( SymphoniaError::DecodeError( e ) ) => {
                    tracing::debug!( "Skipping corrupt packet: {}", e );
                    continue;
                }
                Err( e ) => return Err( DecoderError::Decode( e.to_string() ) ),
            };

            let spec = *decoded.spec();
            let num_frames = decoded.capacity();
            let needed = num_frames * spec.channels.count();

            // Reuse the scratch buffer unless this packet is larger
            let mut sample_buf = match self.sample_buf.take() {
                Some( buf ) if buf.capacity() >= needed => buf,
                _ => SampleBuffer::new( num_frames as u64, spec ),
            };
            sample_buf.copy_interleaved_ref( decoded );
            let samples = sample_buf.samples().to_vec();
            self.sample_buf = Some( sample_buf );

            return Ok( Some( samples ) );
        }
    }


    /// Decodes every remaining packet into one interleaved buffer.
    pub fn decode_to_end( &mut self ) -> Result<Vec<f32>, DecoderError> {
        let capacity = self.duration
            .map( |secs| ( secs * self.sample_rate as f64 ) as usize * self.channels )
            .unwrap_or( 0 );
        let mut samples = Vec::with_capacity( capacity );

        while let Some( packet ) = self.decode_next()? {
            samples.extend_from_slice( &packet );
        }

        Ok( samples )
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use crate::testutil::write_wav;


    #[test]
    fn test_open_reports_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "tone.wav" );
        write_wav( &path, 22050, 1, &vec![ 0.25; 2205 ] );

        let decoder = Decoder::open( &path ).unwrap();
        assert_eq!( decoder.sample_rate(), 22050 );
        assert_eq!( decoder.channels(), 1 );
    }


    #[test]
    fn test_decode_to_end_reads_all_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "stereo.wav" );
        write_wav( &path, 44100, 2, &vec![ 0.5; 4410 * 2 ] );

        let mut decoder = Decoder::open( &path ).unwrap();
        let samples = decoder.decode_to_end().unwrap();
        assert_eq!( samples.len(), 4410 * 2 );
        assert!( samples.iter().all( |s| ( s - 0.5 ).abs() < 0.001 ) );
    }


    #[test]
    fn test_open_missing_file() {
        let result = Decoder::open( Path::new( "/definitely/not/here.wav" ) );
        assert!( matches!( result, Err( DecoderError::FileOpen( _ ) ) ) );
    }


    #[test]
    fn test_open_garbage_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "noise.wav" );
        std::fs::write( &path, b"this is not audio at all" ).unwrap();

        let result = Decoder::open( &path );
        assert!( matches!( result, Err( DecoderError::UnsupportedFormat ) ) );
    }
}
