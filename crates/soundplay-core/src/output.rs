//! Audio output via cpal
//!
//! Opens the system output device and drives a render callback from the
//! device's audio thread.

use cpal::traits::{ DeviceTrait, HostTrait, StreamTrait };
use thiserror::Error;

use crate::config::MixerConfig;


/// Errors that can occur with audio output.
#[derive( Debug, Error )]
pub enum OutputError {
    #[error( "No output device available" )]
    NoDevice,

    #[error( "Failed to get stream config: {0}" )]
    StreamConfig( String ),

    #[error( "Failed to build output stream: {0}" )]
    BuildStream( String ),

    #[error( "Failed to play stream: {0}" )]
    PlayStream( String ),
}


/// Sample rate and channel layout negotiated with the device.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub struct OutputSpec {
    pub sample_rate: u32,
    pub channels: u16,
}


/// Audio output handler.
/// Note: This struct is NOT Send/Sync due to cpal::Stream.
/// Keep it on the thread where it was created.
pub struct AudioOutput {
    stream: cpal::Stream,
    spec: OutputSpec,
}


impl AudioOutput {
    /// Opens the default output device and starts pulling samples from `render`.
    ///
    /// `render` receives an interleaved buffer in the negotiated [`OutputSpec`]
    /// and must fill all of it.
    pub fn open<F>( requested: &MixerConfig, mut render: F ) -> Result<Self, OutputError>
    where
        F: FnMut( &mut [f32] ) + Send + 'static,
    {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or( OutputError::NoDevice )?;

        tracing::info!( "Using output device: {:?}", device.name() );

        let config = Self::negotiate( &device, requested )?;
        let spec = OutputSpec {
            sample_rate: config.sample_rate.0,
            channels: config.channels,
        };

        tracing::info!(
            "Audio output config: {} Hz, {} channels",
            spec.sample_rate,
            spec.channels
        );

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    render( data );
                },
                |err| {
                    tracing::error!( "Audio output error: {}", err );
                },
                None,
            )
            .map_err( |e| OutputError::BuildStream( e.to_string() ) )?;

        stream
            .play()
            .map_err( |e| OutputError::PlayStream( e.to_string() ) )?;

        Ok( Self { stream, spec } )
    }


    /// Picks a stream config for the requested rate and channel count.
    ///
    /// Priority: 1) exact match, 2) same sample rate any channels, 3) device default.
    fn negotiate( device: &cpal::Device, requested: &MixerConfig ) -> Result<cpal::StreamConfig, OutputError> {
        let rate = requested.frequency;
        let supported_configs: Vec<_> = device
            .supported_output_configs()
            .map_err( |e| OutputError::StreamConfig( e.to_string() ) )?
            .filter( |c| c.sample_format() == cpal::SampleFormat::F32 )
            .collect();

        let supports_rate = |c: &&cpal::SupportedStreamConfigRange| {
            c.min_sample_rate().0 <= rate && c.max_sample_rate().0 >= rate
        };

        if let Some( supported ) = supported_configs
            .iter()
            .filter( supports_rate )
            .find( |c| c.channels() == requested.channels )
        {
            return Ok( supported.clone().with_sample_rate( cpal::SampleRate( rate ) ).config() );
        }

        if let Some( supported ) = supported_configs.iter().find( supports_rate ) {
            tracing::info!(
                "Device does not offer {} channels, using {}",
                requested.channels,
                supported.channels()
            );
            return Ok( supported.clone().with_sample_rate( cpal::SampleRate( rate ) ).config() );
        }

        let default_config = device
            .default_output_config()
            .map_err( |e| OutputError::StreamConfig( e.to_string() ) )?;
        tracing::warn!(
            "Device does not support {} Hz, falling back to {} Hz",
            rate,
            default_config.sample_rate().0
        );
        Ok( default_config.config() )
    }


    /// Gets the negotiated output format.
    pub fn spec( &self ) -> OutputSpec {
        self.spec
    }


    /// Stops pulling samples from the render callback.
    pub fn pause( &self ) -> Result<(), OutputError> {
        self.stream
            .pause()
            .map_err( |e| OutputError::PlayStream( e.to_string() ) )
    }
}
