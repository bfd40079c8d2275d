//! Fixtures shared by the unit tests.

use std::path::Path;

use hound::{ SampleFormat, WavSpec, WavWriter };


/// Writes a 16-bit PCM WAV file from interleaved f32 samples.
pub fn write_wav( path: &Path, sample_rate: u32, channels: u16, samples: &[f32] ) {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create( path, spec ).unwrap();
    for sample in samples {
        writer.write_sample( ( sample.clamp( -1.0, 1.0 ) * i16::MAX as f32 ) as i16 ).unwrap();
    }
    writer.finalize().unwrap();
}
