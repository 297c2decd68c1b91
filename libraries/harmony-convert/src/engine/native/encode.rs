/// 16-bit PCM WAV encoding with hound
use crate::engine::{EngineError, SampleFormat, OUTPUT_CHANNELS};
use hound::{WavSpec, WavWriter};
use std::io::Cursor;

/// Encode interleaved stereo f32 into a complete WAV file
pub fn encode_wav(
    samples: &[f32],
    sample_rate: u32,
    format: SampleFormat,
) -> Result<Vec<u8>, EngineError> {
    let spec = WavSpec {
        channels: OUTPUT_CHANNELS,
        sample_rate,
        bits_per_sample: format.bits_per_sample(),
        sample_format: hound::SampleFormat::Int,
    };

    let to_engine_err = |e: hound::Error| EngineError::failed(format!("WAV encoding failed: {}", e));

    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = WavWriter::new(&mut cursor, spec).map_err(to_engine_err)?;
        match format {
            SampleFormat::S16 => {
                for &sample in samples {
                    writer
                        .write_sample(to_i16(sample))
                        .map_err(to_engine_err)?;
                }
            }
        }
        writer.finalize().map_err(to_engine_err)?;
    }

    Ok(cursor.into_inner())
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)).round() as i16
}
