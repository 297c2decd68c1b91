/// Whole-buffer sample rate conversion with Rubato
use crate::engine::EngineError;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

const CHUNK_FRAMES: usize = 1024;
const CHANNELS: usize = 2;

/// Upper bound on flush calls after the input is exhausted
const MAX_FLUSHES: usize = 16;

/// Resample interleaved stereo from `from_hz` to `to_hz`
///
/// The filter delay is removed and the output holds exactly
/// `round(frames * to / from)` frames.
pub fn resample_stereo(samples: &[f32], from_hz: u32, to_hz: u32) -> Result<Vec<f32>, EngineError> {
    if from_hz == to_hz || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let ratio = f64::from(to_hz) / f64::from(from_hz);
    let in_frames = samples.len() / CHANNELS;
    let expected_frames = (in_frames as f64 * ratio).round() as usize;

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Cubic,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, CHUNK_FRAMES, CHANNELS)
        .map_err(|e| EngineError::failed(format!("resampler creation failed: {}", e)))?;

    let delay = resampler.output_delay();
    let wanted = delay + expected_frames;
    let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(wanted); CHANNELS];

    let process_err = |e: rubato::ResampleError| EngineError::failed(format!("resampling failed: {}", e));

    let mut position = 0;
    while in_frames - position >= resampler.input_frames_next() {
        let chunk = deinterleave(samples, position, resampler.input_frames_next());
        let out = resampler.process(&chunk, None).map_err(process_err)?;
        append(&mut output, out);
        position += chunk[0].len();
    }

    if position < in_frames {
        let chunk = deinterleave(samples, position, in_frames - position);
        let out = resampler
            .process_partial(Some(&chunk[..]), None)
            .map_err(process_err)?;
        append(&mut output, out);
    }

    let mut flushes = 0;
    while output[0].len() < wanted && flushes < MAX_FLUSHES {
        let out = resampler
            .process_partial(None::<&[Vec<f32>]>, None)
            .map_err(process_err)?;
        append(&mut output, out);
        flushes += 1;
    }

    let available = output[0].len().saturating_sub(delay).min(expected_frames);
    let mut interleaved = Vec::with_capacity(expected_frames * CHANNELS);
    for frame in delay..delay + available {
        interleaved.push(output[0][frame]);
        interleaved.push(output[1][frame]);
    }
    // Pad if the flush came up short so the length stays exact
    interleaved.resize(expected_frames * CHANNELS, 0.0);

    Ok(interleaved)
}

fn deinterleave(samples: &[f32], start_frame: usize, frames: usize) -> Vec<Vec<f32>> {
    let mut channels = vec![Vec::with_capacity(frames); CHANNELS];
    for frame in samples[start_frame * CHANNELS..(start_frame + frames) * CHANNELS].chunks_exact(CHANNELS) {
        for (ch, &s) in frame.iter().enumerate() {
            channels[ch].push(s);
        }
    }
    channels
}

fn append(output: &mut [Vec<f32>], chunk: Vec<Vec<f32>>) {
    for (dst, src) in output.iter_mut().zip(chunk) {
        dst.extend(src);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_rate_is_copy() {
        let samples = vec![0.1, -0.1, 0.2, -0.2];
        assert_eq!(resample_stereo(&samples, 44100, 44100).unwrap(), samples);
    }

    #[test]
    fn test_output_length_matches_ratio() {
        let samples = vec![0.0_f32; 44100 * 2];
        let out = resample_stereo(&samples, 44100, 48000).unwrap();
        assert_eq!(out.len(), 48000 * 2);

        let samples = vec![0.0_f32; 1000 * 2];
        let out = resample_stereo(&samples, 48000, 96000).unwrap();
        assert_eq!(out.len(), 2000 * 2);
    }

    #[test]
    fn test_preserves_sine_amplitude() {
        let from = 44100;
        let samples: Vec<f32> = (0..from)
            .flat_map(|n| {
                let s = 0.5 * (2.0 * std::f32::consts::PI * 440.0 * n as f32 / from as f32).sin();
                [s, s]
            })
            .collect();

        let out = resample_stereo(&samples, from, 48000).unwrap();
        let middle = &out[out.len() / 4..out.len() * 3 / 4];
        let peak = middle.iter().fold(0.0_f32, |m, s| m.max(s.abs()));
        assert!((peak - 0.5).abs() < 0.02, "peak {}", peak);
    }
}
