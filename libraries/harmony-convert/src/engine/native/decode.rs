/// Decoding with Symphonia into interleaved stereo f32
use crate::engine::EngineError;
use bytes::Bytes;
use std::io::{Cursor, ErrorKind};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::warn;

/// -3 dB, used when folding center and surround channels into stereo
const FOLD_GAIN: f32 = std::f32::consts::FRAC_1_SQRT_2;

/// Decoded audio, always stereo
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Interleaved L/R samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// Channel count of the source before downmixing
    pub source_channels: usize,
}

impl DecodedAudio {
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / f64::from(self.sample_rate)
    }
}

/// Probe and fully decode an in-memory file
///
/// Mono is duplicated to both sides. For more than two channels the front
/// pair is kept and center/surrounds are folded in at -3 dB (5.1 ordering:
/// FL FR FC LFE SL SR), with the LFE dropped.
pub fn decode_stereo(data: Bytes, extension: Option<&str>) -> Result<DecodedAudio, EngineError> {
    let mss = MediaSourceStream::new(
        Box::new(Cursor::new(data)),
        MediaSourceStreamOptions::default(),
    );

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| EngineError::failed(format!("unrecognized input format: {}", e)))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| EngineError::failed("no audio track found"))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| EngineError::failed(format!("unsupported codec: {}", e)))?;

    let mut sample_rate = codec_params.sample_rate;
    let mut source_channels = codec_params.channels.map(|c| c.count()).unwrap_or(0);
    let mut samples = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(EngineError::failed(format!("demux error: {}", e))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("Skipping corrupt packet: {}", e);
                continue;
            }
            Err(e) => return Err(EngineError::failed(format!("decode error: {}", e))),
        };

        let spec = *decoded.spec();
        sample_rate.get_or_insert(spec.rate);
        source_channels = spec.channels.count();

        let needs_new_buffer = sample_buf
            .as_ref()
            .map_or(true, |buf| buf.capacity() < decoded.capacity() * source_channels);
        if needs_new_buffer {
            sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
        }

        if let Some(buf) = sample_buf.as_mut() {
            buf.copy_interleaved_ref(decoded);
            push_stereo(&mut samples, buf.samples(), source_channels);
        }
    }

    let sample_rate = sample_rate
        .filter(|rate| *rate > 0)
        .ok_or_else(|| EngineError::failed("input has no sample rate"))?;

    if source_channels == 0 {
        return Err(EngineError::failed("input has no audio channels"));
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
        source_channels,
    })
}

/// Append interleaved frames of `channels` channels as stereo
fn push_stereo(out: &mut Vec<f32>, interleaved: &[f32], channels: usize) {
    match channels {
        0 => {}
        1 => {
            out.reserve(interleaved.len() * 2);
            for &s in interleaved {
                out.push(s);
                out.push(s);
            }
        }
        2 => out.extend_from_slice(interleaved),
        _ => {
            out.reserve(interleaved.len() / channels * 2);
            for frame in interleaved.chunks_exact(channels) {
                let mut left = frame[0];
                let mut right = frame[1];
                if let Some(&center) = frame.get(2) {
                    left += center * FOLD_GAIN;
                    right += center * FOLD_GAIN;
                }
                if let (Some(&sl), Some(&sr)) = (frame.get(4), frame.get(5)) {
                    left += sl * FOLD_GAIN;
                    right += sr * FOLD_GAIN;
                }
                out.push(left.clamp(-1.0, 1.0));
                out.push(right.clamp(-1.0, 1.0));
            }
        }
    }
}
