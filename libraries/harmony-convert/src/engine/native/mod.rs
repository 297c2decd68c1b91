//! Native engine
//!
//! Renders a [`TranscodeCommand`] entirely in-process:
//!
//! ```text
//! ┌────────┐   ┌──────────────┐   ┌────────────┐   ┌──────┐   ┌────────────┐
//! │ decode │ ► │ filter chain │ ► │ resample   │ ► │ trim │ ► │ 16-bit WAV │
//! └────────┘   └──────────────┘   └────────────┘   └──────┘   └────────────┘
//! symphonia     eq/comp/limit/      rubato           clamp      hound
//!               loudnorm (ebur128)
//! ```
//!
//! The scratch namespace is an in-memory map. Rendering is deterministic: the
//! same input and command always produce the same bytes.

mod decode;
mod dsp;
mod encode;
mod resample;

pub use decode::{decode_stereo, DecodedAudio};
pub use dsp::{measure_loudness, LoudnessMeasurement};
pub use encode::encode_wav;

use super::{check_scratch_name, EngineError, EngineLoader, TranscodeCommand, TranscodeEngine};
use crate::filter_graph::parse_filter_chain;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Loads a fresh [`NativeEngine`]
#[derive(Debug, Clone, Default)]
pub struct NativeLoader;

impl NativeLoader {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EngineLoader for NativeLoader {
    async fn load(&self) -> Result<Arc<dyn TranscodeEngine>, EngineError> {
        Ok(Arc::new(NativeEngine::new()))
    }
}

/// In-process transcode engine
#[derive(Debug, Default)]
pub struct NativeEngine {
    files: Mutex<BTreeMap<String, Bytes>>,
}

impl NativeEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TranscodeEngine for NativeEngine {
    fn name(&self) -> &'static str {
        "native"
    }

    async fn write_file(&self, name: &str, data: &[u8]) -> Result<(), EngineError> {
        check_scratch_name(name)?;
        self.files
            .lock()
            .await
            .insert(name.to_string(), Bytes::copy_from_slice(data));
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>, EngineError> {
        self.files
            .lock()
            .await
            .get(name)
            .map(|data| data.to_vec())
            .ok_or_else(|| EngineError::NotFound(name.to_string()))
    }

    async fn unlink(&self, name: &str) -> Result<(), EngineError> {
        self.files
            .lock()
            .await
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| EngineError::NotFound(name.to_string()))
    }

    async fn list_files(&self) -> Result<Vec<String>, EngineError> {
        Ok(self.files.lock().await.keys().cloned().collect())
    }

    async fn run(&self, command: &TranscodeCommand) -> Result<(), EngineError> {
        check_scratch_name(&command.output)?;

        let input = self
            .files
            .lock()
            .await
            .get(&command.input)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(command.input.clone()))?;

        let job = command.clone();
        let rendered = tokio::task::spawn_blocking(move || render(input, &job))
            .await
            .map_err(|e| EngineError::failed(format!("render task failed: {}", e)))??;

        self.files
            .lock()
            .await
            .insert(command.output.clone(), Bytes::from(rendered));
        Ok(())
    }
}

/// Render one command to WAV bytes
pub fn render(input: Bytes, command: &TranscodeCommand) -> Result<Vec<u8>, EngineError> {
    let stages = match &command.filter_chain {
        Some(chain) => parse_filter_chain(chain)
            .map_err(|e| EngineError::failed(format!("invalid filter chain: {}", e)))?,
        None => Vec::new(),
    };

    let extension = Path::new(&command.input)
        .extension()
        .and_then(|e| e.to_str());
    let decoded = decode_stereo(input, extension)?;
    debug!(
        "Decoded {}: {} Hz, {} source channels, {:.2}s",
        command.input,
        decoded.sample_rate,
        decoded.source_channels,
        decoded.duration_seconds()
    );

    let mut samples = decoded.samples;
    dsp::apply_stages(&mut samples, decoded.sample_rate, &stages)?;

    let target_rate = command.sample_rate.hz();
    let samples = resample::resample_stereo(&samples, decoded.sample_rate, target_rate)?;

    let samples = match &command.trim {
        Some(trim) => {
            trim_frames(&samples, target_rate, trim.start_seconds, trim.end_seconds).to_vec()
        }
        None => samples,
    };

    encode_wav(&samples, target_rate, command.sample_format)
}

/// Keep `[start, end)` of interleaved stereo samples, clamping `end` to the duration
fn trim_frames(samples: &[f32], sample_rate: u32, start_seconds: f64, end_seconds: f64) -> &[f32] {
    let total_frames = samples.len() / 2;
    let to_frame = |seconds: f64| (seconds * f64::from(sample_rate)).round() as usize;

    let mut end = to_frame(end_seconds);
    if end > total_frames {
        warn!(
            "Trim end {:.3}s is past the end of the audio ({:.3}s), clamping",
            end_seconds,
            total_frames as f64 / f64::from(sample_rate)
        );
        end = total_frames;
    }
    let start = to_frame(start_seconds).min(end);

    &samples[start * 2..end * 2]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_frames_clamps_end() {
        let samples = vec![0.0_f32; 2 * 100];
        assert_eq!(trim_frames(&samples, 10, 2.0, 5.0).len(), 2 * 30);
        assert_eq!(trim_frames(&samples, 10, 2.0, 50.0).len(), 2 * 80);
        assert!(trim_frames(&samples, 10, 20.0, 30.0).is_empty());
    }

    #[tokio::test]
    async fn test_scratch_namespace() {
        let engine = NativeEngine::new();
        engine.write_file("a.wav", b"abc").await.unwrap();
        engine.write_file("b.wav", b"def").await.unwrap();
        assert_eq!(engine.list_files().await.unwrap(), vec!["a.wav", "b.wav"]);
        assert_eq!(engine.read_file("a.wav").await.unwrap(), b"abc");

        engine.unlink("a.wav").await.unwrap();
        assert!(matches!(
            engine.unlink("a.wav").await,
            Err(EngineError::NotFound(_))
        ));
        assert!(matches!(
            engine.write_file("../escape.wav", b"x").await,
            Err(EngineError::InvalidName(_))
        ));
    }

    #[tokio::test]
    async fn test_run_rejects_garbage_input() {
        let engine = NativeEngine::new();
        engine
            .write_file("noise.mp3", b"definitely not audio")
            .await
            .unwrap();

        let command = TranscodeCommand::new("noise.mp3", "noise_44100.wav", crate::SampleRate::Hz44100);
        assert!(matches!(
            engine.run(&command).await,
            Err(EngineError::Failed(_))
        ));
        assert_eq!(engine.list_files().await.unwrap(), vec!["noise.mp3"]);
    }
}
