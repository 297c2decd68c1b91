//! Common test utilities for the conversion pipeline
#![allow(dead_code)]

use async_trait::async_trait;
use harmony_convert::engine::{EngineError, EngineLoader, TranscodeCommand, TranscodeEngine};
use harmony_convert::SourceAsset;
use hound::{WavSpec, WavWriter};
use std::collections::{BTreeMap, HashSet};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

static INIT: Once = Once::new();

/// Route pipeline logs to the test writer, once per test binary
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

/// Bytes the fake engine writes as "output"
pub const FAKE_OUTPUT: &[u8] = b"RIFF fake wav";

/// In-memory engine that records commands and fails on request
#[derive(Default)]
pub struct FakeEngine {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    commands: Mutex<Vec<TranscodeCommand>>,
    fail_inputs: HashSet<String>,
    fail_writes: bool,
    skip_output: bool,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// `run` fails for these staged input names
    pub fn failing_on(names: &[&str]) -> Self {
        Self {
            fail_inputs: names.iter().map(|n| n.to_string()).collect(),
            ..Self::default()
        }
    }

    /// `write_file` always fails
    pub fn rejecting_writes() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    /// `run` reports success without producing output
    pub fn without_output() -> Self {
        Self {
            skip_output: true,
            ..Self::default()
        }
    }

    pub fn commands(&self) -> Vec<TranscodeCommand> {
        self.commands.lock().unwrap().clone()
    }

    pub fn file_names(&self) -> Vec<String> {
        self.files.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl TranscodeEngine for FakeEngine {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn write_file(&self, name: &str, data: &[u8]) -> Result<(), EngineError> {
        if self.fail_writes {
            return Err(EngineError::failed("disk full"));
        }
        self.files
            .lock()
            .unwrap()
            .insert(name.to_string(), data.to_vec());
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>, EngineError> {
        self.files
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(name.to_string()))
    }

    async fn unlink(&self, name: &str) -> Result<(), EngineError> {
        self.files
            .lock()
            .unwrap()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| EngineError::NotFound(name.to_string()))
    }

    async fn list_files(&self) -> Result<Vec<String>, EngineError> {
        Ok(self.file_names())
    }

    async fn run(&self, command: &TranscodeCommand) -> Result<(), EngineError> {
        self.commands.lock().unwrap().push(command.clone());

        if self.fail_inputs.contains(&command.input) {
            return Err(EngineError::failed(format!(
                "{}: Invalid data found when processing input",
                command.input
            )));
        }
        if !self.skip_output {
            self.files
                .lock()
                .unwrap()
                .insert(command.output.clone(), FAKE_OUTPUT.to_vec());
        }
        Ok(())
    }
}

/// Hands out one shared engine and counts loads
pub struct SharedLoader {
    engine: Arc<FakeEngine>,
    pub loads: Arc<AtomicUsize>,
    delay: Duration,
}

impl SharedLoader {
    pub fn new(engine: Arc<FakeEngine>) -> Self {
        Self {
            engine,
            loads: Arc::new(AtomicUsize::new(0)),
            delay: Duration::ZERO,
        }
    }

    /// Make each load take `delay`
    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl EngineLoader for SharedLoader {
    async fn load(&self) -> Result<Arc<dyn TranscodeEngine>, EngineError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.engine.clone())
    }
}

/// Loader that never succeeds
pub struct BrokenLoader;

#[async_trait]
impl EngineLoader for BrokenLoader {
    async fn load(&self) -> Result<Arc<dyn TranscodeEngine>, EngineError> {
        Err(EngineError::Unavailable("backend missing".to_string()))
    }
}

/// 16-bit WAV with a sine tone on every channel
pub fn sine_wav(sample_rate: u32, channels: u16, seconds: f32, frequency: f32, amplitude: f32) -> Vec<u8> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
        let frames = (sample_rate as f32 * seconds) as usize;
        for i in 0..frames {
            let t = i as f32 / sample_rate as f32;
            let sample = (t * frequency * 2.0 * std::f32::consts::PI).sin();
            let value = (i16::MAX as f32 * amplitude * sample) as i16;
            for _ in 0..channels {
                writer.write_sample(value).unwrap();
            }
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// A stereo 44.1 kHz test tone as a source asset
pub fn tone_asset(name: &str, seconds: f32) -> SourceAsset {
    SourceAsset::new(name, sine_wav(44100, 2, seconds, 440.0, 0.5))
}

/// Duration of a WAV payload in seconds, plus its spec
pub fn wav_info(data: &[u8]) -> (hound::WavSpec, f64) {
    let reader = hound::WavReader::new(Cursor::new(data)).unwrap();
    let spec = reader.spec();
    let seconds = reader.duration() as f64 / spec.sample_rate as f64;
    (spec, seconds)
}
