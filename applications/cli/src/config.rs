/// Converter configuration
use crate::error::{CliError, Result};
use harmony_convert::{EngineBackend, MasteringPreset, MasteringSettings, SampleRate};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default config file, read from the working directory when present
pub const DEFAULT_CONFIG_FILE: &str = "harmony.toml";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConverterConfig {
    /// `[engine]` table: `backend = "native" | "ffmpeg"`, plus `ffmpeg_path`
    #[serde(default)]
    pub engine: EngineBackend,

    #[serde(default = "default_output")]
    pub output: OutputSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputSettings {
    #[serde(default = "default_output_directory")]
    pub directory: PathBuf,

    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    #[serde(default = "default_mastering_preset")]
    pub mastering_preset: String,

    #[serde(default)]
    pub loudness_lufs: Option<f64>,
}

impl ConverterConfig {
    /// Load configuration from file and environment
    ///
    /// `path` overrides the default `harmony.toml`. Environment variables use
    /// the `HARMONY_` prefix and `__` between section and key, e.g.
    /// `HARMONY_OUTPUT__SAMPLE_RATE=48000`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = config::Config::builder();

        match path {
            Some(path) => {
                if !path.exists() {
                    return Err(CliError::Config(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
                settings = settings.add_source(config::File::from(path.to_path_buf()));
            }
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    settings = settings.add_source(config::File::from(default_path));
                }
            }
        }

        settings = settings.add_source(
            config::Environment::with_prefix("HARMONY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = settings.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if SampleRate::from_hz(self.output.sample_rate).is_none() {
            return Err(CliError::Config(format!(
                "Unsupported sample rate {} (expected 44100, 48000 or 96000)",
                self.output.sample_rate
            )));
        }

        if let Some(lufs) = self.output.loudness_lufs {
            if !lufs.is_finite() {
                return Err(CliError::Config(format!(
                    "Loudness target must be finite, got {}",
                    lufs
                )));
            }
        }

        // A bare program name is resolved through PATH when the engine loads
        if let EngineBackend::Ffmpeg { ffmpeg_path } = &self.engine {
            if ffmpeg_path.components().count() > 1 && !ffmpeg_path.exists() {
                return Err(CliError::Config(format!(
                    "FFmpeg not found at {:?}",
                    ffmpeg_path
                )));
            }
        }

        Ok(())
    }

    pub fn engine_backend(&self) -> EngineBackend {
        self.engine.clone()
    }

    /// Default mastering settings for requests built from this config
    pub fn mastering_settings(&self) -> Result<MasteringSettings> {
        let sample_rate = SampleRate::try_from(self.output.sample_rate)?;
        let mut settings = MasteringSettings::new(
            sample_rate,
            MasteringPreset::from_key(&self.output.mastering_preset),
        );
        settings.loudness_lufs = self.output.loudness_lufs;
        Ok(settings)
    }
}

// Default values
fn default_output() -> OutputSettings {
    OutputSettings {
        directory: default_output_directory(),
        sample_rate: default_sample_rate(),
        mastering_preset: default_mastering_preset(),
        loudness_lufs: None,
    }
}

fn default_output_directory() -> PathBuf {
    PathBuf::from("./exports")
}

fn default_sample_rate() -> u32 {
    SampleRate::default().hz()
}

fn default_mastering_preset() -> String {
    MasteringPreset::None.as_str().to_string()
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            engine: EngineBackend::default(),
            output: default_output(),
        }
    }
}
