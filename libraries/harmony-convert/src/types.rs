//! Common types for the conversion pipeline

use crate::filter_graph::MasteringPreset;
use crate::{ConvertError, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Output sample rates supported by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum SampleRate {
    /// 44.1 kHz (CD, most streaming platforms)
    #[default]
    Hz44100,
    /// 48 kHz (video, Apple Music, YouTube)
    Hz48000,
    /// 96 kHz (high resolution masters)
    Hz96000,
}

impl SampleRate {
    pub const ALL: [SampleRate; 3] = [Self::Hz44100, Self::Hz48000, Self::Hz96000];

    /// Rate in Hz
    pub fn hz(self) -> u32 {
        match self {
            Self::Hz44100 => 44100,
            Self::Hz48000 => 48000,
            Self::Hz96000 => 96000,
        }
    }

    /// Look up a supported rate
    pub fn from_hz(hz: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|rate| rate.hz() == hz)
    }
}

impl fmt::Display for SampleRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hz())
    }
}

impl TryFrom<u32> for SampleRate {
    type Error = ConvertError;

    fn try_from(hz: u32) -> Result<Self> {
        Self::from_hz(hz).ok_or_else(|| {
            ConvertError::invalid_request(format!(
                "Unsupported sample rate: {} Hz (expected 44100, 48000 or 96000)",
                hz
            ))
        })
    }
}

impl From<SampleRate> for u32 {
    fn from(rate: SampleRate) -> Self {
        rate.hz()
    }
}

impl FromStr for SampleRate {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self> {
        let hz = s.trim().parse::<u32>().map_err(|_| {
            ConvertError::invalid_request(format!("Sample rate is not a number: {}", s))
        })?;
        Self::try_from(hz)
    }
}

/// Declared container type of a source file
///
/// The pipeline never re-validates this against the actual bytes; a wrong tag
/// surfaces as a transcode error from the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Wav,
    Mp3,
    Flac,
    Ogg,
    M4a,
    Aac,
    Unknown,
}

impl SourceFormat {
    /// Guess the declared format from a file name extension
    pub fn from_file_name(file_name: &str) -> Self {
        let ext = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match ext.as_deref() {
            Some("wav" | "wave") => Self::Wav,
            Some("mp3") => Self::Mp3,
            Some("flac") => Self::Flac,
            Some("ogg" | "oga") => Self::Ogg,
            Some("m4a" | "mp4") => Self::M4a,
            Some("aac") => Self::Aac,
            _ => Self::Unknown,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Wav => "audio/wav",
            Self::Mp3 => "audio/mpeg",
            Self::Flac => "audio/flac",
            Self::Ogg => "audio/ogg",
            Self::M4a => "audio/mp4",
            Self::Aac => "audio/aac",
            Self::Unknown => "application/octet-stream",
        }
    }
}

/// An opaque audio payload plus the name it was dropped in with
#[derive(Debug, Clone)]
pub struct SourceAsset {
    /// Original file name (no directories)
    pub file_name: String,

    /// Declared container type
    pub format: SourceFormat,

    /// Raw file contents
    pub data: Bytes,
}

impl SourceAsset {
    /// Create an asset, declaring its format from the file extension
    pub fn new(file_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let file_name = file_name.into();
        let format = SourceFormat::from_file_name(&file_name);
        Self {
            file_name,
            format,
            data: data.into(),
        }
    }

    /// Override the declared format
    pub fn with_format(mut self, format: SourceFormat) -> Self {
        self.format = format;
        self
    }

    /// Read an asset from disk, keeping only the final path component as its name
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                ConvertError::invalid_request(format!("Invalid source path: {}", path.display()))
            })?
            .to_string();

        let data = tokio::fs::read(path).await?;
        Ok(Self::new(file_name, data))
    }
}

/// Sub-range of the source to keep, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrimWindow {
    pub start_seconds: f64,
    pub end_seconds: f64,
}

impl TrimWindow {
    /// Create a validated window
    pub fn new(start_seconds: f64, end_seconds: f64) -> Result<Self> {
        let window = Self {
            start_seconds,
            end_seconds,
        };
        window.validate()?;
        Ok(window)
    }

    /// Check `0 <= start < end` with finite bounds
    pub fn validate(&self) -> Result<()> {
        if !self.start_seconds.is_finite() || !self.end_seconds.is_finite() {
            return Err(ConvertError::invalid_request(
                "Trim window bounds must be finite",
            ));
        }
        if self.start_seconds < 0.0 {
            return Err(ConvertError::invalid_request(format!(
                "Trim window starts before zero: {}",
                self.start_seconds
            )));
        }
        if self.start_seconds >= self.end_seconds {
            return Err(ConvertError::invalid_request(format!(
                "Trim window is empty: start {} >= end {}",
                self.start_seconds, self.end_seconds
            )));
        }
        Ok(())
    }

    /// Requested length in seconds (before any clamping to the source duration)
    pub fn duration_seconds(&self) -> f64 {
        self.end_seconds - self.start_seconds
    }
}

impl fmt::Display for TrimWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}-{:.2}", self.start_seconds, self.end_seconds)
    }
}

/// Mastering and export parameters shared by every item of a batch
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteringSettings {
    /// Output sample rate
    #[serde(default)]
    pub sample_rate: SampleRate,

    /// Mastering chain applied before loudness normalization
    #[serde(default)]
    pub mastering_preset: MasteringPreset,

    /// Integrated loudness target in LUFS; `None` disables normalization
    #[serde(default)]
    pub loudness_lufs: Option<f64>,
}

impl MasteringSettings {
    pub fn new(sample_rate: SampleRate, mastering_preset: MasteringPreset) -> Self {
        Self {
            sample_rate,
            mastering_preset,
            loudness_lufs: None,
        }
    }

    /// Set the loudness target
    pub fn with_loudness(mut self, lufs: f64) -> Self {
        self.loudness_lufs = Some(lufs);
        self
    }

    /// Check the loudness target is a finite number
    pub fn validate(&self) -> Result<()> {
        match self.loudness_lufs {
            Some(lufs) if !lufs.is_finite() => Err(ConvertError::invalid_request(format!(
                "Loudness target must be finite: {}",
                lufs
            ))),
            _ => Ok(()),
        }
    }

    /// True when the request is a plain resample with no filtering
    pub fn is_passthrough(&self) -> bool {
        self.mastering_preset == MasteringPreset::None && self.loudness_lufs.is_none()
    }
}

/// How the output file is named
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OutputNaming {
    /// `<base>_<rate>.wav`
    #[default]
    Convert,

    /// `<base>_<rate>_amuse.wav`
    Export,

    /// `<base>_<rate>_<name>_<start>-<end>.wav`; requires a trim window
    Region { name: String },
}

/// One end-to-end conversion
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub source: SourceAsset,
    pub settings: MasteringSettings,
    pub trim: Option<TrimWindow>,
    pub naming: OutputNaming,
}

impl ConversionRequest {
    pub fn new(source: SourceAsset, settings: MasteringSettings) -> Self {
        Self {
            source,
            settings,
            trim: None,
            naming: OutputNaming::Convert,
        }
    }

    /// Limit the output to a sub-range of the source
    pub fn with_trim(mut self, trim: TrimWindow) -> Self {
        self.trim = Some(trim);
        self
    }

    pub fn with_naming(mut self, naming: OutputNaming) -> Self {
        self.naming = naming;
        self
    }

    /// Validate everything that can be checked without the engine
    pub fn validate(&self) -> Result<()> {
        if self.source.file_name.trim().is_empty() {
            return Err(ConvertError::invalid_request("Source file name is empty"));
        }
        self.settings.validate()?;
        if let Some(trim) = &self.trim {
            trim.validate()?;
        }
        if matches!(self.naming, OutputNaming::Region { .. }) && self.trim.is_none() {
            return Err(ConvertError::invalid_request(
                "Region export requires a trim window",
            ));
        }
        Ok(())
    }

    /// Short description used in logs and failure reports
    pub fn describe(&self) -> String {
        let mut text = format!(
            "{} @ {} Hz, preset {}",
            self.source.file_name,
            self.settings.sample_rate,
            self.settings.mastering_preset.as_str()
        );
        if let Some(lufs) = self.settings.loudness_lufs {
            text.push_str(&format!(", {} LUFS", lufs));
        }
        if let Some(trim) = &self.trim {
            text.push_str(&format!(", trim {}", trim));
        }
        text
    }
}

/// Finished WAV payload (stereo, 16-bit PCM) and its derived name
#[derive(Debug, Clone)]
pub struct ConversionResult {
    /// Derived output file name
    pub file_name: String,

    /// RIFF/WAVE bytes
    pub data: Bytes,

    /// Name of the source the result was produced from
    pub source_name: String,

    /// Settings the result was rendered with
    pub settings: MasteringSettings,

    /// Trim window, if any
    pub trim: Option<TrimWindow>,
}

impl ConversionResult {
    pub fn mime_type(&self) -> &'static str {
        SourceFormat::Wav.mime_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_rate_parsing() {
        assert_eq!("48000".parse::<SampleRate>().unwrap(), SampleRate::Hz48000);
        assert_eq!(SampleRate::try_from(96000).unwrap(), SampleRate::Hz96000);
        assert!(SampleRate::try_from(22050).is_err());
        assert!("fast".parse::<SampleRate>().is_err());
        assert_eq!(SampleRate::default().to_string(), "44100");
    }

    #[test]
    fn test_trim_window_validation() {
        assert!(TrimWindow::new(0.0, 1.0).is_ok());
        assert!(TrimWindow::new(2.0, 2.0).is_err());
        assert!(TrimWindow::new(3.0, 2.0).is_err());
        assert!(TrimWindow::new(-1.0, 2.0).is_err());
        assert!(TrimWindow::new(0.0, f64::INFINITY).is_err());
        assert!(TrimWindow::new(f64::NAN, 1.0).is_err());
    }

    #[test]
    fn test_source_format_detection() {
        assert_eq!(SourceFormat::from_file_name("a.WAV"), SourceFormat::Wav);
        assert_eq!(SourceFormat::from_file_name("b.mp3"), SourceFormat::Mp3);
        assert_eq!(SourceFormat::from_file_name("c.tar.flac"), SourceFormat::Flac);
        assert_eq!(SourceFormat::from_file_name("noext"), SourceFormat::Unknown);
    }

    #[test]
    fn test_region_naming_requires_trim() {
        let source = SourceAsset::new("song.wav", vec![0u8; 4]);
        let request = ConversionRequest::new(source, MasteringSettings::default()).with_naming(
            OutputNaming::Region {
                name: "intro".to_string(),
            },
        );
        assert!(matches!(
            request.validate(),
            Err(ConvertError::InvalidRequest(_))
        ));

        let request = request.with_trim(TrimWindow::new(1.0, 2.0).unwrap());
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_non_finite_loudness_rejected() {
        let settings = MasteringSettings::default().with_loudness(f64::NAN);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_settings_deserialize_with_unknown_preset() {
        let json = r#"{"sampleRate":48000,"masteringPreset":"trance","loudnessLufs":-16.0}"#;
        let settings: MasteringSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.sample_rate, SampleRate::Hz48000);
        assert_eq!(settings.mastering_preset, MasteringPreset::None);
        assert_eq!(settings.loudness_lufs, Some(-16.0));
    }
}
