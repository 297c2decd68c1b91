//! Filter-graph construction
//!
//! Turns mastering settings into an ordered, comma-joined ffmpeg-style filter
//! chain. Everything here is pure and table-driven:
//!
//! ```text
//! preset stages (equalizer → compressor → limiter) → loudnorm (optional)
//! ```
//!
//! Loudness normalization always comes last so it measures the mastered signal.
//! An empty chain means "no `-af` argument at all".

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// True-peak ceiling used by every loudness normalization stage (dBTP)
pub const LOUDNORM_TRUE_PEAK_DB: f64 = -1.5;

/// Loudness range target used by every loudness normalization stage (LU)
pub const LOUDNORM_RANGE_LU: f64 = 11.0;

/// Linear ceiling shared by the preset limiters
pub const PRESET_LIMIT: f64 = 0.9;

/// Bandwidth unit of an equalizer band
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidthType {
    /// Q factor
    Q,
    /// Bandwidth in Hz
    Hz,
    /// Bandwidth in kHz
    KHz,
    /// Bandwidth in octaves
    Octave,
}

impl WidthType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Q => "q",
            Self::Hz => "h",
            Self::KHz => "k",
            Self::Octave => "o",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "q" => Some(Self::Q),
            "h" => Some(Self::Hz),
            "k" => Some(Self::KHz),
            "o" => Some(Self::Octave),
            _ => None,
        }
    }
}

/// A single stage of the filter chain
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterStage {
    /// Peaking equalizer band
    Equalizer {
        frequency_hz: f64,
        width_type: WidthType,
        width: f64,
        gain_db: f64,
    },

    /// Downward dynamics compressor
    Compressor {
        threshold_db: f64,
        ratio: f64,
        attack_ms: f64,
        release_ms: f64,
    },

    /// Peak limiter with a linear ceiling
    Limiter { limit: f64 },

    /// Loudness normalization
    LoudnessNorm {
        integrated_lufs: f64,
        true_peak_db: f64,
        loudness_range_lu: f64,
    },
}

impl FilterStage {
    /// Loudness normalization stage with the fixed ceiling and range
    pub fn loudness_norm(integrated_lufs: f64) -> Self {
        Self::LoudnessNorm {
            integrated_lufs,
            true_peak_db: LOUDNORM_TRUE_PEAK_DB,
            loudness_range_lu: LOUDNORM_RANGE_LU,
        }
    }

    /// ffmpeg filter name
    pub fn filter_name(&self) -> &'static str {
        match self {
            Self::Equalizer { .. } => "equalizer",
            Self::Compressor { .. } => "acompressor",
            Self::Limiter { .. } => "alimiter",
            Self::LoudnessNorm { .. } => "loudnorm",
        }
    }
}

impl fmt::Display for FilterStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equalizer {
                frequency_hz,
                width_type,
                width,
                gain_db,
            } => write!(
                f,
                "equalizer=f={}:t={}:w={}:g={}",
                frequency_hz,
                width_type.as_str(),
                width,
                gain_db
            ),
            Self::Compressor {
                threshold_db,
                ratio,
                attack_ms,
                release_ms,
            } => write!(
                f,
                "acompressor=threshold={}dB:ratio={}:attack={}:release={}",
                threshold_db, ratio, attack_ms, release_ms
            ),
            Self::Limiter { limit } => write!(f, "alimiter=limit={}", limit),
            Self::LoudnessNorm {
                integrated_lufs,
                true_peak_db,
                loudness_range_lu,
            } => write!(
                f,
                "loudnorm=I={}:TP={}:LRA={}",
                integrated_lufs, true_peak_db, loudness_range_lu
            ),
        }
    }
}

/// Errors from parsing a filter chain back into stages
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterParseError {
    #[error("Unknown filter: {0}")]
    UnknownFilter(String),

    #[error("Malformed option '{option}' in {filter}")]
    MalformedOption { filter: String, option: String },

    #[error("Missing option '{option}' in {filter}")]
    MissingOption { filter: String, option: String },

    #[error("Invalid value '{value}' for {filter}:{option}")]
    InvalidValue {
        filter: String,
        option: String,
        value: String,
    },
}

/// Options of one `name=k=v:k=v` stage
struct StageOptions<'a> {
    filter: &'a str,
    options: Vec<(&'a str, &'a str)>,
}

impl<'a> StageOptions<'a> {
    fn parse(filter: &'a str, raw: &'a str) -> Result<Self, FilterParseError> {
        let mut options = Vec::new();
        for option in raw.split(':').filter(|o| !o.is_empty()) {
            let (key, value) =
                option
                    .split_once('=')
                    .ok_or_else(|| FilterParseError::MalformedOption {
                        filter: filter.to_string(),
                        option: option.to_string(),
                    })?;
            options.push((key, value));
        }
        Ok(Self { filter, options })
    }

    fn raw(&self, keys: &[&str]) -> Result<&'a str, FilterParseError> {
        self.options
            .iter()
            .find(|(k, _)| keys.contains(k))
            .map(|(_, v)| *v)
            .ok_or_else(|| FilterParseError::MissingOption {
                filter: self.filter.to_string(),
                option: keys[0].to_string(),
            })
    }

    fn number(&self, keys: &[&str], unit_suffix: Option<&str>) -> Result<f64, FilterParseError> {
        let raw = self.raw(keys)?;
        let trimmed = unit_suffix
            .and_then(|suffix| raw.strip_suffix(suffix))
            .unwrap_or(raw);
        trimmed
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| FilterParseError::InvalidValue {
                filter: self.filter.to_string(),
                option: keys[0].to_string(),
                value: raw.to_string(),
            })
    }
}

impl FromStr for FilterStage {
    type Err = FilterParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (name, raw) = s.split_once('=').unwrap_or((s, ""));
        if !matches!(name, "equalizer" | "acompressor" | "alimiter" | "loudnorm") {
            return Err(FilterParseError::UnknownFilter(name.to_string()));
        }
        let opts = StageOptions::parse(name, raw)?;

        match name {
            "equalizer" => {
                let width_raw = opts.raw(&["t", "width_type"]).unwrap_or("q");
                let width_type =
                    WidthType::parse(width_raw).ok_or_else(|| FilterParseError::InvalidValue {
                        filter: name.to_string(),
                        option: "t".to_string(),
                        value: width_raw.to_string(),
                    })?;
                Ok(Self::Equalizer {
                    frequency_hz: opts.number(&["f", "frequency"], None)?,
                    width_type,
                    width: opts.number(&["w", "width"], None)?,
                    gain_db: opts.number(&["g", "gain"], None)?,
                })
            }
            "acompressor" => Ok(Self::Compressor {
                threshold_db: opts.number(&["threshold"], Some("dB"))?,
                ratio: opts.number(&["ratio"], None)?,
                attack_ms: opts.number(&["attack"], None)?,
                release_ms: opts.number(&["release"], None)?,
            }),
            "alimiter" => Ok(Self::Limiter {
                limit: opts.number(&["limit"], None)?,
            }),
            "loudnorm" => Ok(Self::LoudnessNorm {
                integrated_lufs: opts.number(&["I", "i"], None)?,
                true_peak_db: opts.number(&["TP", "tp"], None)?,
                loudness_range_lu: opts.number(&["LRA", "lra"], None)?,
            }),
            other => Err(FilterParseError::UnknownFilter(other.to_string())),
        }
    }
}

/// Mastering presets
///
/// Unknown keys map to `None` rather than failing, so a stale preset name from
/// the UI or a config file degrades to an unfiltered conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MasteringPreset {
    #[default]
    None,
    Pop,
    HipHop,
    Acoustic,
}

static POP_STAGES: [FilterStage; 3] = [
    FilterStage::Equalizer {
        frequency_hz: 1000.0,
        width_type: WidthType::Q,
        width: 1.0,
        gain_db: 3.0,
    },
    FilterStage::Compressor {
        threshold_db: -20.0,
        ratio: 4.0,
        attack_ms: 5.0,
        release_ms: 50.0,
    },
    FilterStage::Limiter {
        limit: PRESET_LIMIT,
    },
];

static HIPHOP_STAGES: [FilterStage; 3] = [
    FilterStage::Equalizer {
        frequency_hz: 80.0,
        width_type: WidthType::Q,
        width: 2.0,
        gain_db: 4.0,
    },
    FilterStage::Compressor {
        threshold_db: -18.0,
        ratio: 3.0,
        attack_ms: 10.0,
        release_ms: 100.0,
    },
    FilterStage::Limiter {
        limit: PRESET_LIMIT,
    },
];

static ACOUSTIC_STAGES: [FilterStage; 3] = [
    FilterStage::Equalizer {
        frequency_hz: 5000.0,
        width_type: WidthType::Q,
        width: 2.0,
        gain_db: 2.0,
    },
    FilterStage::Compressor {
        threshold_db: -22.0,
        ratio: 2.0,
        attack_ms: 20.0,
        release_ms: 200.0,
    },
    FilterStage::Limiter {
        limit: PRESET_LIMIT,
    },
];

impl MasteringPreset {
    pub const ALL: [MasteringPreset; 4] = [Self::None, Self::Pop, Self::HipHop, Self::Acoustic];

    /// Parse a preset key, treating anything unrecognized as `None`
    pub fn from_key(key: &str) -> Self {
        match key.trim().to_ascii_lowercase().as_str() {
            "pop" => Self::Pop,
            "hiphop" | "hip-hop" | "hip_hop" => Self::HipHop,
            "acoustic" => Self::Acoustic,
            "none" | "" => Self::None,
            other => {
                tracing::warn!("Unknown mastering preset '{}', using none", other);
                Self::None
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Pop => "pop",
            Self::HipHop => "hiphop",
            Self::Acoustic => "acoustic",
        }
    }

    /// The fixed, ordered stages of this preset
    pub fn stages(&self) -> &'static [FilterStage] {
        match self {
            Self::None => &[],
            Self::Pop => &POP_STAGES,
            Self::HipHop => &HIPHOP_STAGES,
            Self::Acoustic => &ACOUSTIC_STAGES,
        }
    }
}

impl From<String> for MasteringPreset {
    fn from(key: String) -> Self {
        Self::from_key(&key)
    }
}

impl From<MasteringPreset> for String {
    fn from(preset: MasteringPreset) -> Self {
        preset.as_str().to_string()
    }
}

impl fmt::Display for MasteringPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered stages for a preset and optional loudness target
pub fn filter_stages(preset: MasteringPreset, loudness_lufs: Option<f64>) -> Vec<FilterStage> {
    let mut stages = preset.stages().to_vec();
    if let Some(lufs) = loudness_lufs {
        stages.push(FilterStage::loudness_norm(lufs));
    }
    stages
}

/// Build the comma-joined filter chain; empty when there is nothing to apply
pub fn build_filter_chain(preset: MasteringPreset, loudness_lufs: Option<f64>) -> String {
    render_chain(&filter_stages(preset, loudness_lufs))
}

/// Join stages with commas
pub fn render_chain(stages: &[FilterStage]) -> String {
    stages
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse a comma-joined chain back into stages
pub fn parse_filter_chain(chain: &str) -> Result<Vec<FilterStage>, FilterParseError> {
    chain
        .split(',')
        .map(str::trim)
        .filter(|stage| !stage.is_empty())
        .map(str::parse)
        .collect()
}
