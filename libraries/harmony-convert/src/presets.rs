//! Export presets
//!
//! Streaming platforms publish loudness targets; picking one of these sets both
//! the loudness target and the sample rate of a conversion.

use crate::{MasteringSettings, SampleRate};

/// Loudness target used by the one-click "LUFS normalize" action
pub const STREAMING_LUFS: f64 = -14.0;

/// A named export target
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportPreset {
    pub key: &'static str,
    pub label: &'static str,
    pub loudness_lufs: f64,
    pub sample_rate: SampleRate,
}

pub const EXPORT_PRESETS: [ExportPreset; 4] = [
    ExportPreset {
        key: "default",
        label: "Default WAV",
        loudness_lufs: -14.0,
        sample_rate: SampleRate::Hz44100,
    },
    ExportPreset {
        key: "spotify",
        label: "Spotify",
        loudness_lufs: -14.0,
        sample_rate: SampleRate::Hz44100,
    },
    ExportPreset {
        key: "apple",
        label: "Apple Music",
        loudness_lufs: -16.0,
        sample_rate: SampleRate::Hz48000,
    },
    ExportPreset {
        key: "youtube",
        label: "YouTube",
        loudness_lufs: -13.0,
        sample_rate: SampleRate::Hz48000,
    },
];

impl ExportPreset {
    /// Look up a preset by key (case-insensitive)
    pub fn find(key: &str) -> Option<&'static ExportPreset> {
        let key = key.trim();
        EXPORT_PRESETS
            .iter()
            .find(|preset| preset.key.eq_ignore_ascii_case(key))
    }

    /// Apply the preset's loudness target and sample rate
    pub fn apply(&self, settings: MasteringSettings) -> MasteringSettings {
        MasteringSettings {
            sample_rate: self.sample_rate,
            loudness_lufs: Some(self.loudness_lufs),
            ..settings
        }
    }
}

/// Set the loudness target to the common streaming level
pub fn normalize_for_streaming(settings: MasteringSettings) -> MasteringSettings {
    settings.with_loudness(STREAMING_LUFS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MasteringPreset;

    #[test]
    fn test_find_presets() {
        assert_eq!(ExportPreset::find("apple").unwrap().loudness_lufs, -16.0);
        assert_eq!(
            ExportPreset::find("YouTube").unwrap().sample_rate,
            SampleRate::Hz48000
        );
        assert!(ExportPreset::find("tidal").is_none());
    }

    #[test]
    fn test_apply_keeps_mastering_preset() {
        let settings = MasteringSettings::new(SampleRate::Hz96000, MasteringPreset::Acoustic);
        let applied = ExportPreset::find("apple").unwrap().apply(settings);

        assert_eq!(applied.sample_rate, SampleRate::Hz48000);
        assert_eq!(applied.loudness_lufs, Some(-16.0));
        assert_eq!(applied.mastering_preset, MasteringPreset::Acoustic);
    }

    #[test]
    fn test_streaming_normalize() {
        let settings = normalize_for_streaming(MasteringSettings::default());
        assert_eq!(settings.loudness_lufs, Some(-14.0));
    }
}
