//! Output file naming
//!
//! Names follow `<base>_<rate>[_<suffix>][_<region>].wav`, where `<base>` is the
//! source file name with its last extension stripped.

use crate::{OutputNaming, SampleRate, TrimWindow};
use std::collections::HashSet;

/// Suffix appended by [`OutputNaming::Export`]
pub const EXPORT_SUFFIX: &str = "amuse";

/// Region name used by a single region export
pub const DEFAULT_REGION_NAME: &str = "region";

/// Strip the last extension from a file name
///
/// `song.final.mp3` → `song.final`; names without an extension, or ending in a
/// bare dot, are returned unchanged.
pub fn base_name(file_name: &str) -> &str {
    match file_name.rfind('.') {
        Some(idx) if idx + 1 < file_name.len() && !file_name[idx + 1..].contains('/') => {
            &file_name[..idx]
        }
        _ => file_name,
    }
}

/// Default name of the `index`-th (0-based) region in a batch region export
pub fn batch_region_name(index: usize) -> String {
    format!("region{}", index + 1)
}

/// Derive the output file name for a conversion
pub fn output_file_name(
    source_name: &str,
    sample_rate: SampleRate,
    naming: &OutputNaming,
    trim: Option<&TrimWindow>,
) -> String {
    let mut name = format!("{}_{}", base_name(source_name), sample_rate);

    match naming {
        OutputNaming::Convert => {}
        OutputNaming::Export => {
            name.push('_');
            name.push_str(EXPORT_SUFFIX);
        }
        OutputNaming::Region { name: region } => {
            name.push('_');
            name.push_str(&sanitize(region));
            if let Some(trim) = trim {
                name.push('_');
                name.push_str(&trim.to_string());
            }
        }
    }

    name.push_str(".wav");
    name
}

/// Scratch name for the engine output; never equal to the staged input name
pub fn scratch_output_name(input_name: &str, output_name: &str) -> String {
    if input_name == output_name {
        format!("{}_out.wav", base_name(output_name))
    } else {
        output_name.to_string()
    }
}

/// `name`, or `<base>_<n>.<ext>` with the smallest `n >= 2` not in `taken`
pub fn unique_file_name(name: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(name) {
        return name.to_string();
    }

    let base = base_name(name);
    let extension = &name[base.len()..];
    (2..)
        .map(|n| format!("{}_{}{}", base, n, extension))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| name.to_string())
}

fn sanitize(segment: &str) -> String {
    let cleaned: String = segment
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect();

    if cleaned.is_empty() {
        DEFAULT_REGION_NAME.to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("song.mp3"), "song");
        assert_eq!(base_name("song.final.mp3"), "song.final");
        assert_eq!(base_name("noext"), "noext");
        assert_eq!(base_name("trailing."), "trailing.");
        assert_eq!(base_name(".hidden"), "");
    }

    #[test]
    fn test_convert_and_export_names() {
        assert_eq!(
            output_file_name("mix.flac", SampleRate::Hz48000, &OutputNaming::Convert, None),
            "mix_48000.wav"
        );
        assert_eq!(
            output_file_name("mix.flac", SampleRate::Hz44100, &OutputNaming::Export, None),
            "mix_44100_amuse.wav"
        );
    }

    #[test]
    fn test_region_names() {
        let trim = TrimWindow::new(1.5, 4.25).unwrap();
        let naming = OutputNaming::Region {
            name: "verse one".to_string(),
        };
        assert_eq!(
            output_file_name("mix.wav", SampleRate::Hz96000, &naming, Some(&trim)),
            "mix_96000_verse_one_1.50-4.25.wav"
        );

        let naming = OutputNaming::Region {
            name: "a/b".to_string(),
        };
        assert_eq!(
            output_file_name("mix.wav", SampleRate::Hz44100, &naming, Some(&trim)),
            "mix_44100_a_b_1.50-4.25.wav"
        );
        assert_eq!(batch_region_name(0), "region1");
    }

    #[test]
    fn test_unique_file_name() {
        let mut taken = HashSet::new();
        assert_eq!(unique_file_name("song_44100.wav", &taken), "song_44100.wav");

        taken.insert("song_44100.wav".to_string());
        assert_eq!(unique_file_name("song_44100.wav", &taken), "song_44100_2.wav");

        taken.insert("song_44100_2.wav".to_string());
        assert_eq!(unique_file_name("song_44100.wav", &taken), "song_44100_3.wav");
    }

    #[test]
    fn test_scratch_output_never_collides() {
        assert_eq!(
            scratch_output_name("take_44100.wav", "take_44100.wav"),
            "take_44100_out.wav"
        );
        assert_eq!(scratch_output_name("take.wav", "take_44100.wav"), "take_44100.wav");
    }
}
