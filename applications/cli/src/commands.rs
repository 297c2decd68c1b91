/// Command implementations - load sources, run the pipeline, save WAV files
use crate::error::{CliError, Result};
use harmony_convert::presets::{normalize_for_streaming, ExportPreset};
use harmony_convert::{
    AudioConverter, BatchConverter, BatchProgress, BatchReport, ConversionRequest,
    ConversionResult, MasteringPreset, MasteringSettings, OutputNaming, Region, SampleRate,
    SourceAsset, TrimWindow,
};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Per-invocation overrides on top of the configured settings
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    /// Named export preset (sets loudness and sample rate)
    pub export_preset: Option<String>,
    /// Shortcut for the -14 LUFS streaming target
    pub normalize: bool,
    pub sample_rate: Option<u32>,
    pub mastering_preset: Option<String>,
    pub loudness_lufs: Option<f64>,
}

impl SettingsOverrides {
    /// Apply in order: export preset, normalize shortcut, explicit values
    pub fn apply(&self, base: MasteringSettings) -> Result<MasteringSettings> {
        let mut settings = base;

        if let Some(key) = &self.export_preset {
            match ExportPreset::find(key) {
                Some(preset) => settings = preset.apply(settings),
                None => warn!("Unknown export preset '{}', ignoring", key),
            }
        }

        if self.normalize {
            settings = normalize_for_streaming(settings);
        }

        if let Some(hz) = self.sample_rate {
            settings.sample_rate = SampleRate::try_from(hz)?;
        }
        if let Some(key) = &self.mastering_preset {
            settings.mastering_preset = MasteringPreset::from_key(key);
        }
        if let Some(lufs) = self.loudness_lufs {
            settings.loudness_lufs = Some(lufs);
        }

        settings.validate()?;
        Ok(settings)
    }
}

/// `--region` value: `start:end` or `name:start:end`, in seconds
#[derive(Debug, Clone, PartialEq)]
pub struct RegionArg(pub Region);

impl FromStr for RegionArg {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.rsplitn(3, ':').collect();
        let (name, start, end) = match parts.as_slice() {
            [end, start] => (None, *start, *end),
            [end, start, name] => (Some(name.trim()).filter(|n| !n.is_empty()), *start, *end),
            _ => {
                return Err(CliError::BadArgument(format!(
                    "Region must be [name:]start:end, got '{}'",
                    s
                )))
            }
        };

        let seconds = |value: &str| {
            value.trim().parse::<f64>().map_err(|_| {
                CliError::BadArgument(format!("Region bound is not a number: '{}'", value))
            })
        };
        let window = TrimWindow::new(seconds(start)?, seconds(end)?)?;

        Ok(Self(Region {
            name: name.map(str::to_string),
            window,
        }))
    }
}

/// Write a result into `directory`, creating it if needed
pub async fn save_result(directory: &Path, result: &ConversionResult) -> Result<PathBuf> {
    tokio::fs::create_dir_all(directory).await?;
    let path = directory.join(&result.file_name);
    tokio::fs::write(&path, &result.data).await?;
    info!("Saved {} ({} bytes)", path.display(), result.data.len());
    Ok(path)
}

/// Convert one file
pub async fn convert(
    converter: &AudioConverter,
    input: &Path,
    settings: MasteringSettings,
    trim: Option<TrimWindow>,
    naming: OutputNaming,
    output_dir: &Path,
) -> Result<PathBuf> {
    let source = SourceAsset::load(input).await?;

    let mut request = ConversionRequest::new(source, settings).with_naming(naming);
    if let Some(trim) = trim {
        request = request.with_trim(trim);
    }

    let result = converter.convert(&request).await?;
    save_result(output_dir, &result).await
}

/// Convert many files with the same settings
///
/// Files are read as their turn comes; one that cannot be read is reported as
/// a failed item and the rest still convert.
pub async fn batch(
    converter: &AudioConverter,
    inputs: &[PathBuf],
    settings: MasteringSettings,
    export: bool,
    output_dir: &Path,
    cancel: CancellationToken,
) -> Result<BatchReport> {
    let naming = if export {
        OutputNaming::Export
    } else {
        OutputNaming::Convert
    };

    let report = BatchConverter::new(converter.clone())
        .with_cancellation(cancel)
        .on_progress(Box::new(log_progress))
        .convert_files(inputs, settings, naming)
        .await;

    save_report(output_dir, &report).await?;
    Ok(report)
}

/// Export several regions of one file
pub async fn regions(
    converter: &AudioConverter,
    input: &Path,
    regions: &[Region],
    settings: MasteringSettings,
    output_dir: &Path,
    cancel: CancellationToken,
) -> Result<BatchReport> {
    if regions.is_empty() {
        return Err(CliError::BadArgument(
            "At least one --region is required".to_string(),
        ));
    }

    let source = SourceAsset::load(input).await?;
    let report = BatchConverter::new(converter.clone())
        .with_cancellation(cancel)
        .on_progress(Box::new(log_progress))
        .export_regions(&source, regions, settings)
        .await;

    save_report(output_dir, &report).await?;
    Ok(report)
}

/// The filter chain a preset and loudness target produce
pub fn filter_chain(preset: &str, loudness_lufs: Option<f64>) -> String {
    harmony_convert::build_filter_chain(MasteringPreset::from_key(preset), loudness_lufs)
}

async fn save_report(output_dir: &Path, report: &BatchReport) -> Result<()> {
    for result in report.results() {
        save_result(output_dir, result).await?;
    }
    for failure in &report.failed {
        match &failure.request {
            Some(request) => error!(
                "{} failed: {} (retry with: {})",
                failure.file_name,
                failure.error,
                request.describe()
            ),
            None => error!("{} failed: {}", failure.file_name, failure.error),
        }
    }
    Ok(())
}

fn log_progress(progress: &BatchProgress) {
    info!(
        "[{:>3.0}%] {}/{} {}",
        progress.percentage(),
        progress.completed,
        progress.total,
        progress.current_file.as_deref().unwrap_or("")
    );
}
