/// Harmony - offline audio conversion and mastering
use clap::{Args, Parser, Subcommand};
use harmony_cli::commands::{self, RegionArg, SettingsOverrides};
use harmony_cli::config::ConverterConfig;
use harmony_convert::{AudioConverter, OutputNaming, TrimWindow};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "harmony")]
#[command(about = "Convert and master audio files to WAV", long_about = None)]
struct Cli {
    /// Configuration file path (defaults to ./harmony.toml when present)
    #[arg(short, long, global = true, env = "HARMONY_CONFIG")]
    config: Option<PathBuf>,

    /// Output directory (overrides the configured one)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a single file
    Convert {
        /// Input audio file
        input: PathBuf,

        #[command(flatten)]
        settings: SettingsArgs,

        /// Trim start in seconds
        #[arg(long, requires = "end")]
        start: Option<f64>,

        /// Trim end in seconds
        #[arg(long, requires = "start")]
        end: Option<f64>,

        /// Name the output as an export (`_amuse` suffix)
        #[arg(long)]
        export: bool,
    },
    /// Convert several files with the same settings
    Batch {
        /// Input audio files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        #[command(flatten)]
        settings: SettingsArgs,

        /// Name the outputs as exports (`_amuse` suffix)
        #[arg(long)]
        export: bool,
    },
    /// Export regions of one file
    Regions {
        /// Input audio file
        input: PathBuf,

        /// Region as [name:]start:end in seconds (repeatable)
        #[arg(long = "region", required = true)]
        regions: Vec<RegionArg>,

        #[command(flatten)]
        settings: SettingsArgs,
    },
    /// Print the filter chain for a preset
    FilterChain {
        /// Mastering preset (none, pop, hiphop, acoustic)
        #[arg(short, long, default_value = "none")]
        preset: String,

        /// Loudness target in LUFS
        #[arg(short, long, allow_hyphen_values = true)]
        lufs: Option<f64>,
    },
}

#[derive(Args, Clone)]
struct SettingsArgs {
    /// Output sample rate (44100, 48000, 96000)
    #[arg(short, long)]
    rate: Option<u32>,

    /// Mastering preset (none, pop, hiphop, acoustic)
    #[arg(short, long)]
    preset: Option<String>,

    /// Loudness target in LUFS
    #[arg(short, long, allow_hyphen_values = true)]
    lufs: Option<f64>,

    /// Export preset (default, spotify, apple, youtube)
    #[arg(long)]
    export_preset: Option<String>,

    /// Normalize to -14 LUFS
    #[arg(long)]
    normalize: bool,
}

impl From<SettingsArgs> for SettingsOverrides {
    fn from(args: SettingsArgs) -> Self {
        Self {
            export_preset: args.export_preset,
            normalize: args.normalize,
            sample_rate: args.rate,
            mastering_preset: args.preset,
            loudness_lufs: args.lufs,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "harmony=info,harmony_cli=info,harmony_convert=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    if let Commands::FilterChain { preset, lufs } = &cli.command {
        println!("{}", commands::filter_chain(preset, *lufs));
        return Ok(());
    }

    let config = ConverterConfig::load(cli.config.as_deref())?;
    config.validate()?;

    let output_dir = cli
        .output
        .clone()
        .unwrap_or_else(|| config.output.directory.clone());
    let base_settings = config.mastering_settings()?;

    let backend = config.engine_backend();
    tracing::info!("Using {} engine", backend.name());
    let engines = Arc::new(backend.manager());
    let converter = AudioConverter::new(Arc::clone(&engines));

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing the current item");
            ctrl_c.cancel();
        }
    });

    let outcome = match cli.command {
        Commands::Convert {
            input,
            settings,
            start,
            end,
            export,
        } => {
            let settings = SettingsOverrides::from(settings).apply(base_settings)?;
            let trim = match (start, end) {
                (Some(start), Some(end)) => Some(TrimWindow::new(start, end)?),
                _ => None,
            };
            let naming = if export {
                OutputNaming::Export
            } else {
                OutputNaming::Convert
            };

            let path =
                commands::convert(&converter, &input, settings, trim, naming, &output_dir).await?;
            println!("{}", path.display());
            Ok(())
        }
        Commands::Batch {
            inputs,
            settings,
            export,
        } => {
            let settings = SettingsOverrides::from(settings).apply(base_settings)?;
            let report =
                commands::batch(&converter, &inputs, settings, export, &output_dir, cancel).await?;
            println!("{}", report.summary_text());
            if report.is_success() {
                Ok(())
            } else {
                Err(anyhow::anyhow!("{} item(s) did not convert", report.total() - report.succeeded.len()))
            }
        }
        Commands::Regions {
            input,
            regions,
            settings,
        } => {
            let settings = SettingsOverrides::from(settings).apply(base_settings)?;
            let regions: Vec<_> = regions.into_iter().map(|RegionArg(region)| region).collect();
            let report =
                commands::regions(&converter, &input, &regions, settings, &output_dir, cancel)
                    .await?;
            println!("{}", report.summary_text());
            if report.is_success() {
                Ok(())
            } else {
                Err(anyhow::anyhow!("{} region(s) did not export", report.total() - report.succeeded.len()))
            }
        }
        Commands::FilterChain { .. } => Ok(()),
    };

    engines.dispose().await;
    outcome
}
