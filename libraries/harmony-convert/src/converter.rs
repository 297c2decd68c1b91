/// Conversion orchestrator - drives one request through the shared engine
use crate::engine::{EngineError, EngineManager, TranscodeCommand, TranscodeEngine};
use crate::filter_graph::build_filter_chain;
use crate::naming::{output_file_name, scratch_output_name, DEFAULT_REGION_NAME};
use crate::{
    ConversionRequest, ConversionResult, ConvertError, MasteringSettings, OutputNaming, Result,
    SourceAsset, TrimWindow,
};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Converts source assets into mastered WAV payloads
///
/// Cloning is cheap; clones share the same engine.
#[derive(Clone)]
pub struct AudioConverter {
    engines: Arc<EngineManager>,
}

impl AudioConverter {
    pub fn new(engines: Arc<EngineManager>) -> Self {
        Self { engines }
    }

    /// The engine manager backing this converter
    pub fn engines(&self) -> &Arc<EngineManager> {
        &self.engines
    }

    /// Convert one request
    ///
    /// Staged input and output are removed from the scratch namespace on every
    /// exit path, including failures.
    pub async fn convert(&self, request: &ConversionRequest) -> Result<ConversionResult> {
        request.validate()?;

        let started = Instant::now();
        let session = self.engines.session().await?;

        let source_name = request.source.file_name.as_str();
        let file_name = output_file_name(
            source_name,
            request.settings.sample_rate,
            &request.naming,
            request.trim.as_ref(),
        );
        let scratch_output = scratch_output_name(source_name, &file_name);

        let chain = build_filter_chain(
            request.settings.mastering_preset,
            request.settings.loudness_lufs,
        );
        let command = TranscodeCommand::new(source_name, &scratch_output, request.settings.sample_rate)
            .with_filter_chain(chain)
            .with_trim(request.trim);

        let outcome = run_staged(&*session, &request.source, &command).await;

        cleanup(&*session, &command.input).await;
        cleanup(&*session, &command.output).await;

        let data = outcome?;
        info!(
            "Converted {} → {} ({} bytes, {:.2}s)",
            source_name,
            file_name,
            data.len(),
            started.elapsed().as_secs_f64()
        );

        Ok(ConversionResult {
            file_name,
            data,
            source_name: source_name.to_string(),
            settings: request.settings,
            trim: request.trim,
        })
    }

    /// Export one region of a source with the default region name
    pub async fn export_region(
        &self,
        source: SourceAsset,
        trim: TrimWindow,
        settings: MasteringSettings,
    ) -> Result<ConversionResult> {
        let request = ConversionRequest::new(source, settings)
            .with_trim(trim)
            .with_naming(OutputNaming::Region {
                name: DEFAULT_REGION_NAME.to_string(),
            });
        self.convert(&request).await
    }
}

/// Stage, run and read back; cleanup is the caller's job
async fn run_staged(
    engine: &dyn TranscodeEngine,
    source: &SourceAsset,
    command: &TranscodeCommand,
) -> Result<Bytes> {
    engine
        .write_file(&command.input, &source.data)
        .await
        .map_err(|e| ConvertError::Staging {
            file: source.file_name.clone(),
            reason: e.to_string(),
        })?;

    debug!("{} {}", engine.name(), command.to_args().join(" "));

    engine
        .run(command)
        .await
        .map_err(|e| ConvertError::Transcode {
            file: source.file_name.clone(),
            reason: e.to_string(),
        })?;

    let data = engine
        .read_file(&command.output)
        .await
        .map_err(|e| ConvertError::Readback {
            file: source.file_name.clone(),
            reason: e.to_string(),
        })?;

    if data.is_empty() {
        return Err(ConvertError::Readback {
            file: source.file_name.clone(),
            reason: format!("{} is empty", command.output),
        });
    }

    Ok(Bytes::from(data))
}

async fn cleanup(engine: &dyn TranscodeEngine, name: &str) {
    match engine.unlink(name).await {
        Ok(()) => debug!("Unlinked {} from scratch", name),
        Err(EngineError::NotFound(_) | EngineError::InvalidName(_)) => {}
        Err(e) => warn!("Failed to unlink {} from scratch: {}", name, e),
    }
}
