//! Batch orchestration
//!
//! Runs many conversions through one [`AudioConverter`], strictly one after
//! another in submission order. A failed item is recorded and the batch moves
//! on; the caller gets a [`BatchReport`] listing every item's outcome.

use crate::naming::{batch_region_name, unique_file_name};
use crate::{
    AudioConverter, ConversionRequest, ConversionResult, ConvertError, MasteringSettings,
    OutputNaming, SourceAsset, TrimWindow,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Progress callback, invoked after every completed item
pub type ProgressCallback = Box<dyn Fn(&BatchProgress) + Send + Sync>;

/// Snapshot of a running batch
#[derive(Debug, Clone, PartialEq)]
pub struct BatchProgress {
    /// Items submitted
    pub total: usize,

    /// Items finished (either way)
    pub completed: usize,

    pub succeeded: usize,
    pub failed: usize,

    /// Source file of the item that just finished
    pub current_file: Option<String>,
}

impl BatchProgress {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: 0,
            succeeded: 0,
            failed: 0,
            current_file: None,
        }
    }

    /// `completed / total * 100`
    pub fn percentage(&self) -> f32 {
        if self.total == 0 {
            return 100.0;
        }
        (self.completed as f32 / self.total as f32) * 100.0
    }
}

/// A named time range of a source, for region export
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    /// Name used in the output file; `None` picks `region<N>`
    pub name: Option<String>,
    pub window: TrimWindow,
}

impl Region {
    pub fn new(window: TrimWindow) -> Self {
        Self { name: None, window }
    }

    pub fn named(name: impl Into<String>, window: TrimWindow) -> Self {
        Self {
            name: Some(name.into()),
            window,
        }
    }
}

/// A finished item
#[derive(Debug, Clone)]
pub struct ItemSuccess {
    /// Position in the submitted batch (0-based)
    pub index: usize,
    pub result: ConversionResult,
}

/// A failed item, with everything needed to retry it alone
#[derive(Debug)]
pub struct ItemFailure {
    pub index: usize,
    pub file_name: String,

    /// `None` when the source could not be loaded
    pub request: Option<ConversionRequest>,
    pub error: ConvertError,
}

/// An item that never started because the batch was cancelled
#[derive(Debug, Clone)]
pub struct SkippedItem {
    pub index: usize,
    pub file_name: String,
}

/// Aggregate outcome of a batch
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<ItemSuccess>,
    pub failed: Vec<ItemFailure>,
    pub skipped: Vec<SkippedItem>,

    /// The batch stopped early on cancellation
    pub cancelled: bool,

    pub duration: Duration,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len() + self.skipped.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && !self.cancelled
    }

    /// Successful results in submission order
    pub fn results(&self) -> impl Iterator<Item = &ConversionResult> {
        self.succeeded.iter().map(|item| &item.result)
    }

    /// Requests of failed items, ready to resubmit
    pub fn retry_requests(&self) -> Vec<ConversionRequest> {
        self.failed.iter().filter_map(|f| f.request.clone()).collect()
    }

    pub fn summary_text(&self) -> String {
        let mut text = format!(
            "Batch complete: {} succeeded, {} failed",
            self.succeeded.len(),
            self.failed.len()
        );
        if self.cancelled {
            text.push_str(&format!(", {} skipped (cancelled)", self.skipped.len()));
        }
        text.push_str(&format!(" in {:.1}s", self.duration.as_secs_f64()));
        text
    }
}

/// One unit of batch work
enum BatchItem {
    Ready(ConversionRequest),

    /// Read from disk when the item's turn comes
    File {
        path: PathBuf,
        settings: MasteringSettings,
        naming: OutputNaming,
    },
}

impl BatchItem {
    fn file_name(&self) -> String {
        match self {
            Self::Ready(request) => request.source.file_name.clone(),
            Self::File { path, .. } => display_name(path),
        }
    }

    async fn into_request(self) -> Result<ConversionRequest, ConvertError> {
        match self {
            Self::Ready(request) => Ok(request),
            Self::File {
                path,
                settings,
                naming,
            } => {
                let source = SourceAsset::load(&path).await.map_err(|e| ConvertError::Staging {
                    file: display_name(&path),
                    reason: format!("cannot read {}: {}", path.display(), e),
                })?;
                Ok(ConversionRequest::new(source, settings).with_naming(naming))
            }
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Sequential batch runner
pub struct BatchConverter {
    converter: AudioConverter,
    progress_callback: Option<ProgressCallback>,
    cancel: CancellationToken,
}

impl BatchConverter {
    pub fn new(converter: AudioConverter) -> Self {
        Self {
            converter,
            progress_callback: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Set progress callback
    pub fn on_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Stop before the next item once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Convert each source with the same settings
    pub async fn convert_all(
        &self,
        sources: Vec<SourceAsset>,
        settings: MasteringSettings,
    ) -> BatchReport {
        let requests = sources
            .into_iter()
            .map(|source| ConversionRequest::new(source, settings))
            .collect();
        self.run(requests).await
    }

    /// Load and convert files from disk, one at a time
    ///
    /// A file that cannot be read fails as a `Staging` error for its own item;
    /// the rest of the batch still runs.
    pub async fn convert_files(
        &self,
        paths: &[PathBuf],
        settings: MasteringSettings,
        naming: OutputNaming,
    ) -> BatchReport {
        let items = paths
            .iter()
            .map(|path| BatchItem::File {
                path: path.clone(),
                settings,
                naming: naming.clone(),
            })
            .collect();
        self.run_items(items).await
    }

    /// Export every region of one source
    ///
    /// Unnamed regions are called `region1`, `region2`, ... by position.
    pub async fn export_regions(
        &self,
        source: &SourceAsset,
        regions: &[Region],
        settings: MasteringSettings,
    ) -> BatchReport {
        let requests = regions
            .iter()
            .enumerate()
            .map(|(i, region)| {
                let name = region.name.clone().unwrap_or_else(|| batch_region_name(i));
                ConversionRequest::new(source.clone(), settings)
                    .with_trim(region.window)
                    .with_naming(OutputNaming::Region { name })
            })
            .collect();
        self.run(requests).await
    }

    /// Run requests in order
    ///
    /// Output names are unique within the report: a name already produced
    /// earlier in the batch gets a `_2`, `_3`, ... suffix.
    pub async fn run(&self, requests: Vec<ConversionRequest>) -> BatchReport {
        self.run_items(requests.into_iter().map(BatchItem::Ready).collect())
            .await
    }

    async fn run_items(&self, items: Vec<BatchItem>) -> BatchReport {
        let started = Instant::now();
        let mut progress = BatchProgress::new(items.len());
        let mut report = BatchReport::default();
        let mut written: HashSet<String> = HashSet::new();

        info!("Starting batch of {} items", items.len());

        let mut pending = items.into_iter().enumerate();
        for (index, item) in pending.by_ref() {
            let file_name = item.file_name();
            if self.cancel.is_cancelled() {
                warn!("Batch cancelled before item {}", index + 1);
                report.cancelled = true;
                report.skipped.push(SkippedItem { index, file_name });
                break;
            }

            match item.into_request().await {
                Ok(request) => match self.converter.convert(&request).await {
                    Ok(mut result) => {
                        let unique = unique_file_name(&result.file_name, &written);
                        if unique != result.file_name {
                            warn!(
                                "Output name {} already used in this batch, saving item {} as {}",
                                result.file_name,
                                index + 1,
                                unique
                            );
                            result.file_name = unique;
                        }
                        written.insert(result.file_name.clone());
                        progress.succeeded += 1;
                        report.succeeded.push(ItemSuccess { index, result });
                    }
                    Err(e) => {
                        error!("Batch item {} failed ({}): {}", index + 1, request.describe(), e);
                        progress.failed += 1;
                        report.failed.push(ItemFailure {
                            index,
                            file_name: file_name.clone(),
                            request: Some(request),
                            error: e,
                        });
                    }
                },
                Err(e) => {
                    error!("Batch item {} failed: {}", index + 1, e);
                    progress.failed += 1;
                    report.failed.push(ItemFailure {
                        index,
                        file_name: file_name.clone(),
                        request: None,
                        error: e,
                    });
                }
            }

            progress.completed += 1;
            progress.current_file = Some(file_name);
            if let Some(callback) = &self.progress_callback {
                callback(&progress);
            }
        }

        report.skipped.extend(pending.map(|(index, item)| SkippedItem {
            index,
            file_name: item.file_name(),
        }));

        report.duration = started.elapsed();
        info!("{}", report.summary_text());
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage() {
        let mut progress = BatchProgress::new(3);
        assert_eq!(progress.percentage(), 0.0);
        progress.completed = 3;
        assert_eq!(progress.percentage(), 100.0);
        assert_eq!(BatchProgress::new(0).percentage(), 100.0);
    }

    #[test]
    fn test_summary_text() {
        let report = BatchReport {
            duration: Duration::from_millis(1500),
            ..Default::default()
        };
        assert_eq!(
            report.summary_text(),
            "Batch complete: 0 succeeded, 0 failed in 1.5s"
        );
        assert!(report.is_success());
    }
}
