/// Batch orchestration tests
/// Ordering, progress reporting, failure isolation, cancellation and region export
mod common;

use common::{init_tracing, FakeEngine, SharedLoader};
use harmony_convert::{
    AudioConverter, BatchConverter, BatchProgress, ConvertError, EngineManager, MasteringPreset,
    MasteringSettings, OutputNaming, Region, SampleRate, SourceAsset, TrimWindow,
};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

fn converter_with(engine: Arc<FakeEngine>) -> AudioConverter {
    init_tracing();
    AudioConverter::new(Arc::new(EngineManager::new(SharedLoader::new(engine))))
}

fn sources(names: &[&str]) -> Vec<SourceAsset> {
    names
        .iter()
        .map(|name| SourceAsset::new(*name, b"payload".to_vec()))
        .collect()
}

fn recorder() -> (Arc<Mutex<Vec<BatchProgress>>>, Box<dyn Fn(&BatchProgress) + Send + Sync>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    (
        seen,
        Box::new(move |progress: &BatchProgress| sink.lock().unwrap().push(progress.clone())),
    )
}

#[tokio::test]
async fn test_middle_failure_does_not_abort_batch() {
    let engine = Arc::new(FakeEngine::failing_on(&["two.mp3"]));
    let (seen, callback) = recorder();
    let batch = BatchConverter::new(converter_with(engine.clone())).on_progress(callback);

    let settings = MasteringSettings::new(SampleRate::Hz48000, MasteringPreset::Acoustic);
    let report = batch
        .convert_all(sources(&["one.wav", "two.mp3", "three.flac"]), settings)
        .await;

    let ok: Vec<usize> = report.succeeded.iter().map(|s| s.index).collect();
    assert_eq!(ok, vec![0, 2]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].index, 1);
    assert_eq!(report.failed[0].file_name, "two.mp3");
    assert!(matches!(report.failed[0].error, ConvertError::Transcode { .. }));
    assert!(!report.is_success());

    let percentages: Vec<u32> = seen
        .lock()
        .unwrap()
        .iter()
        .map(|p| p.percentage().floor() as u32)
        .collect();
    assert_eq!(percentages, vec![33, 66, 100]);

    let names: Vec<&str> = report.results().map(|r| r.file_name.as_str()).collect();
    assert_eq!(names, vec!["one_48000.wav", "three_48000.wav"]);
    assert!(engine.file_names().is_empty());
}

#[tokio::test]
async fn test_items_run_in_submission_order() {
    let engine = Arc::new(FakeEngine::new());
    let batch = BatchConverter::new(converter_with(engine.clone()));

    batch
        .convert_all(sources(&["c.wav", "a.wav", "b.wav"]), MasteringSettings::default())
        .await;

    let inputs: Vec<String> = engine.commands().into_iter().map(|c| c.input).collect();
    assert_eq!(inputs, vec!["c.wav", "a.wav", "b.wav"]);
}

#[tokio::test]
async fn test_failed_items_can_be_retried_alone() {
    let engine = Arc::new(FakeEngine::failing_on(&["b.wav"]));
    let converter = converter_with(engine);
    let settings = MasteringSettings::default().with_loudness(-16.0);

    let report = BatchConverter::new(converter)
        .convert_all(sources(&["a.wav", "b.wav"]), settings)
        .await;

    let retry = report.retry_requests();
    assert_eq!(retry.len(), 1);
    assert_eq!(retry[0].source.file_name, "b.wav");
    assert_eq!(retry[0].settings.loudness_lufs, Some(-16.0));

    let healthy = converter_with(Arc::new(FakeEngine::new()));
    let result = healthy.convert(&retry[0]).await.unwrap();
    assert_eq!(result.file_name, "b_44100.wav");
}

#[tokio::test]
async fn test_unreadable_file_fails_only_its_item() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let one = temp_dir.path().join("one.wav");
    let three = temp_dir.path().join("three.wav");
    std::fs::write(&one, b"payload").unwrap();
    std::fs::write(&three, b"payload").unwrap();
    let paths = vec![one, temp_dir.path().join("two.wav"), three];

    let engine = Arc::new(FakeEngine::new());
    let (seen, callback) = recorder();
    let report = BatchConverter::new(converter_with(engine.clone()))
        .on_progress(callback)
        .convert_files(&paths, MasteringSettings::default(), OutputNaming::Export)
        .await;

    let names: Vec<&str> = report.results().map(|r| r.file_name.as_str()).collect();
    assert_eq!(names, vec!["one_44100_amuse.wav", "three_44100_amuse.wav"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].index, 1);
    assert_eq!(report.failed[0].file_name, "two.wav");
    assert!(report.failed[0].request.is_none());
    assert!(matches!(
        &report.failed[0].error,
        ConvertError::Staging { file, .. } if file == "two.wav"
    ));
    assert!(report.retry_requests().is_empty());
    assert_eq!(seen.lock().unwrap().len(), 3);
    assert_eq!(engine.commands().len(), 2);
}

#[tokio::test]
async fn test_repeated_output_names_get_suffixes() {
    let engine = Arc::new(FakeEngine::new());
    let report = BatchConverter::new(converter_with(engine))
        .convert_all(
            sources(&["song.wav", "song.mp3", "song.wav"]),
            MasteringSettings::default(),
        )
        .await;

    let names: Vec<&str> = report.results().map(|r| r.file_name.as_str()).collect();
    assert_eq!(
        names,
        vec!["song_44100.wav", "song_44100_2.wav", "song_44100_3.wav"]
    );
}

#[tokio::test]
async fn test_cancellation_between_items() {
    let engine = Arc::new(FakeEngine::new());
    let token = CancellationToken::new();

    let cancel_after_first = token.clone();
    let batch = BatchConverter::new(converter_with(engine.clone()))
        .with_cancellation(token)
        .on_progress(Box::new(move |progress: &BatchProgress| {
            if progress.completed == 1 {
                cancel_after_first.cancel();
            }
        }));

    let report = batch
        .convert_all(sources(&["1.wav", "2.wav", "3.wav"]), MasteringSettings::default())
        .await;

    assert!(report.cancelled);
    assert_eq!(report.succeeded.len(), 1);
    let skipped: Vec<usize> = report.skipped.iter().map(|s| s.index).collect();
    assert_eq!(skipped, vec![1, 2]);
    assert_eq!(report.total(), 3);
    assert_eq!(engine.commands().len(), 1);
    assert!(report.summary_text().contains("2 skipped (cancelled)"));
}

#[tokio::test]
async fn test_export_regions_naming() {
    let engine = Arc::new(FakeEngine::new());
    let batch = BatchConverter::new(converter_with(engine.clone()));

    let source = SourceAsset::new("jam.m4a", b"payload".to_vec());
    let regions = vec![
        Region::new(TrimWindow::new(0.0, 4.0).unwrap()),
        Region::named("chorus", TrimWindow::new(12.5, 20.126).unwrap()),
        Region::new(TrimWindow::new(30.0, 31.0).unwrap()),
    ];

    let report = batch
        .export_regions(&source, &regions, MasteringSettings::new(SampleRate::Hz44100, MasteringPreset::None))
        .await;

    let names: Vec<&str> = report.results().map(|r| r.file_name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "jam_44100_region1_0.00-4.00.wav",
            "jam_44100_chorus_12.50-20.13.wav",
            "jam_44100_region3_30.00-31.00.wav",
        ]
    );

    let trims: Vec<_> = engine.commands().into_iter().map(|c| c.trim).collect();
    assert_eq!(trims[1], Some(TrimWindow::new(12.5, 20.126).unwrap()));
}

#[tokio::test]
async fn test_empty_batch() {
    let engine = Arc::new(FakeEngine::new());
    let (seen, callback) = recorder();
    let report = BatchConverter::new(converter_with(engine))
        .on_progress(callback)
        .run(Vec::new())
        .await;

    assert_eq!(report.total(), 0);
    assert!(report.is_success());
    assert!(seen.lock().unwrap().is_empty());
}
