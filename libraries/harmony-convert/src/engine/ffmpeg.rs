/// FFmpeg engine - runs the `ffmpeg` binary against a private temp directory
use super::{check_scratch_name, EngineError, EngineLoader, TranscodeCommand, TranscodeEngine};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::debug;

/// Keep the tail of ffmpeg's stderr in error messages
const STDERR_TAIL_BYTES: usize = 2048;

/// Loads an [`FfmpegEngine`] after checking the binary runs
#[derive(Debug, Clone)]
pub struct FfmpegLoader {
    ffmpeg_path: PathBuf,
}

impl FfmpegLoader {
    pub fn new(ffmpeg_path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }
}

#[async_trait]
impl EngineLoader for FfmpegLoader {
    async fn load(&self) -> Result<Arc<dyn TranscodeEngine>, EngineError> {
        let engine = FfmpegEngine::start(&self.ffmpeg_path).await?;
        Ok(Arc::new(engine))
    }
}

#[derive(Debug)]
pub struct FfmpegEngine {
    ffmpeg_path: PathBuf,
    scratch: TempDir,
}

impl FfmpegEngine {
    /// Verify `ffmpeg -version` succeeds and create the scratch directory
    pub async fn start(ffmpeg_path: &Path) -> Result<Self, EngineError> {
        let probe = Command::new(ffmpeg_path)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                EngineError::Unavailable(format!(
                    "cannot execute {}: {}",
                    ffmpeg_path.display(),
                    e
                ))
            })?;

        if !probe.status.success() {
            return Err(EngineError::Unavailable(format!(
                "{} -version exited with {}",
                ffmpeg_path.display(),
                probe.status
            )));
        }

        let version = String::from_utf8_lossy(&probe.stdout);
        debug!(
            "Using {}",
            version.lines().next().unwrap_or("ffmpeg (unknown version)")
        );

        let scratch = tempfile::Builder::new()
            .prefix("harmony-scratch-")
            .tempdir()
            .map_err(|e| EngineError::Unavailable(format!("cannot create scratch dir: {}", e)))?;

        Ok(Self {
            ffmpeg_path: ffmpeg_path.to_path_buf(),
            scratch,
        })
    }

    /// Directory backing the scratch namespace
    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    fn entry_path(&self, name: &str) -> Result<PathBuf, EngineError> {
        check_scratch_name(name)?;
        Ok(self.scratch.path().join(name))
    }
}

fn not_found_as(name: &str, err: std::io::Error) -> EngineError {
    if err.kind() == ErrorKind::NotFound {
        EngineError::NotFound(name.to_string())
    } else {
        EngineError::Io(err)
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.len() <= STDERR_TAIL_BYTES {
        return text.to_string();
    }
    let mut start = text.len() - STDERR_TAIL_BYTES;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &text[start..])
}

#[async_trait]
impl TranscodeEngine for FfmpegEngine {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    async fn write_file(&self, name: &str, data: &[u8]) -> Result<(), EngineError> {
        let path = self.entry_path(name)?;
        tokio::fs::write(&path, data).await?;
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>, EngineError> {
        let path = self.entry_path(name)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| not_found_as(name, e))
    }

    async fn unlink(&self, name: &str) -> Result<(), EngineError> {
        let path = self.entry_path(name)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| not_found_as(name, e))
    }

    async fn list_files(&self) -> Result<Vec<String>, EngineError> {
        let mut entries = tokio::fs::read_dir(self.scratch.path()).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn run(&self, command: &TranscodeCommand) -> Result<(), EngineError> {
        check_scratch_name(&command.input)?;
        check_scratch_name(&command.output)?;

        let args = ffmpeg_args(command);
        debug!("ffmpeg {}", args.join(" "));

        let output = Command::new(&self.ffmpeg_path)
            .args(["-hide_banner", "-nostdin", "-y", "-loglevel", "error"])
            .args(&args)
            .current_dir(self.scratch.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            return Err(EngineError::Failed(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                stderr_tail(&output.stderr)
            )));
        }

        Ok(())
    }
}

/// Command arguments with scratch names pinned to the `file:` protocol
///
/// Without the prefix a name like `-take.wav` reads as an option and
/// `a:b.wav` as a protocol URL.
fn ffmpeg_args(command: &TranscodeCommand) -> Vec<String> {
    let mut pinned = command.clone();
    pinned.input = format!("file:{}", command.input);
    pinned.output = format!("file:{}", command.output);
    pinned.to_args()
}
