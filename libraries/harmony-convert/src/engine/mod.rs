//! Transcode engines
//!
//! An engine owns a scratch namespace (a flat set of named files) and runs a
//! single [`TranscodeCommand`] at a time against it. The orchestrator stages
//! the input, runs the command, reads the output and unlinks both.
//!
//! Backends:
//! - [`FfmpegEngine`]: the `ffmpeg` binary, scratch namespace in a temp dir
//! - [`NativeEngine`]: in-process decoder/DSP/encoder, scratch namespace in memory

mod command;
mod ffmpeg;
mod lifecycle;
pub mod native;

pub use command::{SampleFormat, TranscodeCommand, OUTPUT_CHANNELS};
pub use ffmpeg::{FfmpegEngine, FfmpegLoader};
pub use lifecycle::{EngineManager, EngineSession};
pub use native::{NativeEngine, NativeLoader};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Errors reported by an engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine could not be started
    #[error("Engine unavailable: {0}")]
    Unavailable(String),

    /// No entry with this name in the scratch namespace
    #[error("No such file in scratch namespace: {0}")]
    NotFound(String),

    /// Name cannot be used inside the scratch namespace
    #[error("Invalid scratch file name: {0}")]
    InvalidName(String),

    /// The transform itself failed
    #[error("{0}")]
    Failed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

/// A transcoding backend with a private scratch namespace
///
/// Implementations are not required to support concurrent use; callers go
/// through [`EngineManager::session`], which serializes access.
#[async_trait]
pub trait TranscodeEngine: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Create or replace a scratch entry
    async fn write_file(&self, name: &str, data: &[u8]) -> Result<(), EngineError>;

    /// Read a scratch entry
    async fn read_file(&self, name: &str) -> Result<Vec<u8>, EngineError>;

    /// Remove a scratch entry
    async fn unlink(&self, name: &str) -> Result<(), EngineError>;

    /// Names currently present in the scratch namespace
    async fn list_files(&self) -> Result<Vec<String>, EngineError>;

    /// Run a transform; input and output are scratch entry names
    async fn run(&self, command: &TranscodeCommand) -> Result<(), EngineError>;
}

/// Creates engines for the [`EngineManager`]
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EngineLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn TranscodeEngine>, EngineError>;
}

/// Which backend to load
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum EngineBackend {
    /// In-process renderer
    #[default]
    Native,

    /// External `ffmpeg` binary
    Ffmpeg {
        #[serde(default = "default_ffmpeg_path")]
        ffmpeg_path: PathBuf,
    },
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

impl EngineBackend {
    /// Build a lifecycle manager for this backend
    pub fn manager(&self) -> EngineManager {
        match self {
            Self::Native => EngineManager::new(NativeLoader::new()),
            Self::Ffmpeg { ffmpeg_path } => {
                EngineManager::new(FfmpegLoader::new(ffmpeg_path.clone()))
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Ffmpeg { .. } => "ffmpeg",
        }
    }
}

/// Reject names that would escape a flat scratch namespace
pub(crate) fn check_scratch_name(name: &str) -> Result<(), EngineError> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
    {
        return Err(EngineError::InvalidName(name.to_string()));
    }
    Ok(())
}
