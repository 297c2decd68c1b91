//! Error types for the conversion pipeline

use thiserror::Error;

/// Result type for conversion operations
pub type Result<T> = std::result::Result<T, ConvertError>;

/// Errors that can occur while converting audio
///
/// Per-item variants carry the source file name so a failed item can be
/// retried on its own.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The transcode engine could not be started
    #[error("Engine initialization failed: {0}")]
    EngineInit(String),

    /// Source bytes could not be written into the scratch namespace
    #[error("Failed to stage {file}: {reason}")]
    Staging { file: String, reason: String },

    /// The engine rejected the transform (bad codec, filter chain, trim window...)
    #[error("Transcode failed for {file}: {reason}")]
    Transcode { file: String, reason: String },

    /// The engine reported success but the output could not be read back
    #[error("Output {file} missing after successful transcode: {reason}")]
    Readback { file: String, reason: String },

    /// The request failed validation before any engine work
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The batch was cancelled before this item started
    #[error("Conversion cancelled")]
    Cancelled,

    /// Generic IO error (loading sources from disk)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConvertError {
    /// Create an invalid request error
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Name of the file this error is attributed to, if any
    pub fn file(&self) -> Option<&str> {
        match self {
            Self::Staging { file, .. }
            | Self::Transcode { file, .. }
            | Self::Readback { file, .. } => Some(file),
            _ => None,
        }
    }
}
