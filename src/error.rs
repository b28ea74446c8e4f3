use std::path::{Path, PathBuf};

use thiserror::Error;

/// Why a single file could not be converted.
///
/// Every variant is caught at the per-file boundary by the driver and stored
/// on the file's [`ConversionResult`](crate::pipeline::ConversionResult); none
/// of them aborts a batch.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The input path does not exist.
    #[error("path does not exist: {}", .0.display())]
    NotFound(PathBuf),

    /// The source is not a readable PNG (or, when reading back, not a valid WEBP).
    #[error("decode error: {0}")]
    Decode(String),

    /// The pixel data could not be encoded as WEBP.
    #[error("encode error: {0}")]
    Encode(String),

    /// The destination could not be written or its container could not take the metadata.
    #[error("write error for {}: {reason}", path.display())]
    Write { path: PathBuf, reason: String },
}

impl ConvertError {
    pub fn decode(msg: impl ToString) -> Self {
        Self::Decode(msg.to_string())
    }

    pub fn encode(msg: impl ToString) -> Self {
        Self::Encode(msg.to_string())
    }

    pub fn write(path: &Path, reason: impl ToString) -> Self {
        Self::Write {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    /// Attach the destination path to a write error raised before it was known.
    pub fn at(self, dest: &Path) -> Self {
        match self {
            Self::Write { reason, .. } => Self::Write {
                path: dest.to_path_buf(),
                reason,
            },
            other => other,
        }
    }

    /// Short name of the error kind, as shown in summaries and JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Decode(_) => "decode",
            Self::Encode(_) => "encode",
            Self::Write { .. } => "write",
        }
    }
}

pub type Result<T> = std::result::Result<T, ConvertError>;
