use std::io;
use thiserror::Error;

/// Errors produced while reading or writing descriptor and manifest files.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid manifest extension: '{0}'")]
    InvalidExtension(String),
}
