use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external tool is missing: {tool}")]
    ExternalToolMissing { tool: String },

    #[error("external tool failed: {tool} (code={code:?}) {stderr}")]
    ExternalToolFailed {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    /// Tag codec failure; the codec's own message is kept verbatim for display.
    #[error("{0}")]
    Tag(String),

    #[error("inference endpoint unavailable: {0}")]
    InferenceUnavailable(String),

    #[error("inference request failed: {0}")]
    Inference(String),

    #[error("not a supported media file: {path}")]
    UnsupportedMedia { path: PathBuf },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("tool install failed: {0}")]
    InstallFailed(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
