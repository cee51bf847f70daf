use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("ffmpeg not found (looked in managed dir, FFMPEG_PATH and PATH)")]
    EngineNotFound,

    #[error("ffmpeg failed: {0}")]
    EngineFailed(String),

    #[error("timed out after {0:?} waiting for output")]
    Timeout(Duration),

    #[error("empty render window")]
    EmptyWindow,

    #[error(transparent)]
    Core(#[from] cutlane_core::CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RenderError>;
