use crate::engine::locate_engine;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Render and execution settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Directory holding a managed engine install.
    pub engine_dir: Option<PathBuf>,
    /// Explicit engine binary, checked after the managed directory.
    pub engine_path: Option<PathBuf>,
    pub video_codec: String,
    pub audio_codec: String,
    /// Target video bitrate. When unset, quality is governed by `crf`.
    pub video_bitrate: Option<String>,
    pub audio_bitrate: Option<String>,
    pub crf: u8,
    /// Raster scale applied to preview renders, in `(0, 1]`.
    pub preview_quality: f64,
    pub wait_timeout_secs: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            engine_dir: None,
            engine_path: None,
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            video_bitrate: None,
            audio_bitrate: Some("192k".to_string()),
            crf: 23,
            preview_quality: 0.5,
            wait_timeout_secs: 3600,
        }
    }
}

impl RenderConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    pub fn locate_engine(&self) -> Result<PathBuf> {
        locate_engine(self.engine_dir.as_deref(), self.engine_path.as_deref())
    }
}
