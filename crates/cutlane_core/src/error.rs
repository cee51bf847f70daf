use crate::types::{AssetKind, TrackKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Clip not found: {0}")]
    ClipNotFound(uuid::Uuid),

    #[error("Track not found: {0}")]
    TrackNotFound(uuid::Uuid),

    #[error("Asset not found: {0}")]
    AssetNotFound(uuid::Uuid),

    #[error("Group not found: {0}")]
    GroupNotFound(uuid::Uuid),

    #[error("Overlap detected")]
    OverlapDetected,

    #[error("{asset:?} clips cannot be placed on a {track:?} track")]
    IncompatibleTrack { track: TrackKind, asset: AssetKind },

    #[error("Group {0} is already propagating an update")]
    GroupBusy(uuid::Uuid),

    #[error("Clip {0} is already linked")]
    AlreadyLinked(uuid::Uuid),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Nothing to undo")]
    NothingToUndo,

    #[error("Nothing to redo")]
    NothingToRedo,
}

pub type Result<T> = std::result::Result<T, CoreError>;
