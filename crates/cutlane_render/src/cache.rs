use crate::error::Result;
use cutlane_core::types::Asset;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[derive(Debug, Clone)]
struct CacheEntry {
    modified: SystemTime,
    video: Asset,
    audio: Asset,
}

/// Video-only and audio-only companions keyed by source file. An entry goes
/// stale once the source's modification time changes.
#[derive(Debug, Default)]
pub struct DerivedAssetCache {
    entries: HashMap<PathBuf, CacheEntry>,
}

impl DerivedAssetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached `(video, audio)` companions for `source`. A stale or unreadable
    /// entry is evicted and reported as a miss.
    pub fn get(&mut self, source: &Path) -> Option<(Asset, Asset)> {
        let entry = self.entries.get(source)?;
        match modified(source) {
            Ok(m) if m == entry.modified => Some((entry.video.clone(), entry.audio.clone())),
            _ => {
                tracing::debug!(source = %source.display(), "evicting stale companions");
                self.entries.remove(source);
                None
            }
        }
    }

    /// Record companions against the source's current modification time.
    pub fn insert(&mut self, source: &Path, video: Asset, audio: Asset) -> Result<()> {
        let modified = modified(source)?;
        self.entries.insert(
            source.to_path_buf(),
            CacheEntry {
                modified,
                video,
                audio,
            },
        );
        Ok(())
    }

    /// Drop the entry for `source`. Returns whether there was one.
    pub fn invalidate(&mut self, source: &Path) -> bool {
        self.entries.remove(source).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn modified(path: &Path) -> std::io::Result<SystemTime> {
    std::fs::metadata(path)?.modified()
}
