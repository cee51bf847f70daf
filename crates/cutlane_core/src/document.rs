//! On-disk timeline document.
//!
//! Times are stored in seconds so documents stay readable and independent of
//! frame rate; they are snapped back to the nearest frame on load. Links are
//! stored as `(track index, clip index)` references.

use crate::error::{CoreError, Result};
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const EXTENSION: &str = "cutlane";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClipDocument {
    pub source_file: PathBuf,
    pub kind: AssetKind,
    pub start: f64,
    pub in_point: f64,
    pub out_point: f64,
    /// Usable length of the source in seconds.
    pub source_duration: f64,
    /// Container the source was split from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_source: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackDocument {
    pub kind: TrackKind,
    pub clips: Vec<ClipDocument>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClipRef {
    pub track: usize,
    pub clip: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimelineDocument {
    pub name: String,
    pub settings: ProjectSettings,
    pub tracks: Vec<TrackDocument>,
    #[serde(default)]
    pub links: BTreeMap<u32, Vec<ClipRef>>,
}

impl TimelineDocument {
    /// Create an empty document with the given name and settings.
    pub fn new(name: impl Into<String>, settings: ProjectSettings) -> Self {
        Self {
            name: name.into(),
            settings,
            tracks: vec![],
            links: BTreeMap::new(),
        }
    }

    /// Capture a timeline. Track and clip order follow the timeline.
    pub fn from_timeline(
        name: impl Into<String>,
        settings: ProjectSettings,
        timeline: &Timeline,
    ) -> Result<Self> {
        let fr = timeline.frame_rate;
        let mut locations: HashMap<Uuid, ClipRef> = HashMap::new();
        let mut tracks = Vec::with_capacity(timeline.tracks.len());

        for (ti, track) in timeline.tracks.iter().enumerate() {
            let mut clips = Vec::with_capacity(track.clips.len());
            for (ci, clip) in track.clips.iter().enumerate() {
                let asset = timeline.asset(clip.asset_id)?;
                let parent_source = match asset.parent {
                    Some(parent) => Some(timeline.asset(parent)?.path.clone()),
                    None => None,
                };
                clips.push(ClipDocument {
                    source_file: asset.path.clone(),
                    kind: clip.kind,
                    start: fr.seconds(clip.start),
                    in_point: fr.seconds(clip.in_point),
                    out_point: fr.seconds(clip.out_point),
                    source_duration: fr.seconds(timeline.asset_duration(asset.id)?),
                    parent_source,
                });
                locations.insert(clip.id, ClipRef { track: ti, clip: ci });
            }
            tracks.push(TrackDocument {
                kind: track.kind,
                clips,
            });
        }

        let mut links = BTreeMap::new();
        for (gi, group) in timeline.groups.iter().enumerate() {
            let members = group
                .members
                .iter()
                .map(|id| locations.get(id).copied().ok_or(CoreError::ClipNotFound(*id)))
                .collect::<Result<Vec<_>>>()?;
            links.insert(gi as u32, members);
        }

        Ok(Self {
            name: name.into(),
            settings,
            tracks,
            links,
        })
    }

    /// Rebuild a timeline. Clips sharing a source file and kind share one
    /// asset; sub-assets are re-attached to a video asset for their
    /// container. Placement goes through the normal checks, so a document with
    /// overlapping or misplaced clips is rejected.
    pub fn into_timeline(&self) -> Result<Timeline> {
        let fr = self.settings.frame_rate();
        let mut timeline = Timeline::new(fr);
        let mut assets: HashMap<(PathBuf, AssetKind), Uuid> = HashMap::new();
        let mut placed: Vec<Vec<Uuid>> = Vec::with_capacity(self.tracks.len());

        for track_doc in &self.tracks {
            let track_id = timeline.add_track(track_doc.kind);
            let mut ids = Vec::with_capacity(track_doc.clips.len());
            for doc in &track_doc.clips {
                let parent = match &doc.parent_source {
                    Some(container) => Some(intern_asset(
                        &mut timeline,
                        &mut assets,
                        container,
                        AssetKind::Video,
                        doc.source_duration,
                        None,
                    )),
                    None => None,
                };
                let asset_id = intern_asset(
                    &mut timeline,
                    &mut assets,
                    &doc.source_file,
                    doc.kind,
                    doc.source_duration,
                    parent,
                );
                let clip = timeline.clip_for_asset(
                    asset_id,
                    fr.nearest(doc.start),
                    fr.nearest(doc.in_point),
                    fr.nearest(doc.out_point),
                )?;
                ids.push(clip.id);
                timeline.add_clip(track_id, clip)?;
            }
            placed.push(ids);
        }

        for (group, refs) in &self.links {
            let members = refs
                .iter()
                .map(|r| {
                    placed
                        .get(r.track)
                        .and_then(|t| t.get(r.clip))
                        .copied()
                        .ok_or_else(|| {
                            CoreError::InvalidOperation(format!(
                                "link {group} references missing clip {}:{}",
                                r.track, r.clip
                            ))
                        })
                })
                .collect::<Result<Vec<_>>>()?;
            timeline.link_clips(&members)?;
        }

        Ok(timeline)
    }

    /// Save as pretty-printed JSON. Appends the `.cutlane` extension if not
    /// present and returns the path written.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = ensure_extension(path.as_ref());
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;
        tracing::debug!(path = %path.display(), "saved timeline document");
        Ok(path)
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&data)?)
    }
}

/// The asset for `(path, kind)`, added on first use.
fn intern_asset(
    timeline: &mut Timeline,
    assets: &mut HashMap<(PathBuf, AssetKind), Uuid>,
    path: &Path,
    kind: AssetKind,
    duration: f64,
    parent: Option<Uuid>,
) -> Uuid {
    let key = (path.to_path_buf(), kind);
    if let Some(id) = assets.get(&key) {
        return *id;
    }
    let mut asset = Asset::new(path, kind, duration);
    asset.parent = parent;
    let id = timeline.add_asset(asset);
    assets.insert(key, id);
    id
}

/// 1920x1080 30fps preset.
pub fn preset_1080p() -> ProjectSettings {
    ProjectSettings {
        width: 1920,
        height: 1080,
        fps: 30.0,
        sample_rate: 48000,
    }
}

/// 1080x1920 30fps (vertical/shorts) preset.
pub fn preset_shorts() -> ProjectSettings {
    ProjectSettings {
        width: 1080,
        height: 1920,
        ..preset_1080p()
    }
}

/// 1280x720 30fps preset.
pub fn preset_720p() -> ProjectSettings {
    ProjectSettings {
        width: 1280,
        height: 720,
        ..preset_1080p()
    }
}

/// 3840x2160 30fps preset.
pub fn preset_4k() -> ProjectSettings {
    ProjectSettings {
        width: 3840,
        height: 2160,
        ..preset_1080p()
    }
}

/// 1920x1080 60fps preset.
pub fn preset_1080p_60() -> ProjectSettings {
    ProjectSettings {
        fps: 60.0,
        ..preset_1080p()
    }
}

/// Look a preset up by the name used on the command line.
pub fn preset(name: &str) -> Option<ProjectSettings> {
    match name {
        "1080p" => Some(preset_1080p()),
        "shorts" => Some(preset_shorts()),
        "720p" => Some(preset_720p()),
        "4k" => Some(preset_4k()),
        "1080p60" => Some(preset_1080p_60()),
        _ => None,
    }
}

fn ensure_extension(path: &Path) -> PathBuf {
    if path.extension().and_then(|e| e.to_str()) == Some(EXTENSION) {
        path.to_path_buf()
    } else {
        let mut p = path.to_path_buf();
        let mut name = p.file_name().unwrap_or_default().to_os_string();
        name.push(".");
        name.push(EXTENSION);
        p.set_file_name(name);
        p
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn populated() -> Timeline {
        let mut tl = Timeline::new(FrameRate(30.0));
        let video = tl.add_track(TrackKind::Video);
        let audio = tl.add_track(TrackKind::Audio);
        let movie = tl.add_asset(Asset::new("/media/clip.mp4", AssetKind::Video, 10.0));
        let sound = tl.add_asset(Asset::new("/media/clip.wav", AssetKind::Audio, 10.0));

        let v = tl.new_clip(movie, 0.1, 0.5, 4.0).unwrap();
        let a = tl.new_clip(sound, 0.1, 0.5, 4.0).unwrap();
        let tail = tl.new_clip(movie, 5.0, 6.0, 8.0).unwrap();
        let (v_id, a_id) = (v.id, a.id);
        tl.add_clip(video, v).unwrap();
        tl.add_clip(audio, a).unwrap();
        tl.add_clip(video, tail).unwrap();
        tl.link_clips(&[v_id, a_id]).unwrap();
        tl
    }

    #[test]
    fn save_load_roundtrip_preserves_geometry_and_links() {
        let dir = TempDir::new().unwrap();
        let original = populated();
        let doc = TimelineDocument::from_timeline("Populated", preset_1080p(), &original).unwrap();
        let path = doc.save_to_file(dir.path().join("populated.cutlane")).unwrap();

        let loaded = TimelineDocument::load_from_file(&path).unwrap();
        assert_eq!(loaded, doc);

        let rebuilt = loaded.into_timeline().unwrap();
        assert_eq!(rebuilt.tracks.len(), 2);
        assert_eq!(rebuilt.assets.len(), 2);
        for (a, b) in original.tracks.iter().zip(&rebuilt.tracks) {
            let geom = |t: &Track| {
                t.clips
                    .iter()
                    .map(|c| (c.start, c.in_point, c.out_point, c.kind))
                    .collect::<Vec<_>>()
            };
            assert_eq!(geom(a), geom(b));
        }

        assert_eq!(rebuilt.groups.len(), 1);
        let members = &rebuilt.groups[0].members;
        assert_eq!(members.len(), 2);
        assert_eq!(rebuilt.track_of(members[0]).unwrap(), rebuilt.tracks[0].id);
        assert_eq!(rebuilt.track_of(members[1]).unwrap(), rebuilt.tracks[1].id);
    }

    #[test]
    fn sub_asset_keeps_its_container_across_save_and_load() {
        let dir = TempDir::new().unwrap();
        let mut tl = Timeline::new(FrameRate(30.0));
        let audio = tl.add_track(TrackKind::Audio);
        let container = Asset::new("/media/interview.mp4", AssetKind::Video, 12.0);
        // the extracted track reports no usable length of its own
        let mut extracted =
            Asset::derived_from(&container, "/cache/interview.audio.wav", AssetKind::Audio);
        extracted.duration_us = TimeUs::ZERO;
        tl.add_asset(container);
        let extracted = tl.add_asset(extracted);
        let clip = tl.new_clip(extracted, 0.0, 1.0, 11.0).unwrap();
        tl.add_clip(audio, clip).unwrap();

        let doc = TimelineDocument::from_timeline("split", preset_1080p(), &tl).unwrap();
        assert_eq!(
            doc.tracks[0].clips[0].parent_source.as_deref(),
            Some(Path::new("/media/interview.mp4"))
        );
        let path = doc.save_to_file(dir.path().join("split")).unwrap();
        let rebuilt = TimelineDocument::load_from_file(&path)
            .unwrap()
            .into_timeline()
            .unwrap();

        let clip = &rebuilt.tracks[0].clips[0];
        let asset = rebuilt.asset(clip.asset_id).unwrap();
        let parent = rebuilt.asset(asset.parent.unwrap()).unwrap();
        assert_eq!(parent.path, PathBuf::from("/media/interview.mp4"));
        assert_eq!(rebuilt.asset_duration(asset.id).unwrap(), Frames(360));
        assert_eq!(clip.out_point, Frames(330));
    }

    #[test]
    fn documents_without_parent_source_still_load() {
        let json = r#"{"name":"old","settings":{"width":1280,"height":720,"fps":30.0,"sample_rate":48000},
            "tracks":[{"kind":"Video","clips":[{"source_file":"/media/x.mp4","kind":"Video",
            "start":0.0,"in_point":0.0,"out_point":2.0,"source_duration":5.0}]}]}"#;
        let doc: TimelineDocument = serde_json::from_str(json).unwrap();
        assert_eq!(doc.tracks[0].clips[0].parent_source, None);
        let tl = doc.into_timeline().unwrap();
        assert_eq!(tl.assets[0].parent, None);
    }

    #[test]
    fn links_reference_track_and_clip_indices() {
        let doc = TimelineDocument::from_timeline("t", preset_1080p(), &populated()).unwrap();
        assert_eq!(
            doc.links[&0],
            vec![ClipRef { track: 0, clip: 0 }, ClipRef { track: 1, clip: 0 }]
        );
    }

    #[test]
    fn dangling_link_is_rejected() {
        let mut doc = TimelineDocument::from_timeline("t", preset_1080p(), &populated()).unwrap();
        doc.links
            .insert(7, vec![ClipRef { track: 0, clip: 1 }, ClipRef { track: 4, clip: 0 }]);
        assert!(matches!(
            doc.into_timeline(),
            Err(CoreError::InvalidOperation(_))
        ));
    }

    #[test]
    fn overlapping_document_is_rejected() {
        let mut doc = TimelineDocument::new("bad", preset_720p());
        let clip = ClipDocument {
            source_file: "/media/x.mp4".into(),
            kind: AssetKind::Video,
            start: 0.0,
            in_point: 0.0,
            out_point: 3.0,
            source_duration: 5.0,
            parent_source: None,
        };
        let mut second = clip.clone();
        second.start = 1.0;
        doc.tracks.push(TrackDocument {
            kind: TrackKind::Video,
            clips: vec![clip, second],
        });
        assert!(matches!(
            doc.into_timeline(),
            Err(CoreError::OverlapDetected)
        ));
    }

    #[test]
    fn load_nonexistent_file_returns_error() {
        let result = TimelineDocument::load_from_file("/tmp/does_not_exist_cutlane_test.cutlane");
        assert!(matches!(result, Err(CoreError::Io(_))));
    }

    #[test]
    fn extension_appended_if_missing() {
        let dir = TempDir::new().unwrap();
        let doc = TimelineDocument::new("ExtTest", preset_720p());
        let written = doc.save_to_file(dir.path().join("no_ext")).unwrap();

        let expected = dir.path().join("no_ext.cutlane");
        assert_eq!(written, expected);
        assert!(expected.exists());
        assert_eq!(TimelineDocument::load_from_file(&expected).unwrap(), doc);
    }

    #[test]
    fn preset_values_are_correct() {
        let shorts = preset_shorts();
        assert_eq!((shorts.width, shorts.height, shorts.fps), (1080, 1920, 30.0));

        let p4k = preset_4k();
        assert_eq!((p4k.width, p4k.height), (3840, 2160));

        let p60 = preset_1080p_60();
        assert_eq!((p60.width, p60.height, p60.fps), (1920, 1080, 60.0));
        assert_eq!(p60.sample_rate, 48000);

        assert_eq!(preset("720p"), Some(preset_720p()));
        assert_eq!(preset("8k"), None);
    }
}
