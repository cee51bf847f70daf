use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

/// A whole number of frames at the owning timeline's frame rate.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct Frames(pub i64);

impl Frames {
    pub const ZERO: Self = Self(0);

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }
}

impl Add for Frames {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Frames {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl Neg for Frames {
    type Output = Self;
    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl AddAssign for Frames {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Frames {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

// ---------------------------------------------------------------------------
// FrameRate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FrameRate(pub f64);

impl FrameRate {
    /// Snap a position in seconds down to the frame grid.
    pub fn quantize(&self, seconds: f64) -> Frames {
        Frames((seconds * self.0).floor() as i64)
    }

    /// Nearest frame, for values that are already on the grid but went
    /// through a lossy seconds representation (documents, user input).
    pub fn nearest(&self, seconds: f64) -> Frames {
        Frames((seconds * self.0).round() as i64)
    }

    pub fn seconds(&self, frames: Frames) -> f64 {
        frames.0 as f64 / self.0
    }

    pub fn to_time_us(&self, frames: Frames) -> TimeUs {
        TimeUs::from_seconds(self.seconds(frames))
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self(30.0)
    }
}

// ---------------------------------------------------------------------------
// TimeUs
// ---------------------------------------------------------------------------

/// Wall-clock duration in microseconds, used where the engine reports time.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct TimeUs(pub i64);

impl TimeUs {
    pub const ZERO: Self = Self(0);

    pub fn from_seconds(s: f64) -> Self {
        Self((s * 1_000_000.0).round() as i64)
    }

    pub fn as_seconds(&self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }
}

impl Add for TimeUs {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for TimeUs {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl fmt::Display for TimeUs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total_us = self.0.unsigned_abs();
        let total_ms = total_us / 1_000;
        let ms = total_ms % 1_000;
        let total_secs = total_ms / 1_000;
        let secs = total_secs % 60;
        let total_mins = total_secs / 60;
        let mins = total_mins % 60;
        let hours = total_mins / 60;
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{sign}{:02}:{:02}:{:02}.{:03}", hours, mins, secs, ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTimeError(pub String);

impl fmt::Display for ParseTimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid timestamp: {}", self.0)
    }
}

impl std::error::Error for ParseTimeError {}

impl FromStr for TimeUs {
    type Err = ParseTimeError;

    /// Parses `HH:MM:SS[.fraction]`. The fraction may carry any number of
    /// digits; anything past microseconds is dropped.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseTimeError(s.to_string());
        let mut parts = s.trim().split(':');
        let (Some(h), Some(m), Some(rest), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(err());
        };
        let hours: i64 = h.parse().map_err(|_| err())?;
        let mins: i64 = m.parse().map_err(|_| err())?;
        let (secs, frac) = rest.split_once('.').unwrap_or((rest, ""));
        let secs: i64 = secs.parse().map_err(|_| err())?;
        if mins >= 60 || secs >= 60 || !frac.chars().all(|c| c.is_ascii_digit()) {
            return Err(err());
        }
        let micros = frac
            .chars()
            .chain(std::iter::repeat('0'))
            .take(6)
            .fold(0i64, |acc, c| acc * 10 + i64::from(c as u8 - b'0'));
        Ok(Self(((hours * 60 + mins) * 60 + secs) * 1_000_000 + micros))
    }
}

// ---------------------------------------------------------------------------
// AssetKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Video,
    Audio,
    Image,
}

impl AssetKind {
    /// Whether clips of this kind land on the video overlay stack.
    pub fn is_visual(&self) -> bool {
        matches!(self, AssetKind::Video | AssetKind::Image)
    }

    /// Stream selector used when wiring an input into the filter graph.
    pub fn stream_selector(&self) -> &'static str {
        match self {
            AssetKind::Video | AssetKind::Image => "v",
            AssetKind::Audio => "a",
        }
    }
}

// ---------------------------------------------------------------------------
// Asset
// ---------------------------------------------------------------------------

/// A probed media source. Many clips may reference the same asset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Asset {
    pub id: Uuid,
    pub name: String,
    pub path: PathBuf,
    pub kind: AssetKind,
    pub duration_us: TimeUs,
    pub width: u32,
    pub height: u32,
    /// Container this asset was split from; timing is inherited from it.
    pub parent: Option<Uuid>,
}

impl Asset {
    pub fn new(path: impl Into<PathBuf>, kind: AssetKind, duration_seconds: f64) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unknown".to_string());
        Self {
            id: Uuid::new_v4(),
            name,
            path,
            kind,
            duration_us: TimeUs::from_seconds(duration_seconds),
            width: 0,
            height: 0,
            parent: None,
        }
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// A sub-asset of `parent` backed by `path` (e.g. its extracted audio).
    pub fn derived_from(parent: &Asset, path: impl Into<PathBuf>, kind: AssetKind) -> Self {
        let mut asset = Asset::new(path, kind, parent.duration_us.as_seconds());
        asset.width = parent.width;
        asset.height = parent.height;
        asset.parent = Some(parent.id);
        asset
    }

    pub fn source_file(&self) -> &Path {
        &self.path
    }
}

// ---------------------------------------------------------------------------
// TrackKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
    Effect,
}

impl TrackKind {
    pub fn accepts(&self, kind: AssetKind) -> bool {
        match self {
            TrackKind::Video => kind.is_visual(),
            TrackKind::Audio => kind == AssetKind::Audio,
            TrackKind::Effect => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Clip
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Clip {
    pub id: Uuid,
    pub asset_id: Uuid,
    pub kind: AssetKind,
    pub start: Frames,
    pub in_point: Frames,
    pub out_point: Frames,
    /// Uncommitted drag-preview displacement.
    #[serde(skip)]
    pub timeshift: Frames,
    pub group: Option<Uuid>,
}

impl Clip {
    pub fn duration(&self) -> Frames {
        self.out_point - self.in_point
    }

    pub fn end(&self) -> Frames {
        self.start + self.duration()
    }

    /// Start as currently displayed, including any drag-preview shift.
    pub fn shifted_start(&self) -> Frames {
        self.start + self.timeshift
    }

    pub fn overlaps(&self, start: Frames, end: Frames) -> bool {
        self.start < end && start < self.end()
    }
}

// ---------------------------------------------------------------------------
// Track
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Track {
    pub id: Uuid,
    pub kind: TrackKind,
    /// Kept sorted by start.
    pub clips: Vec<Clip>,
}

impl Track {
    pub fn new(kind: TrackKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            clips: vec![],
        }
    }

    pub(crate) fn sort_clips(&mut self) {
        self.clips.sort_by_key(|c| (c.start, c.end()));
    }
}

// ---------------------------------------------------------------------------
// LinkedGroup
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GroupState {
    #[default]
    Idle,
    Propagating,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkedGroup {
    pub id: Uuid,
    pub members: Vec<Uuid>,
    #[serde(skip)]
    pub state: GroupState,
}

// ---------------------------------------------------------------------------
// Timeline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Timeline {
    pub frame_rate: FrameRate,
    pub assets: Vec<Asset>,
    /// Index order is layer order: later tracks composite on top.
    pub tracks: Vec<Track>,
    pub groups: Vec<LinkedGroup>,
}

// ---------------------------------------------------------------------------
// ProjectSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectSettings {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub sample_rate: u32,
}

impl ProjectSettings {
    pub fn frame_rate(&self) -> FrameRate {
        FrameRate(self.fps)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_arithmetic() {
        let a = Frames(50);
        let b = Frames(30);
        assert_eq!(a + b, Frames(80));
        assert_eq!(a - b, Frames(20));
        assert_eq!(-b, Frames(-30));
        let mut c = a;
        c += b;
        c -= Frames(5);
        assert_eq!(c, Frames(75));
    }

    #[test]
    fn quantize_floors_to_frame_grid() {
        let fps = FrameRate(30.0);
        for t in [0.0, 0.01, 1.234, 2.5, 3.999, 17.3, -0.5, -1.01] {
            let stored = fps.seconds(fps.quantize(t));
            assert_eq!(stored, (t * 30.0_f64).floor() / 30.0, "t = {t}");
        }
    }

    #[test]
    fn nearest_recovers_grid_values() {
        let fps = FrameRate(30.0);
        for f in 0..300 {
            let s = fps.seconds(Frames(f));
            assert_eq!(fps.nearest(s), Frames(f));
        }
    }

    #[test]
    fn time_us_display() {
        assert_eq!(TimeUs(0).to_string(), "00:00:00.000");
        assert_eq!(TimeUs(1_500_000).to_string(), "00:00:01.500");
        assert_eq!(TimeUs::from_seconds(3661.5).to_string(), "01:01:01.500");
        assert_eq!(TimeUs(-2_000_000).to_string(), "-00:00:02.000");
    }

    #[test]
    fn time_us_parse() {
        assert_eq!("00:01:02.05".parse::<TimeUs>().unwrap(), TimeUs(62_050_000));
        assert_eq!("01:00:00".parse::<TimeUs>().unwrap(), TimeUs(3_600_000_000));
        assert_eq!(
            "00:00:05.000000000".parse::<TimeUs>().unwrap(),
            TimeUs(5_000_000)
        );
        assert_eq!(
            "00:00:01.1234567".parse::<TimeUs>().unwrap(),
            TimeUs(1_123_456)
        );
    }

    #[test]
    fn time_us_parse_rejects_garbage() {
        assert!("invalid".parse::<TimeUs>().is_err());
        assert!("00:00".parse::<TimeUs>().is_err());
        assert!("00:61:00.00".parse::<TimeUs>().is_err());
        assert!("00:00:01.x".parse::<TimeUs>().is_err());
        assert!("N/A".parse::<TimeUs>().is_err());
    }

    #[test]
    fn track_kind_compatibility() {
        assert!(TrackKind::Video.accepts(AssetKind::Video));
        assert!(TrackKind::Video.accepts(AssetKind::Image));
        assert!(!TrackKind::Video.accepts(AssetKind::Audio));
        assert!(TrackKind::Audio.accepts(AssetKind::Audio));
        assert!(!TrackKind::Audio.accepts(AssetKind::Video));
        assert!(!TrackKind::Effect.accepts(AssetKind::Image));
    }

    #[test]
    fn stream_selectors() {
        assert_eq!(AssetKind::Video.stream_selector(), "v");
        assert_eq!(AssetKind::Image.stream_selector(), "v");
        assert_eq!(AssetKind::Audio.stream_selector(), "a");
    }

    #[test]
    fn clip_derived_extent() {
        let clip = Clip {
            id: Uuid::new_v4(),
            asset_id: Uuid::new_v4(),
            kind: AssetKind::Video,
            start: Frames(60),
            in_point: Frames(30),
            out_point: Frames(120),
            timeshift: Frames(15),
            group: None,
        };
        assert_eq!(clip.duration(), Frames(90));
        assert_eq!(clip.end(), Frames(150));
        assert_eq!(clip.shifted_start(), Frames(75));
        assert!(clip.overlaps(Frames(149), Frames(200)));
        assert!(!clip.overlaps(Frames(150), Frames(200)));
        assert!(!clip.overlaps(Frames(0), Frames(60)));
    }

    #[test]
    fn derived_asset_inherits_parent() {
        let parent = Asset::new("/media/take1.mov", AssetKind::Video, 12.0).with_resolution(1920, 1080);
        let audio = Asset::derived_from(&parent, "/cache/take1.wav", AssetKind::Audio);
        assert_eq!(audio.parent, Some(parent.id));
        assert_eq!(audio.duration_us, parent.duration_us);
        assert_eq!(audio.name, "take1.wav");
    }

    #[test]
    fn timeshift_is_not_persisted() {
        let clip = Clip {
            id: Uuid::new_v4(),
            asset_id: Uuid::new_v4(),
            kind: AssetKind::Audio,
            start: Frames(0),
            in_point: Frames(0),
            out_point: Frames(10),
            timeshift: Frames(99),
            group: None,
        };
        let json = serde_json::to_string(&clip).unwrap();
        let back: Clip = serde_json::from_str(&json).unwrap();
        assert_eq!(back.timeshift, Frames::ZERO);
        assert_eq!(back.start, clip.start);
    }
}
