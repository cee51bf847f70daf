//! Video-only and audio-only companions split out of a container.
//!
//! The two halves are independent engine jobs, started together and joined
//! separately. Results are remembered in a [`DerivedAssetCache`].

use crate::cache::DerivedAssetCache;
use crate::error::{RenderError, Result};
use crate::job::{Job, StreamKind};
use crate::runner::{JobOutcome, Runner};
use cutlane_core::types::{Asset, AssetKind};
use std::path::{Path, PathBuf};
use std::time::Duration;

fn companion_path(source: &Path, out_dir: &Path, suffix: &str) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "asset".to_string());
    out_dir.join(format!("{stem}.{suffix}"))
}

/// Stream-copy the first video stream into `<stem>.video.mkv`.
pub fn video_job(source: &Path, out_dir: &Path) -> Job {
    let mut job = Job::new(companion_path(source, out_dir, "video.mkv"));
    job.add_input(source, &[]);
    job.map("0:v:0").codec(StreamKind::Video, "copy");
    job
}

/// Decode the first audio stream into `<stem>.audio.wav`.
pub fn audio_job(source: &Path, out_dir: &Path) -> Job {
    let mut job = Job::new(companion_path(source, out_dir, "audio.wav"));
    job.add_input(source, &[]);
    job.map("0:a:0").codec(StreamKind::Audio, "pcm_s16le");
    job
}

fn derived(source: &Asset, outcome: JobOutcome, kind: AssetKind) -> Result<Asset> {
    match outcome {
        JobOutcome::Produced(path) => Ok(Asset::derived_from(source, path, kind)),
        JobOutcome::NotProduced { status } => Err(RenderError::EngineFailed(format!(
            "{kind:?} companion of {} not produced (exit status {status:?})",
            source.path.display()
        ))),
    }
}

/// Split `source` into `(video, audio)` sub-assets written under `out_dir`.
pub async fn split(
    runner: &Runner,
    source: &Asset,
    out_dir: &Path,
    timeout: Duration,
) -> Result<(Asset, Asset)> {
    if !source.path.is_file() {
        return Err(RenderError::FileNotFound(source.path.clone()));
    }
    tokio::fs::create_dir_all(out_dir).await?;

    let video = runner.execute(video_job(&source.path, out_dir), None)?;
    let audio = runner.execute(audio_job(&source.path, out_dir), None)?;
    let (video, audio) = tokio::join!(
        video.wait_for_output(timeout),
        audio.wait_for_output(timeout)
    );

    let video = derived(source, video?, AssetKind::Video)?;
    let audio = derived(source, audio?, AssetKind::Audio)?;
    tracing::info!(source = %source.path.display(), "split companions");
    Ok((video, audio))
}

/// Cached companions for `source`, splitting it on a miss.
pub async fn companions(
    cache: &mut DerivedAssetCache,
    runner: &Runner,
    source: &Asset,
    out_dir: &Path,
    timeout: Duration,
) -> Result<(Asset, Asset)> {
    if let Some(hit) = cache.get(&source.path) {
        return Ok(hit);
    }
    let (video, audio) = split(runner, source, out_dir, timeout).await?;
    cache.insert(&source.path, video.clone(), audio.clone())?;
    Ok((video, audio))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const WAIT: Duration = Duration::from_secs(10);

    fn source(dir: &TempDir) -> Asset {
        let path = dir.path().join("interview.mp4");
        std::fs::write(&path, b"container").unwrap();
        Asset::new(path, AssetKind::Video, 12.0).with_resolution(1920, 1080)
    }

    #[test]
    fn jobs_select_one_stream_each() {
        let video = video_job(Path::new("/media/a.mp4"), Path::new("/cache"));
        assert_eq!(video.output(), Path::new("/cache/a.video.mkv"));
        let args = video.to_args().join(" ");
        assert!(args.ends_with("-i /media/a.mp4 -map 0:v:0 -c:v copy /cache/a.video.mkv"));

        let audio = audio_job(Path::new("/media/a.mp4"), Path::new("/cache"));
        assert_eq!(audio.output(), Path::new("/cache/a.audio.wav"));
        assert!(audio
            .to_args()
            .join(" ")
            .ends_with("-map 0:a:0 -c:a pcm_s16le /cache/a.audio.wav"));
    }

    #[tokio::test]
    async fn missing_source_is_file_not_found() {
        let dir = TempDir::new().unwrap();
        let asset = Asset::new(dir.path().join("gone.mp4"), AssetKind::Video, 1.0);
        let result = split(&Runner::new("/no/engine"), &asset, dir.path(), WAIT).await;
        assert!(matches!(result, Err(RenderError::FileNotFound(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn split_derives_both_halves() {
        use crate::runner::tests::fake_engine;

        let dir = TempDir::new().unwrap();
        let engine = fake_engine(dir.path(), r#"printf 'data' > "$out""#);
        let source = source(&dir);
        let out_dir = dir.path().join("companions");

        let (video, audio) = split(&Runner::new(engine), &source, &out_dir, WAIT)
            .await
            .unwrap();
        assert_eq!(video.kind, AssetKind::Video);
        assert_eq!(audio.kind, AssetKind::Audio);
        assert_eq!(video.parent, Some(source.id));
        assert_eq!(audio.parent, Some(source.id));
        assert_eq!(video.path, out_dir.join("interview.video.mkv"));
        assert_eq!(audio.path, out_dir.join("interview.audio.wav"));
        assert_eq!(video.duration_us, source.duration_us);
        assert_eq!((video.width, video.height), (1920, 1080));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_half_is_engine_failed() {
        use crate::runner::tests::fake_engine;

        let dir = TempDir::new().unwrap();
        let engine = fake_engine(dir.path(), "exit 1");
        let result = split(&Runner::new(engine), &source(&dir), dir.path(), WAIT).await;
        assert!(matches!(result, Err(RenderError::EngineFailed(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn second_request_is_served_from_cache() {
        use crate::runner::tests::fake_engine;

        let dir = TempDir::new().unwrap();
        let engine = fake_engine(dir.path(), r#"printf 'data' > "$out""#);
        let source = source(&dir);
        let out_dir = dir.path().join("companions");
        let mut cache = DerivedAssetCache::new();

        let first = companions(&mut cache, &Runner::new(engine), &source, &out_dir, WAIT)
            .await
            .unwrap();
        // no engine needed on a hit
        let second = companions(&mut cache, &Runner::new("/no/engine"), &source, &out_dir, WAIT)
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
    }
}
