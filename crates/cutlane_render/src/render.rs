use crate::config::RenderConfig;
use crate::error::{RenderError, Result};
use crate::graph::{FilterGraph, FilterNode, FilterOp, LabelAllocator};
use crate::job::{Job, StreamKind};
use cutlane_core::types::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamSelection {
    #[default]
    Both,
    VideoOnly,
    AudioOnly,
}

impl StreamSelection {
    pub fn video(self) -> bool {
        self != StreamSelection::AudioOnly
    }

    pub fn audio(self) -> bool {
        self != StreamSelection::VideoOnly
    }
}

/// What to render: a window of the timeline, at a raster and rate.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    /// Window start, on the timeline's frame grid.
    pub start: Frames,
    pub duration: Frames,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub sample_rate: u32,
    pub streams: StreamSelection,
    pub output: PathBuf,
}

impl RenderRequest {
    /// Full export: the window `[0, total duration)`.
    pub fn export(timeline: &Timeline, settings: &ProjectSettings, output: impl Into<PathBuf>) -> Self {
        Self {
            start: Frames::ZERO,
            duration: timeline.total_duration(),
            width: settings.width,
            height: settings.height,
            fps: settings.fps,
            sample_rate: settings.sample_rate,
            streams: StreamSelection::Both,
            output: output.into(),
        }
    }

    /// Restrict to `[start, start + duration)` seconds.
    pub fn with_window(mut self, frame_rate: FrameRate, start: f64, duration: f64) -> Self {
        self.start = frame_rate.quantize(start);
        self.duration = frame_rate.quantize(duration);
        self
    }

    pub fn with_streams(mut self, streams: StreamSelection) -> Self {
        self.streams = streams;
        self
    }
}

/// A clip intersecting the render window.
struct Layer<'a> {
    track: usize,
    clip: &'a Clip,
    asset: &'a Asset,
}

/// Clips intersecting `[start, end)`, highest track first and by start
/// within a track.
fn layers(timeline: &Timeline, start: Frames, end: Frames) -> Result<Vec<Layer<'_>>> {
    let mut layers = Vec::new();
    for (track, t) in timeline.tracks.iter().enumerate().rev() {
        for clip in &t.clips {
            if clip.duration().is_positive() && clip.overlaps(start, end) {
                layers.push(Layer {
                    track,
                    clip,
                    asset: timeline.asset(clip.asset_id)?,
                });
            }
        }
    }
    Ok(layers)
}

/// Offset of a clip into the window, and the in-point it plays from once
/// the part before the window is cut away.
fn clamp_to_window(clip: &Clip, window_start: Frames) -> (Frames, Frames) {
    let offset = (clip.start - window_start).max(Frames::ZERO);
    let skipped = (window_start - clip.start).max(Frames::ZERO);
    (offset, clip.in_point + skipped)
}

fn register_input(job: &mut Job, layer: &Layer<'_>) -> usize {
    let options: &[&str] = match layer.clip.kind {
        AssetKind::Image => &["-loop", "1"],
        AssetKind::Video | AssetKind::Audio => &[],
    };
    job.add_input(&layer.asset.path, options)
}

struct Builder<'r> {
    request: &'r RenderRequest,
    fr: FrameRate,
    job: Job,
    graph: FilterGraph,
    labels: LabelAllocator,
}

impl Builder<'_> {
    fn secs(&self, frames: Frames) -> f64 {
        self.fr.seconds(frames)
    }

    /// Base canvas plus trim, shift, fit and overlay per clip. Returns the
    /// final composite label.
    fn video_stack(&mut self, clips: &[&Layer<'_>]) -> String {
        let (w, h) = (self.request.width, self.request.height);
        let base = self.labels.next("base");
        self.graph.push(
            FilterNode::new()
                .filter(
                    FilterOp::new("color")
                        .arg("c", "black")
                        .arg("s", format!("{w}x{h}"))
                        .arg("r", self.request.fps)
                        .arg("d", self.secs(self.request.duration)),
                )
                .output(&base),
        );

        let mut current = base;
        for layer in clips {
            let idx = register_input(&mut self.job, layer);
            let (offset, in_point) = clamp_to_window(layer.clip, self.request.start);

            let trimmed = self.labels.next("trim");
            self.graph.push(
                FilterNode::new()
                    .input(format!("{idx}:{}", layer.clip.kind.stream_selector()))
                    .filter(
                        FilterOp::new("trim")
                            .arg("start", self.secs(in_point))
                            .arg("end", self.secs(layer.clip.out_point)),
                    )
                    .output(&trimmed),
            );

            let shifted = self.labels.next("pts");
            self.graph.push(
                FilterNode::new()
                    .input(&trimmed)
                    .filter(
                        FilterOp::new("setpts")
                            .positional(format!("PTS-STARTPTS+{}/TB", self.secs(offset))),
                    )
                    .output(&shifted),
            );

            let fitted = self.labels.next("fit");
            self.graph.push(
                FilterNode::new()
                    .input(&shifted)
                    .filter(
                        FilterOp::new("scale")
                            .positional(w)
                            .positional(h)
                            .arg("force_original_aspect_ratio", "increase"),
                    )
                    .output(&fitted),
            );

            let composite = self.labels.next("comp");
            self.graph.push(
                FilterNode::new()
                    .input(&current)
                    .input(&fitted)
                    .filter(
                        FilterOp::new("overlay")
                            .arg("x", "(main_w-overlay_w)/2")
                            .arg("y", "(main_h-overlay_h)/2")
                            .arg("eof_action", "pass"),
                    )
                    .output(&composite),
            );
            current = composite;
        }
        current
    }

    /// Silent bed plus trim, reset and optional delay per clip, mixed down.
    /// Returns the final audio label.
    fn audio_bus(&mut self, clips: &[&Layer<'_>]) -> String {
        let silence = self.labels.next("silence");
        self.graph.push(
            FilterNode::new()
                .filter(
                    FilterOp::new("anullsrc")
                        .arg("channel_layout", "stereo")
                        .arg("sample_rate", self.request.sample_rate),
                )
                .filter(FilterOp::new("atrim").arg("duration", self.secs(self.request.duration)))
                .output(&silence),
        );
        if clips.is_empty() {
            return silence;
        }

        let mut contributions = vec![silence];
        for layer in clips {
            let idx = register_input(&mut self.job, layer);
            let (offset, in_point) = clamp_to_window(layer.clip, self.request.start);

            let trimmed = self.labels.next("atrim");
            self.graph.push(
                FilterNode::new()
                    .input(format!("{idx}:{}", layer.clip.kind.stream_selector()))
                    .filter(
                        FilterOp::new("atrim")
                            .arg("start", self.secs(in_point))
                            .arg("end", self.secs(layer.clip.out_point)),
                    )
                    .output(&trimmed),
            );

            let reset = self.labels.next("apts");
            self.graph.push(
                FilterNode::new()
                    .input(&trimmed)
                    .filter(FilterOp::new("asetpts").positional("PTS-STARTPTS"))
                    .output(&reset),
            );

            if offset.is_positive() {
                let ms = (self.secs(offset) * 1000.0).round() as i64;
                let delayed = self.labels.next("adelay");
                self.graph.push(
                    FilterNode::new()
                        .input(&reset)
                        .filter(FilterOp::new("adelay").arg("delays", ms).arg("all", 1))
                        .output(&delayed),
                );
                contributions.push(delayed);
            } else {
                contributions.push(reset);
            }
        }

        let mixed = self.labels.next("mix");
        let mut node = FilterNode::new();
        for label in &contributions {
            node = node.input(label);
        }
        self.graph.push(
            node.filter(
                FilterOp::new("amix")
                    .arg("inputs", contributions.len())
                    .arg("duration", "longest")
                    .arg("normalize", 0),
            )
            .filter(FilterOp::new("volume").positional("1.0"))
            .output(&mixed),
        );
        mixed
    }
}

/// Compile a window of the timeline into an engine job.
pub fn compile(timeline: &Timeline, request: &RenderRequest, config: &RenderConfig) -> Result<Job> {
    if !request.duration.is_positive() {
        return Err(RenderError::EmptyWindow);
    }

    let layers = layers(timeline, request.start, request.start + request.duration)?;
    let mut b = Builder {
        request,
        fr: timeline.frame_rate,
        job: Job::new(&request.output),
        graph: FilterGraph::new(),
        labels: LabelAllocator::new(),
    };

    if request.streams.video() {
        // The overlay stack consumes the layer list track-reversed, so the
        // highest track is composited last.
        let mut visual: Vec<&Layer<'_>> = layers.iter().filter(|l| l.clip.kind.is_visual()).collect();
        visual.sort_by_key(|l| (l.track, l.clip.start));
        let out = b.video_stack(&visual);

        b.job.map(format!("[{out}]")).codec(StreamKind::Video, &config.video_codec);
        match &config.video_bitrate {
            Some(rate) => b.job.bitrate(StreamKind::Video, rate),
            None => b.job.global_option(["-crf".to_string(), config.crf.to_string()]),
        };
        b.job
            .global_option(["-pix_fmt", "yuv420p"])
            .global_option(["-r".to_string(), request.fps.to_string()]);
    }

    if request.streams.audio() {
        let audible: Vec<&Layer<'_>> = layers
            .iter()
            .filter(|l| l.clip.kind == AssetKind::Audio)
            .collect();
        let out = b.audio_bus(&audible);

        b.job.map(format!("[{out}]")).codec(StreamKind::Audio, &config.audio_codec);
        if let Some(rate) = &config.audio_bitrate {
            b.job.bitrate(StreamKind::Audio, rate);
        }
        b.job
            .global_option(["-ar".to_string(), request.sample_rate.to_string()]);
    }

    let Builder {
        fr, mut job, graph, ..
    } = b;
    tracing::debug!(
        inputs = job.inputs().len(),
        nodes = graph.len(),
        "compiled render job"
    );
    job.set_graph(graph)
        .set_duration(fr.to_time_us(request.duration));
    Ok(job)
}

/// A preview job and the temporary file it renders into. The file is
/// removed when `output` is dropped.
#[derive(Debug)]
pub struct PreviewJob {
    pub job: Job,
    pub output: tempfile::TempPath,
}

/// Compile a bounded, scaled-down preview of `[start, start + duration)`
/// seconds. Quality scales the raster only, never time.
pub fn render_preview(
    timeline: &Timeline,
    settings: &ProjectSettings,
    start: f64,
    duration: f64,
    quality: f64,
    config: &RenderConfig,
) -> Result<PreviewJob> {
    let output = tempfile::Builder::new()
        .prefix("cutlane-preview-")
        .suffix(".mp4")
        .tempfile()
        .map_err(|e| {
            tracing::error!(error = %e, "failed to create preview file");
            RenderError::Io(e)
        })?
        .into_temp_path();

    let quality = quality.min(1.0);
    let request = RenderRequest {
        width: scale_even(settings.width, quality),
        height: scale_even(settings.height, quality),
        ..RenderRequest::export(timeline, settings, output.to_path_buf())
    }
    .with_window(timeline.frame_rate, start, duration);

    let job = compile(timeline, &request, config)?;
    Ok(PreviewJob { job, output })
}

/// Scale a raster dimension, rounded down to even, at least 2.
fn scale_even(dim: u32, quality: f64) -> u32 {
    let scaled = (dim as f64 * quality).floor().max(0.0) as u32;
    (scaled & !1).max(2)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
