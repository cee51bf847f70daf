use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand, ValueEnum};
use cutlane_core::document::TimelineDocument;
use cutlane_core::types::{Asset, AssetKind, Timeline};
use cutlane_render::companion;
use cutlane_render::config::RenderConfig;
use cutlane_render::render::{self, RenderRequest, StreamSelection};
use cutlane_render::runner::{JobHandle, JobOutcome, Runner};

#[derive(Parser, Debug)]
#[command(name = "cutlane", version)]
struct Cli {
    #[command(flatten)]
    engine: EngineArgs,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Args, Debug)]
struct EngineArgs {
    /// Render configuration JSON.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Engine binary, overriding the configuration.
    #[arg(long, global = true)]
    engine: Option<PathBuf>,

    /// Seconds to wait for a job to finish.
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Print progress snapshots as JSON lines on stdout.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a timeline document to a file.
    Export(ExportArgs),
    /// Render a scaled-down window of a timeline document.
    Preview(PreviewArgs),
    /// Split a container into video-only and audio-only companions.
    Split(SplitArgs),
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum Streams {
    #[default]
    Both,
    Video,
    Audio,
}

impl From<Streams> for StreamSelection {
    fn from(s: Streams) -> Self {
        match s {
            Streams::Both => StreamSelection::Both,
            Streams::Video => StreamSelection::VideoOnly,
            Streams::Audio => StreamSelection::AudioOnly,
        }
    }
}

#[derive(Parser, Debug)]
struct ExportArgs {
    /// Input timeline document.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output media path.
    #[arg(long)]
    out: PathBuf,

    /// Window start in seconds.
    #[arg(long)]
    start: Option<f64>,

    /// Window length in seconds. Defaults to the rest of the timeline.
    #[arg(long)]
    duration: Option<f64>,

    #[arg(long, value_enum, default_value_t = Streams::Both)]
    streams: Streams,
}

#[derive(Parser, Debug)]
struct PreviewArgs {
    /// Input timeline document.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Window start in seconds.
    #[arg(long, default_value_t = 0.0)]
    start: f64,

    /// Window length in seconds.
    #[arg(long, default_value_t = 5.0)]
    duration: f64,

    /// Raster scale in (0, 1]. Defaults to the configured preview quality.
    #[arg(long)]
    quality: Option<f64>,

    /// Copy the preview here instead of keeping the temporary file.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct SplitArgs {
    /// Source container.
    source: PathBuf,

    /// Directory for the companion files.
    #[arg(long)]
    out_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.engine)?;
    let json = cli.engine.json;
    match cli.cmd {
        Command::Export(args) => cmd_export(args, &config, json).await,
        Command::Preview(args) => cmd_preview(args, &config, json).await,
        Command::Split(args) => cmd_split(args, &config).await,
    }
}

fn load_config(args: &EngineArgs) -> anyhow::Result<RenderConfig> {
    let mut config = match &args.config {
        Some(path) => RenderConfig::load_from_file(path)
            .with_context(|| format!("load config '{}'", path.display()))?,
        None => RenderConfig::default(),
    };
    if let Some(engine) = &args.engine {
        config.engine_path = Some(engine.clone());
    }
    if let Some(secs) = args.timeout {
        config.wait_timeout_secs = secs;
    }
    Ok(config)
}

fn load_document(path: &Path) -> anyhow::Result<(TimelineDocument, Timeline)> {
    let doc = TimelineDocument::load_from_file(path)
        .with_context(|| format!("read timeline '{}'", path.display()))?;
    let timeline = doc
        .into_timeline()
        .with_context(|| format!("rebuild timeline '{}'", path.display()))?;
    Ok((doc, timeline))
}

async fn cmd_export(args: ExportArgs, config: &RenderConfig, json: bool) -> anyhow::Result<()> {
    let (doc, timeline) = load_document(&args.in_path)?;
    let mut request = RenderRequest::export(&timeline, &doc.settings, &args.out)
        .with_streams(args.streams.into());
    if args.start.is_some() || args.duration.is_some() {
        let fr = timeline.frame_rate;
        let start = args.start.unwrap_or(0.0);
        let duration = args
            .duration
            .unwrap_or_else(|| fr.seconds(timeline.total_duration()) - start);
        request = request.with_window(fr, start, duration);
    }

    let job = render::compile(&timeline, &request, config).context("compile render job")?;
    let runner = Runner::from_config(config)?;
    let handle = runner.execute(job, None)?;
    let path = finish(handle, config.wait_timeout(), json).await?;

    eprintln!("wrote {}", path.display());
    Ok(())
}

async fn cmd_preview(args: PreviewArgs, config: &RenderConfig, json: bool) -> anyhow::Result<()> {
    let (doc, timeline) = load_document(&args.in_path)?;
    let quality = args.quality.unwrap_or(config.preview_quality);
    let preview = render::render_preview(
        &timeline,
        &doc.settings,
        args.start,
        args.duration,
        quality,
        config,
    )
    .context("compile preview job")?;

    let runner = Runner::from_config(config)?;
    let handle = runner.execute(preview.job, None)?;
    finish(handle, config.wait_timeout(), json).await?;

    let written = match args.out {
        Some(out) => {
            std::fs::copy(&preview.output, &out)
                .with_context(|| format!("copy preview to '{}'", out.display()))?;
            out
        }
        None => preview.output.keep().context("keep preview file")?,
    };
    eprintln!("wrote {}", written.display());
    Ok(())
}

async fn cmd_split(args: SplitArgs, config: &RenderConfig) -> anyhow::Result<()> {
    let source = Asset::new(&args.source, AssetKind::Video, 0.0);
    let runner = Runner::from_config(config)?;
    let (video, audio) = companion::split(&runner, &source, &args.out_dir, config.wait_timeout())
        .await
        .with_context(|| format!("split '{}'", args.source.display()))?;

    println!("{}", serde_json::to_string_pretty(&[video, audio])?);
    Ok(())
}

/// Report progress until the job settles, then return its output.
async fn finish(handle: JobHandle, timeout: Duration, json: bool) -> anyhow::Result<PathBuf> {
    let mut progress = handle.progress();
    let reporter = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let snap = progress.borrow_and_update().clone();
            if json {
                if let Ok(line) = serde_json::to_string(&snap) {
                    println!("{line}");
                }
            } else {
                eprint!(
                    "\r{:5.1}%  frame {}  {:.2}x",
                    snap.percent, snap.frame, snap.speed
                );
            }
            if snap.finished {
                break;
            }
        }
    });

    let outcome = handle.wait_for_output(timeout).await;
    reporter.abort();
    if !json {
        eprintln!();
    }

    match outcome? {
        JobOutcome::Produced(path) => Ok(path),
        JobOutcome::NotProduced { status } => {
            anyhow::bail!("engine produced no output (exit status {status:?})")
        }
    }
}
