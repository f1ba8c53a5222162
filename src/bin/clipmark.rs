use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use clipmark::{
    AnnotationSnapshot, CancelToken, CompositionDescriptor, ExportConfig, Exporter, FfprobeProbe,
    MediaProbe, OutputContainer, OverlayFill, QualityPreset, Size, TrimRange,
    cleanup_stale_outputs, export_photo,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "clipmark", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the tracks, duration and capture orientation of a video.
    Probe(ProbeArgs),
    /// Trim a video and render it under an annotation overlay (requires `ffmpeg` on PATH).
    Export(ExportArgs),
    /// Flatten an annotation overlay onto a still image.
    Photo(PhotoArgs),
    /// Remove leftover export outputs older than a given age.
    Cleanup(CleanupArgs),
}

#[derive(Parser, Debug)]
struct ProbeArgs {
    /// Input video.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// ffprobe executable.
    #[arg(long, default_value = "ffprobe")]
    ffprobe: PathBuf,
}

#[derive(Parser, Debug)]
struct ExportArgs {
    /// Input video.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Annotation overlay image (PNG with transparency).
    #[arg(long)]
    overlay: Option<PathBuf>,

    /// JSON export configuration; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Trim start in seconds.
    #[arg(long, requires = "end")]
    start: Option<f64>,

    /// Trim end in seconds.
    #[arg(long)]
    end: Option<f64>,

    /// Drop the audio track.
    #[arg(long, default_value_t = false)]
    mute: bool,

    /// Logical width of the editing surface (defaults to the overlay width, else 1080).
    #[arg(long)]
    width: Option<f64>,

    /// Logical height of the editing surface (defaults to the overlay height, else 1920).
    #[arg(long)]
    height: Option<f64>,

    /// Output pixels per logical unit.
    #[arg(long, default_value_t = 1.0)]
    density: f64,

    #[arg(long, value_enum)]
    preset: Option<PresetArg>,

    #[arg(long, value_enum)]
    container: Option<ContainerArg>,

    #[arg(long, value_enum)]
    fill: Option<FillArg>,

    /// Directory for the output file (defaults to the system temp dir).
    #[arg(long)]
    out_dir: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct PhotoArgs {
    /// Input image.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Annotation overlay image (PNG with transparency).
    #[arg(long)]
    overlay: PathBuf,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    #[arg(long, value_enum, default_value_t = FillArg::AspectFill)]
    fill: FillArg,
}

#[derive(Parser, Debug)]
struct CleanupArgs {
    /// Directory to sweep.
    #[arg(long)]
    dir: PathBuf,

    /// Minimum age in seconds of files to delete.
    #[arg(long, default_value_t = 24 * 60 * 60)]
    max_age_secs: u64,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PresetArg {
    Medium,
    Highest,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ContainerArg {
    Mp4,
    Mov,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FillArg {
    AspectFill,
    AspectFit,
    Stretch,
}

impl From<PresetArg> for QualityPreset {
    fn from(v: PresetArg) -> Self {
        match v {
            PresetArg::Medium => QualityPreset::Medium,
            PresetArg::Highest => QualityPreset::Highest,
        }
    }
}

impl From<ContainerArg> for OutputContainer {
    fn from(v: ContainerArg) -> Self {
        match v {
            ContainerArg::Mp4 => OutputContainer::Mp4,
            ContainerArg::Mov => OutputContainer::Mov,
        }
    }
}

impl From<FillArg> for OverlayFill {
    fn from(v: FillArg) -> Self {
        match v {
            FillArg::AspectFill => OverlayFill::AspectFill,
            FillArg::AspectFit => OverlayFill::AspectFit,
            FillArg::Stretch => OverlayFill::Stretch,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.cmd {
        Command::Probe(args) => cmd_probe(args).await,
        Command::Export(args) => cmd_export(args).await,
        Command::Photo(args) => cmd_photo(args),
        Command::Cleanup(args) => cmd_cleanup(args),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn cmd_probe(args: ProbeArgs) -> anyhow::Result<()> {
    let probe = FfprobeProbe::new(&args.ffprobe);
    anyhow::ensure!(
        probe.is_available(),
        "ffprobe not found at '{}'",
        args.ffprobe.display()
    );
    let info = probe
        .probe(&args.in_path)
        .await
        .with_context(|| format!("probe '{}'", args.in_path.display()))?;

    println!("duration: {}", info.duration);
    for v in &info.video_tracks {
        let o = v.orientation();
        println!(
            "video #{}: {}x{} orientation={:?} portrait={}",
            v.stream_index, v.natural_size.width, v.natural_size.height, o.orientation, o.is_portrait
        );
    }
    for a in &info.audio_tracks {
        println!("audio #{}", a.stream_index);
    }
    Ok(())
}

async fn cmd_export(args: ExportArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => ExportConfig::from_json_file(path)?,
        None => ExportConfig::default(),
    };
    if let Some(p) = args.preset {
        config.preset = p.into();
    }
    if let Some(c) = args.container {
        config.container = Some(c.into());
    }
    if let Some(f) = args.fill {
        config.overlay_fill = f.into();
    }
    if let Some(dir) = &args.out_dir {
        config.output_dir = Some(dir.clone());
    }
    let exporter = Exporter::from_config(config)?;

    let overlay = match &args.overlay {
        Some(path) => Some(AnnotationSnapshot::open(path)?),
        None => None,
    };
    let surface = Size::new(
        args.width
            .or(overlay.as_ref().map(|s| s.presentation_size.width))
            .unwrap_or(1080.0),
        args.height
            .or(overlay.as_ref().map(|s| s.presentation_size.height))
            .unwrap_or(1920.0),
    );
    let snapshot = match overlay {
        Some(s) => AnnotationSnapshot::new(s.image, surface),
        None => AnnotationSnapshot::empty(surface),
    };
    let trim = match args.end {
        Some(end) => Some(TrimRange::from_secs(args.start.unwrap_or(0.0), end)?),
        None => None,
    };

    let descriptor = CompositionDescriptor {
        source: args.in_path.clone(),
        trim,
        audio_muted: args.mute,
        presentation_size: surface,
        pixel_density: args.density,
        snapshot,
    };

    anyhow::ensure!(
        exporter.backend().is_available(),
        "ffmpeg not found at '{}'",
        exporter.config().ffmpeg_path.display()
    );

    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let out = exporter
        .export(&descriptor, &cancel)
        .await
        .with_context(|| format!("export '{}'", args.in_path.display()))?;
    println!("{}", out.display());
    Ok(())
}

fn cmd_photo(args: PhotoArgs) -> anyhow::Result<()> {
    let photo = image::open(&args.in_path)
        .with_context(|| format!("open image '{}'", args.in_path.display()))?
        .to_rgba8();
    let snapshot = AnnotationSnapshot::open(&args.overlay)?;
    let config = ExportConfig {
        overlay_fill: args.fill.into(),
        ..ExportConfig::default()
    };
    let flattened = export_photo(&photo, &snapshot, &config)?;

    create_parent_dir(&args.out)?;
    flattened
        .save_with_format(&args.out, image::ImageFormat::Png)
        .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_cleanup(args: CleanupArgs) -> anyhow::Result<()> {
    let removed = cleanup_stale_outputs(&args.dir, Duration::from_secs(args.max_age_secs))
        .with_context(|| format!("clean '{}'", args.dir.display()))?;
    eprintln!("removed {removed} file(s)");
    Ok(())
}

fn create_parent_dir(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    Ok(())
}
