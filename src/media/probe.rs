use std::future::Future;
use std::path::{Path, PathBuf};

use crate::foundation::core::{Affine, Fps, MediaTime, Size};
use crate::foundation::error::{ExportError, ExportResult};
use crate::orientation::{self, OrientationInfo};

/// Metadata of one video stream in a source asset.
#[derive(Clone, Debug)]
pub struct VideoTrackInfo {
    /// Container stream index.
    pub stream_index: u32,
    /// Stored (untransformed) pixel size.
    pub natural_size: Size,
    /// Intrinsic playback transform recorded by the capture device.
    pub preferred_transform: Affine,
    pub duration: Option<MediaTime>,
    pub frame_rate: Option<Fps>,
}

impl VideoTrackInfo {
    pub fn orientation(&self) -> OrientationInfo {
        orientation::classify(self.preferred_transform)
    }
}

/// Metadata of one audio stream in a source asset.
#[derive(Clone, Debug)]
pub struct AudioTrackInfo {
    /// Container stream index.
    pub stream_index: u32,
    pub duration: Option<MediaTime>,
}

/// Probed description of a source asset.
#[derive(Clone, Debug)]
pub struct AssetInfo {
    pub path: PathBuf,
    /// Container duration.
    pub duration: MediaTime,
    pub video_tracks: Vec<VideoTrackInfo>,
    pub audio_tracks: Vec<AudioTrackInfo>,
}

impl AssetInfo {
    pub fn first_video_track(&self) -> Option<&VideoTrackInfo> {
        self.video_tracks.first()
    }

    pub fn first_audio_track(&self) -> Option<&AudioTrackInfo> {
        self.audio_tracks.first()
    }
}

/// Source of asset metadata for the export pipeline.
pub trait MediaProbe: Send + Sync {
    /// Inspect the asset at `path`.
    fn probe(&self, path: &Path) -> impl Future<Output = ExportResult<AssetInfo>> + Send;
}

/// Probe backed by the system `ffprobe`.
#[derive(Clone, Debug)]
pub struct FfprobeProbe {
    program: PathBuf,
}

impl FfprobeProbe {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Return `true` when the configured `ffprobe` can be invoked.
    pub fn is_available(&self) -> bool {
        std::process::Command::new(&self.program)
            .arg("-version")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .is_ok_and(|s| s.success())
    }
}

impl Default for FfprobeProbe {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

impl MediaProbe for FfprobeProbe {
    async fn probe(&self, path: &Path) -> ExportResult<AssetInfo> {
        if !path.is_file() {
            return Err(ExportError::asset_invalid(format!(
                "source '{}' does not exist",
                path.display()
            )));
        }
        let stdout = run_ffprobe(&self.program, path).await?;
        parse_ffprobe_json(path, &stdout)
    }
}

#[cfg(feature = "media-ffmpeg")]
async fn run_ffprobe(program: &Path, source_path: &Path) -> ExportResult<Vec<u8>> {
    let out = tokio::process::Command::new(program)
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(source_path)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| ExportError::asset_invalid(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(ExportError::asset_invalid(format!(
            "ffprobe failed for '{}': {}",
            source_path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }
    Ok(out.stdout)
}

#[cfg(not(feature = "media-ffmpeg"))]
async fn run_ffprobe(_program: &Path, _source_path: &Path) -> ExportResult<Vec<u8>> {
    Err(ExportError::asset_invalid(
        "probing video assets requires the 'media-ffmpeg' feature",
    ))
}

#[derive(serde::Deserialize)]
struct ProbeSideData {
    rotation: Option<f64>,
}

#[derive(serde::Deserialize, Default)]
struct ProbeTags {
    rotate: Option<String>,
}

#[derive(serde::Deserialize)]
struct ProbeStream {
    index: u32,
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    time_base: Option<String>,
    duration_ts: Option<i64>,
    duration: Option<String>,
    #[serde(default)]
    tags: ProbeTags,
    #[serde(default)]
    side_data_list: Vec<ProbeSideData>,
}

#[derive(serde::Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(serde::Deserialize)]
struct ProbeOut {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

/// Build an [`AssetInfo`] from `ffprobe -print_format json -show_streams -show_format` output.
pub fn parse_ffprobe_json(source_path: &Path, json: &[u8]) -> ExportResult<AssetInfo> {
    let parsed: ProbeOut = serde_json::from_slice(json)
        .map_err(|e| ExportError::asset_invalid(format!("ffprobe json parse failed: {e}")))?;

    let mut video_tracks = Vec::new();
    let mut audio_tracks = Vec::new();
    for stream in &parsed.streams {
        match stream.codec_type.as_deref() {
            Some("video") => {
                let (Some(width), Some(height)) = (stream.width, stream.height) else {
                    continue;
                };
                if width == 0 || height == 0 {
                    continue;
                }
                let natural_size = Size::new(f64::from(width), f64::from(height));
                video_tracks.push(VideoTrackInfo {
                    stream_index: stream.index,
                    natural_size,
                    preferred_transform: orientation::preferred_transform_for_rotation(
                        stream_rotation_clockwise(stream),
                        natural_size,
                    ),
                    duration: stream_duration(stream),
                    frame_rate: stream.r_frame_rate.as_deref().and_then(parse_fps),
                });
            }
            Some("audio") => audio_tracks.push(AudioTrackInfo {
                stream_index: stream.index,
                duration: stream_duration(stream),
            }),
            _ => {}
        }
    }

    let duration = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(|d| MediaTime::parse_decimal(d).ok())
        .or_else(|| {
            video_tracks
                .iter()
                .filter_map(|t| t.duration)
                .chain(audio_tracks.iter().filter_map(|t| t.duration))
                .max()
        })
        .ok_or_else(|| {
            ExportError::asset_invalid(format!(
                "could not determine duration of '{}'",
                source_path.display()
            ))
        })?;

    Ok(AssetInfo {
        path: source_path.to_path_buf(),
        duration,
        video_tracks,
        audio_tracks,
    })
}

// Display-matrix rotation is counter-clockwise; the legacy `rotate` tag is clockwise.
fn stream_rotation_clockwise(stream: &ProbeStream) -> f64 {
    if let Some(ccw) = stream.side_data_list.iter().find_map(|s| s.rotation) {
        return -ccw;
    }
    stream
        .tags
        .rotate
        .as_deref()
        .and_then(|r| r.trim().parse::<f64>().ok())
        .unwrap_or(0.0)
}

fn stream_duration(stream: &ProbeStream) -> Option<MediaTime> {
    if let (Some(ticks), Some((num, den))) = (
        stream.duration_ts,
        stream.time_base.as_deref().and_then(parse_ff_ratio),
    ) && let Ok(t) = MediaTime::from_time_base(ticks, num, den)
    {
        return Some(t);
    }
    stream
        .duration
        .as_deref()
        .and_then(|d| MediaTime::parse_decimal(d).ok())
}

fn parse_fps(s: &str) -> Option<Fps> {
    let (num, den) = parse_ff_ratio(s)?;
    Fps::new(num, den).ok()
}

fn parse_ff_ratio(s: &str) -> Option<(u32, u32)> {
    let (num, den) = s.split_once('/')?;
    let num = num.trim().parse().ok()?;
    let den = den.trim().parse().ok()?;
    if den == 0 {
        return None;
    }
    Some((num, den))
}

#[cfg(test)]
#[path = "../../tests/unit/media/probe.rs"]
mod tests;
