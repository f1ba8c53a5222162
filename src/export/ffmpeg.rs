use std::ffi::OsString;
use std::future::Future;
use std::path::{Path, PathBuf};

use crate::composition::{Composition, LayerInstruction};
use crate::export::cancel::CancelToken;
use crate::export::config::{OutputContainer, QualityPreset};
use crate::foundation::core::{Affine, Fps, MediaTime, Point, Rect, Size};
use crate::foundation::error::{ExportError, ExportResult};

/// One render request: a built composition and where to write it.
#[derive(Clone, Copy, Debug)]
pub struct RenderJob<'a> {
    pub composition: &'a Composition,
    pub output_path: &'a Path,
    pub preset: QualityPreset,
    pub container: OutputContainer,
    pub fps: Fps,
}

/// Backend that turns a composition into a media file.
///
/// Implementations must stop promptly once `cancel` fires and return
/// [`ExportError::Cancelled`]; the caller owns cleanup of `job.output_path`.
pub trait RenderBackend: Send + Sync {
    fn name(&self) -> &str;

    fn render(
        &self,
        job: &RenderJob<'_>,
        cancel: &CancelToken,
    ) -> impl Future<Output = ExportResult<()>> + Send;
}

/// Renderer that drives the system `ffmpeg` as a child process.
#[derive(Clone, Debug)]
pub struct FfmpegRenderer {
    program: PathBuf,
}

impl FfmpegRenderer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Return `true` when the configured `ffmpeg` can be invoked.
    pub fn is_available(&self) -> bool {
        std::process::Command::new(&self.program)
            .arg("-version")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .is_ok_and(|s| s.success())
    }
}

impl Default for FfmpegRenderer {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl RenderBackend for FfmpegRenderer {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn render(&self, job: &RenderJob<'_>, cancel: &CancelToken) -> ExportResult<()> {
        let overlay = ScratchFile::new(overlay_path_for(job.output_path));
        write_overlay_png(job.composition, overlay.path()).await?;
        if cancel.is_cancelled() {
            return Err(ExportError::Cancelled);
        }

        let args = plan_ffmpeg_args(job, overlay.path())?;
        tracing::debug!(program = %self.program.display(), ?args, "running ffmpeg");
        run_ffmpeg(&self.program, &args, cancel).await
    }
}

/// File removed when dropped, whatever the outcome of the render.
pub(crate) struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove scratch file");
        }
    }
}

/// Intermediate overlay image written next to the output.
pub(crate) fn overlay_path_for(output_path: &Path) -> PathBuf {
    let mut name = output_path
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_default();
    name.push("-overlay.png");
    output_path.with_file_name(name)
}

async fn write_overlay_png(composition: &Composition, path: &Path) -> ExportResult<()> {
    let overlay = composition.video.layers.overlay.clone();
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        overlay
            .save_with_format(&path, image::ImageFormat::Png)
            .map_err(|e| {
                ExportError::render(format!(
                    "failed to write overlay '{}': {e}",
                    path.display()
                ))
            })
    })
    .await
    .map_err(|e| ExportError::render(format!("overlay writer task failed: {e}")))?
}

/// Axis-aligned decomposition of a layer transform: orientation filters, then a scaled box.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoPlacement {
    /// ffmpeg filters applied to source frames before scaling.
    pub orient: Vec<&'static str>,
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

impl VideoPlacement {
    /// Decompose `transform` applied to frames of `natural_size`.
    ///
    /// Only quarter-turn rotations and flips can be expressed; anything else is rejected.
    pub fn from_transform(transform: Affine, natural_size: Size) -> ExportResult<Self> {
        let [a, b, c, d, _, _] = transform.as_coeffs();
        let magnitude = a.abs().max(b.abs()).max(c.abs()).max(d.abs());
        if !magnitude.is_finite() || magnitude == 0.0 {
            return Err(ExportError::composition(format!(
                "degenerate layer transform {:?}",
                transform.as_coeffs()
            )));
        }
        let tol = magnitude * 1e-6;
        let near_zero = |v: f64| v.abs() <= tol;

        let orient: Vec<&'static str> = if near_zero(b) && near_zero(c) {
            match (a > 0.0, d > 0.0) {
                (true, true) => vec![],
                (false, true) => vec!["hflip"],
                (true, false) => vec!["vflip"],
                (false, false) => vec!["hflip", "vflip"],
            }
        } else if near_zero(a) && near_zero(d) {
            match (b > 0.0, c > 0.0) {
                (true, false) => vec!["transpose=clock"],
                (false, true) => vec!["transpose=cclock"],
                (true, true) => vec!["transpose=cclock_flip"],
                (false, false) => vec!["transpose=clock_flip"],
            }
        } else {
            return Err(ExportError::composition(format!(
                "layer transform {:?} is not a quarter-turn rotation",
                transform.as_coeffs()
            )));
        };

        let corners = [
            Point::new(0.0, 0.0),
            Point::new(natural_size.width, 0.0),
            Point::new(0.0, natural_size.height),
            Point::new(natural_size.width, natural_size.height),
        ]
        .map(|p| transform * p);
        let min_x = corners.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
        let max_x = corners.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
        let min_y = corners.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
        let max_y = corners.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);

        Ok(Self {
            orient,
            x: min_x.round() as i64,
            y: min_y.round() as i64,
            width: even_dim(max_x - min_x),
            height: even_dim(max_y - min_y),
        })
    }
}

fn even_dim(v: f64) -> u32 {
    let px = v.round().clamp(2.0, f64::from(u32::MAX - 1)) as u32;
    px & !1
}

fn secs_arg(t: MediaTime) -> String {
    format!("{:.6}", t.as_secs_f64())
}

/// Frames as ffmpeg decodes them with autorotation on: `preferred` already applied.
///
/// Returns the transform from stored to decoded pixels and the decoded frame size.
fn decoded_frame(preferred: Affine, natural_size: Size) -> (Affine, Size) {
    let bounds = preferred.transform_rect_bbox(Rect::from_origin_size(Point::ORIGIN, natural_size));
    (
        Affine::translate((-bounds.x0, -bounds.y0)) * preferred,
        bounds.size(),
    )
}

/// Placement of the decoded (already upright) frames that realises `instruction`.
pub fn decoded_placement(instruction: &LayerInstruction) -> ExportResult<VideoPlacement> {
    let (upright, size) = decoded_frame(instruction.preferred_transform, instruction.natural_size);
    if upright.determinant().abs() < 1e-9 {
        return Err(ExportError::composition(format!(
            "degenerate source transform {:?}",
            instruction.preferred_transform.as_coeffs()
        )));
    }
    VideoPlacement::from_transform(instruction.transform * upright.inverse(), size)
}

/// `filter_complex` drawing background, transformed video and annotation overlay.
pub fn filter_graph(composition: &Composition, fps: Fps) -> ExportResult<String> {
    let video = &composition.video;
    let instruction: &LayerInstruction = video
        .instructions
        .first()
        .ok_or_else(|| ExportError::composition("composition has no layer instruction"))?;
    let placement = decoded_placement(instruction)?;

    let mut vid_chain: Vec<String> = placement.orient.iter().map(|f| f.to_string()).collect();
    vid_chain.push(format!("scale={}:{}", placement.width, placement.height));
    vid_chain.push("setsar=1".to_string());

    let [r, g, b, _] = video.layers.background_rgba;
    let size = video.render_size;
    Ok(format!(
        "[0:v]{vid}[vid];\
         color=c=0x{r:02x}{g:02x}{b:02x}:s={w}x{h}:r={fps_num}/{fps_den}:d={dur}[bg];\
         [bg][vid]overlay=x={x}:y={y}:eof_action=pass[base];\
         [base][1:v]overlay=x=0:y=0,format=yuv420p[out]",
        vid = vid_chain.join(","),
        w = size.width,
        h = size.height,
        fps_num = fps.num,
        fps_den = fps.den,
        dur = secs_arg(instruction.time_range.duration),
        x = placement.x,
        y = placement.y,
    ))
}

/// Full ffmpeg argument list for `job`, reading the overlay image from `overlay_path`.
pub fn plan_ffmpeg_args(job: &RenderJob<'_>, overlay_path: &Path) -> ExportResult<Vec<OsString>> {
    let comp = job.composition;
    let video_track = comp
        .video_track()
        .ok_or_else(|| ExportError::composition("composition has no video track"))?;
    let range = video_track.source_range;

    let mut args: Vec<OsString> = Vec::new();
    let mut push = |items: &[&str]| args.extend(items.iter().map(OsString::from));

    push(&["-nostdin", "-loglevel", "error", "-n"]);
    // The decoder applies the source rotation and clears it on the output stream; the
    // filter graph places the upright frames.
    push(&[
        "-ss",
        secs_arg(range.start).as_str(),
        "-t",
        secs_arg(range.duration).as_str(),
        "-i",
    ]);
    args.push(comp.source.clone().into_os_string());
    args.push("-i".into());
    args.push(overlay_path.as_os_str().to_os_string());

    args.push("-filter_complex".into());
    args.push(filter_graph(comp, job.fps)?.into());
    args.extend(["-map", "[out]"].map(OsString::from));

    match comp.audio_track() {
        Some(audio) => {
            args.extend(
                [
                    "-map".to_string(),
                    format!("0:{}", audio.source_stream),
                    "-c:a".to_string(),
                    "aac".to_string(),
                    "-b:a".to_string(),
                    "128k".to_string(),
                ]
                .map(OsString::from),
            );
        }
        None => args.push("-an".into()),
    }

    let (x264_preset, crf) = job.preset.x264_params();
    args.extend(
        [
            "-r".to_string(),
            format!("{}/{}", job.fps.num, job.fps.den),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            x264_preset.to_string(),
            "-crf".to_string(),
            crf.to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-t".to_string(),
            secs_arg(comp.duration()),
            "-f".to_string(),
            job.container.muxer().to_string(),
        ]
        .map(OsString::from),
    );
    if job.container == OutputContainer::Mp4 {
        args.extend(["-movflags", "+faststart"].map(OsString::from));
    }
    args.push(job.output_path.as_os_str().to_os_string());
    Ok(args)
}

#[cfg(feature = "media-ffmpeg")]
async fn run_ffmpeg(program: &Path, args: &[OsString], cancel: &CancelToken) -> ExportResult<()> {
    use std::process::Stdio;
    use tokio::io::AsyncReadExt as _;

    let mut child = tokio::process::Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            ExportError::render(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;

    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| ExportError::render("failed to open ffmpeg stderr (unexpected)"))?;
    let stderr_drain = tokio::spawn(async move {
        let mut bytes = Vec::new();
        stderr.read_to_end(&mut bytes).await.map(|_| bytes)
    });

    let status = tokio::select! {
        status = child.wait() => Some(status),
        _ = cancel.cancelled() => None,
    };
    let Some(status) = status else {
        if let Err(e) = child.kill().await {
            tracing::warn!(error = %e, "failed to kill cancelled ffmpeg");
        }
        stderr_drain.abort();
        return Err(ExportError::Cancelled);
    };

    let status =
        status.map_err(|e| ExportError::render(format!("failed to wait for ffmpeg: {e}")))?;
    let stderr_bytes = match stderr_drain.await {
        Ok(Ok(bytes)) => bytes,
        _ => Vec::new(),
    };
    if !status.success() {
        let stderr = String::from_utf8_lossy(&stderr_bytes);
        return Err(ExportError::render(format!(
            "ffmpeg exited with status {status}: {}",
            stderr.trim()
        )));
    }
    Ok(())
}

#[cfg(not(feature = "media-ffmpeg"))]
async fn run_ffmpeg(_program: &Path, _args: &[OsString], _cancel: &CancelToken) -> ExportResult<()> {
    Err(ExportError::render(
        "video export requires the 'media-ffmpeg' feature",
    ))
}

#[cfg(test)]
#[path = "../../tests/unit/export/ffmpeg.rs"]
mod tests;
