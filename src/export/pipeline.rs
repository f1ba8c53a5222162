use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use image::RgbaImage;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::annotation::{AnnotationSnapshot, flatten_photo};
use crate::composition::{Composition, CompositionDescriptor};
use crate::export::cancel::CancelToken;
use crate::export::config::ExportConfig;
use crate::export::ffmpeg::{FfmpegRenderer, RenderBackend, RenderJob, overlay_path_for};
use crate::foundation::error::{ExportError, ExportResult};
use crate::media::probe::{FfprobeProbe, MediaProbe};

/// File-name prefix of every file the pipeline writes.
pub const OUTPUT_PREFIX: &str = "clipmark-";

/// Lifecycle of one export invocation. `Completed` and `Failed` are final.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportState {
    Idle,
    Validating,
    Composing,
    Rendering,
    Completed,
    Failed,
}

impl ExportState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ExportState::Completed | ExportState::Failed)
    }
}

/// Composition and export pipeline.
///
/// Each call to [`Exporter::export`] is an independent single-shot invocation with its own
/// output file; nothing is retried.
pub struct Exporter<B = FfmpegRenderer, P = FfprobeProbe> {
    config: ExportConfig,
    backend: B,
    probe: P,
}

impl Exporter {
    /// Pipeline backed by the `ffmpeg` / `ffprobe` executables named in `config`.
    pub fn from_config(config: ExportConfig) -> ExportResult<Self> {
        config.validate()?;
        let backend = FfmpegRenderer::new(config.ffmpeg_path.clone());
        let probe = FfprobeProbe::new(config.ffprobe_path.clone());
        Ok(Self {
            config,
            backend,
            probe,
        })
    }
}

impl<B: RenderBackend, P: MediaProbe> Exporter<B, P> {
    pub fn with_backends(config: ExportConfig, backend: B, probe: P) -> Self {
        Self {
            config,
            backend,
            probe,
        }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Fresh, collision-free output location.
    pub fn next_output_path(&self) -> PathBuf {
        self.config.output_dir().join(format!(
            "{OUTPUT_PREFIX}{}.{}",
            Uuid::new_v4(),
            self.config.container().extension()
        ))
    }

    /// Export `descriptor` to a new file and return its location.
    ///
    /// Ownership of the returned file passes to the caller. On any error no output file is
    /// left behind.
    pub async fn export(
        &self,
        descriptor: &CompositionDescriptor,
        cancel: &CancelToken,
    ) -> ExportResult<PathBuf> {
        let (state, _) = watch::channel(ExportState::Idle);
        self.run(descriptor, cancel, &state).await
    }

    #[tracing::instrument(skip_all, fields(source = %descriptor.source.display()))]
    async fn run(
        &self,
        descriptor: &CompositionDescriptor,
        cancel: &CancelToken,
        state: &watch::Sender<ExportState>,
    ) -> ExportResult<PathBuf> {
        let result = self.run_stages(descriptor, cancel, state).await;
        match &result {
            Ok(path) => {
                state.send_replace(ExportState::Completed);
                tracing::info!(output = %path.display(), "export completed");
            }
            Err(e) => {
                state.send_replace(ExportState::Failed);
                if e.is_cancelled() {
                    tracing::info!("export cancelled");
                } else {
                    tracing::warn!(error = %e, "export failed");
                }
            }
        }
        result
    }

    async fn run_stages(
        &self,
        descriptor: &CompositionDescriptor,
        cancel: &CancelToken,
        state: &watch::Sender<ExportState>,
    ) -> ExportResult<PathBuf> {
        state.send_replace(ExportState::Validating);
        let asset = self.probe.probe(&descriptor.source).await?;
        tracing::info!(
            duration = %asset.duration,
            video_tracks = asset.video_tracks.len(),
            audio_tracks = asset.audio_tracks.len(),
            "source probed"
        );
        if cancel.is_cancelled() {
            return Err(ExportError::Cancelled);
        }

        state.send_replace(ExportState::Composing);
        let composition = Composition::build(descriptor, &asset, &self.config.composition_opts())?;
        tracing::info!(
            duration = %composition.duration(),
            width = composition.video.render_size.width,
            height = composition.video.render_size.height,
            audio = composition.audio_track().is_some(),
            "composition built"
        );
        if cancel.is_cancelled() {
            return Err(ExportError::Cancelled);
        }

        state.send_replace(ExportState::Rendering);
        let output_path = self.next_output_path();
        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let job = RenderJob {
            composition: &composition,
            output_path: &output_path,
            preset: self.config.preset,
            container: self.config.container(),
            fps: self.config.frame_rate,
        };
        tracing::info!(
            backend = self.backend.name(),
            output = %output_path.display(),
            "rendering"
        );

        let rendered = self.backend.render(&job, cancel).await;
        let outcome = match rendered {
            Ok(()) if cancel.is_cancelled() => Err(ExportError::Cancelled),
            Ok(()) => match tokio::fs::metadata(&output_path).await {
                Ok(meta) if meta.is_file() => Ok(()),
                _ => Err(ExportError::render("render reported success but wrote no file")),
            },
            Err(e @ (ExportError::Cancelled | ExportError::RenderFailed(_))) => Err(e),
            Err(e) => Err(ExportError::render(e.to_string())),
        };

        match outcome {
            Ok(()) => Ok(output_path),
            Err(e) => {
                remove_if_exists(&output_path).await;
                Err(e)
            }
        }
    }
}

impl<B, P> Exporter<B, P>
where
    B: RenderBackend + 'static,
    P: MediaProbe + 'static,
{
    /// Start an export in the background and return immediately.
    pub fn spawn(self: &Arc<Self>, descriptor: CompositionDescriptor) -> ExportHandle {
        let cancel = CancelToken::new();
        let (state_tx, state_rx) = watch::channel(ExportState::Idle);
        let this = Arc::clone(self);
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            this.run(&descriptor, &task_cancel, &state_tx).await
        });
        ExportHandle {
            cancel,
            state: state_rx,
            task: Some(task),
        }
    }
}

/// Handle to a background export. Dropping it cancels the export if still running.
#[derive(Debug)]
pub struct ExportHandle {
    cancel: CancelToken,
    state: watch::Receiver<ExportState>,
    task: Option<JoinHandle<ExportResult<PathBuf>>>,
}

impl ExportHandle {
    pub fn state(&self) -> ExportState {
        *self.state.borrow()
    }

    /// Receiver observing state transitions, for progress display.
    pub fn subscribe(&self) -> watch::Receiver<ExportState> {
        self.state.clone()
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Request cancellation; the render is stopped and its partial output removed.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(|t| t.is_finished())
    }

    /// Wait for the export outcome.
    pub async fn join(mut self) -> ExportResult<PathBuf> {
        let Some(task) = self.task.take() else {
            return Err(ExportError::Cancelled);
        };
        match task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(ExportError::Cancelled),
            Err(e) => Err(ExportError::Other(anyhow::Error::new(e))),
        }
    }
}

impl Drop for ExportHandle {
    fn drop(&mut self) {
        if self.task.as_ref().is_some_and(|t| !t.is_finished()) {
            self.cancel.cancel();
        }
    }
}

/// Photo export path: the flattened image, in memory.
pub fn export_photo(
    photo: &RgbaImage,
    snapshot: &AnnotationSnapshot,
    config: &ExportConfig,
) -> ExportResult<RgbaImage> {
    flatten_photo(photo, snapshot, config.overlay_fill)
}

async fn remove_if_exists(path: &Path) {
    for p in [path.to_path_buf(), overlay_path_for(path)] {
        match tokio::fs::remove_file(&p).await {
            Ok(()) => tracing::debug!(path = %p.display(), "removed partial output"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %p.display(), error = %e, "failed to remove partial output"),
        }
    }
}

/// Delete pipeline-written files in `dir` older than `max_age`; returns how many were removed.
///
/// Only files carrying the pipeline's prefix are considered. Intended for start-up sweeps of
/// outputs that were never handed off, e.g. after a crash.
pub fn cleanup_stale_outputs(dir: &Path, max_age: Duration) -> std::io::Result<usize> {
    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if !name.to_string_lossy().starts_with(OUTPUT_PREFIX) {
            continue;
        }
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }
        let age = meta
            .modified()?
            .elapsed()
            .unwrap_or(Duration::ZERO);
        if age < max_age {
            continue;
        }
        match std::fs::remove_file(entry.path()) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(removed)
}

#[cfg(test)]
#[path = "../../tests/unit/export/pipeline.rs"]
mod tests;
