use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use image::RgbaImage;
use tokio::sync::watch;

use crate::annotation::AnnotationSnapshot;
use crate::composition::CompositionDescriptor;
use crate::export::cancel::CancelToken;
use crate::export::ffmpeg::{FfmpegRenderer, RenderBackend};
use crate::export::pipeline::{ExportState, Exporter, export_photo};
use crate::foundation::core::Size;
use crate::foundation::error::{ExportError, ExportResult};
use crate::media::probe::{FfprobeProbe, MediaProbe};
use crate::media::source::Media;
use crate::session::main_context::MainHandle;
use crate::session::playback::{PlaybackLoop, PreviewPlayer};
use crate::trim::TrimRange;

/// Receiver of an editing session's outcome. Always invoked on the main context.
pub trait EditorDelegate: Send + Sync {
    fn on_edit_done(&self, photo: RgbaImage);
    fn on_edit_done_video(&self, location: PathBuf);
    fn on_edit_cancelled(&self);
}

struct ActiveExport {
    id: u64,
    cancel: CancelToken,
}

/// One open editor: the media being edited, the user's trim and mute choices, the current
/// annotation snapshot, the preview loop and at most one export in flight.
///
/// Export and preview work runs on tokio tasks, so the session must be used from inside a
/// runtime. Results reach the host through the [`MainHandle`] it was created with.
pub struct EditorSession<B = FfmpegRenderer, P = FfprobeProbe> {
    media: Media,
    exporter: Arc<Exporter<B, P>>,
    delegate: Arc<dyn EditorDelegate>,
    main: MainHandle,
    presentation_size: Size,
    pixel_density: f64,
    snapshot: AnnotationSnapshot,
    trim: Option<TrimRange>,
    audio_muted: bool,
    in_flight: Arc<AtomicU64>,
    next_export_id: u64,
    export: Option<ActiveExport>,
    playback: Option<PlaybackLoop>,
}

impl<B, P> EditorSession<B, P>
where
    B: RenderBackend + 'static,
    P: MediaProbe + 'static,
{
    pub fn new(
        media: Media,
        presentation_size: Size,
        pixel_density: f64,
        exporter: Arc<Exporter<B, P>>,
        delegate: Arc<dyn EditorDelegate>,
        main: MainHandle,
    ) -> Self {
        Self {
            media,
            exporter,
            delegate,
            main,
            presentation_size,
            pixel_density,
            snapshot: AnnotationSnapshot::empty(presentation_size),
            trim: None,
            audio_muted: false,
            in_flight: Arc::new(AtomicU64::new(0)),
            next_export_id: 1,
            export: None,
            playback: None,
        }
    }

    pub fn media(&self) -> &Media {
        &self.media
    }

    /// Replace the annotation layer captured from the editing surface.
    pub fn set_snapshot(&mut self, snapshot: AnnotationSnapshot) {
        self.snapshot = snapshot;
    }

    pub fn trim(&self) -> Option<TrimRange> {
        self.trim
    }

    /// New trimmer selection; a running preview restarts from the new start.
    pub fn set_trim(&mut self, trim: TrimRange) {
        self.trim = Some(trim);
        if let Some(playback) = &self.playback {
            playback.set_range(trim);
        }
    }

    /// Label for the trimmed length, `None` until a range is selected.
    pub fn trim_label(&self) -> Option<String> {
        self.trim.map(TrimRange::duration_label)
    }

    pub fn is_audio_muted(&self) -> bool {
        self.audio_muted
    }

    pub fn set_audio_muted(&mut self, muted: bool) {
        self.audio_muted = muted;
    }

    /// `true` from `start_export` until the export task has fully stopped, including the
    /// wind-down of a cancelled render.
    pub fn is_exporting(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) != 0
    }

    /// The editor became visible: start looping the preview over the current trim.
    pub fn appear(&mut self, player: Arc<dyn PreviewPlayer>) -> ExportResult<()> {
        if !self.media.is_video() {
            return Ok(());
        }
        let range = match self.trim {
            Some(trim) => trim,
            None => TrimRange::full(player.duration())?,
        };
        self.playback = None;
        self.playback = Some(PlaybackLoop::start(player, range));
        Ok(())
    }

    /// The editor was hidden: stop the preview loop.
    pub fn disappear(&mut self) {
        self.playback = None;
    }

    pub fn is_previewing(&self) -> bool {
        self.playback.is_some()
    }

    fn descriptor(&self, source: &Path) -> CompositionDescriptor {
        CompositionDescriptor {
            source: source.to_path_buf(),
            trim: self.trim,
            audio_muted: self.audio_muted,
            presentation_size: self.presentation_size,
            pixel_density: self.pixel_density,
            snapshot: self.snapshot.clone(),
        }
    }

    /// Start exporting the video with the session's current settings.
    ///
    /// `on_complete` runs on the main context exactly once, unless the export is cancelled
    /// first, in which case it never runs. Only one export may be in flight; a second call
    /// fails with [`ExportError::Busy`].
    pub fn start_export<F>(&mut self, on_complete: F) -> ExportResult<watch::Receiver<ExportState>>
    where
        F: FnOnce(ExportResult<PathBuf>) + Send + 'static,
    {
        let Some(source) = self.media.video_path() else {
            return Err(ExportError::validation("photo sessions have no video to export"));
        };
        let descriptor = self.descriptor(source);

        let id = self.next_export_id;
        if self
            .in_flight
            .compare_exchange(0, id, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ExportError::Busy);
        }
        self.next_export_id += 1;

        let handle = self.exporter.spawn(descriptor);
        let cancel = handle.cancel_token();
        let states = handle.subscribe();
        self.export = Some(ActiveExport {
            id,
            cancel: cancel.clone(),
        });
        tracing::info!(export = id, "export started");

        let in_flight = Arc::clone(&self.in_flight);
        let main = self.main.clone();
        tokio::spawn(async move {
            let result = handle.join().await;
            // The only release point: a cancelled render still holds the slot until its
            // encoder has exited.
            let _ = in_flight.compare_exchange(id, 0, Ordering::SeqCst, Ordering::SeqCst);
            if cancel.is_cancelled() {
                discard(result);
                return;
            }
            main.post(move || {
                // The session may have been cancelled while this job sat in the queue.
                if cancel.is_cancelled() {
                    discard(result);
                    return;
                }
                on_complete(result);
            });
        });
        Ok(states)
    }

    /// Cancel the in-flight export, if any. Its completion callback will not run, and a new
    /// export is refused with [`ExportError::Busy`] until the cancelled one has stopped.
    pub fn cancel_export(&mut self) {
        cancel_active(&mut self.export);
    }

    /// Done button: hand the result to the delegate.
    ///
    /// Photos are flattened in place and delivered immediately. Videos are exported and
    /// delivered from the main context on success; failures are logged and visible through
    /// the returned state receiver.
    pub fn finish(&mut self) -> ExportResult<Option<watch::Receiver<ExportState>>> {
        if let Media::Photo(photo) = &self.media {
            let flattened = export_photo(photo, &self.snapshot, self.exporter.config())?;
            self.delegate.on_edit_done(flattened);
            return Ok(None);
        }

        self.disappear();
        let delegate = Arc::clone(&self.delegate);
        let states = self.start_export(move |result| match result {
            Ok(location) => delegate.on_edit_done_video(location),
            Err(e) => tracing::warn!(error = %e, "video export failed"),
        })?;
        Ok(Some(states))
    }

    /// Cancel button: drop any export, stop the preview and tell the delegate.
    pub fn cancel(&mut self) {
        self.cancel_export();
        self.disappear();
        self.delegate.on_edit_cancelled();
    }
}

impl<B, P> Drop for EditorSession<B, P> {
    fn drop(&mut self) {
        cancel_active(&mut self.export);
        self.playback = None;
    }
}

fn cancel_active(export: &mut Option<ActiveExport>) {
    if let Some(active) = export.take()
        && !active.cancel.is_cancelled()
    {
        active.cancel.cancel();
        tracing::info!(export = active.id, "export cancel requested");
    }
}

/// Remove an output nobody will receive.
fn discard(result: ExportResult<PathBuf>) {
    if let Ok(path) = result {
        match std::fs::remove_file(&path) {
            Ok(()) => tracing::debug!(path = %path.display(), "discarded unclaimed export"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to discard export")
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/editor.rs"]
mod tests;
