use std::path::PathBuf;

use image::RgbaImage;

use crate::annotation::AnnotationSnapshot;
use crate::foundation::core::{Affine, MediaTime, Rect, RenderSize, Size, TimeRange};
use crate::foundation::error::{ExportError, ExportResult};
use crate::trim::TrimRange;

/// Everything one export invocation needs. Owned by that invocation; never shared.
#[derive(Clone, Debug)]
pub struct CompositionDescriptor {
    /// Local source video.
    pub source: PathBuf,
    /// Selected range; `None` selects the whole source minus the trailing epsilon.
    pub trim: Option<TrimRange>,
    /// Omit the audio track entirely.
    pub audio_muted: bool,
    /// Logical size the user was viewing while composing.
    pub presentation_size: Size,
    /// Device pixels per logical unit.
    pub pixel_density: f64,
    /// Flattened annotation layer.
    pub snapshot: AnnotationSnapshot,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    Video,
    Audio,
}

/// A span of source samples spliced into the composition timeline.
#[derive(Clone, Debug, PartialEq)]
pub struct CompositionTrack {
    pub kind: TrackKind,
    /// Container stream index of the source track.
    pub source_stream: u32,
    /// Range read from the source timeline.
    pub source_range: TimeRange,
    /// Position on the composition timeline.
    pub insert_at: MediaTime,
}

impl CompositionTrack {
    /// Range occupied on the composition timeline.
    pub fn timeline_range(&self) -> TimeRange {
        TimeRange {
            start: self.insert_at,
            duration: self.source_range.duration,
        }
    }
}

/// Transform applied to the video track over `time_range` of the composition.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerInstruction {
    pub time_range: TimeRange,
    pub transform: Affine,
    /// Stored size of the source frames the transform is applied to.
    pub natural_size: Size,
    /// Intrinsic transform of the source track, as recorded by the capture device.
    pub preferred_transform: Affine,
}

/// Stacked visual layers of every output frame, bottom to top.
#[derive(Clone, Debug)]
pub struct LayerStack {
    /// Opaque fill behind the video, straight-alpha RGBA8.
    pub background_rgba: [u8; 4],
    /// Frame of the video layer in render space.
    pub video_frame: Rect,
    /// Annotation snapshot rasterised at exactly the render size.
    pub overlay: RgbaImage,
}

/// Render-side description of the composition.
#[derive(Clone, Debug)]
pub struct VideoComposition {
    pub render_size: RenderSize,
    pub frame_duration: MediaTime,
    pub instructions: Vec<LayerInstruction>,
    pub layers: LayerStack,
}

/// Offline composition: trimmed tracks on a new timeline plus how to draw them.
#[derive(Clone, Debug)]
pub struct Composition {
    pub source: PathBuf,
    pub tracks: Vec<CompositionTrack>,
    pub video: VideoComposition,
}

impl Composition {
    /// Timeline length: the end of the furthest track.
    pub fn duration(&self) -> MediaTime {
        self.tracks
            .iter()
            .map(|t| t.timeline_range().end())
            .max()
            .unwrap_or(MediaTime::ZERO)
    }

    pub fn video_track(&self) -> Option<&CompositionTrack> {
        self.tracks.iter().find(|t| t.kind == TrackKind::Video)
    }

    pub fn audio_track(&self) -> Option<&CompositionTrack> {
        self.tracks.iter().find(|t| t.kind == TrackKind::Audio)
    }
}

/// Splice `range` of source stream `source_stream` at `at`, provided the source covers it.
pub(crate) fn insert_time_range(
    tracks: &mut Vec<CompositionTrack>,
    kind: TrackKind,
    source_stream: u32,
    range: TimeRange,
    available: TimeRange,
    at: MediaTime,
) -> ExportResult<()> {
    if range.is_empty() {
        return Err(ExportError::composition(format!(
            "cannot insert an empty {kind:?} range"
        )));
    }
    if !available.contains_range(range) {
        return Err(ExportError::composition(format!(
            "{kind:?} range [{}, {}) is outside the source [{}, {})",
            range.start,
            range.end(),
            available.start,
            available.end()
        )));
    }
    tracks.push(CompositionTrack {
        kind,
        source_stream,
        source_range: range,
        insert_at: at,
    });
    Ok(())
}
